//! # Rest-frame transform
//!
//! Moves a decoded spectrum to the emitted (rest-frame) wavelengths and resamples it on the
//! shared [`MasterGrid`].
//!
//! ## Redshift correction
//! -----------------
//! For an object at redshift `z`, an observed wavelength `λ_obs` was emitted at
//!
//! ```text
//! λ_rest = λ_obs · z_factor,     z_factor = 1 / (1 + z)
//! ```
//!
//! `z_factor` is undefined for `z ≤ -1` and for non-finite `z`; those inputs are rejected with
//! [`SpectraError::Transform`] instead of producing infinities.
//!
//! ## Resampling
//! -----------------
//! Flux is linearly interpolated at every grid point `g` inside `[λ_rest[0], λ_rest[n-1]]`
//! (a grid point equal to a sample returns that sample). Grid points outside the range are
//! `NaN`: nothing was observed there for this object. A non-finite raw sample contaminates the
//! grid points interpolated from it.
//!
//! ## Sharing
//! -----------------
//! [`MasterGrid`] wraps an `Arc<[f64]>`; clones are cheap and every worker reads the same
//! values. The grid is never mutated after construction.
use std::{ops::Deref, sync::Arc};

use itertools::Itertools;

use crate::{
    constants::{Angstrom, Flux, Redshift},
    spectra_errors::SpectraError,
    spectrum::SpectrumRaw,
};

/// Common wavelength sampling of every item of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterGrid(Arc<[Angstrom]>);

impl MasterGrid {
    /// Build a grid from explicit wavelengths.
    ///
    /// Return
    /// ----------
    /// * [`SpectraError::InvalidConfig`] if the grid is empty, has a non-finite value or is
    ///   not strictly increasing.
    pub fn new(wavelengths: Vec<Angstrom>) -> Result<Self, SpectraError> {
        if wavelengths.is_empty() {
            return Err(SpectraError::InvalidConfig("master grid is empty".into()));
        }
        let finite = wavelengths.iter().all(|w| w.is_finite());
        if !finite || !wavelengths.iter().tuple_windows().all(|(a, b)| a < b) {
            return Err(SpectraError::InvalidConfig(
                "master grid must be finite and strictly increasing".into(),
            ));
        }
        Ok(MasterGrid(wavelengths.into()))
    }

    /// `n` evenly spaced wavelengths from `start` to `stop` (both included).
    pub fn linear(start: Angstrom, stop: Angstrom, n: usize) -> Result<Self, SpectraError> {
        match n {
            0 => Self::new(Vec::new()),
            1 => Self::new(vec![start]),
            _ => {
                let step = (stop - start) / (n - 1) as f64;
                Self::new((0..n).map(|i| start + step * i as f64).collect())
            }
        }
    }

    /// `n` wavelengths evenly spaced in `log10(λ)`, the native sampling of SDSS spectra
    /// (`log_step = 1e-4`).
    pub fn log_linear(log_start: f64, log_step: f64, n: usize) -> Result<Self, SpectraError> {
        Self::new(
            (0..n)
                .map(|i| 10f64.powf(log_start + log_step * i as f64))
                .collect(),
        )
    }

    pub fn as_slice(&self) -> &[Angstrom] {
        &self.0
    }
}

impl Deref for MasterGrid {
    type Target = [Angstrom];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Redshift correction factor `1 / (1 + z)`.
pub fn z_factor(z: Redshift) -> Result<f64, SpectraError> {
    if !z.is_finite() || z <= -1.0 {
        return Err(SpectraError::Transform(format!(
            "z = {z} gives an undefined correction factor"
        )));
    }
    Ok(1.0 / (1.0 + z))
}

/// Scale an observed wavelength axis to the rest frame.
pub fn deredshift(wavelength: &[Angstrom], z: Redshift) -> Result<Vec<Angstrom>, SpectraError> {
    let factor = z_factor(z)?;
    Ok(wavelength.iter().map(|w| w * factor).collect())
}

/// Linear interpolation of `(x, y)` at every point of `grid`, `NaN` outside `[x[0], x[n-1]]`.
///
/// `x` must be strictly increasing, `y` as long as `x`. Both grid and `x` being sorted, the
/// bracketing interval is found with a single forward sweep.
pub fn interpolate_onto(grid: &[Angstrom], x: &[Angstrom], y: &[Flux]) -> Vec<Flux> {
    let n = x.len().min(y.len());
    if n == 0 {
        return vec![f64::NAN; grid.len()];
    }
    let (lo, hi) = (x[0], x[n - 1]);

    let mut out = Vec::with_capacity(grid.len());
    let mut j = 0usize;
    for &g in grid {
        if g < lo || g > hi || g.is_nan() {
            out.push(f64::NAN);
            continue;
        }
        // Advance so that x[j] <= g <= x[j + 1]
        while j + 1 < n && x[j + 1] < g {
            j += 1;
        }
        if x[j] == g {
            out.push(y[j]);
        } else if j + 1 < n && x[j + 1] == g {
            out.push(y[j + 1]);
        } else {
            let t = (g - x[j]) / (x[j + 1] - x[j]);
            out.push(y[j] + t * (y[j + 1] - y[j]));
        }
    }
    out
}

/// One item after the rest-frame transform.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumRestFrame {
    pub name: String,
    pub grid: MasterGrid,
    /// Flux aligned index-for-index with `grid`, `NaN` where nothing was observed
    pub flux: Vec<Flux>,
    /// De-redshifted native wavelength axis
    pub native_wavelength: Vec<Angstrom>,
    pub native_flux: Vec<Flux>,
    pub z: Redshift,
    pub snr: f64,
    pub class: String,
    pub sub_class: String,
}

impl SpectrumRestFrame {
    /// Number of grid points without data.
    pub fn missing_count(&self) -> usize {
        self.flux.iter().filter(|f| !f.is_finite()).count()
    }
}

/// Apply the redshift correction to `raw` and resample it on `grid`.
///
/// Arguments
/// -----------------
/// * `name`: Item name, carried to the output.
/// * `raw`: The decoded spectrum.
/// * `z`: Redshift of the item.
/// * `snr`: Signal-to-noise proxy, carried unchanged.
/// * `grid`: The shared master grid.
///
/// Return
/// ----------
/// * The [`SpectrumRestFrame`], or [`SpectraError::Transform`] when `z` is degenerate or the
///   raw axes have different lengths.
///
/// See also
/// ------------
/// * [`z_factor`] – Accepted redshift range.
/// * [`interpolate_onto`] – Resampling rule.
pub fn to_rest_frame(
    name: &str,
    raw: SpectrumRaw,
    z: Redshift,
    snr: f64,
    grid: &MasterGrid,
) -> Result<SpectrumRestFrame, SpectraError> {
    if raw.wavelength.len() != raw.flux.len() {
        return Err(SpectraError::Transform(format!(
            "{name}: {} wavelengths for {} flux samples",
            raw.wavelength.len(),
            raw.flux.len()
        )));
    }

    let native_wavelength = deredshift(&raw.wavelength, z)?;
    let flux = interpolate_onto(grid, &native_wavelength, &raw.flux);

    Ok(SpectrumRestFrame {
        name: name.to_string(),
        grid: grid.clone(),
        flux,
        native_wavelength,
        native_flux: raw.flux,
        z,
        snr,
        class: raw.class,
        sub_class: raw.sub_class,
    })
}

#[cfg(test)]
mod rest_frame_test {
    use super::*;
    use approx::assert_relative_eq;

    fn raw(wavelength: Vec<f64>, flux: Vec<f64>) -> SpectrumRaw {
        SpectrumRaw {
            wavelength,
            flux,
            class: "GALAXY".into(),
            sub_class: "".into(),
        }
    }

    #[test]
    fn test_z_factor() {
        assert_eq!(z_factor(0.0).unwrap(), 1.0);
        assert_relative_eq!(z_factor(0.5).unwrap(), 1.0 / 1.5);
        assert!(z_factor(-1.0).is_err());
        assert!(z_factor(-2.0).is_err());
        assert!(z_factor(f64::NAN).is_err());
        assert!(z_factor(f64::INFINITY).is_err());
    }

    #[test]
    fn test_zero_redshift_is_identity() {
        let w = vec![3800.0, 3800.87, 3801.75, 9200.0];
        assert_eq!(deredshift(&w, 0.0).unwrap(), w);
    }

    #[test]
    fn test_interpolation_boundaries() {
        let x = [10.0, 20.0, 30.0];
        let y = [1.0, 3.0, 2.0];
        let grid = [5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 35.0];

        let out = interpolate_onto(&grid, &x, &y);
        assert!(out[0].is_nan());
        assert_eq!(out[1], 1.0);
        assert_eq!(out[2], 2.0);
        assert_eq!(out[3], 3.0);
        assert_eq!(out[4], 2.5);
        assert_eq!(out[5], 2.0);
        assert!(out[6].is_nan());
    }

    #[test]
    fn test_nan_sample_contaminates_neighbours_only() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [1.0, f64::NAN, 3.0, 4.0];
        let out = interpolate_onto(&[1.0, 1.5, 3.5, 4.0], &x, &y);
        assert_eq!(out[0], 1.0);
        assert!(out[1].is_nan());
        assert_eq!(out[2], 3.5);
        assert_eq!(out[3], 4.0);
    }

    #[test]
    fn test_to_rest_frame() {
        let grid = MasterGrid::linear(100.0, 400.0, 4).unwrap();
        let spectrum = raw(vec![200.0, 400.0, 600.0], vec![1.0, 2.0, 3.0]);

        let rf = to_rest_frame("spec-0001-50000-0001", spectrum, 1.0, 4.2, &grid).unwrap();
        assert_eq!(rf.native_wavelength, vec![100.0, 200.0, 300.0]);
        assert_eq!(rf.flux[0], 1.0);
        assert_eq!(rf.flux[1], 2.0);
        assert_eq!(rf.flux[2], 3.0);
        assert!(rf.flux[3].is_nan());
        assert_eq!(rf.missing_count(), 1);
        assert_eq!(rf.snr, 4.2);
        assert_eq!(rf.class, "GALAXY");
    }

    #[test]
    fn test_to_rest_frame_rejects_degenerate_redshift() {
        let grid = MasterGrid::linear(1.0, 2.0, 2).unwrap();
        let err = to_rest_frame("x", raw(vec![1.0, 2.0], vec![1.0, 1.0]), -1.0, 0.0, &grid)
            .unwrap_err();
        assert!(matches!(err, SpectraError::Transform(_)));
    }

    #[test]
    fn test_master_grid_validation() {
        assert!(MasterGrid::new(vec![]).is_err());
        assert!(MasterGrid::new(vec![1.0, 1.0]).is_err());
        assert!(MasterGrid::new(vec![1.0, f64::NAN]).is_err());

        let g = MasterGrid::log_linear(3.5, 1e-4, 3).unwrap();
        assert_eq!(g.len(), 3);
        assert_relative_eq!(g[2], 10f64.powf(3.5002), max_relative = 1e-12);

        let shared = g.clone();
        assert_eq!(shared.as_slice().as_ptr(), g.as_slice().as_ptr());
    }
}
