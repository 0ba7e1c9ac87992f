//! # Raw spectrum decoder
//!
//! Reads an SDSS "lite" spectrum file. Only two binary tables are used:
//!
//! | HDU | extension | columns used            |
//! |-----|-----------|------------------------|
//! | 1   | `COADD`   | `loglam`, `flux`       |
//! | 2   | `SPECOBJ` | `CLASS`, `SUBCLASS`    |
//!
//! The wavelength axis is stored as `log10(λ)`; [`read_spectrum`] returns `λ = 10^loglam` in
//! Ångström. Classification fields are taken from the first row of HDU 2.
//!
//! Every failure (missing file, unreadable FITS structure, missing column, inconsistent
//! lengths) is reported as [`SpectraError::DecodeFailed`] with the offending path.
//!
//! ## Thread safety
//!
//! cfitsio keeps global state unless it was compiled reentrant, so every access to a FITS
//! file from this module goes through a process-wide lock. Decoding is a small share of the
//! per-item time next to the network transfer.
use std::sync::{Mutex, MutexGuard};

use camino::Utf8Path;
use fitsio::{hdu::FitsHdu, FitsFile};
use itertools::Itertools;
use log::debug;

use crate::{spectra_errors::SpectraError, spectrum::SpectrumRaw, subclass::SubClass};

/// HDU index of the coadded spectrum table.
pub const COADD_HDU: usize = 1;
/// HDU index of the spectroscopic object table.
pub const SPECOBJ_HDU: usize = 2;

static FITS_LOCK: Mutex<()> = Mutex::new(());

/// Process-wide guard of cfitsio. Hold it while using `fitsio` directly alongside the pipeline.
pub fn fits_lock() -> MutexGuard<'static, ()> {
    // A panic while holding the lock leaves no FITS handle open, the guard can be reused.
    FITS_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Classification fields of one spectrum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub class: String,
    pub sub_class: SubClass,
}

fn open(path: &Utf8Path) -> Result<FitsFile, SpectraError> {
    if !path.is_file() {
        return Err(SpectraError::decode(path, "file not found"));
    }
    FitsFile::open(path).map_err(|e| SpectraError::decode(path, e))
}

fn first_cell(
    hdu: &FitsHdu,
    fits: &mut FitsFile,
    path: &Utf8Path,
    column: &str,
) -> Result<String, SpectraError> {
    let values: Vec<String> = hdu
        .read_col(fits, column)
        .map_err(|e| SpectraError::decode(path, format!("column {column}: {e}")))?;
    values
        .into_iter()
        .next()
        .map(|v| v.trim().to_string())
        .ok_or_else(|| SpectraError::decode(path, format!("column {column} is empty")))
}

fn read_class_fields(
    fits: &mut FitsFile,
    path: &Utf8Path,
) -> Result<(String, String), SpectraError> {
    let hdu = fits
        .hdu(SPECOBJ_HDU)
        .map_err(|e| SpectraError::decode(path, format!("HDU {SPECOBJ_HDU}: {e}")))?;

    let class = first_cell(&hdu, fits, path, "CLASS")?;
    let sub_class = first_cell(&hdu, fits, path, "SUBCLASS")?;
    Ok((class, sub_class))
}

/// Decode the wavelength axis, flux and classification of a raw spectrum file.
///
/// Arguments
/// -----------------
/// * `path`: Location of the raw FITS file.
///
/// Return
/// ----------
/// * A [`SpectrumRaw`] whose wavelength axis is strictly increasing and as long as the flux.
/// * [`SpectraError::DecodeFailed`] otherwise.
///
/// See also
/// ------------
/// * [`read_classification`] – Reads only the classification table.
pub fn read_spectrum(path: &Utf8Path) -> Result<SpectrumRaw, SpectraError> {
    let (loglam, flux, class, sub_class) = {
        let _guard = fits_lock();
        let mut fits = open(path)?;

        let coadd = fits
            .hdu(COADD_HDU)
            .map_err(|e| SpectraError::decode(path, format!("HDU {COADD_HDU}: {e}")))?;
        let loglam: Vec<f64> = coadd
            .read_col(&mut fits, "loglam")
            .map_err(|e| SpectraError::decode(path, format!("column loglam: {e}")))?;
        let flux: Vec<f64> = coadd
            .read_col(&mut fits, "flux")
            .map_err(|e| SpectraError::decode(path, format!("column flux: {e}")))?;

        let (class, sub_class) = read_class_fields(&mut fits, path)?;
        (loglam, flux, class, sub_class)
    };

    if loglam.is_empty() {
        return Err(SpectraError::decode(path, "empty spectrum"));
    }
    if loglam.len() != flux.len() {
        return Err(SpectraError::decode(
            path,
            format!("loglam has {} samples but flux has {}", loglam.len(), flux.len()),
        ));
    }

    let wavelength: Vec<f64> = loglam.iter().map(|l| 10f64.powf(*l)).collect();
    let increasing = wavelength.iter().all(|w| w.is_finite())
        && wavelength.iter().tuple_windows().all(|(a, b)| a < b);
    if !increasing {
        return Err(SpectraError::decode(
            path,
            "wavelength axis is not finite and strictly increasing",
        ));
    }

    debug!("decoded {} ({} samples, class {class})", path, wavelength.len());

    Ok(SpectrumRaw {
        wavelength,
        flux,
        class,
        sub_class,
    })
}

/// Read only the classification table of a raw spectrum file.
pub fn read_classification(path: &Utf8Path) -> Result<Classification, SpectraError> {
    let (class, sub_class) = {
        let _guard = fits_lock();
        let mut fits = open(path)?;
        read_class_fields(&mut fits, path)?
    };

    Ok(Classification {
        class,
        sub_class: SubClass::from_text(&sub_class),
    })
}

#[cfg(test)]
pub(crate) mod fits_fixture {
    //! Writes minimal SDSS-like spectrum files for tests.
    use camino::Utf8Path;
    use fitsio::{
        tables::{ColumnDataType, ColumnDescription},
        FitsFile,
    };

    pub(crate) fn write_spectrum(
        path: &Utf8Path,
        loglam: &[f64],
        flux: &[f64],
        class: &str,
        sub_class: &str,
    ) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let _ = std::fs::remove_file(path);

        let _guard = super::fits_lock();
        let mut fits = FitsFile::create(path).open().unwrap();

        let coadd_cols = [
            ColumnDescription::new("loglam")
                .with_type(ColumnDataType::Double)
                .create()
                .unwrap(),
            ColumnDescription::new("flux")
                .with_type(ColumnDataType::Double)
                .create()
                .unwrap(),
        ];
        let coadd = fits.create_table("COADD", &coadd_cols).unwrap();
        coadd.write_col(&mut fits, "loglam", loglam).unwrap();
        coadd.write_col(&mut fits, "flux", flux).unwrap();

        let specobj_cols = [
            ColumnDescription::new("CLASS")
                .with_type(ColumnDataType::String)
                .that_repeats(32)
                .create()
                .unwrap(),
            ColumnDescription::new("SUBCLASS")
                .with_type(ColumnDataType::String)
                .that_repeats(32)
                .create()
                .unwrap(),
        ];
        let specobj = fits.create_table("SPECOBJ", &specobj_cols).unwrap();
        specobj
            .write_col(&mut fits, "CLASS", &[class.to_string()])
            .unwrap();
        specobj
            .write_col(&mut fits, "SUBCLASS", &[sub_class.to_string()])
            .unwrap();
    }
}
