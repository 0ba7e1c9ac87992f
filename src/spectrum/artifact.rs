//! Persistence of rest-frame spectra.
//!
//! One file per item, `<dir>/<name>.csv`, holding a two-row array without header:
//!
//! ```text
//! λ_0,  λ_1,  ..., λ_n
//! f_0,  f_1,  ..., f_n
//! ```
//!
//! Missing flux is written as `NaN`. Files are first written under a `.part` name and renamed
//! once complete, so a run killed mid-write never leaves a truncated artifact under the final
//! name.
use camino::{Utf8Path, Utf8PathBuf};

use crate::{
    config::ArtifactLayout,
    constants::{Angstrom, Flux, ARTIFACT_EXTENSION},
    spectra_errors::SpectraError,
    spectrum::rest_frame::SpectrumRestFrame,
};

pub fn artifact_path(dir: &Utf8Path, name: &str) -> Utf8PathBuf {
    dir.join(format!("{name}.{ARTIFACT_EXTENSION}"))
}

pub fn write_rows(
    path: &Utf8Path,
    wavelength: &[Angstrom],
    flux: &[Flux],
) -> Result<(), SpectraError> {
    if wavelength.len() != flux.len() {
        return Err(SpectraError::ShapeMismatch(format!(
            "{path}: {} wavelengths for {} flux values",
            wavelength.len(),
            flux.len()
        )));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let part = path.with_extension(format!("{ARTIFACT_EXTENSION}.part"));
    {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&part)?;
        wtr.write_record(wavelength.iter().map(|v| v.to_string()))?;
        wtr.write_record(flux.iter().map(|v| v.to_string()))?;
        wtr.flush()?;
    }
    std::fs::rename(&part, path)?;
    Ok(())
}

/// Persist `spectrum` under `dir` with the requested layout and return the file path.
pub fn write_rest_frame(
    dir: &Utf8Path,
    spectrum: &SpectrumRestFrame,
    layout: ArtifactLayout,
) -> Result<Utf8PathBuf, SpectraError> {
    let path = artifact_path(dir, &spectrum.name);
    match layout {
        ArtifactLayout::Resampled => write_rows(&path, &spectrum.grid, &spectrum.flux)?,
        ArtifactLayout::NativeRestFrame => write_rows(
            &path,
            &spectrum.native_wavelength,
            &spectrum.native_flux,
        )?,
    }
    Ok(path)
}

/// Read back a two-row artifact as `(wavelength, flux)`.
pub fn read_rows(path: &Utf8Path) -> Result<(Vec<Angstrom>, Vec<Flux>), SpectraError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)?;

    let mut rows = Vec::with_capacity(2);
    for record in rdr.records() {
        let record = record?;
        let values = record
            .iter()
            .map(|field| {
                field.trim().parse::<f64>().map_err(|_| {
                    SpectraError::ShapeMismatch(format!("{path}: {field:?} is not a number"))
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;
        rows.push(values);
    }

    match <[Vec<f64>; 2]>::try_from(rows) {
        Ok([wavelength, flux]) => Ok((wavelength, flux)),
        Err(rows) => Err(SpectraError::ShapeMismatch(format!(
            "{path}: expected 2 rows, found {}",
            rows.len()
        ))),
    }
}

#[cfg(test)]
mod artifact_test {
    use super::*;
    use crate::spectrum::rest_frame::MasterGrid;

    #[test]
    fn test_write_and_read_with_missing_values() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let path = artifact_path(dir, "spec-0266-51630-0001");

        write_rows(&path, &[1.0, 2.5, 3.0], &[f64::NAN, 0.125, -4.0]).unwrap();
        let (w, f) = read_rows(&path).unwrap();

        assert_eq!(w, vec![1.0, 2.5, 3.0]);
        assert!(f[0].is_nan());
        assert_eq!(&f[1..], &[0.125, -4.0]);
        assert!(!path.with_extension("csv.part").exists());
    }

    #[test]
    fn test_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let spectrum = SpectrumRestFrame {
            name: "spec-0001-50000-0002".into(),
            grid: MasterGrid::linear(1.0, 3.0, 3).unwrap(),
            flux: vec![1.0, 2.0, f64::NAN],
            native_wavelength: vec![0.5, 1.5],
            native_flux: vec![7.0, 8.0],
            z: 1.0,
            snr: 1.0,
            class: "STAR".into(),
            sub_class: "".into(),
        };

        let path = write_rest_frame(dir, &spectrum, ArtifactLayout::Resampled).unwrap();
        assert_eq!(path.file_name(), Some("spec-0001-50000-0002.csv"));
        assert_eq!(read_rows(&path).unwrap().0, vec![1.0, 2.0, 3.0]);

        let path = write_rest_frame(dir, &spectrum, ArtifactLayout::NativeRestFrame).unwrap();
        assert_eq!(read_rows(&path).unwrap(), (vec![0.5, 1.5], vec![7.0, 8.0]));
    }

    #[test]
    fn test_reject_mismatched_rows() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let path = artifact_path(dir, "bad");
        assert!(matches!(
            write_rows(&path, &[1.0], &[1.0, 2.0]),
            Err(SpectraError::ShapeMismatch(_))
        ));

        std::fs::write(&path, "1,2,3\n").unwrap();
        assert!(matches!(
            read_rows(&path),
            Err(SpectraError::ShapeMismatch(_))
        ));
    }
}
