//! Batch metadata table.
//!
//! One [`MetadataRow`] per catalog row, whatever happened to the item. A failed item keeps its
//! name and data release (so it can be re-run) and leaves every other data field empty.
//!
//! The persisted table is a CSV file with the header `name,z,snr,run2d,sub-class,class`;
//! `sub-class` holds the integer code of [`SubClass`] (or its raw text when it is not a
//! base-36 code) and empty cells mark missing values.
use camino::Utf8Path;
use serde::Serialize;

use crate::{
    catalog::identifier::SpectrumId, constants::Redshift, spectra_errors::SpectraError,
    spectrum::rest_frame::SpectrumRestFrame, subclass::SubClass,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataRow {
    pub name: String,
    pub z: Option<Redshift>,
    pub snr: Option<f64>,
    pub run2d: Option<String>,
    #[serde(rename = "sub-class")]
    pub sub_class: Option<SubClass>,
    pub class: Option<String>,
}

impl MetadataRow {
    pub fn success(id: &SpectrumId, spectrum: &SpectrumRestFrame, sub_class: SubClass) -> Self {
        MetadataRow {
            name: id.name.clone(),
            z: Some(spectrum.z),
            snr: Some(spectrum.snr),
            run2d: Some(id.run2d.clone()),
            sub_class: Some(sub_class),
            class: Some(spectrum.class.clone()),
        }
    }

    /// Row of an item that failed at any stage. An empty `run2d` is left missing.
    pub fn failed(name: impl Into<String>, run2d: impl Into<String>) -> Self {
        let run2d = run2d.into();
        MetadataRow {
            name: name.into(),
            z: None,
            snr: None,
            run2d: (!run2d.is_empty()).then_some(run2d),
            sub_class: None,
            class: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.class.is_none()
    }
}

/// Write `rows` as a CSV table at `path`, creating the parent directory.
pub fn write_metadata_csv(path: &Utf8Path, rows: &[MetadataRow]) -> Result<(), SpectraError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}
