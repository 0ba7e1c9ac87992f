//! # Catalog: input rows and their identifiers
//!
//! The catalog is the read-only input of the pipeline: one [`CatalogRow`] per observed object,
//! in a fixed order that defines the **catalog index** used for traceability in the batch
//! report.
//!
//! Modules
//! -----------------
//! * [`identifier`](crate::catalog::identifier) – Canonical item names, archive segments, local
//!   paths and remote URLs derived from a row.
//!
//! Columns
//! -----------------
//! | column     | type   | notes                                   |
//! |------------|--------|-----------------------------------------|
//! | `plate`    | int    | zero-padded to 4 digits in paths        |
//! | `mjd`      | int    | modified Julian date of the observation |
//! | `fiberid`  | int    | zero-padded to 4 digits in paths        |
//! | `run2d`    | string | 2D reduction tag                        |
//! | `z`        | float  | redshift                                |
//! | `snMedian` | float  | signal-to-noise proxy (alias `snr`)     |
//!
//! Extra columns in the CSV header are ignored.
//!
//! Malformed rows
//! -----------------
//! A record whose fields cannot be read (e.g. `plate = abc`) does not abort the load: it is
//! kept at its position as a [`MalformedRow`] and fails on its own in the batch, with a
//! [`SpectraError::Resolution`]. A header missing a required column fails the whole load.
use std::io::Read;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::{constants::Redshift, spectra_errors::SpectraError};

pub mod identifier;

const REQUIRED_COLUMNS: [&str; 5] = ["plate", "mjd", "fiberid", "run2d", "z"];
const SNR_COLUMNS: [&str; 2] = ["snMedian", "snr"];

/// One observed object of the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub plate: i64,
    pub mjd: i64,
    pub fiberid: i64,
    pub run2d: String,
    pub z: Redshift,
    #[serde(rename = "snMedian", alias = "snr")]
    pub snr: f64,
}

/// Identifier cells of a record, read as plain text.
#[derive(Debug, Default, Deserialize)]
struct RawIdentifiers {
    #[serde(default)]
    plate: String,
    #[serde(default)]
    mjd: String,
    #[serde(default)]
    fiberid: String,
    #[serde(default)]
    run2d: String,
}

fn pad4(cell: &str) -> String {
    match cell.parse::<i64>() {
        Ok(v) => format!("{v:04}"),
        Err(_) => cell.to_string(),
    }
}

/// A catalog record that could not be read as a [`CatalogRow`].
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedRow {
    /// Best-effort item name built from the raw identifier cells
    pub name: String,
    pub run2d: String,
    pub reason: String,
}

impl MalformedRow {
    fn from_record(
        record: &csv::StringRecord,
        headers: &csv::StringRecord,
        reason: String,
    ) -> Self {
        let raw: RawIdentifiers = record.deserialize(Some(headers)).unwrap_or_default();
        MalformedRow {
            name: format!("spec-{}-{}-{}", pad4(&raw.plate), raw.mjd, pad4(&raw.fiberid)),
            run2d: raw.run2d,
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEntry {
    Row(CatalogRow),
    Malformed(MalformedRow),
}

impl CatalogEntry {
    /// Item name used in reports, available even for malformed records.
    pub fn name(&self) -> String {
        match self {
            CatalogEntry::Row(row) => identifier::item_name(row),
            CatalogEntry::Malformed(m) => m.name.clone(),
        }
    }

    pub fn run2d(&self) -> &str {
        match self {
            CatalogEntry::Row(row) => &row.run2d,
            CatalogEntry::Malformed(m) => &m.run2d,
        }
    }

    /// The row, or a [`SpectraError::Resolution`] for the entry at `index`.
    pub fn row(&self, index: usize) -> Result<&CatalogRow, SpectraError> {
        match self {
            CatalogEntry::Row(row) => Ok(row),
            CatalogEntry::Malformed(m) => Err(SpectraError::Resolution {
                index,
                reason: m.reason.clone(),
            }),
        }
    }
}

/// Ordered, immutable collection of [`CatalogEntry`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

fn check_header(headers: &csv::StringRecord) -> Result<(), SpectraError> {
    let has = |name: &str| headers.iter().any(|h| h == name);
    if let Some(missing) = REQUIRED_COLUMNS.into_iter().find(|c| !has(*c)) {
        return Err(SpectraError::InvalidCatalog(format!("missing column {missing:?}")));
    }
    if !SNR_COLUMNS.into_iter().any(|c| has(c)) {
        return Err(SpectraError::InvalidCatalog(
            "missing signal-to-noise column (snMedian or snr)".into(),
        ));
    }
    Ok(())
}

impl Catalog {
    /// Catalog made of well-formed rows only.
    pub fn from_rows(rows: Vec<CatalogRow>) -> Self {
        rows.into_iter().collect()
    }

    /// Read a catalog from any CSV source with a header line.
    ///
    /// Arguments
    /// -----------------
    /// * `reader`: CSV content, the header must name at least the required columns.
    ///
    /// Return
    /// ----------
    /// * The catalog in file order; unreadable records are kept as
    ///   [`CatalogEntry::Malformed`].
    /// * [`SpectraError::InvalidCatalog`] if a required column is missing, or
    ///   [`SpectraError::CsvError`] if the CSV structure itself is broken.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, SpectraError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = rdr.headers()?.clone();
        check_header(&headers)?;

        let mut entries = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let entry = match record.deserialize::<CatalogRow>(Some(&headers)) {
                Ok(row) => CatalogEntry::Row(row),
                Err(e) => CatalogEntry::Malformed(MalformedRow::from_record(
                    &record,
                    &headers,
                    e.to_string(),
                )),
            };
            entries.push(entry);
        }
        Ok(Catalog { entries })
    }

    pub fn from_csv_path(path: &Utf8Path) -> Result<Self, SpectraError> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    /// Number of entries, malformed ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The well-formed row at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&CatalogRow> {
        match self.entries.get(index) {
            Some(CatalogEntry::Row(row)) => Some(row),
            _ => None,
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Well-formed rows, in catalog order.
    pub fn rows(&self) -> impl Iterator<Item = &CatalogRow> {
        self.entries.iter().filter_map(|e| match e {
            CatalogEntry::Row(row) => Some(row),
            CatalogEntry::Malformed(_) => None,
        })
    }

    /// Malformed records with their catalog index.
    pub fn malformed(&self) -> impl Iterator<Item = (usize, &MalformedRow)> {
        self.entries.iter().enumerate().filter_map(|(i, e)| match e {
            CatalogEntry::Malformed(m) => Some((i, m)),
            CatalogEntry::Row(_) => None,
        })
    }
}

impl FromIterator<CatalogRow> for Catalog {
    fn from_iter<I: IntoIterator<Item = CatalogRow>>(iter: I) -> Self {
        Catalog {
            entries: iter.into_iter().map(CatalogEntry::Row).collect(),
        }
    }
}
