use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpectraError {
    #[error("Invalid catalog row {index}: {reason}")]
    Resolution { index: usize, reason: String },

    #[error("Unreadable catalog: {0}")]
    InvalidCatalog(String),

    #[error("Resource not found on the archive: {0}")]
    NotFound(String),

    #[error("Retrieval of {name} failed from {url} (last size: {last_size} bytes)")]
    RetrievalFailed {
        name: String,
        url: String,
        last_size: u64,
    },

    #[error("Unable to decode {path}: {reason}")]
    DecodeFailed { path: Utf8PathBuf, reason: String },

    #[error("Invalid sub-class code: {0:?}")]
    InvalidSubClass(String),

    #[error("Degenerate rest-frame transform: {0}")]
    Transform(String),

    #[error("Row {row} has no finite value, imputation is undefined")]
    ImputationUndefined { row: usize },

    #[error("No wavelength column survived the quality filter (discard fraction {0})")]
    EmptyRetainedGrid(f64),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("HTTP reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("Unable to build the worker pool: {0}")]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),
}

impl SpectraError {
    /// Build a [`SpectraError::DecodeFailed`] for `path`.
    pub(crate) fn decode(path: impl Into<Utf8PathBuf>, reason: impl ToString) -> Self {
        SpectraError::DecodeFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// `true` when the archive answered that the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            SpectraError::NotFound(_) => true,
            SpectraError::ReqwestError(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            _ => false,
        }
    }
}

impl PartialEq for SpectraError {
    fn eq(&self, other: &Self) -> bool {
        use SpectraError::*;
        match (self, other) {
            (Resolution { index: a, reason: r }, Resolution { index: b, reason: s }) => {
                a == b && r == s
            }
            (InvalidCatalog(a), InvalidCatalog(b)) => a == b,
            (NotFound(a), NotFound(b)) => a == b,
            (
                RetrievalFailed {
                    name: a, url: u, ..
                },
                RetrievalFailed {
                    name: b, url: v, ..
                },
            ) => a == b && u == v,
            (DecodeFailed { path: a, .. }, DecodeFailed { path: b, .. }) => a == b,
            (InvalidSubClass(a), InvalidSubClass(b)) => a == b,
            (Transform(a), Transform(b)) => a == b,
            (ImputationUndefined { row: a }, ImputationUndefined { row: b }) => a == b,
            (EmptyRetainedGrid(a), EmptyRetainedGrid(b)) => a == b,
            (ShapeMismatch(a), ShapeMismatch(b)) => a == b,
            (InvalidConfig(a), InvalidConfig(b)) => a == b,

            // Not comparable: same variant is enough
            (IoError(_), IoError(_)) => true,
            (CsvError(_), CsvError(_)) => true,
            (ReqwestError(_), ReqwestError(_)) => true,
            (ThreadPoolError(_), ThreadPoolError(_)) => true,

            _ => false,
        }
    }
}
