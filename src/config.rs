//! # Pipeline configuration
//!
//! This module defines [`PipelineConfig`], the single value that parameterizes every stage of
//! the pipeline, and its validating fluent builder [`PipelineConfigBuilder`].
//!
//! ## Overview
//! -----------------
//! The configuration is built once, before the worker pool is launched, and then shared
//! read-only by every worker. It groups:
//!
//! * **Execution** – `n_workers`, the size of the fixed worker pool.
//! * **Retrieval** – `min_file_size`, `max_retries`, `retry_backoff`, `http_timeout`.
//! * **Archive layout** – `host`, `release`, `survey` of the remote Science Archive Server.
//! * **Storage** – `cache_dir` (raw files), `output_dir` (artifacts and metadata).
//! * **Quality filter** – `discard_fraction`, `impute_method`, `normalize`.
//! * **Artifacts** – `artifact_layout`, what the per-item rest-frame file contains.
//!
//! ## Example
//! -----------------
//! ```rust,no_run
//! use std::time::Duration;
//! use restspec::config::{ImputeMethod, PipelineConfig};
//!
//! let config = PipelineConfig::builder()
//!     .n_workers(8)
//!     .cache_dir("/data/sdss")
//!     .output_dir("/data/processed")
//!     .retry_backoff(Duration::from_millis(500))
//!     .impute_method(ImputeMethod::Mean)
//!     .build()
//!     .unwrap();
//!
//! println!("{config:#}");
//! ```
//!
//! ## Validation rules
//! -----------------
//! * `n_workers ≥ 1`
//! * `0 < discard_fraction ≤ 1`
//! * `host`, `release`, `survey` non-empty
//! * `http_timeout > 0`
use std::{fmt, str::FromStr, time::Duration};

use camino::Utf8PathBuf;

use crate::{
    constants::{
        ARCHIVE_HOST, ARCHIVE_RELEASE, ARCHIVE_SURVEY, DEFAULT_DISCARD_FRACTION,
        DEFAULT_HTTP_TIMEOUT, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BACKOFF, METADATA_FILE,
        MIN_FITS_SIZE, REST_FRAME_DIR, SPECTRA_FILE, WAVE_MASTER_FILE,
    },
    spectra_errors::SpectraError,
};

/// Statistic used to fill the missing values of one spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImputeMethod {
    #[default]
    Median,
    Mean,
}

impl FromStr for ImputeMethod {
    type Err = SpectraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "median" => Ok(ImputeMethod::Median),
            "mean" => Ok(ImputeMethod::Mean),
            other => Err(SpectraError::InvalidConfig(format!(
                "unknown imputation method {other:?} (expected median or mean)"
            ))),
        }
    }
}

impl fmt::Display for ImputeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImputeMethod::Median => write!(f, "median"),
            ImputeMethod::Mean => write!(f, "mean"),
        }
    }
}

/// Content of the per-item rest-frame artifact.
///
/// * `Resampled` – `[master grid, resampled flux]`, every artifact has the grid length and can
///   be stacked by the quality filter.
/// * `NativeRestFrame` – `[de-redshifted native wavelengths, native flux]`, lengths vary per
///   item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtifactLayout {
    #[default]
    Resampled,
    NativeRestFrame,
}

impl fmt::Display for ArtifactLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactLayout::Resampled => write!(f, "resampled"),
            ArtifactLayout::NativeRestFrame => write!(f, "native-rest-frame"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // --- Execution ---
    pub n_workers: usize,

    // --- Retrieval ---
    /// Files strictly smaller than this (bytes) are considered corrupted.
    pub min_file_size: u64,
    /// Number of re-fetches after the first undersized download.
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub http_timeout: Duration,

    // --- Archive layout ---
    pub host: String,
    pub release: String,
    pub survey: String,

    // --- Storage ---
    pub cache_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,

    // --- Quality filter ---
    pub discard_fraction: f64,
    pub impute_method: ImputeMethod,
    /// Divide every imputed spectrum by its median.
    pub normalize: bool,

    // --- Artifacts ---
    pub artifact_layout: ArtifactLayout,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new [`PipelineConfigBuilder`] initialized with the default values.
    ///
    /// See also
    /// ------------
    /// * [`PipelineConfigBuilder::build`] – Validation rules applied when finalizing.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// Directory receiving one rest-frame artifact per item.
    pub fn rest_frame_dir(&self) -> Utf8PathBuf {
        self.output_dir.join(REST_FRAME_DIR)
    }

    /// Path of the persisted metadata table.
    pub fn metadata_path(&self) -> Utf8PathBuf {
        self.output_dir.join(METADATA_FILE)
    }

    /// Paths of the filtered spectra matrix and of its retained grid.
    pub fn quality_output_paths(&self) -> (Utf8PathBuf, Utf8PathBuf) {
        (
            self.output_dir.join(SPECTRA_FILE),
            self.output_dir.join(WAVE_MASTER_FILE),
        )
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let n_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        PipelineConfig {
            n_workers,

            min_file_size: MIN_FITS_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            http_timeout: DEFAULT_HTTP_TIMEOUT,

            host: ARCHIVE_HOST.to_string(),
            release: ARCHIVE_RELEASE.to_string(),
            survey: ARCHIVE_SURVEY.to_string(),

            cache_dir: Utf8PathBuf::from("spectra"),
            output_dir: Utf8PathBuf::from("processed"),

            discard_fraction: DEFAULT_DISCARD_FRACTION,
            impute_method: ImputeMethod::Median,
            normalize: false,

            artifact_layout: ArtifactLayout::Resampled,
        }
    }
}

/// Builder for [`PipelineConfig`], with validation.
#[derive(Debug, Clone)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    pub fn n_workers(mut self, v: usize) -> Self {
        self.config.n_workers = v;
        self
    }

    // --- Retrieval ---
    pub fn min_file_size(mut self, v: u64) -> Self {
        self.config.min_file_size = v;
        self
    }
    pub fn max_retries(mut self, v: u32) -> Self {
        self.config.max_retries = v;
        self
    }
    pub fn retry_backoff(mut self, v: Duration) -> Self {
        self.config.retry_backoff = v;
        self
    }
    pub fn http_timeout(mut self, v: Duration) -> Self {
        self.config.http_timeout = v;
        self
    }

    // --- Archive layout ---
    pub fn host(mut self, v: impl Into<String>) -> Self {
        self.config.host = v.into();
        self
    }
    pub fn release(mut self, v: impl Into<String>) -> Self {
        self.config.release = v.into();
        self
    }
    pub fn survey(mut self, v: impl Into<String>) -> Self {
        self.config.survey = v.into();
        self
    }

    // --- Storage ---
    pub fn cache_dir(mut self, v: impl Into<Utf8PathBuf>) -> Self {
        self.config.cache_dir = v.into();
        self
    }
    pub fn output_dir(mut self, v: impl Into<Utf8PathBuf>) -> Self {
        self.config.output_dir = v.into();
        self
    }

    // --- Quality filter ---
    pub fn discard_fraction(mut self, v: f64) -> Self {
        self.config.discard_fraction = v;
        self
    }
    pub fn impute_method(mut self, v: ImputeMethod) -> Self {
        self.config.impute_method = v;
        self
    }
    pub fn normalize(mut self, v: bool) -> Self {
        self.config.normalize = v;
        self
    }

    pub fn artifact_layout(mut self, v: ArtifactLayout) -> Self {
        self.config.artifact_layout = v;
        self
    }

    /// Finalize the builder and produce a [`PipelineConfig`].
    ///
    /// Return
    /// ----------
    /// * The validated configuration, or [`SpectraError::InvalidConfig`] naming the first
    ///   offending field.
    pub fn build(self) -> Result<PipelineConfig, SpectraError> {
        let c = &self.config;

        if c.n_workers == 0 {
            return Err(SpectraError::InvalidConfig(
                "n_workers must be >= 1".into(),
            ));
        }
        if !(c.discard_fraction > 0.0 && c.discard_fraction <= 1.0) {
            return Err(SpectraError::InvalidConfig(
                "discard_fraction must be in (0, 1]".into(),
            ));
        }
        if c.http_timeout.is_zero() {
            return Err(SpectraError::InvalidConfig(
                "http_timeout must be > 0".into(),
            ));
        }
        if c.host.is_empty() || c.release.is_empty() || c.survey.is_empty() {
            return Err(SpectraError::InvalidConfig(
                "host, release and survey must be non-empty".into(),
            ));
        }

        Ok(self.config)
    }
}

impl fmt::Display for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 40;
            writeln!(f, "Spectra Pipeline Configuration")?;
            writeln!(f, "------------------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = if s.len() < PARAM_COL {
                        " ".repeat(PARAM_COL - s.len())
                    } else {
                        " ".to_string()
                    };
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            writeln!(f, "[Execution]")?;
            line!("n_workers = {}", self.n_workers, "size of the worker pool")?;

            writeln!(f, "[Retrieval]")?;
            line!("min_file_size = {}", self.min_file_size, "bytes")?;
            line!("max_retries = {}", self.max_retries, "re-fetches after the first try")?;
            line!("retry_backoff = {:?}", self.retry_backoff, "pause between attempts")?;
            line!("http_timeout = {:?}", self.http_timeout, "per transfer")?;

            writeln!(f, "[Archive]")?;
            line!("host = {}", self.host, "remote server")?;
            line!("release = {}", self.release, "data release")?;
            line!("survey = {}", self.survey, "survey directory")?;

            writeln!(f, "[Storage]")?;
            line!("cache_dir = {}", self.cache_dir, "raw FITS files")?;
            line!("output_dir = {}", self.output_dir, "artifacts and metadata")?;

            writeln!(f, "[Quality filter]")?;
            line!("discard_fraction = {}", self.discard_fraction, "column pruning threshold")?;
            line!("impute_method = {}", self.impute_method, "row statistic")?;
            line!("normalize = {}", self.normalize, "divide rows by their median")?;

            writeln!(f, "[Artifacts]")?;
            line!("artifact_layout = {}", self.artifact_layout, "rest-frame file content")?;
            Ok(())
        } else {
            write!(
                f,
                "PipelineConfig(n_workers={}, min_file_size={}, max_retries={}, ",
                self.n_workers, self.min_file_size, self.max_retries,
            )?;
            write!(
                f,
                "discard_fraction={}, impute={})",
                self.discard_fraction, self.impute_method
            )
        }
    }
}
