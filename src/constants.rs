//! # Constants and type definitions for restspec
//!
//! This module centralizes the **archive constants**, **pipeline defaults**, and **common type
//! aliases** used throughout the crate.
//!
//! ## Overview
//!
//! - SDSS Science Archive Server layout (host, data release, survey)
//! - Defaults for retrieval (minimum valid file size, retry budget, backoff)
//! - Defaults for the quality filter (discard fraction)
//! - The sub-class sentinel used for unclassified objects
//!
//! These definitions are used by the resolver, the retriever, the quality filter and the
//! configuration builder.

use std::time::Duration;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Wavelength in Ångström
pub type Angstrom = f64;

/// Flux density in the archive's native units (1e-17 erg/s/cm²/Å for SDSS)
pub type Flux = f64;

/// Redshift (dimensionless)
pub type Redshift = f64;

// -------------------------------------------------------------------------------------------------
// Archive layout
// -------------------------------------------------------------------------------------------------

/// Host serving the SDSS Science Archive Server
pub const ARCHIVE_HOST: &str = "data.sdss.org";

/// Data release directory under `sas/`
pub const ARCHIVE_RELEASE: &str = "dr16";

/// Survey directory under the release
pub const ARCHIVE_SURVEY: &str = "sdss";

/// Extension of the raw spectrum files
pub const RAW_FILE_EXTENSION: &str = "fits";

/// Extension of the persisted rest-frame artifacts
pub const ARTIFACT_EXTENSION: &str = "csv";

/// Sub-directory of the output directory holding rest-frame artifacts
pub const REST_FRAME_DIR: &str = "rest_frame";

/// File name of the persisted metadata table
pub const METADATA_FILE: &str = "metadata.csv";

/// Filtered and imputed spectra matrix written by the full run
pub const SPECTRA_FILE: &str = "spectra.csv";

/// Retained master grid matching [`SPECTRA_FILE`]
pub const WAVE_MASTER_FILE: &str = "wave_master.csv";

// -------------------------------------------------------------------------------------------------
// Retrieval defaults
// -------------------------------------------------------------------------------------------------

/// A "lite" spectrum below this size (bytes) is an error page or a truncated transfer
pub const MIN_FITS_SIZE: u64 = 60_000;

/// Number of re-fetches attempted after the first undersized download
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Pause between two download attempts
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Global timeout of one HTTP transfer
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

// -------------------------------------------------------------------------------------------------
// Quality filter defaults
// -------------------------------------------------------------------------------------------------

/// A wavelength column is discarded when at least this fraction of items is missing there
pub const DEFAULT_DISCARD_FRACTION: f64 = 0.1;

// -------------------------------------------------------------------------------------------------
// Sub-classification
// -------------------------------------------------------------------------------------------------

/// Base-36 code substituted for an empty sub-class string
pub const UNCLASSIFIED_CODE_STR: &str = "EC";

/// Numeric value of [`UNCLASSIFIED_CODE_STR`] (`14 * 36 + 12`)
pub const UNCLASSIFIED_CODE: u128 = 516;
