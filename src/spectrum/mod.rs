//! # Spectra: decoding, rest-frame transform and persisted artifacts
//!
//! Per-item spectral data flows through this module in three steps:
//!
//! ```text
//! raw FITS file ──decoder──▶ SpectrumRaw ──rest_frame──▶ SpectrumRestFrame ──artifact──▶ CSV file
//! ```
//!
//! Modules
//! -----------------
//! * [`decoder`](crate::spectrum::decoder) – Reads wavelength, flux and classification from a
//!   raw FITS file.
//! * [`rest_frame`](crate::spectrum::rest_frame) – The master grid
//!   ([`MasterGrid`](crate::spectrum::rest_frame::MasterGrid)), redshift correction and linear
//!   resampling.
//! * [`artifact`](crate::spectrum::artifact) – Two-row CSV persistence of rest-frame spectra.
//!
//! Missing values
//! -----------------
//! A flux sample that is not observed (outside the de-redshifted range of an item) or not
//! finite in the raw data is represented by `f64::NAN`. Nothing in this module replaces it:
//! that is the job of [`crate::quality`].
use crate::constants::{Angstrom, Flux};

pub mod artifact;
pub mod decoder;
pub mod rest_frame;

/// Decoded content of one raw spectrum file.
///
/// `wavelength` is strictly increasing and has the same length as `flux`; both invariants are
/// checked by [`decoder::read_spectrum`](crate::spectrum::decoder::read_spectrum).
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumRaw {
    pub wavelength: Vec<Angstrom>,
    pub flux: Vec<Flux>,
    /// Pipeline classification (`GALAXY`, `QSO`, `STAR`)
    pub class: String,
    /// Raw sub-class text, possibly empty
    pub sub_class: String,
}

impl SpectrumRaw {
    #[inline]
    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.wavelength.is_empty()
    }
}
