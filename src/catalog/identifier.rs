//! # Identifier resolution
//!
//! Derives, from one [`CatalogRow`], everything needed to find its raw spectrum:
//!
//! * the canonical item name `spec-<plate:04>-<mjd>-<fiberid:04>`,
//! * the archive segment `sas/<release>/<survey>/spectro/redux/<run2d>/spectra/lite/<plate:04>`,
//! * the local path `<root>/<segment>/<name>.fits`,
//! * the remote URL `https://<host>/<segment>/<name>.fits`.
//!
//! Resolution is a pure function of the row and the [`ArchiveLayout`]: the retriever relies on
//! it both to look for an existing local copy and to name the destination of a new download,
//! so two calls on the same row must produce byte-identical strings.
use std::{fmt, sync::LazyLock};

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;

use crate::{
    catalog::CatalogRow,
    config::PipelineConfig,
    constants::{ARCHIVE_HOST, ARCHIVE_RELEASE, ARCHIVE_SURVEY, RAW_FILE_EXTENSION},
    spectra_errors::SpectraError,
};

static RUN2D_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$").expect("static run2d regex"));

/// Remote archive coordinates shared by every item of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    pub host: String,
    pub release: String,
    pub survey: String,
}

impl Default for ArchiveLayout {
    fn default() -> Self {
        ArchiveLayout {
            host: ARCHIVE_HOST.to_string(),
            release: ARCHIVE_RELEASE.to_string(),
            survey: ARCHIVE_SURVEY.to_string(),
        }
    }
}

impl From<&PipelineConfig> for ArchiveLayout {
    fn from(config: &PipelineConfig) -> Self {
        ArchiveLayout {
            host: config.host.clone(),
            release: config.release.clone(),
            survey: config.survey.clone(),
        }
    }
}

/// `spec-<plate:04>-<mjd>-<fiberid:04>`, also used to label rows that fail to resolve.
pub fn item_name(row: &CatalogRow) -> String {
    format!("spec-{:04}-{}-{:04}", row.plate, row.mjd, row.fiberid)
}

/// Resolved identity of one catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpectrumId {
    /// `spec-<plate:04>-<mjd>-<fiberid:04>`
    pub name: String,
    pub run2d: String,
    /// Archive-relative directory, without leading or trailing slash.
    pub segment: String,
}

impl SpectrumId {
    /// Resolve the identity of the catalog row at `index`.
    ///
    /// Arguments
    /// -----------------
    /// * `index`: Position of the row in the catalog, only used for error reporting.
    /// * `row`: The catalog row.
    /// * `layout`: Release and survey directories of the archive.
    ///
    /// Return
    /// ----------
    /// * The resolved [`SpectrumId`], or [`SpectraError::Resolution`] if a numeric identifier
    ///   is negative or `run2d` is not a plain directory token.
    pub fn resolve(
        index: usize,
        row: &CatalogRow,
        layout: &ArchiveLayout,
    ) -> Result<Self, SpectraError> {
        for (field, value) in [("plate", row.plate), ("mjd", row.mjd), ("fiberid", row.fiberid)] {
            if value < 0 {
                return Err(SpectraError::Resolution {
                    index,
                    reason: format!("{field} must be non-negative, got {value}"),
                });
            }
        }

        let run2d = row.run2d.trim();
        if !RUN2D_RE.is_match(run2d) {
            return Err(SpectraError::Resolution {
                index,
                reason: format!("run2d {:?} is not a valid reduction tag", row.run2d),
            });
        }

        let segment = format!(
            "sas/{}/{}/spectro/redux/{}/spectra/lite/{:04}",
            layout.release, layout.survey, run2d, row.plate
        );

        Ok(SpectrumId {
            name: item_name(row),
            run2d: run2d.to_string(),
            segment,
        })
    }

    /// `<name>.fits`
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, RAW_FILE_EXTENSION)
    }

    /// Local directory holding the raw file, under the cache `root`.
    pub fn local_dir(&self, root: &Utf8Path) -> Utf8PathBuf {
        root.join(&self.segment)
    }

    pub fn local_path(&self, root: &Utf8Path) -> Utf8PathBuf {
        self.local_dir(root).join(self.file_name())
    }

    pub fn remote_url(&self, host: &str) -> String {
        format!("https://{}/{}/{}", host, self.segment, self.file_name())
    }
}

impl fmt::Display for SpectrumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod identifier_test {
    use super::*;

    fn row() -> CatalogRow {
        CatalogRow {
            plate: 266,
            mjd: 51630,
            fiberid: 7,
            run2d: "26".to_string(),
            z: 0.1,
            snr: 10.0,
        }
    }

    #[test]
    fn test_resolve_pads_plate_and_fiber() {
        let id = SpectrumId::resolve(0, &row(), &ArchiveLayout::default()).unwrap();
        assert_eq!(id.name, "spec-0266-51630-0007");
        assert_eq!(id.segment, "sas/dr16/sdss/spectro/redux/26/spectra/lite/0266");
        assert_eq!(id.file_name(), "spec-0266-51630-0007.fits");
        assert_eq!(
            id.local_path(Utf8Path::new("/data")),
            Utf8PathBuf::from(
                "/data/sas/dr16/sdss/spectro/redux/26/spectra/lite/0266/spec-0266-51630-0007.fits"
            )
        );
        let expected = concat!(
            "https://data.sdss.org/sas/dr16/sdss/spectro/redux/26/spectra/lite/0266/",
            "spec-0266-51630-0007.fits",
        );
        assert_eq!(id.remote_url("data.sdss.org"), expected);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let layout = ArchiveLayout::default();
        let mut r = row();
        r.plate = 12345;
        r.fiberid = 1000;
        r.run2d = "v5_13_0".into();

        let a = SpectrumId::resolve(3, &r, &layout).unwrap();
        let b = SpectrumId::resolve(3, &r, &layout).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.name, "spec-12345-51630-1000");
        assert_eq!(
            a.local_path(Utf8Path::new("cache")),
            b.local_path(Utf8Path::new("cache"))
        );
        assert_eq!(a.remote_url("h"), b.remote_url("h"));
    }

    #[test]
    fn test_resolve_rejects_malformed_rows() {
        let layout = ArchiveLayout::default();

        let mut r = row();
        r.fiberid = -1;
        assert!(matches!(
            SpectrumId::resolve(4, &r, &layout),
            Err(SpectraError::Resolution { index: 4, .. })
        ));

        let mut r = row();
        r.run2d = "../etc".into();
        assert!(SpectrumId::resolve(0, &r, &layout).is_err());

        let mut r = row();
        r.run2d = "..".into();
        assert!(SpectrumId::resolve(0, &r, &layout).is_err());

        let mut r = row();
        r.run2d = "".into();
        assert!(SpectrumId::resolve(0, &r, &layout).is_err());
    }
}
