#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    fs,
    sync::atomic::{AtomicUsize, Ordering},
};

use camino::{Utf8Path, Utf8PathBuf};
use fitsio::{
    tables::{ColumnDataType, ColumnDescription},
    FitsFile,
};
use restspec::{spectrum::decoder::fits_lock, CatalogRow, Fetcher, SpectraError};

/// Bytes written by [`ArchiveFake`] for an item served as an error page.
pub const ERROR_PAGE_SIZE: usize = 100;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn utf8_dir(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
}

pub fn row(plate: i64, fiberid: i64, z: f64) -> CatalogRow {
    CatalogRow {
        plate,
        mjd: 51630,
        fiberid,
        run2d: "26".into(),
        z,
        snr: 15.5,
    }
}

/// `n` log-spaced samples starting at `log_start`, the SDSS native sampling.
pub fn loglam(log_start: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| log_start + 1e-4 * i as f64).collect()
}

/// Write a minimal SDSS "lite" spectrum: COADD (loglam, flux) then SPECOBJ (CLASS, SUBCLASS).
pub fn write_spectrum(
    path: &Utf8Path,
    loglam: &[f64],
    flux: &[f64],
    class: &str,
    sub_class: &str,
) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let _ = fs::remove_file(path);

    let _guard = fits_lock();
    let mut fits = FitsFile::create(path).open().unwrap();

    let double = |name: &str| {
        ColumnDescription::new(name)
            .with_type(ColumnDataType::Double)
            .create()
            .unwrap()
    };
    let text = |name: &str| {
        ColumnDescription::new(name)
            .with_type(ColumnDataType::String)
            .that_repeats(32)
            .create()
            .unwrap()
    };

    let coadd = fits
        .create_table("COADD", &[double("loglam"), double("flux")])
        .unwrap();
    coadd.write_col(&mut fits, "loglam", loglam).unwrap();
    coadd.write_col(&mut fits, "flux", flux).unwrap();

    let specobj = fits
        .create_table("SPECOBJ", &[text("CLASS"), text("SUBCLASS")])
        .unwrap();
    specobj
        .write_col(&mut fits, "CLASS", &[class.to_string()])
        .unwrap();
    specobj
        .write_col(&mut fits, "SUBCLASS", &[sub_class.to_string()])
        .unwrap();
}

/// In-process stand-in for the archive server.
///
/// Items are keyed by name (the requested file name up to its first dot). Known items are
/// copied from their fixture, items marked as broken always answer with a small error page,
/// anything else is a transport error.
#[derive(Default)]
pub struct ArchiveFake {
    files: HashMap<String, Utf8PathBuf>,
    broken: HashSet<String>,
    calls: AtomicUsize,
}

impl ArchiveFake {
    pub fn serve(mut self, name: &str, fixture: Utf8PathBuf) -> Self {
        self.files.insert(name.to_string(), fixture);
        self
    }

    pub fn broken(mut self, name: &str) -> Self {
        self.broken.insert(name.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fetcher for ArchiveFake {
    fn fetch(&self, url: &str, dest: &Utf8Path) -> Result<u64, SpectraError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = dest
            .file_name()
            .and_then(|n| n.split('.').next())
            .unwrap_or_default();

        if self.broken.contains(name) {
            fs::write(dest, vec![b'x'; ERROR_PAGE_SIZE])?;
            return Ok(ERROR_PAGE_SIZE as u64);
        }
        match self.files.get(name) {
            Some(fixture) => Ok(fs::copy(fixture, dest)?),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("no route to {url}"),
            )
            .into()),
        }
    }
}
