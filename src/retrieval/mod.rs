//! # Retrieval of raw spectrum files
//!
//! Makes sure the raw file of one item is present in the local cache, downloading it from the
//! archive when needed.
//!
//! ## Policy
//! -----------------
//! 1. If the destination exists and is at least `min_file_size` bytes, nothing is fetched
//!    ([`RetrievalOutcome::AlreadyPresent`]). Calling the retriever twice is therefore cheap
//!    and idempotent.
//! 2. An existing file below the threshold is a leftover of an interrupted run: it is removed
//!    and fetched again.
//! 3. Transfers go to `<file>.part`, renamed to the final name only once the size check
//!    passes, so an interrupted transfer never looks like a cached file. A `.part` left by a
//!    killed run is discarded.
//! 4. After each transfer the file size is checked. An undersized file (usually an HTML error
//!    page served with a 200 status) is deleted, the retriever sleeps `retry_backoff`, and
//!    tries again, at most `max_retries` times after the first attempt.
//! 5. When every attempt failed, the file is removed and
//!    [`SpectraError::RetrievalFailed`] carries the item name and the URL.
//!
//! A transport error on one attempt is logged and counted like an undersized transfer, except
//! a not-found answer ([`SpectraError::is_not_found`]) which fails the item at once: retrying
//! cannot make a missing file appear.
//!
//! ## Transport
//! -----------------
//! Transfers go through the [`Fetcher`] trait. [`http_fetcher::HttpFetcher`] is the
//! production implementation; tests substitute in-process fetchers.
use std::{fs, thread, time::Duration};

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};

use crate::{
    catalog::identifier::SpectrumId, config::PipelineConfig, spectra_errors::SpectraError,
};

pub mod http_fetcher;

/// Copies the resource at `url` into `dest`.
///
/// Implementations create or truncate `dest` and return the number of bytes written. They
/// are shared by all the workers of the pool, hence `Sync`.
pub trait Fetcher: Sync {
    fn fetch(&self, url: &str, dest: &Utf8Path) -> Result<u64, SpectraError>;
}

impl<F: Fetcher + ?Sized> Fetcher for &F {
    fn fetch(&self, url: &str, dest: &Utf8Path) -> Result<u64, SpectraError> {
        (**self).fetch(url, dest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalOutcome {
    /// The file was already in the cache, no transfer happened.
    AlreadyPresent,
    /// The file was downloaded; `attempts` counts every transfer including the good one.
    Downloaded { attempts: u32, bytes: u64 },
}

/// Size-checked, retrying downloader.
#[derive(Debug, Clone)]
pub struct Retriever<F> {
    fetcher: F,
    host: String,
    min_file_size: u64,
    max_retries: u32,
    retry_backoff: Duration,
}

fn file_size(path: &Utf8Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Staging path of a transfer to `dest`.
pub fn partial_path(dest: &Utf8Path) -> Utf8PathBuf {
    let mut part = dest.as_str().to_owned();
    part.push_str(".part");
    Utf8PathBuf::from(part)
}

fn remove_if_exists(path: &Utf8Path) -> Result<(), SpectraError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

impl<F: Fetcher> Retriever<F> {
    pub fn new(fetcher: F, config: &PipelineConfig) -> Self {
        Retriever {
            fetcher,
            host: config.host.clone(),
            min_file_size: config.min_file_size,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Ensure the raw file of `id` is present under the cache `root`.
    ///
    /// Arguments
    /// -----------------
    /// * `id`: Resolved identity of the item; gives both the local path and the URL.
    /// * `root`: Root of the local cache.
    ///
    /// Return
    /// ----------
    /// * The [`RetrievalOutcome`] on success.
    /// * [`SpectraError::RetrievalFailed`] once the retry budget is exhausted, or an
    ///   [`SpectraError::IoError`] if the cache directory cannot be created.
    ///
    /// See also
    /// ------------
    /// * [`SpectrumId::local_path`] / [`SpectrumId::remote_url`] – Locations used here.
    pub fn ensure_local(
        &self,
        id: &SpectrumId,
        root: &Utf8Path,
    ) -> Result<RetrievalOutcome, SpectraError> {
        let dest = id.local_path(root);

        if dest.is_file() {
            let size = file_size(&dest);
            if size >= self.min_file_size {
                debug!("{} already downloaded", id.file_name());
                return Ok(RetrievalOutcome::AlreadyPresent);
            }
            warn!(
                "{} is {size} bytes, below {}; fetching it again",
                id.file_name(),
                self.min_file_size
            );
            remove_if_exists(&dest)?;
        }

        fs::create_dir_all(id.local_dir(root))?;
        let url = id.remote_url(&self.host);
        let part = partial_path(&dest);
        if part.exists() {
            debug!("Discarding interrupted transfer {part}");
            remove_if_exists(&part)?;
        }

        let mut last_size = 0;
        for attempt in 1..=self.max_retries + 1 {
            if attempt > 1 && !self.retry_backoff.is_zero() {
                thread::sleep(self.retry_backoff);
            }

            info!("Downloading {} (attempt {attempt})", id.file_name());
            last_size = match self.fetcher.fetch(&url, &part) {
                Ok(_) => file_size(&part),
                Err(e) if e.is_not_found() => {
                    warn!("Failed : {url} ({e})");
                    remove_if_exists(&part)?;
                    return Err(SpectraError::RetrievalFailed {
                        name: id.name.clone(),
                        url,
                        last_size: 0,
                    });
                }
                Err(e) => {
                    warn!("Transfer of {url} failed: {e}");
                    0
                }
            };

            if last_size >= self.min_file_size {
                fs::rename(&part, &dest)?;
                return Ok(RetrievalOutcome::Downloaded {
                    attempts: attempt,
                    bytes: last_size,
                });
            }
            remove_if_exists(&part)?;
        }

        warn!(
            "Size of {}: {last_size}... Removing file after {} attempts",
            id.file_name(),
            self.max_retries + 1
        );
        Err(SpectraError::RetrievalFailed {
            name: id.name.clone(),
            url,
            last_size,
        })
    }
}
