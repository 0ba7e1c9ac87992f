//! # Batch orchestration
//!
//! Runs the per-item pipeline over a whole [`Catalog`] on a fixed-size pool of OS threads and
//! gathers one [`MetadataRow`] per catalog row.
//!
//! ## Per-item pipeline
//! -----------------
//! [`process_row`] is a pure function of one catalog row and a read-only [`ItemContext`]:
//!
//! ```text
//! CatalogRow ─▶ SpectrumId ─▶ local FITS file ─▶ SpectrumRaw ─▶ SpectrumRestFrame ─▶ artifact
//!   resolve       ensure_local     read_spectrum       to_rest_frame       write_rest_frame
//! ```
//!
//! Any error along the way is captured as an [`ItemFailure`] carrying the catalog index, the
//! item name, the data release and the typed error. Nothing raised by one item can stop the
//! batch; a catalog record that could not be read fails on its own as a
//! [`SpectraError::Resolution`] (see [`process_entry`]).
//!
//! ## Entry points
//! -----------------
//! * [`run_batch`] – Full per-item pipeline, produces a [`BatchReport`].
//! * [`run_full`] – [`run_batch`], then stacks the artifacts and applies the quality filter
//!   and imputation, writing the metadata table, the spectra matrix and the retained grid.
//! * [`download_all`] – Resolution and retrieval only.
//! * [`classify_all`] – Classification fields of already downloaded files.
//!
//! ## Concurrency
//! -----------------
//! Items are mapped one-to-one onto a [`rayon::ThreadPool`] of `n_workers` threads. Workers
//! share the catalog, the configuration, the [`MasterGrid`] and the retriever, all read-only;
//! each writes its own files whose paths derive from the item name. Results come back in
//! catalog order.
//!
//! With the `progress` feature, a live progress bar is drawn on stderr.
use std::{
    fmt,
    time::{Duration, Instant},
};

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use rayon::prelude::*;

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    catalog::{
        identifier::{item_name, ArchiveLayout, SpectrumId},
        Catalog, CatalogEntry, CatalogRow,
    },
    config::{ArtifactLayout, PipelineConfig},
    quality::{filter_and_impute, stack_artifacts, QualityReport, SpectraMatrix},
    retrieval::{Fetcher, RetrievalOutcome, Retriever},
    spectra_errors::SpectraError,
    spectrum::{
        artifact::write_rest_frame,
        decoder::{read_classification, read_spectrum, Classification},
        rest_frame::{to_rest_frame, z_factor, MasterGrid},
    },
    subclass::SubClass,
};

pub mod metadata;

pub use metadata::{write_metadata_csv, MetadataRow};

/// Read-only state shared by every worker of a batch.
pub struct ItemContext<'a, F> {
    pub config: &'a PipelineConfig,
    pub layout: ArchiveLayout,
    pub grid: &'a MasterGrid,
    pub retriever: Retriever<F>,
    rest_frame_dir: Utf8PathBuf,
}

impl<'a, F: Fetcher> ItemContext<'a, F> {
    pub fn new(config: &'a PipelineConfig, grid: &'a MasterGrid, fetcher: F) -> Self {
        ItemContext {
            config,
            layout: ArchiveLayout::from(config),
            grid,
            retriever: Retriever::new(fetcher, config),
            rest_frame_dir: config.rest_frame_dir(),
        }
    }
}

/// A successfully processed item.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedItem {
    pub index: usize,
    pub metadata: MetadataRow,
    pub artifact: Utf8PathBuf,
    pub retrieval: RetrievalOutcome,
    /// Grid points without data for this item
    pub missing: usize,
}

/// An item that failed at some stage, with enough context to re-run it.
#[derive(Debug, PartialEq)]
pub struct ItemFailure {
    pub index: usize,
    pub name: String,
    pub run2d: String,
    pub error: SpectraError,
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}: {}", self.index, self.name, self.error)
    }
}

fn process_item<F: Fetcher>(
    index: usize,
    row: &CatalogRow,
    ctx: &ItemContext<'_, F>,
) -> Result<ProcessedItem, SpectraError> {
    let id = SpectrumId::resolve(index, row, &ctx.layout)?;
    // Degenerate redshift fails before any transfer
    z_factor(row.z)?;

    let retrieval = ctx.retriever.ensure_local(&id, &ctx.config.cache_dir)?;
    let raw = read_spectrum(&id.local_path(&ctx.config.cache_dir))?;
    let sub_class = SubClass::from_text(&raw.sub_class);
    if let SubClass::Other(text) = &sub_class {
        warn!("{}: sub-class {text:?} is not a base-36 code, kept as text", id.name);
    }

    let spectrum = to_rest_frame(&id.name, raw, row.z, row.snr, ctx.grid)?;
    let artifact = write_rest_frame(&ctx.rest_frame_dir, &spectrum, ctx.config.artifact_layout)?;

    debug!(
        "{}: {} of {} grid points without data",
        id.name,
        spectrum.missing_count(),
        ctx.grid.len()
    );

    Ok(ProcessedItem {
        index,
        metadata: MetadataRow::success(&id, &spectrum, sub_class),
        artifact,
        retrieval,
        missing: spectrum.missing_count(),
    })
}

/// Run the per-item pipeline on the catalog row at `index`.
///
/// Arguments
/// -----------------
/// * `index`: Catalog index of `row`.
/// * `row`: The catalog row.
/// * `ctx`: Shared configuration, grid and retriever.
///
/// Return
/// ----------
/// * The [`ProcessedItem`], or an [`ItemFailure`] wrapping the first error met.
pub fn process_row<F: Fetcher>(
    index: usize,
    row: &CatalogRow,
    ctx: &ItemContext<'_, F>,
) -> Result<ProcessedItem, ItemFailure> {
    process_item(index, row, ctx).map_err(|error| ItemFailure {
        index,
        name: item_name(row),
        run2d: row.run2d.trim().to_string(),
        error,
    })
}

/// [`process_row`] for any catalog entry; a malformed record fails with its read error.
pub fn process_entry<F: Fetcher>(
    index: usize,
    entry: &CatalogEntry,
    ctx: &ItemContext<'_, F>,
) -> Result<ProcessedItem, ItemFailure> {
    match entry.row(index) {
        Ok(row) => process_row(index, row, ctx),
        Err(error) => Err(ItemFailure {
            index,
            name: entry.name(),
            run2d: entry.run2d().trim().to_string(),
            error,
        }),
    }
}

#[cfg(feature = "progress")]
fn progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new((total as u64).max(1));
    pb.set_style(
        ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | {per_sec} | ETA {eta_precise}",
        )
        .expect("indicatif template"),
    );
    pb.enable_steady_tick(Duration::from_millis(200));
    pb
}

/// Map `task` over `items` on a dedicated pool of `n_workers` threads, keeping input order.
fn run_on_pool<T, R, G>(n_workers: usize, items: &[T], task: G) -> Result<Vec<R>, SpectraError>
where
    T: Sync,
    R: Send,
    G: Fn(usize, &T) -> R + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n_workers)
        .thread_name(|i| format!("restspec-worker-{i}"))
        .build()?;

    #[cfg(feature = "progress")]
    let pb = progress_bar(items.len());

    let results = pool.install(|| {
        items
            .par_iter()
            .enumerate()
            .map(|(i, item)| {
                let res = task(i, item);
                #[cfg(feature = "progress")]
                pb.inc(1);
                res
            })
            .collect()
    });

    #[cfg(feature = "progress")]
    pb.finish_and_clear();

    Ok(results)
}

/// Outcome of [`run_batch`].
#[derive(Debug)]
pub struct BatchReport {
    /// One row per catalog row, in catalog order
    pub rows: Vec<MetadataRow>,
    /// Artifacts of the successful items, in catalog order
    pub artifacts: Vec<Utf8PathBuf>,
    pub failures: Vec<ItemFailure>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.rows.len() - self.failures.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Names of the failed items, to re-run them.
    pub fn failed_names(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn write_metadata_csv(&self, path: &Utf8Path) -> Result<(), SpectraError> {
        write_metadata_csv(path, &self.rows)
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} failed in {:.2}s",
            self.processed(),
            self.failed(),
            self.elapsed.as_secs_f64()
        )?;
        if f.alternate() {
            for failure in &self.failures {
                write!(f, "\n  {failure}")?;
            }
        }
        Ok(())
    }
}

/// Run the per-item pipeline over every row of `catalog`.
///
/// Arguments
/// -----------------
/// * `catalog`: Input rows; the position of a row is its catalog index.
/// * `config`: Pool size, retrieval policy, storage locations and artifact layout.
/// * `grid`: The master grid shared by every item.
/// * `fetcher`: Transport used by the retriever.
///
/// Return
/// ----------
/// * A [`BatchReport`] with one metadata row per catalog row. Per-item errors only show up
///   in [`BatchReport::failures`]; the function itself fails only when the worker pool or the
///   output directory cannot be created.
///
/// See also
/// ------------
/// * [`process_row`] – The task run for each row.
/// * [`run_full`] – Adds the quality filter pass.
pub fn run_batch<F: Fetcher>(
    catalog: &Catalog,
    config: &PipelineConfig,
    grid: &MasterGrid,
    fetcher: F,
) -> Result<BatchReport, SpectraError> {
    let start = Instant::now();
    info!(
        "Processing {} spectra on {} workers",
        catalog.len(),
        config.n_workers
    );

    let ctx = ItemContext::new(config, grid, fetcher);
    std::fs::create_dir_all(&ctx.rest_frame_dir)?;

    let results = run_on_pool(config.n_workers, catalog.entries(), |i, entry| {
        process_entry(i, entry, &ctx)
    })?;

    let mut rows = Vec::with_capacity(results.len());
    let mut artifacts = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(item) => {
                rows.push(item.metadata);
                artifacts.push(item.artifact);
            }
            Err(failure) => {
                warn!("{failure}");
                rows.push(MetadataRow::failed(&failure.name, &failure.run2d));
                failures.push(failure);
            }
        }
    }

    let report = BatchReport {
        rows,
        artifacts,
        failures,
        elapsed: start.elapsed(),
    };
    info!("Spectra saved. {report}");
    Ok(report)
}

/// Outcome of [`download_all`].
#[derive(Debug)]
pub struct DownloadReport {
    pub downloaded: usize,
    pub already_present: usize,
    pub failures: Vec<ItemFailure>,
    pub elapsed: Duration,
}

impl fmt::Display for DownloadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} downloaded, {} already present, {} failed in {:.2}s",
            self.downloaded,
            self.already_present,
            self.failures.len(),
            self.elapsed.as_secs_f64()
        )
    }
}

/// Fetch the raw file of every catalog row into the cache, without decoding anything.
pub fn download_all<F: Fetcher>(
    catalog: &Catalog,
    config: &PipelineConfig,
    fetcher: F,
) -> Result<DownloadReport, SpectraError> {
    let start = Instant::now();
    info!("*** Getting {} fits files ***", catalog.len());

    let layout = ArchiveLayout::from(config);
    let retriever = Retriever::new(fetcher, config);

    let results = run_on_pool(config.n_workers, catalog.entries(), |i, entry| {
        entry
            .row(i)
            .and_then(|row| SpectrumId::resolve(i, row, &layout))
            .and_then(|id| retriever.ensure_local(&id, &config.cache_dir))
            .map_err(|error| ItemFailure {
                index: i,
                name: entry.name(),
                run2d: entry.run2d().trim().to_string(),
                error,
            })
    })?;

    let mut report = DownloadReport {
        downloaded: 0,
        already_present: 0,
        failures: Vec::new(),
        elapsed: Duration::ZERO,
    };
    for result in results {
        match result {
            Ok(RetrievalOutcome::AlreadyPresent) => report.already_present += 1,
            Ok(RetrievalOutcome::Downloaded { .. }) => report.downloaded += 1,
            Err(failure) => {
                warn!("{failure}");
                report.failures.push(failure);
            }
        }
    }
    report.elapsed = start.elapsed();
    info!("Done! {report}");
    Ok(report)
}

/// Read the classification of every file of `paths` on a pool of `n_workers` threads.
///
/// The result is aligned with `paths`; an unreadable file only fails its own entry.
pub fn classify_all(
    paths: &[Utf8PathBuf],
    n_workers: usize,
) -> Result<Vec<Result<Classification, SpectraError>>, SpectraError> {
    run_on_pool(n_workers, paths, |_, path| read_classification(path))
}

/// Outcome of [`run_full`].
#[derive(Debug)]
pub struct FullReport {
    pub batch: BatchReport,
    pub quality: QualityReport,
    /// Filtered, imputed (and possibly normalized) spectra with their retained grid
    pub spectra: SpectraMatrix,
    /// Rows left unnormalized because their median is zero or undefined
    pub unnormalized_rows: Vec<usize>,
}

/// Full run: per-item pipeline, then quality filter and imputation over the stacked artifacts.
///
/// Writes, under `config.output_dir`, the rest-frame artifacts, the metadata table, the
/// filtered spectra matrix and the retained grid.
///
/// Return
/// ----------
/// * A [`FullReport`].
/// * [`SpectraError::InvalidConfig`] if the artifact layout is not
///   [`ArtifactLayout::Resampled`] (native axes cannot be stacked).
/// * [`SpectraError::EmptyRetainedGrid`] if the quality filter keeps no wavelength, which also
///   happens when no item succeeded.
pub fn run_full<F: Fetcher>(
    catalog: &Catalog,
    config: &PipelineConfig,
    grid: &MasterGrid,
    fetcher: F,
) -> Result<FullReport, SpectraError> {
    if config.artifact_layout != ArtifactLayout::Resampled {
        return Err(SpectraError::InvalidConfig(format!(
            "the quality pass needs {} artifacts, not {}",
            ArtifactLayout::Resampled,
            config.artifact_layout
        )));
    }

    let batch = run_batch(catalog, config, grid, fetcher)?;
    batch.write_metadata_csv(&config.metadata_path())?;

    info!(
        "Getting grid of wavelengths and spectra from {} files",
        batch.artifacts.len()
    );
    let stacked = stack_artifacts(&batch.artifacts)?;
    let (mut spectra, quality) =
        filter_and_impute(&stacked, config.discard_fraction, config.impute_method)?;

    let unnormalized_rows = if config.normalize {
        spectra.normalize_by_median()
    } else {
        Vec::new()
    };
    if !unnormalized_rows.is_empty() {
        warn!(
            "{} spectra have a zero or undefined median and were not normalized",
            unnormalized_rows.len()
        );
    }

    let (spectra_path, grid_path) = config.quality_output_paths();
    spectra.write_csv(&spectra_path, &grid_path)?;
    info!("Job finished: {spectra_path}, {grid_path}");

    Ok(FullReport {
        batch,
        quality,
        spectra,
        unnormalized_rows,
    })
}
