//! # Quality filter and imputation
//!
//! Second pass of the pipeline, run once every rest-frame artifact is on disk. It works on the
//! stacked [`SpectraMatrix`] (one row per item, one column per master-grid wavelength) and
//! removes every indefinite value in two phases:
//!
//! 1. **Column pruning** – a wavelength column is kept only when fewer than
//!    `n_items × discard_fraction` items are missing there. The grid is subset with the same
//!    mask, so the retained grid and matrix stay index-aligned.
//! 2. **Row imputation** – in each row, every remaining non-finite value is replaced by the
//!    median (or mean) of that row's finite values. The statistic is computed before the row is
//!    modified, and rows are independent of each other.
//!
//! The phases must run in this order: imputing first would let a row full of gaps feed made-up
//! values into the column statistics of every other item. [`filter_and_impute`] enforces it.
//!
//! ## Errors
//! -----------------
//! * A filter that keeps no column at all is batch-fatal:
//!   [`SpectraError::EmptyRetainedGrid`].
//! * A row without any finite value cannot be imputed. It is left untouched, logged and listed
//!   in [`ImputationReport::undefined_rows`]; [`ImputationReport::ensure_complete`] turns the
//!   first such row into [`SpectraError::ImputationUndefined`].
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use log::{info, warn};
use nalgebra::DMatrix;

use crate::{
    config::ImputeMethod,
    constants::{Angstrom, Flux},
    spectra_errors::SpectraError,
    spectrum::artifact::read_rows,
};

/// Items × wavelengths flux matrix, with the item names and the grid of its columns.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectraMatrix {
    names: Vec<String>,
    grid: Vec<Angstrom>,
    flux: DMatrix<Flux>,
}

/// Outcome of [`SpectraMatrix::impute`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImputationReport {
    /// Number of values replaced
    pub imputed_values: usize,
    /// Rows with no finite value, left untouched
    pub undefined_rows: Vec<usize>,
}

impl ImputationReport {
    pub fn ensure_complete(&self) -> Result<(), SpectraError> {
        match self.undefined_rows.first() {
            Some(&row) => Err(SpectraError::ImputationUndefined { row }),
            None => Ok(()),
        }
    }
}

/// Summary of a full [`filter_and_impute`] pass.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    pub input_columns: usize,
    pub retained_columns: usize,
    pub missing_before: usize,
    pub missing_after_pruning: usize,
    pub imputation: ImputationReport,
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kept {}/{} wavelengths, indefinite values {} -> {} -> {} imputed, {} undefined rows",
            self.retained_columns,
            self.input_columns,
            self.missing_before,
            self.missing_after_pruning,
            self.imputation.imputed_values,
            self.imputation.undefined_rows.len()
        )
    }
}

fn median_of(values: &mut [f64]) -> f64 {
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

/// Statistic of the finite entries of `values`, `None` when there is none.
fn finite_statistic<'a>(
    values: impl Iterator<Item = &'a f64>,
    method: ImputeMethod,
) -> Option<f64> {
    let mut finite: Vec<f64> = values.copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    Some(match method {
        ImputeMethod::Median => median_of(&mut finite),
        ImputeMethod::Mean => finite.iter().sum::<f64>() / finite.len() as f64,
    })
}

impl SpectraMatrix {
    pub fn new(
        names: Vec<String>,
        grid: Vec<Angstrom>,
        flux: DMatrix<Flux>,
    ) -> Result<Self, SpectraError> {
        if flux.nrows() != names.len() || flux.ncols() != grid.len() {
            return Err(SpectraError::ShapeMismatch(format!(
                "matrix is {}x{} for {} names and {} wavelengths",
                flux.nrows(),
                flux.ncols(),
                names.len(),
                grid.len()
            )));
        }
        Ok(SpectraMatrix { names, grid, flux })
    }

    /// Stack per-item flux vectors, all aligned with `grid`.
    pub fn from_rows(
        names: Vec<String>,
        grid: Vec<Angstrom>,
        rows: &[Vec<Flux>],
    ) -> Result<Self, SpectraError> {
        if let Some((i, row)) = rows.iter().find_position(|r| r.len() != grid.len()) {
            return Err(SpectraError::ShapeMismatch(format!(
                "row {i} has {} values for a grid of {}",
                row.len(),
                grid.len()
            )));
        }
        let flux = DMatrix::from_fn(rows.len(), grid.len(), |i, j| rows[i][j]);
        Self::new(names, grid, flux)
    }

    #[inline]
    pub fn n_items(&self) -> usize {
        self.flux.nrows()
    }

    #[inline]
    pub fn n_wavelengths(&self) -> usize {
        self.flux.ncols()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn grid(&self) -> &[Angstrom] {
        &self.grid
    }

    pub fn flux(&self) -> &DMatrix<Flux> {
        &self.flux
    }

    /// Number of non-finite values in each column.
    pub fn missing_per_column(&self) -> Vec<usize> {
        self.flux
            .column_iter()
            .map(|col| col.iter().filter(|v| !v.is_finite()).count())
            .collect()
    }

    pub fn missing_count(&self) -> usize {
        self.flux.iter().filter(|v| !v.is_finite()).count()
    }

    /// Keep the columns where fewer than `n_items × discard_fraction` values are missing.
    ///
    /// Arguments
    /// -----------------
    /// * `discard_fraction`: Fraction of missing items that disqualifies a column.
    ///
    /// Return
    /// ----------
    /// * A new matrix restricted to the retained columns, with the matching subset of the
    ///   grid, or [`SpectraError::EmptyRetainedGrid`] if no column is retained.
    pub fn prune_columns(&self, discard_fraction: f64) -> Result<SpectraMatrix, SpectraError> {
        let threshold = self.n_items() as f64 * discard_fraction;
        let keep: Vec<usize> = self
            .missing_per_column()
            .into_iter()
            .positions(|missing| (missing as f64) < threshold)
            .collect();

        if keep.is_empty() {
            return Err(SpectraError::EmptyRetainedGrid(discard_fraction));
        }

        let grid = keep.iter().map(|&j| self.grid[j]).collect();
        let flux = self.flux.select_columns(keep.iter());

        Ok(SpectraMatrix {
            names: self.names.clone(),
            grid,
            flux,
        })
    }

    /// Replace each non-finite value by its row's statistic of finite values.
    pub fn impute(&mut self, method: ImputeMethod) -> ImputationReport {
        let mut report = ImputationReport::default();

        for i in 0..self.n_items() {
            // Statistic of the untouched row
            let Some(fill) = finite_statistic(self.flux.row(i).iter(), method) else {
                warn!("{}: no finite flux, imputation undefined", self.names[i]);
                report.undefined_rows.push(i);
                continue;
            };

            for v in self.flux.row_mut(i).iter_mut() {
                if !v.is_finite() {
                    *v = fill;
                    report.imputed_values += 1;
                }
            }
        }

        report
    }

    /// Divide every row by its median.
    ///
    /// Rows whose median is zero or undefined are left as they are; their indices are returned.
    pub fn normalize_by_median(&mut self) -> Vec<usize> {
        let mut skipped = Vec::new();
        for i in 0..self.n_items() {
            let median = finite_statistic(self.flux.row(i).iter(), ImputeMethod::Median);
            match median {
                Some(m) if m != 0.0 => self.flux.row_mut(i).iter_mut().for_each(|v| *v /= m),
                _ => skipped.push(i),
            }
        }
        skipped
    }

    /// Write the matrix (one line per item, item name first) and its grid as two CSV files.
    pub fn write_csv(
        &self,
        spectra_path: &Utf8Path,
        grid_path: &Utf8Path,
    ) -> Result<(), SpectraError> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(spectra_path)?;
        for (name, row) in self.names.iter().zip(self.flux.row_iter()) {
            wtr.write_record(
                std::iter::once(name.clone()).chain(row.iter().map(|v| v.to_string())),
            )?;
        }
        wtr.flush()?;

        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(grid_path)?;
        wtr.write_record(self.grid.iter().map(|v| v.to_string()))?;
        wtr.flush()?;
        Ok(())
    }
}

/// Prune the columns of `matrix`, then impute its remaining gaps.
///
/// Arguments
/// -----------------
/// * `matrix`: Stacked rest-frame spectra; not modified.
/// * `discard_fraction`: See [`SpectraMatrix::prune_columns`].
/// * `method`: Row statistic used by [`SpectraMatrix::impute`].
///
/// Return
/// ----------
/// * The filtered matrix (its grid is the retained grid) and a [`QualityReport`].
/// * [`SpectraError::EmptyRetainedGrid`] if pruning keeps nothing.
pub fn filter_and_impute(
    matrix: &SpectraMatrix,
    discard_fraction: f64,
    method: ImputeMethod,
) -> Result<(SpectraMatrix, QualityReport), SpectraError> {
    let missing_before = matrix.missing_count();
    info!(
        "spectra shape before pruning: {}x{}, indefinite values: {missing_before}",
        matrix.n_items(),
        matrix.n_wavelengths()
    );

    let mut filtered = matrix.prune_columns(discard_fraction)?;
    let missing_after_pruning = filtered.missing_count();
    info!(
        "spectra shape after pruning: {}x{}, indefinite values: {missing_after_pruning}",
        filtered.n_items(),
        filtered.n_wavelengths()
    );

    let imputation = filtered.impute(method);

    let report = QualityReport {
        input_columns: matrix.n_wavelengths(),
        retained_columns: filtered.n_wavelengths(),
        missing_before,
        missing_after_pruning,
        imputation,
    };
    info!("{report}");
    Ok((filtered, report))
}

/// Load persisted resampled artifacts into a [`SpectraMatrix`].
///
/// Every artifact must carry exactly the same wavelength row; item names are the file stems.
pub fn stack_artifacts(paths: &[Utf8PathBuf]) -> Result<SpectraMatrix, SpectraError> {
    let mut grid: Option<Vec<f64>> = None;
    let mut names = Vec::with_capacity(paths.len());
    let mut rows = Vec::with_capacity(paths.len());

    for path in paths {
        let (wavelength, flux) = read_rows(path)?;
        match &grid {
            None => grid = Some(wavelength),
            Some(g) if *g == wavelength => {}
            Some(_) => {
                return Err(SpectraError::ShapeMismatch(format!(
                    "{path} is not sampled on the same grid as {}",
                    paths[0]
                )))
            }
        }
        names.push(path.file_stem().unwrap_or(path.as_str()).to_string());
        rows.push(flux);
    }

    SpectraMatrix::from_rows(names, grid.unwrap_or_default(), &rows)
}
