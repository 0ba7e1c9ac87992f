use std::{fmt::Write as _, time::Duration};

use restspec::{
    quality::{filter_and_impute, stack_artifacts},
    run_full, Catalog, ImputeMethod, MasterGrid, PipelineConfig, SpectraError,
};

mod common;
use common::{init_logger, loglam, utf8_dir, write_spectrum, ArchiveFake};

const N_ITEMS: usize = 10;

fn name(fiberid: usize) -> String {
    format!("spec-0500-51630-{fiberid:04}")
}

/// Ten items observed from 3900 Å, except the last which starts at 4495 Å.
/// Item `i` has a constant flux of `i + 1`.
fn archive(root: &camino::Utf8Path) -> ArchiveFake {
    let mut archive = ArchiveFake::default();
    for i in 0..N_ITEMS {
        let (start, n) = if i == N_ITEMS - 1 {
            (4495f64.log10(), 800)
        } else {
            (3900f64.log10(), 1200)
        };
        let path = root.join(format!("fixtures/{i}.fits"));
        write_spectrum(&path, &loglam(start, n), &vec![(i + 1) as f64; n], "GALAXY", "");
        archive = archive.serve(&name(i + 1), path);
    }
    archive
}

fn catalog_csv(root: &camino::Utf8Path) -> camino::Utf8PathBuf {
    let mut content = String::from("plate,mjd,fiberid,run2d,z,snMedian,specobjid\n");
    for i in 1..=N_ITEMS {
        writeln!(content, "500, 51630, {i}, v5_13_0, 0.0, {}.5, 42", 10 + i).unwrap();
    }
    let path = root.join("catalog.csv");
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_full_run_prunes_imputes_and_writes() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);

    let archive = archive(&root);
    let catalog = Catalog::from_csv_path(&catalog_csv(&root)).unwrap();
    assert_eq!(catalog.len(), N_ITEMS);
    let first = catalog.get(0).unwrap();
    assert_eq!(first.run2d, "v5_13_0");
    assert_eq!(first.snr, 11.5);

    let config = PipelineConfig::builder()
        .n_workers(4)
        .min_file_size(5_000)
        .retry_backoff(Duration::ZERO)
        .cache_dir(root.join("cache"))
        .output_dir(root.join("processed"))
        .normalize(true)
        .build()
        .unwrap();
    let grid = MasterGrid::linear(4000.0, 5000.0, 101).unwrap();

    let report = run_full(&catalog, &config, &grid, &archive).unwrap();
    assert_eq!(report.batch.failed(), 0);

    // The last item misses 4000..=4490 Å: 1 of 10 is not below 10 × 0.1
    assert_eq!(report.quality.input_columns, 101);
    assert_eq!(report.quality.retained_columns, 51);
    assert_eq!(report.quality.missing_before, 50);
    assert_eq!(report.quality.missing_after_pruning, 0);
    assert_eq!(report.spectra.grid()[0], 4500.0);
    assert_eq!(report.spectra.grid().len(), report.spectra.n_wavelengths());
    assert_eq!(report.spectra.n_items(), N_ITEMS);

    // Constant rows normalize to one
    assert!(report.unnormalized_rows.is_empty());
    assert!(report.spectra.flux().iter().all(|v| *v == 1.0));

    let (spectra_path, grid_path) = config.quality_output_paths();
    let wave_master = std::fs::read_to_string(grid_path).unwrap();
    assert_eq!(wave_master.lines().count(), 1);
    assert_eq!(wave_master.trim().split(',').count(), 51);

    let spectra = std::fs::read_to_string(spectra_path).unwrap();
    let lines: Vec<&str> = spectra.lines().collect();
    assert_eq!(lines.len(), N_ITEMS);
    assert!(lines[0].starts_with("spec-0500-51630-0001,1,"));
    assert_eq!(lines[0].split(',').count(), 52);

    let metadata = std::fs::read_to_string(config.metadata_path()).unwrap();
    assert_eq!(metadata.lines().count(), N_ITEMS + 1);

    // Same artifacts with a looser threshold: nothing is pruned, the gap is imputed
    let stacked = stack_artifacts(&report.batch.artifacts).unwrap();
    assert_eq!(stacked.names()[N_ITEMS - 1], name(N_ITEMS));
    let (loose, quality) = filter_and_impute(&stacked, 0.25, ImputeMethod::Mean).unwrap();
    assert_eq!(quality.retained_columns, 101);
    assert_eq!(quality.imputation.imputed_values, 50);
    assert!(quality.imputation.undefined_rows.is_empty());
    assert!(loose.flux().row(N_ITEMS - 1).iter().all(|v| *v == 10.0));
    assert_eq!(loose.missing_count(), 0);
}

#[test]
fn test_full_run_without_any_success_is_fatal() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);

    let archive = ArchiveFake::default().broken(&name(1)).broken(&name(2));
    let catalog: Catalog = [1, 2]
        .into_iter()
        .map(|fiberid| common::row(500, fiberid, 0.1))
        .collect();

    let config = PipelineConfig::builder()
        .n_workers(2)
        .min_file_size(5_000)
        .max_retries(1)
        .retry_backoff(Duration::ZERO)
        .cache_dir(root.join("cache"))
        .output_dir(root.join("processed"))
        .build()
        .unwrap();
    let grid = MasterGrid::linear(4000.0, 5000.0, 11).unwrap();

    let err = run_full(&catalog, &config, &grid, &archive).unwrap_err();
    assert_eq!(err, SpectraError::EmptyRetainedGrid(0.1));

    // The metadata table is written before the quality pass
    let metadata = std::fs::read_to_string(config.metadata_path()).unwrap();
    assert_eq!(metadata.lines().count(), 3);
    assert_eq!(archive.calls(), 4);
}
