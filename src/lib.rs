pub mod catalog;
pub mod config;
pub mod constants;
pub mod pipeline;
pub mod quality;
pub mod retrieval;
pub mod spectra_errors;
pub mod spectrum;
pub mod subclass;

pub use catalog::{Catalog, CatalogRow};
pub use config::{ArtifactLayout, ImputeMethod, PipelineConfig};
pub use pipeline::{download_all, run_batch, run_full, BatchReport, MetadataRow};
pub use retrieval::{http_fetcher::HttpFetcher, Fetcher};
pub use spectra_errors::SpectraError;
pub use spectrum::rest_frame::MasterGrid;
pub use subclass::SubClass;
