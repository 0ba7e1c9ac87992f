use camino::Utf8Path;
use log::debug;
use reqwest::{Client, StatusCode};
use tokio::{fs::File, io::AsyncWriteExt, runtime::Runtime};
use tokio_stream::StreamExt;

use crate::{config::PipelineConfig, retrieval::Fetcher, spectra_errors::SpectraError};

/// Download a file from a URL
/// Uses reqwest to download the file in chunks
/// and saves it to the specified path using tokio's async file I/O
/// and stream processing.
///
/// Arguments
/// ---------
/// * `client`: the shared HTTP client
/// * `url`: the URL of the file to download
/// * `path`: the path to save the downloaded file
///
/// Return
/// ------
/// * The number of bytes written
/// * [`SpectraError::NotFound`] on a 404, another error if the server answers with an
///   error status or the transfer breaks
async fn download_big_file(
    client: &Client,
    url: &str,
    path: &Utf8Path,
) -> Result<u64, SpectraError> {
    let response = client.get(url).send().await?;
    if response.status() == StatusCode::NOT_FOUND {
        return Err(SpectraError::NotFound(url.to_string()));
    }
    let response = response.error_for_status()?;

    let mut file = File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;

    debug!("Downloaded {url} ({written} bytes)");
    Ok(written)
}

/// [`Fetcher`] over HTTPS.
///
/// Owns one multi-threaded tokio runtime and one connection-pooling [`reqwest::Client`];
/// every worker thread of the batch pool blocks on the shared runtime for its own transfer.
#[derive(Debug)]
pub struct HttpFetcher {
    client: Client,
    runtime: Runtime,
}

impl HttpFetcher {
    pub fn new(config: &PipelineConfig) -> Result<Self, SpectraError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let client = Client::builder().timeout(config.http_timeout).build()?;
        Ok(HttpFetcher { client, runtime })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Utf8Path) -> Result<u64, SpectraError> {
        self.runtime
            .block_on(download_big_file(&self.client, url, dest))
    }
}

#[cfg(test)]
mod http_fetcher_test {
    use super::*;

    #[test]
    fn test_build_from_default_config() {
        let fetcher = HttpFetcher::new(&PipelineConfig::default());
        assert!(fetcher.is_ok());
    }

    #[test]
    fn test_unreachable_host_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let dest = Utf8Path::from_path(dir.path()).unwrap().join("x.fits");
        let config = PipelineConfig::builder()
            .http_timeout(std::time::Duration::from_secs(5))
            .build()
            .unwrap();
        let fetcher = HttpFetcher::new(&config).unwrap();

        // Reserved TLD, never resolves.
        let res = fetcher.fetch("https://archive.invalid/spec.fits", &dest);
        assert!(matches!(res, Err(SpectraError::ReqwestError(_))));
    }
}
