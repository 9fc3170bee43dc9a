use std::path::Path;
use std::sync::Arc;

use fetchlock_fs::StagedFile;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::error::{FetchError, Result};
use crate::http::HttpClient;

/// Called with the size of every body chunk written to disk.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Downloads a URL to disk with a single GET.
///
/// There is no retry and no verification here. A failed transfer removes
/// whatever was partially written.
pub struct Fetcher<C: HttpClient> {
    client:      C,
    on_progress: Option<ProgressFn>,
}

impl<C: HttpClient> Fetcher<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressFn) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Content-Length announced by a HEAD request, if any.
    pub async fn content_length(&self, url: &str) -> Result<Option<u64>> {
        validate(url)?;
        self.client
            .head(url, &request_headers(None))
            .await
            .map_err(|e| FetchError::request(url, &e))
    }

    /// Stream `url` into `destination`, returning the number of bytes written.
    ///
    /// The destination is only created once the server has answered with a
    /// success status.
    pub async fn fetch(&self, url: &str, destination: &Path, token: Option<&str>) -> Result<u64> {
        validate(url)?;
        tracing::debug!(url, destination = %destination.display(), "fetching");

        let headers = request_headers(token);
        let mut stream = self
            .client
            .stream(url, &headers)
            .await
            .map_err(|e| FetchError::request(url, &e))?;

        let io_error = |source| FetchError::Io {
            path: destination.to_path_buf(),
            source,
        };

        let written = async {
            let mut file = tokio::fs::File::create(destination).await.map_err(io_error)?;
            let mut written = 0u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| FetchError::request(url, &e))?;
                file.write_all(&chunk).await.map_err(io_error)?;
                written += chunk.len() as u64;
                if let Some(callback) = &self.on_progress {
                    callback(chunk.len() as u64);
                }
            }
            file.flush().await.map_err(io_error)?;
            Ok(written)
        }
        .await;

        if written.is_err() {
            let _ = tokio::fs::remove_file(destination).await;
        }
        written
    }

    /// Fetch into a fresh temporary file that is deleted when dropped.
    pub async fn fetch_to_temp_file(&self, url: &str, token: Option<&str>) -> Result<TempPath> {
        let temp = tempfile::Builder::new()
            .prefix("fetchlock-")
            .tempfile()
            .map_err(|source| FetchError::Io {
                path: std::env::temp_dir(),
                source,
            })?
            .into_temp_path();

        self.fetch(url, &temp, token).await?;
        Ok(temp)
    }

    /// Fetch into a staging file next to `target`, ready to be committed onto it.
    ///
    /// Staging in the target's directory keeps the final rename on one
    /// filesystem. Distinct targets never share a staging file, even when
    /// they are fetched from the same URL.
    pub async fn fetch_staged(&self, url: &str, target: &Path, token: Option<&str>) -> Result<StagedFile> {
        let dir = target.parent().unwrap_or(Path::new(""));
        let staged = StagedFile::new(dir.join(staging_name(url, target)));
        self.fetch(url, staged.path(), token).await?;
        Ok(staged)
    }
}

/// Headers sent with every request; the token becomes a bearer credential.
pub fn request_headers(token: Option<&str>) -> Vec<(String, String)> {
    let mut headers = vec![("Accept".to_string(), "*/*".to_string())];
    if let Some(token) = token {
        headers.push(("Authorization".to_string(), format!("Bearer {token}")));
    }
    headers
}

/// Hidden file name used while `url` is downloaded for `target`.
pub fn staging_name(url: &str, target: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update([0]);
    hasher.update(target.as_os_str().as_encoded_bytes());
    let digest = hex::encode(hasher.finalize());
    format!(".fetchlock-{}.part", &digest[..16])
}

fn validate(url: &str) -> Result<()> {
    Url::parse(url).map(drop).map_err(|e| FetchError::InvalidUrl {
        url:    url.to_string(),
        reason: e.to_string(),
    })
}
