//! JFrog Artifactory retrieval strategy
//!
//! Workflow packages are stored as `<uri>_<version>.tgz`. The service client
//! is built once when the strategy is constructed; a bad URL or client setup
//! fails the process at startup instead of on the first reconciliation.

use async_trait::async_trait;
use flyte_registration_core::{ArtifactorySettings, DownloadStrategy, RetrievalConfig};
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, RANGE};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

#[cfg(test)]
use mockall::automock;

use crate::error::{FetchError, FetchResult};
use crate::scratch;
use crate::ArtifactFetcher;

/// Suffix every packaged workflow is stored with
pub const PACKAGE_SUFFIX: &str = ".tgz";

/// Parameters of a single Artifactory download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadParams {
    /// Repository path of the file, relative to the Artifactory base URL
    pub pattern: String,

    /// Local file the download is written to
    pub target: PathBuf,

    /// Number of parallel range requests
    pub split_count: u32,

    /// Files smaller than this are fetched with one request
    pub min_split_size: u64,
}

/// Outcome reported by a download
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Files written to the local target
    pub downloaded: usize,
}

/// Artifactory operations used by the retrieval strategy
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ArtifactoryServices: Send + Sync {
    /// Download the file matching `params.pattern` into `params.target`.
    ///
    /// A pattern that matches nothing is reported as zero downloads, not as an error.
    async fn download_files(
        &self,
        params: &DownloadParams,
        cancel: &CancellationToken,
    ) -> FetchResult<DownloadSummary>;
}

/// Artifactory REST client authenticated with user and password
pub struct HttpArtifactoryServices {
    client: reqwest::Client,
    base_url: Url,
    user: String,
    password: SecretString,
}

impl HttpArtifactoryServices {
    /// Build the service client from the configured URL and credentials
    pub fn new(settings: &ArtifactorySettings) -> FetchResult<Self> {
        let mut base = settings.url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("flyte-registration-operator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Configuration(format!("error creating service config: {}", e)))?;

        let password = settings
            .password
            .as_ref()
            .map(|p| p.expose_secret().clone())
            .unwrap_or_default();

        Ok(Self {
            client,
            base_url,
            user: settings.user.clone(),
            password: SecretString::new(password),
        })
    }

    fn file_url(&self, pattern: &str) -> FetchResult<Url> {
        Ok(self.base_url.join(pattern.trim_start_matches('/'))?)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.user, Some(self.password.expose_secret()))
    }

    async fn download(&self, params: &DownloadParams) -> FetchResult<DownloadSummary> {
        let url = self.file_url(&params.pattern)?;

        let head = self
            .request(Method::HEAD, url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Repository(format!("querying {}: {}", params.pattern, e)))?;
        if head.status() == StatusCode::NOT_FOUND {
            warn!(pattern = %params.pattern, "no artifact matches pattern");
            return Ok(DownloadSummary::default());
        }
        let head = head
            .error_for_status()
            .map_err(|e| FetchError::Repository(format!("querying {}: {}", params.pattern, e)))?;

        let size = head
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let accepts_ranges = head
            .headers()
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("bytes"));

        if let Some(parent) = params.target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::io("creating download directory", e))?;
        }

        let ranges = if accepts_ranges {
            split_ranges(size, params.split_count, params.min_split_size)
        } else {
            Vec::new()
        };

        if ranges.len() > 1 {
            debug!(size, segments = ranges.len(), "downloading in segments");
            self.download_segments(url, &ranges, &params.target).await?;
        } else if !self.download_whole(url, &params.target).await? {
            return Ok(DownloadSummary::default());
        }

        Ok(DownloadSummary { downloaded: 1 })
    }

    /// Single-request download, `false` when the file vanished in the meantime
    async fn download_whole(&self, url: Url, target: &Path) -> FetchResult<bool> {
        let mut response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|e| FetchError::Repository(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(FetchError::Repository(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(target)
            .await
            .map_err(|e| FetchError::io("creating local file", e))?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Repository(e.to_string()))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::io("writing local file", e))?;
        }
        file.flush()
            .await
            .map_err(|e| FetchError::io("closing local file", e))?;

        Ok(true)
    }

    async fn download_segments(
        &self,
        url: Url,
        ranges: &[(u64, u64)],
        target: &Path,
    ) -> FetchResult<()> {
        let requests = ranges.iter().map(|&(start, end)| {
            let request = self
                .request(Method::GET, url.clone())
                .header(RANGE, format!("bytes={}-{}", start, end));
            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| FetchError::Repository(e.to_string()))?;
                if response.status() != StatusCode::PARTIAL_CONTENT {
                    return Err(FetchError::Repository(format!(
                        "range {}-{} answered with status {}",
                        start,
                        end,
                        response.status()
                    )));
                }
                response
                    .bytes()
                    .await
                    .map_err(|e| FetchError::Repository(e.to_string()))
            }
        });
        let segments = futures::future::try_join_all(requests).await?;

        let mut file = tokio::fs::File::create(target)
            .await
            .map_err(|e| FetchError::io("creating local file", e))?;
        for segment in segments {
            file.write_all(&segment)
                .await
                .map_err(|e| FetchError::io("writing local file", e))?;
        }
        file.flush()
            .await
            .map_err(|e| FetchError::io("closing local file", e))
    }
}

#[async_trait]
impl ArtifactoryServices for HttpArtifactoryServices {
    async fn download_files(
        &self,
        params: &DownloadParams,
        cancel: &CancellationToken,
    ) -> FetchResult<DownloadSummary> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.download(params) => result,
        };

        if let Err(e) = &result {
            // Leave no partial file behind for the next pass to trip over
            if let Err(cleanup) = scratch::remove_file_if_exists(&params.target).await {
                warn!(
                    path = %params.target.display(),
                    error = %cleanup,
                    download_error = %e,
                    "failed to remove partial download"
                );
            }
        }
        result
    }
}

/// Inclusive byte ranges for a segmented download.
///
/// Empty when the file is too small to be worth splitting.
pub fn split_ranges(size: u64, split_count: u32, min_split_size: u64) -> Vec<(u64, u64)> {
    let parts = u64::from(split_count);
    if parts < 2 || size == 0 || size < min_split_size || size < parts {
        return Vec::new();
    }

    let chunk = size / parts;
    (0..parts)
        .map(|i| {
            let start = i * chunk;
            let end = if i == parts - 1 {
                size - 1
            } else {
                start + chunk - 1
            };
            (start, end)
        })
        .collect()
}

/// Remote path of a packaged workflow: `<uri>_<version>.tgz`
pub fn package_pattern(uri: &str, version: &str) -> String {
    format!("{}_{}{}", uri, version, PACKAGE_SUFFIX)
}

/// Local file for `pattern`: `<scratch>/<folder>/<file>`, folder being the
/// last directory component of the pattern
pub fn local_target(scratch_dir: &Path, pattern: &str) -> FetchResult<PathBuf> {
    let file_name = scratch::plain_component(scratch::base_name(pattern))?;
    let folder = scratch::base_name(scratch::dir_name(pattern));

    let dir = if folder.is_empty() {
        scratch_dir.to_path_buf()
    } else {
        scratch_dir.join(scratch::plain_component(folder)?)
    };
    Ok(dir.join(file_name))
}

/// Downloads workflow packages from JFrog Artifactory
pub struct ArtifactoryFetcher {
    services: Arc<dyn ArtifactoryServices>,
    scratch_dir: PathBuf,
    split_count: u32,
    min_split_size: u64,
}

impl ArtifactoryFetcher {
    /// Set up the Artifactory service client from configuration
    pub fn new(config: &RetrievalConfig) -> FetchResult<Self> {
        let services = HttpArtifactoryServices::new(&config.artifactory)
            .map_err(|e| FetchError::Configuration(format!("failed to setup JFrog downloader: {}", e)))?;
        Ok(Self::with_services(Arc::new(services), config))
    }

    /// Use an already constructed service client
    pub fn with_services(services: Arc<dyn ArtifactoryServices>, config: &RetrievalConfig) -> Self {
        Self {
            services,
            scratch_dir: config.scratch_dir.clone(),
            split_count: config.artifactory.split_count,
            min_split_size: config.artifactory.min_split_size,
        }
    }
}

#[async_trait]
impl ArtifactFetcher for ArtifactoryFetcher {
    #[instrument(skip(self, cancel), fields(strategy = "jfrog"))]
    async fn fetch(
        &self,
        uri: &str,
        version: &str,
        cancel: &CancellationToken,
    ) -> FetchResult<PathBuf> {
        let pattern = package_pattern(uri, version);
        let target = local_target(&self.scratch_dir, &pattern)?;
        info!(artifact = uri, version, %pattern, "downloading artifact");

        scratch::remove_file_if_exists(&target).await?;

        let params = DownloadParams {
            pattern: pattern.clone(),
            target: target.clone(),
            split_count: self.split_count,
            min_split_size: self.min_split_size,
        };
        let summary = self
            .services
            .download_files(&params, cancel)
            .await
            .map_err(|e| match e {
                FetchError::Cancelled => FetchError::Cancelled,
                other => FetchError::Repository(format!("jfrog manager: downloading files: {}", other)),
            })?;

        if summary.downloaded < 1 {
            return Err(FetchError::NothingDownloaded(pattern));
        }

        info!(artifact = uri, version, path = %target.display(), "downloaded artifact");
        Ok(target)
    }

    fn strategy(&self) -> DownloadStrategy {
        DownloadStrategy::Jfrog
    }
}
