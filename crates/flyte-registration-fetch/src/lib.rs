//! Artifact retrieval for the Flyte registration operator
//!
//! This crate turns an artifact identifier and version into a local file,
//! using one of two retrieval strategies:
//! - OCI registry pulls, authenticated with static credentials or exchanged
//!   ECR tokens
//! - JFrog Artifactory downloads of `<uri>_<version>.tgz` packages
//!
//! The strategy is picked once, at startup, from [`RetrievalConfig`].
//!
//! # Example
//!
//! ```rust,no_run
//! use flyte_registration_core::RetrievalConfig;
//! use flyte_registration_fetch::build_fetcher;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(config: RetrievalConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = build_fetcher(Arc::new(config))?;
//! let path = fetcher
//!     .fetch("team/workflows", "1.0.0", &CancellationToken::new())
//!     .await?;
//! println!("downloaded to {}", path.display());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use flyte_registration_core::{DownloadStrategy, RetrievalConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod artifactory;
pub mod credentials;
pub mod error;
pub mod oci;
pub mod scratch;

pub use artifactory::{
    ArtifactoryFetcher, ArtifactoryServices, DownloadParams, DownloadSummary,
    HttpArtifactoryServices,
};
pub use credentials::{
    AuthorizationTokenSource, CredentialResolver, EcrTokenSource, RegistryCredential,
};
pub use error::{FetchError, FetchResult};
pub use oci::OciFetcher;

/// A retrieval strategy
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Download `uri` at `version` and return the local path of the single
    /// file it produced.
    ///
    /// Returns [`FetchError::Cancelled`] when `cancel` fires first.
    async fn fetch(
        &self,
        uri: &str,
        version: &str,
        cancel: &CancellationToken,
    ) -> FetchResult<PathBuf>;

    /// Strategy implemented by this fetcher
    fn strategy(&self) -> DownloadStrategy;
}

/// Validate `config` and build the fetcher for its strategy
pub fn build_fetcher(config: Arc<RetrievalConfig>) -> FetchResult<Arc<dyn ArtifactFetcher>> {
    config.validate()?;

    let fetcher: Arc<dyn ArtifactFetcher> = match config.strategy {
        DownloadStrategy::Oci => {
            let credentials = CredentialResolver::for_settings(&config.oci);
            Arc::new(OciFetcher::new(Arc::clone(&config), credentials))
        }
        DownloadStrategy::Jfrog => Arc::new(ArtifactoryFetcher::new(&config)?),
    };

    info!(strategy = %fetcher.strategy(), "artifact retrieval configured");
    Ok(fetcher)
}
