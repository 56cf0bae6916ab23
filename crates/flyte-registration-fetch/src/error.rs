//! Retrieval error types and conversions
//!
//! This module provides the error type shared by both retrieval strategies,
//! covering credential resolution, transport failures, and the checks applied
//! to what ended up on local disk.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for retrieval operations
pub type FetchResult<T> = Result<T, FetchError>;

/// Retrieval-specific errors
#[derive(Debug, Error)]
pub enum FetchError {
    /// Ambient cloud credentials could not be loaded
    #[error("failed to load AWS configuration: {0}")]
    CloudCredentials(String),

    /// The registry token exchange call failed
    #[error("failed to get ECR authorization token: {0}")]
    TokenExchange(String),

    /// The token exchange succeeded but returned no usable entry
    #[error("no ECR authorization token found")]
    NoAuthorizationData,

    /// The exchanged token is not valid base64 or UTF-8
    #[error("failed to decode ECR authorization token: {0}")]
    TokenDecode(String),

    /// The decoded token has no `user:password` separator
    #[error("invalid ECR authorization token: expected `user:password`")]
    MalformedToken,

    /// Artifact identifier cannot be mapped to a local path
    #[error("invalid artifact identifier: {0}")]
    InvalidArtifact(String),

    /// OCI registry failure
    #[error("Registry error: {0}")]
    Registry(String),

    /// Artifactory failure
    #[error("Repository error: {0}")]
    Repository(String),

    /// Registry download did not leave exactly one file behind
    #[error("expected 1 file in the downloaded directory {}, got {count}", dir.display())]
    UnexpectedFileCount { dir: PathBuf, count: usize },

    /// Artifactory reported nothing downloaded
    #[error("no files to download: {0}")]
    NothingDownloaded(String),

    /// Local filesystem failure
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Strategy could not be set up
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The pass was cancelled while downloading
    #[error("download cancelled")]
    Cancelled,

    /// Domain error from core crate
    #[error("Domain error: {0}")]
    Domain(#[from] flyte_registration_core::OperatorError),
}

impl FetchError {
    /// Wrap an I/O error with one line of context
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        FetchError::Io { context, source }
    }

    /// Check if the pass was cancelled rather than failing
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }

    /// Check if this error came from resolving registry credentials
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            FetchError::CloudCredentials(_)
                | FetchError::TokenExchange(_)
                | FetchError::NoAuthorizationData
                | FetchError::TokenDecode(_)
                | FetchError::MalformedToken
        )
    }
}

/// Convert URL parse errors
impl From<url::ParseError> for FetchError {
    fn from(err: url::ParseError) -> Self {
        FetchError::Configuration(format!("Invalid URL: {}", err))
    }
}
