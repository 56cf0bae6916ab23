//! Retrieval settings
//!
//! Loaded once at startup and shared read-only (behind an `Arc`) with every
//! artifact download. Secrets are wrapped in [`SecretString`] so they never
//! show up in `Debug` output or logs.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::PathBuf;
use url::Url;

use crate::error::{OperatorError, Result};
use crate::strategy::{DownloadStrategy, RegistryAuthStrategy};

/// Default number of parallel segments for Artifactory downloads
pub const DEFAULT_SPLIT_COUNT: u32 = 2;

/// Default minimum size in bytes before an Artifactory download is split
pub const DEFAULT_MIN_SPLIT_SIZE: u64 = 7168;

/// Process-wide artifact retrieval configuration
#[derive(Debug, Deserialize)]
pub struct RetrievalConfig {
    /// Active download strategy
    #[serde(default)]
    pub strategy: DownloadStrategy,

    /// OCI registry settings
    #[serde(default)]
    pub oci: OciSettings,

    /// JFrog Artifactory settings
    #[serde(default)]
    pub artifactory: ArtifactorySettings,

    /// Directory downloads are written under
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            strategy: DownloadStrategy::default(),
            oci: OciSettings::default(),
            artifactory: ArtifactorySettings::default(),
            scratch_dir: default_scratch_dir(),
        }
    }
}

impl RetrievalConfig {
    /// Check the settings required by the active strategy
    ///
    /// Settings of the inactive strategy are ignored.
    pub fn validate(&self) -> Result<()> {
        if self.scratch_dir.as_os_str().is_empty() {
            return Err(OperatorError::MissingSetting("scratch_dir"));
        }

        match self.strategy {
            DownloadStrategy::Oci => self.oci.validate(),
            DownloadStrategy::Jfrog => self.artifactory.validate(),
        }
    }
}

/// OCI registry settings
#[derive(Debug, Default, Deserialize)]
pub struct OciSettings {
    /// Registry host, optionally with a port (e.g. `123456789.dkr.ecr.eu-west-2.amazonaws.com`)
    #[serde(default)]
    pub registry: String,

    /// How registry credentials are obtained
    #[serde(default)]
    pub auth_strategy: RegistryAuthStrategy,

    /// Username for the static auth strategy
    #[serde(default)]
    pub username: Option<String>,

    /// Password for the static auth strategy
    #[serde(default)]
    pub password: Option<SecretString>,

    /// AWS region override for the ECR auth strategy
    #[serde(default)]
    pub region: Option<String>,

    /// Talk plain HTTP to the registry (local development registries only)
    #[serde(default)]
    pub insecure: bool,
}

impl OciSettings {
    pub fn validate(&self) -> Result<()> {
        if self.registry.trim().is_empty() {
            return Err(OperatorError::MissingSetting("OCI_REGISTRY"));
        }

        if self.auth_strategy == RegistryAuthStrategy::Static {
            if self.username.as_deref().map_or(true, str::is_empty) {
                return Err(OperatorError::MissingSetting("OCI_USERNAME"));
            }
            let password_set = self
                .password
                .as_ref()
                .is_some_and(|p| !p.expose_secret().is_empty());
            if !password_set {
                return Err(OperatorError::MissingSetting("OCI_PASSWORD"));
            }
        }

        Ok(())
    }
}

/// JFrog Artifactory settings
#[derive(Debug, Deserialize)]
pub struct ArtifactorySettings {
    /// Artifactory base URL (e.g. `https://example.jfrog.io/artifactory`)
    #[serde(default)]
    pub url: String,

    /// Artifactory user
    #[serde(default)]
    pub user: String,

    /// Artifactory password or API key
    #[serde(default)]
    pub password: Option<SecretString>,

    /// Number of parallel range requests per download
    #[serde(default = "default_split_count")]
    pub split_count: u32,

    /// Files smaller than this are downloaded in a single request
    #[serde(default = "default_min_split_size")]
    pub min_split_size: u64,
}

fn default_split_count() -> u32 {
    DEFAULT_SPLIT_COUNT
}

fn default_min_split_size() -> u64 {
    DEFAULT_MIN_SPLIT_SIZE
}

impl Default for ArtifactorySettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            user: String::new(),
            password: None,
            split_count: default_split_count(),
            min_split_size: default_min_split_size(),
        }
    }
}

impl ArtifactorySettings {
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(OperatorError::MissingSetting("JFROG_ARTIFACTORY_URL"));
        }
        Url::parse(&self.url).map_err(|e| OperatorError::InvalidSetting {
            name: "JFROG_ARTIFACTORY_URL",
            reason: e.to_string(),
        })?;

        if self.user.is_empty() {
            return Err(OperatorError::MissingSetting("JFROG_USER"));
        }
        if self.password.is_none() {
            return Err(OperatorError::MissingSetting("JFROG_PASSWORD"));
        }

        if self.split_count == 0 {
            return Err(OperatorError::InvalidSetting {
                name: "split_count",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}
