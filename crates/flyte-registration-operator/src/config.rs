//! Operator configuration
//!
//! This module handles hierarchical configuration loading from multiple sources:
//! - Default configuration file
//! - Environment-specific configuration file
//! - `FLYTE_OPERATOR__*` environment variables
//! - The operator's flat environment variables and command-line arguments
//!
//! The result is validated once at startup and never changes afterwards.

use clap::Args;
use config::{Config, ConfigError, Environment, File};
use flyte_registration_core::{
    AdminAuth, DownloadStrategy, OperatorError, RegistryAuthStrategy, Result as OperatorResult,
    RetrievalConfig,
};
use flyte_registration_service::DEFAULT_FLYTECTL_BINARY;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Operator configuration
#[derive(Debug, Default, Deserialize)]
pub struct OperatorConfig {
    /// Artifact retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Flyte admin settings
    #[serde(default)]
    pub admin: AdminConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Probe server settings
    #[serde(default)]
    pub probes: ProbeConfig,

    /// Controller settings
    #[serde(default)]
    pub controller: ControllerConfig,
}

/// Flyte admin configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Flyte admin endpoint (e.g. `dns:///flyte.example.com`)
    #[serde(default)]
    pub endpoint: String,

    /// OAuth client id used by `flytectl`
    #[serde(default)]
    pub client_id: String,

    /// Registration binary
    #[serde(default = "default_flytectl_binary")]
    pub flytectl_binary: String,
}

fn default_flytectl_binary() -> String {
    DEFAULT_FLYTECTL_BINARY.to_string()
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            client_id: String::new(),
            flytectl_binary: default_flytectl_binary(),
        }
    }
}

impl AdminConfig {
    /// Admin credentials handed to the registrar
    pub fn auth(&self) -> AdminAuth {
        AdminAuth::new(self.endpoint.clone(), self.client_id.clone())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON formatting
    #[serde(default)]
    pub json_format: bool,

    /// Include thread IDs
    #[serde(default)]
    pub include_thread_ids: bool,

    /// Include target module
    #[serde(default = "default_true")]
    pub include_target: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            include_thread_ids: false,
            include_target: true,
        }
    }
}

/// Probe server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// Address serving `/healthz`, `/readyz` and `/metrics`
    #[serde(default = "default_probe_address")]
    pub bind_address: String,
}

fn default_probe_address() -> String {
    "0.0.0.0:8081".to_string()
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            bind_address: default_probe_address(),
        }
    }
}

/// Controller configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Delay before a failed declaration is reconciled again
    #[serde(default = "default_requeue_after")]
    pub requeue_after_seconds: u64,
}

fn default_requeue_after() -> u64 {
    30
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            requeue_after_seconds: default_requeue_after(),
        }
    }
}

impl ControllerConfig {
    pub fn requeue_after(&self) -> Duration {
        Duration::from_secs(self.requeue_after_seconds)
    }
}

/// Flat environment variables understood by the operator
#[derive(Args, Debug, Default, Clone)]
pub struct EnvOverrides {
    /// Download strategy (`oci` or `jfrog`)
    #[arg(long, env = "DOWNLOADER_STRATEGY")]
    pub downloader_strategy: Option<String>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log format (`json` or `plain`)
    #[arg(long, env = "LOG_FORMAT")]
    pub log_format: Option<String>,

    /// JFrog Artifactory base URL
    #[arg(long, env = "JFROG_ARTIFACTORY_URL")]
    pub jfrog_artifactory_url: Option<String>,

    /// JFrog Artifactory user
    #[arg(long, env = "JFROG_USER")]
    pub jfrog_user: Option<String>,

    /// JFrog Artifactory password
    #[arg(long, env = "JFROG_PASSWORD", hide_env_values = true)]
    pub jfrog_password: Option<String>,

    /// OCI registry host
    #[arg(long, env = "OCI_REGISTRY")]
    pub oci_registry: Option<String>,

    /// OCI registry auth strategy (`static` or `ecr`)
    #[arg(long, env = "OCI_AUTH_STRATEGY")]
    pub oci_auth_strategy: Option<String>,

    /// OCI registry username (static auth)
    #[arg(long, env = "OCI_USERNAME")]
    pub oci_username: Option<String>,

    /// OCI registry password (static auth)
    #[arg(long, env = "OCI_PASSWORD", hide_env_values = true)]
    pub oci_password: Option<String>,

    /// Flyte admin endpoint
    #[arg(long, env = "FLYTE_ADMIN_ENDPOINT")]
    pub flyte_admin_endpoint: Option<String>,

    /// Flyte OAuth client id
    #[arg(long, env = "FLYTE_CLIENT_ID")]
    pub flyte_client_id: Option<String>,

    /// Directory downloads are written under
    #[arg(long, env = "SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Path of the flytectl binary
    #[arg(long, env = "FLYTECTL_BINARY")]
    pub flytectl_binary: Option<String>,

    /// Probe server bind address
    #[arg(long, env = "PROBE_BIND_ADDRESS")]
    pub probe_bind_address: Option<String>,
}

impl OperatorConfig {
    /// Load configuration from files and environment
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default configuration file (config/default.toml)
    /// 2. Environment-specific file (config/{env}.toml)
    /// 3. Environment variables (FLYTE_OPERATOR__*)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed, including unknown
    /// strategy selectors.
    pub fn load(config_dir: impl Into<PathBuf>, environment: &str) -> Result<Self, ConfigError> {
        let config_dir = config_dir.into();

        let config = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", environment))).required(false))
            // e.g., FLYTE_OPERATOR__RETRIEVAL__STRATEGY=jfrog
            .add_source(
                Environment::with_prefix("FLYTE_OPERATOR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Apply the flat environment variables on top of the loaded configuration
    pub fn apply_overrides(&mut self, overrides: &EnvOverrides) -> OperatorResult<()> {
        if let Some(strategy) = &overrides.downloader_strategy {
            self.retrieval.strategy = strategy.parse::<DownloadStrategy>()?;
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
        if let Some(format) = &overrides.log_format {
            self.logging.json_format = format.eq_ignore_ascii_case("json");
        }

        let artifactory = &mut self.retrieval.artifactory;
        if let Some(url) = &overrides.jfrog_artifactory_url {
            artifactory.url = url.clone();
        }
        if let Some(user) = &overrides.jfrog_user {
            artifactory.user = user.clone();
        }
        if let Some(password) = &overrides.jfrog_password {
            artifactory.password = Some(SecretString::new(password.clone()));
        }

        let oci = &mut self.retrieval.oci;
        if let Some(registry) = &overrides.oci_registry {
            oci.registry = registry.clone();
        }
        if let Some(strategy) = &overrides.oci_auth_strategy {
            oci.auth_strategy = strategy.parse::<RegistryAuthStrategy>()?;
        }
        if let Some(username) = &overrides.oci_username {
            oci.username = Some(username.clone());
        }
        if let Some(password) = &overrides.oci_password {
            oci.password = Some(SecretString::new(password.clone()));
        }

        if let Some(endpoint) = &overrides.flyte_admin_endpoint {
            self.admin.endpoint = endpoint.clone();
        }
        if let Some(client_id) = &overrides.flyte_client_id {
            self.admin.client_id = client_id.clone();
        }
        if let Some(binary) = &overrides.flytectl_binary {
            self.admin.flytectl_binary = binary.clone();
        }
        if let Some(dir) = &overrides.scratch_dir {
            self.retrieval.scratch_dir = dir.clone();
        }
        if let Some(address) = &overrides.probe_bind_address {
            self.probes.bind_address = address.clone();
        }

        Ok(())
    }

    /// Check everything a pass will need, failing fast at startup
    pub fn validate(&self) -> OperatorResult<()> {
        self.retrieval.validate()?;

        if self.admin.endpoint.trim().is_empty() {
            return Err(OperatorError::MissingSetting("FLYTE_ADMIN_ENDPOINT"));
        }
        if self.admin.client_id.trim().is_empty() {
            return Err(OperatorError::MissingSetting("FLYTE_CLIENT_ID"));
        }
        if self.admin.flytectl_binary.trim().is_empty() {
            return Err(OperatorError::InvalidSetting {
                name: "flytectl_binary",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}
