//! Workflow registration through `flytectl`

use async_trait::async_trait;
use flyte_registration_core::{AdminAuth, WorkflowMetadata};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::command::CommandRunner;
use crate::error::ServiceResult;

/// Default registration binary, resolved through `PATH`
pub const DEFAULT_FLYTECTL_BINARY: &str = "flytectl";

/// Registers a downloaded workflow package with Flyte admin
#[async_trait]
pub trait WorkflowRegistrar: Send + Sync {
    async fn register(
        &self,
        archive: &Path,
        metadata: &WorkflowMetadata,
        auth: &AdminAuth,
        cancel: &CancellationToken,
    ) -> ServiceResult<()>;
}

/// Registrar that shells out to `flytectl register files`
pub struct FlytectlRegistrar {
    runner: Arc<dyn CommandRunner>,
    binary: String,
}

impl FlytectlRegistrar {
    /// Create a registrar running the default `flytectl` binary
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self::with_binary(runner, DEFAULT_FLYTECTL_BINARY)
    }

    /// Create a registrar running `binary`
    pub fn with_binary(runner: Arc<dyn CommandRunner>, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }

    /// Binary this registrar runs
    pub fn binary(&self) -> &str {
        &self.binary
    }
}

/// Argument list for `flytectl register files`
pub fn register_args(archive: &Path, metadata: &WorkflowMetadata, auth: &AdminAuth) -> Vec<String> {
    vec![
        "register".to_string(),
        "files".to_string(),
        "--archive".to_string(),
        archive.to_string_lossy().into_owned(),
        "--project".to_string(),
        metadata.project.clone(),
        "--domain".to_string(),
        metadata.domain.clone(),
        "--version".to_string(),
        metadata.version.clone(),
        "--admin.endpoint".to_string(),
        auth.endpoint.clone(),
        "--admin.authType".to_string(),
        "ClientSecret".to_string(),
        "--admin.clientId".to_string(),
        auth.client_id.clone(),
        "--admin.clientSecretEnvVar".to_string(),
        auth.client_secret_env_var.clone(),
    ]
}

#[async_trait]
impl WorkflowRegistrar for FlytectlRegistrar {
    #[instrument(
        skip(self, metadata, auth, cancel),
        fields(project = %metadata.project, domain = %metadata.domain, version = %metadata.version)
    )]
    async fn register(
        &self,
        archive: &Path,
        metadata: &WorkflowMetadata,
        auth: &AdminAuth,
        cancel: &CancellationToken,
    ) -> ServiceResult<()> {
        let args = register_args(archive, metadata, auth);

        match self.runner.run(&self.binary, &args, cancel).await {
            Ok(output) => {
                debug!(%output, "flytectl output");
                info!(archive = %archive.display(), "registered workflow package");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, output = %e.output(), "flytectl failed");
                Err(e.into())
            }
        }
    }
}
