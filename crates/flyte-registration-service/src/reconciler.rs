//! Reconciliation of a single `FlyteRegistration`
//!
//! A pass reads the declaration by key, downloads the artifact it names with
//! the configured retrieval strategy, and registers the downloaded package.
//! Passes are stateless and hold nothing but immutable collaborators, so the
//! host loop may run them concurrently for different keys.

use async_trait::async_trait;
use flyte_registration_core::{AdminAuth, DeclarationKey, FlyteRegistration, WorkflowMetadata};
use flyte_registration_fetch::ArtifactFetcher;
use kube::{Api, Client};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::ServiceResult;
use crate::registrar::WorkflowRegistrar;

/// Read access to declarations by key
#[async_trait]
pub trait DeclarationSource: Send + Sync {
    /// The declaration stored under `key`, or `None` when it no longer exists
    async fn get(&self, key: &DeclarationKey) -> ServiceResult<Option<FlyteRegistration>>;
}

/// Reads declarations from the Kubernetes API
#[derive(Clone)]
pub struct KubeDeclarationSource {
    client: Client,
}

impl KubeDeclarationSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeclarationSource for KubeDeclarationSource {
    async fn get(&self, key: &DeclarationKey) -> ServiceResult<Option<FlyteRegistration>> {
        let api: Api<FlyteRegistration> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }
}

/// Result of a pass that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The declaration is gone; nothing was done
    NotFound,

    /// The package was downloaded to `archive` and registered
    Registered {
        archive: PathBuf,
        metadata: WorkflowMetadata,
    },
}

/// Drives one reconciliation pass per call
pub struct Reconciler {
    source: Arc<dyn DeclarationSource>,
    fetcher: Arc<dyn ArtifactFetcher>,
    registrar: Arc<dyn WorkflowRegistrar>,
    admin: AdminAuth,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn DeclarationSource>,
        fetcher: Arc<dyn ArtifactFetcher>,
        registrar: Arc<dyn WorkflowRegistrar>,
        admin: AdminAuth,
    ) -> Self {
        Self {
            source,
            fetcher,
            registrar,
            admin,
        }
    }

    /// Retrieval strategy used by this reconciler
    pub fn fetcher(&self) -> &Arc<dyn ArtifactFetcher> {
        &self.fetcher
    }

    /// Reconcile the declaration stored under `key`
    #[instrument(skip(self, cancel), fields(key = %key))]
    pub async fn reconcile(
        &self,
        key: &DeclarationKey,
        cancel: &CancellationToken,
    ) -> ServiceResult<ReconcileOutcome> {
        let Some(declaration) = self.source.get(key).await? else {
            info!("declaration not found, ignoring");
            return Ok(ReconcileOutcome::NotFound);
        };

        let spec = &declaration.spec;
        let metadata = spec.metadata();

        let archive = self
            .fetcher
            .fetch(&spec.workflow_package_uri, &spec.workflow_version, cancel)
            .await
            .inspect_err(|e| {
                if !e.is_cancelled() {
                    warn!(artifact = %spec.workflow_package_uri, error = %e, "artifact download failed");
                }
            })?;
        info!(path = %archive.display(), "downloaded artifact");

        self.registrar
            .register(&archive, &metadata, &self.admin, cancel)
            .await?;

        info!(
            name = %key.name,
            version = %metadata.version,
            domain = %metadata.domain,
            project = %metadata.project,
            "successfully registered workflow"
        );

        Ok(ReconcileOutcome::Registered { archive, metadata })
    }
}
