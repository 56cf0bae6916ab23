//! Service layer for the Flyte registration operator
//!
//! This crate sits between the host loop and the retrieval strategies. It
//! implements a single reconciliation pass and the collaborators it needs.
//!
//! # Architecture
//!
//! - **Reconciler**: reads a declaration, downloads its artifact, registers it
//! - **DeclarationSource**: get-by-key access to `FlyteRegistration` objects
//! - **WorkflowRegistrar**: hands a local package to Flyte admin via `flytectl`
//! - **CommandRunner**: runs external programs, cancellable
//!
//! # Example
//!
//! ```rust,no_run
//! use flyte_registration_core::{AdminAuth, DeclarationKey};
//! use flyte_registration_service::{
//!     FlytectlRegistrar, KubeDeclarationSource, OsCommandRunner, Reconciler,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(
//! #     client: kube::Client,
//! #     fetcher: Arc<dyn flyte_registration_fetch::ArtifactFetcher>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let reconciler = Reconciler::new(
//!     Arc::new(KubeDeclarationSource::new(client)),
//!     fetcher,
//!     Arc::new(FlytectlRegistrar::new(Arc::new(OsCommandRunner::new()))),
//!     AdminAuth::new("dns:///flyte.example.com", "operator"),
//! );
//!
//! reconciler
//!     .reconcile(&DeclarationKey::new("flyte", "my-workflow"), &CancellationToken::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod error;
pub mod reconciler;
pub mod registrar;

pub use command::{CommandRunner, OsCommandRunner};
pub use error::{CommandError, ServiceError, ServiceResult};
pub use reconciler::{DeclarationSource, KubeDeclarationSource, ReconcileOutcome, Reconciler};
pub use registrar::{FlytectlRegistrar, WorkflowRegistrar, DEFAULT_FLYTECTL_BINARY};
