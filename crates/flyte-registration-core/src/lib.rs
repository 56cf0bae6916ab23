//! Core domain models and types for the Flyte registration operator
//!
//! This crate contains the `FlyteRegistration` custom resource, the metadata
//! derived from it for each reconciliation pass, the download and registry
//! auth strategy selectors, and the immutable retrieval settings shared by
//! every artifact download.

pub mod crd;
pub mod error;
pub mod settings;
pub mod strategy;
pub mod types;

// Re-exports for convenience
pub use crd::{FlyteRegistration, FlyteRegistrationSpec};
pub use error::{OperatorError, Result};
pub use settings::{
    ArtifactorySettings, OciSettings, RetrievalConfig, DEFAULT_MIN_SPLIT_SIZE,
    DEFAULT_SPLIT_COUNT,
};
pub use strategy::{DownloadStrategy, RegistryAuthStrategy};
pub use types::{AdminAuth, DeclarationKey, WorkflowMetadata, CLIENT_SECRET_ENV_VAR};
