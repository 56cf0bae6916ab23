//! Common types used throughout the operator

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the environment variable `flytectl` reads the client secret from.
///
/// Only the name travels through the operator; the value stays in the
/// environment of the registration subprocess.
pub const CLIENT_SECRET_ENV_VAR: &str = "FLYTE_CLIENT_SECRET";

/// Namespaced name identifying a `FlyteRegistration`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeclarationKey {
    pub namespace: String,
    pub name: String,
}

impl DeclarationKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for DeclarationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Registration metadata derived from a declaration for a single pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    pub version: String,
    pub domain: String,
    pub project: String,
}

/// Flyte admin credentials passed to the registrar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminAuth {
    /// Flyte admin API endpoint
    pub endpoint: String,

    /// OAuth client id
    pub client_id: String,

    /// Environment variable holding the client secret
    pub client_secret_env_var: String,
}

impl AdminAuth {
    /// Build admin auth that reads the secret from [`CLIENT_SECRET_ENV_VAR`]
    pub fn new(endpoint: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client_id: client_id.into(),
            client_secret_env_var: CLIENT_SECRET_ENV_VAR.to_string(),
        }
    }
}
