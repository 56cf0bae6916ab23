//! `FlyteRegistration` custom resource
//!
//! A `FlyteRegistration` declares one packaged workflow that should be
//! registered against the Flyte admin API. The operator never writes to it.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::{DeclarationKey, WorkflowMetadata};

/// Desired state of a `FlyteRegistration`
#[derive(CustomResource, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "flyte.backend",
    version = "v1",
    kind = "FlyteRegistration",
    namespaced,
    shortname = "flytereg",
    printcolumn = r#"{"name":"Project","type":"string","jsonPath":".spec.workflowProject"}"#,
    printcolumn = r#"{"name":"Domain","type":"string","jsonPath":".spec.workflowDomain"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.workflowVersion"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FlyteRegistrationSpec {
    /// Flyte domain the workflow is registered into (e.g. `development`)
    pub workflow_domain: String,

    /// Flyte project the workflow belongs to
    pub workflow_project: String,

    /// Identifier of the packaged workflow inside the artifact store
    pub workflow_package_uri: String,

    /// Version of the packaged workflow, also used as the registration version
    pub workflow_version: String,
}

impl FlyteRegistrationSpec {
    /// Project the spec into the metadata handed to the registrar
    pub fn metadata(&self) -> WorkflowMetadata {
        WorkflowMetadata {
            version: self.workflow_version.clone(),
            domain: self.workflow_domain.clone(),
            project: self.workflow_project.clone(),
        }
    }
}

impl FlyteRegistration {
    /// Namespaced key of this declaration, if the object carries one
    pub fn key(&self) -> Option<DeclarationKey> {
        let name = self.metadata.name.clone()?;
        let namespace = self.metadata.namespace.clone()?;
        Some(DeclarationKey::new(namespace, name))
    }
}
