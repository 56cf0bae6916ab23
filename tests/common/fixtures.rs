//! Test fixtures

#![allow(dead_code)]

use flyte_registration_core::{
    AdminAuth, ArtifactorySettings, DownloadStrategy, FlyteRegistration, FlyteRegistrationSpec,
    RetrievalConfig,
};
use secrecy::SecretString;
use std::path::Path;

/// Spec used by the round-trip scenarios
pub fn test_spec() -> FlyteRegistrationSpec {
    FlyteRegistrationSpec {
        workflow_domain: "test-domain".to_string(),
        workflow_project: "test-project".to_string(),
        workflow_package_uri: "test-uri".to_string(),
        workflow_version: "1.0.0".to_string(),
    }
}

/// A namespaced declaration with `spec`
pub fn test_declaration(namespace: &str, name: &str, spec: FlyteRegistrationSpec) -> FlyteRegistration {
    let mut declaration = FlyteRegistration::new(name, spec);
    declaration.metadata.namespace = Some(namespace.to_string());
    declaration
}

pub fn test_admin_auth() -> AdminAuth {
    AdminAuth::new("test-endpoint", "test-client-id")
}

/// Artifactory retrieval against `url`, writing under `scratch_dir`
pub fn artifactory_config(scratch_dir: &Path, url: &str) -> RetrievalConfig {
    RetrievalConfig {
        strategy: DownloadStrategy::Jfrog,
        artifactory: ArtifactorySettings {
            url: url.to_string(),
            user: "user".to_string(),
            password: Some(SecretString::new("pass".to_string())),
            ..Default::default()
        },
        scratch_dir: scratch_dir.to_path_buf(),
        ..Default::default()
    }
}
