//! Common test utilities and helpers
//!
//! Deterministic stand-ins for the cluster API, the artifact stores and the
//! `flytectl` binary, so a full reconciliation pass runs without any of them.

#![allow(dead_code)]

use async_trait::async_trait;
use flyte_registration_core::{DeclarationKey, DownloadStrategy, FlyteRegistration};
use flyte_registration_fetch::{ArtifactFetcher, FetchError, FetchResult};
use flyte_registration_service::{CommandError, CommandRunner, DeclarationSource, ServiceResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub mod fixtures;

/// Declarations held in memory, keyed by namespace and name
#[derive(Default)]
pub struct InMemoryDeclarations {
    declarations: Mutex<HashMap<DeclarationKey, FlyteRegistration>>,
}

impl InMemoryDeclarations {
    pub fn with(declarations: impl IntoIterator<Item = FlyteRegistration>) -> Self {
        let source = Self::default();
        for declaration in declarations {
            source.insert(declaration);
        }
        source
    }

    pub fn insert(&self, declaration: FlyteRegistration) {
        let key = declaration.key().expect("fixture declarations are namespaced");
        self.declarations.lock().unwrap().insert(key, declaration);
    }
}

#[async_trait]
impl DeclarationSource for InMemoryDeclarations {
    async fn get(&self, key: &DeclarationKey) -> ServiceResult<Option<FlyteRegistration>> {
        Ok(self.declarations.lock().unwrap().get(key).cloned())
    }
}

/// Fetcher returning a fixed path, recording every request
pub struct StubFetcher {
    path: PathBuf,
    fail: bool,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl StubFetcher {
    pub fn returning(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::returning("")
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ArtifactFetcher for StubFetcher {
    async fn fetch(
        &self,
        uri: &str,
        version: &str,
        _cancel: &CancellationToken,
    ) -> FetchResult<PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .push((uri.to_string(), version.to_string()));
        if self.fail {
            return Err(FetchError::Registry(format!("{}:{} not found", uri, version)));
        }
        Ok(self.path.clone())
    }

    fn strategy(&self) -> DownloadStrategy {
        DownloadStrategy::Oci
    }
}

/// A recorded command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Value following `flag` in the argument list
    pub fn arg(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

/// Command runner standing in for `flytectl`
#[derive(Default)]
pub struct RecordingRunner {
    failure_output: Option<String>,
    pub invocations: Mutex<Vec<Invocation>>,
}

impl RecordingRunner {
    /// Runner whose every command fails after printing `output`
    pub fn failing_with(output: impl Into<String>) -> Self {
        Self {
            failure_output: Some(output.into()),
            ..Default::default()
        }
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        _cancel: &CancellationToken,
    ) -> Result<String, CommandError> {
        self.invocations.lock().unwrap().push(Invocation {
            program: program.to_string(),
            args: args.to_vec(),
        });

        match &self.failure_output {
            Some(output) => Err(CommandError::Exited {
                program: program.to_string(),
                code: Some(1),
                output: output.clone(),
            }),
            None => Ok("successfully registered 1 file\n".to_string()),
        }
    }
}
