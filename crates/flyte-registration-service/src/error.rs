//! Service-layer error types
//!
//! This module defines the errors a reconciliation pass can end with, and the
//! errors of running an external command. Retrieval errors from the fetch
//! crate are wrapped with one line of context; cancellation is kept apart from
//! failures at every layer.

use flyte_registration_fetch::FetchError;
use thiserror::Error;

/// Result type alias for service operations
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Errors of a single external command run
#[derive(Error, Debug)]
pub enum CommandError {
    /// The process could not be started or waited on
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and exited unsuccessfully
    #[error("{program} {}", exit_description(.code))]
    Exited {
        program: String,
        /// Exit code, `None` when the process was killed by a signal
        code: Option<i32>,
        output: String,
    },

    /// The process was killed because the pass was cancelled
    #[error("{program} was cancelled")]
    Cancelled { program: String, output: String },
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl CommandError {
    /// Output captured before the command failed, stdout followed by stderr
    pub fn output(&self) -> &str {
        match self {
            CommandError::Spawn { .. } => "",
            CommandError::Exited { output, .. } | CommandError::Cancelled { output, .. } => output,
        }
    }

    /// Check if the command was killed on cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CommandError::Cancelled { .. })
    }
}

/// Service-layer error types
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Artifact retrieval failed; no registration was attempted
    #[error("failed to download artifact: {0}")]
    DownloadFailed(#[source] FetchError),

    /// flytectl failed; carries its output verbatim
    #[error("failed to register workflow: {source}, output: {output}")]
    RegistrationFailed {
        #[source]
        source: CommandError,
        output: String,
    },

    /// The pass was cancelled before it completed
    #[error("reconciliation cancelled")]
    Cancelled,

    /// Cluster API failure while reading the declaration
    #[error("Kubernetes API error: {0}")]
    Kube(String),
}

impl ServiceError {
    /// Check if the pass was cancelled rather than failing
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ServiceError::Cancelled)
    }
}

impl From<FetchError> for ServiceError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Cancelled => ServiceError::Cancelled,
            other => ServiceError::DownloadFailed(other),
        }
    }
}

impl From<CommandError> for ServiceError {
    fn from(err: CommandError) -> Self {
        if err.is_cancelled() {
            return ServiceError::Cancelled;
        }
        let output = err.output().to_string();
        ServiceError::RegistrationFailed {
            source: err,
            output,
        }
    }
}

impl From<kube::Error> for ServiceError {
    fn from(err: kube::Error) -> Self {
        ServiceError::Kube(err.to_string())
    }
}
