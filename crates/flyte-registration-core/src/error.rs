//! Error types for the Flyte registration operator

use thiserror::Error;

/// Result type alias for domain and configuration operations
pub type Result<T> = std::result::Result<T, OperatorError>;

/// Domain and configuration errors
///
/// Everything here is raised while the process is starting up: a process
/// holding one of these must not begin reconciling.
#[derive(Error, Debug)]
pub enum OperatorError {
    /// Strategy selector outside of the supported set
    #[error("unsupported {kind} strategy: {value}, only {allowed} allowed")]
    UnsupportedStrategy {
        kind: &'static str,
        value: String,
        allowed: &'static str,
    },

    /// Required setting is missing
    #[error("missing required setting: {0}")]
    MissingSetting(&'static str),

    /// Setting is present but unusable
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

impl OperatorError {
    /// Check if this error was caused by a missing or invalid setting
    pub fn is_setting_error(&self) -> bool {
        matches!(
            self,
            OperatorError::MissingSetting(_) | OperatorError::InvalidSetting { .. }
        )
    }
}
