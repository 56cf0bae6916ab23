//! Strategy selectors
//!
//! Both selectors are parsed once while configuration is loaded. An unknown
//! value is rejected there, so the rest of the operator only ever sees one of
//! the variants below.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{OperatorError, Result};

/// Where workflow packages are downloaded from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DownloadStrategy {
    /// OCI registry, artifact addressed as `registry/uri:version`
    #[default]
    Oci,

    /// JFrog Artifactory, artifact addressed as `uri_version.tgz`
    Jfrog,
}

impl DownloadStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStrategy::Oci => "oci",
            DownloadStrategy::Jfrog => "jfrog",
        }
    }
}

impl fmt::Display for DownloadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadStrategy {
    type Err = OperatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "oci" => Ok(DownloadStrategy::Oci),
            "jfrog" => Ok(DownloadStrategy::Jfrog),
            other => Err(OperatorError::UnsupportedStrategy {
                kind: "download",
                value: other.to_string(),
                allowed: "`oci` or `jfrog`",
            }),
        }
    }
}

impl TryFrom<String> for DownloadStrategy {
    type Error = OperatorError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DownloadStrategy> for String {
    fn from(strategy: DownloadStrategy) -> Self {
        strategy.as_str().to_string()
    }
}

/// How credentials for the OCI registry are obtained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RegistryAuthStrategy {
    /// Username and password taken verbatim from configuration
    #[default]
    Static,

    /// Short-lived token exchanged from ambient AWS credentials via ECR
    Ecr,
}

impl RegistryAuthStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryAuthStrategy::Static => "static",
            RegistryAuthStrategy::Ecr => "ecr",
        }
    }
}

impl fmt::Display for RegistryAuthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistryAuthStrategy {
    type Err = OperatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "static" => Ok(RegistryAuthStrategy::Static),
            "ecr" => Ok(RegistryAuthStrategy::Ecr),
            other => Err(OperatorError::UnsupportedStrategy {
                kind: "OCI auth",
                value: other.to_string(),
                allowed: "`static` or `ecr`",
            }),
        }
    }
}

impl TryFrom<String> for RegistryAuthStrategy {
    type Error = OperatorError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RegistryAuthStrategy> for String {
    fn from(strategy: RegistryAuthStrategy) -> Self {
        strategy.as_str().to_string()
    }
}
