//! Registry credential resolution
//!
//! Credentials are resolved again for every download: exchanged ECR tokens
//! expire after a few hours and static credentials may be rotated underneath
//! a running process.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ecr::config::{ProvideCredentials, Region};
use aws_sdk_ecr::error::DisplayErrorContext;
use base64::Engine;
use flyte_registration_core::{OciSettings, RegistryAuthStrategy};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::error::{FetchError, FetchResult};

/// Username and password for an OCI registry
pub struct RegistryCredential {
    pub username: String,
    pub password: SecretString,
}

impl fmt::Debug for RegistryCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredential")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Source of base64 `user:password` registry tokens
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AuthorizationTokenSource: Send + Sync {
    /// One entry per authorization record returned by the service.
    ///
    /// An entry is `None` when the record carried no token.
    async fn authorization_tokens(&self) -> FetchResult<Vec<Option<String>>>;
}

/// Exchanges ambient AWS credentials for ECR authorization tokens
pub struct EcrTokenSource {
    region: Option<String>,
}

impl EcrTokenSource {
    /// Create a token source, optionally pinned to a region
    pub fn new(region: Option<String>) -> Self {
        Self { region }
    }
}

#[async_trait]
impl AuthorizationTokenSource for EcrTokenSource {
    async fn authorization_tokens(&self) -> FetchResult<Vec<Option<String>>> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &self.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;
        load_credentials(&sdk_config).await?;

        let client = aws_sdk_ecr::Client::new(&sdk_config);
        let output = client
            .get_authorization_token()
            .send()
            .await
            .map_err(|e| FetchError::TokenExchange(DisplayErrorContext(&e).to_string()))?;

        Ok(output
            .authorization_data()
            .iter()
            .map(|data| data.authorization_token().map(str::to_string))
            .collect())
    }
}

/// Load the ambient AWS identity ahead of the token call, so a missing or
/// broken identity is reported as such rather than as a failed exchange
async fn load_credentials(sdk_config: &SdkConfig) -> FetchResult<()> {
    let provider = sdk_config.credentials_provider().ok_or_else(|| {
        FetchError::CloudCredentials("no AWS credentials provider available".to_string())
    })?;

    provider
        .provide_credentials()
        .await
        .map_err(|e| FetchError::CloudCredentials(DisplayErrorContext(&e).to_string()))?;
    Ok(())
}

/// Resolves registry credentials for the configured auth strategy
#[derive(Clone)]
pub struct CredentialResolver {
    tokens: Arc<dyn AuthorizationTokenSource>,
}

impl CredentialResolver {
    /// Create a resolver that exchanges tokens through `tokens` for the ECR strategy
    pub fn new(tokens: Arc<dyn AuthorizationTokenSource>) -> Self {
        Self { tokens }
    }

    /// Create a resolver backed by ECR in the configured region
    pub fn for_settings(settings: &OciSettings) -> Self {
        Self::new(Arc::new(EcrTokenSource::new(settings.region.clone())))
    }

    /// Produce credentials for the registry described by `settings`
    pub async fn resolve(&self, settings: &OciSettings) -> FetchResult<RegistryCredential> {
        match settings.auth_strategy {
            RegistryAuthStrategy::Static => Ok(RegistryCredential {
                username: settings.username.clone().unwrap_or_default(),
                password: SecretString::new(
                    settings
                        .password
                        .as_ref()
                        .map(|p| p.expose_secret().clone())
                        .unwrap_or_default(),
                ),
            }),
            RegistryAuthStrategy::Ecr => {
                let tokens = self.tokens.authorization_tokens().await?;
                debug!(entries = tokens.len(), "received ECR authorization data");

                let token = tokens
                    .into_iter()
                    .next()
                    .flatten()
                    .ok_or(FetchError::NoAuthorizationData)?;
                decode_authorization_token(&token)
            }
        }
    }
}

/// Decode a base64 `user:password` token, splitting on the first colon
pub fn decode_authorization_token(token: &str) -> FetchResult<RegistryCredential> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(token.trim())
        .map_err(|e| FetchError::TokenDecode(e.to_string()))?;
    let decoded = String::from_utf8(decoded).map_err(|e| FetchError::TokenDecode(e.to_string()))?;

    let (username, password) = decoded.split_once(':').ok_or(FetchError::MalformedToken)?;

    Ok(RegistryCredential {
        username: username.to_string(),
        password: SecretString::new(password.to_string()),
    })
}
