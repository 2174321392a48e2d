//! Adapter traits for external identity services.
//!
//! The core never talks to an identity provider or a source-hosting
//! platform itself. Adapters implement these traits; when none is
//! configured the authenticator uses its simulated fallback.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Scope requested by the service-to-service flow
pub const SERVICE_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Scopes requested by the interactive flow
pub const INTERACTIVE_SCOPES: [&str; 2] = ["User.Read", "Directory.Read.All"];

/// Error types for adapter calls.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Adapter is not available
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The provider rejected the request
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Response could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Raw result of a provider flow.
///
/// A successful flow carries `access_token`; a failed one usually carries
/// `error_description` instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl ProviderResponse {
    pub fn token(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            ..Default::default()
        }
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self {
            error_description: Some(description.into()),
            ..Default::default()
        }
    }

    pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
        self.id_token = Some(id_token.into());
        self
    }

    pub fn with_expires_in(mut self, seconds: u64) -> Self {
        self.expires_in = Some(seconds);
        self
    }
}

/// Enterprise identity provider with two credential flows.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provider identifier, for logs.
    fn id(&self) -> &str;

    /// Client-credentials flow for a configured service principal.
    async fn authenticate_service_to_service(
        &self,
        scopes: &[&str],
    ) -> Result<ProviderResponse, ProviderError>;

    /// Interactive user sign-in.
    async fn authenticate_interactive(
        &self,
        scopes: &[&str],
    ) -> Result<ProviderResponse, ProviderError>;
}

/// User resolved from a platform token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformUser {
    pub login: String,
}

/// Resolves a source-hosting platform token to a username.
#[async_trait]
pub trait PlatformVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<PlatformUser, ProviderError>;
}
