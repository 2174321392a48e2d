//! Mock and placeholder adapters.
//!
//! `MockIdentityProvider` and `StaticPlatformVerifier` are configurable
//! doubles for tests. `EnvPlatformVerifier` is the verifier used when no
//! real platform adapter is wired in.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use super::provider::*;

/// Login returned by [`EnvPlatformVerifier`] when no actor is known.
pub const PLACEHOLDER_PLATFORM_LOGIN: &str = "github_user";

/// Mock identity provider for testing.
pub struct MockIdentityProvider {
    provider_id: String,
    available: AtomicBool,
    response: ProviderResponse,
    service_calls: AtomicU32,
    interactive_calls: AtomicU32,
    last_scopes: Mutex<Vec<String>>,
}

impl MockIdentityProvider {
    /// Create a provider that answers every flow with `access_token`.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            provider_id: "mock-idp".to_string(),
            available: AtomicBool::new(true),
            response: ProviderResponse::token(access_token).with_expires_in(3600),
            service_calls: AtomicU32::new(0),
            interactive_calls: AtomicU32::new(0),
            last_scopes: Mutex::new(Vec::new()),
        }
    }

    /// Set the full response.
    pub fn with_response(mut self, response: ProviderResponse) -> Self {
        self.response = response;
        self
    }

    /// Set availability.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    pub fn service_calls(&self) -> u32 {
        self.service_calls.load(Ordering::SeqCst)
    }

    pub fn interactive_calls(&self) -> u32 {
        self.interactive_calls.load(Ordering::SeqCst)
    }

    /// Scopes passed to the most recent call.
    pub fn last_scopes(&self) -> Vec<String> {
        self.last_scopes
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn answer(&self, scopes: &[&str]) -> Result<ProviderResponse, ProviderError> {
        if let Ok(mut last) = self.last_scopes.lock() {
            *last = scopes.iter().map(|s| s.to_string()).collect();
        }

        if !self.available.load(Ordering::SeqCst) {
            return Err(ProviderError::Unavailable("Mock provider disabled".to_string()));
        }
        Ok(self.response.clone())
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    fn id(&self) -> &str {
        &self.provider_id
    }

    async fn authenticate_service_to_service(
        &self,
        scopes: &[&str],
    ) -> Result<ProviderResponse, ProviderError> {
        self.service_calls.fetch_add(1, Ordering::SeqCst);
        self.answer(scopes)
    }

    async fn authenticate_interactive(
        &self,
        scopes: &[&str],
    ) -> Result<ProviderResponse, ProviderError> {
        self.interactive_calls.fetch_add(1, Ordering::SeqCst);
        self.answer(scopes)
    }
}

/// Verifier returning a fixed login, or failing.
pub struct StaticPlatformVerifier {
    login: Option<String>,
    calls: AtomicU32,
}

impl StaticPlatformVerifier {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: Some(login.into()),
            calls: AtomicU32::new(0),
        }
    }

    /// A verifier that rejects every token.
    pub fn rejecting() -> Self {
        Self {
            login: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformVerifier for StaticPlatformVerifier {
    async fn verify(&self, _token: &str) -> Result<PlatformUser, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.login {
            Some(login) => Ok(PlatformUser {
                login: login.clone(),
            }),
            None => Err(ProviderError::Rejected("bad credentials".to_string())),
        }
    }
}

/// Resolves any token to the environment-supplied actor.
///
/// Does not contact the platform; stands in until a real verifier is
/// configured.
pub struct EnvPlatformVerifier {
    actor: Option<String>,
}

impl EnvPlatformVerifier {
    pub fn new(actor: Option<String>) -> Self {
        Self { actor }
    }
}

#[async_trait]
impl PlatformVerifier for EnvPlatformVerifier {
    async fn verify(&self, _token: &str) -> Result<PlatformUser, ProviderError> {
        Ok(PlatformUser {
            login: self
                .actor
                .clone()
                .unwrap_or_else(|| PLACEHOLDER_PLATFORM_LOGIN.to_string()),
        })
    }
}
