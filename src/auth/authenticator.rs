//! Authentication and identity binding for one node.
//!
//! One [`Authenticator`] drives a single authentication attempt:
//!
//! ```text
//! Unauthenticated ──secret──▶ AuthenticatingService ─────┐
//!        │                                               ├─token──▶ Authenticated
//!        └──no secret──▶ AuthenticatingInteractive ──────┤
//!                                                        └─no token / error──▶ Failed ──▶ Simulated
//! ```
//!
//! `Simulated` is terminal and cannot fail: it hands out a fixed token so
//! the node can finish initializing without a reachable provider.

use chrono::{TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::auth::claims::decode_unverified;
use crate::auth::mock::EnvPlatformVerifier;
use crate::auth::provider::{
    IdentityProvider, PlatformVerifier, ProviderResponse, INTERACTIVE_SCOPES, SERVICE_SCOPE,
};
use crate::config::{AzureSettings, PlatformEnv};
use crate::identity::{AgentId, AgentIdentity, SecurityLevel};
use crate::logging::{EventLogger, EventType, NodeEvent};
use crate::types::{NodeError, Recovery, Result};

pub const SIMULATED_ACCESS_TOKEN: &str = "simulated_token";
pub const SIMULATED_ID_TOKEN: &str = "simulated_id_token";
pub const SIMULATED_EXPIRES_IN: u64 = 3600;

/// Enterprise identity bound from the simulated token
pub const PLACEHOLDER_ENTERPRISE_IDENTITY: &str = "enterprise_user@example.com";
pub const PLACEHOLDER_OBJECT_ID: &str = "simulated-object-id";

/// Platform login used when neither a token nor an actor is available
pub const SIMULATED_PLATFORM_LOGIN: &str = "simulated_github_user";

/// Where an authentication attempt stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    AuthenticatingService,
    AuthenticatingInteractive,
    Authenticated,
    Failed,
    Simulated,
}

/// Uniform token result of either flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResult {
    pub access_token: String,
    pub id_token: Option<String>,
    pub expires_in: Option<u64>,
}

impl TokenResult {
    pub fn simulated() -> Self {
        Self {
            access_token: SIMULATED_ACCESS_TOKEN.to_string(),
            id_token: Some(SIMULATED_ID_TOKEN.to_string()),
            expires_in: Some(SIMULATED_EXPIRES_IN),
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.access_token == SIMULATED_ACCESS_TOKEN
    }
}

/// Settings and adapters shared by the authenticators of one tree
#[derive(Clone, Default)]
pub struct AuthConfig {
    pub azure: AzureSettings,
    pub platform: PlatformEnv,
    pub provider: Option<Arc<dyn IdentityProvider>>,
    pub verifier: Option<Arc<dyn PlatformVerifier>>,
}

impl AuthConfig {
    pub fn new(azure: AzureSettings, platform: PlatformEnv) -> Self {
        Self {
            azure,
            platform,
            provider: None,
            verifier: None,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn PlatformVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Configured verifier, or one that resolves to the environment actor
    fn verifier(&self) -> Arc<dyn PlatformVerifier> {
        self.verifier.clone().unwrap_or_else(|| {
            Arc::new(EnvPlatformVerifier::new(self.platform.github_actor.clone()))
        })
    }
}

pub struct Authenticator {
    config: AuthConfig,
    agent_id: AgentId,
    events: EventLogger,
    state: AuthState,
}

impl Authenticator {
    pub fn new(config: AuthConfig, agent_id: AgentId, events: EventLogger) -> Self {
        Self {
            config,
            agent_id,
            events,
            state: AuthState::Unauthenticated,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Run the provider flow selected by the configuration. Always yields a
    /// token: any failure ends in the simulated result.
    pub async fn authenticate(&mut self) -> TokenResult {
        match self.attempt().await {
            Ok(result) => {
                self.state = AuthState::Authenticated;
                info!("Successfully authenticated with the identity provider");
                result
            }
            Err(err) => {
                self.state = AuthState::Failed;
                warn!("Authentication failed: {}", err);
                match err.recovery() {
                    Recovery::Simulate => {}
                    other => debug!("Unexpected recovery {:?} for auth failure", other),
                }
                self.simulate(&err)
            }
        }
    }

    async fn attempt(&mut self) -> Result<TokenResult> {
        let service = self.config.azure.has_client_secret();
        self.state = if service {
            AuthState::AuthenticatingService
        } else {
            AuthState::AuthenticatingInteractive
        };

        let provider = self.config.provider.clone().ok_or_else(|| {
            NodeError::AuthenticationFailed("no identity provider configured".to_string())
        })?;

        debug!(
            "Authenticating against {} via {} ({})",
            self.config.azure.authority(),
            provider.id(),
            if service { "client credentials" } else { "interactive" }
        );

        let response = if service {
            provider.authenticate_service_to_service(&[SERVICE_SCOPE]).await
        } else {
            provider.authenticate_interactive(&INTERACTIVE_SCOPES).await
        }
        .map_err(|e| NodeError::AuthenticationFailed(e.to_string()))?;

        into_token_result(response)
    }

    fn simulate(&mut self, cause: &NodeError) -> TokenResult {
        self.state = AuthState::Simulated;
        warn!("Using simulated authentication for development");
        self.events.log(
            NodeEvent::new(EventType::AuthFallback, &self.agent_id).with_detail(cause.to_string()),
        );
        TokenResult::simulated()
    }

    /// Token to resolve the platform identity from: only read inside a CI
    /// runner.
    pub fn platform_token(&self) -> Option<String> {
        if self.config.platform.github_actions {
            self.config.platform.github_token.clone()
        } else {
            None
        }
    }

    /// Bind the source-platform login onto `identity`.
    ///
    /// With a token, the login comes from the verifier; without one, from
    /// the environment actor or a fixed placeholder.
    pub async fn bind_source_platform_identity(
        &self,
        identity: &mut AgentIdentity,
        token: Option<&str>,
    ) -> bool {
        let resolved = match token {
            Some(token) => self
                .config
                .verifier()
                .verify(token)
                .await
                .map(|user| user.login)
                .map_err(|e| NodeError::BindingFailed(e.to_string())),
            None => Ok(self
                .config
                .platform
                .github_actor
                .clone()
                .unwrap_or_else(|| SIMULATED_PLATFORM_LOGIN.to_string())),
        };

        match resolved {
            Ok(login) => {
                info!("Platform identity: {}", login);
                if token.is_some() {
                    identity.mark_verified();
                }
                identity.source_platform_identity = Some(login.clone());
                self.events.log(
                    NodeEvent::new(EventType::IdentityBound, &identity.agent_id)
                        .with_detail(format!("platform:{}", login)),
                );
                true
            }
            Err(err) => self.binding_failed(identity, "platform", err),
        }
    }

    /// Bind the enterprise principal and object id onto `identity`.
    ///
    /// The simulated token binds fixed placeholders. Any other token has its
    /// claims read without signature verification (see `auth::claims`).
    pub async fn bind_enterprise_identity(
        &self,
        identity: &mut AgentIdentity,
        access_token: &str,
    ) -> bool {
        if access_token == SIMULATED_ACCESS_TOKEN {
            identity.enterprise_identity = Some(PLACEHOLDER_ENTERPRISE_IDENTITY.to_string());
            identity.enterprise_object_id = Some(PLACEHOLDER_OBJECT_ID.to_string());
            info!("Enterprise identity: {}", PLACEHOLDER_ENTERPRISE_IDENTITY);
            self.events.log(
                NodeEvent::new(EventType::IdentityBound, &identity.agent_id)
                    .with_detail(format!("enterprise:{}", PLACEHOLDER_ENTERPRISE_IDENTITY)),
            );
            return true;
        }

        match apply_claims(identity, access_token) {
            Ok(()) => {
                let principal = identity.enterprise_identity.clone().unwrap_or_default();
                info!("Enterprise identity: {}", principal);
                self.events.log(
                    NodeEvent::new(EventType::IdentityBound, &identity.agent_id)
                        .with_detail(format!("enterprise:{}", principal)),
                );
                true
            }
            Err(err) => self.binding_failed(identity, "enterprise", err),
        }
    }

    fn binding_failed(&self, identity: &AgentIdentity, which: &str, err: NodeError) -> bool {
        debug_assert_eq!(err.recovery(), Recovery::LeaveUnbound);
        error!("Failed to bind {} identity: {}", which, err);
        self.events.log(
            NodeEvent::new(EventType::BindingFailed, &identity.agent_id)
                .with_detail(format!("{}: {}", which, err)),
        );
        false
    }
}

fn into_token_result(response: ProviderResponse) -> Result<TokenResult> {
    match response.access_token {
        Some(access_token) => Ok(TokenResult {
            access_token,
            id_token: response.id_token,
            expires_in: response.expires_in,
        }),
        None => Err(NodeError::AuthenticationFailed(
            response
                .error_description
                .unwrap_or_else(|| "Unknown error".to_string()),
        )),
    }
}

/// Copy decoded claims onto the identity. Nothing is written unless every
/// claim could be processed.
fn apply_claims(identity: &mut AgentIdentity, access_token: &str) -> Result<()> {
    let claims = decode_unverified(access_token)?;
    let now = Utc::now();

    let session_expiry = match identity.security_context {
        Some(_) => Some(
            TimeDelta::try_seconds(claims.exp_seconds())
                .and_then(|d| now.checked_add_signed(d))
                .ok_or_else(|| NodeError::BindingFailed("exp claim out of range".to_string()))?,
        ),
        None => None,
    };

    identity.enterprise_identity = claims.principal().map(str::to_string);
    identity.enterprise_object_id = claims.oid.clone();

    if let Some(ctx) = identity.security_context.as_mut() {
        ctx.mfa_verified = claims.mfa_verified();
        ctx.last_auth_time = Some(now);
        ctx.session_expiry = session_expiry;
        ctx.security_level = SecurityLevel::Enterprise;
        ctx.signature_verified = false;
    }

    identity.mark_verified();
    Ok(())
}
