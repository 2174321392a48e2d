//! Authentication and authorization for agent nodes
//!
//! Provides:
//! - Role hierarchy and permission matrix (`permissions`)
//! - Per-node policy checks, delegation and inheritance (`policy`)
//! - Audit trail for the extended policy variant (`audit`)
//! - Identity provider adapters and the authentication state machine
//!   (`provider`, `authenticator`)
//! - Unverified enterprise token claims (`claims`)

pub mod audit;
pub mod authenticator;
pub mod claims;
pub mod mock;
pub mod permissions;
pub mod policy;
pub mod provider;

pub use audit::{AuditEntry, AuditLog, AuditStats};
pub use authenticator::{AuthConfig, AuthState, Authenticator, TokenResult};
pub use claims::{decode_unverified, EnterpriseClaims};
pub use mock::{EnvPlatformVerifier, MockIdentityProvider, StaticPlatformVerifier};
pub use permissions::{Action, PermissionRow, PolicyTable, PolicyVariant, Role};
pub use policy::PolicyEngine;
pub use provider::{
    IdentityProvider, PlatformUser, PlatformVerifier, ProviderError, ProviderResponse,
};
