//! Enterprise bearer-token claims
//!
//! Security notes:
//! - Claims are read WITHOUT verifying the token signature, expiry or
//!   audience. Anyone able to hand a node a token can choose the identity
//!   it binds. Callers must not treat the resulting identity as proof of
//!   anything; [`SecurityContext::signature_verified`] stays `false`.
//! - Whether verification should be added (against the provider's JWKS)
//!   is unresolved; see DESIGN.md.
//!
//! [`SecurityContext::signature_verified`]: crate::identity::SecurityContext

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{NodeError, Result};

/// Default session length when a token carries no `exp` claim
pub const DEFAULT_EXP_SECONDS: i64 = 3600;

/// Authentication-method value that marks multi-factor sign-in
pub const MFA_METHOD: &str = "mfa";

/// Claims read from an enterprise access token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnterpriseClaims {
    /// User principal name
    #[serde(default)]
    pub upn: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Directory object id
    #[serde(default)]
    pub oid: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    /// Authentication methods used for the sign-in
    #[serde(default)]
    pub amr: Vec<String>,
}

impl EnterpriseClaims {
    /// `upn`, falling back to `email`
    pub fn principal(&self) -> Option<&str> {
        self.upn.as_deref().or(self.email.as_deref())
    }

    /// `exp` as a number of seconds, defaulting to one hour
    pub fn exp_seconds(&self) -> i64 {
        self.exp.unwrap_or(DEFAULT_EXP_SECONDS)
    }

    pub fn mfa_verified(&self) -> bool {
        self.amr.iter().any(|m| m == MFA_METHOD)
    }
}

/// Decode token claims without checking the signature.
pub fn decode_unverified(token: &str) -> Result<EnterpriseClaims> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<EnterpriseClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| NodeError::BindingFailed(format!("cannot decode token claims: {}", e)))?;

    warn!("Enterprise token claims accepted without signature verification");
    Ok(data.claims)
}
