//! Error types for intenton-node
//!
//! Every failure kind maps to exactly one designed recovery. Components
//! consult [`NodeError::recovery`] at their boundary instead of catching
//! broadly, so the fallback for each failure is visible in one table.

/// Main error type for node operations
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("Configuration unavailable: {0}")]
    ConfigUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Identity binding failed: {0}")]
    BindingFailed(String),

    #[error("Permission denied: {action} for {agent_id}")]
    PermissionDenied { agent_id: String, action: String },

    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Node not found: {0}")]
    NotFound(String),

    #[error("Invalid policy table: {0}")]
    InvalidPolicy(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// What a component does when it hits a given failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Continue with an empty/default configuration
    UseEmptyConfig,
    /// Switch to the deterministic simulated authentication result
    Simulate,
    /// Report the binding as unsuccessful and keep the identity fields unset
    LeaveUnbound,
    /// Report the check as denied; the caller decides what to do
    Deny,
    /// Leave the child out of the parent's child list and keep going
    OmitChild,
    /// Abort the current operation and surface a non-success result
    Abort,
}

impl NodeError {
    /// Designed recovery for this failure kind
    pub fn recovery(&self) -> Recovery {
        match self {
            Self::ConfigUnavailable(_) => Recovery::UseEmptyConfig,
            Self::AuthenticationFailed(_) => Recovery::Simulate,
            Self::BindingFailed(_) => Recovery::LeaveUnbound,
            Self::PermissionDenied { .. } => Recovery::Deny,
            Self::SpawnFailed(_) => Recovery::OmitChild,
            Self::NotFound(_) => Recovery::Abort,
            Self::InvalidPolicy(_) => Recovery::Abort,
            Self::Config(_) => Recovery::Abort,
            Self::Internal(_) => Recovery::Abort,
        }
    }

    /// Whether the failure ends the current operation
    pub fn is_fatal(&self) -> bool {
        self.recovery() == Recovery::Abort
    }

    pub fn permission_denied(agent_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self::PermissionDenied {
            agent_id: agent_id.into(),
            action: action.into(),
        }
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for NodeError {
    fn from(err: std::io::Error) -> Self {
        Self::ConfigUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigUnavailable(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for NodeError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ConfigUnavailable(format!("YAML error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for NodeError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::BindingFailed(format!("JWT error: {}", err))
    }
}

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, NodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_table() {
        assert_eq!(
            NodeError::ConfigUnavailable("missing".into()).recovery(),
            Recovery::UseEmptyConfig
        );
        assert_eq!(
            NodeError::AuthenticationFailed("no token".into()).recovery(),
            Recovery::Simulate
        );
        assert_eq!(
            NodeError::BindingFailed("bad claims".into()).recovery(),
            Recovery::LeaveUnbound
        );
        assert_eq!(
            NodeError::permission_denied("PA-X", "create").recovery(),
            Recovery::Deny
        );
        assert_eq!(
            NodeError::SpawnFailed("boom".into()).recovery(),
            Recovery::OmitChild
        );
        assert!(NodeError::Internal("x".into()).is_fatal());
        assert!(!NodeError::SpawnFailed("x".into()).is_fatal());
    }

    #[test]
    fn test_io_error_is_config_unavailable() {
        let err: NodeError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, NodeError::ConfigUnavailable(_)));
    }

    #[test]
    fn test_permission_denied_display() {
        let err = NodeError::permission_denied("PA-FAMILY-1", "delegate");
        assert_eq!(err.to_string(), "Permission denied: delegate for PA-FAMILY-1");
    }
}
