//! Configuration for intenton-node
//!
//! CLI arguments and environment variables via clap, plus the optional
//! YAML settings file. Environment values win over the file.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::auth::permissions::PolicyVariant;
use crate::identity::Domain;
use crate::types::{NodeError, Result};

/// Authority used when no tenant is configured
pub const DEFAULT_TENANT: &str = "common";

/// IntentON node - hierarchical agent identity bootstrap
#[derive(Parser, Debug, Clone)]
#[command(name = "intenton-node")]
#[command(about = "Initialize a recursive tree of identity-bound agent nodes")]
pub struct Args {
    /// Domain of the root node (Personal, Family, Business, Enterprise, ...)
    #[arg(long, env = "INTENTON_DOMAIN", default_value = "Enterprise")]
    pub domain: String,

    /// YAML settings file
    #[arg(long, env = "INTENTON_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    /// JSON manifest describing recursive child nodes
    #[arg(long, env = "INTENTON_MANIFEST", default_value = "intent_manifest.json")]
    pub manifest: PathBuf,

    /// Policy variant (baseline, extended)
    #[arg(long, env = "INTENTON_POLICY_VARIANT", default_value = "extended")]
    pub variant: String,

    /// Append node lifecycle events to this file as JSON lines
    #[arg(long, env = "INTENTON_EVENT_LOG")]
    pub event_log: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Print the initialized tree as JSON
    #[arg(long, default_value = "false")]
    pub print_tree: bool,

    /// Enterprise identity provider settings
    #[command(flatten)]
    pub azure: AzureArgs,

    /// Source-hosting platform settings
    #[command(flatten)]
    pub platform: PlatformArgs,
}

/// Enterprise identity provider arguments
#[derive(Parser, Debug, Clone, Default)]
pub struct AzureArgs {
    /// Directory tenant id
    #[arg(long, env = "AZURE_TENANT_ID")]
    pub azure_tenant_id: Option<String>,

    /// Application (client) id
    #[arg(long, env = "AZURE_CLIENT_ID")]
    pub azure_client_id: Option<String>,

    /// Client secret; selects the service-to-service flow when set
    #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true)]
    pub azure_client_secret: Option<String>,
}

/// Source-hosting platform arguments
#[derive(Parser, Debug, Clone, Default)]
pub struct PlatformArgs {
    /// Set by CI runners; any non-empty value enables reading the
    /// platform token
    #[arg(long, env = "GITHUB_ACTIONS")]
    pub github_actions: Option<String>,

    /// Platform token, only read when running in CI
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Fallback platform login
    #[arg(long, env = "GITHUB_ACTOR")]
    pub github_actor: Option<String>,
}

impl Args {
    /// Root domain tag
    pub fn root_domain(&self) -> Domain {
        Domain::parse(&self.domain)
    }

    pub fn policy_variant(&self) -> Result<PolicyVariant> {
        self.variant.parse()
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// Provider settings with environment values layered over `file`
    pub fn azure_settings(&self, file: &FileConfig) -> AzureSettings {
        AzureSettings::resolve(&file.azure, &self.azure)
    }

    pub fn platform_env(&self) -> PlatformEnv {
        PlatformEnv {
            github_actions: non_empty(&self.platform.github_actions).is_some(),
            github_token: self.platform.github_token.clone(),
            github_actor: self.platform.github_actor.clone(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Err(e) = self.policy_variant() {
            return Err(e.to_string());
        }

        if !matches!(self.log_format.to_ascii_lowercase().as_str(), "text" | "json") {
            return Err(format!(
                "LOG_FORMAT must be text or json, got {}",
                self.log_format
            ));
        }

        if self.domain.trim().is_empty() {
            return Err("INTENTON_DOMAIN must not be empty".to_string());
        }

        Ok(())
    }
}

/// Settings file contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub azure: AzureSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureSection {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            NodeError::ConfigUnavailable(format!("{}: {}", path.display(), e))
        })?;
        // An empty file parses to null; treat it as no settings
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// Load `path`, falling back to empty settings when it is missing or
    /// unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => {
                debug!("Loaded settings from {}", path.display());
                config
            }
            Err(err) => {
                warn!("{}; continuing with empty settings", err);
                Self::default()
            }
        }
    }
}

/// Resolved identity provider settings
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AzureSettings {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl AzureSettings {
    pub fn resolve(file: &AzureSection, env: &AzureArgs) -> Self {
        Self {
            tenant_id: non_empty(&env.azure_tenant_id).or_else(|| non_empty(&file.tenant_id)),
            client_id: non_empty(&env.azure_client_id).or_else(|| non_empty(&file.client_id)),
            client_secret: non_empty(&env.azure_client_secret),
        }
    }

    pub fn has_client_secret(&self) -> bool {
        self.client_secret.is_some()
    }

    pub fn authority(&self) -> String {
        format!(
            "https://login.microsoftonline.com/{}",
            self.tenant_id.as_deref().unwrap_or(DEFAULT_TENANT)
        )
    }
}

impl fmt::Debug for AzureSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureSettings")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Source-hosting platform environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformEnv {
    pub github_actions: bool,
    pub github_token: Option<String>,
    pub github_actor: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
