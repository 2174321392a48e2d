//! Intent manifest: which children a node spawns and how deep the tree may
//! grow.
//!
//! ```json
//! { "recursive": { "enabled": true, "max_depth": 2 },
//!   "children": [ { "domain": "Business" } ] }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::types::{NodeError, Result};

/// Depth limit used when the manifest does not give one
pub const DEFAULT_MAX_DEPTH: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub recursive: RecursiveSettings,
    #[serde(default)]
    pub children: Vec<ChildSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecursiveSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for RecursiveSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

/// One child entry. Without a domain the child takes its parent's.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildSpec {
    #[serde(default)]
    pub domain: Option<String>,
}

impl ChildSpec {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
        }
    }

    /// Child in the same domain as its parent
    pub fn same_domain() -> Self {
        Self::default()
    }
}

impl Manifest {
    /// Manifest with recursion enabled up to `max_depth`
    pub fn recursive(max_depth: usize, children: Vec<ChildSpec>) -> Self {
        Self {
            recursive: RecursiveSettings {
                enabled: true,
                max_depth,
            },
            children,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            NodeError::ConfigUnavailable(format!("{}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load `path`, falling back to the default (non-recursive) manifest
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(manifest) => {
                debug!(
                    "Loaded manifest from {} ({} child spec(s))",
                    path.display(),
                    manifest.children.len()
                );
                manifest
            }
            Err(err) => {
                warn!("{}; recursion disabled", err);
                Self::default()
            }
        }
    }
}
