//! Agent identifiers
//!
//! Format: `PA-<DOMAIN>-<YYYYmmddHHMMSS>-<8 hex>`, where the suffix is the
//! first eight characters of a random v4 UUID.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::Domain;

/// Required prefix for all agent ids
pub const AGENT_ID_PREFIX: &str = "PA";

/// Length of the random hex suffix
const SUFFIX_LEN: usize = 8;

/// Globally unique agent identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Generate a fresh id for a domain at the current UTC second
    pub fn generate(domain: &Domain) -> Self {
        Self::generate_at(domain, Utc::now())
    }

    /// Generate an id with an explicit timestamp
    pub fn generate_at(domain: &Domain, at: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}-{}-{}-{}",
            AGENT_ID_PREFIX,
            domain.as_str().to_uppercase(),
            at.format("%Y%m%d%H%M%S"),
            &suffix[..SUFFIX_LEN]
        ))
    }

    /// Wrap an existing id string without validation
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id has the `PA-<DOMAIN>-<timestamp>-<hex>` shape
    pub fn is_well_formed(&self) -> bool {
        let Some(rest) = self.0.strip_prefix("PA-") else {
            return false;
        };
        let mut tail = rest.rsplitn(3, '-');
        let (Some(suffix), Some(stamp), Some(domain)) = (tail.next(), tail.next(), tail.next())
        else {
            return false;
        };

        !domain.is_empty()
            && stamp.len() == 14
            && stamp.chars().all(|c| c.is_ascii_digit())
            && suffix.len() == SUFFIX_LEN
            && suffix.chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AgentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for AgentId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for AgentId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    #[test]
    fn test_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let id = AgentId::generate_at(&Domain::Family, at);
        assert!(id.as_str().starts_with("PA-FAMILY-20240309140507-"));
        assert_eq!(id.as_str().len(), "PA-FAMILY-20240309140507-".len() + 8);
        assert!(id.is_well_formed());
    }

    #[test]
    fn test_same_second_ids_are_distinct() {
        let at = Utc::now();
        let ids: HashSet<AgentId> = (0..500)
            .map(|_| AgentId::generate_at(&Domain::Business, at))
            .collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn test_unrecognized_domain_is_uppercased() {
        let id = AgentId::generate(&Domain::Other("lab".into()));
        assert!(id.as_str().starts_with("PA-LAB-"));
        assert!(id.is_well_formed());
    }

    #[test]
    fn test_malformed_ids() {
        assert!(!AgentId::from_raw("agent-1").is_well_formed());
        assert!(!AgentId::from_raw("PA-X-2024-zzzzzzzz").is_well_formed());
        assert!(!AgentId::from_raw("PA--20240309140507-abcdef01").is_well_formed());
    }
}
