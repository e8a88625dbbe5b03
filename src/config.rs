//! Ledger key layout and process configuration
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const INCOMPLETE_POLICIES_KEY: &str = "_incompletePolicies";
pub const PENDING_POLICIES_KEY: &str = "_pendingPolicies";
pub const ACTIVE_POLICIES_KEY: &str = "_activePolicies";
pub const POLICY_HOLDERS_KEY: &str = "_policyHolders";

/// The fixed ledger keys the engine reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerKeys {
    pub incomplete: String,
    pub pending: String,
    pub active: String,
    pub holders: String,
}

impl Default for LedgerKeys {
    fn default() -> Self {
        Self {
            incomplete: INCOMPLETE_POLICIES_KEY.into(),
            pending: PENDING_POLICIES_KEY.into(),
            active: ACTIVE_POLICIES_KEY.into(),
            holders: POLICY_HOLDERS_KEY.into(),
        }
    }
}

impl LedgerKeys {
    /// Default keys, each prefixed by `namespace`.
    pub fn namespaced(namespace: &str) -> Self {
        let keys = Self::default();
        Self {
            incomplete: format!("{namespace}{}", keys.incomplete),
            pending: format!("{namespace}{}", keys.pending),
            active: format!("{namespace}{}", keys.active),
            holders: format!("{namespace}{}", keys.holders),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub db_path: PathBuf,
    pub keys: LedgerKeys,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("policy-ledger.db"),
            keys: LedgerKeys::default(),
        }
    }
}

impl LedgerConfig {
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaced_keys_are_prefixed() {
        let keys = LedgerKeys::namespaced("tenant_a");
        assert_eq!(keys.incomplete, "tenant_a_incompletePolicies");
        assert_eq!(keys.holders, "tenant_a_policyHolders");
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = LedgerConfig::from_toml_str(
            r#"
            db_path = "/tmp/ledger"

            [keys]
            active = "live"
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/ledger"));
        assert_eq!(config.keys.active, "live");
        assert_eq!(config.keys.pending, PENDING_POLICIES_KEY);
    }

    #[test]
    fn empty_toml_is_default() {
        let config = LedgerConfig::from_toml_str("").unwrap();
        assert_eq!(config, LedgerConfig::default());
    }
}
