//! # Bridge Configuration
//!
//! One immutable value, built at process start and threaded into every
//! codec and dispatcher the bridge constructs. Nothing in the crate reads
//! configuration from globals.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::native::sys::LINKED_NAMESPACE;

/// How native strings that are not valid UTF-8 are decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextPolicy {
    /// Reject with [`Error::InvalidEncoding`]
    #[default]
    Strict,
    /// Substitute U+FFFD for each invalid sequence
    Replace,
}

/// Configuration for a [`crate::PlatformBridge`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Entry point namespace; calls resolve to `<namespace>_<Noun>_<Verb>`.
    /// The fixed memory and queue symbols stay under
    /// [`LINKED_NAMESPACE`].
    pub namespace: String,
    /// Decoding policy for native text
    pub text_policy: TextPolicy,
    /// Polls after which an unanswered request is reported as stale
    pub stale_after_polls: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            namespace: LINKED_NAMESPACE.to_string(),
            text_policy: TextPolicy::Strict,
            stale_after_polls: 600,
        }
    }
}

impl BridgeConfig {
    /// Check the configuration before a bridge is built from it
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(Error::InvalidConfig("namespace must not be empty".into()));
        }
        let mut chars = self.namespace.chars();
        let head_ok = chars
            .next()
            .map(|c| c.is_ascii_alphabetic())
            .unwrap_or(false);
        if !head_ok || !chars.all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidConfig(format!(
                "namespace '{}' is not an alphanumeric identifier",
                self.namespace
            )));
        }
        if self.stale_after_polls == 0 {
            return Err(Error::InvalidConfig(
                "stale_after_polls must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.text_policy, TextPolicy::Strict);
    }

    #[test]
    fn test_default_namespace_matches_linked_symbols() {
        assert_eq!(BridgeConfig::default().namespace, "plat");
        assert_eq!(BridgeConfig::default().namespace, LINKED_NAMESPACE);
    }

    #[test]
    fn test_rejects_bad_namespace() {
        for ns in ["", "9lives", "plat_x", "pl at"] {
            let config = BridgeConfig {
                namespace: ns.to_string(),
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(Error::InvalidConfig(_))),
                "namespace {ns:?} accepted"
            );
        }
    }

    #[test]
    fn test_rejects_zero_stale_threshold() {
        let config = BridgeConfig {
            stale_after_polls: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: BridgeConfig = serde_json::from_str(r#"{"text_policy":"replace"}"#).unwrap();
        assert_eq!(config.text_policy, TextPolicy::Replace);
        assert_eq!(config.namespace, "plat");
        assert_eq!(config.stale_after_polls, 600);
    }
}
