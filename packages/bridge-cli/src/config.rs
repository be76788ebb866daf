//! Probe configuration: a TOML file with a `[bridge]` table for the core and
//! a `[probe]` table for the tick loop. Every field is optional.
//!
//! ```toml
//! [bridge]
//! namespace = "plat"
//! text_policy = "replace"
//! stale_after_polls = 30
//!
//! [probe]
//! ticks = 20
//! tick_ms = 16
//! ```

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};
use platform_bridge::BridgeConfig;
use serde::{Deserialize, Serialize};

/// Tick loop settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Maximum number of poll ticks before giving up
    pub ticks: u64,
    /// Milliseconds between ticks
    pub tick_ms: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            ticks: 60,
            tick_ms: 16,
        }
    }
}

/// Everything the probe reads from its config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Core bridge configuration
    pub bridge: BridgeConfig,
    /// Tick loop settings
    pub probe: ProbeSettings,
}

impl ProbeConfig {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).wrap_err("invalid probe configuration")?;
        Ok(config)
    }

    /// Load from `path`, or defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            tracing::debug!("no config file given, using defaults");
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?;
        let config = Self::from_toml(&text)
            .wrap_err_with(|| format!("failed to load {}", path.display()))?;
        tracing::info!(path = %path.display(), "loaded probe configuration");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform_bridge::TextPolicy;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = ProbeConfig::load(None).unwrap();
        assert_eq!(config, ProbeConfig::default());
        assert_eq!(config.bridge.namespace, "plat");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[bridge]\ntext_policy = \"replace\"\n\n[probe]\nticks = 5").unwrap();

        let config = ProbeConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.bridge.text_policy, TextPolicy::Replace);
        assert_eq!(config.bridge.namespace, "plat");
        assert_eq!(config.bridge.stale_after_polls, 600);
        assert_eq!(config.probe.ticks, 5);
        assert_eq!(config.probe.tick_ms, 16);
    }

    #[test]
    fn test_bad_toml_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.toml");
        std::fs::write(&path, "[bridge]\nstale_after_polls = \"soon\"\n").unwrap();
        let err = ProbeConfig::load(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("probe.toml"));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProbeConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
