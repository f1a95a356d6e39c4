//! Settings that shape the generated XKlaim code.

use std::path::Path;

use serde::Deserialize;

use crate::Result;

/// Translator settings. Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Physical address written into the `net` declaration
    pub network_address: String,
    /// Appended to a participant name to form its location variable, e.g. `bob` + `Loc`
    pub reference_suffix: String,
    /// How deeply gateways may nest inside each other's branches
    pub max_nesting_depth: usize,
    /// Bounded wait (ms) used by the guards of an event-based gateway
    pub event_poll_ms: u64,
    /// How long (ms) a thrown signal stays published before it is withdrawn
    pub signal_hold_ms: u64,
    /// Run the peephole optimizer over the generated code
    pub optimize: bool,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        TranslatorConfig {
            network_address: "localhost:9999".to_string(),
            reference_suffix: "Loc".to_string(),
            max_nesting_depth: 32,
            event_poll_ms: 100,
            signal_hold_ms: 1000,
            optimize: true,
        }
    }
}

impl TranslatorConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() -> Result<()> {
        let config = TranslatorConfig::from_toml_str("network_address = \"10.0.0.1:7000\"\noptimize = false\n")?;
        assert_eq!(config.network_address, "10.0.0.1:7000");
        assert!(!config.optimize);
        assert_eq!(config.reference_suffix, "Loc");
        assert_eq!(config.max_nesting_depth, 32);
        Ok(())
    }

    #[test]
    fn test_rejects_wrong_types() {
        assert!(TranslatorConfig::from_toml_str("max_nesting_depth = \"deep\"").is_err());
    }
}
