//! Engine configuration.
//!
//! Every knob has a default, so an empty JSON object is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How the `if` operator treats the branch it does not select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionalMode {
    /// Only the selected branch is evaluated.
    #[default]
    Lazy,
    /// Both branches are evaluated, so errors in the untaken branch surface.
    Eager,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub conditional: ConditionalMode,
    /// Allow `max`/`min` with a single operand (a pass-through).
    pub single_operand_extrema: bool,
    /// Absolute tolerance used by `equal` and `notEqual` on numbers; `0.0`
    /// compares exactly.
    pub equality_tolerance: f64,
    /// Deepest nesting of operations a step may contain.
    pub max_nesting_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            conditional: ConditionalMode::Lazy,
            single_operand_extrema: true,
            equality_tolerance: 0.0,
            max_nesting_depth: 64,
        }
    }
}

impl EngineConfig {
    /// Eager conditionals and at least two operands for `max`/`min`.
    pub fn strict() -> Self {
        Self {
            conditional: ConditionalMode::Eager,
            single_operand_extrema: false,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config =
            EngineConfig::from_json(r#"{"conditional": "eager", "maxNestingDepth": 8}"#).unwrap();
        assert_eq!(config.conditional, ConditionalMode::Eager);
        assert_eq!(config.max_nesting_depth, 8);
        assert!(config.single_operand_extrema);
    }

    #[test]
    fn test_rejects_unknown_mode() {
        assert!(EngineConfig::from_json(r#"{"conditional": "sometimes"}"#).is_err());
    }
}
