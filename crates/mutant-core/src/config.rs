//! Configuration types for a mutation run.

use crate::types::StrategyKind;
use serde::{Deserialize, Serialize};

/// Mutant generation and scoring parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Stop a function/strategy pair at its first escaped mutant
    pub stop_on_escape: bool,
    /// Seed for the random integer replacement (entropy when unset)
    pub seed: Option<u64>,
    /// Random integer replacements are drawn from `[-random_range, random_range]`
    pub random_range: i64,
    /// Strategies applied to every function, in order
    pub strategies: Vec<StrategyKind>,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            stop_on_escape: false,
            seed: None,
            random_range: 1024,
            strategies: StrategyKind::ALL.to_vec(),
        }
    }
}

/// Interpreter limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Maximum instructions executed per top-level call
    pub max_fuel: u64,
    /// Maximum nested call depth
    pub max_call_depth: usize,
    /// Longest string (in bytes) or tuple a single operation may build
    pub max_sequence_len: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_fuel: 100_000,
            max_call_depth: 64,
            max_sequence_len: 1 << 20,
        }
    }
}

/// Example harness options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Suppress per-example failure reports
    pub quiet: bool,
}

/// Complete configuration for one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MutantConfig {
    pub mutation: MutationConfig,
    pub runtime: RuntimeConfig,
    pub harness: HarnessConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs() {
        let mutation = MutationConfig::default();
        assert!(!mutation.stop_on_escape);
        assert_eq!(mutation.random_range, 1024);
        assert_eq!(mutation.strategies, StrategyKind::ALL.to_vec());

        let runtime = RuntimeConfig::default();
        assert_eq!(runtime.max_fuel, 100_000);
        assert_eq!(runtime.max_sequence_len, 1 << 20);
    }

    #[test]
    fn test_config_serialization() {
        let config = MutantConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: MutantConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.mutation.random_range, config.mutation.random_range);
        assert_eq!(deserialized.runtime.max_call_depth, config.runtime.max_call_depth);
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let json = r#"{"stop_on_escape":false,"seed":null,"random_range":10,"strategies":["swap"]}"#;
        assert!(serde_json::from_str::<MutationConfig>(json).is_err());
    }
}
