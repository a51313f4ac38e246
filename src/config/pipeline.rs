//! Pipeline configuration: recognizer thresholds, optimizer limits and cost constants,
//! generator output options.

use crate::error::{EngineError, EngineResult};
use crate::sql::dialect::Dialect;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Engine configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Entity recognition thresholds
    pub recognizer: RecognizerConfig,

    /// Optimizer limits and cost constants
    pub optimizer: OptimizerConfig,

    /// SQL output options
    pub generator: GeneratorConfig,

    /// Dialect used when the caller does not name one
    pub default_dialect: Dialect,

    /// Base table used when nothing in the text points at one
    pub default_table: Option<String>,
}

/// Entity recognizer configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Minimum normalized Levenshtein similarity for a fuzzy schema match
    pub fuzzy_threshold: f64,

    /// Entities at or below this confidence are discarded
    pub min_confidence: f64,

    /// Fraction of confidence removed from an ambiguous column binding
    pub ambiguity_penalty: f64,

    /// Extra synonyms: word -> schema object name (table or column)
    pub synonyms: HashMap<String, String>,
}

/// Optimizer configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Run the cost-based passes (false = basic layer only)
    pub enable_advanced: bool,

    /// Exhaustive join-order search is used only below this join count
    pub max_exhaustive_joins: usize,

    /// Upper bound on join orders evaluated before falling back to input order
    pub max_permutations: usize,

    /// Maximum number of optimization results kept in the plan cache
    pub cache_capacity: usize,

    /// Cache hits after which an aggregation is reported as worth materializing
    pub frequent_query_threshold: u64,

    /// Page size used by the scan cost formula
    pub page_bytes: u32,

    /// Row count assumed for tables without statistics
    pub default_row_count: u64,

    /// Per-row CPU cost constant (k) for join, aggregate and sort formulas
    pub cpu_cost: f64,

    /// Cost charged per filter predicate
    pub filter_cost_per_condition: f64,

    /// Hash join build/probe multiplier relative to k
    pub hash_join_factor: f64,

    /// Tables at or above this row count get create-index recommendations
    pub large_table_rows: u64,

    /// Tables at or above this row count get partition-by-date recommendations
    pub partition_rows: u64,
}

/// SQL generator configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Put each clause on its own line
    pub pretty: bool,

    /// Emit placeholders and a parameter list instead of inline literals
    pub parameterized: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            recognizer: RecognizerConfig::default(),
            optimizer: OptimizerConfig::default(),
            generator: GeneratorConfig::default(),
            default_dialect: Dialect::Sqlite,
            default_table: None,
        }
    }
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.7,
            min_confidence: 0.3,
            ambiguity_penalty: 0.3,
            synonyms: HashMap::new(),
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enable_advanced: true,
            max_exhaustive_joins: 5,
            max_permutations: 5_040,
            cache_capacity: 256,
            frequent_query_threshold: 3,
            page_bytes: 8_192,
            default_row_count: 1_000,
            cpu_cost: 0.01,
            filter_cost_per_condition: 1.0,
            hash_join_factor: 1.5,
            large_table_rows: 10_000,
            partition_rows: 1_000_000,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            pretty: false,
            parameterized: false,
        }
    }
}

impl EngineConfig {
    /// Config tuned for development: small cache, readable SQL
    pub fn development() -> Self {
        Self {
            optimizer: OptimizerConfig {
                cache_capacity: 32,
                ..Default::default()
            },
            generator: GeneratorConfig {
                pretty: true,
                parameterized: false,
            },
            ..Default::default()
        }
    }

    /// Config tuned for production: larger cache, parameterized SQL, postgres output
    pub fn production() -> Self {
        Self {
            optimizer: OptimizerConfig {
                cache_capacity: 4_096,
                max_exhaustive_joins: 4,
                ..Default::default()
            },
            generator: GeneratorConfig {
                pretty: false,
                parameterized: true,
            },
            default_dialect: Dialect::Postgres,
            ..Default::default()
        }
    }

    /// Parse a JSON config document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| EngineError::config(e.to_string()).with_context("config json"))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::config(e.to_string()).with_context(path.display().to_string())
        })?;
        Self::from_json_str(&content)
    }

    /// Reject thresholds outside their meaningful range
    pub fn validate(&self) -> EngineResult<()> {
        let r = &self.recognizer;
        for (name, value) in [
            ("recognizer.fuzzy_threshold", r.fuzzy_threshold),
            ("recognizer.min_confidence", r.min_confidence),
            ("recognizer.ambiguity_penalty", r.ambiguity_penalty),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::config(format!("{} must be within [0, 1], got {}", name, value)));
            }
        }

        let o = &self.optimizer;
        if o.max_exhaustive_joins == 0 {
            return Err(EngineError::config("optimizer.max_exhaustive_joins must be at least 1"));
        }
        if o.max_permutations == 0 {
            return Err(EngineError::config("optimizer.max_permutations must be at least 1"));
        }
        if o.cache_capacity == 0 {
            return Err(EngineError::config("optimizer.cache_capacity must be at least 1"));
        }
        if o.page_bytes == 0 {
            return Err(EngineError::config("optimizer.page_bytes must be positive"));
        }
        if o.cpu_cost <= 0.0 || o.filter_cost_per_condition < 0.0 || o.hash_join_factor <= 0.0 {
            return Err(EngineError::config("optimizer cost constants must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
        assert!(EngineConfig::development().validate().is_ok());
        assert!(EngineConfig::production().validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{"optimizer": {"max_exhaustive_joins": 3}, "default_dialect": "mysql"}"#,
        )
        .unwrap();
        assert_eq!(config.optimizer.max_exhaustive_joins, 3);
        assert_eq!(config.optimizer.cache_capacity, 256);
        assert_eq!(config.default_dialect, Dialect::MySql);
        assert_eq!(config.recognizer.fuzzy_threshold, 0.7);
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let err = EngineConfig::from_json_str(r#"{"recognizer": {"fuzzy_threshold": 1.5}}"#).unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"default_table": "orders"}}"#).unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.default_table.as_deref(), Some("orders"));
    }
}
