//! Optimization run configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sedna_types::SednaResult;

/// Configuration for an optimization session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationConfig {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    /// Registry name of the algorithm.
    pub algorithm: String,
    /// Observations after which the session is done. `0` leaves it to the
    /// algorithm.
    #[serde(default)]
    pub max_trials: usize,
    /// Algorithm specific settings, `null` for its defaults.
    #[serde(default)]
    pub algorithm_config: serde_json::Value,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl OptimizationConfig {
    pub fn new(name: &str, algorithm: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            algorithm: algorithm.to_string(),
            max_trials: 0,
            algorithm_config: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn from_json_str(json: &str) -> SednaResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_max_trials(mut self, n: usize) -> Self {
        self.max_trials = n;
        self
    }

    pub fn with_algorithm_config(mut self, config: serde_json::Value) -> Self {
        self.algorithm_config = config;
        self
    }

    /// Set `seed` in the algorithm configuration, keeping other settings.
    pub fn with_seed(mut self, seed: u64) -> Self {
        match &mut self.algorithm_config {
            serde_json::Value::Object(map) => {
                map.insert("seed".to_string(), seed.into());
            }
            other => *other = serde_json::json!({ "seed": seed }),
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sedna_types::SednaError;

    #[test]
    fn builder_methods() {
        let config = OptimizationConfig::new("tune", "random")
            .with_max_trials(10)
            .with_seed(7);
        assert_eq!(config.max_trials, 10);
        assert_eq!(config.algorithm_config, json!({"seed": 7}));

        let config = OptimizationConfig::new("tune", "gridsearch")
            .with_algorithm_config(json!({"n_values": 3}))
            .with_seed(1);
        assert_eq!(config.algorithm_config, json!({"n_values": 3, "seed": 1}));
    }

    #[test]
    fn loads_from_json_with_defaults() {
        let json = r#"{"name": "tune", "algorithm": "hyperband"}"#;
        let config = OptimizationConfig::from_json_str(json).unwrap();
        assert_eq!(config.algorithm, "hyperband");
        assert_eq!(config.max_trials, 0);
        assert!(config.algorithm_config.is_null());

        let err = OptimizationConfig::from_json_str(r#"{"name": "tune"}"#).unwrap_err();
        assert!(matches!(err, SednaError::Serialization(_)));
    }

    #[test]
    fn json_round_trip_keeps_identity() {
        let config = OptimizationConfig::new("tune", "random").with_max_trials(3);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(OptimizationConfig::from_json_str(&json).unwrap(), config);
    }
}
