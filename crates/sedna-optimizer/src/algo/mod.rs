//! Optimization algorithms and the registry that constructs them by name.

mod grid;
mod hyperband;
mod random;

pub use grid::{GridConfig, GridSearch};
pub use hyperband::{Hyperband, HyperbandConfig};
pub use random::{RandomConfig, RandomSearch};

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use sedna_space::Space;
use sedna_types::AlgorithmError;

use crate::trial::{HashOptions, Trial};

/// Attempts at drawing an unseen point before a sampler gives up.
pub(crate) const MAX_RETRY: usize = 100;

/// Common trait for all optimization algorithms.
pub trait Algorithm: Send {
    /// Registry name of the algorithm.
    fn name(&self) -> &str;

    fn space(&self) -> &Space;

    /// Up to `count` new trials. Fewer, possibly none, when the algorithm
    /// has nothing to hand out until pending trials are observed.
    fn suggest(&mut self, count: usize) -> Result<Vec<Trial>, AlgorithmError>;

    /// Report evaluated trials.
    fn observe(&mut self, trials: &[Trial]) -> Result<(), AlgorithmError>;

    fn is_done(&self) -> bool;

    fn n_suggested(&self) -> usize;

    fn n_observed(&self) -> usize;

    /// Snapshot of the internal state.
    fn state_dict(&self) -> Result<serde_json::Value, AlgorithmError>;

    fn set_state(&mut self, state: &serde_json::Value) -> Result<(), AlgorithmError>;
}

/// Trials an algorithm has handed out, keyed by [`HashOptions::algorithm`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialRegistry {
    trials: BTreeMap<String, Trial>,
}

impl TrialRegistry {
    pub fn key(trial: &Trial) -> String {
        trial.compute_trial_hash(HashOptions::algorithm())
    }

    pub fn contains(&self, trial: &Trial) -> bool {
        self.trials.contains_key(&Self::key(trial))
    }

    /// Insert or replace `trial`, returning its key.
    pub fn register(&mut self, trial: Trial) -> String {
        let key = Self::key(&trial);
        self.trials.insert(key.clone(), trial);
        key
    }

    pub fn get(&self, key: &str) -> Option<&Trial> {
        self.trials.get(key)
    }

    pub fn n_suggested(&self) -> usize {
        self.trials.len()
    }

    pub fn n_observed(&self) -> usize {
        self.trials.values().filter(|t| t.objective().is_some()).count()
    }
}

/// Deserialize an algorithm configuration. `null` means all defaults.
pub(crate) fn parse_config<T>(
    algorithm: &str,
    config: &serde_json::Value,
) -> Result<T, AlgorithmError>
where
    T: DeserializeOwned + Default,
{
    if config.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(config.clone()).map_err(|e| AlgorithmError::InvalidConfig {
        algorithm: algorithm.to_string(),
        message: e.to_string(),
    })
}

pub(crate) fn to_state<T: Serialize>(
    algorithm: &str,
    state: &T,
) -> Result<serde_json::Value, AlgorithmError> {
    serde_json::to_value(state).map_err(|e| AlgorithmError::InvalidState {
        algorithm: algorithm.to_string(),
        message: e.to_string(),
    })
}

pub(crate) fn from_state<T: DeserializeOwned>(
    algorithm: &str,
    state: &serde_json::Value,
) -> Result<T, AlgorithmError> {
    serde_json::from_value(state.clone()).map_err(|e| AlgorithmError::InvalidState {
        algorithm: algorithm.to_string(),
        message: e.to_string(),
    })
}

/// Reject trials whose parameters fall outside `space`.
pub(crate) fn check_in_space(
    algorithm: &str,
    space: &Space,
    trial: &Trial,
) -> Result<(), AlgorithmError> {
    if space.contains(&trial.params()) {
        Ok(())
    } else {
        Err(AlgorithmError::TrialRejected {
            algorithm: algorithm.to_string(),
            message: format!("parameters {:?} are outside of {space}", trial.params()),
        })
    }
}

/// Builds an algorithm over a space from its configuration.
pub type AlgorithmConstructor = Arc<
    dyn Fn(Space, &serde_json::Value) -> Result<Box<dyn Algorithm>, AlgorithmError> + Send + Sync,
>;

/// Algorithms available by name.
///
/// Nothing is registered implicitly: start from [`AlgorithmRegistry::with_builtins`]
/// and [`register`](AlgorithmRegistry::register) plugins explicitly.
#[derive(Clone, Default)]
pub struct AlgorithmRegistry {
    constructors: BTreeMap<String, AlgorithmConstructor>,
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `random`, `gridsearch` and `hyperband`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("random", |space, config| {
            Ok(Box::new(RandomSearch::new(space, parse_config("random", config)?)))
        });
        registry.register("gridsearch", |space, config| {
            Ok(Box::new(GridSearch::new(space, parse_config("gridsearch", config)?)?))
        });
        registry.register("hyperband", |space, config| {
            Ok(Box::new(Hyperband::new(space, parse_config("hyperband", config)?)?))
        });
        registry
    }

    /// Register `constructor` under `name` (case-insensitive), replacing any
    /// previous entry.
    pub fn register<F>(&mut self, name: &str, constructor: F) -> &mut Self
    where
        F: Fn(Space, &serde_json::Value) -> Result<Box<dyn Algorithm>, AlgorithmError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.to_lowercase();
        debug!("Registering algorithm {}", name);
        self.constructors.insert(name, Arc::new(constructor));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(&name.to_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    pub fn create(
        &self,
        name: &str,
        space: Space,
        config: &serde_json::Value,
    ) -> Result<Box<dyn Algorithm>, AlgorithmError> {
        match self.constructors.get(&name.to_lowercase()) {
            Some(constructor) => constructor(space, config),
            None => Err(AlgorithmError::Unknown {
                name: name.to_string(),
                available: self.names().collect::<Vec<_>>().join(", "),
            }),
        }
    }
}

impl std::fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorithmRegistry")
            .field("algorithms", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sedna_space::{get_space, hyperparameter, uniform};
    use serde_json::json;

    fn sample_space() -> Space {
        let fun = hyperparameter([("a", uniform(0, 1))]).unwrap().decorate(());
        get_space(&fun).unwrap()
    }

    #[test]
    fn builtins_are_registered() {
        let registry = AlgorithmRegistry::with_builtins();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec!["gridsearch", "hyperband", "random"]);
        assert!(registry.contains("Random"));
    }

    #[test]
    fn unknown_algorithm() {
        let registry = AlgorithmRegistry::with_builtins();
        match registry.create("tpe", sample_space(), &json!(null)) {
            Err(AlgorithmError::Unknown { name, available }) => {
                assert_eq!(name, "tpe");
                assert!(available.contains("random"));
            }
            Err(other) => panic!("expected Unknown, got {other:?}"),
            Ok(_) => panic!("expected Unknown, got an algorithm"),
        }
    }

    #[test]
    fn invalid_configuration() {
        let registry = AlgorithmRegistry::with_builtins();
        let result = registry.create("random", sample_space(), &json!({"seed": "abc"}));
        assert!(matches!(result, Err(AlgorithmError::InvalidConfig { .. })));

        let result = registry.create("random", sample_space(), &json!({"n_values": 3}));
        assert!(matches!(result, Err(AlgorithmError::InvalidConfig { .. })));
    }

    #[test]
    fn plugins_register_explicitly() {
        let mut registry = AlgorithmRegistry::new();
        assert!(registry.create("random", sample_space(), &json!(null)).is_err());

        registry.register("my_random", |space, config| {
            Ok(Box::new(RandomSearch::new(space, parse_config("my_random", config)?)))
        });
        let algo = registry
            .create("MY_RANDOM", sample_space(), &json!({"seed": 1}))
            .unwrap();
        assert_eq!(algo.name(), "random");
    }

    #[test]
    fn trial_registry_counts_observed() {
        let space = sample_space();
        let mut registry = TrialRegistry::default();
        let mut params = sedna_types::Params::new();
        params.insert("a".into(), sedna_types::ParameterValue::Float(0.5));
        let mut trial = Trial::new(&space, params);

        let key = registry.register(trial.clone());
        assert_eq!(registry.n_suggested(), 1);
        assert_eq!(registry.n_observed(), 0);

        trial.results.push(crate::trial::TrialResult::objective(1.0));
        assert_eq!(registry.register(trial.clone()), key);
        assert_eq!(registry.n_suggested(), 1);
        assert_eq!(registry.n_observed(), 1);
        assert!(registry.contains(&trial));
    }
}
