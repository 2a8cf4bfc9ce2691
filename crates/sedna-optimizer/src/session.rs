//! The suggest/observe optimization session.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use sedna_space::Space;
use sedna_types::{config_error, AlgorithmError, ParameterValue, Params, SednaError, SednaResult};

use crate::algo::{Algorithm, AlgorithmRegistry};
use crate::config::OptimizationConfig;
use crate::trial::{HashOptions, Trial, TrialResult};

/// A candidate handed to the caller, plus the objective values observed
/// for it so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Identity of this draw: changes with fidelity, experiment and lineage.
    pub id: String,
    /// Identity of the parameter values alone.
    pub hash: String,
    pub params: Params,
    pub result: Vec<f64>,
}

impl Sample {
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.params.get(name)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.params.get(name).and_then(ParameterValue::as_f64)
    }
}

#[derive(Serialize, Deserialize)]
struct SessionState {
    experiment: Uuid,
    algorithm: String,
    algo: serde_json::Value,
    trials: BTreeMap<String, Trial>,
}

/// Drives one algorithm over one space for a single caller.
pub struct OptimizationSession {
    config: OptimizationConfig,
    space: Space,
    algo: Box<dyn Algorithm>,
    /// Suggested trials keyed by sample id.
    trials: HashMap<String, Trial>,
}

impl OptimizationSession {
    /// Session over the built-in algorithms. `max_trials == 0` leaves
    /// termination to the algorithm.
    pub fn new(
        algorithm: &str,
        space: Space,
        max_trials: usize,
        config: serde_json::Value,
    ) -> SednaResult<Self> {
        let config = OptimizationConfig::new(algorithm, algorithm)
            .with_max_trials(max_trials)
            .with_algorithm_config(config);
        Self::from_config(config, space, &AlgorithmRegistry::with_builtins())
    }

    /// Session resolving its algorithm through `registry`.
    pub fn from_config(
        config: OptimizationConfig,
        space: Space,
        registry: &AlgorithmRegistry,
    ) -> SednaResult<Self> {
        let algo = registry
            .create(&config.algorithm, space.clone(), &config.algorithm_config)
            .map_err(|e| match e {
                AlgorithmError::Unknown { .. } | AlgorithmError::InvalidConfig { .. } => {
                    SednaError::Config(e.to_string())
                }
                other => SednaError::Algorithm(other),
            })?;

        info!(
            "Created optimization session {} ({}) over {}",
            config.id,
            algo.name(),
            space
        );

        Ok(Self {
            config,
            space,
            algo,
            trials: HashMap::new(),
        })
    }

    /// Up to `count` new samples, in the order the algorithm produced them.
    pub fn suggest(&mut self, count: usize) -> SednaResult<Vec<Sample>> {
        let trials = self.algo.suggest(count)?;
        let mut samples = Vec::with_capacity(trials.len());

        for mut trial in trials {
            trial.experiment = Some(self.config.id);
            let sample = Sample {
                id: trial.id(),
                hash: trial.compute_trial_hash(HashOptions::params_only()),
                params: trial.params(),
                result: Vec::new(),
            };
            self.trials.insert(sample.id.clone(), trial);
            samples.push(sample);
        }

        debug!("Suggested {} of {} requested samples", samples.len(), count);
        Ok(samples)
    }

    /// Record `result` as the objective of `sample`.
    ///
    /// # Panics
    ///
    /// When the algorithm does not count exactly one new observation.
    pub fn observe(&mut self, sample: &mut Sample, result: f64) -> SednaResult<()> {
        let stored = self
            .trials
            .get(&sample.id)
            .ok_or_else(|| SednaError::SampleNotFound {
                id: sample.id.clone(),
            })?;
        if stored.objective().is_some() {
            return Err(SednaError::AlreadyObserved {
                id: sample.id.clone(),
            });
        }

        let mut trial = stored.clone();
        trial.results.push(TrialResult::objective(result));
        trial.mark_completed();

        let before = self.algo.n_observed();
        self.algo.observe(std::slice::from_ref(&trial))?;
        let after = self.algo.n_observed();
        assert_eq!(
            after,
            before + 1,
            "{} did not count the observation of {}: n_observed went from {} to {}",
            self.algo.name(),
            sample.id,
            before,
            after
        );

        sample.result.push(result);
        self.trials.insert(sample.id.clone(), trial);
        debug!("Observed {} = {}", sample.id, result);
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.algo.is_done()
            || (self.config.max_trials > 0 && self.algo.n_observed() >= self.config.max_trials)
    }

    /// Snapshot of the algorithm state and the trials suggested so far.
    pub fn state_dict(&self) -> SednaResult<serde_json::Value> {
        let state = SessionState {
            experiment: self.config.id,
            algorithm: self.algo.name().to_string(),
            algo: self.algo.state_dict()?,
            trials: self
                .trials
                .iter()
                .map(|(id, trial)| (id.clone(), trial.clone()))
                .collect(),
        };
        Ok(serde_json::to_value(state)?)
    }

    /// Restore a snapshot taken by [`state_dict`](Self::state_dict) on a
    /// session over the same algorithm and space.
    pub fn set_state(&mut self, state: &serde_json::Value) -> SednaResult<()> {
        let state: SessionState = serde_json::from_value(state.clone())?;
        if state.algorithm != self.algo.name() {
            return Err(config_error!(
                "snapshot of {} cannot be restored into {}",
                state.algorithm,
                self.algo.name()
            ));
        }

        self.algo.set_state(&state.algo)?;
        self.config.id = state.experiment;
        self.trials = state.trials.into_iter().collect();
        info!(
            "Restored session {} with {} trials",
            self.config.id,
            self.trials.len()
        );
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.config.id
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    pub fn space(&self) -> &Space {
        &self.space
    }

    pub fn algorithm_name(&self) -> &str {
        self.algo.name()
    }

    pub fn n_suggested(&self) -> usize {
        self.algo.n_suggested()
    }

    pub fn n_observed(&self) -> usize {
        self.algo.n_observed()
    }

    pub fn max_trials(&self) -> usize {
        self.config.max_trials
    }
}

impl std::fmt::Debug for OptimizationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizationSession")
            .field("id", &self.config.id)
            .field("algorithm", &self.algo.name())
            .field("space", &self.space)
            .field("n_suggested", &self.algo.n_suggested())
            .field("n_observed", &self.algo.n_observed())
            .finish()
    }
}
