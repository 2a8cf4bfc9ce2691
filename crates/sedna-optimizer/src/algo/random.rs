//! Independent random sampling across the space.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use sedna_space::Space;
use sedna_types::AlgorithmError;

use super::{check_in_space, from_state, to_state, Algorithm, TrialRegistry, MAX_RETRY};
use crate::trial::Trial;

const NAME: &str = "random";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RandomConfig {
    /// Seed of the sampler. Drawn from the OS when absent.
    pub seed: Option<u64>,
}

/// Random search. Never suggests the same point twice.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: Space,
    rng: ChaCha8Rng,
    registry: TrialRegistry,
    /// Set once no unseen point turns up within `MAX_RETRY` draws.
    exhausted: bool,
}

#[derive(Serialize, Deserialize)]
struct RandomState {
    rng: ChaCha8Rng,
    registry: TrialRegistry,
    #[serde(default)]
    exhausted: bool,
}

impl RandomSearch {
    pub fn new(space: Space, config: RandomConfig) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        debug!("Random search seeded with {}", seed);
        Self {
            space,
            rng: ChaCha8Rng::seed_from_u64(seed),
            registry: TrialRegistry::default(),
            exhausted: false,
        }
    }

    fn sample_one(&mut self) -> Option<Trial> {
        for _ in 0..MAX_RETRY {
            let trial = Trial::new(&self.space, self.space.sample(&mut self.rng));
            if !self.registry.contains(&trial) {
                return Some(trial);
            }
        }
        None
    }
}

impl Algorithm for RandomSearch {
    fn name(&self) -> &str {
        NAME
    }

    fn space(&self) -> &Space {
        &self.space
    }

    fn suggest(&mut self, count: usize) -> Result<Vec<Trial>, AlgorithmError> {
        let mut trials = Vec::with_capacity(count);
        while trials.len() < count
            && !self.exhausted
            && (self.registry.n_suggested() as f64) < self.space.cardinality()
        {
            match self.sample_one() {
                Some(trial) => {
                    self.registry.register(trial.clone());
                    trials.push(trial);
                }
                None => {
                    debug!("No unseen point found after {} draws", MAX_RETRY);
                    self.exhausted = true;
                }
            }
        }
        Ok(trials)
    }

    fn observe(&mut self, trials: &[Trial]) -> Result<(), AlgorithmError> {
        for trial in trials {
            check_in_space(NAME, &self.space, trial)?;
            self.registry.register(trial.clone());
        }
        Ok(())
    }

    fn is_done(&self) -> bool {
        let observed = self.registry.n_observed();
        observed as f64 >= self.space.cardinality()
            || (self.exhausted && observed >= self.registry.n_suggested())
    }

    fn n_suggested(&self) -> usize {
        self.registry.n_suggested()
    }

    fn n_observed(&self) -> usize {
        self.registry.n_observed()
    }

    fn state_dict(&self) -> Result<serde_json::Value, AlgorithmError> {
        to_state(
            NAME,
            &RandomState {
                rng: self.rng.clone(),
                registry: self.registry.clone(),
                exhausted: self.exhausted,
            },
        )
    }

    fn set_state(&mut self, state: &serde_json::Value) -> Result<(), AlgorithmError> {
        let state: RandomState = from_state(NAME, state)?;
        self.rng = state.rng;
        self.registry = state.registry;
        self.exhausted = state.exhausted;
        Ok(())
    }
}
