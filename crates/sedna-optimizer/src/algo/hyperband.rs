//! Hyperband: successive halving over a family of brackets.
//!
//! Each bracket starts many trials at a low fidelity and promotes the best
//! `1/base` of every completed rung to the next, higher fidelity. Brackets
//! trade the number of starting points against their starting budget, from
//! the most aggressive (`s = s_max`) down to plain random search at full
//! fidelity (`s = 0`).

use std::collections::{BTreeMap, BTreeSet};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use sedna_space::{Number, Prior, Space};
use sedna_types::{AlgorithmError, ParameterValue, Params};

use super::{check_in_space, from_state, to_state, Algorithm, TrialRegistry, MAX_RETRY};
use crate::trial::{HashOptions, Trial};

const NAME: &str = "hyperband";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HyperbandConfig {
    /// Seed of the sampler. Drawn from the OS when absent.
    pub seed: Option<u64>,
    /// Passes over all brackets. Unlimited when absent.
    pub repetitions: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Rung {
    resources: ParameterValue,
    capacity: usize,
    /// Keyed by parameter hash.
    trials: BTreeMap<String, Trial>,
}

impl Rung {
    fn new(capacity: usize, resources: ParameterValue) -> Self {
        Self {
            resources,
            capacity,
            trials: BTreeMap::new(),
        }
    }

    fn is_filled(&self) -> bool {
        self.trials.len() >= self.capacity
    }

    fn is_complete(&self) -> bool {
        self.is_filled() && self.trials.values().all(|t| t.objective().is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Bracket {
    rungs: Vec<Rung>,
}

impl Bracket {
    fn new(budget: &[(usize, ParameterValue)]) -> Self {
        Self {
            rungs: budget
                .iter()
                .map(|(capacity, resources)| Rung::new(*capacity, resources.clone()))
                .collect(),
        }
    }

    fn is_complete(&self) -> bool {
        self.rungs.last().map_or(true, Rung::is_complete)
    }

    /// Promote the best trial of the highest completed rung that still has
    /// room above it.
    fn promote(&mut self) -> Option<Trial> {
        for i in (0..self.rungs.len().saturating_sub(1)).rev() {
            if !self.rungs[i].is_complete() || self.rungs[i + 1].is_filled() {
                continue;
            }

            let mut candidates: Vec<(&String, &Trial)> = self.rungs[i].trials.iter().collect();
            candidates.sort_by(|(_, a), (_, b)| {
                let a = a.objective().map_or(f64::INFINITY, |r| r.value);
                let b = b.objective().map_or(f64::INFINITY, |r| r.value);
                a.total_cmp(&b)
            });

            let next = &self.rungs[i + 1];
            let promoted = candidates
                .into_iter()
                .find(|(key, _)| !next.trials.contains_key(*key))
                .map(|(key, trial)| (key.clone(), trial.branch(next.resources.clone())));

            if let Some((key, trial)) = promoted {
                debug!("Promoting {} to rung {}", key, i + 1);
                self.rungs[i + 1].trials.insert(key, trial.clone());
                return Some(trial);
            }
        }
        None
    }

    /// Shrink rungs to what the first rung actually holds, once no new
    /// point can be sampled.
    fn truncate(&mut self) {
        let mut limit = usize::MAX;
        for (i, rung) in self.rungs.iter_mut().enumerate() {
            if i == 0 {
                rung.capacity = rung.trials.len();
            } else {
                rung.capacity = rung.capacity.min(limit);
            }
            limit = rung.capacity;
        }
    }

    fn find_mut(&mut self, param_hash: &str, key: &str) -> Option<&mut Trial> {
        self.rungs
            .iter_mut()
            .filter_map(|rung| rung.trials.get_mut(param_hash))
            .find(|trial| TrialRegistry::key(trial) == key)
    }
}

/// Capacities and resources of every rung of every bracket, most
/// aggressive bracket first.
fn budgets(low: Number, high: Number, base: f64) -> Vec<Vec<(usize, ParameterValue)>> {
    let (low_f, high_f) = (low.as_f64(), high.as_f64());
    let integral = low.is_int() && high.is_int();
    let s_max = ((high_f / low_f).ln() / base.ln() + 1e-9).floor().max(0.0) as i32;

    let resources = |v: f64| {
        let v = v.clamp(low_f, high_f);
        if integral {
            ParameterValue::Int((v.round() as i64).clamp(low_f as i64, high_f as i64))
        } else {
            ParameterValue::Float(v)
        }
    };

    (0..=s_max)
        .rev()
        .map(|s| {
            let n = ((s_max + 1) as f64 / (s + 1) as f64 * base.powi(s)).ceil();
            let r = high_f * base.powi(-s);
            (0..=s)
                .map(|i| {
                    let capacity = ((n * base.powi(-i)).floor() as usize).max(1);
                    let value = if i == s { high_f } else { r * base.powi(i) };
                    (capacity, resources(value))
                })
                .collect()
        })
        .collect()
}

/// Hyperband over the fidelity dimension of the space.
#[derive(Debug, Clone)]
pub struct Hyperband {
    space: Space,
    fidelity: String,
    budgets: Vec<Vec<(usize, ParameterValue)>>,
    repetitions: Option<usize>,
    rng: ChaCha8Rng,
    registry: TrialRegistry,
    brackets: Vec<Bracket>,
    current: usize,
    repetition: usize,
    /// Parameter hashes of every point sampled so far.
    seen: BTreeSet<String>,
    /// Set once no unseen point turns up within `MAX_RETRY` draws.
    exhausted: bool,
}

#[derive(Serialize, Deserialize)]
struct HyperbandState {
    rng: ChaCha8Rng,
    registry: TrialRegistry,
    brackets: Vec<Bracket>,
    current: usize,
    repetition: usize,
    seen: BTreeSet<String>,
    #[serde(default)]
    exhausted: bool,
}

impl Hyperband {
    pub fn new(space: Space, config: HyperbandConfig) -> Result<Self, AlgorithmError> {
        let invalid = |message: String| AlgorithmError::InvalidConfig {
            algorithm: NAME.to_string(),
            message,
        };

        let dim = space
            .fidelity()
            .ok_or_else(|| invalid(format!("{space} has no fidelity dimension")))?;
        let Prior::Fidelity { low, high, base } = dim.prior() else {
            return Err(invalid(format!("{dim} is not a fidelity dimension")));
        };
        if base.as_f64() <= 1.0 {
            return Err(invalid(format!("{dim} needs a base above 1")));
        }
        if config.repetitions == Some(0) {
            return Err(invalid("repetitions must be at least 1".to_string()));
        }

        let budgets = budgets(*low, *high, base.as_f64());
        info!("Hyperband over {} with {} brackets", dim, budgets.len());

        let seed = config.seed.unwrap_or_else(rand::random);
        let fidelity = dim.name().to_string();
        let brackets = budgets.iter().map(|b| Bracket::new(b)).collect();
        Ok(Self {
            space,
            fidelity,
            budgets,
            repetitions: config.repetitions,
            rng: ChaCha8Rng::seed_from_u64(seed),
            registry: TrialRegistry::default(),
            brackets,
            current: 0,
            repetition: 0,
            seen: BTreeSet::new(),
            exhausted: false,
        })
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted || self.seen.len() as f64 >= self.space.cardinality()
    }

    fn last_pass(&self) -> bool {
        self.is_exhausted() || self.repetitions.map_or(false, |r| self.repetition + 1 >= r)
    }

    /// A new point at `resources`, unique over the non-fidelity parameters.
    fn sample_unseen(&mut self, resources: &ParameterValue) -> Option<(String, Trial)> {
        for _ in 0..MAX_RETRY {
            let mut params: Params = self.space.sample(&mut self.rng);
            params.insert(self.fidelity.clone(), resources.clone());
            let trial = Trial::new(&self.space, params);
            let key = trial.compute_trial_hash(HashOptions::params_only());
            if self.seen.insert(key.clone()) {
                return Some((key, trial));
            }
        }
        None
    }

    fn next_trial(&mut self) -> Option<Trial> {
        loop {
            let current = self.current;

            if let Some(trial) = self.brackets[current].promote() {
                return Some(trial);
            }

            if !self.brackets[current].rungs[0].is_filled() {
                let resources = self.brackets[current].rungs[0].resources.clone();
                let sampled = if self.exhausted {
                    None
                } else {
                    self.sample_unseen(&resources)
                };
                match sampled {
                    Some((key, trial)) => {
                        self.brackets[current].rungs[0].trials.insert(key, trial.clone());
                        return Some(trial);
                    }
                    None => {
                        debug!("Space exhausted, truncating bracket {}", current);
                        self.exhausted = true;
                        self.brackets[current].truncate();
                        if let Some(trial) = self.brackets[current].promote() {
                            return Some(trial);
                        }
                    }
                }
            }

            if !self.brackets[current].is_complete() {
                return None;
            }

            if current + 1 < self.brackets.len() {
                self.current += 1;
                info!("Hyperband moving to bracket {}", self.current);
                continue;
            }

            if self.last_pass() {
                return None;
            }
            self.repetition += 1;
            self.current = 0;
            self.brackets = self.budgets.iter().map(|b| Bracket::new(b)).collect();
            info!("Hyperband starting repetition {}", self.repetition);
        }
    }
}

impl Algorithm for Hyperband {
    fn name(&self) -> &str {
        NAME
    }

    fn space(&self) -> &Space {
        &self.space
    }

    fn suggest(&mut self, count: usize) -> Result<Vec<Trial>, AlgorithmError> {
        let mut trials = Vec::with_capacity(count);
        while trials.len() < count {
            match self.next_trial() {
                Some(trial) => {
                    self.registry.register(trial.clone());
                    trials.push(trial);
                }
                None => break,
            }
        }
        Ok(trials)
    }

    fn observe(&mut self, trials: &[Trial]) -> Result<(), AlgorithmError> {
        for trial in trials {
            check_in_space(NAME, &self.space, trial)?;
            let param_hash = trial.compute_trial_hash(HashOptions::params_only());
            let key = TrialRegistry::key(trial);
            for bracket in &mut self.brackets {
                if let Some(slot) = bracket.find_mut(&param_hash, &key) {
                    *slot = trial.clone();
                    break;
                }
            }
            self.registry.register(trial.clone());
        }
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.last_pass() && self.brackets.iter().all(Bracket::is_complete)
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
            &HyperbandState {
                rng: self.rng.clone(),
                registry: self.registry.clone(),
                brackets: self.brackets.clone(),
                current: self.current,
                repetition: self.repetition,
                seen: self.seen.clone(),
                exhausted: self.exhausted,
            },
        )
    }

    fn set_state(&mut self, state: &serde_json::Value) -> Result<(), AlgorithmError> {
        let state: HyperbandState = from_state(NAME, state)?;
        if state.brackets.len() != self.budgets.len() || state.current >= self.budgets.len() {
            return Err(AlgorithmError::InvalidState {
                algorithm: NAME.to_string(),
                message: format!(
                    "state holds {} brackets, the space gives {}",
                    state.brackets.len(),
                    self.budgets.len()
                ),
            });
        }
        self.rng = state.rng;
        self.registry = state.registry;
        self.brackets = state.brackets;
        self.current = state.current;
        self.repetition = state.repetition;
        self.seen = state.seen;
        self.exhausted = state.exhausted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::TrialResult;
    use sedna_space::{choices, fidelity, get_space, hyperparameter, uniform};

    fn space_with(epoch: sedna_space::DimFactory) -> Space {
        let fun = hyperparameter([("a", uniform(0, 1)), ("epoch", epoch)])
            .unwrap()
            .decorate(());
        get_space(&fun).unwrap()
    }

    fn hyperband(space: Space, repetitions: Option<usize>) -> Hyperband {
        Hyperband::new(
            space,
            HyperbandConfig {
                seed: Some(1),
                repetitions,
            },
        )
        .unwrap()
    }

    /// Suggest and observe until done, scoring each trial by `a`.
    fn run(algo: &mut Hyperband) -> Vec<Trial> {
        let mut all = Vec::new();
        while !algo.is_done() {
            let trials = algo.suggest(4).unwrap();
            assert!(!trials.is_empty(), "hyperband stalled with nothing pending");
            for mut trial in trials {
                let score = trial.param("a").and_then(ParameterValue::as_f64).unwrap();
                trial.results.push(TrialResult::objective(score));
                algo.observe(&[trial.clone()]).unwrap();
                all.push(trial);
            }
        }
        all
    }

    #[test]
    fn bracket_budgets() {
        let b = budgets(Number::Int(2), Number::Int(10), 2.0);
        let int = ParameterValue::Int;
        assert_eq!(
            b,
            vec![
                vec![(4, int(3)), (2, int(5)), (1, int(10))],
                vec![(3, int(5)), (1, int(10))],
                vec![(3, int(10))],
            ]
        );

        let b = budgets(Number::Int(1), Number::Int(1), 2.0);
        assert_eq!(b, vec![vec![(1, int(1))]]);
    }

    #[test]
    fn requires_a_fidelity_dimension() {
        let fun = hyperparameter([("a", uniform(0, 1))]).unwrap().decorate(());
        let space = get_space(&fun).unwrap();
        match Hyperband::new(space, HyperbandConfig::default()) {
            Err(AlgorithmError::InvalidConfig { algorithm, .. }) => {
                assert_eq!(algorithm, "hyperband")
            }
            other => panic!("expected InvalidConfig, got {other:?}"),
        }

        let space = space_with(fidelity(1, 16).base(1));
        assert!(Hyperband::new(space, HyperbandConfig::default()).is_err());
    }

    #[test]
    fn one_pass_runs_every_rung() {
        let mut algo = hyperband(space_with(fidelity(2, 10)), Some(1));
        let trials = run(&mut algo);

        assert_eq!(trials.len(), 14);
        assert_eq!(algo.n_suggested(), 14);
        assert_eq!(algo.n_observed(), 14);

        let at = |v: i64| {
            trials
                .iter()
                .filter(|t| t.fidelity() == Some(&ParameterValue::Int(v)))
                .count()
        };
        assert_eq!(at(3), 4);
        assert_eq!(at(5), 2 + 3);
        assert_eq!(at(10), 1 + 1 + 3);
        assert!(algo.suggest(1).unwrap().is_empty());
    }

    #[test]
    fn promotes_the_best_trials() {
        let mut algo = hyperband(space_with(fidelity(2, 10)), Some(1));
        let trials = run(&mut algo);

        let mut first_rung: Vec<&Trial> = trials[..4].iter().collect();
        first_rung.sort_by(|a, b| {
            let a = a.objective().map(|r| r.value).unwrap_or_default();
            let b = b.objective().map(|r| r.value).unwrap_or_default();
            a.total_cmp(&b)
        });

        let promoted: Vec<&Trial> = trials
            .iter()
            .filter(|t| t.parent.is_some() && t.fidelity() == Some(&ParameterValue::Int(5)))
            .collect();
        assert_eq!(promoted.len(), 2);
        for (best, child) in first_rung.iter().zip(&promoted) {
            assert_eq!(child.param("a"), best.param("a"));
            assert_eq!(
                child.parent.as_deref(),
                Some(TrialRegistry::key(best).as_str())
            );
        }
    }

    #[test]
    fn waits_for_observations_before_promoting() {
        let mut algo = hyperband(space_with(fidelity(2, 10)), Some(1));
        let first = algo.suggest(10).unwrap();
        assert_eq!(first.len(), 4);
        assert!(algo.suggest(1).unwrap().is_empty());
        assert!(!algo.is_done());
    }

    #[test]
    fn small_space_is_exhausted() {
        let fun = hyperparameter([("opt", choices(["sgd", "adam"])), ("epoch", fidelity(1, 4))])
            .unwrap()
            .decorate(());
        let space = get_space(&fun).unwrap();
        let mut algo = hyperband(space, None);

        let mut pending = algo.suggest(10).unwrap();
        let mut total = 0;
        while !pending.is_empty() {
            total += pending.len();
            for mut trial in pending {
                trial.results.push(TrialResult::objective(1.0));
                algo.observe(&[trial]).unwrap();
            }
            pending = algo.suggest(10).unwrap();
        }
        assert!(algo.is_done());
        assert_eq!(algo.seen.len(), 2);
        assert_eq!(algo.n_suggested(), total);
    }

    #[test]
    fn coarse_precision_ends_unlimited_repetitions() {
        let fun = hyperparameter([("a", uniform(1, 2).precision(2)), ("epoch", fidelity(1, 4))])
            .unwrap()
            .decorate(());
        let mut algo = hyperband(get_space(&fun).unwrap(), None);

        let trials = run(&mut algo);
        assert!(algo.is_done());
        assert!(algo.seen.len() <= 11);
        assert_eq!(algo.n_observed(), trials.len());
        assert!(algo.suggest(4).unwrap().is_empty());

        let mut restored = hyperband(get_space(&fun).unwrap(), None);
        restored.set_state(&algo.state_dict().unwrap()).unwrap();
        assert!(restored.is_done());
    }

    #[test]
    fn state_round_trip() {
        let mut algo = hyperband(space_with(fidelity(2, 10)), Some(1));
        let pending = algo.suggest(4).unwrap();
        for mut trial in pending {
            trial.results.push(TrialResult::objective(0.5));
            algo.observe(&[trial]).unwrap();
        }
        let state = algo.state_dict().unwrap();

        let mut restored = hyperband(space_with(fidelity(2, 10)), Some(1));
        restored.set_state(&state).unwrap();
        assert_eq!(restored.n_observed(), 4);

        let a: Vec<Params> = algo.suggest(3).unwrap().iter().map(Trial::params).collect();
        let b: Vec<Params> = restored.suggest(3).unwrap().iter().map(Trial::params).collect();
        assert_eq!(a, b);

        let mut other = hyperband(space_with(fidelity(1, 81).base(3)), Some(1));
        assert!(matches!(
            other.set_state(&state),
            Err(AlgorithmError::InvalidState { .. })
        ));
    }
}
