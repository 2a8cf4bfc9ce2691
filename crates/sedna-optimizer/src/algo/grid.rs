//! Exhaustive grid search.

use serde::{Deserialize, Serialize};
use tracing::info;

use sedna_space::{Dimension, DimensionKind, Number, Prior, Space};
use sedna_types::{AlgorithmError, ParameterValue, Params};

use super::{check_in_space, from_state, to_state, Algorithm, TrialRegistry};
use crate::trial::Trial;

const NAME: &str = "gridsearch";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// Grid points per continuous dimension, and the most points an
    /// integer dimension gets before it is subsampled.
    pub n_values: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { n_values: 10 }
    }
}

/// Walks the cartesian product of per-dimension grids in order.
///
/// Real dimensions are split into `n_values` evenly spaced points (log
/// spaced for `loguniform`), categorical dimensions use every option and
/// the fidelity dimension sits at its maximum.
#[derive(Debug, Clone)]
pub struct GridSearch {
    space: Space,
    grid: Vec<Params>,
    cursor: usize,
    registry: TrialRegistry,
}

#[derive(Serialize, Deserialize)]
struct GridState {
    cursor: usize,
    registry: TrialRegistry,
}

impl GridSearch {
    pub fn new(space: Space, config: GridConfig) -> Result<Self, AlgorithmError> {
        if config.n_values == 0 {
            return Err(invalid_config("n_values must be at least 1".to_string()));
        }
        let grid = Self::build_grid(&space, config.n_values)?;
        info!("Grid search over {} points", grid.len());
        Ok(Self {
            space,
            grid,
            cursor: 0,
            registry: TrialRegistry::default(),
        })
    }

    /// Number of points in the grid.
    pub fn len(&self) -> usize {
        self.grid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }

    fn build_grid(space: &Space, n_values: usize) -> Result<Vec<Params>, AlgorithmError> {
        let mut axes: Vec<(&str, Vec<ParameterValue>)> = Vec::new();
        for dim in space.iter() {
            axes.push((dim.name(), axis(dim, n_values)?));
        }

        // Cartesian product
        let mut result: Vec<Params> = vec![Params::new()];
        for (name, values) in &axes {
            let mut next = Vec::with_capacity(result.len() * values.len());
            for existing in &result {
                for value in values {
                    let mut combo = existing.clone();
                    combo.insert(name.to_string(), value.clone());
                    next.push(combo);
                }
            }
            result = next;
        }
        Ok(result)
    }
}

fn invalid_config(message: String) -> AlgorithmError {
    AlgorithmError::InvalidConfig {
        algorithm: NAME.to_string(),
        message,
    }
}

fn axis(dim: &Dimension, n_values: usize) -> Result<Vec<ParameterValue>, AlgorithmError> {
    if dim.shape().is_some() {
        return Err(invalid_config(format!(
            "dimension {dim} has a shape and cannot be put on a grid"
        )));
    }

    let values = match (dim.prior(), dim.kind()) {
        (Prior::Choices { options, .. }, _) => {
            options.iter().cloned().map(ParameterValue::Json).collect()
        }
        (Prior::Fidelity { .. }, _) => dim.fidelity_high().into_iter().collect(),
        (Prior::Normal { .. }, _) => {
            return Err(invalid_config(format!(
                "dimension {dim} is unbounded and cannot be put on a grid"
            )))
        }
        (Prior::Uniform { low, high }, DimensionKind::Integer) => {
            integer_axis(*low, *high, n_values, false)
        }
        (Prior::LogUniform { low, high }, DimensionKind::Integer) => {
            integer_axis(*low, *high, n_values, true)
        }
        (Prior::Uniform { low, high }, _) => linspace(low.as_f64(), high.as_f64(), n_values, false)
            .into_iter()
            .map(|v| ParameterValue::Float(round_to_precision(v, dim.precision())))
            .collect(),
        (Prior::LogUniform { low, high }, _) => {
            linspace(low.as_f64(), high.as_f64(), n_values, true)
                .into_iter()
                .map(|v| ParameterValue::Float(round_to_precision(v, dim.precision())))
                .collect()
        }
    };
    Ok(dedup(values))
}

fn integer_axis(low: Number, high: Number, n_values: usize, log: bool) -> Vec<ParameterValue> {
    let lo = low.as_f64().ceil() as i64;
    let hi = high.as_f64().floor() as i64;
    if (hi - lo + 1) as usize <= n_values {
        return (lo..=hi).map(ParameterValue::Int).collect();
    }
    linspace(lo as f64, hi as f64, n_values, log)
        .into_iter()
        .map(|v| ParameterValue::Int((v.round() as i64).clamp(lo, hi)))
        .collect()
}

/// `n` evenly spaced points over `[low, high]`, in log space when `log`.
fn linspace(low: f64, high: f64, n: usize, log: bool) -> Vec<f64> {
    if n == 1 {
        return vec![low];
    }
    let (start, end) = if log { (low.ln(), high.ln()) } else { (low, high) };
    (0..n)
        .map(|i| {
            let t = i as f64 / (n - 1) as f64;
            let v = start + t * (end - start);
            if log {
                v.exp().clamp(low, high)
            } else {
                v
            }
        })
        .collect()
}

fn round_to_precision(v: f64, precision: u32) -> f64 {
    format!("{:.*e}", precision.saturating_sub(1) as usize, v)
        .parse()
        .unwrap_or(v)
}

fn dedup(values: Vec<ParameterValue>) -> Vec<ParameterValue> {
    let mut unique: Vec<ParameterValue> = Vec::with_capacity(values.len());
    for value in values {
        if !unique.contains(&value) {
            unique.push(value);
        }
    }
    unique
}

impl Algorithm for GridSearch {
    fn name(&self) -> &str {
        NAME
    }

    fn space(&self) -> &Space {
        &self.space
    }

    fn suggest(&mut self, count: usize) -> Result<Vec<Trial>, AlgorithmError> {
        let end = (self.cursor + count).min(self.grid.len());
        let trials: Vec<Trial> = self.grid[self.cursor..end]
            .iter()
            .map(|params| Trial::new(&self.space, params.clone()))
            .collect();
        for trial in &trials {
            self.registry.register(trial.clone());
        }
        self.cursor = end;
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
        self.cursor >= self.grid.len() && self.registry.n_observed() >= self.grid.len()
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
            &GridState {
                cursor: self.cursor,
                registry: self.registry.clone(),
            },
        )
    }

    fn set_state(&mut self, state: &serde_json::Value) -> Result<(), AlgorithmError> {
        let state: GridState = from_state(NAME, state)?;
        if state.cursor > self.grid.len() {
            return Err(AlgorithmError::InvalidState {
                algorithm: NAME.to_string(),
                message: format!(
                    "cursor {} is past the {} grid points",
                    state.cursor,
                    self.grid.len()
                ),
            });
        }
        self.cursor = state.cursor;
        self.registry = state.registry;
        Ok(())
    }
}
