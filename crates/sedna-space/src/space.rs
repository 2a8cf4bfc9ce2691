//! The executable search space.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use sedna_types::{Params, SpaceError};

use crate::dimension::Dimension;

/// A set of named dimensions, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Space {
    dimensions: BTreeMap<String, Dimension>,
}

impl Space {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dimension. Names must be unique and a space holds at most one
    /// fidelity dimension.
    pub fn register(&mut self, dimension: Dimension) -> Result<(), SpaceError> {
        if self.dimensions.contains_key(dimension.name()) {
            return Err(SpaceError::DuplicateDimension {
                name: dimension.name().to_string(),
            });
        }
        if dimension.is_fidelity() {
            if let Some(existing) = self.fidelity() {
                return Err(SpaceError::MultipleFidelities {
                    first: existing.name().to_string(),
                    second: dimension.name().to_string(),
                });
            }
        }
        self.dimensions.insert(dimension.name().to_string(), dimension);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.get(name)
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.dimensions.keys().map(String::as_str)
    }

    /// The fidelity dimension, if any.
    pub fn fidelity(&self) -> Option<&Dimension> {
        self.dimensions.values().find(|d| d.is_fidelity())
    }

    /// Number of distinct points. Infinite as soon as one dimension is
    /// continuous.
    pub fn cardinality(&self) -> f64 {
        self.dimensions.values().map(Dimension::cardinality).product()
    }

    /// Draw one point.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Params {
        self.dimensions
            .values()
            .map(|d| (d.name().to_string(), d.sample(rng)))
            .collect()
    }

    /// Whether `params` assigns an in-bounds value to every dimension and
    /// nothing else.
    pub fn contains(&self, params: &Params) -> bool {
        params.len() == self.dimensions.len()
            && self
                .dimensions
                .values()
                .all(|d| params.get(d.name()).map_or(false, |v| d.contains(v)))
    }

    /// Prior strings keyed by dimension name.
    pub fn configuration(&self) -> BTreeMap<String, String> {
        self.dimensions
            .values()
            .map(|d| (d.name().to_string(), d.prior_string()))
            .collect()
    }
}

impl std::fmt::Display for Space {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dims: Vec<String> = self.dimensions.values().map(|d| d.to_string()).collect();
        write!(f, "Space([{}])", dims.join(", "))
    }
}
