//! # sedna-optimizer
//!
//! Suggest/observe optimization sessions for Sedna.
//!
//! Provides trial records with identity hashing, the algorithm registry with
//! its built-in strategies (random, grid, hyperband), run configuration and
//! the session that hands samples to a caller and feeds observations back.

mod algo;
mod config;
mod session;
mod trial;

pub use algo::{
    Algorithm, AlgorithmConstructor, AlgorithmRegistry, GridConfig, GridSearch, Hyperband,
    HyperbandConfig, RandomConfig, RandomSearch, TrialRegistry,
};
pub use config::OptimizationConfig;
pub use session::{OptimizationSession, Sample};
pub use trial::{
    ExperimentId, HashOptions, Trial, TrialParam, TrialResult, TrialStatus, OBJECTIVE,
};
