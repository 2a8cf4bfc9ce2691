//! # sedna-space
//!
//! Search space definitions for Sedna.
//!
//! Provides the dimension constructors (`uniform`, `loguniform`, `normal`,
//! `fidelity`, `choices`), the prior-string form understood by the space
//! builder, and discovery of a space declared on a function or object.

mod builder;
mod dimension;
mod discovery;
mod factory;
mod number;
mod prior;
mod space;

pub use builder::{ChoiceOptions, DimensionBuilder, SpaceBuilder};
pub use dimension::{Dimension, DimensionKind, Prior, DEFAULT_FIDELITY_BASE, DEFAULT_PRECISION};
pub use discovery::{
    annotate, discover, get_space, get_space_configuration, get_space_dimensions, hyperparameter,
    Annotated, Decorated, DiscoveryStyle, Hyperparameter, SpaceEntry, SpaceProvider,
};
pub use factory::{choices, choices_weighted, fidelity, loguniform, normal, uniform, DimFactory};
pub use number::{format_float, python_repr, Number};
pub use prior::{parse_prior, Literal, PriorCall};
pub use space::Space;
