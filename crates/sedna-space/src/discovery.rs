//! Recovering a declared search space from a function or object.
//!
//! Three declaration styles are supported, checked in this order:
//!
//! 1. [`hyperparameter`] decoration, which materializes dimensions eagerly
//!    and attaches them to the wrapped function ([`Decorated`]).
//! 2. A [`SpaceProvider::get_space`] override.
//! 3. Per-parameter annotations, either on a struct through
//!    [`SpaceProvider::annotations`] or on a function through [`annotate`].
//!
//! ```
//! use sedna_space::{get_space_configuration, hyperparameter, uniform};
//! use sedna_types::Params;
//!
//! let fun = hyperparameter([("a", uniform(0, 1)), ("b", uniform(1, 2))])
//!     .unwrap()
//!     .decorate(|p: &Params| p["a"].as_f64().unwrap() + p["b"].as_f64().unwrap());
//!
//! let config = get_space_configuration(&fun).unwrap();
//! assert_eq!(config["a"], "uniform(0, 1)");
//! assert_eq!(config["b"], "uniform(1, 2)");
//! ```

use std::collections::BTreeMap;
use std::ops::Deref;

use tracing::{debug, warn};

use sedna_types::{Params, SpaceError};

use crate::builder::SpaceBuilder;
use crate::dimension::Dimension;
use crate::factory::DimFactory;
use crate::space::Space;

/// One declared entry of a space.
#[derive(Debug, Clone, PartialEq)]
pub enum SpaceEntry {
    /// An already named dimension.
    Dimension(Dimension),
    /// A dimension materialized with the entry's name on discovery.
    Factory(DimFactory),
    /// Anything else. Skipped when rendering.
    Unsupported(String),
}

impl From<Dimension> for SpaceEntry {
    fn from(d: Dimension) -> Self {
        Self::Dimension(d)
    }
}

impl From<DimFactory> for SpaceEntry {
    fn from(f: DimFactory) -> Self {
        Self::Factory(f)
    }
}

/// Which declaration style a space was recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStyle {
    Decorated,
    Method,
    Annotations,
}

/// Capabilities an object may expose to declare its search space.
///
/// Every capability defaults to "absent"; implement the one that matches how
/// the object declares its space.
pub trait SpaceProvider {
    /// Dimensions attached by [`hyperparameter`].
    fn decorated_space(&self) -> Option<&BTreeMap<String, Dimension>> {
        None
    }

    /// Explicit space override.
    fn get_space(&self) -> Option<Vec<(String, SpaceEntry)>> {
        None
    }

    /// Per-parameter annotations. An empty list counts as no annotations.
    fn annotations(&self) -> Option<Vec<(String, SpaceEntry)>> {
        None
    }

    /// Name used in error messages.
    fn type_name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Find the declared entries of `obj`, first matching style wins.
pub fn discover<P: SpaceProvider + ?Sized>(
    obj: &P,
) -> Result<(DiscoveryStyle, Vec<(String, SpaceEntry)>), SpaceError> {
    if let Some(space) = obj.decorated_space() {
        let entries = space
            .iter()
            .map(|(k, d)| (k.clone(), SpaceEntry::Dimension(d.clone())))
            .collect();
        return Ok((DiscoveryStyle::Decorated, entries));
    }

    if let Some(entries) = obj.get_space() {
        return Ok((DiscoveryStyle::Method, entries));
    }

    match obj.annotations() {
        Some(entries) if !entries.is_empty() => Ok((DiscoveryStyle::Annotations, entries)),
        _ => Err(SpaceError::NotFound {
            type_name: obj.type_name().to_string(),
        }),
    }
}

/// Retrieve the dimensions declared by a function or object.
pub fn get_space_dimensions<P: SpaceProvider + ?Sized>(
    obj: &P,
) -> Result<BTreeMap<String, Dimension>, SpaceError> {
    let (style, entries) = discover(obj)?;
    debug!(
        "Discovered {} space entries on {} ({:?})",
        entries.len(),
        obj.type_name(),
        style
    );

    let mut dims = BTreeMap::new();
    for (name, entry) in entries {
        let dim = match entry {
            SpaceEntry::Dimension(dim) => dim,
            SpaceEntry::Factory(factory) => factory.materialize(&name)?,
            SpaceEntry::Unsupported(description) => {
                warn!(
                    "Skipping {} on {}: {} is not a supported dimension",
                    name,
                    obj.type_name(),
                    description
                );
                continue;
            }
        };
        dims.insert(name, dim);
    }
    Ok(dims)
}

/// Prior strings of the space declared by `obj`, keyed by parameter name.
pub fn get_space_configuration<P: SpaceProvider + ?Sized>(
    obj: &P,
) -> Result<BTreeMap<String, String>, SpaceError> {
    Ok(get_space_dimensions(obj)?
        .into_iter()
        .map(|(name, dim)| (name, dim.prior_string()))
        .collect())
}

/// Build the executable space declared by `obj`.
pub fn get_space<P: SpaceProvider + ?Sized>(obj: &P) -> Result<Space, SpaceError> {
    let config = get_space_configuration(obj)?;
    SpaceBuilder::new().build(&config)
}

// ---------------------------------------------------------------------------
// Decorator
// ---------------------------------------------------------------------------

/// Materialized dimensions waiting to be attached to a function.
#[derive(Debug, Clone, PartialEq)]
pub struct Hyperparameter {
    space: BTreeMap<String, Dimension>,
}

/// Declare the search space of a function.
///
/// Each factory is materialized with its parameter name right away, so bad
/// bounds fail here rather than on first use.
pub fn hyperparameter<I, K>(dims: I) -> Result<Hyperparameter, SpaceError>
where
    I: IntoIterator<Item = (K, DimFactory)>,
    K: Into<String>,
{
    let mut space = BTreeMap::new();
    for (name, factory) in dims {
        let name = name.into();
        let dim = factory.materialize(&name)?;
        if space.insert(name.clone(), dim).is_some() {
            return Err(SpaceError::DuplicateDimension { name });
        }
    }
    Ok(Hyperparameter { space })
}

impl Hyperparameter {
    pub fn decorate<F>(self, fun: F) -> Decorated<F> {
        Decorated {
            fun,
            space: self.space,
        }
    }
}

/// A function carrying its search space.
#[derive(Debug, Clone)]
pub struct Decorated<F> {
    fun: F,
    space: BTreeMap<String, Dimension>,
}

impl<F> Decorated<F> {
    pub fn space(&self) -> &BTreeMap<String, Dimension> {
        &self.space
    }

    pub fn into_inner(self) -> F {
        self.fun
    }

    /// Evaluate the wrapped function on one parameter assignment.
    pub fn call<R>(&self, params: &Params) -> R
    where
        F: Fn(&Params) -> R,
    {
        (self.fun)(params)
    }
}

impl<F> Deref for Decorated<F> {
    type Target = F;

    fn deref(&self) -> &F {
        &self.fun
    }
}

impl<F> SpaceProvider for Decorated<F> {
    fn decorated_space(&self) -> Option<&BTreeMap<String, Dimension>> {
        Some(&self.space)
    }

    fn type_name(&self) -> &str {
        "decorated function"
    }
}

// ---------------------------------------------------------------------------
// Function annotations
// ---------------------------------------------------------------------------

/// A function with per-parameter annotations, materialized on discovery.
#[derive(Debug, Clone)]
pub struct Annotated<F> {
    fun: F,
    annotations: Vec<(String, SpaceEntry)>,
}

/// Annotate the parameters of `fun`.
pub fn annotate<F, I, K, E>(fun: F, annotations: I) -> Annotated<F>
where
    I: IntoIterator<Item = (K, E)>,
    K: Into<String>,
    E: Into<SpaceEntry>,
{
    Annotated {
        fun,
        annotations: annotations
            .into_iter()
            .map(|(k, e)| (k.into(), e.into()))
            .collect(),
    }
}

impl<F> Annotated<F> {
    pub fn call<R>(&self, params: &Params) -> R
    where
        F: Fn(&Params) -> R,
    {
        (self.fun)(params)
    }
}

impl<F> Deref for Annotated<F> {
    type Target = F;

    fn deref(&self) -> &F {
        &self.fun
    }
}

impl<F> SpaceProvider for Annotated<F> {
    fn annotations(&self) -> Option<Vec<(String, SpaceEntry)>> {
        Some(self.annotations.clone())
    }

    fn type_name(&self) -> &str {
        "annotated function"
    }
}
