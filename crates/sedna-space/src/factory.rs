//! Deferred dimension constructors.
//!
//! A dimension's prior string embeds its name, which is only known once the
//! space is discovered. Constructors therefore return a [`DimFactory`] that
//! records the parameters and is materialized later with a name.

use sedna_types::SpaceError;

use crate::builder::{ChoiceOptions, DimensionBuilder};
use crate::dimension::{Dimension, DEFAULT_FIDELITY_BASE, DEFAULT_PRECISION};
use crate::number::Number;

#[derive(Debug, Clone, PartialEq)]
enum DimSpec {
    Uniform(NumericSpec),
    LogUniform(NumericSpec),
    Normal(NumericSpec),
    Fidelity {
        low: Number,
        high: Number,
        base: Number,
    },
    Choices(ChoiceOptions),
}

#[derive(Debug, Clone, PartialEq)]
struct NumericSpec {
    a: Number,
    b: Number,
    discrete: bool,
    precision: u32,
    shape: Option<Vec<usize>>,
}

impl NumericSpec {
    fn new(a: Number, b: Number) -> Self {
        Self {
            a,
            b,
            discrete: false,
            precision: DEFAULT_PRECISION,
            shape: None,
        }
    }
}

/// A dimension waiting for its name.
#[derive(Debug, Clone, PartialEq)]
pub struct DimFactory {
    spec: DimSpec,
}

impl DimFactory {
    /// Sample integers instead of reals. Ignored by fidelity and choices.
    pub fn discrete(mut self) -> Self {
        if let Some(numeric) = self.numeric_mut() {
            numeric.discrete = true;
        }
        self
    }

    /// Significant digits kept on sampled reals. Ignored by fidelity and
    /// choices.
    pub fn precision(mut self, precision: u32) -> Self {
        if let Some(numeric) = self.numeric_mut() {
            numeric.precision = precision;
        }
        self
    }

    /// Sample arrays of the given shape. Ignored by fidelity and choices.
    pub fn shape(mut self, shape: impl Into<Vec<usize>>) -> Self {
        if let Some(numeric) = self.numeric_mut() {
            numeric.shape = Some(shape.into());
        }
        self
    }

    /// Reduction factor between fidelity levels. Only used by fidelity.
    pub fn base(mut self, base: impl Into<Number>) -> Self {
        if let DimSpec::Fidelity { base: b, .. } = &mut self.spec {
            *b = base.into();
        }
        self
    }

    /// Build the named dimension.
    pub fn materialize(&self, name: &str) -> Result<Dimension, SpaceError> {
        let builder = DimensionBuilder::new(name);
        match &self.spec {
            DimSpec::Uniform(n) => {
                builder.uniform(n.a, n.b, n.discrete, n.precision, n.shape.clone())
            }
            DimSpec::LogUniform(n) => {
                builder.loguniform(n.a, n.b, n.discrete, n.precision, n.shape.clone())
            }
            DimSpec::Normal(n) => {
                builder.normal(n.a, n.b, n.discrete, n.precision, n.shape.clone())
            }
            DimSpec::Fidelity { low, high, base } => builder.fidelity(*low, *high, *base),
            DimSpec::Choices(options) => builder.choices(options.clone()),
        }
    }

    fn numeric_mut(&mut self) -> Option<&mut NumericSpec> {
        match &mut self.spec {
            DimSpec::Uniform(n) | DimSpec::LogUniform(n) | DimSpec::Normal(n) => Some(n),
            DimSpec::Fidelity { .. } | DimSpec::Choices(_) => None,
        }
    }
}

/// Uniform distribution over `[low, high]`.
pub fn uniform(low: impl Into<Number>, high: impl Into<Number>) -> DimFactory {
    DimFactory {
        spec: DimSpec::Uniform(NumericSpec::new(low.into(), high.into())),
    }
}

/// Log-uniform distribution over `[low, high]`.
pub fn loguniform(low: impl Into<Number>, high: impl Into<Number>) -> DimFactory {
    DimFactory {
        spec: DimSpec::LogUniform(NumericSpec::new(low.into(), high.into())),
    }
}

/// Normal distribution.
pub fn normal(loc: impl Into<Number>, scale: impl Into<Number>) -> DimFactory {
    DimFactory {
        spec: DimSpec::Normal(NumericSpec::new(loc.into(), scale.into())),
    }
}

/// Budget dimension for multi-fidelity algorithms, base 2 unless
/// [`DimFactory::base`] says otherwise.
pub fn fidelity(low: impl Into<Number>, high: impl Into<Number>) -> DimFactory {
    DimFactory {
        spec: DimSpec::Fidelity {
            low: low.into(),
            high: high.into(),
            base: Number::Int(DEFAULT_FIDELITY_BASE),
        },
    }
}

/// Equally likely categorical options.
pub fn choices<I, V>(options: I) -> DimFactory
where
    I: IntoIterator<Item = V>,
    V: Into<serde_json::Value>,
{
    DimFactory {
        spec: DimSpec::Choices(ChoiceOptions::List(
            options.into_iter().map(Into::into).collect(),
        )),
    }
}

/// Categorical options with explicit probabilities.
pub fn choices_weighted<I, V>(options: I) -> DimFactory
where
    I: IntoIterator<Item = (V, f64)>,
    V: Into<serde_json::Value>,
{
    DimFactory {
        spec: DimSpec::Choices(ChoiceOptions::Weighted(
            options.into_iter().map(|(v, p)| (v.into(), p)).collect(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materialize_names_the_dimension() {
        let dim = uniform(0, 1).materialize("a").unwrap();
        assert_eq!(dim.name(), "a");
        assert_eq!(dim.prior_string(), "uniform(0, 1)");
    }

    #[test]
    fn builder_options() {
        let cases = vec![
            (uniform(0, 10).discrete(), "uniform(0, 10, discrete=True)"),
            (loguniform(1e-4, 1.0).precision(2), "loguniform(0.0001, 1.0, precision=2)"),
            (normal(0, 1).shape([4]), "normal(0, 1, shape=[4])"),
            (fidelity(1, 27).base(3), "fidelity(1, 27, base=3)"),
            (choices(["a", "b"]), "choices(['a', 'b'])"),
            (choices_weighted([("a", 0.1), ("b", 0.9)]), "choices({'a': 0.1, 'b': 0.9})"),
        ];
        for (factory, expected) in cases {
            assert_eq!(factory.materialize("x").unwrap().prior_string(), expected);
        }
    }

    #[test]
    fn options_that_do_not_apply_are_ignored() {
        assert_eq!(fidelity(2, 10).discrete().precision(7), fidelity(2, 10));
        assert_eq!(uniform(0, 1).base(3), uniform(0, 1));
    }

    #[test]
    fn invalid_parameters_fail_at_materialization() {
        let factory = uniform(1, 0);
        match factory.materialize("a") {
            Err(SpaceError::InvalidBounds { name, .. }) => assert_eq!(name, "a"),
            other => panic!("expected InvalidBounds, got {other:?}"),
        }
    }
}
