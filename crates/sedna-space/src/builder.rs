//! Dimension and space builders.
//!
//! [`DimensionBuilder`] validates primitive parameters and produces named
//! [`Dimension`]s. [`SpaceBuilder`] compiles a configuration mapping of
//! prior strings into a [`Space`].

use std::collections::BTreeMap;

use tracing::debug;

use sedna_types::SpaceError;

use crate::dimension::{Dimension, Prior, DEFAULT_PRECISION};
use crate::number::Number;
use crate::prior::{parse_prior, Literal, PriorCall};
use crate::space::Space;

/// Options for a categorical dimension.
#[derive(Debug, Clone, PartialEq)]
pub enum ChoiceOptions {
    /// Equally likely options.
    List(Vec<serde_json::Value>),
    /// Options with explicit probabilities summing to one.
    Weighted(Vec<(serde_json::Value, f64)>),
}

/// Builds named dimensions from primitive parameters.
#[derive(Debug, Clone)]
pub struct DimensionBuilder {
    name: String,
}

impl DimensionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn uniform(
        &self,
        low: impl Into<Number>,
        high: impl Into<Number>,
        discrete: bool,
        precision: u32,
        shape: Option<Vec<usize>>,
    ) -> Result<Dimension, SpaceError> {
        let (low, high) = (low.into(), high.into());
        self.check_order(low, high)?;
        self.numeric(Prior::Uniform { low, high }, discrete, precision, shape)
    }

    pub fn loguniform(
        &self,
        low: impl Into<Number>,
        high: impl Into<Number>,
        discrete: bool,
        precision: u32,
        shape: Option<Vec<usize>>,
    ) -> Result<Dimension, SpaceError> {
        let (low, high) = (low.into(), high.into());
        if low.as_f64() <= 0.0 {
            return Err(self.bounds_error(format!(
                "loguniform lower bound must be positive, got {low}"
            )));
        }
        self.check_order(low, high)?;
        self.numeric(Prior::LogUniform { low, high }, discrete, precision, shape)
    }

    pub fn normal(
        &self,
        loc: impl Into<Number>,
        scale: impl Into<Number>,
        discrete: bool,
        precision: u32,
        shape: Option<Vec<usize>>,
    ) -> Result<Dimension, SpaceError> {
        let (loc, scale) = (loc.into(), scale.into());
        if !(scale.as_f64() > 0.0) || !loc.as_f64().is_finite() {
            return Err(self.bounds_error(format!(
                "normal needs a finite loc and a positive scale, got loc={loc} scale={scale}"
            )));
        }
        self.numeric(Prior::Normal { loc, scale }, discrete, precision, shape)
    }

    pub fn fidelity(
        &self,
        low: impl Into<Number>,
        high: impl Into<Number>,
        base: impl Into<Number>,
    ) -> Result<Dimension, SpaceError> {
        let (low, high, base) = (low.into(), high.into(), base.into());
        if low.as_f64() <= 0.0 {
            return Err(self.bounds_error(format!(
                "minimum fidelity must be positive, got {low}"
            )));
        }
        if low.as_f64() > high.as_f64() {
            return Err(self.bounds_error(format!(
                "minimum fidelity {low} is larger than maximum {high}"
            )));
        }
        if base.as_f64() < 1.0 {
            return Err(self.bounds_error(format!(
                "fidelity base must be at least 1, got {base}"
            )));
        }
        Ok(Dimension {
            name: self.name.clone(),
            prior: Prior::Fidelity { low, high, base },
            discrete: false,
            precision: DEFAULT_PRECISION,
            shape: None,
        })
    }

    pub fn choices(&self, options: ChoiceOptions) -> Result<Dimension, SpaceError> {
        let (options, probabilities): (Vec<_>, Vec<_>) = match options {
            ChoiceOptions::List(options) => {
                let p = 1.0 / options.len().max(1) as f64;
                let probabilities = vec![p; options.len()];
                (options, probabilities)
            }
            ChoiceOptions::Weighted(pairs) => pairs.into_iter().unzip(),
        };

        if options.is_empty() {
            return Err(self.bounds_error("choices need at least one option".to_string()));
        }
        if probabilities.iter().any(|p| !(*p >= 0.0)) {
            return Err(self.bounds_error("choice probabilities must be non-negative".to_string()));
        }
        let total: f64 = probabilities.iter().sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(self.bounds_error(format!(
                "choice probabilities must sum to 1, got {total}"
            )));
        }
        for (i, option) in options.iter().enumerate() {
            if options[..i].contains(option) {
                return Err(self.bounds_error(format!("duplicate choice {option}")));
            }
        }

        Ok(Dimension {
            name: self.name.clone(),
            prior: Prior::Choices {
                options,
                probabilities,
            },
            discrete: false,
            precision: DEFAULT_PRECISION,
            shape: None,
        })
    }

    /// Build a dimension from a parsed prior expression.
    fn from_call(&self, call: PriorCall, expression: &str) -> Result<Dimension, SpaceError> {
        let invalid = |message: String| SpaceError::InvalidPrior {
            name: self.name.clone(),
            prior: expression.to_string(),
            message,
        };

        match call.function.as_str() {
            "uniform" | "loguniform" | "normal" => {
                let [a, b] = call.positional_numbers::<2>().map_err(invalid)?;
                let discrete = call.bool_kwarg("discrete").map_err(invalid)?.unwrap_or(false);
                let precision = call
                    .int_kwarg("precision")
                    .map_err(invalid)?
                    .map_or(DEFAULT_PRECISION, |p| p as u32);
                let shape = call.shape_kwarg().map_err(invalid)?;
                call.reject_unknown_kwargs(&["discrete", "precision", "shape"])
                    .map_err(invalid)?;
                match call.function.as_str() {
                    "uniform" => self.uniform(a, b, discrete, precision, shape),
                    "loguniform" => self.loguniform(a, b, discrete, precision, shape),
                    _ => self.normal(a, b, discrete, precision, shape),
                }
            }
            "fidelity" => {
                let [low, high] = call.positional_numbers::<2>().map_err(invalid)?;
                let base = call
                    .number_kwarg("base")
                    .map_err(invalid)?
                    .unwrap_or(Number::Int(2));
                call.reject_unknown_kwargs(&["base"]).map_err(invalid)?;
                self.fidelity(low, high, base)
            }
            "choices" => {
                call.reject_unknown_kwargs(&[]).map_err(invalid)?;
                let options = match call.positional.as_slice() {
                    [Literal::List(items)] => {
                        ChoiceOptions::List(items.iter().map(Literal::to_json).collect())
                    }
                    [Literal::Dict(pairs)] => {
                        let mut weighted = Vec::with_capacity(pairs.len());
                        for (key, value) in pairs {
                            let p = value.as_number().ok_or_else(|| {
                                let key = key.to_json();
                                invalid(format!("probability for {key} is not a number"))
                            })?;
                            weighted.push((key.to_json(), p.as_f64()));
                        }
                        ChoiceOptions::Weighted(weighted)
                    }
                    _ => return Err(invalid("choices takes a single list or dict".to_string())),
                };
                self.choices(options)
            }
            other => Err(invalid(format!("unknown prior `{other}`"))),
        }
    }

    fn numeric(
        &self,
        prior: Prior,
        discrete: bool,
        precision: u32,
        shape: Option<Vec<usize>>,
    ) -> Result<Dimension, SpaceError> {
        if precision == 0 {
            return Err(self.bounds_error("precision must be at least 1".to_string()));
        }
        if let (true, Prior::Uniform { low, high } | Prior::LogUniform { low, high }) =
            (discrete, &prior)
        {
            if low.as_f64().ceil() > high.as_f64().floor() {
                return Err(self.bounds_error(format!(
                    "no integer lies between {low} and {high}"
                )));
            }
        }
        Ok(Dimension {
            name: self.name.clone(),
            prior,
            discrete,
            precision,
            shape,
        })
    }

    fn check_order(&self, low: Number, high: Number) -> Result<(), SpaceError> {
        if !(low.as_f64() < high.as_f64()) {
            return Err(self.bounds_error(format!(
                "lower bound {low} must be smaller than upper bound {high}"
            )));
        }
        Ok(())
    }

    fn bounds_error(&self, message: String) -> SpaceError {
        SpaceError::InvalidBounds {
            name: self.name.clone(),
            message,
        }
    }
}

/// Compiles a configuration of prior strings into a [`Space`].
#[derive(Debug, Clone, Default)]
pub struct SpaceBuilder;

impl SpaceBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Parse a single `name -> expression` entry.
    pub fn dimension(&self, name: &str, expression: &str) -> Result<Dimension, SpaceError> {
        let call = parse_prior(expression).map_err(|message| SpaceError::InvalidPrior {
            name: name.to_string(),
            prior: expression.to_string(),
            message,
        })?;
        DimensionBuilder::new(name).from_call(call, expression)
    }

    pub fn build(&self, configuration: &BTreeMap<String, String>) -> Result<Space, SpaceError> {
        let mut space = Space::new();
        for (name, expression) in configuration {
            let dimension = self.dimension(name, expression)?;
            debug!("Built dimension {}", dimension);
            space.register(dimension)?;
        }
        Ok(space)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::DimensionKind;

    fn config(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn rejects_bad_bounds() {
        let b = DimensionBuilder::new("a");
        assert!(matches!(
            b.uniform(1, 0, false, 4, None),
            Err(SpaceError::InvalidBounds { .. })
        ));
        assert!(b.loguniform(0, 1, false, 4, None).is_err());
        assert!(b.normal(0, 0, false, 4, None).is_err());
        assert!(b.fidelity(10, 2, 2).is_err());
        assert!(b.fidelity(0, 2, 2).is_err());
        assert!(b.choices(ChoiceOptions::List(vec![])).is_err());
        assert!(b
            .choices(ChoiceOptions::Weighted(vec![
                (serde_json::json!("a"), 0.5),
                (serde_json::json!("b"), 0.2)
            ]))
            .is_err());
    }

    #[test]
    fn builds_space_from_configuration() {
        let space = SpaceBuilder::new()
            .build(&config(&[
                ("a", "uniform(0, 1)"),
                ("b", "uniform(1, 2, discrete=True)"),
                ("epoch", "fidelity(2, 10)"),
                ("lr", "loguniform(1e-05, 1.0, precision=6)"),
                ("opt", "choices(['sgd', 'adam'])"),
            ]))
            .unwrap();

        assert_eq!(space.len(), 5);
        assert_eq!(space.get("b").unwrap().kind(), DimensionKind::Integer);
        assert_eq!(space.fidelity().unwrap().name(), "epoch");
        assert_eq!(space.get("lr").unwrap().precision(), 6);
    }

    #[test]
    fn prior_strings_survive_a_rebuild() {
        let expressions = [
            "uniform(0, 1)",
            "uniform(-2.5, 2.5, shape=[3], precision=2)",
            "loguniform(1, 1000, discrete=True)",
            "normal(0, 1)",
            "fidelity(1, 81, base=3)",
            "choices({'sgd': 0.25, 'adam': 0.75})",
            "choices([1, 'two', True, None])",
        ];
        let builder = SpaceBuilder::new();
        for expression in expressions {
            let dim = builder.dimension("x", expression).unwrap();
            assert_eq!(dim.prior_string(), expression);
        }
    }

    #[test]
    fn reports_malformed_priors() {
        let builder = SpaceBuilder::new();
        for expression in [
            "gamma(1, 2)",
            "uniform(0)",
            "uniform(0, 1, step=2)",
            "uniform(0, 1",
            "choices(1, 2)",
        ] {
            match builder.dimension("x", expression) {
                Err(SpaceError::InvalidPrior { name, prior, .. }) => {
                    assert_eq!(name, "x");
                    assert_eq!(prior, expression);
                }
                other => panic!("expected InvalidPrior for {expression}, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_second_fidelity() {
        let result = SpaceBuilder::new().build(&config(&[
            ("a", "fidelity(1, 10)"),
            ("b", "fidelity(1, 20)"),
        ]));
        assert!(matches!(result, Err(SpaceError::MultipleFidelities { .. })));
    }
}
