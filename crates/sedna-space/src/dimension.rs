//! Named search space dimensions and their prior strings.

use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use sedna_types::ParameterValue;

use crate::number::{format_float, python_repr, Number};

/// Significant digits kept when sampling real dimensions.
pub const DEFAULT_PRECISION: u32 = 4;

/// Default reduction factor of a fidelity dimension.
pub const DEFAULT_FIDELITY_BASE: i64 = 2;

/// Distribution a dimension samples from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Prior {
    Uniform {
        low: Number,
        high: Number,
    },
    LogUniform {
        low: Number,
        high: Number,
    },
    Normal {
        loc: Number,
        scale: Number,
    },
    Fidelity {
        low: Number,
        high: Number,
        base: Number,
    },
    /// Categorical options. Probabilities are aligned with `options` and
    /// sum to one.
    Choices {
        options: Vec<serde_json::Value>,
        probabilities: Vec<f64>,
    },
}

/// Coarse type of a dimension, as recorded on trial parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionKind {
    Real,
    Integer,
    Categorical,
    Fidelity,
}

impl std::fmt::Display for DimensionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Real => "real",
            Self::Integer => "integer",
            Self::Categorical => "categorical",
            Self::Fidelity => "fidelity",
        };
        f.write_str(s)
    }
}

/// A single named parameter distribution.
///
/// Dimensions are built through [`crate::DimensionBuilder`], which validates
/// bounds; once built they are immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub(crate) name: String,
    pub(crate) prior: Prior,
    pub(crate) discrete: bool,
    pub(crate) precision: u32,
    pub(crate) shape: Option<Vec<usize>>,
}

impl Dimension {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prior(&self) -> &Prior {
        &self.prior
    }

    pub fn is_discrete(&self) -> bool {
        self.discrete
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn shape(&self) -> Option<&[usize]> {
        self.shape.as_deref()
    }

    pub fn kind(&self) -> DimensionKind {
        match &self.prior {
            Prior::Fidelity { .. } => DimensionKind::Fidelity,
            Prior::Choices { .. } => DimensionKind::Categorical,
            _ if self.discrete => DimensionKind::Integer,
            _ => DimensionKind::Real,
        }
    }

    pub fn is_fidelity(&self) -> bool {
        self.kind() == DimensionKind::Fidelity
    }

    /// Canonical prior string, e.g. `uniform(0, 1)` or `fidelity(2, 10)`.
    pub fn prior_string(&self) -> String {
        match &self.prior {
            Prior::Fidelity { low, high, base } => {
                let mut args = vec![low.to_string(), high.to_string()];
                if base.as_f64() != DEFAULT_FIDELITY_BASE as f64 {
                    args.push(format!("base={base}"));
                }
                format!("fidelity({})", args.join(", "))
            }
            Prior::Choices {
                options,
                probabilities,
            } => {
                let uniform = probabilities
                    .first()
                    .map_or(true, |first| probabilities.iter().all(|p| p == first));
                let arg = if uniform {
                    python_repr(&serde_json::Value::Array(options.clone()))
                } else {
                    let pairs: Vec<String> = options
                        .iter()
                        .zip(probabilities)
                        .map(|(o, p)| format!("{}: {}", python_repr(o), format_float(*p)))
                        .collect();
                    format!("{{{}}}", pairs.join(", "))
                };
                format!("choices({arg})")
            }
            Prior::Uniform { low: a, high: b }
            | Prior::LogUniform { low: a, high: b }
            | Prior::Normal { loc: a, scale: b } => {
                let prior_name = match &self.prior {
                    Prior::Uniform { .. } => "uniform",
                    Prior::LogUniform { .. } => "loguniform",
                    _ => "normal",
                };
                let mut args = vec![a.to_string(), b.to_string()];
                if let Some(shape) = &self.shape {
                    let dims: Vec<String> = shape.iter().map(usize::to_string).collect();
                    args.push(format!("shape=[{}]", dims.join(", ")));
                }
                if self.precision != DEFAULT_PRECISION {
                    args.push(format!("precision={}", self.precision));
                }
                if self.discrete {
                    args.push("discrete=True".to_string());
                }
                format!("{prior_name}({})", args.join(", "))
            }
        }
    }

    /// Number of distinct values, `f64::INFINITY` for continuous dimensions.
    pub fn cardinality(&self) -> f64 {
        let scalar = match &self.prior {
            Prior::Fidelity { .. } => return 1.0,
            Prior::Choices { options, .. } => options.len() as f64,
            Prior::Uniform { low, high } | Prior::LogUniform { low, high } if self.discrete => {
                (high.as_f64().floor() - low.as_f64().ceil() + 1.0).max(0.0)
            }
            _ => return f64::INFINITY,
        };
        let size: usize = self.shape.as_ref().map_or(1, |s| s.iter().product());
        scalar.powi(size as i32)
    }

    /// The largest fidelity value, as the value trials should carry when
    /// an algorithm does not schedule fidelities itself.
    pub fn fidelity_high(&self) -> Option<ParameterValue> {
        match &self.prior {
            Prior::Fidelity { high, .. } => Some(number_value(*high)),
            _ => None,
        }
    }

    /// Draw one value for this dimension.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterValue {
        match &self.shape {
            None => self.sample_scalar(rng),
            Some(shape) => ParameterValue::Json(self.sample_nested(shape, rng)),
        }
    }

    fn sample_nested<R: Rng + ?Sized>(&self, shape: &[usize], rng: &mut R) -> serde_json::Value {
        match shape.split_first() {
            None => self.sample_scalar(rng).to_json(),
            Some((len, rest)) => serde_json::Value::Array(
                (0..*len).map(|_| self.sample_nested(rest, rng)).collect(),
            ),
        }
    }

    fn sample_scalar<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterValue {
        match &self.prior {
            Prior::Uniform { low, high } => {
                if self.discrete {
                    let (lo, hi) = integer_bounds(*low, *high);
                    ParameterValue::Int(rng.gen_range(lo..=hi))
                } else {
                    let v = rng.gen_range(low.as_f64()..high.as_f64());
                    ParameterValue::Float(self.round_within(v, *low, *high))
                }
            }
            Prior::LogUniform { low, high } => {
                let log_v = rng.gen_range(low.as_f64().ln()..high.as_f64().ln());
                let v = log_v.exp();
                if self.discrete {
                    let (lo, hi) = integer_bounds(*low, *high);
                    ParameterValue::Int((v.round() as i64).clamp(lo, hi))
                } else {
                    ParameterValue::Float(self.round_within(v, *low, *high))
                }
            }
            Prior::Normal { loc, scale } => {
                let z: f64 = rng.sample(StandardNormal);
                let v = loc.as_f64() + scale.as_f64() * z;
                if self.discrete {
                    ParameterValue::Int(v.round() as i64)
                } else {
                    ParameterValue::Float(self.round(v))
                }
            }
            Prior::Fidelity { high, .. } => number_value(*high),
            Prior::Choices {
                options,
                probabilities,
            } => {
                let weighted: Vec<(&serde_json::Value, f64)> =
                    options.iter().zip(probabilities.iter().copied()).collect();
                let picked = weighted
                    .choose_weighted(rng, |(_, p)| *p)
                    .map(|(o, _)| (*o).clone())
                    .unwrap_or_else(|_| options.first().cloned().unwrap_or_default());
                ParameterValue::Json(picked)
            }
        }
    }

    /// Whether `value` lies inside this dimension.
    pub fn contains(&self, value: &ParameterValue) -> bool {
        match &self.shape {
            None => self.contains_scalar(&value.to_json()),
            Some(shape) => self.contains_nested(shape, &value.to_json()),
        }
    }

    fn contains_nested(&self, shape: &[usize], value: &serde_json::Value) -> bool {
        match shape.split_first() {
            None => self.contains_scalar(value),
            Some((len, rest)) => match value.as_array() {
                Some(items) => {
                    items.len() == *len && items.iter().all(|v| self.contains_nested(rest, v))
                }
                None => false,
            },
        }
    }

    fn contains_scalar(&self, value: &serde_json::Value) -> bool {
        if let Prior::Choices { options, .. } = &self.prior {
            return options.contains(value);
        }

        let Some(v) = value.as_f64() else {
            return false;
        };
        if self.discrete && v.fract() != 0.0 {
            return false;
        }
        match &self.prior {
            Prior::Uniform { low, high }
            | Prior::LogUniform { low, high }
            | Prior::Fidelity { low, high, .. } => v >= low.as_f64() && v <= high.as_f64(),
            Prior::Normal { .. } => v.is_finite(),
            Prior::Choices { .. } => false,
        }
    }

    fn round(&self, v: f64) -> f64 {
        format!("{:.*e}", self.precision.saturating_sub(1) as usize, v)
            .parse()
            .unwrap_or(v)
    }

    /// Rounding may step past a bound the precision cannot represent.
    fn round_within(&self, v: f64, low: Number, high: Number) -> f64 {
        self.round(v).clamp(low.as_f64(), high.as_f64())
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}~{}", self.name, self.prior_string())
    }
}

fn integer_bounds(low: Number, high: Number) -> (i64, i64) {
    (low.as_f64().ceil() as i64, high.as_f64().floor() as i64)
}

fn number_value(n: Number) -> ParameterValue {
    match n {
        Number::Int(v) => ParameterValue::Int(v),
        Number::Float(v) => ParameterValue::Float(v),
    }
}
