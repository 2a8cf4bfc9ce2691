//! Trial records and their identity hashes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use sedna_space::{DimensionKind, Space};
use sedna_types::{ParameterValue, Params};

/// Unique experiment identifier.
pub type ExperimentId = Uuid;

/// Name and type of the objective result recorded by `observe`.
pub const OBJECTIVE: &str = "objective";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Pending,
    Completed,
}

/// One parameter of a trial, typed after the dimension it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialParam {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DimensionKind,
    pub value: ParameterValue,
}

/// A result reported for a trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: f64,
}

impl TrialResult {
    pub fn objective(value: f64) -> Self {
        Self {
            name: OBJECTIVE.to_string(),
            kind: OBJECTIVE.to_string(),
            value,
        }
    }
}

/// Which context a trial hash leaves out.
///
/// The full identity tells two draws apart even when they share
/// parameters; the parameter hash only looks at the non-fidelity values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HashOptions {
    pub ignore_fidelity: bool,
    pub ignore_experiment: bool,
    pub ignore_lie: bool,
    pub ignore_parent: bool,
}

impl HashOptions {
    /// Everything counts.
    pub fn full() -> Self {
        Self::default()
    }

    /// Only the non-fidelity parameter values count.
    pub fn params_only() -> Self {
        Self {
            ignore_fidelity: true,
            ignore_experiment: true,
            ignore_lie: true,
            ignore_parent: true,
        }
    }

    /// Key used by algorithms: independent of the experiment a trial was
    /// handed to.
    pub fn algorithm() -> Self {
        Self {
            ignore_experiment: true,
            ignore_lie: true,
            ..Self::default()
        }
    }
}

/// A single point of the search space, pending or evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub experiment: Option<ExperimentId>,
    pub params: Vec<TrialParam>,
    pub results: Vec<TrialResult>,
    pub status: TrialStatus,
    /// Identity of the trial this one was branched from.
    pub parent: Option<String>,
    /// Placeholder objective attached while the trial is pending.
    pub lie: Option<TrialResult>,
    pub submit_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Trial {
    /// Build a pending trial, typing each parameter after its dimension in
    /// `space`.
    pub fn new(space: &Space, params: Params) -> Self {
        let params = params
            .into_iter()
            .map(|(name, value)| {
                let kind = space
                    .get(&name)
                    .map_or(DimensionKind::Categorical, |d| d.kind());
                TrialParam { name, kind, value }
            })
            .collect();
        Self {
            experiment: None,
            params,
            results: Vec::new(),
            status: TrialStatus::Pending,
            parent: None,
            lie: None,
            submit_time: Utc::now(),
            end_time: None,
        }
    }

    /// A pending copy of this trial at another fidelity, recording this
    /// trial as its parent.
    pub fn branch(&self, fidelity: ParameterValue) -> Self {
        let params = self
            .params
            .iter()
            .map(|p| match p.kind {
                DimensionKind::Fidelity => TrialParam {
                    value: fidelity.clone(),
                    ..p.clone()
                },
                _ => p.clone(),
            })
            .collect();
        Self {
            experiment: None,
            params,
            results: Vec::new(),
            status: TrialStatus::Pending,
            parent: Some(self.compute_trial_hash(HashOptions::algorithm())),
            lie: None,
            submit_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn params(&self) -> Params {
        self.params
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    }

    pub fn param(&self, name: &str) -> Option<&ParameterValue> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    pub fn fidelity(&self) -> Option<&ParameterValue> {
        self.params
            .iter()
            .find(|p| p.kind == DimensionKind::Fidelity)
            .map(|p| &p.value)
    }

    /// The latest objective result, if any.
    pub fn objective(&self) -> Option<&TrialResult> {
        self.results.iter().rev().find(|r| r.kind == OBJECTIVE)
    }

    pub fn mark_completed(&mut self) {
        self.status = TrialStatus::Completed;
        self.end_time = Some(Utc::now());
    }

    /// Hex digest identifying this trial under `options`.
    pub fn compute_trial_hash(&self, options: HashOptions) -> String {
        let mut hasher = Sha256::new();

        let mut params: Vec<&TrialParam> = self
            .params
            .iter()
            .filter(|p| !(options.ignore_fidelity && p.kind == DimensionKind::Fidelity))
            .collect();
        params.sort_by(|a, b| a.name.cmp(&b.name));
        for p in params {
            hasher.update(format!("{}:{}={};", p.name, p.kind, p.value.to_json()));
        }

        if !options.ignore_experiment {
            if let Some(experiment) = &self.experiment {
                hasher.update(format!("|experiment={experiment}"));
            }
        }
        if !options.ignore_lie {
            if let Some(lie) = &self.lie {
                hasher.update(format!("|lie={}", lie.value));
            }
        }
        if !options.ignore_parent {
            if let Some(parent) = &self.parent {
                hasher.update(format!("|parent={parent}"));
            }
        }

        format!("{:x}", hasher.finalize())
    }

    /// Full identity.
    pub fn id(&self) -> String {
        self.compute_trial_hash(HashOptions::full())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sedna_space::{fidelity, get_space, hyperparameter, uniform};

    fn sample_space() -> Space {
        let fun = hyperparameter([("epoch", fidelity(2, 10)), ("a", uniform(0, 1))])
            .unwrap()
            .decorate(());
        get_space(&fun).unwrap()
    }

    fn sample_trial(space: &Space, epoch: i64) -> Trial {
        let mut params = Params::new();
        params.insert("a".into(), ParameterValue::Float(0.5));
        params.insert("epoch".into(), ParameterValue::Int(epoch));
        Trial::new(space, params)
    }

    #[test]
    fn params_are_typed_after_the_space() {
        let space = sample_space();
        let trial = sample_trial(&space, 2);
        assert_eq!(trial.params[0].kind, DimensionKind::Real);
        assert_eq!(trial.params[1].kind, DimensionKind::Fidelity);
        assert_eq!(trial.fidelity(), Some(&ParameterValue::Int(2)));
        assert_eq!(trial.status, TrialStatus::Pending);
    }

    #[test]
    fn param_hash_ignores_fidelity() {
        let space = sample_space();
        let low = sample_trial(&space, 2);
        let high = sample_trial(&space, 10);

        assert_ne!(low.id(), high.id());
        assert_eq!(
            low.compute_trial_hash(HashOptions::params_only()),
            high.compute_trial_hash(HashOptions::params_only())
        );
    }

    #[test]
    fn full_identity_depends_on_context() {
        let space = sample_space();
        let base = sample_trial(&space, 2);

        let mut other_experiment = base.clone();
        other_experiment.experiment = Some(Uuid::new_v4());
        assert_ne!(base.id(), other_experiment.id());
        assert_eq!(
            base.compute_trial_hash(HashOptions::algorithm()),
            other_experiment.compute_trial_hash(HashOptions::algorithm())
        );

        let mut lied = base.clone();
        lied.lie = Some(TrialResult::objective(1.0));
        assert_ne!(base.id(), lied.id());
        assert_eq!(base.id(), base.clone().id());
    }

    #[test]
    fn branch_changes_fidelity_and_records_parent() {
        let space = sample_space();
        let mut parent = sample_trial(&space, 2);
        parent.results.push(TrialResult::objective(0.3));
        parent.mark_completed();

        let child = parent.branch(ParameterValue::Int(5));
        assert_eq!(child.fidelity(), Some(&ParameterValue::Int(5)));
        assert_eq!(child.param("a"), parent.param("a"));
        assert!(child.results.is_empty());
        assert_eq!(
            child.parent.as_deref(),
            Some(parent.compute_trial_hash(HashOptions::algorithm()).as_str())
        );
        assert_eq!(
            child.compute_trial_hash(HashOptions::params_only()),
            parent.compute_trial_hash(HashOptions::params_only())
        );
    }

    #[test]
    fn objective_is_latest_result() {
        let space = sample_space();
        let mut trial = sample_trial(&space, 2);
        assert!(trial.objective().is_none());
        trial.results.push(TrialResult::objective(2.0));
        trial.results.push(TrialResult {
            name: "loss".into(),
            kind: "statistic".into(),
            value: 9.0,
        });
        trial.results.push(TrialResult::objective(1.0));
        assert_eq!(trial.objective().map(|r| r.value), Some(1.0));
    }

    #[test]
    fn serializes_like_the_trial_contract() {
        let result = serde_json::to_value(TrialResult::objective(0.5)).unwrap();
        assert_eq!(
            result,
            serde_json::json!({"name": "objective", "type": "objective", "value": 0.5})
        );
    }
}
