//! End-to-end suggest/evaluate/observe loops.

use std::collections::HashSet;

use sedna_optimizer::{OptimizationConfig, OptimizationSession, Sample};
use sedna_space::{
    annotate, fidelity, get_space, get_space_configuration, hyperparameter, uniform, Space,
};
use sedna_types::SednaError;
use serde_json::json;

fn objective(sample: &Sample) -> f64 {
    sample.get_f64("a").unwrap_or_default() + sample.get_f64("b").unwrap_or_default()
}

fn ab_space() -> Space {
    let fun = hyperparameter([("a", uniform(0, 1)), ("b", uniform(1, 2))])
        .unwrap()
        .decorate(());
    get_space(&fun).unwrap()
}

#[test]
fn random_search_stops_at_max_trials() {
    let mut session =
        OptimizationSession::new("random", ab_space(), 10, json!({"seed": 3})).unwrap();

    let mut ids = HashSet::new();
    let mut observations = 0;
    while !session.is_done() {
        for mut sample in session.suggest(2).unwrap() {
            assert!(ids.insert(sample.id.clone()), "sample id {} reused", sample.id);
            let value = objective(&sample);
            session.observe(&mut sample, value).unwrap();
            assert_eq!(sample.result, vec![value]);
            observations += 1;
        }
        assert_eq!(session.is_done(), observations >= 10);
    }

    assert_eq!(observations, 10);
    assert_eq!(session.n_observed(), 10);
    assert_eq!(session.n_suggested(), 10);
}

#[test]
fn observing_raises_n_observed_by_batch_size() {
    let mut session = OptimizationSession::new("random", ab_space(), 0, json!(null)).unwrap();
    let before = session.n_observed();
    let samples = session.suggest(5).unwrap();
    assert_eq!(samples.len(), 5);
    for mut sample in samples {
        let value = objective(&sample);
        session.observe(&mut sample, value).unwrap();
    }
    assert_eq!(session.n_observed(), before + 5);
}

#[test]
fn hyperband_terminates_across_fidelity_rungs() {
    let fun = hyperparameter([
        ("a", uniform(0, 1)),
        ("b", uniform(1, 2)),
        ("epoch", fidelity(2, 10).base(2)),
    ])
    .unwrap()
    .decorate(());
    let space = get_space(&fun).unwrap();
    assert_eq!(
        space.fidelity().map(|d| d.prior_string()),
        Some("fidelity(2, 10)".to_string())
    );

    let config = json!({"seed": 5, "repetitions": 1});
    let mut session = OptimizationSession::new("hyperband", space, 0, config).unwrap();

    let mut seen_hashes: HashSet<String> = HashSet::new();
    let mut ids = HashSet::new();
    let mut shared_hash = false;
    let mut rounds = 0;
    while !session.is_done() {
        rounds += 1;
        assert!(rounds < 100, "hyperband did not terminate");

        let samples = session.suggest(4).unwrap();
        assert!(!samples.is_empty(), "hyperband stalled with nothing pending");
        for mut sample in samples {
            assert!(ids.insert(sample.id.clone()));
            shared_hash |= !seen_hashes.insert(sample.hash.clone());
            let value = objective(&sample);
            session.observe(&mut sample, value).unwrap();
        }
    }

    assert!(shared_hash, "promoted samples should share a parameter hash");
    assert_eq!(session.n_observed(), 14);
}

#[test]
fn hyperband_stops_at_max_trials_in_pairs() {
    let fun = hyperparameter([
        ("a", uniform(0, 1)),
        ("b", uniform(1, 2)),
        ("epoch", fidelity(2, 10).base(2)),
    ])
    .unwrap()
    .decorate(());
    let space = get_space(&fun).unwrap();
    let mut session =
        OptimizationSession::new("hyperband", space, 10, json!({"seed": 11})).unwrap();

    let mut ids = HashSet::new();
    let mut rounds = 0;
    while !session.is_done() {
        rounds += 1;
        assert!(rounds < 50, "hyperband did not reach max_trials");

        let samples = session.suggest(2).unwrap();
        assert!(!samples.is_empty(), "hyperband stalled with nothing pending");
        for mut sample in samples {
            assert!(ids.insert(sample.id.clone()));
            let value = objective(&sample);
            session.observe(&mut sample, value).unwrap();
        }
    }

    assert_eq!(session.n_observed(), 10);
}

#[test]
fn same_params_at_other_fidelity_share_hash() {
    let fun = hyperparameter([("a", uniform(0, 1)), ("epoch", fidelity(1, 4))])
        .unwrap()
        .decorate(());
    let space = get_space(&fun).unwrap();
    let mut session = OptimizationSession::new("hyperband", space, 0, json!({"seed": 1})).unwrap();

    // First bracket: four trials at epoch 1, then the best two at epoch 2.
    let mut low = session.suggest(4).unwrap();
    for sample in &mut low {
        let value = sample.get_f64("a").unwrap();
        session.observe(sample, value).unwrap();
    }
    let promoted = session.suggest(2).unwrap();
    assert_eq!(promoted.len(), 2);

    for high in &promoted {
        let parent = low
            .iter()
            .find(|s| s.hash == high.hash)
            .expect("promoted sample comes from the first rung");
        assert_ne!(parent.id, high.id);
        assert_eq!(parent.get("a"), high.get("a"));
        assert_ne!(parent.get("epoch"), high.get("epoch"));
    }
}

#[test]
fn unknown_sample_is_a_lookup_error() {
    let mut session = OptimizationSession::new("random", ab_space(), 0, json!(null)).unwrap();
    let mut sample = Sample {
        id: "not-a-sample".into(),
        hash: "not-a-hash".into(),
        params: Default::default(),
        result: Vec::new(),
    };
    match session.observe(&mut sample, 1.0) {
        Err(SednaError::SampleNotFound { id }) => assert_eq!(id, "not-a-sample"),
        other => panic!("expected SampleNotFound, got {other:?}"),
    }
}

#[test]
fn discovery_styles_build_the_same_session_space() {
    let decorated = hyperparameter([("a", uniform(0, 1)), ("b", uniform(1, 2))])
        .unwrap()
        .decorate(());
    let annotated = annotate((), [("a", uniform(0, 1)), ("b", uniform(1, 2))]);

    assert_eq!(
        get_space_configuration(&decorated).unwrap(),
        get_space_configuration(&annotated).unwrap()
    );

    let space = get_space(&annotated).unwrap();
    let session = OptimizationSession::new("random", space, 0, json!(null)).unwrap();
    assert_eq!(session.space(), &get_space(&decorated).unwrap());
}

#[test]
fn snapshot_resumes_a_session() {
    let config = OptimizationConfig::new("resume", "gridsearch")
        .with_algorithm_config(json!({"n_values": 2}))
        .with_max_trials(0);
    let registry = sedna_optimizer::AlgorithmRegistry::with_builtins();
    let mut session =
        OptimizationSession::from_config(config.clone(), ab_space(), &registry).unwrap();

    let mut first = session.suggest(2).unwrap();
    for sample in &mut first {
        let value = objective(sample);
        session.observe(sample, value).unwrap();
    }
    let mut pending = session.suggest(2).unwrap();
    let state = session.state_dict().unwrap();

    let mut resumed = OptimizationSession::from_config(config, ab_space(), &registry).unwrap();
    resumed.set_state(&state).unwrap();
    assert_eq!(resumed.n_suggested(), 4);
    assert_eq!(resumed.n_observed(), 2);

    for sample in &mut pending {
        let value = objective(sample);
        resumed.observe(sample, value).unwrap();
    }
    assert!(resumed.is_done());
    assert!(resumed.suggest(1).unwrap().is_empty());
}
