//! Tune a toy objective with hyperband, then with random search.
//!
//! Run with `RUST_LOG=sedna=debug` for per-sample logs.

use sedna_optimizer::{OptimizationConfig, OptimizationSession, Sample};
use sedna_space::{
    choices, fidelity, get_space, get_space_configuration, hyperparameter, loguniform, uniform,
};
use sedna_types::Params;
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// Lower is better. More epochs reduce the noise floor.
fn train(params: &Params) -> f64 {
    let lr = params.get("lr").and_then(|v| v.as_f64()).unwrap_or(1.0);
    let dropout = params.get("dropout").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let epochs = params.get("epochs").and_then(|v| v.as_f64()).unwrap_or(1.0);
    let penalty = match params.get("optimizer").and_then(|v| v.as_str()) {
        Some("adam") => 0.0,
        _ => 0.1,
    };
    (lr.log10() + 2.5).powi(2) + (dropout - 0.2).powi(2) + penalty + 1.0 / epochs
}

fn hunt(
    session: &mut OptimizationSession,
    evaluate: impl Fn(&Sample) -> f64,
) -> anyhow::Result<Option<(Sample, f64)>> {
    let mut best: Option<(Sample, f64)> = None;
    while !session.is_done() {
        let samples = session.suggest(4)?;
        if samples.is_empty() {
            break;
        }
        for mut sample in samples {
            let value = evaluate(&sample);
            session.observe(&mut sample, value)?;
            if best.as_ref().map_or(true, |(_, b)| value < *b) {
                best = Some((sample, value));
            }
        }
    }
    Ok(best)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sedna=info")),
        )
        .init();

    let objective = hyperparameter([
        ("lr", loguniform(1e-5, 1.0)),
        ("dropout", uniform(0.0, 0.5).precision(2)),
        ("optimizer", choices(["sgd", "adam"])),
        ("epochs", fidelity(1, 27).base(3)),
    ])?
    .decorate(train);

    println!("Search space:");
    for (name, prior) in get_space_configuration(&objective)? {
        println!("  {name} ~ {prior}");
    }
    let space = get_space(&objective)?;

    let config = OptimizationConfig::new("toy-hyperband", "hyperband")
        .with_algorithm_config(json!({"repetitions": 1}))
        .with_seed(42);
    let mut session = OptimizationSession::from_config(
        config,
        space.clone(),
        &sedna_optimizer::AlgorithmRegistry::with_builtins(),
    )?;
    if let Some((sample, value)) = hunt(&mut session, |s| objective.call(&s.params))? {
        println!(
            "hyperband: best {value:.4} at {:?} after {} trials",
            sample.params,
            session.n_observed()
        );
    }

    let mut session = OptimizationSession::new("random", space, 30, json!({"seed": 42}))?;
    if let Some((sample, value)) = hunt(&mut session, |s| train(&s.params))? {
        println!(
            "random: best {value:.4} at {:?} after {} trials",
            sample.params,
            session.n_observed()
        );
    }

    let state = session.state_dict()?;
    println!("random snapshot holds {} bytes", serde_json::to_vec(&state)?.len());
    Ok(())
}
