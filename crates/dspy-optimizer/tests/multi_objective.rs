mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{scores, trainset, PromptModule, ScriptedEvaluator};
use dspy_optimizer::{
    dominates, FnObjective, MiproConfig, MiproV2, ObjectiveRegistry, Scalarization,
};
use dspy_types::{Prediction, SingleModuleProgram};

fn objectives() -> Vec<String> {
    vec!["exact_match".to_string(), "confidence".to_string()]
}

fn pair(exact: f64, confidence: f64) -> Option<BTreeMap<String, f64>> {
    Some(scores(&[("exact_match", exact), ("confidence", confidence)]))
}

#[test]
fn frontier_keeps_only_the_dominating_candidate() {
    let config = MiproConfig::new()
        .with_objectives(&["exact_match", "confidence"])
        .with_max_iterations(1)
        .with_num_candidates(4);
    let mut optimizer = MiproV2::new(config)
        .unwrap()
        .with_evaluator(Arc::new(ScriptedEvaluator::new(vec![
            pair(0.8, 0.7),
            pair(0.6, 0.5),
            pair(0.7, 0.8),
            pair(0.9, 0.9),
        ])));

    let program = SingleModuleProgram::new(Box::new(PromptModule::new()));
    optimizer.compile(&program, &trainset(10), None);

    let frontier = optimizer.pareto_frontier();
    assert_eq!(frontier.len(), 1);
    assert_eq!(frontier[0].scores, pair(0.9, 0.9).unwrap());
    assert_eq!(frontier[0].candidate.id(), "random_1_3");
    assert_eq!(optimizer.best_candidate().map(|c| c.id()), Some("random_1_3"));

    let entry = &optimizer.optimization_history()[0];
    assert_eq!(entry.best_candidate.id(), "random_1_3");
    assert!((entry.score - 0.9).abs() < 1e-12);
}

#[test]
fn frontier_is_recomputed_across_iterations() {
    let config = MiproConfig::new()
        .with_objectives(&["exact_match", "confidence"])
        .with_max_iterations(2)
        .with_num_candidates(2);
    let mut optimizer = MiproV2::new(config)
        .unwrap()
        .with_evaluator(Arc::new(ScriptedEvaluator::new(vec![
            pair(0.8, 0.7),
            pair(0.6, 0.5),
            pair(0.7, 0.8),
            pair(0.9, 0.9),
        ])));

    let program = SingleModuleProgram::new(Box::new(PromptModule::new()));
    optimizer.compile(&program, &trainset(5), None);

    let frontier = optimizer.pareto_frontier();
    assert_eq!(frontier.len(), 1);
    assert_eq!(frontier[0].scores, pair(0.9, 0.9).unwrap());

    let history = optimizer.optimization_history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].best_candidate.id(), "random_1_0");

    let best = optimizer.best_candidate().map(|c| c.id().to_string());
    assert_eq!(best.as_deref(), Some(frontier[0].candidate.id()));
    assert!(frontier[0].candidate.id().ends_with("_2_1"));
    assert_eq!(history[1].best_candidate.id(), frontier[0].candidate.id());
}

#[test]
fn frontier_is_mutually_non_dominated_across_iterations() {
    let config = MiproConfig::new()
        .with_objectives(&["exact_match", "confidence"])
        .with_max_iterations(3)
        .with_num_candidates(3);
    let mut optimizer = MiproV2::new(config)
        .unwrap()
        .with_evaluator(Arc::new(ScriptedEvaluator::new(vec![
            pair(0.9, 0.1),
            pair(0.1, 0.9),
            pair(0.5, 0.5),
            pair(0.4, 0.4),
            pair(0.6, 0.6),
        ])));

    let program = SingleModuleProgram::new(Box::new(PromptModule::new()));
    optimizer.compile(&program, &trainset(10), None);

    let frontier = optimizer.pareto_frontier();
    assert!(!frontier.is_empty());
    let objs = objectives();
    for entry in frontier {
        for other in optimizer.evaluated_candidates() {
            assert!(!dominates(&other.scores, &entry.scores, &objs));
        }
    }
}

#[test]
fn weighted_scalarization_picks_the_preferred_trade_off() {
    let weights = BTreeMap::from([("exact_match".to_string(), 1.0), ("confidence".to_string(), 4.0)]);
    let config = MiproConfig::new()
        .with_objectives(&["exact_match", "confidence"])
        .with_max_iterations(1)
        .with_num_candidates(2)
        .with_scalarization(Scalarization::Weighted { weights });
    let mut optimizer = MiproV2::new(config)
        .unwrap()
        .with_evaluator(Arc::new(ScriptedEvaluator::new(vec![pair(0.9, 0.2), pair(0.3, 0.8)])));

    let program = SingleModuleProgram::new(Box::new(PromptModule::new()));
    optimizer.compile(&program, &trainset(10), None);

    assert_eq!(optimizer.pareto_frontier().len(), 2);
    assert_eq!(optimizer.best_candidate().map(|c| c.id()), Some("random_1_1"));
}

#[test]
fn single_objective_run_has_no_frontier() {
    let config = MiproConfig::new().with_max_iterations(1).with_num_candidates(2);
    let mut optimizer = MiproV2::new(config).unwrap();

    let program = SingleModuleProgram::new(Box::new(PromptModule::new()));
    optimizer.compile(&program, &trainset(10), None);

    assert!(optimizer.pareto_frontier().is_empty());
    for evaluated in optimizer.evaluated_candidates() {
        assert_eq!(evaluated.scores.len(), 1);
        assert!(evaluated.scores.contains_key("exact_match"));
    }
}

#[test]
fn custom_objectives_are_resolved_through_the_registry() {
    let mut registry = ObjectiveRegistry::new();
    registry.register(Arc::new(FnObjective::new("brevity", |_, prediction: &Prediction| {
        let len = prediction.get_str("answer").map(str::len).unwrap_or(0);
        1.0 / (1.0 + len as f64)
    })));

    let config = MiproConfig::new()
        .with_objectives(&["exact_match", "brevity"])
        .with_max_iterations(1)
        .with_num_candidates(2);
    assert!(MiproV2::new(config.clone()).is_err());

    let mut optimizer = MiproV2::with_registry(config, &registry).unwrap();
    let program = SingleModuleProgram::new(Box::new(PromptModule::new()));
    optimizer.compile(&program, &trainset(10), None);

    for evaluated in optimizer.evaluated_candidates() {
        let brevity = evaluated.scores["brevity"];
        assert!(brevity > 0.0 && brevity < 1.0);
    }
    assert!(!optimizer.pareto_frontier().is_empty());
}
