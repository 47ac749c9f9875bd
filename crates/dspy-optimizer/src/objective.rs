//! Scoring objectives and multi-objective scalarization.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use dspy_types::{Example, OptimizerError, Prediction};

/// A per-example scoring rule. Scores are expected in `[0, 1]`.
pub trait Objective: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, example: &Example, prediction: &Prediction) -> f64;
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_lowercase(),
        other => other.to_string(),
    }
}

fn tokens(value: &Value) -> Vec<String> {
    as_text(value)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// 1.0 when every label field matches the prediction after trimming and
/// lower-casing, else 0.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatch;

impl Objective for ExactMatch {
    fn name(&self) -> &str {
        "exact_match"
    }

    fn score(&self, example: &Example, prediction: &Prediction) -> f64 {
        let labels = example.labels();
        if labels.is_empty() {
            return 0.0;
        }
        let all_match = labels.fields().iter().all(|(key, expected)| {
            prediction
                .get(key)
                .map(|actual| as_text(actual) == as_text(expected))
                .unwrap_or(false)
        });
        if all_match {
            1.0
        } else {
            0.0
        }
    }
}

/// Token-level F1 averaged over label fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenF1;

impl Objective for TokenF1 {
    fn name(&self) -> &str {
        "f1"
    }

    fn score(&self, example: &Example, prediction: &Prediction) -> f64 {
        let labels = example.labels();
        if labels.is_empty() {
            return 0.0;
        }
        let total: f64 = labels
            .fields()
            .iter()
            .map(|(key, expected)| match prediction.get(key) {
                Some(actual) => f1(&tokens(actual), &tokens(expected)),
                None => 0.0,
            })
            .sum();
        total / labels.len() as f64
    }
}

fn f1(predicted: &[String], expected: &[String]) -> f64 {
    if predicted.is_empty() && expected.is_empty() {
        return 1.0;
    }
    if predicted.is_empty() || expected.is_empty() {
        return 0.0;
    }
    let mut remaining: HashMap<&str, usize> = HashMap::new();
    for token in expected {
        *remaining.entry(token.as_str()).or_default() += 1;
    }
    let mut overlap = 0usize;
    for token in predicted {
        if let Some(count) = remaining.get_mut(token.as_str()) {
            if *count > 0 {
                *count -= 1;
                overlap += 1;
            }
        }
    }
    if overlap == 0 {
        return 0.0;
    }
    let precision = overlap as f64 / predicted.len() as f64;
    let recall = overlap as f64 / expected.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

/// Self-reported confidence read from a numeric prediction field.
#[derive(Debug, Clone)]
pub struct Confidence {
    field: String,
}

impl Confidence {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self::new("confidence")
    }
}

impl Objective for Confidence {
    fn name(&self) -> &str {
        "confidence"
    }

    fn score(&self, _example: &Example, prediction: &Prediction) -> f64 {
        prediction
            .get_f64(&self.field)
            .filter(|v| v.is_finite())
            .map(|v| v.clamp(0.0, 1.0))
            .unwrap_or(0.0)
    }
}

type ScoreFn = dyn Fn(&Example, &Prediction) -> f64 + Send + Sync;

/// Objective backed by a closure.
#[derive(Clone)]
pub struct FnObjective {
    name: String,
    score_fn: Arc<ScoreFn>,
}

impl FnObjective {
    pub fn new<F>(name: impl Into<String>, score_fn: F) -> Self
    where
        F: Fn(&Example, &Prediction) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            score_fn: Arc::new(score_fn),
        }
    }
}

impl std::fmt::Debug for FnObjective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnObjective").field("name", &self.name).finish()
    }
}

impl Objective for FnObjective {
    fn name(&self) -> &str {
        &self.name
    }

    fn score(&self, example: &Example, prediction: &Prediction) -> f64 {
        (self.score_fn)(example, prediction)
    }
}

/// Name-to-objective lookup, pre-populated with the built-ins.
#[derive(Clone)]
pub struct ObjectiveRegistry {
    objectives: HashMap<String, Arc<dyn Objective>>,
}

impl ObjectiveRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            objectives: HashMap::new(),
        };
        registry.register(Arc::new(ExactMatch));
        registry.register(Arc::new(TokenF1));
        registry.register(Arc::new(Confidence::default()));
        registry
    }

    /// Register (or replace) an objective under its own name.
    pub fn register(&mut self, objective: Arc<dyn Objective>) {
        self.objectives.insert(objective.name().to_string(), objective);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objectives.contains_key(name)
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Objective>, OptimizerError> {
        self.objectives
            .get(name)
            .cloned()
            .ok_or_else(|| OptimizerError::UnknownObjective { name: name.to_string() })
    }

    pub fn names(&self) -> BTreeSet<&str> {
        self.objectives.keys().map(String::as_str).collect()
    }
}

impl Default for ObjectiveRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObjectiveRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectiveRegistry").field("objectives", &self.names()).finish()
    }
}

/// Collapses a score map to a single number for ranking, surrogate targets
/// and stop checks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scalarization {
    /// Unweighted average of the tracked objectives.
    #[default]
    Mean,
    /// Weighted average; objectives without a weight count as weight 0.
    Weighted { weights: BTreeMap<String, f64> },
}

impl Scalarization {
    /// Missing objective scores count as 0.
    pub fn scalarize(&self, scores: &BTreeMap<String, f64>, objectives: &[String]) -> f64 {
        let names: Vec<&str> = if objectives.is_empty() {
            scores.keys().map(String::as_str).collect()
        } else {
            objectives.iter().map(String::as_str).collect()
        };
        if names.is_empty() {
            return 0.0;
        }
        let value = |name: &str| scores.get(name).copied().unwrap_or(0.0);

        match self {
            Self::Mean => names.iter().map(|n| value(n)).sum::<f64>() / names.len() as f64,
            Self::Weighted { weights } => {
                let total_weight: f64 = names.iter().map(|n| weights.get(*n).copied().unwrap_or(0.0)).sum();
                if total_weight <= 0.0 {
                    return Self::Mean.scalarize(scores, objectives);
                }
                names
                    .iter()
                    .map(|n| weights.get(*n).copied().unwrap_or(0.0) * value(n))
                    .sum::<f64>()
                    / total_weight
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qa(answer: &str) -> Example {
        Example::new()
            .with("question", "capital of France?")
            .with("answer", answer)
            .with_inputs(&["question"])
    }

    #[test]
    fn exact_match_normalizes_case_and_whitespace() {
        let example = qa("Paris");
        assert_eq!(ExactMatch.score(&example, &Prediction::new().with("answer", "  paris ")), 1.0);
        assert_eq!(ExactMatch.score(&example, &Prediction::new().with("answer", "Lyon")), 0.0);
        assert_eq!(ExactMatch.score(&example, &Prediction::new()), 0.0);
    }

    #[test]
    fn exact_match_compares_numbers_with_strings() {
        let example = Example::new().with("q", "legs?").with("answer", 8).with_inputs(&["q"]);
        assert_eq!(ExactMatch.score(&example, &Prediction::new().with("answer", "8")), 1.0);
    }

    #[test]
    fn token_f1_partial_credit() {
        let example = qa("the city of Paris");
        let score = TokenF1.score(&example, &Prediction::new().with("answer", "Paris"));
        // precision 1, recall 1/4
        assert!((score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn confidence_reads_and_clamps() {
        let example = qa("Paris");
        let objective = Confidence::default();
        assert_eq!(objective.score(&example, &Prediction::new().with("confidence", 0.7)), 0.7);
        assert_eq!(objective.score(&example, &Prediction::new().with("confidence", 3.0)), 1.0);
        assert_eq!(objective.score(&example, &Prediction::new()), 0.0);
    }

    #[test]
    fn registry_resolves_builtins_and_custom() {
        let mut registry = ObjectiveRegistry::new();
        assert!(registry.resolve("exact_match").is_ok());
        assert!(registry.resolve("f1").is_ok());
        assert!(matches!(
            registry.resolve("bleu"),
            Err(OptimizerError::UnknownObjective { .. })
        ));

        registry.register(Arc::new(FnObjective::new("length", |_, p: &Prediction| {
            p.get_str("answer").map(|a| (a.len() as f64 / 10.0).min(1.0)).unwrap_or(0.0)
        })));
        let length = registry.resolve("length").unwrap();
        assert_eq!(length.score(&qa("x"), &Prediction::new().with("answer", "Paris")), 0.5);
    }

    #[test]
    fn mean_scalarization() {
        let scores = BTreeMap::from([("exact_match".to_string(), 0.8), ("confidence".to_string(), 0.6)]);
        let objectives = vec!["exact_match".to_string(), "confidence".to_string()];
        assert!((Scalarization::Mean.scalarize(&scores, &objectives) - 0.7).abs() < 1e-12);

        let single = vec!["exact_match".to_string()];
        assert_eq!(Scalarization::Mean.scalarize(&scores, &single), 0.8);
        assert!((Scalarization::Mean.scalarize(&scores, &[]) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn weighted_scalarization() {
        let scores = BTreeMap::from([("exact_match".to_string(), 1.0), ("confidence".to_string(), 0.0)]);
        let objectives = vec!["exact_match".to_string(), "confidence".to_string()];
        let weighted = Scalarization::Weighted {
            weights: BTreeMap::from([("exact_match".to_string(), 3.0), ("confidence".to_string(), 1.0)]),
        };
        assert_eq!(weighted.scalarize(&scores, &objectives), 0.75);

        let zero = Scalarization::Weighted { weights: BTreeMap::new() };
        assert_eq!(zero.scalarize(&scores, &objectives), 0.5);
    }

    #[test]
    fn scalarization_serde_shape() {
        let json = serde_json::to_value(Scalarization::Mean).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "mean"}));
    }
}
