//! Scoring of a program against a validation set.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use dspy_types::{DspyResult, Example, OptimizerError, Program, ProgramError, Trace};

use crate::objective::{Objective, ObjectiveRegistry};

/// Mean per-objective scores plus one trace per validation example.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub scores: BTreeMap<String, f64>,
    pub traces: Vec<Trace>,
}

/// Scores a program on a validation set.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, program: &dyn Program, valset: &[Example]) -> DspyResult<Evaluation>;
}

/// Averages every configured objective over the validation set. Examples
/// whose forward pass fails score 0 on every objective.
#[derive(Clone)]
pub struct MultiObjectiveEvaluator {
    objectives: Vec<Arc<dyn Objective>>,
}

impl MultiObjectiveEvaluator {
    /// Resolve `names` through `registry`. Fails on the first unknown name.
    pub fn new(names: &[String], registry: &ObjectiveRegistry) -> Result<Self, OptimizerError> {
        let objectives = names
            .iter()
            .map(|name| registry.resolve(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { objectives })
    }

    pub fn from_objectives(objectives: Vec<Arc<dyn Objective>>) -> Self {
        Self { objectives }
    }

    pub fn objective_names(&self) -> Vec<String> {
        self.objectives.iter().map(|o| o.name().to_string()).collect()
    }
}

impl std::fmt::Debug for MultiObjectiveEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiObjectiveEvaluator")
            .field("objectives", &self.objective_names())
            .finish()
    }
}

impl Evaluator for MultiObjectiveEvaluator {
    fn evaluate(&self, program: &dyn Program, valset: &[Example]) -> DspyResult<Evaluation> {
        if valset.is_empty() {
            return Err(OptimizerError::EmptyValset.into());
        }

        let mut totals: BTreeMap<String, f64> =
            self.objectives.iter().map(|o| (o.name().to_string(), 0.0)).collect();
        let mut traces = Vec::with_capacity(valset.len());
        let mut failures = 0usize;
        let mut last_error = None;

        for example in valset {
            let inputs = example.inputs();
            match program.forward(&inputs) {
                Ok(prediction) => {
                    for objective in &self.objectives {
                        let score = objective.score(example, &prediction);
                        let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
                        if let Some(total) = totals.get_mut(objective.name()) {
                            *total += score;
                        }
                    }
                    traces.push(Trace::success("program", inputs, prediction));
                }
                Err(e) => {
                    debug!(error = %e, "Validation example failed");
                    failures += 1;
                    traces.push(Trace::failure("program", inputs, e.to_string()));
                    last_error = Some(e.to_string());
                }
            }
        }

        if failures == valset.len() {
            return Err(ProgramError::ForwardFailed {
                message: format!(
                    "all {} validation examples failed: {}",
                    failures,
                    last_error.unwrap_or_default()
                ),
            }
            .into());
        }

        let n = valset.len() as f64;
        let scores = totals.into_iter().map(|(name, total)| (name, total / n)).collect();
        Ok(Evaluation { scores, traces })
    }
}
