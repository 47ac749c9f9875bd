//! Optimizer configuration.

use serde::{Deserialize, Serialize};

use dspy_types::{DspyResult, OptimizerError};

use crate::acquisition::AcquisitionKind;
use crate::demos::DemoSelectionStrategy;
use crate::instruction::InstructionStyle;
use crate::objective::{ObjectiveRegistry, Scalarization};

/// Configuration for a MIPROv2 run. Missing JSON fields fall back to
/// [`MiproConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiproConfig {
    /// Objective used when `objectives` is empty.
    pub metric: String,

    /// Objectives tracked per candidate. More than one enables Pareto
    /// tracking.
    pub objectives: Vec<String>,

    pub max_iterations: usize,

    /// Candidates generated and evaluated per iteration.
    pub num_candidates: usize,

    /// Upper bound of the demo-count dimension.
    pub max_bootstrapped_demos: usize,

    pub acquisition_function: AcquisitionKind,

    /// Exploration weight for UCB (ignored for EI).
    pub ucb_kappa: f64,

    /// Stop as soon as the best scalarized score reaches this value.
    pub stop_at_score: Option<f64>,

    pub convergence_threshold: f64,
    pub convergence_window: usize,

    /// History entries mutated per guided batch.
    pub top_k: usize,

    /// Mutation noise as a fraction of each dimension's range.
    pub mutation_scale: f64,

    /// Random samples drawn when maximizing the acquisition function.
    pub acquisition_samples: usize,

    /// Styles the instruction seed selects from. Empty means all.
    pub instruction_styles: Vec<InstructionStyle>,

    /// Strategies the demo seed selects from. Empty means all.
    pub demo_strategies: Vec<DemoSelectionStrategy>,

    pub scalarization: Scalarization,

    /// Turn tracing on for every module while the run is in progress.
    pub enable_tracing: bool,

    /// Clear the injected trace collector when a run starts.
    pub clear_traces: bool,

    pub seed: u64,

    pub gp_length_scale: f64,
    pub gp_noise: f64,
}

impl Default for MiproConfig {
    fn default() -> Self {
        Self {
            metric: "exact_match".to_string(),
            objectives: Vec::new(),
            max_iterations: 10,
            num_candidates: 4,
            max_bootstrapped_demos: 4,
            acquisition_function: AcquisitionKind::ExpectedImprovement,
            ucb_kappa: 2.0,
            stop_at_score: None,
            convergence_threshold: 1e-4,
            convergence_window: 5,
            top_k: 3,
            mutation_scale: 0.1,
            acquisition_samples: 128,
            instruction_styles: Vec::new(),
            demo_strategies: Vec::new(),
            scalarization: Scalarization::Mean,
            enable_tracing: false,
            clear_traces: false,
            seed: 42,
            gp_length_scale: 0.5,
            gp_noise: 1e-4,
        }
    }
}

impl MiproConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> DspyResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_metric(mut self, metric: &str) -> Self {
        self.metric = metric.to_string();
        self
    }

    pub fn with_objectives<S: AsRef<str>>(mut self, objectives: &[S]) -> Self {
        self.objectives = objectives.iter().map(|o| o.as_ref().to_string()).collect();
        self
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_num_candidates(mut self, n: usize) -> Self {
        self.num_candidates = n;
        self
    }

    pub fn with_max_bootstrapped_demos(mut self, n: usize) -> Self {
        self.max_bootstrapped_demos = n;
        self
    }

    pub fn with_acquisition(mut self, kind: AcquisitionKind) -> Self {
        self.acquisition_function = kind;
        self
    }

    pub fn with_ucb_kappa(mut self, kappa: f64) -> Self {
        self.ucb_kappa = kappa;
        self
    }

    pub fn with_stop_at_score(mut self, score: f64) -> Self {
        self.stop_at_score = Some(score);
        self
    }

    pub fn with_convergence(mut self, threshold: f64, window: usize) -> Self {
        self.convergence_threshold = threshold;
        self.convergence_window = window;
        self
    }

    pub fn with_instruction_styles(mut self, styles: Vec<InstructionStyle>) -> Self {
        self.instruction_styles = styles;
        self
    }

    pub fn with_demo_strategies(mut self, strategies: Vec<DemoSelectionStrategy>) -> Self {
        self.demo_strategies = strategies;
        self
    }

    pub fn with_scalarization(mut self, scalarization: Scalarization) -> Self {
        self.scalarization = scalarization;
        self
    }

    pub fn with_tracing(mut self, enable: bool, clear: bool) -> Self {
        self.enable_tracing = enable;
        self.clear_traces = clear;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// The objective list actually scored: `objectives`, or `[metric]` when
    /// none are configured.
    pub fn effective_objectives(&self) -> Vec<String> {
        if self.objectives.is_empty() {
            vec![self.metric.clone()]
        } else {
            self.objectives.clone()
        }
    }

    pub fn is_multi_objective(&self) -> bool {
        self.effective_objectives().len() > 1
    }

    /// Structural checks. Objective names are resolved later against the
    /// optimizer's registry.
    pub fn validate(&self) -> Result<(), OptimizerError> {
        let invalid = |message: &str| Err(OptimizerError::InvalidConfig { message: message.to_string() });

        if self.max_iterations == 0 {
            return invalid("max_iterations must be at least 1");
        }
        if self.num_candidates == 0 {
            return invalid("num_candidates must be at least 1");
        }
        if self.max_bootstrapped_demos == 0 {
            return invalid("max_bootstrapped_demos must be at least 1");
        }
        if self.convergence_window == 0 {
            return invalid("convergence_window must be at least 1");
        }
        if !(self.convergence_threshold.is_finite() && self.convergence_threshold >= 0.0) {
            return invalid("convergence_threshold must be a non-negative number");
        }
        if !(self.ucb_kappa.is_finite() && self.ucb_kappa >= 0.0) {
            return invalid("ucb_kappa must be a non-negative number");
        }
        if !(self.mutation_scale.is_finite() && self.mutation_scale > 0.0) {
            return invalid("mutation_scale must be positive");
        }
        if self.acquisition_samples == 0 {
            return invalid("acquisition_samples must be at least 1");
        }
        if !(self.gp_length_scale.is_finite() && self.gp_length_scale > 0.0) {
            return invalid("gp_length_scale must be positive");
        }
        if !(self.gp_noise.is_finite() && self.gp_noise >= 0.0) {
            return invalid("gp_noise must be non-negative");
        }
        if self.stop_at_score.is_some_and(|s| !s.is_finite()) {
            return invalid("stop_at_score must be finite");
        }
        if self.effective_objectives().iter().any(|o| o.trim().is_empty()) {
            return invalid("objective names must not be empty");
        }
        Ok(())
    }

    /// [`validate`](Self::validate) plus objective resolution.
    pub fn validate_with(&self, registry: &ObjectiveRegistry) -> Result<(), OptimizerError> {
        self.validate()?;
        for objective in self.effective_objectives() {
            registry.resolve(&objective)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dspy_types::DspyError;

    #[test]
    fn defaults_are_valid() {
        let config = MiproConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.effective_objectives(), vec!["exact_match".to_string()]);
        assert!(!config.is_multi_objective());
    }

    #[test]
    fn builders_chain() {
        let config = MiproConfig::new()
            .with_max_iterations(3)
            .with_num_candidates(2)
            .with_objectives(&["exact_match", "confidence"])
            .with_stop_at_score(0.9)
            .with_seed(7);

        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.num_candidates, 2);
        assert!(config.is_multi_objective());
        assert_eq!(config.stop_at_score, Some(0.9));
        assert_eq!(config.seed, 7);
    }

    #[test]
    fn zero_iterations_rejected() {
        let err = MiproConfig::new().with_max_iterations(0).validate().unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidConfig { .. }));
    }

    #[test]
    fn unknown_objective_rejected_against_registry() {
        let config = MiproConfig::new().with_objectives(&["exact_match", "bleu"]);
        assert!(config.validate().is_ok());
        assert!(matches!(
            config.validate_with(&ObjectiveRegistry::new()),
            Err(OptimizerError::UnknownObjective { .. })
        ));
    }

    #[test]
    fn from_json_fills_defaults() {
        let config = MiproConfig::from_json(
            r#"{"max_iterations": 2, "acquisition_function": "ucb", "instruction_styles": ["step-by-step"]}"#,
        )
        .unwrap();
        assert_eq!(config.max_iterations, 2);
        assert_eq!(config.acquisition_function, AcquisitionKind::UpperConfidenceBound);
        assert_eq!(config.instruction_styles, vec![InstructionStyle::StepByStep]);
        assert_eq!(config.num_candidates, 4);
    }

    #[test]
    fn from_json_rejects_unknown_acquisition() {
        let result = MiproConfig::from_json(r#"{"acquisition_function": "thompson"}"#);
        assert!(matches!(result, Err(DspyError::Serialization(_))));

        let result = MiproConfig::from_json(r#"{"num_candidates": 0}"#);
        assert!(matches!(result, Err(DspyError::Optimizer(OptimizerError::InvalidConfig { .. }))));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = MiproConfig::new().with_stop_at_score(0.8);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(MiproConfig::from_json(&json).unwrap(), config);
    }
}
