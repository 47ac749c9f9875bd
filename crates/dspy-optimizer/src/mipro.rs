//! The MIPROv2 compile loop.
//!
//! A run walks `Init → Iterating → Finalizing → Done`. Each iteration
//! generates a batch of candidates (random on the first iteration, guided by
//! the surrogate afterwards), materializes every module of a program copy
//! for each candidate, scores the copy on the validation set and feeds the
//! results back into the Gaussian Process. Any program-level error moves the
//! run to `Failed` and `compile` hands back an unmodified clone.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use dspy_types::{
    DspyResult, Example, Module, OptimizerError, Program, ProgramError, SingleModuleProgram, TraceCollector,
};

use crate::acquisition::{AcquisitionFunction, AcquisitionSearch};
use crate::candidate::{Candidate, SearchBounds};
use crate::config::MiproConfig;
use crate::evaluator::{Evaluator, MultiObjectiveEvaluator};
use crate::gaussian::GaussianProcess;
use crate::generator::CandidateGenerator;
use crate::history::{trailing_variance, EvaluatedCandidate, HistoryEntry, RunMetadata, StopReason};
use crate::materialize::Materializer;
use crate::objective::ObjectiveRegistry;
use crate::pareto::{compute_pareto_frontier, ParetoEntry};

/// Split `trainset` into `(train, val)` when no validation set is given:
/// the last `max(1, n / 5)` examples validate and the rest train. A single
/// example serves as both.
pub fn split_dataset(trainset: &[Example], valset: Option<&[Example]>) -> (Vec<Example>, Vec<Example>) {
    if let Some(valset) = valset {
        return (trainset.to_vec(), valset.to_vec());
    }
    let n = trainset.len();
    if n <= 1 {
        return (trainset.to_vec(), trainset.to_vec());
    }
    let val_len = (n / 5).max(1);
    let (train, val) = trainset.split_at(n - val_len);
    (train.to_vec(), val.to_vec())
}

/// Bayesian optimizer over instructions, demonstrations and temperature.
pub struct MiproV2 {
    config: MiproConfig,
    objectives: Vec<String>,
    evaluator: Arc<dyn Evaluator>,
    trace_collector: Option<Arc<dyn TraceCollector>>,
    materializer: Materializer,
    acquisition: AcquisitionFunction,
    gp: GaussianProcess,
    history: Vec<HistoryEntry>,
    evaluated: Vec<EvaluatedCandidate>,
    frontier: Vec<ParetoEntry>,
    metadata: RunMetadata,
}

impl MiproV2 {
    /// Build an optimizer scoring with the built-in objectives. Invalid
    /// configuration is rejected here rather than during `compile`.
    pub fn new(config: MiproConfig) -> DspyResult<Self> {
        Self::with_registry(config, &ObjectiveRegistry::new())
    }

    /// Like [`MiproV2::new`] but resolving objectives through `registry`.
    pub fn with_registry(config: MiproConfig, registry: &ObjectiveRegistry) -> DspyResult<Self> {
        config.validate_with(registry)?;
        let objectives = config.effective_objectives();
        let evaluator = MultiObjectiveEvaluator::new(&objectives, registry)?;

        Ok(Self {
            materializer: Materializer::new(config.instruction_styles.clone(), config.demo_strategies.clone()),
            acquisition: AcquisitionFunction::new(config.acquisition_function, config.ucb_kappa),
            gp: GaussianProcess::new(config.gp_length_scale, 1.0, config.gp_noise),
            objectives,
            evaluator: Arc::new(evaluator),
            trace_collector: None,
            history: Vec::new(),
            evaluated: Vec::new(),
            frontier: Vec::new(),
            metadata: RunMetadata::new(),
            config,
        })
    }

    /// Replace the built-in evaluator.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_trace_collector(mut self, collector: Arc<dyn TraceCollector>) -> Self {
        self.trace_collector = Some(collector);
        self
    }

    pub fn config(&self) -> &MiproConfig {
        &self.config
    }

    pub fn objectives(&self) -> &[String] {
        &self.objectives
    }

    pub fn optimization_history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn pareto_frontier(&self) -> &[ParetoEntry] {
        &self.frontier
    }

    pub fn evaluated_candidates(&self) -> &[EvaluatedCandidate] {
        &self.evaluated
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    pub fn gaussian_process(&self) -> &GaussianProcess {
        &self.gp
    }

    fn is_multi_objective(&self) -> bool {
        self.objectives.len() > 1
    }

    fn scalarize(&self, scores: &std::collections::BTreeMap<String, f64>) -> f64 {
        self.config.scalarization.scalarize(scores, &self.objectives)
    }

    /// Optimize every module of `program` and return the optimized copy.
    /// On any program-level failure the error lands in
    /// [`metadata`](Self::metadata) and a clone of `program` is returned.
    pub fn compile<P>(&mut self, program: &P, trainset: &[Example], valset: Option<&[Example]>) -> P
    where
        P: Program + Clone,
    {
        self.reset();
        info!(
            run_id = %self.metadata.run_id,
            max_iterations = self.config.max_iterations,
            num_candidates = self.config.num_candidates,
            objectives = ?self.objectives,
            "Starting MIPROv2 compile"
        );

        match self.run(program, trainset, valset) {
            Ok(optimized) => {
                self.metadata.mark_completed();
                info!(
                    run_id = %self.metadata.run_id,
                    iterations = self.metadata.iterations_run,
                    evaluated = self.metadata.candidates_evaluated,
                    failed = self.metadata.candidates_failed,
                    stop_reason = ?self.metadata.stop_reason,
                    "MIPROv2 compile finished"
                );
                optimized
            }
            Err(e) => {
                error!(run_id = %self.metadata.run_id, error = %e, "MIPROv2 compile aborted");
                self.metadata.mark_failed(e.to_string());
                program.clone()
            }
        }
    }

    /// Optimize a single module by wrapping it in a one-module program.
    pub fn optimize_module(&mut self, module: &dyn Module, trainset: &[Example]) -> Box<dyn Module> {
        let program = SingleModuleProgram::new(module.box_clone());
        self.compile(&program, trainset, None).into_module()
    }

    fn reset(&mut self) {
        self.gp.reset();
        self.history.clear();
        self.evaluated.clear();
        self.frontier.clear();
        self.metadata = RunMetadata::new();
    }

    fn run<P>(&mut self, program: &P, trainset: &[Example], valset: Option<&[Example]>) -> DspyResult<P>
    where
        P: Program + Clone,
    {
        if trainset.is_empty() {
            return Err(OptimizerError::EmptyTrainset.into());
        }
        if valset.is_some_and(|v| v.is_empty()) {
            return Err(OptimizerError::EmptyValset.into());
        }
        let names = program.module_names()?;
        if names.is_empty() {
            return Err(ProgramError::NoModules.into());
        }

        let (train, val) = split_dataset(trainset, valset);
        let mut working = program.clone();

        if self.config.enable_tracing {
            for name in &names {
                lookup_mut(&mut working, name)?.enable_trace();
            }
        }
        if self.config.clear_traces {
            if let Some(collector) = &self.trace_collector {
                collector.clear();
            }
        }

        let mut bases: Vec<(String, Box<dyn Module>)> = Vec::with_capacity(names.len());
        for name in &names {
            let module = working
                .module(name)
                .ok_or_else(|| ProgramError::ModuleNotFound { name: name.clone() })?;
            bases.push((name.clone(), module.box_clone()));
        }

        debug!(train = train.len(), val = val.len(), modules = names.len(), "Initialized run");
        self.metadata.mark_running();

        let stop_reason = self.iterate(&working, &bases, &train, &val);
        self.metadata.mark_finalizing(stop_reason);

        self.finalize(&mut working, &bases, &train)?;
        Ok(working)
    }

    fn iterate<P>(
        &mut self,
        working: &P,
        bases: &[(String, Box<dyn Module>)],
        train: &[Example],
        val: &[Example],
    ) -> Option<StopReason>
    where
        P: Program + Clone,
    {
        let bounds = SearchBounds::new(self.config.max_bootstrapped_demos);
        let mut generator = CandidateGenerator::new(bounds, self.config.seed)
            .with_mutation_scale(self.config.mutation_scale)
            .with_top_k(self.config.top_k)
            .with_search(AcquisitionSearch {
                samples: self.config.acquisition_samples,
                ..AcquisitionSearch::default()
            });

        for iteration in 1..=self.config.max_iterations {
            let batch = if iteration == 1 || self.history.is_empty() {
                generator.generate_random_candidates(self.config.num_candidates, iteration)
            } else {
                generator.generate_guided_candidates(
                    self.config.num_candidates,
                    iteration,
                    &self.history,
                    &self.gp,
                    &self.acquisition,
                )
            };

            let first_new = self.evaluated.len();
            for candidate in batch {
                match self.evaluate_candidate(working, bases, &candidate, train, val) {
                    Ok(evaluated) => {
                        self.metadata.candidates_evaluated += 1;
                        self.evaluated.push(evaluated);
                    }
                    Err(e) => {
                        warn!(candidate = candidate.id(), error = %e, "Skipping candidate");
                        self.metadata.candidates_failed += 1;
                    }
                }
            }
            self.metadata.iterations_run = iteration;

            let new_results = &self.evaluated[first_new..];
            if new_results.is_empty() {
                warn!(iteration, "No candidate evaluated successfully this iteration");
            } else {
                self.record_iteration(iteration, first_new, &bounds);
            }

            if let Some(reason) = self.stop_reason(iteration) {
                info!(iteration, reason = %reason, "Stopping optimization");
                return Some(reason);
            }
        }
        None
    }

    fn evaluate_candidate<P>(
        &self,
        working: &P,
        bases: &[(String, Box<dyn Module>)],
        candidate: &Candidate,
        train: &[Example],
        val: &[Example],
    ) -> DspyResult<EvaluatedCandidate>
    where
        P: Program + Clone,
    {
        let mut trial = working.clone();
        for (name, base) in bases {
            let mut module = self.materializer.materialize(base.as_ref(), candidate, train).module;
            if self.config.enable_tracing {
                module.enable_trace();
            }
            trial.replace_module(name, module)?;
        }

        let evaluation = self.evaluator.evaluate(&trial, val).map_err(|e| OptimizerError::EvaluationFailed {
            candidate_id: candidate.id().to_string(),
            message: e.to_string(),
        })?;

        if let Some(collector) = &self.trace_collector {
            for trace in &evaluation.traces {
                collector.collect(
                    trace
                        .clone()
                        .with_metadata("candidate_id", serde_json::Value::from(candidate.id())),
                );
            }
        }

        debug!(candidate = candidate.id(), scores = ?evaluation.scores, "Evaluated candidate");
        Ok(EvaluatedCandidate::new(candidate.clone(), evaluation.scores, evaluation.traces))
    }

    fn record_iteration(&mut self, iteration: usize, first_new: usize, bounds: &SearchBounds) {
        let mut iteration_best: Option<(usize, f64)> = None;
        for i in first_new..self.evaluated.len() {
            let evaluated = &self.evaluated[i];
            let score = self.scalarize(&evaluated.scores);
            self.gp.add_observation(evaluated.candidate.features(bounds), score);
            if iteration_best.map_or(true, |(_, best)| score > best) {
                iteration_best = Some((i, score));
            }
        }
        self.gp.update();

        if self.is_multi_objective() {
            self.frontier = compute_pareto_frontier(&self.evaluated, &self.objectives);
        }

        if let Some((i, score)) = iteration_best {
            let best = &self.evaluated[i];
            info!(
                iteration,
                candidate = best.candidate.id(),
                score,
                frontier = self.frontier.len(),
                "Iteration complete"
            );
            self.history.push(HistoryEntry {
                iteration,
                best_candidate: best.candidate.clone(),
                scores: best.scores.clone(),
                score,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    fn stop_reason(&self, iteration: usize) -> Option<StopReason> {
        if iteration >= self.config.max_iterations {
            return Some(StopReason::MaxIterations);
        }
        let best = self.history.iter().map(|h| h.score).fold(f64::NEG_INFINITY, f64::max);
        if let Some(target) = self.config.stop_at_score {
            if best >= target {
                return Some(StopReason::TargetScore);
            }
        }
        if let Some(variance) = trailing_variance(&self.history, self.config.convergence_window) {
            if variance < self.config.convergence_threshold {
                return Some(StopReason::Converged);
            }
        }
        None
    }

    /// Highest-scoring candidate: the best evaluated one in single-objective
    /// runs, the best frontier entry otherwise. Ties keep the earliest.
    pub fn best_candidate(&self) -> Option<&Candidate> {
        let mut best: Option<(&Candidate, f64)> = None;

        if self.is_multi_objective() && !self.frontier.is_empty() {
            for entry in &self.frontier {
                let score = self.scalarize(&entry.scores);
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((&entry.candidate, score));
                }
            }
        } else {
            for evaluated in &self.evaluated {
                let score = self.scalarize(&evaluated.scores);
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((&evaluated.candidate, score));
                }
            }
        }
        best.map(|(candidate, _)| candidate)
    }

    fn finalize<P>(&self, working: &mut P, bases: &[(String, Box<dyn Module>)], train: &[Example]) -> DspyResult<()>
    where
        P: Program + Clone,
    {
        match self.best_candidate() {
            Some(best) => {
                info!(candidate = best.id(), "Applying best candidate");
                for (name, base) in bases {
                    let mut module = self.materializer.materialize(base.as_ref(), best, train).module;
                    let was_tracing = working.module(name).is_some_and(|m| m.is_tracing());
                    if was_tracing {
                        module.enable_trace();
                    }
                    let mut replaced = working.replace_module(name, module)?;
                    replaced.disable_trace();
                }
            }
            None => warn!("No candidate evaluated successfully, returning the program unchanged"),
        }

        if self.config.enable_tracing {
            for (name, _) in bases {
                lookup_mut(working, name)?.disable_trace();
            }
        }
        Ok(())
    }
}

fn lookup_mut<'a, P: Program>(program: &'a mut P, name: &str) -> DspyResult<&'a mut dyn Module> {
    program
        .module_mut(name)
        .ok_or_else(|| ProgramError::ModuleNotFound { name: name.to_string() }.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dspy_types::{DspyError, FieldType, Prediction, Signature};

    #[derive(Debug, Clone)]
    struct EchoModule {
        signature: Signature,
        demos: Vec<Example>,
        instruction: Option<String>,
        tracing: bool,
    }

    impl EchoModule {
        fn new() -> Self {
            Self {
                signature: Signature::new("Echo")
                    .input("question", FieldType::String)
                    .output("answer", FieldType::String),
                demos: Vec::new(),
                instruction: None,
                tracing: false,
            }
        }
    }

    impl Module for EchoModule {
        fn signature(&self) -> &Signature {
            &self.signature
        }

        fn call(&self, inputs: &Example) -> DspyResult<Prediction> {
            // Correct only once demonstrations are attached.
            let answer = if self.demos.is_empty() {
                "unknown".to_string()
            } else {
                inputs.get_str("question").unwrap_or_default().to_uppercase()
            };
            Ok(Prediction::new().with("answer", answer))
        }

        fn demos(&self) -> &[Example] {
            &self.demos
        }

        fn instruction(&self) -> Option<&str> {
            self.instruction.as_deref()
        }

        fn with_demos(&self, demos: Vec<Example>) -> Box<dyn Module> {
            Box::new(Self { demos, ..self.clone() })
        }

        fn with_instruction(&self, instruction: &str) -> Box<dyn Module> {
            Box::new(Self {
                instruction: Some(instruction.to_string()),
                ..self.clone()
            })
        }

        fn box_clone(&self) -> Box<dyn Module> {
            Box::new(self.clone())
        }

        fn enable_trace(&mut self) {
            self.tracing = true;
        }

        fn disable_trace(&mut self) {
            self.tracing = false;
        }

        fn is_tracing(&self) -> bool {
            self.tracing
        }
    }

    fn trainset(n: usize) -> Vec<Example> {
        (0..n)
            .map(|i| {
                let q = format!("word{i}");
                Example::new()
                    .with("question", q.as_str())
                    .with("answer", q.to_uppercase())
                    .with_inputs(&["question"])
            })
            .collect()
    }

    #[test]
    fn split_holds_out_a_fifth() {
        let (train, val) = split_dataset(&trainset(10), None);
        assert_eq!(train.len(), 8);
        assert_eq!(val.len(), 2);
        assert_eq!(val[0].get_str("question"), Some("word8"));

        let (train, val) = split_dataset(&trainset(3), None);
        assert_eq!((train.len(), val.len()), (2, 1));

        let (train, val) = split_dataset(&trainset(1), None);
        assert_eq!((train.len(), val.len()), (1, 1));

        let explicit = trainset(2);
        let (train, val) = split_dataset(&trainset(4), Some(&explicit));
        assert_eq!((train.len(), val.len()), (4, 2));
    }

    #[test]
    fn invalid_config_fails_fast() {
        let result = MiproV2::new(MiproConfig::new().with_num_candidates(0));
        assert!(matches!(result, Err(DspyError::Optimizer(OptimizerError::InvalidConfig { .. }))));

        let result = MiproV2::new(MiproConfig::new().with_metric("bleu"));
        assert!(matches!(result, Err(DspyError::Optimizer(OptimizerError::UnknownObjective { .. }))));
    }

    #[test]
    fn optimize_module_attaches_demos_and_instruction() {
        let mut optimizer = MiproV2::new(MiproConfig::new().with_max_iterations(2).with_num_candidates(2)).unwrap();
        let optimized = optimizer.optimize_module(&EchoModule::new(), &trainset(6));

        assert!(!optimized.demos().is_empty());
        assert!(optimized.instruction().is_some());
        assert_eq!(optimizer.optimization_history().len(), 2);
        assert_eq!(optimizer.metadata().stop_reason, Some(StopReason::MaxIterations));
        assert!(optimizer.optimization_history()[0].score > 0.99);
    }

    #[test]
    fn tracing_is_off_after_compile() {
        let mut optimizer = MiproV2::new(
            MiproConfig::new()
                .with_max_iterations(1)
                .with_num_candidates(2)
                .with_tracing(true, true),
        )
        .unwrap();
        let program = SingleModuleProgram::new(Box::new(EchoModule::new()));
        let optimized = optimizer.compile(&program, &trainset(5), None);
        assert!(!optimized.inner().is_tracing());
        assert!(!program.inner().is_tracing());
    }

    #[test]
    fn empty_trainset_returns_original() {
        let mut optimizer = MiproV2::new(MiproConfig::new()).unwrap();
        let program = SingleModuleProgram::new(Box::new(EchoModule::new()));
        let result = optimizer.compile(&program, &[], None);

        assert!(result.inner().demos().is_empty());
        assert!(optimizer.metadata().is_failed());
        assert!(optimizer.metadata().error.as_deref().unwrap_or_default().contains("empty"));
    }
}
