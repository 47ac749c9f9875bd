//! # dspy-optimizer
//!
//! MIPROv2 prompt optimization for DSPy programs.
//!
//! Provides the candidate search space, a Gaussian Process surrogate with
//! expected-improvement and UCB acquisition, candidate generation, the
//! instruction and demonstration materializer, multi-objective evaluation,
//! Pareto tracking and the compile loop that ties them together.

mod acquisition;
mod candidate;
mod config;
mod demos;
mod evaluator;
mod gaussian;
mod generator;
mod history;
mod instruction;
mod materialize;
mod mipro;
mod objective;
mod pareto;

pub use acquisition::{
    expected_improvement, normal_cdf, normal_pdf, optimize_acquisition_function, upper_confidence_bound,
    AcquisitionFunction, AcquisitionKind, AcquisitionSearch,
};
pub use candidate::{Candidate, CandidateSource, Point, SearchBounds, DIMENSIONS};
pub use config::MiproConfig;
pub use demos::{example_distance, select_demonstrations, DemoSelectionStrategy};
pub use evaluator::{Evaluation, Evaluator, MultiObjectiveEvaluator};
pub use gaussian::{GaussianProcess, Observation, Posterior};
pub use generator::CandidateGenerator;
pub use history::{trailing_variance, EvaluatedCandidate, HistoryEntry, RunId, RunMetadata, RunState, StopReason};
pub use instruction::{generate_instruction, InstructionStyle};
pub use materialize::{seed_to_u64, MaterializedModule, Materializer};
pub use mipro::{split_dataset, MiproV2};
pub use objective::{Confidence, ExactMatch, FnObjective, Objective, ObjectiveRegistry, Scalarization, TokenF1};
pub use pareto::{compute_pareto_frontier, dominates, ParetoEntry};
