//! Run bookkeeping: evaluated candidates, per-iteration history and the
//! lifecycle metadata of a compile run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use dspy_types::Trace;

use crate::candidate::Candidate;

/// Unique compile run identifier.
pub type RunId = Uuid;

/// A candidate together with the scores it earned on the validation set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedCandidate {
    pub candidate: Candidate,
    pub scores: BTreeMap<String, f64>,
    pub traces: Vec<Trace>,
    pub timestamp: DateTime<Utc>,
}

impl EvaluatedCandidate {
    pub fn new(candidate: Candidate, scores: BTreeMap<String, f64>, traces: Vec<Trace>) -> Self {
        Self {
            candidate,
            scores,
            traces,
            timestamp: Utc::now(),
        }
    }
}

/// Best result of one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub iteration: usize,
    pub best_candidate: Candidate,
    pub scores: BTreeMap<String, f64>,
    /// Scalarized value of `scores`.
    pub score: f64,
    pub timestamp: DateTime<Utc>,
}

/// Population variance of the last `window` history scores, or `None` while
/// fewer than `window` entries exist.
pub fn trailing_variance(history: &[HistoryEntry], window: usize) -> Option<f64> {
    if window == 0 || history.len() < window {
        return None;
    }
    let recent = &history[history.len() - window..];
    let mean = recent.iter().map(|h| h.score).sum::<f64>() / window as f64;
    let variance = recent.iter().map(|h| (h.score - mean).powi(2)).sum::<f64>() / window as f64;
    Some(variance)
}

/// Lifecycle state of a compile run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Init,
    Iterating,
    Finalizing,
    Done,
    Failed,
}

/// Why the iteration loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    MaxIterations,
    TargetScore,
    Converged,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MaxIterations => f.write_str("max_iterations"),
            Self::TargetScore => f.write_str("target_score"),
            Self::Converged => f.write_str("converged"),
        }
    }
}

/// Aggregate status of the most recent compile run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: RunId,
    pub state: RunState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub iterations_run: usize,
    pub candidates_evaluated: usize,
    pub candidates_failed: usize,
    pub stop_reason: Option<StopReason>,
    pub error: Option<String>,
}

impl RunMetadata {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: RunState::Init,
            started_at: None,
            finished_at: None,
            iterations_run: 0,
            candidates_evaluated: 0,
            candidates_failed: 0,
            stop_reason: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = RunState::Iterating;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_finalizing(&mut self, reason: Option<StopReason>) {
        self.state = RunState::Finalizing;
        self.stop_reason = reason;
    }

    pub fn mark_completed(&mut self) {
        self.state = RunState::Done;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = RunState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    pub fn is_failed(&self) -> bool {
        self.state == RunState::Failed
    }
}

impl Default for RunMetadata {
    fn default() -> Self {
        Self::new()
    }
}
