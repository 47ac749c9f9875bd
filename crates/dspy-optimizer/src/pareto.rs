//! Pareto dominance and frontier computation over multi-objective scores.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::candidate::Candidate;
use crate::history::EvaluatedCandidate;

/// A non-dominated candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParetoEntry {
    pub candidate: Candidate,
    pub scores: BTreeMap<String, f64>,
}

impl From<&EvaluatedCandidate> for ParetoEntry {
    fn from(evaluated: &EvaluatedCandidate) -> Self {
        Self {
            candidate: evaluated.candidate.clone(),
            scores: evaluated.scores.clone(),
        }
    }
}

fn value(scores: &BTreeMap<String, f64>, objective: &str) -> f64 {
    match scores.get(objective) {
        Some(v) if !v.is_nan() => *v,
        _ => f64::NEG_INFINITY,
    }
}

/// `a` dominates `b` when it is at least as good on every objective and
/// strictly better on one. Missing scores count as negative infinity.
pub fn dominates(a: &BTreeMap<String, f64>, b: &BTreeMap<String, f64>, objectives: &[String]) -> bool {
    let mut strictly_better = false;
    for objective in objectives {
        let (va, vb) = (value(a, objective), value(b, objective));
        if va < vb {
            return false;
        }
        if va > vb {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Entries of `evaluated` not dominated by any other entry, in input order.
pub fn compute_pareto_frontier(evaluated: &[EvaluatedCandidate], objectives: &[String]) -> Vec<ParetoEntry> {
    evaluated
        .iter()
        .enumerate()
        .filter(|(i, candidate)| {
            !evaluated
                .iter()
                .enumerate()
                .any(|(j, other)| *i != j && dominates(&other.scores, &candidate.scores, objectives))
        })
        .map(|(_, candidate)| ParetoEntry::from(candidate))
        .collect()
}
