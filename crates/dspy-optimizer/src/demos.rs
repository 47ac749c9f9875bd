//! Demonstration selection strategies.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::str::FromStr;

use dspy_types::{Example, Module, OptimizerError};

use crate::instruction::bucket;

/// Upper bound on k-medoids refinement passes.
const MAX_MEDOID_PASSES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemoSelectionStrategy {
    /// Seeded shuffle.
    Random,
    /// Greedy farthest-point selection.
    Diverse,
    /// Medoids of a k-medoids clustering.
    Similar,
}

impl DemoSelectionStrategy {
    pub const ALL: [DemoSelectionStrategy; 3] = [Self::Random, Self::Diverse, Self::Similar];

    /// Pick a strategy by bucketing `seed` into equal slices of
    /// `strategies`. An empty slice means every strategy.
    pub fn from_seed(seed: f64, strategies: &[DemoSelectionStrategy]) -> DemoSelectionStrategy {
        let strategies = if strategies.is_empty() { &Self::ALL[..] } else { strategies };
        strategies[bucket(seed, strategies.len())]
    }
}

impl FromStr for DemoSelectionStrategy {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "diverse" => Ok(Self::Diverse),
            "similar" => Ok(Self::Similar),
            other => Err(OptimizerError::UnsupportedDemoStrategy {
                name: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for DemoSelectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Random => f.write_str("random"),
            Self::Diverse => f.write_str("diverse"),
            Self::Similar => f.write_str("similar"),
        }
    }
}

/// Select exactly `min(count, examples.len())` demonstrations for `module`.
///
/// Distances compare the module's input fields when its signature declares
/// any, and every field otherwise.
pub fn select_demonstrations(
    module: &dyn Module,
    examples: &[Example],
    count: usize,
    strategy: DemoSelectionStrategy,
    seed: u64,
) -> Vec<Example> {
    let k = count.min(examples.len());
    if k == 0 {
        return Vec::new();
    }

    let input_names = module.signature().input_names();
    let fields = if input_names.is_empty() {
        None
    } else {
        Some(input_names.as_slice())
    };

    let mut rng = StdRng::seed_from_u64(seed);
    let indices = match strategy {
        DemoSelectionStrategy::Random => {
            let mut order: Vec<usize> = (0..examples.len()).collect();
            order.shuffle(&mut rng);
            order.truncate(k);
            order
        }
        DemoSelectionStrategy::Diverse => {
            let distances = distance_matrix(examples, fields);
            farthest_points(&distances, k, rng.random_range(0..examples.len()))
        }
        DemoSelectionStrategy::Similar => {
            let distances = distance_matrix(examples, fields);
            let initial = farthest_points(&distances, k, rng.random_range(0..examples.len()));
            k_medoids(&distances, initial)
        }
    };

    indices.into_iter().map(|i| examples[i].clone()).collect()
}

/// Normalized field-overlap distance in `[0, 1]`.
///
/// Strings are compared by lower-cased token Jaccard similarity, other
/// values by equality. A field missing from exactly one side counts as a
/// full mismatch.
pub fn example_distance(a: &Example, b: &Example, fields: Option<&[&str]>) -> f64 {
    let keys: BTreeSet<&str> = match fields {
        Some(fields) => fields.iter().copied().collect(),
        None => a.keys().chain(b.keys()).collect(),
    };
    if keys.is_empty() {
        return 0.0;
    }

    let similarity: f64 = keys
        .iter()
        .map(|key| match (a.get(key), b.get(key)) {
            (Some(Value::String(x)), Some(Value::String(y))) => token_jaccard(x, y),
            (Some(x), Some(y)) => {
                if x == y {
                    1.0
                } else {
                    0.0
                }
            }
            (None, None) => 1.0,
            _ => 0.0,
        })
        .sum();

    (1.0 - similarity / keys.len() as f64).clamp(0.0, 1.0)
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn token_jaccard(a: &str, b: &str) -> f64 {
    let left = tokens(a);
    let right = tokens(b);
    if left.is_empty() && right.is_empty() {
        return 1.0;
    }
    let intersection = left.intersection(&right).count() as f64;
    let union = left.union(&right).count() as f64;
    intersection / union
}

fn distance_matrix(examples: &[Example], fields: Option<&[&str]>) -> Vec<Vec<f64>> {
    let n = examples.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = example_distance(&examples[i], &examples[j], fields);
            matrix[i][j] = d;
            matrix[j][i] = d;
        }
    }
    matrix
}

/// Greedy max-min selection starting from `first`. Ties go to the lowest
/// index.
fn farthest_points(distances: &[Vec<f64>], k: usize, first: usize) -> Vec<usize> {
    let n = distances.len();
    let mut selected = vec![first];
    let mut chosen = vec![false; n];
    chosen[first] = true;
    let mut min_dist: Vec<f64> = distances[first].clone();

    while selected.len() < k {
        let mut best: Option<(usize, f64)> = None;
        for i in (0..n).filter(|&i| !chosen[i]) {
            if best.map_or(true, |(_, d)| min_dist[i] > d) {
                best = Some((i, min_dist[i]));
            }
        }
        let Some((next, _)) = best else { break };
        chosen[next] = true;
        selected.push(next);
        for i in 0..n {
            min_dist[i] = min_dist[i].min(distances[next][i]);
        }
    }

    selected
}

/// Refine `medoids` with alternating assignment/update passes. Returns one
/// medoid per cluster, largest cluster first.
fn k_medoids(distances: &[Vec<f64>], mut medoids: Vec<usize>) -> Vec<usize> {
    let n = distances.len();
    let mut assignment = vec![0usize; n];

    for _ in 0..MAX_MEDOID_PASSES {
        assign(distances, &medoids, &mut assignment);

        let mut changed = false;
        for (cluster, medoid) in medoids.iter_mut().enumerate() {
            let members: Vec<usize> = (0..n).filter(|&i| assignment[i] == cluster).collect();
            let cost = |candidate: usize| -> f64 { members.iter().map(|&m| distances[candidate][m]).sum() };

            let mut best = *medoid;
            let mut best_cost = cost(best);
            for &member in &members {
                let c = cost(member);
                if c < best_cost {
                    best = member;
                    best_cost = c;
                }
            }
            if best != *medoid {
                *medoid = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    assign(distances, &medoids, &mut assignment);
    let mut sized: Vec<(usize, usize)> = medoids
        .iter()
        .enumerate()
        .map(|(cluster, &medoid)| (medoid, assignment.iter().filter(|&&a| a == cluster).count()))
        .collect();
    sized.sort_by(|a, b| b.1.cmp(&a.1));
    sized.into_iter().map(|(medoid, _)| medoid).collect()
}

/// Nearest-medoid assignment. A medoid always belongs to its own cluster.
fn assign(distances: &[Vec<f64>], medoids: &[usize], assignment: &mut [usize]) {
    for (i, slot) in assignment.iter_mut().enumerate() {
        if let Some(own) = medoids.iter().position(|&m| m == i) {
            *slot = own;
            continue;
        }
        let mut best = 0;
        for (cluster, &medoid) in medoids.iter().enumerate() {
            if distances[i][medoid] < distances[i][medoids[best]] {
                best = cluster;
            }
        }
        *slot = best;
    }
}
