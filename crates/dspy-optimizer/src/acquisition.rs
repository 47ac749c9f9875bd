//! Acquisition functions and their bounded maximization.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use dspy_types::OptimizerError;

use crate::candidate::{Point, SearchBounds, DIMENSIONS};
use crate::gaussian::{GaussianProcess, Posterior};

/// Posterior standard deviations below this are treated as zero.
const MIN_STD: f64 = 1e-9;

/// Which acquisition rule guides candidate generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionKind {
    #[default]
    #[serde(alias = "ei")]
    ExpectedImprovement,
    #[serde(alias = "ucb")]
    UpperConfidenceBound,
}

impl FromStr for AcquisitionKind {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "expected_improvement" | "ei" => Ok(Self::ExpectedImprovement),
            "upper_confidence_bound" | "ucb" => Ok(Self::UpperConfidenceBound),
            other => Err(OptimizerError::UnsupportedAcquisition {
                name: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for AcquisitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExpectedImprovement => f.write_str("expected_improvement"),
            Self::UpperConfidenceBound => f.write_str("upper_confidence_bound"),
        }
    }
}

/// A configured acquisition rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionFunction {
    pub kind: AcquisitionKind,
    /// Exploration coefficient for UCB.
    pub kappa: f64,
}

impl AcquisitionFunction {
    pub const DEFAULT_KAPPA: f64 = 2.0;

    pub fn new(kind: AcquisitionKind, kappa: f64) -> Self {
        Self { kind, kappa }
    }

    pub fn expected_improvement() -> Self {
        Self::new(AcquisitionKind::ExpectedImprovement, Self::DEFAULT_KAPPA)
    }

    pub fn upper_confidence_bound(kappa: f64) -> Self {
        Self::new(AcquisitionKind::UpperConfidenceBound, kappa)
    }

    /// Score a posterior against the best score seen so far.
    pub fn score(&self, posterior: Posterior, best_score: f64) -> f64 {
        match self.kind {
            AcquisitionKind::ExpectedImprovement => expected_improvement(posterior, best_score),
            AcquisitionKind::UpperConfidenceBound => upper_confidence_bound(posterior, self.kappa),
        }
    }

    /// Score a raw search-space point.
    pub fn evaluate(&self, gp: &GaussianProcess, bounds: &SearchBounds, point: &Point, best_score: f64) -> f64 {
        let posterior = gp.predict(&bounds.features(point));
        self.score(posterior, best_score)
    }
}

impl Default for AcquisitionFunction {
    fn default() -> Self {
        Self::expected_improvement()
    }
}

/// Expected improvement over `best_score` for a maximization problem.
pub fn expected_improvement(posterior: Posterior, best_score: f64) -> f64 {
    if !(posterior.std > MIN_STD) {
        return 0.0;
    }
    let improvement = posterior.mean - best_score;
    let z = improvement / posterior.std;
    let ei = improvement * normal_cdf(z) + posterior.std * normal_pdf(z);
    if ei.is_finite() {
        ei.max(0.0)
    } else {
        0.0
    }
}

pub fn upper_confidence_bound(posterior: Posterior, kappa: f64) -> f64 {
    posterior.mean + kappa * posterior.std
}

pub fn normal_pdf(z: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * z * z).exp()
}

/// Standard normal CDF via the Abramowitz–Stegun erf approximation.
pub fn normal_cdf(z: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = if z < 0.0 { -1.0 } else { 1.0 };
    let x = z.abs() / std::f64::consts::SQRT_2;
    let t = 1.0 / (1.0 + P * x);
    let erf = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();

    0.5 * (1.0 + sign * erf)
}

/// Search effort for [`optimize_acquisition_function`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionSearch {
    /// Uniform random starting points.
    pub samples: usize,
    /// How many of the best samples get refined.
    pub refine_starts: usize,
    /// Coordinate-search rounds per refined start.
    pub refine_rounds: usize,
}

impl Default for AcquisitionSearch {
    fn default() -> Self {
        Self {
            samples: 128,
            refine_starts: 3,
            refine_rounds: 20,
        }
    }
}

/// Maximize `acquisition` over the search box with seeded multi-start
/// sampling followed by coordinate refinement. The returned point always
/// lies within `bounds`; ties keep the earliest sample.
pub fn optimize_acquisition_function<R: Rng + ?Sized>(
    acquisition: &AcquisitionFunction,
    gp: &GaussianProcess,
    bounds: &SearchBounds,
    best_score: f64,
    search: &AcquisitionSearch,
    rng: &mut R,
) -> Point {
    let lower = bounds.lower();
    let upper = bounds.upper();

    let mut scored: Vec<(Point, f64)> = (0..search.samples.max(1))
        .map(|_| {
            let mut point = [0.0; DIMENSIONS];
            for i in 0..DIMENSIONS {
                point[i] = sample_between(rng, lower[i], upper[i]);
            }
            let value = acquisition.evaluate(gp, bounds, &point, best_score);
            (point, value)
        })
        .collect();

    // Stable sort keeps sample order among equal values.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let (mut best_point, mut best_value) = scored[0];
    for &(start, start_value) in scored.iter().take(search.refine_starts) {
        let (point, value) = refine(acquisition, gp, bounds, best_score, start, start_value, search.refine_rounds);
        if value > best_value {
            best_point = point;
            best_value = value;
        }
    }

    bounds.clamp(best_point)
}

fn sample_between<R: Rng + ?Sized>(rng: &mut R, low: f64, high: f64) -> f64 {
    if high > low {
        rng.random_range(low..=high)
    } else {
        low
    }
}

fn refine(
    acquisition: &AcquisitionFunction,
    gp: &GaussianProcess,
    bounds: &SearchBounds,
    best_score: f64,
    start: Point,
    start_value: f64,
    rounds: usize,
) -> (Point, f64) {
    let lower = bounds.lower();
    let upper = bounds.upper();
    let mut step: Point = [0.0; DIMENSIONS];
    for i in 0..DIMENSIONS {
        step[i] = 0.1 * (upper[i] - lower[i]);
    }

    let mut point = start;
    let mut value = start_value;
    for _ in 0..rounds {
        let mut improved = false;
        for dim in 0..DIMENSIONS {
            for direction in [-1.0, 1.0] {
                let mut trial = point;
                trial[dim] += direction * step[dim];
                let trial = bounds.clamp(trial);
                let trial_value = acquisition.evaluate(gp, bounds, &trial, best_score);
                if trial_value > value {
                    point = trial;
                    value = trial_value;
                    improved = true;
                }
            }
        }
        if !improved {
            for s in step.iter_mut() {
                *s *= 0.5;
            }
        }
    }

    (point, value)
}
