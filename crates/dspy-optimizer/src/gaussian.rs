//! Gaussian Process surrogate over the four-dimensional candidate features.
//!
//! The posterior is rebuilt from every stored observation on each
//! [`GaussianProcess::update`] call. Numerical failures never surface as
//! errors: the model marks itself untrained and predicts the fixed prior.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::candidate::{Point, DIMENSIONS};

/// Posterior mean and standard deviation at a point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Posterior {
    pub mean: f64,
    pub std: f64,
}

impl Posterior {
    /// Returned whenever the model has nothing to say.
    pub const PRIOR: Posterior = Posterior { mean: 0.0, std: 1.0 };
}

/// A single `(features, score)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub features: Point,
    pub score: f64,
}

#[derive(Debug, Clone)]
struct FittedState {
    points: Vec<Point>,
    /// Lower-triangular Cholesky factor of `K + noise * I`.
    l: Vec<Vec<f64>>,
    /// `K^-1 (y - y_mean)`
    alpha: Vec<f64>,
    y_mean: f64,
}

#[derive(Debug, Clone)]
pub struct GaussianProcess {
    observations: Vec<Observation>,
    length_scale: f64,
    signal_variance: f64,
    noise_variance: f64,
    fitted: Option<FittedState>,
}

impl GaussianProcess {
    pub fn new(length_scale: f64, signal_variance: f64, noise_variance: f64) -> Self {
        Self {
            observations: Vec::new(),
            length_scale,
            signal_variance,
            noise_variance,
            fitted: None,
        }
    }

    /// Append an observation. Does not retrain.
    pub fn add_observation(&mut self, features: Point, score: f64) {
        self.observations.push(Observation { features, score });
    }

    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }

    /// Drop every observation and the fitted posterior.
    pub fn reset(&mut self) {
        self.observations.clear();
        self.fitted = None;
    }

    /// Recompute the posterior from all observations.
    pub fn update(&mut self) {
        self.fitted = None;

        if self.observations.is_empty() {
            return;
        }

        let valid = self.observations.iter().all(|o| {
            o.score.is_finite() && o.features.iter().all(|f| f.is_finite())
        });
        if !valid {
            warn!("Gaussian process received non-finite observations; falling back to prior");
            return;
        }

        let n = self.observations.len();
        let y_mean = self.observations.iter().map(|o| o.score).sum::<f64>() / n as f64;

        let mut k_matrix = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..=i {
                let k = self.kernel(&self.observations[i].features, &self.observations[j].features);
                k_matrix[i][j] = k;
                k_matrix[j][i] = k;
            }
            k_matrix[i][i] += self.noise_variance;
        }

        let Some(l) = cholesky(&k_matrix) else {
            warn!(
                observations = n,
                "Kernel matrix is not positive definite; Gaussian process left untrained"
            );
            return;
        };

        let centred: Vec<f64> = self.observations.iter().map(|o| o.score - y_mean).collect();
        let z = forward_substitute(&l, &centred);
        let alpha = backward_substitute(&l, &z);

        if alpha.iter().any(|a| !a.is_finite()) {
            warn!("Gaussian process solve produced non-finite weights; left untrained");
            return;
        }

        debug!(observations = n, y_mean, "Gaussian process updated");
        self.fitted = Some(FittedState {
            points: self.observations.iter().map(|o| o.features).collect(),
            l,
            alpha,
            y_mean,
        });
    }

    /// Posterior at `point`, or [`Posterior::PRIOR`] when there are no
    /// observations or the model is untrained.
    pub fn predict(&self, point: &Point) -> Posterior {
        if self.observations.is_empty() {
            return Posterior::PRIOR;
        }
        let Some(fitted) = &self.fitted else {
            return Posterior::PRIOR;
        };

        let k_star: Vec<f64> = fitted.points.iter().map(|p| self.kernel(p, point)).collect();

        let mean = fitted.y_mean
            + k_star
                .iter()
                .zip(fitted.alpha.iter())
                .map(|(k, a)| k * a)
                .sum::<f64>();

        let v = forward_substitute(&fitted.l, &k_star);
        let variance = self.kernel(point, point) - v.iter().map(|vi| vi * vi).sum::<f64>();
        let std = variance.max(0.0).sqrt();

        if mean.is_finite() && std.is_finite() {
            Posterior { mean, std }
        } else {
            Posterior::PRIOR
        }
    }

    /// Squared-exponential kernel.
    fn kernel(&self, a: &Point, b: &Point) -> f64 {
        let sq_dist: f64 = (0..DIMENSIONS).map(|i| (a[i] - b[i]).powi(2)).sum();
        self.signal_variance * (-sq_dist / (2.0 * self.length_scale.powi(2))).exp()
    }
}

impl Default for GaussianProcess {
    fn default() -> Self {
        Self::new(0.5, 1.0, 1e-4)
    }
}

/// Lower-triangular Cholesky factor, or `None` if `matrix` is not positive
/// definite.
fn cholesky(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = matrix.len();
    let mut l = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let diag = matrix[i][i] - sum;
                if !(diag > 0.0) || !diag.is_finite() {
                    return None;
                }
                l[i][j] = diag.sqrt();
            } else {
                l[i][j] = (matrix[i][j] - sum) / l[j][j];
            }
        }
    }

    Some(l)
}

/// Solve `L x = b`.
fn forward_substitute(l: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut x = vec![0.0; n];
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[i][j] * x[j]).sum();
        x[i] = (b[i] - sum) / l[i][i];
    }
    x
}

/// Solve `L^T x = b`.
fn backward_substitute(l: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[j][i] * x[j]).sum();
        x[i] = (b[i] - sum) / l[i][i];
    }
    x
}
