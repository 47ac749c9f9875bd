//! Search space bounds and candidate configuration points.

use serde::{Deserialize, Serialize};

/// Dimensionality of the search space.
pub const DIMENSIONS: usize = 4;

/// A point in the raw (un-normalized) search box, ordered as
/// `[instruction_seed, demo_seed, temperature, demo_count]`.
pub type Point = [f64; DIMENSIONS];

/// Where a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Random,
    Guided,
    Mutated,
}

impl CandidateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Guided => "guided",
            Self::Mutated => "mutated",
        }
    }
}

impl std::fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The bounded box candidates live in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchBounds {
    pub instruction_seed: (f64, f64),
    pub demo_seed: (f64, f64),
    pub temperature: (f64, f64),
    pub demo_count: (usize, usize),
}

impl SearchBounds {
    pub const SEED_RANGE: (f64, f64) = (0.0, 1.0);
    pub const TEMPERATURE_RANGE: (f64, f64) = (0.1, 0.9);

    pub fn new(max_demos: usize) -> Self {
        Self {
            instruction_seed: Self::SEED_RANGE,
            demo_seed: Self::SEED_RANGE,
            temperature: Self::TEMPERATURE_RANGE,
            demo_count: (1, max_demos.max(1)),
        }
    }

    pub fn max_demos(&self) -> usize {
        self.demo_count.1
    }

    pub fn lower(&self) -> Point {
        [
            self.instruction_seed.0,
            self.demo_seed.0,
            self.temperature.0,
            self.demo_count.0 as f64,
        ]
    }

    pub fn upper(&self) -> Point {
        [
            self.instruction_seed.1,
            self.demo_seed.1,
            self.temperature.1,
            self.demo_count.1 as f64,
        ]
    }

    /// Clamp every coordinate into the box. Non-finite coordinates snap to
    /// the lower bound.
    pub fn clamp(&self, point: Point) -> Point {
        let lower = self.lower();
        let upper = self.upper();
        let mut clamped = point;
        for i in 0..DIMENSIONS {
            clamped[i] = clamp_finite(point[i], lower[i], upper[i]);
        }
        clamped
    }

    pub fn contains(&self, point: &Point) -> bool {
        let lower = self.lower();
        let upper = self.upper();
        (0..DIMENSIONS).all(|i| point[i] >= lower[i] && point[i] <= upper[i])
    }

    /// Map a raw point onto the surrogate's feature space: the seeds and the
    /// temperature are kept as-is, the demo count is rescaled to [0, 1].
    pub fn features(&self, point: &Point) -> Point {
        let (low, high) = self.demo_count;
        let demo = if high > low {
            (point[3] - low as f64) / (high - low) as f64
        } else {
            0.0
        };
        [point[0], point[1], point[2], demo.clamp(0.0, 1.0)]
    }
}

impl Default for SearchBounds {
    fn default() -> Self {
        Self::new(4)
    }
}

pub(crate) fn clamp_finite(value: f64, low: f64, high: f64) -> f64 {
    if value.is_finite() {
        value.clamp(low, high)
    } else {
        low
    }
}

/// One configuration point. Fields are fixed at construction and always lie
/// within the bounds they were built against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    id: String,
    source: CandidateSource,
    instruction_seed: f64,
    demo_seed: f64,
    temperature: f64,
    demo_count: usize,
}

impl Candidate {
    /// Build a candidate from a raw point, clamping it into `bounds` and
    /// rounding the demo count to the nearest integer.
    pub fn from_point(id: impl Into<String>, source: CandidateSource, point: Point, bounds: &SearchBounds) -> Self {
        let p = bounds.clamp(point);
        let demo_count = (p[3].round() as usize).clamp(bounds.demo_count.0, bounds.demo_count.1);
        Self {
            id: id.into(),
            source,
            instruction_seed: p[0],
            demo_seed: p[1],
            temperature: p[2],
            demo_count,
        }
    }

    /// Identifier tagged with provenance, unique within one generation batch.
    pub fn make_id(source: CandidateSource, iteration: usize, index: usize) -> String {
        format!("{source}_{iteration}_{index}")
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> CandidateSource {
        self.source
    }

    pub fn instruction_seed(&self) -> f64 {
        self.instruction_seed
    }

    pub fn demo_seed(&self) -> f64 {
        self.demo_seed
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn demo_count(&self) -> usize {
        self.demo_count
    }

    pub fn point(&self) -> Point {
        [
            self.instruction_seed,
            self.demo_seed,
            self.temperature,
            self.demo_count as f64,
        ]
    }

    /// Feature vector fed to the surrogate model.
    pub fn features(&self, bounds: &SearchBounds) -> Point {
        bounds.features(&self.point())
    }

    pub fn is_within(&self, bounds: &SearchBounds) -> bool {
        bounds.contains(&self.point())
    }
}
