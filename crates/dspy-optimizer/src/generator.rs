//! Candidate generation: random exploration, mutation of good candidates and
//! acquisition-guided proposals.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::acquisition::{optimize_acquisition_function, AcquisitionFunction, AcquisitionSearch};
use crate::candidate::{Candidate, CandidateSource, Point, SearchBounds, DIMENSIONS};
use crate::gaussian::GaussianProcess;
use crate::history::HistoryEntry;

/// Mutation noise is truncated at this many standard deviations.
const MAX_SIGMAS: f64 = 3.0;

#[derive(Debug, Clone)]
pub struct CandidateGenerator {
    bounds: SearchBounds,
    rng: StdRng,
    /// Standard deviation of mutation noise as a fraction of each range.
    mutation_scale: f64,
    /// How many top history entries are mutated per guided batch.
    top_k: usize,
    search: AcquisitionSearch,
}

impl CandidateGenerator {
    pub fn new(bounds: SearchBounds, seed: u64) -> Self {
        Self {
            bounds,
            rng: StdRng::seed_from_u64(seed),
            mutation_scale: 0.1,
            top_k: 3,
            search: AcquisitionSearch::default(),
        }
    }

    pub fn with_mutation_scale(mut self, scale: f64) -> Self {
        self.mutation_scale = scale;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_search(mut self, search: AcquisitionSearch) -> Self {
        self.search = search;
        self
    }

    pub fn bounds(&self) -> &SearchBounds {
        &self.bounds
    }

    /// Uniform samples over the whole box.
    pub fn generate_random_candidates(&mut self, n: usize, iteration: usize) -> Vec<Candidate> {
        (0..n).map(|index| self.random_candidate(iteration, index)).collect()
    }

    /// Mutations of the top history entries, then one acquisition-optimized
    /// candidate, then random padding. Falls back to random generation when
    /// there is no history yet.
    pub fn generate_guided_candidates(
        &mut self,
        n: usize,
        iteration: usize,
        history: &[HistoryEntry],
        gp: &GaussianProcess,
        acquisition: &AcquisitionFunction,
    ) -> Vec<Candidate> {
        if history.is_empty() {
            return self.generate_random_candidates(n, iteration);
        }

        let mut ranked: Vec<&HistoryEntry> = history.iter().collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let mut candidates = Vec::with_capacity(n);
        for entry in ranked.iter().take(self.top_k.min(n)) {
            let index = candidates.len();
            candidates.push(self.mutate_candidate(&entry.best_candidate, iteration, index));
        }

        if candidates.len() < n {
            let best_score = ranked[0].score;
            let point = optimize_acquisition_function(acquisition, gp, &self.bounds, best_score, &self.search, &mut self.rng);
            let id = Candidate::make_id(CandidateSource::Guided, iteration, candidates.len());
            candidates.push(Candidate::from_point(id, CandidateSource::Guided, point, &self.bounds));
        }

        while candidates.len() < n {
            let index = candidates.len();
            candidates.push(self.random_candidate(iteration, index));
        }

        debug!(iteration, count = candidates.len(), "Generated guided candidates");
        candidates
    }

    /// Perturb every field of `base` by bounded Gaussian noise and re-clamp.
    pub fn mutate_candidate(&mut self, base: &Candidate, iteration: usize, index: usize) -> Candidate {
        let lower = self.bounds.lower();
        let upper = self.bounds.upper();
        let base_point = base.point();

        let mut point: Point = base_point;
        for dim in 0..DIMENSIONS - 1 {
            let range = upper[dim] - lower[dim];
            point[dim] = base_point[dim] + self.standard_normal() * self.mutation_scale * range;
        }
        let delta: i64 = self.rng.random_range(-1..=1);
        point[3] = base_point[3] + delta as f64;

        let id = Candidate::make_id(CandidateSource::Mutated, iteration, index);
        Candidate::from_point(id, CandidateSource::Mutated, point, &self.bounds)
    }

    fn random_candidate(&mut self, iteration: usize, index: usize) -> Candidate {
        let lower = self.bounds.lower();
        let upper = self.bounds.upper();
        let mut point = [0.0; DIMENSIONS];
        for dim in 0..DIMENSIONS - 1 {
            point[dim] = self.rng.random_range(lower[dim]..=upper[dim]);
        }
        let (low, high) = self.bounds.demo_count;
        point[3] = self.rng.random_range(low..=high) as f64;

        let id = Candidate::make_id(CandidateSource::Random, iteration, index);
        Candidate::from_point(id, CandidateSource::Random, point, &self.bounds)
    }

    /// Box–Muller draw truncated to `±MAX_SIGMAS`.
    fn standard_normal(&mut self) -> f64 {
        let u1: f64 = 1.0 - self.rng.random::<f64>();
        let u2: f64 = self.rng.random::<f64>();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        z.clamp(-MAX_SIGMAS, MAX_SIGMAS)
    }
}
