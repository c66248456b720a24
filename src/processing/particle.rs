//! Sampling-based position estimator
//!
//! Particles are propagated with the dead-reckoning displacement plus
//! Gaussian process noise and reweighted by each fix's likelihood.
//! Systematic resampling runs once the effective sample size drops below
//! half the particle count.

use nalgebra::{Matrix2, Vector2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, StandardNormal};
use tracing::{trace, warn};

use crate::processing::estimator::{EstimatorState, Observation, PositionEstimator};
use crate::utils::config::EstimatorKind;
use crate::validation::error::{FusionError, FusionResult};

/// Fraction of the particle count below which resampling is triggered
const RESAMPLE_THRESHOLD: f64 = 0.5;

/// Gaussian log-likelihood of a residual, without the normalizing constant
fn log_likelihood(residual: &Vector2<f64>, information: &Matrix2<f64>) -> f64 {
    if residual.iter().any(|v| !v.is_finite()) {
        return f64::NEG_INFINITY;
    }
    -0.5 * (residual.transpose() * information * residual)[(0, 0)]
}

/// Systematic resampling: one uniform offset, N evenly spaced pointers
fn systematic_resample<R: Rng>(weights: &[f64], rng: &mut R) -> Vec<usize> {
    let n = weights.len();
    let step = 1.0 / n as f64;
    let start: f64 = rng.random::<f64>() * step;

    let mut indices = Vec::with_capacity(n);
    let mut cumulative = weights.first().copied().unwrap_or(0.0);
    let mut i = 0;
    for k in 0..n {
        let pointer = start + k as f64 * step;
        while pointer > cumulative && i + 1 < n {
            i += 1;
            cumulative += weights[i];
        }
        indices.push(i);
    }
    indices
}

pub struct ParticleEstimator {
    particles: Vec<Vector2<f64>>,
    weights: Vec<f64>,
    process_noise: Option<Normal<f64>>,
    rng: StdRng,
}

impl ParticleEstimator {
    pub fn new(
        position: &Vector2<f64>,
        covariance: &Matrix2<f64>,
        process_variance: f64,
        count: usize,
        seed: Option<u64>,
    ) -> Self {
        let count = count.max(1);
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let process_noise = Normal::new(0.0, process_variance.max(0.0).sqrt()).ok();

        let mut estimator = Self {
            particles: vec![*position; count],
            weights: vec![1.0 / count as f64; count],
            process_noise,
            rng,
        };
        estimator.reset(position, covariance);
        estimator
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn effective_sample_size(&self) -> f64 {
        let sum_sq: f64 = self.weights.iter().map(|w| w * w).sum();
        if sum_sq > 0.0 {
            1.0 / sum_sq
        } else {
            0.0
        }
    }

    fn reweight(&mut self, observations: &[&Observation]) -> FusionResult<()> {
        let mut informations = Vec::with_capacity(observations.len());
        for obs in observations {
            let information = obs.covariance.try_inverse().ok_or_else(|| {
                FusionError::SingularMatrix { context: "particle likelihood".to_string() }
            })?;
            informations.push(information);
        }

        let log_weights: Vec<f64> = self
            .particles
            .iter()
            .zip(&self.weights)
            .map(|(particle, weight)| {
                let likelihood: f64 = observations
                    .iter()
                    .zip(&informations)
                    .map(|(obs, info)| log_likelihood(&(obs.position - particle), info))
                    .sum();
                weight.ln() + likelihood
            })
            .collect();

        let max_log = log_weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max_log.is_finite() {
            warn!("All particle weights vanished, keeping prior");
            return Err(FusionError::NonFiniteState { context: "particle update".to_string() });
        }

        let new_weights: Vec<f64> = log_weights.iter().map(|lw| (lw - max_log).exp()).collect();
        let sum: f64 = new_weights.iter().sum();
        if !(sum.is_finite() && sum > 0.0) {
            warn!("Particle weight normalization failed, keeping prior");
            return Err(FusionError::NonFiniteState { context: "particle update".to_string() });
        }

        self.weights = new_weights.into_iter().map(|w| w / sum).collect();
        self.maybe_resample();
        Ok(())
    }

    fn maybe_resample(&mut self) {
        let n = self.particles.len();
        let n_eff = self.effective_sample_size();
        if n_eff >= RESAMPLE_THRESHOLD * n as f64 {
            return;
        }

        trace!(n_eff, "Resampling particles");
        let indices = systematic_resample(&self.weights, &mut self.rng);
        self.particles = indices.into_iter().map(|i| self.particles[i]).collect();
        self.weights = vec![1.0 / n as f64; n];
    }
}

impl PositionEstimator for ParticleEstimator {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Particle
    }

    fn predict(&mut self, displacement: &Vector2<f64>) {
        if displacement.iter().any(|v| !v.is_finite()) {
            warn!(dx = displacement.x, dy = displacement.y, "Non-finite displacement, skipping prediction");
            return;
        }
        for particle in &mut self.particles {
            *particle += displacement;
            if let Some(noise) = &self.process_noise {
                particle.x += noise.sample(&mut self.rng);
                particle.y += noise.sample(&mut self.rng);
            }
        }
    }

    fn update(&mut self, observation: &Observation) -> FusionResult<()> {
        self.reweight(&[observation])
    }

    fn update_joint(&mut self, first: &Observation, second: &Observation) -> FusionResult<()> {
        self.reweight(&[first, second])
    }

    fn state(&self) -> EstimatorState {
        let mean = self
            .particles
            .iter()
            .zip(&self.weights)
            .fold(Vector2::zeros(), |acc, (p, w)| acc + p * *w);

        let covariance = self
            .particles
            .iter()
            .zip(&self.weights)
            .fold(Matrix2::zeros(), |acc, (p, w)| {
                let d = p - mean;
                acc + d * d.transpose() * *w
            });

        EstimatorState { position: mean, covariance }
    }

    fn reset(&mut self, position: &Vector2<f64>, covariance: &Matrix2<f64>) {
        // Fall back to independent axes when the covariance is not positive definite
        let factor = match covariance.cholesky() {
            Some(chol) => chol.l(),
            None => Matrix2::from_diagonal(&Vector2::new(
                covariance[(0, 0)].max(0.0).sqrt(),
                covariance[(1, 1)].max(0.0).sqrt(),
            )),
        };

        let n = self.particles.len();
        for particle in &mut self.particles {
            let z = Vector2::new(
                self.rng.sample::<f64, _>(StandardNormal),
                self.rng.sample::<f64, _>(StandardNormal),
            );
            *particle = position + factor * z;
        }
        self.weights = vec![1.0 / n as f64; n];
    }
}
