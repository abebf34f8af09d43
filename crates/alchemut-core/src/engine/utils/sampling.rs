use rand::{distributions::WeightedIndex, prelude::*};
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error, PartialEq)]
pub enum SamplingError {
    #[error("A discretized distribution needs at least one bin")]
    NoBins,
    #[error("Invalid range [{lower}, {upper}] for a discretized distribution")]
    InvalidRange { lower: f64, upper: f64 },
    #[error("All bins have zero or non-finite weight, resulting in zero total weight for sampling")]
    ZeroTotalWeight,
    #[error("Failed to create weighted distribution: {0}")]
    DistributionError(String),
}

/// A one-dimensional distribution discretized into equal-width bins.
///
/// Built from per-bin reduced energies `u_i` (weights `exp(-u_i)`); values are
/// represented by their bin centre.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedDistribution {
    lower: f64,
    width: f64,
    probabilities: Vec<f64>,
}

impl BinnedDistribution {
    /// Centres of `bins` equal-width bins spanning `[lower, upper)`.
    pub fn bin_centers(lower: f64, upper: f64, bins: usize) -> Result<Vec<f64>, SamplingError> {
        if bins == 0 {
            return Err(SamplingError::NoBins);
        }
        if upper <= lower || !lower.is_finite() || !upper.is_finite() {
            return Err(SamplingError::InvalidRange { lower, upper });
        }
        let width = (upper - lower) / bins as f64;
        Ok((0..bins).map(|i| lower + (i as f64 + 0.5) * width).collect())
    }

    /// Builds the distribution over `[lower, upper)` from one reduced energy per bin.
    #[instrument(level = "trace", skip_all, fields(bins = reduced_energies.len()))]
    pub fn from_reduced_energies(
        lower: f64,
        upper: f64,
        reduced_energies: &[f64],
    ) -> Result<Self, SamplingError> {
        let bins = reduced_energies.len();
        Self::bin_centers(lower, upper, bins)?;

        let min_energy = reduced_energies
            .iter()
            .copied()
            .filter(|u| u.is_finite())
            .fold(f64::INFINITY, f64::min);
        if !min_energy.is_finite() {
            return Err(SamplingError::ZeroTotalWeight);
        }

        let weights: Vec<f64> = reduced_energies
            .iter()
            .map(|&u| if u.is_finite() { (-(u - min_energy)).exp() } else { 0.0 })
            .collect();
        let total: f64 = weights.iter().sum();
        if total <= f64::EPSILON {
            return Err(SamplingError::ZeroTotalWeight);
        }

        Ok(Self {
            lower,
            width: (upper - lower) / bins as f64,
            probabilities: weights.into_iter().map(|w| w / total).collect(),
        })
    }

    pub fn bins(&self) -> usize {
        self.probabilities.len()
    }

    pub fn center(&self, bin: usize) -> f64 {
        self.lower + (bin as f64 + 0.5) * self.width
    }

    /// Natural log of the probability of `bin`; `-inf` for an empty bin.
    pub fn log_probability(&self, bin: usize) -> f64 {
        self.probabilities.get(bin).map_or(f64::NEG_INFINITY, |p| p.ln())
    }

    /// The bin containing `value`; values outside the range fall into the nearest edge bin.
    pub fn bin_of(&self, value: f64) -> usize {
        let raw = ((value - self.lower) / self.width).floor();
        if raw <= 0.0 {
            0
        } else {
            (raw as usize).min(self.bins() - 1)
        }
    }

    /// Draws a bin index.
    pub fn sample(&self, rng: &mut impl Rng) -> Result<usize, SamplingError> {
        let dist = WeightedIndex::new(&self.probabilities)
            .map_err(|e| SamplingError::DistributionError(e.to_string()))?;
        Ok(dist.sample(rng))
    }
}
