//! Sampling helpers shared by the presence model, the scheduler and the end-use models.
//!
//! Every function that draws random numbers takes the generator explicitly so that a
//! single seed reproduces a whole house simulation.

use crate::errors::ConfigurationError;
use rand::Rng;
use rand_distr::{Binomial, ChiSquared, Distribution as _, Gamma, LogNormal, Normal, Poisson};
use serde::Deserialize;
use statrs::distribution::{ContinuousCDF, Normal as StatrsNormal};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum ProbabilityError {
    #[error("Cannot normalize a probability vector summing to {0}")]
    NonPositiveSum(f64),
    #[error("No label with a positive weight to choose from")]
    NoPositiveWeights,
}

/// Divide every element by the sum of all elements.
pub fn normalize(pdf: &[f64]) -> Result<Vec<f64>, ProbabilityError> {
    let mut pdf = pdf.to_vec();
    normalize_in_place(&mut pdf)?;
    Ok(pdf)
}

pub fn normalize_in_place(pdf: &mut [f64]) -> Result<(), ProbabilityError> {
    let total = pdf.iter().sum::<f64>();
    if !(total.is_finite() && total > 0.) {
        return Err(ProbabilityError::NonPositiveSum(total));
    }
    pdf.iter_mut().for_each(|p| *p /= total);

    Ok(())
}

pub fn cumulative_distribution(pdf: &[f64]) -> Vec<f64> {
    pdf.iter()
        .scan(0., |cumulative, p| {
            *cumulative += p;
            Some(*cumulative)
        })
        .collect()
}

/// Index of the first element of a cumulative distribution that exceeds `u`.
///
/// Steps with zero probability never exceed the cumulative value of the step before them,
/// so they can not be selected. If rounding leaves the final cumulative value below `u`
/// the last step with positive probability is returned.
pub fn inverse_cdf_index(cdf: &[f64], u: f64) -> usize {
    let index = cdf.partition_point(|&cumulative| cumulative <= u);
    if index < cdf.len() {
        return index;
    }
    let last = cdf.last().copied().unwrap_or_default();
    cdf.partition_point(|&cumulative| cumulative < last)
}

/// Choose one label at random, with probability proportional to its weight.
///
/// Labels with a weight of zero or less are never chosen.
pub fn weighted_choice<K, I>(labelled_weights: I, rng: &mut impl Rng) -> Result<K, ProbabilityError>
where
    I: IntoIterator<Item = (K, f64)>,
{
    let mut candidates = labelled_weights
        .into_iter()
        .filter(|(_, weight)| *weight > 0.)
        .collect::<Vec<_>>();
    let total = candidates.iter().map(|(_, weight)| weight).sum::<f64>();
    if candidates.is_empty() || !total.is_finite() {
        return Err(ProbabilityError::NoPositiveWeights);
    }

    let u = rng.random::<f64>();
    let mut cumulative = 0.;
    let index = candidates
        .iter()
        .position(|(_, weight)| {
            cumulative += weight / total;
            u < cumulative
        })
        .unwrap_or(candidates.len() - 1);

    Ok(candidates.swap_remove(index).0)
}

/// A parameterised probability distribution as given in the end-use statistics.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "distribution", deny_unknown_fields)]
pub enum Distribution {
    /// Always yields the same value.
    Fixed { value: f64 },
    Poisson { average: f64 },
    Binomial { n: u64, p: f64 },
    /// Negative binomial described by its mean and standard deviation.
    NegativeBinomial { average: f64, sigma: f64 },
    LogNormal {
        mean: f64,
        #[serde(default = "unit_sigma")]
        sigma: f64,
    },
    ChiSquare { df: f64 },
    Uniform { low: f64, high: f64 },
    Normal { mean: f64, sd: f64 },
}

fn unit_sigma() -> f64 {
    1.
}

impl Distribution {
    pub fn fixed(value: f64) -> Self {
        Self::Fixed { value }
    }

    pub fn sample(&self, rng: &mut impl Rng) -> Result<f64, ConfigurationError> {
        let value = match *self {
            Self::Fixed { value } => value,
            Self::Poisson { average } => sample_poisson(average, rng)?,
            Self::Binomial { n, p } => Binomial::new(n, p)
                .map_err(|e| ConfigurationError::invalid_distribution("binomial", e.to_string()))?
                .sample(rng) as f64,
            Self::NegativeBinomial { average, sigma } => {
                sample_negative_binomial(average, sigma, rng)?
            }
            Self::LogNormal { mean, sigma } => LogNormal::new(mean, sigma)
                .map_err(|e| ConfigurationError::invalid_distribution("lognormal", e.to_string()))?
                .sample(rng),
            Self::ChiSquare { df } => ChiSquared::new(df)
                .map_err(|e| ConfigurationError::invalid_distribution("chi-square", e.to_string()))?
                .sample(rng),
            Self::Uniform { low, high } => {
                if !(low.is_finite() && high.is_finite() && low <= high) {
                    return Err(ConfigurationError::invalid_distribution(
                        "uniform",
                        format!("low ({low}) must not exceed high ({high})"),
                    ));
                }
                if low == high {
                    low
                } else {
                    rng.random_range(low..high)
                }
            }
            Self::Normal { mean, sd } => Normal::new(mean, sd)
                .map_err(|e| ConfigurationError::invalid_distribution("normal", e.to_string()))?
                .sample(rng),
        };

        Ok(value)
    }

    /// Sample a number of uses: the draw rounded to the nearest whole number, never negative.
    pub fn sample_count(&self, rng: &mut impl Rng) -> Result<usize, ConfigurationError> {
        Ok(self.sample(rng)?.round().max(0.) as usize)
    }
}

fn sample_poisson(average: f64, rng: &mut impl Rng) -> Result<f64, ConfigurationError> {
    if average == 0. {
        return Ok(0.);
    }
    Ok(Poisson::new(average)
        .map_err(|e| ConfigurationError::invalid_distribution("poisson", e.to_string()))?
        .sample(rng))
}

/// Mixture of a gamma and a Poisson distribution, with `p = average / sigma^2` and
/// `r = p * average / (1 - p)`.
fn sample_negative_binomial(
    average: f64,
    sigma: f64,
    rng: &mut impl Rng,
) -> Result<f64, ConfigurationError> {
    let p = average / sigma.powi(2);
    if !(p > 0. && p < 1.) {
        return Err(ConfigurationError::invalid_distribution(
            "negative binomial",
            format!("average ({average}) must be positive and below the variance ({})", sigma.powi(2)),
        ));
    }
    let r = p * average / (1. - p);
    let rate = Gamma::new(r, (1. - p) / p)
        .map_err(|e| ConfigurationError::invalid_distribution("negative binomial", e.to_string()))?
        .sample(rng);

    sample_poisson(rate, rng)
}

/// Sample from a normal distribution around `mean` with a standard deviation of 30% of
/// the mean, truncated at zero. A mean of zero always yields zero.
pub fn truncated_normal_sample(mean: f64, rng: &mut impl Rng) -> Result<f64, ConfigurationError> {
    if mean == 0. {
        return Ok(0.);
    }
    let normal = StatrsNormal::new(mean, mean * 0.3).map_err(|e| {
        ConfigurationError::invalid_distribution("truncated normal", e.to_string())
    })?;
    let lower = normal.cdf(0.);
    let u = lower + rng.random::<f64>() * (1. - lower);

    Ok(normal.inverse_cdf(u).max(0.))
}
