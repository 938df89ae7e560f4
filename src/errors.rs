use crate::core::consumption::{ArrayBoundsError, DischargeArrayMissing};
use crate::core::probability::ProbabilityError;
use crate::core::scheduler::SchedulingError;
use crate::core::units::DurationParseError;
use thiserror::Error;

/// Errors that abort a house simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Invalid probability distribution: {0}")]
    Probability(#[from] ProbabilityError),
    #[error("Write outside of the simulated arrays: {0}")]
    ArrayBounds(#[from] ArrayBoundsError),
    #[error(transparent)]
    DischargeArrayMissing(#[from] DischargeArrayMissing),
    #[error("Scheduling failed: {0}")]
    Scheduling(#[from] SchedulingError),
    #[error("No free step left in the discharge array for user {user}, end-use {end_use}, pattern {pattern}")]
    NoFreeDischargeSlot {
        user: usize,
        end_use: usize,
        pattern: usize,
    },
}

/// Missing or malformed statistical configuration. These are never retried.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("Simulation must cover at least one day")]
    NoSimulationDays,
    #[error("Resolution of {0} seconds must be positive and divide a day exactly")]
    InvalidResolution(u32),
    #[error("At least one pattern replicate must be simulated")]
    NoPatterns,
    #[error("A house needs at least one user")]
    NoUsers,
    #[error("Missing {parameter} for {context}")]
    MissingParameter { context: String, parameter: String },
    #[error("Invalid parameters for {distribution} distribution: {reason}")]
    InvalidDistribution {
        distribution: &'static str,
        reason: String,
    },
    #[error("No statistics configured for end-use {0}")]
    MissingStatistics(String),
    #[error("Presence of user {0} has not been computed")]
    PresenceNotComputed(String),
    #[error("Presence curve of user {user} has {actual} steps where {expected} were expected")]
    PresenceLength {
        user: String,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Duration(#[from] DurationParseError),
    #[error("Input failed validation: {0}")]
    InvalidInput(String),
}

impl ConfigurationError {
    pub(crate) fn missing(context: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self::MissingParameter {
            context: context.into(),
            parameter: parameter.into(),
        }
    }

    pub(crate) fn invalid_distribution(distribution: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidDistribution {
            distribution,
            reason: reason.into(),
        }
    }
}
