//! Sampling of event start times from a day's joint usage probability.

use crate::core::probability::{cumulative_distribution, inverse_cdf_index};
use rand::Rng;
use thiserror::Error;
use tracing::trace;

pub const DEFAULT_MAX_ATTEMPTS: usize = 1_000;

/// A half-open range of simulation steps, `[start, end)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Interval {
    pub start: usize,
    pub end: usize,
}

impl Interval {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// An event starting at `start` is blocked if it starts inside this interval, or
    /// starts before it without `duration` steps of room.
    fn blocks(&self, start: usize, duration: usize) -> bool {
        (self.start..self.end).contains(&start)
            || (start < self.start && start + duration >= self.start)
    }

    /// The part of this interval that runs past `horizon`, moved to the start of the horizon.
    pub fn wrapped_tail(&self, horizon: usize) -> Option<Interval> {
        (self.end > horizon).then(|| Interval::new(0, (self.end - horizon).min(horizon)))
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum SchedulingError {
    #[error("No free start time on day {day} for an event of {duration} steps after {attempts} attempts")]
    NoSlotFound {
        day: usize,
        duration: usize,
        attempts: usize,
    },
    #[error("Usage probability for day {day} has no positive mass")]
    EmptyDistribution { day: usize },
}

/// Sample a start step for an event of `duration` steps on day `day`.
///
/// `prob_joint` holds the usage probability for every step of a single day. The returned
/// interval is in absolute simulation steps and is not clipped to the day.
///
/// When `wrap_at` is set, an event running past that step continues at step 0, and that
/// continuation must not overlap any previous event either.
pub fn sample_start_time(
    prob_joint: &[f64],
    day: usize,
    duration: usize,
    previous: &[Interval],
    wrap_at: Option<usize>,
    max_attempts: usize,
    rng: &mut impl Rng,
) -> Result<Interval, SchedulingError> {
    let cdf = cumulative_distribution(prob_joint);
    if !cdf.last().is_some_and(|total| *total > 0.) {
        return Err(SchedulingError::EmptyDistribution { day });
    }
    let day_offset = day * prob_joint.len();

    for attempt in 0..max_attempts {
        let u = rng.random::<f64>();
        let start = day_offset + inverse_cdf_index(&cdf, u);
        let candidate = Interval::new(start, start + duration);
        let tail = wrap_at.and_then(|horizon| candidate.wrapped_tail(horizon));
        if previous.iter().any(|interval| {
            interval.blocks(start, duration) || tail.is_some_and(|tail| tail.overlaps(interval))
        }) {
            trace!(day, start, attempt, "start time rejected");
            continue;
        }
        return Ok(candidate);
    }

    Err(SchedulingError::NoSlotFound {
        day,
        duration,
        attempts: max_attempts,
    })
}
