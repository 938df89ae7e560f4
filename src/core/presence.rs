//! Daily presence curves: the probability that a user is at home and active at each step.

use crate::core::probability::{normalize, normalize_in_place, ProbabilityError};
use crate::core::units::MINUTES_PER_DAY;
use crate::errors::{ConfigurationError, SimulationError};
use crate::input::{ContinuousDistributionKind, DayPresenceStatistics, PresenceWeights, TimeOfDayDistribution};
use crate::simulation_time::SimulationTime;
use rand::Rng;
use rand_distr::{Distribution, Exp, Normal};
use tracing::debug;

const MINUTES: i64 = MINUTES_PER_DAY as i64;
/// Length of the busy period around waking up, leaving, coming home and going to bed
const PEAK_MINUTES: i64 = 30;

/// Draw a time of day (or span) in whole minutes.
pub fn sample_minutes(
    distribution: &TimeOfDayDistribution,
    rng: &mut impl Rng,
) -> Result<i64, ConfigurationError> {
    let loc = distribution.mu.minutes().round();
    let scale = distribution.sd.minutes().round();
    let invalid = |reason: String| ConfigurationError::invalid_distribution("time of day", reason);

    let draw = match distribution.dist {
        ContinuousDistributionKind::Norm => Normal::new(loc, scale)
            .map_err(|e| invalid(e.to_string()))?
            .sample(rng),
        ContinuousDistributionKind::Uniform => {
            if scale > 0. {
                rng.random_range(loc..loc + scale)
            } else {
                loc
            }
        }
        ContinuousDistributionKind::Logistic => {
            let u = rng.random::<f64>().clamp(f64::EPSILON, 1. - f64::EPSILON);
            loc + scale * (u / (1. - u)).ln()
        }
        ContinuousDistributionKind::Expon => {
            if scale > 0. {
                loc + Exp::new(1. / scale)
                    .map_err(|e| invalid(e.to_string()))?
                    .sample(rng)
            } else {
                loc
            }
        }
    };
    if !draw.is_finite() {
        return Err(invalid(format!("drew a non-finite time ({draw})")));
    }

    Ok(draw.round() as i64)
}

/// The four moments of a day that shape a presence curve, in minutes from midnight.
/// `sleep` may lie past midnight, i.e. beyond one day.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PresenceAnchors {
    pub up: i64,
    pub go: i64,
    pub home: i64,
    pub sleep: i64,
}

impl PresenceAnchors {
    pub fn sample(
        statistics: &DayPresenceStatistics,
        rng: &mut impl Rng,
    ) -> Result<Self, ConfigurationError> {
        let up = sample_minutes(&statistics.getting_up, rng)?;
        let sleep_duration = sample_minutes(&statistics.sleep, rng)?;
        let go = sample_minutes(&statistics.leaving_house, rng)?;
        let away = sample_minutes(&statistics.being_away, rng)?;

        Ok(Self::from_draws(up, sleep_duration, go, away))
    }

    /// Apply the ordering rules to raw draws.
    pub fn from_draws(up: i64, sleep_duration: i64, go: i64, away: i64) -> Self {
        let sleep = up - sleep_duration + MINUTES;
        let go = if go < up { up + PEAK_MINUTES } else { go };
        let mut home = (go + away).max(go);
        if sleep < home {
            home = sleep - PEAK_MINUTES;
        }

        Self {
            up,
            go,
            home,
            sleep,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Regime {
    Normal,
    Peak,
    Night,
    Away,
}

/// Minutes of the day covered by `[start, end)`, wrapping past midnight.
fn minute_range(start: i64, end: i64) -> Vec<usize> {
    let start = start.rem_euclid(MINUTES);
    let end = end.rem_euclid(MINUTES);
    if start < end {
        (start..end).map(|m| m as usize).collect()
    } else if start > end {
        (start..MINUTES).chain(0..end).map(|m| m as usize).collect()
    } else {
        vec![]
    }
}

/// Normalized presence density over the minutes of a day.
pub fn minute_density(
    anchors: &PresenceAnchors,
    weights: &PresenceWeights,
) -> Result<Vec<f64>, ProbabilityError> {
    let PresenceAnchors { up, go, home, sleep } = *anchors;
    let mut regimes: Vec<Option<Regime>> = vec![None; MINUTES as usize];
    let spans = [
        (up + PEAK_MINUTES, go - PEAK_MINUTES, Regime::Normal),
        (home + PEAK_MINUTES, sleep - PEAK_MINUTES, Regime::Normal),
        (up, up + PEAK_MINUTES, Regime::Peak),
        (go - PEAK_MINUTES, go, Regime::Peak),
        (home, home + PEAK_MINUTES, Regime::Peak),
        (sleep - PEAK_MINUTES, sleep, Regime::Peak),
        (sleep, up, Regime::Night),
        (go, home, Regime::Away),
    ];
    for (start, end, regime) in spans {
        for minute in minute_range(start, end) {
            regimes[minute] = Some(regime);
        }
    }

    let count = |regime| regimes.iter().filter(|r| **r == Some(regime)).count() as f64;
    let at_home = count(Regime::Normal) + count(Regime::Peak) + count(Regime::Night);
    let value = |regime, weight: f64| {
        let minutes = count(regime);
        if minutes == 0. {
            0.
        } else {
            weight / (minutes / at_home)
        }
    };
    let normal = value(Regime::Normal, weights.normal);
    let peak = value(Regime::Peak, weights.peak);
    let night = value(Regime::Night, weights.night);

    let density = regimes
        .iter()
        .map(|regime| match regime {
            Some(Regime::Normal) => normal,
            Some(Regime::Peak) => peak,
            Some(Regime::Night) => night,
            Some(Regime::Away) => weights.away,
            None => 0.,
        })
        .collect::<Vec<_>>();

    normalize(&density)
}

/// A user's presence over one day at the simulation resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct Presence {
    curve: Vec<f64>,
}

impl Presence {
    pub fn compute(
        statistics: &DayPresenceStatistics,
        weights: &PresenceWeights,
        time: &SimulationTime,
        rng: &mut impl Rng,
    ) -> Result<Self, SimulationError> {
        let anchors = PresenceAnchors::sample(statistics, rng)?;
        debug!(?anchors, "sampled presence anchors");
        let density = minute_density(&anchors, weights)?;

        Ok(Self {
            curve: expand_to_resolution(&density, time)?,
        })
    }

    /// Use a precomputed curve with one value per step of a day.
    pub fn from_curve(
        user: &str,
        curve: Vec<f64>,
        time: &SimulationTime,
    ) -> Result<Self, SimulationError> {
        if curve.len() != time.steps_per_day() {
            return Err(ConfigurationError::PresenceLength {
                user: user.into(),
                expected: time.steps_per_day(),
                actual: curve.len(),
            }
            .into());
        }

        Ok(Self {
            curve: normalize(&curve)?,
        })
    }

    pub fn curve(&self) -> &[f64] {
        &self.curve
    }
}

/// Forward fill a per-minute density onto the steps of a day.
fn expand_to_resolution(density: &[f64], time: &SimulationTime) -> Result<Vec<f64>, ProbabilityError> {
    let mut curve = (0..time.steps_per_day())
        .map(|step| density[(time.steps_to_seconds(step) / 60.) as usize % density.len()])
        .collect::<Vec<_>>();
    normalize_in_place(&mut curve)?;

    Ok(curve)
}
