//! Builders for the per-step usage priors and the flow patterns of cycle appliances.
//!
//! Cycle patterns are described second by second and only brought to the simulation
//! resolution at the very end, so that their volume does not depend on the resolution.

use crate::errors::ConfigurationError;
use crate::input::{DailyPatternInput, EnduseCycleInput};
use crate::simulation_time::SimulationTime;
use interp::{interp, InterpMode};
use itertools::Itertools;

/// Gap between the end of a discharge and the start of the next fill phase, in seconds
const DISCHARGE_LEAD_SECONDS: usize = 10;

/// Linearly interpolate knots, spaced `interval` seconds apart from midnight, onto every
/// step of a day. Times past the last knot take the value of the last knot.
pub fn daily_pattern(
    knots: &[f64],
    interval_seconds: f64,
    time: &SimulationTime,
) -> Result<Vec<f64>, ConfigurationError> {
    if knots.is_empty() {
        return Err(ConfigurationError::missing("daily pattern", "knot values"));
    }
    if !(interval_seconds > 0.) {
        return Err(ConfigurationError::missing("daily pattern", "positive knot interval"));
    }
    if knots.iter().any(|value| *value < 0. || !value.is_finite()) {
        return Err(ConfigurationError::InvalidInput(
            "daily pattern values must be finite and non-negative".into(),
        ));
    }
    if knots.len() == 1 {
        return Ok(vec![knots[0]; time.steps_per_day()]);
    }

    let positions = (0..knots.len())
        .map(|i| i as f64 * interval_seconds)
        .collect_vec();
    let last = positions[positions.len() - 1];

    Ok((0..time.steps_per_day())
        .map(|step| {
            let seconds = time.steps_to_seconds(step).min(last);
            interp(&positions, knots, seconds, &InterpMode::default())
        })
        .collect())
}

pub fn daily_pattern_from_input(
    input: &DailyPatternInput,
    time: &SimulationTime,
) -> Result<Vec<f64>, ConfigurationError> {
    daily_pattern(&input.values, input.interval.seconds(), time)
}

/// Intake flow of a cycle appliance for every second of its runtime.
pub fn enduse_cycle_pattern(input: &EnduseCycleInput) -> Result<Vec<f64>, ConfigurationError> {
    let runtime = input.runtime.seconds().round() as usize;
    if runtime == 0 {
        return Err(ConfigurationError::missing("cycle pattern", "positive runtime"));
    }
    let mut pattern = vec![0.; runtime];
    for cycle in &input.cycle_times {
        let start = cycle.start.seconds().round() as usize;
        let end = (cycle.end.seconds().round() as usize).min(runtime);
        if start >= end {
            return Err(ConfigurationError::InvalidInput(format!(
                "cycle phase [{}, {}) is empty or outside the runtime of {runtime} s",
                cycle.start, cycle.end
            )));
        }
        pattern[start..end].fill(input.intensity);
    }

    Ok(pattern)
}

/// Contiguous runs of non-zero flow, as `(start, end)` second offsets.
fn flow_sections(pattern: &[f64]) -> Vec<(usize, usize)> {
    let mut sections = vec![];
    let mut current: Option<usize> = None;
    for (second, flow) in pattern.iter().enumerate() {
        match (current, *flow > 0.) {
            (None, true) => current = Some(second),
            (Some(start), false) => {
                sections.push((start, second));
                current = None;
            }
            _ => {}
        }
    }
    if let Some(start) = current {
        sections.push((start, pattern.len()));
    }

    sections
}

/// Discharge of a cycle appliance for every second of its runtime, derived from its intake.
///
/// The water taken in by each fill phase is pumped out over `discharge_time` seconds,
/// finishing shortly before the next fill phase starts. The last fill phase is pumped out
/// a third of the way into the remaining runtime. The pattern grows past the runtime if
/// the final discharge does not fit.
pub fn complex_discharge_pattern(intake: &[f64], discharge_time: usize) -> Vec<f64> {
    let runtime = intake.len();
    let sections = flow_sections(intake);
    let discharge_time = discharge_time.max(1);
    let mut discharge = vec![0.; runtime];

    let add = |discharge: &mut Vec<f64>, begin: usize, volume: f64| {
        let end = begin + discharge_time;
        if discharge.len() < end {
            discharge.resize(end, 0.);
        }
        let rate = volume / discharge_time as f64;
        discharge[begin..end].iter_mut().for_each(|flow| *flow += rate);
    };

    for (previous, next) in sections.iter().tuple_windows() {
        let volume = intake[previous.0..previous.1].iter().sum::<f64>();
        let end = next.0.saturating_sub(DISCHARGE_LEAD_SECONDS);
        add(&mut discharge, end.saturating_sub(discharge_time), volume);
    }
    if let Some(&(start, end)) = sections.last() {
        let volume = intake[start..end].iter().sum::<f64>();
        add(&mut discharge, end + (runtime - end) / 3, volume);
    }

    discharge
}

/// Bring a per-second flow pattern to a coarser resolution, conserving its volume.
pub fn downsample_flow(pattern: &[f64], resolution: u32) -> Vec<f64> {
    let resolution = resolution.max(1) as usize;
    pattern
        .chunks(resolution)
        .map(|chunk| chunk.iter().sum::<f64>() / resolution as f64)
        .collect()
}
