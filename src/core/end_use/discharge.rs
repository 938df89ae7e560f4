//! Discharge of used water back into the sewer, following each intake.

use crate::core::consumption::{ArraySlot, FlowAttribute, UsageArrays};
use crate::core::end_use::misc::hot_water_equivalent;
use crate::core::end_use::SimulationContext;
use crate::core::probability::Distribution;
use crate::core::scheduler::Interval;
use crate::errors::{ConfigurationError, SimulationError};
use crate::input::{DischargeStatistics, EndUseKind};
use rand::Rng;
use tracing::trace;

pub const CYCLE_USAGE: &str = "cycle";

/// Discharge caused by one use of an end-use.
#[derive(Clone, Debug, PartialEq)]
pub struct DischargeEvent {
    pub end_use: EndUseKind,
    pub end_use_index: usize,
    /// What the water was used for, e.g. the tap subtype, or `urine`/`faeces` for a wc
    pub usage: String,
    pub user: usize,
    pub pattern: usize,
    /// Steps the discharge was written to, in the order they were written
    pub segments: Vec<Interval>,
    pub temperature: f64,
    /// Litres
    pub volume: f64,
}

impl DischargeEvent {
    pub fn start(&self) -> Option<usize> {
        self.segments.first().map(|segment| segment.start)
    }

    pub fn end(&self) -> Option<usize> {
        self.segments.last().map(|segment| segment.end)
    }
}

/// The intake a discharge follows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Intake {
    pub interval: Interval,
    /// Litres
    pub volume: f64,
    pub temperature: f64,
}

/// Discharge statistics of an end-use, required once discharge is simulated.
pub(crate) fn require_discharge<T>(
    statistics: &Option<T>,
    end_use: EndUseKind,
) -> Result<&T, ConfigurationError> {
    statistics
        .as_ref()
        .ok_or_else(|| ConfigurationError::missing(end_use.to_string(), "discharge statistics"))
}

/// Find the first step at or after `start` where the slot is not discharging yet.
///
/// With spillover the search continues from the first step of the horizon. Without it a
/// fully occupied tail resolves to the last step.
pub fn offset_simultaneous_discharge(
    arrays: &UsageArrays,
    start: usize,
    slot: ArraySlot,
    spillover: bool,
) -> Result<usize, SimulationError> {
    let series = arrays.discharge_series(slot)?;
    let horizon = series.len();
    let is_free = |step: &usize| series[*step] == 0.;

    if let Some(step) = (start..horizon).find(is_free) {
        return Ok(step);
    }
    if !spillover {
        return Ok(horizon.saturating_sub(1));
    }
    (0..start.min(horizon))
        .find(is_free)
        .ok_or(SimulationError::NoFreeDischargeSlot {
            user: slot.user,
            end_use: slot.end_use,
            pattern: slot.pattern,
        })
}

/// Per-step flows that discharge `volume` litres at `rate` litres per second. The last step
/// carries whatever is left, so that the whole volume is discharged.
pub fn discharge_flows(volume: f64, rate: f64, resolution: u32) -> Vec<f64> {
    let step_volume = rate * resolution as f64;
    if !(volume > 0. && step_volume > 0.) {
        return vec![];
    }
    let full_steps = (volume / step_volume).floor() as usize;
    let remainder = volume - full_steps as f64 * step_volume;

    let mut flows = vec![rate; full_steps];
    if remainder > volume * 1e-9 {
        flows.push(remainder / resolution as f64);
    }
    flows
}

/// Write per-step discharge flows starting at `start`, moving every step that is already
/// taken to the next free one. Steps that find no free step are dropped, and the returned
/// volume only counts what was written.
pub(crate) fn write_discharge(
    ctx: &mut SimulationContext,
    slot: ArraySlot,
    start: usize,
    flows: &[f64],
    temperature: f64,
) -> Result<(Vec<Interval>, f64), SimulationError> {
    let horizon = ctx.arrays.horizon();
    let spillover = ctx.spillover();
    let resolution = ctx.time.resolution() as f64;
    let mut segments: Vec<Interval> = vec![];
    let mut volume = 0.;

    for (offset, flow) in flows.iter().enumerate().filter(|(_, flow)| **flow > 0.) {
        let mut step = start + offset;
        if step >= horizon {
            if !spillover {
                trace!(step, "dropping discharge past the end of the simulation");
                break;
            }
            step %= horizon;
        }
        let step = offset_simultaneous_discharge(ctx.arrays, step, slot, spillover)?;
        if ctx.arrays.discharge_series(slot)?[step] > 0. {
            trace!(step, "dropping discharge with no free step left");
            continue;
        }
        ctx.arrays.assign_discharge(slot, step, *flow, FlowAttribute::Raw)?;
        ctx.arrays.assign_discharge(
            slot,
            step,
            hot_water_equivalent(*flow, temperature),
            FlowAttribute::HotEquivalent,
        )?;
        volume += flow * resolution;

        match segments.last_mut() {
            Some(segment) if segment.end == step => segment.end += 1,
            _ => segments.push(Interval::new(step, step + 1)),
        }
    }

    Ok((segments, volume))
}

/// Discharge the volume of a single continuous use.
///
/// The discharge starts when the use ends, or when it starts if `at_intake_start` is set,
/// after a random delay.
#[allow(clippy::too_many_arguments)]
pub(crate) fn simulate_interval_discharge(
    ctx: &mut SimulationContext,
    statistics: &DischargeStatistics,
    end_use: EndUseKind,
    usage: &str,
    slot: ArraySlot,
    intake: Intake,
    at_intake_start: bool,
    rng: &mut impl Rng,
) -> Result<DischargeEvent, SimulationError> {
    let delay = match statistics.usage_delay {
        Some(delay) => Distribution::Uniform {
            low: delay.low.seconds(),
            high: delay.high.seconds(),
        }
        .sample(rng)?,
        None => 0.,
    };
    let delay_steps = (delay / ctx.time.resolution() as f64).round() as usize;
    let base = if at_intake_start {
        intake.interval.start
    } else {
        intake.interval.end
    };

    let rate = statistics.discharge_intensity.sample(rng)?;
    if !(rate > 0.) {
        return Err(ConfigurationError::invalid_distribution(
            "discharge intensity",
            format!("drew a non-positive discharge rate ({rate})"),
        )
        .into());
    }
    let temperature = match &statistics.discharge_temperature {
        Some(distribution) => distribution.sample(rng)?,
        None => intake.temperature,
    };

    let flows = discharge_flows(intake.volume, rate, ctx.time.resolution());
    let (segments, volume) = write_discharge(ctx, slot, base + delay_steps, &flows, temperature)?;

    Ok(DischargeEvent {
        end_use,
        end_use_index: slot.end_use,
        usage: usage.into(),
        user: slot.user,
        pattern: slot.pattern,
        segments,
        temperature,
        volume,
    })
}

/// Discharge a cycle appliance's pattern, offset from the start of its cycle.
pub(crate) fn simulate_cycle_discharge(
    ctx: &mut SimulationContext,
    end_use: EndUseKind,
    slot: ArraySlot,
    start: usize,
    flows: &[f64],
    temperature: f64,
) -> Result<DischargeEvent, SimulationError> {
    let (segments, volume) = write_discharge(ctx, slot, start, flows, temperature)?;

    Ok(DischargeEvent {
        end_use,
        end_use_index: slot.end_use,
        usage: CYCLE_USAGE.into(),
        user: slot.user,
        pattern: slot.pattern,
        segments,
        temperature,
        volume,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::end_use::{SimulationFlags, UsageEvent};
    use crate::core::units::TimeSpan;
    use crate::core::wastewater::discharge_temperature_per_event;
    use crate::input::UsageDelay;
    use crate::simulation_time::SimulationTime;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;
    use rstest::*;

    const SLOT: ArraySlot = ArraySlot {
        user: 0,
        end_use: 0,
        pattern: 0,
    };

    #[fixture]
    fn arrays() -> UsageArrays {
        UsageArrays::new(SimulationTime::new(1, 3_600).unwrap(), 1, 1, 1, true)
    }

    fn occupy(arrays: &mut UsageArrays, steps: impl IntoIterator<Item = usize>) {
        for step in steps {
            arrays.assign_discharge(SLOT, step, 1., FlowAttribute::Raw).unwrap();
        }
    }

    #[rstest]
    fn test_offset_free_step_is_kept(arrays: UsageArrays) {
        assert_eq!(offset_simultaneous_discharge(&arrays, 5, SLOT, false).unwrap(), 5);
    }

    #[rstest]
    fn test_offset_scans_forward(mut arrays: UsageArrays) {
        occupy(&mut arrays, 5..8);
        assert_eq!(offset_simultaneous_discharge(&arrays, 5, SLOT, false).unwrap(), 8);
    }

    #[rstest]
    fn test_offset_wraps_with_spillover(mut arrays: UsageArrays) {
        occupy(&mut arrays, 20..24);
        occupy(&mut arrays, 0..3);
        assert_eq!(offset_simultaneous_discharge(&arrays, 21, SLOT, true).unwrap(), 3);
        assert_eq!(offset_simultaneous_discharge(&arrays, 21, SLOT, false).unwrap(), 23);
    }

    #[rstest]
    fn test_offset_fails_when_everything_is_taken(mut arrays: UsageArrays) {
        occupy(&mut arrays, 0..24);
        assert!(matches!(
            offset_simultaneous_discharge(&arrays, 10, SLOT, true),
            Err(SimulationError::NoFreeDischargeSlot { .. })
        ));
    }

    #[test]
    fn test_discharge_flows_conserve_volume() {
        let flows = discharge_flows(10., 0.15, 60);
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0], 0.15);
        assert_relative_eq!(flows.iter().sum::<f64>() * 60., 10., max_relative = 1e-12);
        assert_eq!(discharge_flows(9., 0.15, 60), vec![0.15]);
        assert!(discharge_flows(0., 0.15, 60).is_empty());
    }

    #[test]
    fn test_interval_discharge_follows_intake() {
        let time = SimulationTime::new(1, 60).unwrap();
        let mut arrays = UsageArrays::new(time, 1, 1, 1, true);
        let mut usage_events: Vec<UsageEvent> = vec![];
        let mut ctx = SimulationContext {
            arrays: &mut arrays,
            usage_events: &mut usage_events,
            time,
            flags: SimulationFlags::SIMULATE_DISCHARGE,
            max_scheduling_attempts: 10,
        };
        let statistics = DischargeStatistics {
            discharge_intensity: Distribution::fixed(0.5),
            usage_delay: Some(UsageDelay {
                low: TimeSpan::from_seconds(120.),
                high: TimeSpan::from_seconds(120.),
            }),
            discharge_temperature: Some(Distribution::fixed(35.)),
        };
        let intake = Intake {
            interval: Interval::new(600, 610),
            volume: 100.,
            temperature: 40.,
        };
        let mut rng = Pcg64::seed_from_u64(0);

        let event = simulate_interval_discharge(
            &mut ctx,
            &statistics,
            EndUseKind::Bathtub,
            "Bathtub",
            SLOT,
            intake,
            false,
            &mut rng,
        )
        .unwrap();
        assert_eq!(event.segments, vec![Interval::new(612, 616)]);
        assert_relative_eq!(event.volume, 100., max_relative = 1e-12);
        assert_eq!(event.temperature, 35.);

        let series = arrays.discharge_series(SLOT).unwrap();
        assert_relative_eq!(series.sum() * 60., 100., max_relative = 1e-12);
        assert_relative_eq!(series[615], 10. / 60., max_relative = 1e-12);
    }

    #[test]
    fn test_discharge_past_horizon_is_dropped_without_spillover() {
        let time = SimulationTime::new(1, 3_600).unwrap();
        let mut arrays = UsageArrays::new(time, 1, 1, 1, true);
        let mut usage_events: Vec<UsageEvent> = vec![];
        let mut ctx = SimulationContext {
            arrays: &mut arrays,
            usage_events: &mut usage_events,
            time,
            flags: SimulationFlags::SIMULATE_DISCHARGE,
            max_scheduling_attempts: 10,
        };
        let (segments, volume) = write_discharge(&mut ctx, SLOT, 22, &[0.1; 4], 10.).unwrap();
        assert_eq!(segments, vec![Interval::new(22, 24)]);
        assert_relative_eq!(volume, 0.2 * 3_600.);

        ctx.flags |= SimulationFlags::SPILLOVER;
        let (segments, _) = write_discharge(&mut ctx, SLOT, 22, &[0.1; 4], 10.).unwrap();
        assert_eq!(segments, vec![Interval::new(0, 4)]);
    }

    #[test]
    fn test_clamped_discharge_on_a_full_tail_is_dropped() {
        let time = SimulationTime::new(1, 3_600).unwrap();
        let mut arrays = UsageArrays::new(time, 1, 1, 1, true);
        let mut usage_events: Vec<UsageEvent> = vec![];
        let mut ctx = SimulationContext {
            arrays: &mut arrays,
            usage_events: &mut usage_events,
            time,
            flags: SimulationFlags::SIMULATE_DISCHARGE,
            max_scheduling_attempts: 10,
        };
        let first =
            simulate_cycle_discharge(&mut ctx, EndUseKind::WashingMachine, SLOT, 21, &[0.1; 3], 20.)
                .unwrap();
        let second =
            simulate_cycle_discharge(&mut ctx, EndUseKind::WashingMachine, SLOT, 22, &[0.2; 2], 30.)
                .unwrap();

        assert_eq!(first.segments, vec![Interval::new(21, 24)]);
        assert_relative_eq!(first.volume, 0.3 * 3_600.);
        assert!(second.segments.is_empty());
        assert_eq!(second.volume, 0.);

        let series = arrays.discharge_series(SLOT).unwrap();
        assert_relative_eq!(series.sum() * 3_600., first.volume + second.volume);
        assert_eq!(series[23], 0.1);
        assert_eq!(
            discharge_temperature_per_event(&arrays, &[first, second]).unwrap(),
            vec![20., 30.]
        );
    }
}
