//! Post-processing of simulated discharge: temperatures over time and nutrient loads.

use crate::core::consumption::{FlowAttribute, UsageArrays};
use crate::core::end_use::discharge::DischargeEvent;
use crate::core::probability::truncated_normal_sample;
use crate::errors::ConfigurationError;
use crate::input::{NutrientLoads, NutrientStatistics};
use anyhow::bail;
use rand::Rng;
use tracing::debug;

/// Calculate volume-weighted average temperature from list of (temperature, volume) pairs.
///
/// Arguments:
/// * `temp_volume_pairs`  -- List of (temperature, volume) tuples
/// * `expected_volume`    -- Expected total volume. If provided, validates that actual total matches.
/// * `tolerance`     -- Tolerance for volume validation (relative tolerance)
pub fn calculate_volume_weighted_average_temperature(
    temp_volume_pairs: &[(f64, f64)],
    expected_volume: Option<f64>,
    tolerance: Option<f64>,
) -> anyhow::Result<f64> {
    if temp_volume_pairs.is_empty() {
        bail!("Cannot calculate weighted average: temp_volume_pairs is empty")
    }

    let tolerance = tolerance.unwrap_or(1e-10);
    let weighted_temp_sum = temp_volume_pairs
        .iter()
        .map(|(temp, volume)| temp * volume)
        .sum::<f64>();
    let total_volume = temp_volume_pairs.iter().map(|(_, volume)| volume).sum::<f64>();

    if total_volume == 0. {
        bail!("Cannot calculate weighted average: total volume is zero");
    }

    if let Some(expected_volume) = expected_volume {
        if !is_close!(total_volume, expected_volume, rel_tol = tolerance) {
            bail!("Volume mismatch: expected {expected_volume}, got {total_volume}");
        }
    }

    Ok(weighted_temp_sum / total_volume)
}

/// Discharge flow of every step an event wrote to, as `(step, litres per second)`.
fn event_flows<'a>(
    arrays: &'a UsageArrays,
    event: &'a DischargeEvent,
) -> anyhow::Result<impl Iterator<Item = (usize, f64)> + 'a> {
    let Some(discharge) = arrays.discharge() else {
        bail!("No discharge was simulated");
    };

    Ok(event
        .segments
        .iter()
        .flat_map(|segment| segment.start..segment.end)
        .map(move |step| {
            (
                step,
                discharge[[
                    step,
                    event.user,
                    event.end_use_index,
                    event.pattern,
                    FlowAttribute::Raw.index(),
                ]],
            )
        }))
}

/// Flow-weighted temperature of each discharge event.
///
/// An event that was cut off before writing any discharge keeps its sampled temperature.
pub fn discharge_temperature_per_event(
    arrays: &UsageArrays,
    events: &[DischargeEvent],
) -> anyhow::Result<Vec<f64>> {
    let resolution = arrays.time().resolution() as f64;
    events
        .iter()
        .map(|event| {
            if event.segments.is_empty() {
                return Ok(event.temperature);
            }
            let pairs = event_flows(arrays, event)?
                .map(|(_, flow)| (event.temperature, flow * resolution))
                .collect::<Vec<_>>();
            calculate_volume_weighted_average_temperature(&pairs, Some(event.volume), Some(1e-9))
        })
        .collect()
}

/// Discharge of a house over one window of time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DischargeWindow {
    pub start: usize,
    /// Litres
    pub volume: f64,
    /// Flow-weighted temperature, if anything was discharged
    pub temperature: Option<f64>,
}

/// Total discharge and its flow-weighted temperature per window of `window_steps` steps,
/// for one pattern replicate.
pub fn aggregate_discharge(
    arrays: &UsageArrays,
    events: &[DischargeEvent],
    pattern: usize,
    window_steps: usize,
) -> anyhow::Result<Vec<DischargeWindow>> {
    if window_steps == 0 {
        bail!("Discharge windows must span at least one step");
    }
    let resolution = arrays.time().resolution() as f64;
    let windows = arrays.horizon().div_ceil(window_steps);
    let mut pairs: Vec<Vec<(f64, f64)>> = vec![vec![]; windows];

    for event in events.iter().filter(|event| event.pattern == pattern) {
        for (step, flow) in event_flows(arrays, event)? {
            pairs[step / window_steps].push((event.temperature, flow * resolution));
        }
    }

    pairs
        .into_iter()
        .enumerate()
        .map(|(window, pairs)| {
            let volume = pairs.iter().map(|(_, volume)| volume).sum::<f64>();
            let temperature = if volume > 0. {
                Some(calculate_volume_weighted_average_temperature(&pairs, None, None)?)
            } else {
                None
            };
            Ok(DischargeWindow {
                start: window * window_steps,
                volume,
                temperature,
            })
        })
        .collect()
}

/// Nutrients carried by one discharge event.
#[derive(Clone, Debug, PartialEq)]
pub struct NutrientEvent {
    /// Index of the event the nutrients belong to
    pub event: usize,
    /// Grams per use
    pub loads: NutrientLoads,
    /// Grams per litre of discharged water
    pub concentrations: NutrientLoads,
}

/// Sample the nutrient load of every discharge event whose end-use and usage have
/// configured loads.
pub fn assign_discharge_nutrients(
    events: &[DischargeEvent],
    nutrients: &NutrientStatistics,
    rng: &mut impl Rng,
) -> Result<Vec<NutrientEvent>, ConfigurationError> {
    let mut nutrient_events = vec![];
    for (index, event) in events.iter().enumerate() {
        let name: &'static str = event.end_use.into();
        let Some(means) = nutrients
            .get(name)
            .and_then(|by_usage| by_usage.get(&event.usage))
        else {
            debug!(end_use = name, usage = %event.usage, "no nutrient loads configured");
            continue;
        };

        let mut sample = |mean| truncated_normal_sample(mean, &mut *rng);
        let loads = NutrientLoads {
            n: sample(means.n)?,
            p: sample(means.p)?,
            cod: sample(means.cod)?,
            bod5: sample(means.bod5)?,
            ss: sample(means.ss)?,
            amm: sample(means.amm)?,
        };
        let concentration = |grams: f64| {
            if event.volume > 0. {
                grams / event.volume
            } else {
                0.
            }
        };
        nutrient_events.push(NutrientEvent {
            event: index,
            concentrations: NutrientLoads {
                n: concentration(loads.n),
                p: concentration(loads.p),
                cod: concentration(loads.cod),
                bod5: concentration(loads.bod5),
                ss: concentration(loads.ss),
                amm: concentration(loads.amm),
            },
            loads,
        });
    }

    Ok(nutrient_events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::consumption::ArraySlot;
    use crate::core::scheduler::Interval;
    use crate::input::EndUseKind;
    use crate::simulation_time::SimulationTime;
    use approx::assert_relative_eq;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;
    use rstest::*;

    fn event(end_use_index: usize, segments: Vec<Interval>, temperature: f64, volume: f64) -> DischargeEvent {
        DischargeEvent {
            end_use: EndUseKind::WcNormal,
            end_use_index,
            usage: "urine".into(),
            user: 0,
            pattern: 0,
            segments,
            temperature,
            volume,
        }
    }

    /// Two end-uses discharging into the same hour: 1 L/s at 30 C and 0.5 L/s at 10 C.
    #[fixture]
    fn discharged() -> (UsageArrays, Vec<DischargeEvent>) {
        let mut arrays = UsageArrays::new(SimulationTime::new(1, 60).unwrap(), 1, 2, 1, true);
        for step in 0..2 {
            arrays
                .assign_discharge(ArraySlot::new(0, 0, 0), step, 1., FlowAttribute::Raw)
                .unwrap();
            arrays
                .assign_discharge(ArraySlot::new(0, 1, 0), step + 1, 0.5, FlowAttribute::Raw)
                .unwrap();
        }
        let events = vec![
            event(0, vec![Interval::new(0, 2)], 30., 120.),
            event(1, vec![Interval::new(1, 3)], 10., 60.),
        ];
        (arrays, events)
    }

    #[test]
    fn test_valid_calculation() {
        let temp_vol_pairs = [(10., 5.), (20., 3.), (30., 2.)];
        let result = calculate_volume_weighted_average_temperature(&temp_vol_pairs, None, None).unwrap();
        assert!(is_close!(result, 17., rel_tol = 1e-10));
    }

    #[test]
    #[should_panic = "Volume mismatch: expected 5, got 10"]
    fn test_volume_validation_failure() {
        let temp_vol_pairs = [(15., 3.), (25., 7.)];
        calculate_volume_weighted_average_temperature(&temp_vol_pairs, Some(5.), None).unwrap();
    }

    #[test]
    #[should_panic = "total volume is zero"]
    fn test_zero_volume_error() {
        calculate_volume_weighted_average_temperature(&[(15., 0.), (25., 0.)], None, None).unwrap();
    }

    #[rstest]
    fn test_temperature_per_event(discharged: (UsageArrays, Vec<DischargeEvent>)) {
        let (arrays, events) = discharged;
        assert_eq!(
            discharge_temperature_per_event(&arrays, &events).unwrap(),
            vec![30., 10.]
        );
    }

    #[rstest]
    fn test_aggregate_discharge(discharged: (UsageArrays, Vec<DischargeEvent>)) {
        let (arrays, events) = discharged;
        let windows = aggregate_discharge(&arrays, &events, 0, 60).unwrap();
        assert_eq!(windows.len(), 24);
        assert_relative_eq!(windows[0].volume, 180.);
        assert_relative_eq!(windows[0].temperature.unwrap(), (30. * 120. + 10. * 60.) / 180.);
        assert_eq!(windows[1].volume, 0.);
        assert_eq!(windows[1].temperature, None);

        let per_step = aggregate_discharge(&arrays, &events, 0, 1).unwrap();
        assert_relative_eq!(per_step[1].temperature.unwrap(), (30. * 60. + 10. * 30.) / 90.);
        assert_eq!(per_step[2].temperature, Some(10.));
    }

    #[rstest]
    fn test_assign_nutrients(discharged: (UsageArrays, Vec<DischargeEvent>)) {
        let (_, mut events) = discharged;
        events[1].usage = "faeces".into();
        let nutrients: NutrientStatistics = IndexMap::from([(
            "WcNormal".to_string(),
            IndexMap::from([(
                "urine".to_string(),
                NutrientLoads {
                    n: 10.,
                    p: 1.,
                    cod: 0.,
                    bod5: 5.,
                    ss: 2.,
                    amm: 8.,
                },
            )]),
        )]);
        let mut rng = Pcg64::seed_from_u64(17);
        let assigned = assign_discharge_nutrients(&events, &nutrients, &mut rng).unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].event, 0);
        assert_eq!(assigned[0].loads.cod, 0.);
        assert!(assigned[0].loads.n >= 0.);
        assert_relative_eq!(assigned[0].concentrations.n, assigned[0].loads.n / 120.);
    }
}
