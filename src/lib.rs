#[macro_use]
extern crate is_close;

pub mod core;
pub mod errors;
pub mod input;
pub mod output;
pub mod simulation_time;
mod statistics;
#[cfg(test)]
mod tests;

use crate::core::consumption::FlowAttribute;
use crate::core::end_use::SimulationFlags;
use crate::core::house::{House, SimulationResults};
use crate::core::wastewater::{
    aggregate_discharge, assign_discharge_nutrients, discharge_temperature_per_event, NutrientEvent,
};
use crate::input::{ingest_input, HouseInput, Input};
use crate::output::Output;
use crate::simulation_time::SimulationTime;
use crate::statistics::{mean, percentile};
use anyhow::Context;
use bitflags::bitflags;
use csv::WriterBuilder;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use rayon::prelude::*;
use std::io::{Read, Write};
use tracing::info;

bitflags! {
    /// Switches that can be set for a run on top of what the input asks for.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ProjectFlags: u8 {
        const SIMULATE_DISCHARGE = 0b1;
        const SPILLOVER = 0b10;
        const INCLUDE_WEEKEND = 0b100;
        const SKIP_EVENT_OUTPUT = 0b1000;
    }
}

/// Settings of a run that replace the ones in the input.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunOverrides {
    pub seed: Option<u64>,
    pub days: Option<usize>,
    pub patterns: Option<usize>,
}

/// Results of one house, with the nutrient loads of its discharge if they were configured.
#[derive(Debug)]
pub struct HouseResults {
    pub simulation: SimulationResults,
    pub nutrients: Option<Vec<NutrientEvent>>,
}

/// Settings shared by every house of a run.
#[derive(Clone, Copy, Debug)]
struct RunSettings {
    time: SimulationTime,
    patterns: usize,
    flags: SimulationFlags,
    seed: u64,
}

pub fn run_project(
    input: impl Read,
    output: impl Output,
    overrides: &RunOverrides,
    flags: &ProjectFlags,
) -> anyhow::Result<Vec<HouseResults>> {
    let input = ingest_input(input)?;
    let settings = run_settings(&input, overrides, flags)?;
    info!(
        houses = input.houses.len(),
        days = settings.time.days(),
        patterns = settings.patterns,
        seed = settings.seed,
        "starting simulation"
    );

    let results = input
        .houses
        .par_iter()
        .enumerate()
        .map(|(index, house)| simulate_house(&input, house, index, &settings))
        .collect::<anyhow::Result<Vec<_>>>()?;

    if !output.is_noop() {
        for house in &results {
            write_house_outputs(&output, house, flags)?;
        }
        let writer = output.writer_for_location_key("summary")?;
        write_summary(writer, &results)?;
    }

    Ok(results)
}

fn run_settings(input: &Input, overrides: &RunOverrides, flags: &ProjectFlags) -> anyhow::Result<RunSettings> {
    let time = match overrides.days {
        Some(days) => SimulationTime::new(days, input.simulation.time.resolution())?,
        None => input.simulation.time,
    };
    let patterns = overrides.patterns.unwrap_or(input.simulation.patterns);
    if patterns == 0 {
        anyhow::bail!("At least one pattern replicate must be simulated");
    }
    let seed = overrides
        .seed
        .or(input.simulation.seed)
        .unwrap_or_else(rand::random::<u64>);

    let mut simulation_flags = SimulationFlags::empty();
    simulation_flags.set(
        SimulationFlags::SIMULATE_DISCHARGE,
        input.simulation.simulate_discharge || flags.contains(ProjectFlags::SIMULATE_DISCHARGE),
    );
    simulation_flags.set(
        SimulationFlags::SPILLOVER,
        input.simulation.spillover || flags.contains(ProjectFlags::SPILLOVER),
    );
    simulation_flags.set(
        SimulationFlags::INCLUDE_WEEKEND,
        input.simulation.include_weekend || flags.contains(ProjectFlags::INCLUDE_WEEKEND),
    );

    Ok(RunSettings {
        time,
        patterns,
        flags: simulation_flags,
        seed,
    })
}

/// Simulate a single house with its own generator, so that every house is reproducible
/// on its own regardless of how the houses are spread over threads.
fn simulate_house(
    input: &Input,
    house_input: &HouseInput,
    index: usize,
    settings: &RunSettings,
) -> anyhow::Result<HouseResults> {
    let mut rng = Pcg64::seed_from_u64(settings.seed.wrapping_add(index as u64));
    let context = || format!("Simulating house '{}'", house_input.id);

    let mut house = House::from_input(house_input, &input.end_uses, &settings.time, &mut rng)
        .with_context(context)?;
    house
        .compute_presence(
            &input.diurnal_patterns,
            &input.presence_weights,
            &settings.time,
            &mut rng,
        )
        .with_context(context)?;
    let simulation = house
        .simulate(
            settings.time,
            settings.patterns,
            settings.flags,
            input.simulation.max_scheduling_attempts,
            &mut rng,
        )
        .with_context(context)?;

    let nutrients = match &input.nutrients {
        Some(nutrients) if settings.flags.contains(SimulationFlags::SIMULATE_DISCHARGE) => Some(
            assign_discharge_nutrients(&simulation.discharge_events, nutrients, &mut rng)
                .with_context(context)?,
        ),
        _ => None,
    };

    Ok(HouseResults {
        simulation,
        nutrients,
    })
}

fn write_house_outputs(output: &impl Output, house: &HouseResults, flags: &ProjectFlags) -> anyhow::Result<()> {
    let results = &house.simulation;
    let key = |suffix: &str| format!("{}__{suffix}", results.house);

    write_consumption(output.writer_for_location_key(&key("consumption"))?, results)?;
    if results.arrays.discharge().is_some() {
        write_discharge(output.writer_for_location_key(&key("discharge"))?, results)?;
    }
    if !flags.contains(ProjectFlags::SKIP_EVENT_OUTPUT) {
        write_usage_events(output.writer_for_location_key(&key("events"))?, results)?;
        if results.arrays.discharge().is_some() {
            write_discharge_events(output.writer_for_location_key(&key("discharge_events"))?, results)?;
        }
    }
    if let Some(nutrients) = &house.nutrients {
        write_nutrients(output.writer_for_location_key(&key("nutrients"))?, results, nutrients)?;
    }

    Ok(())
}

/// Per-step flows of a house: the total, each end-use and the hot water equivalent.
pub fn write_consumption(writer: impl Write, results: &SimulationResults) -> anyhow::Result<()> {
    let mut writer = WriterBuilder::new().flexible(true).from_writer(writer);
    let arrays = &results.arrays;

    let mut headings = vec!["Pattern".to_string(), "Step".into(), "Total".into()];
    let mut units_row = vec!["[count]", "[count]", "[L/s]"];
    for end_use in &results.end_uses {
        headings.push(end_use.to_string());
        units_row.push("[L/s]");
    }
    headings.push("Hot water equivalent".into());
    units_row.push("[L/s]");
    writer.write_record(&headings)?;
    writer.write_record(&units_row)?;

    for pattern in 0..arrays.patterns() {
        let total = arrays.house_pattern(pattern, FlowAttribute::Raw);
        let hot_equivalent = arrays.house_pattern(pattern, FlowAttribute::HotEquivalent);
        let end_uses = (0..arrays.end_uses())
            .map(|end_use| arrays.end_use_series(end_use, pattern, FlowAttribute::Raw))
            .collect::<Vec<_>>();

        for step in 0..arrays.horizon() {
            let mut row = vec![pattern.to_string(), step.to_string(), total[step].to_string()];
            row.extend(end_uses.iter().map(|series| series[step].to_string()));
            row.push(hot_equivalent[step].to_string());
            writer.write_record(&row)?;
        }
    }
    writer.flush()?;

    Ok(())
}

/// Per-step discharge of a house with its flow-weighted temperature.
pub fn write_discharge(writer: impl Write, results: &SimulationResults) -> anyhow::Result<()> {
    let mut writer = WriterBuilder::new().flexible(true).from_writer(writer);
    let arrays = &results.arrays;

    writer.write_record(["Pattern", "Step", "Discharge", "Hot water equivalent", "Temperature"])?;
    writer.write_record(["[count]", "[count]", "[L/s]", "[L/s]", "[Celsius]"])?;
    for pattern in 0..arrays.patterns() {
        let (Some(total), Some(hot_equivalent)) = (
            arrays.house_discharge(pattern, FlowAttribute::Raw),
            arrays.house_discharge(pattern, FlowAttribute::HotEquivalent),
        ) else {
            anyhow::bail!("No discharge was simulated for house '{}'", results.house);
        };
        let windows = aggregate_discharge(arrays, &results.discharge_events, pattern, 1)?;

        for step in 0..arrays.horizon() {
            writer.write_record([
                pattern.to_string(),
                step.to_string(),
                total[step].to_string(),
                hot_equivalent[step].to_string(),
                windows[step]
                    .temperature
                    .map(|temperature| temperature.to_string())
                    .unwrap_or_default(),
            ])?;
        }
    }
    writer.flush()?;

    Ok(())
}

pub fn write_usage_events(writer: impl Write, results: &SimulationResults) -> anyhow::Result<()> {
    let mut writer = WriterBuilder::new().flexible(true).from_writer(writer);
    let resolution = results.arrays.time().resolution() as f64;

    writer.write_record([
        "End-use",
        "User",
        "Pattern",
        "Start",
        "End",
        "Intensity",
        "Temperature",
        "Volume",
    ])?;
    writer.write_record(["", "", "[count]", "[count]", "[count]", "[L/s]", "[Celsius]", "[L]"])?;
    for event in &results.usage_events {
        let volume = event.intensity * event.steps() as f64 * resolution;
        writer.write_record([
            event.end_use.to_string(),
            results.users[event.user].clone(),
            event.pattern.to_string(),
            event.start.to_string(),
            event.end.to_string(),
            event.intensity.to_string(),
            event.temperature.to_string(),
            volume.to_string(),
        ])?;
    }
    writer.flush()?;

    Ok(())
}

pub fn write_discharge_events(writer: impl Write, results: &SimulationResults) -> anyhow::Result<()> {
    let mut writer = WriterBuilder::new().flexible(true).from_writer(writer);
    let temperatures = discharge_temperature_per_event(&results.arrays, &results.discharge_events)?;

    writer.write_record([
        "End-use", "Usage", "User", "Pattern", "Start", "End", "Temperature", "Volume",
    ])?;
    writer.write_record(["", "", "", "[count]", "[count]", "[count]", "[Celsius]", "[L]"])?;
    for (event, temperature) in results.discharge_events.iter().zip(temperatures) {
        writer.write_record([
            event.end_use.to_string(),
            event.usage.clone(),
            results.users[event.user].clone(),
            event.pattern.to_string(),
            event.start().map(|start| start.to_string()).unwrap_or_default(),
            event.end().map(|end| end.to_string()).unwrap_or_default(),
            temperature.to_string(),
            event.volume.to_string(),
        ])?;
    }
    writer.flush()?;

    Ok(())
}

pub fn write_nutrients(
    writer: impl Write,
    results: &SimulationResults,
    nutrients: &[NutrientEvent],
) -> anyhow::Result<()> {
    let mut writer = WriterBuilder::new().flexible(true).from_writer(writer);
    let names = ["n", "p", "cod", "bod5", "ss", "amm"];

    let mut headings = vec!["End-use".to_string(), "Usage".into(), "User".into(), "Pattern".into()];
    headings.extend(names.iter().map(|name| format!("{name} load")));
    headings.extend(names.iter().map(|name| format!("{name} concentration")));
    writer.write_record(&headings)?;

    for nutrient_event in nutrients {
        let event = &results.discharge_events[nutrient_event.event];
        let loads = &nutrient_event.loads;
        let concentrations = &nutrient_event.concentrations;
        let mut row = vec![
            event.end_use.to_string(),
            event.usage.clone(),
            results.users[event.user].clone(),
            event.pattern.to_string(),
        ];
        for values in [loads, concentrations] {
            row.extend(
                [values.n, values.p, values.cod, values.bod5, values.ss, values.amm]
                    .iter()
                    .map(|value| value.to_string()),
            );
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;

    Ok(())
}

/// Mean daily volume of every house, followed by percentiles across the houses.
pub fn write_summary(writer: impl Write, results: &[HouseResults]) -> anyhow::Result<()> {
    let mut writer = WriterBuilder::new().flexible(true).from_writer(writer);
    writer.write_record(["House", "Daily volume"])?;
    writer.write_record(["", "[L/day]"])?;

    let daily_volumes = results
        .iter()
        .map(|house| daily_volume(&house.simulation))
        .collect::<Vec<_>>();
    for (house, volume) in results.iter().zip(&daily_volumes) {
        writer.write_record([house.simulation.house.clone(), volume.to_string()])?;
    }

    if let Some(mean) = mean(&daily_volumes) {
        writer.write_record(["mean".to_string(), mean.to_string()])?;
        for p in [5, 50, 95] {
            writer.write_record([format!("p{p}"), percentile(&daily_volumes, p).to_string()])?;
        }
    }
    writer.flush()?;

    Ok(())
}

/// Litres per day drawn by a house, averaged over its pattern replicates.
pub fn daily_volume(results: &SimulationResults) -> f64 {
    let arrays = &results.arrays;
    let time = arrays.time();
    let total = (0..arrays.patterns())
        .map(|pattern| arrays.house_pattern(pattern, FlowAttribute::Raw).sum())
        .sum::<f64>()
        * time.resolution() as f64;

    total / (arrays.patterns() * time.days()) as f64
}
