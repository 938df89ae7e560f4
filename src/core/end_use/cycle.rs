//! Dishwashers and washing machines: appliances that run a fixed programme once started.

use crate::core::consumption::{ArraySlot, FlowAttribute};
use crate::core::end_use::discharge::{require_discharge, simulate_cycle_discharge, DischargeEvent};
use crate::core::end_use::{
    day_presence, joint_probability, summed_presence, Owner, SimulationContext, UsageEvent,
};
use crate::core::patterns::{
    complex_discharge_pattern, daily_pattern_from_input, downsample_flow, enduse_cycle_pattern,
};
use crate::core::units::COLD_WATER_TEMPERATURE;
use crate::core::user::User;
use crate::errors::{ConfigurationError, SimulationError};
use crate::input::{lookup_household_size, CycleApplianceStatistics, EndUseKind};
use rand::Rng;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct CycleAppliance {
    kind: EndUseKind,
    statistics: Arc<CycleApplianceStatistics>,
    /// Intake of a single cycle, for every second of its runtime
    intake: Vec<f64>,
    discharge_events: Vec<DischargeEvent>,
}

impl CycleAppliance {
    pub fn new(
        kind: EndUseKind,
        statistics: Arc<CycleApplianceStatistics>,
    ) -> Result<Self, ConfigurationError> {
        let intake = enduse_cycle_pattern(&statistics.enduse_pattern)?;

        Ok(Self {
            kind,
            statistics,
            intake,
            discharge_events: vec![],
        })
    }

    pub fn kind(&self) -> EndUseKind {
        self.kind
    }

    /// Litres taken in by one cycle
    pub fn cycle_volume(&self) -> f64 {
        self.intake.iter().sum()
    }

    pub(crate) fn take_discharge_events(&mut self) -> Vec<DischargeEvent> {
        std::mem::take(&mut self.discharge_events)
    }

    /// Number of cycles the household runs today. The configured frequency is per inhabitant.
    fn sample_frequency(&self, users: usize, rng: &mut impl Rng) -> Result<usize, ConfigurationError> {
        let per_inhabitant = lookup_household_size(
            &self.statistics.frequency,
            users,
            &format!("{} frequency", self.kind),
        )?;
        let mut frequency = 0;
        for _ in 0..users {
            frequency += per_inhabitant.sample_count(rng)?;
        }
        Ok(frequency)
    }

    pub fn simulate(
        &mut self,
        ctx: &mut SimulationContext,
        users: &[User],
        end_use_index: usize,
        pattern: usize,
        day: usize,
        rng: &mut impl Rng,
    ) -> Result<(), SimulationError> {
        let frequency = self.sample_frequency(users.len(), rng)?;
        if frequency == 0 {
            return Ok(());
        }

        let weekend = ctx.is_weekend(day);
        let daily_pattern = match &self.statistics.daily_pattern_weekend {
            Some(weekend_pattern) if weekend => weekend_pattern,
            _ => &self.statistics.daily_pattern,
        };
        let prior = daily_pattern_from_input(daily_pattern, &ctx.time)?;
        let presence = day_presence(users, weekend)?;
        let prob_joint = joint_probability(&summed_presence(&presence), Some(&prior))?;

        let resolution = ctx.time.resolution();
        let intake = downsample_flow(&self.intake, resolution);
        let discharge = if ctx.simulate_discharge() {
            let statistics = require_discharge(&self.statistics.discharge, self.kind)?;
            let discharge_time = statistics.discharge_time.seconds().round() as usize;
            let temperature = match &statistics.discharge_temperature {
                Some(distribution) => distribution.sample(rng)?,
                None => COLD_WATER_TEMPERATURE,
            };
            Some((
                downsample_flow(&complex_discharge_pattern(&self.intake, discharge_time), resolution),
                temperature,
            ))
        } else {
            None
        };

        for _ in 0..frequency {
            let Some((interval, user)) = ctx.schedule_use(
                &prob_joint,
                day,
                intake.len(),
                end_use_index,
                pattern,
                &Owner::Household(&presence),
                rng,
            )?
            else {
                continue;
            };
            debug!(end_use = %self.kind, user, start = interval.start, "cycle started");

            let slot = ArraySlot::new(user, end_use_index, pattern);
            let spillover = ctx.spillover();
            let horizon = ctx.arrays.horizon();
            ctx.arrays
                .write_day_pattern(slot, interval.start, &intake, day, spillover, FlowAttribute::Raw)?;
            ctx.usage_events.push(UsageEvent {
                end_use: self.kind,
                end_use_index,
                user,
                pattern,
                start: interval.start,
                end: interval.end.min(horizon),
                wrapped: if spillover {
                    interval.wrapped_tail(horizon)
                } else {
                    None
                },
                intensity: self.statistics.enduse_pattern.intensity,
                temperature: COLD_WATER_TEMPERATURE,
            });

            if let Some((flows, temperature)) = &discharge {
                self.discharge_events.push(simulate_cycle_discharge(
                    ctx,
                    self.kind,
                    slot,
                    interval.start,
                    flows,
                    *temperature,
                )?);
            }
        }

        Ok(())
    }
}
