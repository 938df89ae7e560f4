use crate::core::consumption::ArraySlot;
use crate::core::end_use::discharge::{
    require_discharge, simulate_interval_discharge, DischargeEvent, Intake,
};
use crate::core::end_use::{joint_probability, Owner, SimulationContext};
use crate::core::units::minutes_to_seconds;
use crate::core::user::User;
use crate::errors::{ConfigurationError, SimulationError};
use crate::input::{EndUseKind, ShowerStatistics, ShowerSubtype};
use rand::Rng;
use std::sync::Arc;

/// A shower of one of the configured kinds, used by every user on their own.
#[derive(Debug)]
pub struct Shower {
    kind: EndUseKind,
    statistics: Arc<ShowerStatistics>,
    discharge_events: Vec<DischargeEvent>,
}

impl Shower {
    pub fn new(kind: EndUseKind, statistics: Arc<ShowerStatistics>) -> Result<Self, ConfigurationError> {
        if !statistics.subtype.contains_key(&kind) {
            return Err(ConfigurationError::missing("shower subtypes", kind.to_string()));
        }

        Ok(Self {
            kind,
            statistics,
            discharge_events: vec![],
        })
    }

    pub fn kind(&self) -> EndUseKind {
        self.kind
    }

    fn subtype(&self) -> Result<&ShowerSubtype, ConfigurationError> {
        self.statistics
            .subtype
            .get(&self.kind)
            .ok_or_else(|| ConfigurationError::missing("shower subtypes", self.kind.to_string()))
    }

    pub(crate) fn take_discharge_events(&mut self) -> Vec<DischargeEvent> {
        std::mem::take(&mut self.discharge_events)
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
        let weekend = ctx.is_weekend(day);
        let subtype = self.subtype()?.clone();

        for (user_index, user) in users.iter().enumerate() {
            let age = user.age();
            let frequency = self
                .statistics
                .frequency
                .get(&age)
                .ok_or_else(|| ConfigurationError::missing("shower frequency", age.to_string()))?
                .sample_count(rng)?;
            if frequency == 0 {
                continue;
            }
            let duration_distribution = self
                .statistics
                .duration
                .get(&age)
                .ok_or_else(|| ConfigurationError::missing("shower duration", age.to_string()))?;
            let prob_joint = joint_probability(user.presence(weekend)?.curve(), None)?;

            for _ in 0..frequency {
                let minutes = duration_distribution.sample(rng)?.round().max(0.);
                let duration = ctx.time.seconds_to_steps(minutes_to_seconds(minutes));
                let Some((interval, user_index)) = ctx.schedule_use(
                    &prob_joint,
                    day,
                    duration,
                    end_use_index,
                    pattern,
                    &Owner::User(user_index),
                    rng,
                )?
                else {
                    continue;
                };
                let temperature = subtype.temperature.sample(rng)?;
                let slot = ArraySlot::new(user_index, end_use_index, pattern);
                let volume = ctx.write_intake(self.kind, slot, interval, subtype.intensity, temperature)?;

                if ctx.simulate_discharge() {
                    let statistics = require_discharge(&self.statistics.discharge, self.kind)?;
                    let intake = Intake {
                        interval,
                        volume,
                        temperature,
                    };
                    self.discharge_events.push(simulate_interval_discharge(
                        ctx,
                        statistics,
                        self.kind,
                        self.kind.into(),
                        slot,
                        intake,
                        false,
                        rng,
                    )?);
                }
            }
        }

        Ok(())
    }
}
