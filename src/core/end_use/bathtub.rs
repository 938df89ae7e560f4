use crate::core::consumption::ArraySlot;
use crate::core::end_use::discharge::{
    require_discharge, simulate_interval_discharge, DischargeEvent, Intake,
};
use crate::core::end_use::{joint_probability, Owner, SimulationContext};
use crate::core::user::User;
use crate::errors::{ConfigurationError, SimulationError};
use crate::input::{BathtubStatistics, EndUseKind};
use rand::Rng;
use std::sync::Arc;

#[derive(Debug)]
pub struct Bathtub {
    statistics: Arc<BathtubStatistics>,
    discharge_events: Vec<DischargeEvent>,
}

impl Bathtub {
    pub fn new(statistics: Arc<BathtubStatistics>) -> Self {
        Self {
            statistics,
            discharge_events: vec![],
        }
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
        let duration = ctx.time.seconds_to_steps(self.statistics.duration.seconds());

        for (user_index, user) in users.iter().enumerate() {
            let frequency = self
                .statistics
                .frequency
                .get(&user.age())
                .ok_or_else(|| ConfigurationError::missing("bathtub frequency", user.age().to_string()))?
                .sample_count(rng)?;
            if frequency == 0 {
                continue;
            }
            let prob_joint = joint_probability(user.presence(weekend)?.curve(), None)?;

            for _ in 0..frequency {
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
                let temperature = self.statistics.temperature.sample(rng)?;
                let slot = ArraySlot::new(user_index, end_use_index, pattern);
                let volume = ctx.write_intake(
                    EndUseKind::Bathtub,
                    slot,
                    interval,
                    self.statistics.intensity,
                    temperature,
                )?;

                if ctx.simulate_discharge() {
                    let statistics = require_discharge(&self.statistics.discharge, EndUseKind::Bathtub)?;
                    let intake = Intake {
                        interval,
                        volume,
                        temperature,
                    };
                    self.discharge_events.push(simulate_interval_discharge(
                        ctx,
                        statistics,
                        EndUseKind::Bathtub,
                        EndUseKind::Bathtub.into(),
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
