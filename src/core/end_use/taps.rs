use crate::core::consumption::ArraySlot;
use crate::core::end_use::discharge::{
    require_discharge, simulate_interval_discharge, DischargeEvent, Intake,
};
use crate::core::end_use::{day_presence, joint_probability, summed_presence, Owner, SimulationContext};
use crate::core::patterns::daily_pattern_from_input;
use crate::core::probability::{weighted_choice, Distribution};
use crate::core::user::User;
use crate::errors::SimulationError;
use crate::input::{
    lookup_household_size, DischargeStatistics, EndUseKind, KitchenTapStatistics, TapStatistics,
    TapSubtype,
};
use crate::simulation_time::SimulationTime;
use indexmap::IndexMap;
use rand::Rng;
use std::sync::Arc;

/// A single draw of what a tap is used for, how long and how hard.
#[derive(Clone, Debug, PartialEq)]
struct TapUse<'a> {
    subtype: &'a str,
    duration: usize,
    intensity: f64,
    temperature: f64,
}

impl<'a> TapUse<'a> {
    fn sample(
        subtypes: &'a IndexMap<String, TapSubtype>,
        time: &SimulationTime,
        rng: &mut impl Rng,
    ) -> Result<Self, SimulationError> {
        let (subtype, statistics) = weighted_choice(
            subtypes
                .iter()
                .map(|(name, subtype)| ((name, subtype), subtype.penetration)),
            rng,
        )?;
        // Lognormal around the average duration: exp(mu + sigma^2 / 2) equals the average
        let seconds = Distribution::LogNormal {
            mean: statistics.duration.seconds().ln() - 0.5,
            sigma: 1.,
        }
        .sample(rng)?
        .round();

        Ok(Self {
            subtype,
            duration: time.seconds_to_steps(seconds),
            intensity: statistics.intensity.sample(rng)?,
            temperature: statistics.temperature.sample(rng)?,
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn simulate_tap_use(
    ctx: &mut SimulationContext,
    end_use: EndUseKind,
    subtypes: &IndexMap<String, TapSubtype>,
    discharge: Option<(&DischargeStatistics, &mut Vec<DischargeEvent>)>,
    prob_joint: &[f64],
    owner: &Owner,
    (end_use_index, pattern, day): (usize, usize, usize),
    rng: &mut impl Rng,
) -> Result<(), SimulationError> {
    let tap_use = TapUse::sample(subtypes, &ctx.time, rng)?;
    let Some((interval, user)) =
        ctx.schedule_use(prob_joint, day, tap_use.duration, end_use_index, pattern, owner, rng)?
    else {
        return Ok(());
    };

    let slot = ArraySlot::new(user, end_use_index, pattern);
    let volume = ctx.write_intake(end_use, slot, interval, tap_use.intensity, tap_use.temperature)?;
    if let Some((statistics, events)) = discharge {
        let intake = Intake {
            interval,
            volume,
            temperature: tap_use.temperature,
        };
        events.push(simulate_interval_discharge(
            ctx,
            statistics,
            end_use,
            tap_use.subtype,
            slot,
            intake,
            false,
            rng,
        )?);
    }

    Ok(())
}

/// Washbasin tap, used by every user on their own.
#[derive(Debug)]
pub struct BathroomTap {
    statistics: Arc<TapStatistics>,
    discharge_events: Vec<DischargeEvent>,
}

impl BathroomTap {
    pub fn new(statistics: Arc<TapStatistics>) -> Self {
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
        let discharge = if ctx.simulate_discharge() {
            Some(require_discharge(&self.statistics.discharge, EndUseKind::BathroomTap)?)
        } else {
            None
        };

        for (user_index, user) in users.iter().enumerate() {
            let frequency = self.statistics.frequency.sample_count(rng)?;
            let prob_joint = joint_probability(user.presence(weekend)?.curve(), None)?;
            for _ in 0..frequency {
                simulate_tap_use(
                    ctx,
                    EndUseKind::BathroomTap,
                    &self.statistics.subtype,
                    discharge.map(|statistics| (statistics, &mut self.discharge_events)),
                    &prob_joint,
                    &Owner::User(user_index),
                    (end_use_index, pattern, day),
                    rng,
                )?;
            }
        }

        Ok(())
    }
}

/// Kitchen tap, shared by the household and used following a daily pattern.
#[derive(Debug)]
pub struct KitchenTap {
    statistics: Arc<KitchenTapStatistics>,
    discharge_events: Vec<DischargeEvent>,
}

impl KitchenTap {
    pub fn new(statistics: Arc<KitchenTapStatistics>) -> Self {
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
        let discharge = if ctx.simulate_discharge() {
            Some(require_discharge(&self.statistics.discharge, EndUseKind::KitchenTap)?)
        } else {
            None
        };
        let frequency = lookup_household_size(
            &self.statistics.frequency,
            users.len(),
            "kitchen tap frequency",
        )?
        .sample_count(rng)?;
        if frequency == 0 {
            return Ok(());
        }

        let presence = day_presence(users, ctx.is_weekend(day))?;
        let prior = daily_pattern_from_input(&self.statistics.daily_pattern, &ctx.time)?;
        let prob_joint = joint_probability(&summed_presence(&presence), Some(&prior))?;
        for _ in 0..frequency {
            simulate_tap_use(
                ctx,
                EndUseKind::KitchenTap,
                &self.statistics.subtype,
                discharge.map(|statistics| (statistics, &mut self.discharge_events)),
                &prob_joint,
                &Owner::Household(&presence),
                (end_use_index, pattern, day),
                rng,
            )?;
        }

        Ok(())
    }
}

/// Garden tap, shared by the household. Its water does not reach the sewer.
#[derive(Debug)]
pub struct OutsideTap {
    statistics: Arc<TapStatistics>,
}

impl OutsideTap {
    pub fn new(statistics: Arc<TapStatistics>) -> Self {
        Self { statistics }
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
        let mut frequency = 0;
        for _ in users {
            frequency += self.statistics.frequency.sample_count(rng)?;
        }
        if frequency == 0 {
            return Ok(());
        }

        let presence = day_presence(users, ctx.is_weekend(day))?;
        let prob_joint = joint_probability(&summed_presence(&presence), None)?;
        for _ in 0..frequency {
            simulate_tap_use(
                ctx,
                EndUseKind::OutsideTap,
                &self.statistics.subtype,
                None,
                &prob_joint,
                &Owner::Household(&presence),
                (end_use_index, pattern, day),
                rng,
            )?;
        }

        Ok(())
    }
}
