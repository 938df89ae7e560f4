use crate::core::consumption::UsageArrays;
use crate::core::end_use::discharge::DischargeEvent;
use crate::core::end_use::{EndUse, SimulationContext, SimulationFlags, UsageEvent};
use crate::core::probability::weighted_choice;
use crate::core::user::User;
use crate::errors::{ConfigurationError, SimulationError};
use crate::input::{DiurnalPatterns, EndUseKind, EndUseStatistics, HouseInput, Penetration, PresenceWeights};
use crate::simulation_time::SimulationTime;
use indexmap::IndexMap;
use rand::Rng;
use tracing::{debug, info, info_span};

/// Everything a house simulation produced.
#[derive(Debug)]
pub struct SimulationResults {
    pub house: String,
    pub users: Vec<String>,
    pub end_uses: Vec<EndUseKind>,
    pub arrays: UsageArrays,
    pub usage_events: Vec<UsageEvent>,
    pub discharge_events: Vec<DischargeEvent>,
}

#[derive(Debug)]
pub struct House {
    id: String,
    users: Vec<User>,
    appliances: Vec<EndUse>,
}

impl House {
    pub fn new(id: impl Into<String>, users: Vec<User>, appliances: Vec<EndUse>) -> Result<Self, ConfigurationError> {
        if users.is_empty() {
            return Err(ConfigurationError::NoUsers);
        }

        Ok(Self {
            id: id.into(),
            users,
            appliances,
        })
    }

    /// Build a house from input. Without a list of appliances it is furnished at random.
    pub fn from_input(
        input: &HouseInput,
        statistics: &EndUseStatistics,
        time: &SimulationTime,
        rng: &mut impl Rng,
    ) -> Result<Self, SimulationError> {
        let users = input
            .users
            .iter()
            .enumerate()
            .map(|(index, user)| User::from_input(user, format!("{}_user_{index}", input.id), time))
            .collect::<Result<Vec<_>, _>>()?;

        let appliances = match &input.appliances {
            Some(kinds) => kinds
                .iter()
                .map(|kind| EndUse::from_kind(*kind, statistics))
                .collect::<Result<Vec<_>, _>>()?,
            None => Self::furnish(statistics, users.len(), rng)?,
        };

        Ok(Self::new(&input.id, users, appliances)?)
    }

    /// Decide which end-uses a household of `household_size` owns, from their penetration.
    pub fn furnish(
        statistics: &EndUseStatistics,
        household_size: usize,
        rng: &mut impl Rng,
    ) -> Result<Vec<EndUse>, SimulationError> {
        fn owned(
            penetration: &Penetration,
            household_size: usize,
            rng: &mut impl Rng,
        ) -> Result<bool, ConfigurationError> {
            Ok(rng.random::<f64>() * 100. <= penetration.for_household(household_size)?)
        }
        fn choose_kind<T>(
            subtypes: &IndexMap<EndUseKind, T>,
            penetration: impl Fn(&T) -> f64,
            rng: &mut impl Rng,
        ) -> Result<EndUseKind, SimulationError> {
            Ok(weighted_choice(
                subtypes.iter().map(|(kind, subtype)| (*kind, penetration(subtype))),
                rng,
            )?)
        }

        let mut kinds = vec![];
        if let Some(bathtub) = &statistics.bathtub {
            if owned(&bathtub.penetration, household_size, rng)? {
                kinds.push(EndUseKind::Bathtub);
            }
        }
        if let Some(tap) = &statistics.bathroom_tap {
            if owned(&tap.penetration, household_size, rng)? {
                kinds.push(EndUseKind::BathroomTap);
            }
        }
        if let Some(tap) = &statistics.kitchen_tap {
            if owned(&tap.penetration, household_size, rng)? {
                kinds.push(EndUseKind::KitchenTap);
            }
        }
        if let Some(tap) = &statistics.outside_tap {
            if owned(&tap.penetration, household_size, rng)? {
                kinds.push(EndUseKind::OutsideTap);
            }
        }
        if let Some(shower) = &statistics.shower {
            if owned(&shower.penetration, household_size, rng)? {
                kinds.push(choose_kind(&shower.subtype, |subtype| subtype.penetration, rng)?);
            }
        }
        if let Some(dishwasher) = &statistics.dishwasher {
            if owned(&dishwasher.penetration, household_size, rng)? {
                kinds.push(EndUseKind::Dishwasher);
            }
        }
        if let Some(washing_machine) = &statistics.washing_machine {
            if owned(&washing_machine.penetration, household_size, rng)? {
                kinds.push(EndUseKind::WashingMachine);
            }
        }
        if let Some(wc) = &statistics.wc {
            if owned(&wc.penetration, household_size, rng)? {
                kinds.push(choose_kind(&wc.subtype, |subtype| subtype.penetration, rng)?);
            }
        }
        debug!(?kinds, "furnished house");

        Ok(kinds
            .into_iter()
            .map(|kind| EndUse::from_kind(kind, statistics))
            .collect::<Result<Vec<_>, _>>()?)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn appliances(&self) -> &[EndUse] {
        &self.appliances
    }

    /// Sample the presence curves of every user that was not given precomputed ones.
    pub fn compute_presence(
        &mut self,
        patterns: &DiurnalPatterns,
        weights: &PresenceWeights,
        time: &SimulationTime,
        rng: &mut impl Rng,
    ) -> Result<(), SimulationError> {
        for user in self.users.iter_mut().filter(|user| !user.has_presence()) {
            user.compute_presence(patterns, weights, time, rng)?;
        }
        Ok(())
    }

    /// Simulate every appliance, day by day, for each pattern replicate.
    pub fn simulate(
        &mut self,
        time: SimulationTime,
        patterns: usize,
        flags: SimulationFlags,
        max_scheduling_attempts: usize,
        rng: &mut impl Rng,
    ) -> Result<SimulationResults, SimulationError> {
        if patterns == 0 {
            return Err(ConfigurationError::NoPatterns.into());
        }
        let _span = info_span!("simulate", house = %self.id).entered();

        let mut arrays = UsageArrays::new(
            time,
            self.users.len(),
            self.appliances.len(),
            patterns,
            flags.contains(SimulationFlags::SIMULATE_DISCHARGE),
        );
        let mut usage_events = vec![];
        {
            let mut ctx = SimulationContext {
                arrays: &mut arrays,
                usage_events: &mut usage_events,
                time,
                flags,
                max_scheduling_attempts,
            };
            for pattern in 0..patterns {
                for (index, appliance) in self.appliances.iter_mut().enumerate() {
                    for day in 0..time.days() {
                        appliance.simulate(&mut ctx, &self.users, index, pattern, day, rng)?;
                    }
                }
            }
        }
        info!(
            house = %self.id,
            uses = usage_events.len(),
            "simulated {} patterns over {} days",
            patterns,
            time.days()
        );

        Ok(SimulationResults {
            house: self.id.clone(),
            users: self.users.iter().map(|user| user.id().to_string()).collect(),
            end_uses: self.appliances.iter().map(EndUse::kind).collect(),
            arrays,
            usage_events,
            discharge_events: self
                .appliances
                .iter_mut()
                .flat_map(EndUse::take_discharge_events)
                .collect(),
        })
    }
}
