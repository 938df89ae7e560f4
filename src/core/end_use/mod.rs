//! Water-using appliances and the way each of them schedules and writes its uses.

pub mod bathtub;
pub mod cycle;
pub mod discharge;
pub mod misc;
pub mod shower;
pub mod taps;
pub mod wc;

use crate::core::consumption::{ArraySlot, FlowAttribute, UsageArrays};
use crate::core::end_use::bathtub::Bathtub;
use crate::core::end_use::cycle::CycleAppliance;
use crate::core::end_use::discharge::DischargeEvent;
use crate::core::end_use::misc::hot_water_equivalent;
use crate::core::end_use::shower::Shower;
use crate::core::end_use::taps::{BathroomTap, KitchenTap, OutsideTap};
use crate::core::end_use::wc::Wc;
use crate::core::probability::{normalize, weighted_choice};
use crate::core::scheduler::{sample_start_time, Interval, SchedulingError};
use crate::core::user::User;
use crate::errors::{ConfigurationError, SimulationError};
use crate::input::{EndUseKind, EndUseStatistics};
use crate::simulation_time::SimulationTime;
use bitflags::bitflags;
use itertools::Itertools;
use rand::Rng;
use std::sync::Arc;
use strum::Display;
use tracing::{trace, warn};

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct SimulationFlags: u8 {
        const SIMULATE_DISCHARGE = 0b1;
        const SPILLOVER = 0b10;
        const INCLUDE_WEEKEND = 0b100;
    }
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum WastewaterKind {
    Greywater,
    Blackwater,
}

/// One accepted intake event.
#[derive(Clone, Debug, PartialEq)]
pub struct UsageEvent {
    pub end_use: EndUseKind,
    pub end_use_index: usize,
    pub user: usize,
    pub pattern: usize,
    pub start: usize,
    pub end: usize,
    /// Continuation at the start of the horizon of a use that ran past its end
    pub wrapped: Option<Interval>,
    /// Litres per second
    pub intensity: f64,
    pub temperature: f64,
}

impl UsageEvent {
    pub fn interval(&self) -> Interval {
        Interval::new(self.start, self.end)
    }

    /// Every range of steps the use was written to.
    pub fn intervals(&self) -> impl Iterator<Item = Interval> {
        std::iter::once(self.interval()).chain(self.wrapped)
    }

    /// Number of steps the use was written to.
    pub fn steps(&self) -> usize {
        self.intervals().map(|interval| interval.len()).sum()
    }
}

/// Everything an end-use needs to write one day of one pattern replicate.
pub struct SimulationContext<'a> {
    pub arrays: &'a mut UsageArrays,
    pub usage_events: &'a mut Vec<UsageEvent>,
    pub time: SimulationTime,
    pub flags: SimulationFlags,
    pub max_scheduling_attempts: usize,
}

impl SimulationContext<'_> {
    pub fn spillover(&self) -> bool {
        self.flags.contains(SimulationFlags::SPILLOVER)
    }

    pub fn simulate_discharge(&self) -> bool {
        self.flags.contains(SimulationFlags::SIMULATE_DISCHARGE)
    }

    /// Whether the weekend presence and patterns apply to `day`.
    pub fn is_weekend(&self, day: usize) -> bool {
        self.flags.contains(SimulationFlags::INCLUDE_WEEKEND) && self.time.is_weekend_day(day)
    }

    /// Draw a start time for a use of `duration` steps that does not collide with earlier
    /// uses of the same end-use, and resolve which user the use belongs to. Uses of a
    /// household end-use are checked against the uses of every user.
    ///
    /// Returns `None`, after logging, if no free start time was found.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn schedule_use(
        &self,
        prob_joint: &[f64],
        day: usize,
        duration: usize,
        end_use_index: usize,
        pattern: usize,
        owner: &Owner,
        rng: &mut impl Rng,
    ) -> Result<Option<(Interval, usize)>, SimulationError> {
        let user = match owner {
            Owner::User(user) => Some(*user),
            Owner::Household(_) => None,
        };
        let previous = self
            .usage_events
            .iter()
            .filter(|event| {
                event.end_use_index == end_use_index
                    && event.pattern == pattern
                    && user.map_or(true, |user| event.user == user)
            })
            .flat_map(UsageEvent::intervals)
            .collect_vec();

        let interval = match sample_start_time(
            prob_joint,
            day,
            duration,
            &previous,
            self.spillover().then_some(self.arrays.horizon()),
            self.max_scheduling_attempts,
            rng,
        ) {
            Ok(interval) => interval,
            Err(err @ SchedulingError::NoSlotFound { .. }) => {
                warn!(end_use_index, ?user, pattern, "Skipping use: {err}");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let user = match owner {
            Owner::User(user) => *user,
            Owner::Household(presence) => {
                attribute_user(presence, interval.start - self.time.day_offset(day), rng)?
            }
        };

        Ok(Some((interval, user)))
    }

    /// Write a use with constant intensity and return the volume drawn, in litres.
    ///
    /// A use that runs past the end of the simulated horizon continues at the first step
    /// when spillover is enabled, and is cut off otherwise.
    pub(crate) fn write_intake(
        &mut self,
        end_use: EndUseKind,
        slot: ArraySlot,
        interval: Interval,
        intensity: f64,
        temperature: f64,
    ) -> Result<f64, SimulationError> {
        let horizon = self.arrays.horizon();
        let hot_equivalent = hot_water_equivalent(intensity, temperature);
        let first = Interval::new(interval.start, interval.end.min(horizon));
        let wrapped = if self.spillover() {
            interval.wrapped_tail(horizon)
        } else {
            if interval.end > horizon {
                trace!(?interval, horizon, "cutting off use at the end of the simulation");
            }
            None
        };

        for part in std::iter::once(&first).chain(&wrapped) {
            self.arrays
                .accumulate(slot, intensity, part.start, part.end, FlowAttribute::Raw)?;
            if hot_equivalent > 0. {
                self.arrays.accumulate(
                    slot,
                    hot_equivalent,
                    part.start,
                    part.end,
                    FlowAttribute::HotEquivalent,
                )?;
            }
        }
        self.usage_events.push(UsageEvent {
            end_use,
            end_use_index: slot.end_use,
            user: slot.user,
            pattern: slot.pattern,
            start: first.start,
            end: first.end,
            wrapped,
            intensity,
            temperature,
        });

        let steps = first.len() + wrapped.map_or(0, |part| part.len());
        Ok(intensity * self.time.steps_to_seconds(steps))
    }
}

/// Who a use is scheduled for: a single user, or the whole household, given the presence
/// of each of its users.
pub(crate) enum Owner<'a> {
    User(usize),
    Household(&'a [&'a [f64]]),
}

/// Presence curves of all users for the given kind of day.
pub(crate) fn day_presence(users: &[User], weekend: bool) -> Result<Vec<&[f64]>, ConfigurationError> {
    users
        .iter()
        .map(|user| Ok(user.presence(weekend)?.curve()))
        .collect()
}

/// Element-wise product of a presence curve and a usage prior, normalized.
pub(crate) fn joint_probability(presence: &[f64], prior: Option<&[f64]>) -> Result<Vec<f64>, SimulationError> {
    let joint = match prior {
        Some(prior) => presence.iter().zip(prior).map(|(p, q)| p * q).collect_vec(),
        None => presence.to_vec(),
    };
    Ok(normalize(&joint)?)
}

/// Presence of the whole household: the sum of every user's presence.
pub(crate) fn summed_presence(presence: &[&[f64]]) -> Vec<f64> {
    let steps = presence.first().map_or(0, |curve| curve.len());
    (0..steps)
        .map(|step| presence.iter().map(|curve| curve[step]).sum())
        .collect()
}

/// Pick the user a shared end-use's use belongs to, weighted by who is likely to be home
/// at the start of the use.
pub(crate) fn attribute_user(
    presence: &[&[f64]],
    step_in_day: usize,
    rng: &mut impl Rng,
) -> Result<usize, SimulationError> {
    Ok(weighted_choice(
        presence
            .iter()
            .enumerate()
            .map(|(user, curve)| (user, curve[step_in_day])),
        rng,
    )?)
}

/// An end-use installed in a house.
#[derive(Debug)]
pub enum EndUse {
    Bathtub(Bathtub),
    BathroomTap(BathroomTap),
    KitchenTap(KitchenTap),
    OutsideTap(OutsideTap),
    Shower(Shower),
    Dishwasher(CycleAppliance),
    WashingMachine(CycleAppliance),
    Wc(Wc),
}

impl EndUse {
    pub fn from_kind(kind: EndUseKind, statistics: &EndUseStatistics) -> Result<Self, ConfigurationError> {
        fn required<T>(statistics: &Option<Arc<T>>, kind: EndUseKind) -> Result<Arc<T>, ConfigurationError> {
            statistics
                .clone()
                .ok_or_else(|| ConfigurationError::MissingStatistics(kind.to_string()))
        }

        Ok(match kind {
            EndUseKind::Bathtub => Self::Bathtub(Bathtub::new(required(&statistics.bathtub, kind)?)),
            EndUseKind::BathroomTap => {
                Self::BathroomTap(BathroomTap::new(required(&statistics.bathroom_tap, kind)?))
            }
            EndUseKind::KitchenTap => {
                Self::KitchenTap(KitchenTap::new(required(&statistics.kitchen_tap, kind)?))
            }
            EndUseKind::OutsideTap => {
                Self::OutsideTap(OutsideTap::new(required(&statistics.outside_tap, kind)?))
            }
            EndUseKind::NormalShower | EndUseKind::FancyShower => {
                Self::Shower(Shower::new(kind, required(&statistics.shower, kind)?)?)
            }
            EndUseKind::Dishwasher => Self::Dishwasher(CycleAppliance::new(
                kind,
                required(&statistics.dishwasher, kind)?,
            )?),
            EndUseKind::WashingMachine => Self::WashingMachine(CycleAppliance::new(
                kind,
                required(&statistics.washing_machine, kind)?,
            )?),
            EndUseKind::WcNormal | EndUseKind::WcNormalSave | EndUseKind::WcNew | EndUseKind::WcNewSave => {
                Self::Wc(Wc::new(kind, required(&statistics.wc, kind)?)?)
            }
        })
    }

    pub fn kind(&self) -> EndUseKind {
        match self {
            Self::Bathtub(_) => EndUseKind::Bathtub,
            Self::BathroomTap(_) => EndUseKind::BathroomTap,
            Self::KitchenTap(_) => EndUseKind::KitchenTap,
            Self::OutsideTap(_) => EndUseKind::OutsideTap,
            Self::Shower(shower) => shower.kind(),
            Self::Dishwasher(appliance) | Self::WashingMachine(appliance) => appliance.kind(),
            Self::Wc(wc) => wc.kind(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().into()
    }

    pub fn wastewater(&self) -> WastewaterKind {
        match self {
            Self::Wc(_) => WastewaterKind::Blackwater,
            _ => WastewaterKind::Greywater,
        }
    }

    /// Simulate the uses of one day of one pattern replicate.
    pub fn simulate(
        &mut self,
        ctx: &mut SimulationContext,
        users: &[User],
        end_use_index: usize,
        pattern: usize,
        day: usize,
        rng: &mut impl Rng,
    ) -> Result<(), SimulationError> {
        match self {
            Self::Bathtub(bathtub) => bathtub.simulate(ctx, users, end_use_index, pattern, day, rng),
            Self::BathroomTap(tap) => tap.simulate(ctx, users, end_use_index, pattern, day, rng),
            Self::KitchenTap(tap) => tap.simulate(ctx, users, end_use_index, pattern, day, rng),
            Self::OutsideTap(tap) => tap.simulate(ctx, users, end_use_index, pattern, day, rng),
            Self::Shower(shower) => shower.simulate(ctx, users, end_use_index, pattern, day, rng),
            Self::Dishwasher(appliance) | Self::WashingMachine(appliance) => {
                appliance.simulate(ctx, users, end_use_index, pattern, day, rng)
            }
            Self::Wc(wc) => wc.simulate(ctx, users, end_use_index, pattern, day, rng),
        }
    }

    /// Hand over the discharge events recorded so far, leaving none behind.
    pub fn take_discharge_events(&mut self) -> Vec<DischargeEvent> {
        match self {
            Self::Bathtub(bathtub) => bathtub.take_discharge_events(),
            Self::BathroomTap(tap) => tap.take_discharge_events(),
            Self::KitchenTap(tap) => tap.take_discharge_events(),
            Self::OutsideTap(_) => vec![],
            Self::Shower(shower) => shower.take_discharge_events(),
            Self::Dishwasher(appliance) | Self::WashingMachine(appliance) => {
                appliance.take_discharge_events()
            }
            Self::Wc(wc) => wc.take_discharge_events(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_joint_probability() {
        let joint = joint_probability(&[0.25, 0.25, 0.5, 0.], Some(&[0., 2., 1., 1.])).unwrap();
        assert_eq!(joint, vec![0., 0.5, 0.5, 0.]);
        assert!(joint_probability(&[0.5, 0.5], Some(&[0., 0.])).is_err());
    }

    #[test]
    fn test_summed_presence() {
        let first = [0.5, 0.5, 0.];
        let second = [0., 0.25, 0.75];
        assert_eq!(summed_presence(&[&first, &second]), vec![0.5, 0.75, 0.75]);
    }

    #[test]
    fn test_end_use_requires_statistics() {
        assert_eq!(
            EndUse::from_kind(EndUseKind::Dishwasher, &EndUseStatistics::default()).unwrap_err(),
            ConfigurationError::MissingStatistics("Dishwasher".into())
        );
    }
}
