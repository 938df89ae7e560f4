use crate::core::consumption::ArraySlot;
use crate::core::end_use::discharge::{
    require_discharge, simulate_interval_discharge, DischargeEvent, Intake,
};
use crate::core::end_use::{joint_probability, Owner, SimulationContext};
use crate::core::units::COLD_WATER_TEMPERATURE;
use crate::core::user::User;
use crate::errors::{ConfigurationError, SimulationError};
use crate::input::{EndUseKind, WcStatistics, WcSubtype};
use rand::Rng;
use std::sync::Arc;

pub const URINE: &str = "urine";
pub const FAECES: &str = "faeces";

/// A toilet with a cistern of one of the configured kinds.
///
/// Every visit empties the cistern into the sewer, then refills it from the mains, so the
/// discharge starts together with the intake.
#[derive(Debug)]
pub struct Wc {
    kind: EndUseKind,
    statistics: Arc<WcStatistics>,
    discharge_events: Vec<DischargeEvent>,
}

impl Wc {
    pub fn new(kind: EndUseKind, statistics: Arc<WcStatistics>) -> Result<Self, ConfigurationError> {
        if !statistics.subtype.contains_key(&kind) {
            return Err(ConfigurationError::missing("wc subtypes", kind.to_string()));
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

    fn subtype(&self) -> Result<&WcSubtype, ConfigurationError> {
        self.statistics
            .subtype
            .get(&self.kind)
            .ok_or_else(|| ConfigurationError::missing("wc subtypes", self.kind.to_string()))
    }

    pub(crate) fn take_discharge_events(&mut self) -> Vec<DischargeEvent> {
        std::mem::take(&mut self.discharge_events)
    }

    /// Seconds a flush takes; cisterns that support it may be interrupted halfway.
    fn flush_seconds(&self, subtype: &WcSubtype, rng: &mut impl Rng) -> f64 {
        let seconds = subtype.duration.seconds();
        if subtype.flush_interruption
            && rng.random::<f64>() * 100. < self.statistics.prob_flush_interruption
        {
            seconds / 2.
        } else {
            seconds
        }
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
            let frequency = self
                .statistics
                .frequency
                .get(&user.age())
                .and_then(|by_gender| by_gender.get(&user.gender()))
                .ok_or_else(|| {
                    ConfigurationError::missing(
                        "wc frequency",
                        format!("{} {}", user.age(), user.gender()),
                    )
                })?
                .sample_count(rng)?;
            if frequency == 0 {
                continue;
            }
            let prob_joint = joint_probability(user.presence(weekend)?.curve(), None)?;

            for _ in 0..frequency {
                let duration = ctx.time.seconds_to_steps(self.flush_seconds(&subtype, rng));
                let usage = if rng.random::<f64>() < self.statistics.prob_faeces {
                    FAECES
                } else {
                    URINE
                };
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
                let slot = ArraySlot::new(user_index, end_use_index, pattern);
                let volume = ctx.write_intake(
                    self.kind,
                    slot,
                    interval,
                    self.statistics.intensity,
                    COLD_WATER_TEMPERATURE,
                )?;

                if ctx.simulate_discharge() {
                    let statistics = require_discharge(&self.statistics.discharge, self.kind)?;
                    let intake = Intake {
                        interval,
                        volume,
                        temperature: COLD_WATER_TEMPERATURE,
                    };
                    self.discharge_events.push(simulate_interval_discharge(
                        ctx, statistics, self.kind, usage, slot, intake, true, rng,
                    )?);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::probability::Distribution;
    use crate::core::units::TimeSpan;
    use crate::input::{AgeClass, Gender, Penetration};
    use indexmap::IndexMap;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;
    use rstest::*;

    #[fixture]
    fn statistics() -> Arc<WcStatistics> {
        Arc::new(WcStatistics {
            penetration: Penetration::Percentage(100.),
            frequency: IndexMap::from([(
                AgeClass::HomeAdult,
                IndexMap::from([(Gender::Female, Distribution::Poisson { average: 6. })]),
            )]),
            intensity: 0.083,
            prob_flush_interruption: 50.,
            prob_faeces: 0.2,
            subtype: IndexMap::from([
                (
                    EndUseKind::WcNormal,
                    WcSubtype {
                        penetration: 50.,
                        duration: TimeSpan::from_seconds(120.),
                        flush_interruption: false,
                    },
                ),
                (
                    EndUseKind::WcNewSave,
                    WcSubtype {
                        penetration: 50.,
                        duration: TimeSpan::from_seconds(48.),
                        flush_interruption: true,
                    },
                ),
            ]),
            discharge: None,
        })
    }

    #[rstest]
    fn test_flush_interruption(statistics: Arc<WcStatistics>) {
        let mut rng = Pcg64::seed_from_u64(5);
        let normal = Wc::new(EndUseKind::WcNormal, statistics.clone()).unwrap();
        let subtype = normal.subtype().unwrap().clone();
        assert!((0..100).all(|_| normal.flush_seconds(&subtype, &mut rng) == 120.));

        let saving = Wc::new(EndUseKind::WcNewSave, statistics).unwrap();
        let subtype = saving.subtype().unwrap().clone();
        let interrupted = (0..10_000)
            .filter(|_| saving.flush_seconds(&subtype, &mut rng) == 24.)
            .count();
        assert!((4_700..5_300).contains(&interrupted), "{interrupted}");
    }

    #[rstest]
    fn test_unknown_subtype(statistics: Arc<WcStatistics>) {
        assert!(Wc::new(EndUseKind::WcNew, statistics).is_err());
    }
}
