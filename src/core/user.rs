use crate::core::presence::Presence;
use crate::errors::{ConfigurationError, SimulationError};
use crate::input::{AgeClass, DiurnalPatterns, Gender, PresenceWeights, UserInput};
use crate::simulation_time::SimulationTime;
use rand::Rng;

/// An inhabitant of a house, with their presence curves for a weekday and a weekend day.
#[derive(Clone, Debug)]
pub struct User {
    id: String,
    age: AgeClass,
    gender: Gender,
    weekday_presence: Option<Presence>,
    weekend_presence: Option<Presence>,
}

impl User {
    pub fn new(id: impl Into<String>, age: AgeClass, gender: Gender) -> Self {
        Self {
            id: id.into(),
            age,
            gender,
            weekday_presence: None,
            weekend_presence: None,
        }
    }

    /// Build a user from input, taking any precomputed presence curves as given.
    pub fn from_input(
        input: &UserInput,
        fallback_id: String,
        time: &SimulationTime,
    ) -> Result<Self, SimulationError> {
        let id = input.id.clone().unwrap_or(fallback_id);
        let user = Self::new(id, input.age.resolve(input.job), input.gender);

        match &input.presence {
            Some(curves) => {
                let weekday = Presence::from_curve(&user.id, curves.weekday.clone(), time)?;
                let weekend = Presence::from_curve(&user.id, curves.weekend.clone(), time)?;
                Ok(user.with_presence(weekday, weekend))
            }
            None => Ok(user),
        }
    }

    pub fn with_presence(mut self, weekday: Presence, weekend: Presence) -> Self {
        self.weekday_presence = Some(weekday);
        self.weekend_presence = Some(weekend);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn age(&self) -> AgeClass {
        self.age
    }

    pub fn gender(&self) -> Gender {
        self.gender
    }

    pub fn has_presence(&self) -> bool {
        self.weekday_presence.is_some() && self.weekend_presence.is_some()
    }

    /// Sample the weekday and weekend presence curves.
    pub fn compute_presence(
        &mut self,
        patterns: &DiurnalPatterns,
        weights: &PresenceWeights,
        time: &SimulationTime,
        rng: &mut impl Rng,
    ) -> Result<(), SimulationError> {
        self.weekday_presence = Some(Presence::compute(
            patterns.for_day(self.age, false)?,
            weights,
            time,
            rng,
        )?);
        self.weekend_presence = Some(Presence::compute(
            patterns.for_day(self.age, true)?,
            weights,
            time,
            rng,
        )?);

        Ok(())
    }

    pub fn presence(&self, weekend: bool) -> Result<&Presence, ConfigurationError> {
        let presence = if weekend {
            &self.weekend_presence
        } else {
            &self.weekday_presence
        };
        presence
            .as_ref()
            .ok_or_else(|| ConfigurationError::PresenceNotComputed(self.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::AgeInput;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_presence_must_be_computed() {
        let user = User::new("anna", AgeClass::Senior, Gender::Female);
        assert_eq!(
            user.presence(false).unwrap_err(),
            ConfigurationError::PresenceNotComputed("anna".into())
        );
    }

    #[test]
    fn test_from_input_with_curves() {
        let time = SimulationTime::new(1, 3_600).unwrap();
        let input: UserInput = serde_json::from_value(serde_json::json!({
            "age": "adult",
            "gender": "male",
            "job": true,
            "presence": {"weekday": vec![1.; 24], "weekend": vec![2.; 24]}
        }))
        .unwrap();
        assert_eq!(input.age, AgeInput::Adult);

        let user = User::from_input(&input, "h1_user_0".into(), &time).unwrap();
        assert_eq!(user.id(), "h1_user_0");
        assert_eq!(user.age(), AgeClass::WorkAdult);
        assert!(user.has_presence());
        assert_eq!(user.presence(true).unwrap().curve()[5], 1. / 24.);
    }
}
