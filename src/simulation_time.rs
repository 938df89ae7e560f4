use crate::core::units::{DAYS_PER_WEEK, SECONDS_PER_DAY};
use crate::errors::ConfigurationError;
use serde::Deserialize;

pub const DEFAULT_RESOLUTION_SECONDS: u32 = 1;

/// The time axis of a simulation: a whole number of days, divided into steps of
/// `resolution` seconds each.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(try_from = "SimulationTimeInput")]
pub struct SimulationTime {
    days: usize,
    resolution: u32,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SimulationTimeInput {
    days: usize,
    #[serde(default = "default_resolution")]
    resolution: u32,
}

fn default_resolution() -> u32 {
    DEFAULT_RESOLUTION_SECONDS
}

impl TryFrom<SimulationTimeInput> for SimulationTime {
    type Error = ConfigurationError;

    fn try_from(input: SimulationTimeInput) -> Result<Self, Self::Error> {
        Self::new(input.days, input.resolution)
    }
}

impl SimulationTime {
    pub fn new(days: usize, resolution: u32) -> Result<Self, ConfigurationError> {
        if days == 0 {
            return Err(ConfigurationError::NoSimulationDays);
        }
        if resolution == 0 || SECONDS_PER_DAY % resolution != 0 {
            return Err(ConfigurationError::InvalidResolution(resolution));
        }

        Ok(Self { days, resolution })
    }

    pub fn days(&self) -> usize {
        self.days
    }

    /// Length of a single step, in seconds
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn steps_per_day(&self) -> usize {
        (SECONDS_PER_DAY / self.resolution) as usize
    }

    /// Number of steps in the full simulated horizon
    pub fn total_steps(&self) -> usize {
        self.days * self.steps_per_day()
    }

    pub fn day_offset(&self, day: usize) -> usize {
        day * self.steps_per_day()
    }

    /// Days are counted from a Monday, so the 6th and 7th day of every week are weekend days.
    pub fn is_weekend_day(&self, day: usize) -> bool {
        day % DAYS_PER_WEEK as usize >= 5
    }

    /// Number of whole steps needed to cover the given number of seconds, at least one.
    pub fn seconds_to_steps(&self, seconds: f64) -> usize {
        ((seconds / self.resolution as f64).round() as usize).max(1)
    }

    pub fn steps_to_seconds(&self, steps: usize) -> f64 {
        (steps as u64 * self.resolution as u64) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn simulation_time() -> SimulationTime {
        SimulationTime::new(8, 60).unwrap()
    }

    #[rstest]
    fn test_steps(simulation_time: SimulationTime) {
        assert_eq!(simulation_time.steps_per_day(), 1_440);
        assert_eq!(simulation_time.total_steps(), 8 * 1_440);
        assert_eq!(simulation_time.day_offset(3), 3 * 1_440);
    }

    #[rstest]
    fn test_seconds_to_steps(simulation_time: SimulationTime) {
        assert_eq!(simulation_time.seconds_to_steps(300.), 5);
        assert_eq!(simulation_time.seconds_to_steps(10.), 1);
        assert_eq!(simulation_time.steps_to_seconds(5), 300.);
    }

    #[rstest]
    fn test_is_weekend_day(simulation_time: SimulationTime) {
        let weekend_days = (0..simulation_time.days())
            .filter(|day| simulation_time.is_weekend_day(*day))
            .collect::<Vec<_>>();
        assert_eq!(weekend_days, vec![5, 6]);
    }

    #[test]
    fn test_invalid_simulation_time() {
        assert_eq!(
            SimulationTime::new(0, 1),
            Err(ConfigurationError::NoSimulationDays)
        );
        assert_eq!(
            SimulationTime::new(1, 7),
            Err(ConfigurationError::InvalidResolution(7))
        );
    }

    #[test]
    fn test_deserialize_with_default_resolution() {
        let time: SimulationTime = serde_json::from_str(r#"{"days": 2}"#).unwrap();
        assert_eq!(time, SimulationTime::new(2, 1).unwrap());
        assert!(serde_json::from_str::<SimulationTime>(r#"{"days": 1, "resolution": 7}"#).is_err());
    }
}
