use crate::core::probability::Distribution;
use crate::core::units::{TimeSpan, COLD_WATER_TEMPERATURE};
use crate::errors::ConfigurationError;
use crate::simulation_time::SimulationTime;
use anyhow::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_valid::Validate;
use std::io::{BufReader, Read};
use std::sync::Arc;
use strum::{Display, IntoStaticStr};

pub const DEFAULT_MAX_SCHEDULING_ATTEMPTS: usize = 1_000;

pub fn ingest_input(json: impl Read) -> anyhow::Result<Input> {
    let input: Input = serde_json::from_reader(BufReader::new(json))
        .context("Could not parse the simulation input")?;
    input
        .validate()
        .map_err(|errors| ConfigurationError::InvalidInput(errors.to_string()))?;

    Ok(input)
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct Input {
    #[validate]
    pub simulation: SimulationInput,
    #[serde(default)]
    #[validate]
    pub presence_weights: PresenceWeights,
    pub diurnal_patterns: DiurnalPatterns,
    pub end_uses: Arc<EndUseStatistics>,
    #[serde(default)]
    pub nutrients: Option<NutrientStatistics>,
    #[validate(min_items = 1)]
    pub houses: Vec<HouseInput>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SimulationInput {
    pub time: SimulationTime,
    #[serde(default = "default_patterns")]
    #[validate(minimum = 1)]
    pub patterns: usize,
    #[serde(default)]
    pub simulate_discharge: bool,
    #[serde(default)]
    pub spillover: bool,
    #[serde(default)]
    pub include_weekend: bool,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_max_scheduling_attempts")]
    #[validate(minimum = 1)]
    pub max_scheduling_attempts: usize,
}

fn default_patterns() -> usize {
    1
}

fn default_max_scheduling_attempts() -> usize {
    DEFAULT_MAX_SCHEDULING_ATTEMPTS
}

/// Target share of the daily presence probability mass assigned to each regime of the day.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Validate)]
#[serde(deny_unknown_fields)]
pub struct PresenceWeights {
    #[validate(minimum = 0.)]
    pub peak: f64,
    #[validate(minimum = 0.)]
    pub normal: f64,
    #[validate(minimum = 0.)]
    pub away: f64,
    #[validate(minimum = 0.)]
    pub night: f64,
}

impl Default for PresenceWeights {
    fn default() -> Self {
        Self {
            peak: 0.65,
            normal: 0.335,
            away: 0.0,
            night: 0.015,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, IntoStaticStr, PartialEq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgeClass {
    Child,
    Teen,
    #[serde(rename = "work_ad")]
    #[strum(serialize = "work_ad")]
    WorkAdult,
    #[serde(rename = "home_ad")]
    #[strum(serialize = "home_ad")]
    HomeAdult,
    Senior,
}

/// Age as given for a user. A plain adult is resolved by employment status.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AgeInput {
    Child,
    Teen,
    Adult,
    WorkAd,
    HomeAd,
    Senior,
}

impl AgeInput {
    pub fn resolve(self, job: bool) -> AgeClass {
        match self {
            Self::Child => AgeClass::Child,
            Self::Teen => AgeClass::Teen,
            Self::Adult if job => AgeClass::WorkAdult,
            Self::Adult => AgeClass::HomeAdult,
            Self::WorkAd => AgeClass::WorkAdult,
            Self::HomeAd => AgeClass::HomeAdult,
            Self::Senior => AgeClass::Senior,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, IntoStaticStr, PartialEq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ContinuousDistributionKind {
    Norm,
    Uniform,
    Logistic,
    Expon,
}

/// Distribution of a time of day (or of a span of time), given by its location and scale.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TimeOfDayDistribution {
    pub dist: ContinuousDistributionKind,
    pub mu: TimeSpan,
    pub sd: TimeSpan,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DayPresenceStatistics {
    pub getting_up: TimeOfDayDistribution,
    pub leaving_house: TimeOfDayDistribution,
    pub being_away: TimeOfDayDistribution,
    pub sleep: TimeOfDayDistribution,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DiurnalPatterns {
    pub weekday: IndexMap<AgeClass, DayPresenceStatistics>,
    pub weekend: DayPresenceStatistics,
}

impl DiurnalPatterns {
    pub fn for_day(
        &self,
        age: AgeClass,
        weekend: bool,
    ) -> Result<&DayPresenceStatistics, ConfigurationError> {
        if weekend {
            return Ok(&self.weekend);
        }
        self.weekday
            .get(&age)
            .ok_or_else(|| ConfigurationError::missing("weekday diurnal patterns", age.to_string()))
    }
}

/// Look up a value in a table keyed by number of inhabitants.
///
/// Households larger than any key use the entry for the largest key.
pub fn lookup_household_size<'a, T>(
    table: &'a IndexMap<String, T>,
    household_size: usize,
    context: &str,
) -> Result<&'a T, ConfigurationError> {
    let mut largest: Option<(usize, &T)> = None;
    for (key, value) in table {
        let size = key.trim().parse::<usize>().map_err(|_| {
            ConfigurationError::missing(context, format!("numeric household size key, got '{key}'"))
        })?;
        if size == household_size {
            return Ok(value);
        }
        if size < household_size && largest.map_or(true, |(current, _)| size > current) {
            largest = Some((size, value));
        }
    }

    largest
        .map(|(_, value)| value)
        .ok_or_else(|| ConfigurationError::missing(context, format!("household size {household_size}")))
}

/// Share of households (in percent) that own an end-use.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Penetration {
    Percentage(f64),
    PerHouseholdSize(IndexMap<String, f64>),
}

impl Penetration {
    pub fn for_household(&self, household_size: usize) -> Result<f64, ConfigurationError> {
        match self {
            Self::Percentage(percentage) => Ok(*percentage),
            Self::PerHouseholdSize(table) => {
                lookup_household_size(table, household_size, "penetration").copied()
            }
        }
    }
}

/// Every end-use that can be installed in a house. The concrete kind doubles as its label.
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, IntoStaticStr, PartialEq)]
pub enum EndUseKind {
    Bathtub,
    BathroomTap,
    KitchenTap,
    OutsideTap,
    NormalShower,
    FancyShower,
    Dishwasher,
    WashingMachine,
    WcNormal,
    WcNormalSave,
    WcNew,
    WcNewSave,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndUseStatistics {
    pub bathtub: Option<Arc<BathtubStatistics>>,
    pub bathroom_tap: Option<Arc<TapStatistics>>,
    pub kitchen_tap: Option<Arc<KitchenTapStatistics>>,
    pub outside_tap: Option<Arc<TapStatistics>>,
    pub shower: Option<Arc<ShowerStatistics>>,
    pub dishwasher: Option<Arc<CycleApplianceStatistics>>,
    pub washing_machine: Option<Arc<CycleApplianceStatistics>>,
    pub wc: Option<Arc<WcStatistics>>,
}

fn cold_water() -> Distribution {
    Distribution::fixed(COLD_WATER_TEMPERATURE)
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BathtubStatistics {
    pub penetration: Penetration,
    pub frequency: IndexMap<AgeClass, Distribution>,
    pub duration: TimeSpan,
    /// Flow rate, litres per second
    pub intensity: f64,
    #[serde(default = "cold_water")]
    pub temperature: Distribution,
    #[serde(default)]
    pub discharge: Option<DischargeStatistics>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TapSubtype {
    pub penetration: f64,
    /// Average duration of a use; individual uses follow a lognormal distribution around it
    pub duration: TimeSpan,
    pub intensity: Distribution,
    #[serde(default = "cold_water")]
    pub temperature: Distribution,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TapStatistics {
    pub penetration: Penetration,
    pub frequency: Distribution,
    pub subtype: IndexMap<String, TapSubtype>,
    #[serde(default)]
    pub discharge: Option<DischargeStatistics>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct KitchenTapStatistics {
    pub penetration: Penetration,
    /// Uses per day for the whole household, keyed by number of inhabitants
    pub frequency: IndexMap<String, Distribution>,
    pub subtype: IndexMap<String, TapSubtype>,
    pub daily_pattern: DailyPatternInput,
    #[serde(default)]
    pub discharge: Option<DischargeStatistics>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ShowerSubtype {
    pub penetration: f64,
    pub intensity: f64,
    #[serde(default = "cold_water")]
    pub temperature: Distribution,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ShowerStatistics {
    pub penetration: Penetration,
    pub frequency: IndexMap<AgeClass, Distribution>,
    /// Duration of a shower in minutes, rounded to whole minutes
    pub duration: IndexMap<AgeClass, Distribution>,
    pub subtype: IndexMap<EndUseKind, ShowerSubtype>,
    #[serde(default)]
    pub discharge: Option<DischargeStatistics>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WcSubtype {
    pub penetration: f64,
    pub duration: TimeSpan,
    #[serde(default)]
    pub flush_interruption: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WcStatistics {
    pub penetration: Penetration,
    pub frequency: IndexMap<AgeClass, IndexMap<Gender, Distribution>>,
    pub intensity: f64,
    /// Chance (percent) that a flush is interrupted on a cistern that supports it
    #[serde(default)]
    pub prob_flush_interruption: f64,
    /// Chance (0-1) that a visit is tagged as faeces rather than urine
    #[serde(default)]
    pub prob_faeces: f64,
    pub subtype: IndexMap<EndUseKind, WcSubtype>,
    #[serde(default)]
    pub discharge: Option<DischargeStatistics>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CycleApplianceStatistics {
    pub penetration: Penetration,
    /// Cycles per day for the whole household, keyed by number of inhabitants
    pub frequency: IndexMap<String, Distribution>,
    pub daily_pattern: DailyPatternInput,
    #[serde(default)]
    pub daily_pattern_weekend: Option<DailyPatternInput>,
    pub enduse_pattern: EnduseCycleInput,
    #[serde(default)]
    pub discharge: Option<CycleDischargeStatistics>,
}

/// Usage likelihood over a day, given at regular knots starting at midnight.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DailyPatternInput {
    #[serde(deserialize_with = "deserialize_pattern_values")]
    pub values: Vec<f64>,
    #[serde(default = "one_hour")]
    pub interval: TimeSpan,
}

fn one_hour() -> TimeSpan {
    TimeSpan::from_minutes(60.)
}

fn deserialize_pattern_values<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawValues {
        Numbers(Vec<f64>),
        Text(String),
    }

    match RawValues::deserialize(deserializer)? {
        RawValues::Numbers(values) => Ok(values),
        RawValues::Text(text) => text
            .split_whitespace()
            .map(|value| value.parse::<f64>().map_err(serde::de::Error::custom))
            .collect(),
    }
}

/// Intake of a cycle appliance: a constant intensity during each of the cycle's fill phases.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EnduseCycleInput {
    pub intensity: f64,
    pub runtime: TimeSpan,
    pub cycle_times: Vec<CycleTime>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CycleTime {
    pub start: TimeSpan,
    pub end: TimeSpan,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DischargeStatistics {
    /// Flow rate at which the used water leaves the house, litres per second
    pub discharge_intensity: Distribution,
    #[serde(default)]
    pub usage_delay: Option<UsageDelay>,
    /// Defaults to the temperature of the intake
    #[serde(default)]
    pub discharge_temperature: Option<Distribution>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UsageDelay {
    pub low: TimeSpan,
    pub high: TimeSpan,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CycleDischargeStatistics {
    pub discharge_time: TimeSpan,
    #[serde(default)]
    pub discharge_temperature: Option<Distribution>,
}

/// Grams per use of each nutrient, by end-use name and usage.
pub type NutrientStatistics = IndexMap<String, IndexMap<String, NutrientLoads>>;

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NutrientLoads {
    pub n: f64,
    pub p: f64,
    pub cod: f64,
    pub bod5: f64,
    pub ss: f64,
    pub amm: f64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HouseInput {
    pub id: String,
    pub users: Vec<UserInput>,
    /// Installed end-uses. When absent the house is furnished from the penetration rates.
    #[serde(default)]
    pub appliances: Option<Vec<EndUseKind>>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserInput {
    #[serde(default)]
    pub id: Option<String>,
    pub age: AgeInput,
    pub gender: Gender,
    #[serde(default)]
    pub job: bool,
    /// Precomputed presence curves; sampled from the diurnal patterns when absent
    #[serde(default)]
    pub presence: Option<PresenceCurvesInput>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PresenceCurvesInput {
    pub weekday: Vec<f64>,
    pub weekend: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resolve_adult_age() {
        assert_eq!(AgeInput::Adult.resolve(true), AgeClass::WorkAdult);
        assert_eq!(AgeInput::Adult.resolve(false), AgeClass::HomeAdult);
        assert_eq!(AgeInput::Teen.resolve(true), AgeClass::Teen);
        assert_eq!(AgeClass::WorkAdult.to_string(), "work_ad");
    }

    #[test]
    fn test_lookup_household_size() {
        let table: IndexMap<String, f64> =
            IndexMap::from([("1".into(), 0.1), ("2".into(), 0.2), ("4".into(), 0.4)]);
        assert_eq!(*lookup_household_size(&table, 2, "test").unwrap(), 0.2);
        assert_eq!(*lookup_household_size(&table, 3, "test").unwrap(), 0.2);
        assert_eq!(*lookup_household_size(&table, 6, "test").unwrap(), 0.4);
        assert!(lookup_household_size(&table, 0, "test").is_err());
    }

    #[test]
    fn test_penetration() {
        let scalar: Penetration = serde_json::from_str("45.5").unwrap();
        assert_eq!(scalar.for_household(3).unwrap(), 45.5);
        let keyed: Penetration = serde_json::from_str(r#"{"1": 60, "2": 80}"#).unwrap();
        assert_eq!(keyed.for_household(1).unwrap(), 60.);
        assert_eq!(keyed.for_household(5).unwrap(), 80.);
    }

    #[test]
    fn test_daily_pattern_values_from_text() {
        let pattern: DailyPatternInput =
            serde_json::from_str(r#"{"values": "70 49 33", "interval": "15 min"}"#).unwrap();
        assert_eq!(pattern.values, vec![70., 49., 33.]);
        assert_eq!(pattern.interval, TimeSpan::from_minutes(15.));
    }

    #[test]
    fn test_ingest_demo_input() {
        let input = ingest_input(include_str!("../demos/household.json").as_bytes()).unwrap();
        assert_eq!(input.houses.len(), 2);
        assert_eq!(input.simulation.time.days(), 2);
        assert!(input.end_uses.wc.is_some());
        assert_eq!(input.presence_weights, PresenceWeights::default());
    }

    #[test]
    fn test_ingest_rejects_invalid_input() {
        let result = ingest_input(
            r#"{
                "simulation": {"time": {"days": 1}, "patterns": 0},
                "diurnal_patterns": {"weekday": {}, "weekend": {
                    "getting_up": {"dist": "norm", "mu": "07:00", "sd": "01:00"},
                    "leaving_house": {"dist": "norm", "mu": "09:00", "sd": "01:00"},
                    "being_away": {"dist": "norm", "mu": "04:00", "sd": "01:00"},
                    "sleep": {"dist": "norm", "mu": "08:00", "sd": "01:00"}
                }},
                "end_uses": {},
                "houses": [{"id": "h", "users": [{"age": "adult", "gender": "male"}]}]
            }"#
            .as_bytes(),
        );
        assert!(result.is_err());
    }
}
