use serde::{Deserialize, Deserializer};
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub const SECONDS_PER_MINUTE: u32 = 60;
pub const MINUTES_PER_HOUR: u32 = 60;
pub const SECONDS_PER_HOUR: u32 = 3_600;
pub const HOURS_PER_DAY: u32 = 24;
pub const MINUTES_PER_DAY: u32 = 1_440;
pub const SECONDS_PER_DAY: u32 = 86_400;
pub const DAYS_PER_WEEK: u32 = 7;

/// Temperature (deg C) of the cold water supply, at which water counts as no hot water at all.
pub const COLD_WATER_TEMPERATURE: f64 = 10.;
/// Temperature (deg C) of the hot water supply, at which water counts entirely as hot water.
pub const HOT_WATER_TEMPERATURE: f64 = 60.;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum DurationParseError {
    #[error("Could not parse '{0}' as a duration")]
    Malformed(String),
    #[error("Unknown time unit '{unit}' in duration '{input}'")]
    UnknownUnit { input: String, unit: String },
    #[error("Duration '{0}' is negative")]
    Negative(String),
}

/// Parse a duration given as a string into seconds.
///
/// Accepted forms are clock notation (`"HH:MM"` or `"HH:MM:SS"`) and a number
/// followed by an optional unit, e.g. `"300"`, `"30s"`, `"10 min"`, `"1.5 hours"`, `"1 day"`.
/// A number without a unit is taken to be in seconds.
pub fn parse_duration(input: &str) -> Result<f64, DurationParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DurationParseError::Malformed(input.to_string()));
    }

    let seconds = if trimmed.contains(':') {
        parse_clock_notation(trimmed).ok_or_else(|| DurationParseError::Malformed(input.into()))?
    } else {
        let split_at = trimmed
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
            .unwrap_or(trimmed.len());
        let (number, unit) = trimmed.split_at(split_at);
        let number: f64 = number
            .parse()
            .map_err(|_| DurationParseError::Malformed(input.into()))?;
        let multiplier = match unit.trim().to_ascii_lowercase().as_str() {
            "" | "s" | "sec" | "secs" | "second" | "seconds" => 1.,
            "m" | "min" | "mins" | "minute" | "minutes" => SECONDS_PER_MINUTE as f64,
            "h" | "hr" | "hrs" | "hour" | "hours" => SECONDS_PER_HOUR as f64,
            "d" | "day" | "days" => SECONDS_PER_DAY as f64,
            other => {
                return Err(DurationParseError::UnknownUnit {
                    input: input.into(),
                    unit: other.into(),
                })
            }
        };
        number * multiplier
    };

    if seconds < 0. {
        return Err(DurationParseError::Negative(input.into()));
    }

    Ok(seconds)
}

fn parse_clock_notation(value: &str) -> Option<f64> {
    let parts = value
        .split(':')
        .map(|part| part.trim().parse::<f64>().ok())
        .collect::<Option<Vec<_>>>()?;

    match parts.as_slice() {
        [hours, minutes] => Some(hours * SECONDS_PER_HOUR as f64 + minutes * SECONDS_PER_MINUTE as f64),
        [hours, minutes, seconds] => Some(
            hours * SECONDS_PER_HOUR as f64 + minutes * SECONDS_PER_MINUTE as f64 + seconds,
        ),
        _ => None,
    }
}

pub fn minutes_to_seconds(minutes: f64) -> f64 {
    minutes * SECONDS_PER_MINUTE as f64
}

pub fn seconds_to_minutes(seconds: f64) -> f64 {
    seconds / SECONDS_PER_MINUTE as f64
}

/// A span of time read from configuration, either as a number of seconds or as a
/// duration string understood by [`parse_duration`].
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct TimeSpan(f64);

impl TimeSpan {
    pub fn from_seconds(seconds: f64) -> Self {
        Self(seconds)
    }

    pub fn from_minutes(minutes: f64) -> Self {
        Self(minutes_to_seconds(minutes))
    }

    pub fn seconds(&self) -> f64 {
        self.0
    }

    pub fn minutes(&self) -> f64 {
        seconds_to_minutes(self.0)
    }
}

impl Display for TimeSpan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", self.0)
    }
}

impl<'de> Deserialize<'de> for TimeSpan {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawTimeSpan {
            Seconds(f64),
            Text(String),
        }

        match RawTimeSpan::deserialize(deserializer)? {
            RawTimeSpan::Seconds(seconds) if seconds >= 0. => Ok(Self(seconds)),
            RawTimeSpan::Seconds(seconds) => Err(serde::de::Error::custom(
                DurationParseError::Negative(seconds.to_string()),
            )),
            RawTimeSpan::Text(text) => parse_duration(&text)
                .map(Self)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    #[case("300", 300.)]
    #[case("30s", 30.)]
    #[case("10 min", 600.)]
    #[case("1.5 hours", 5_400.)]
    #[case("1 day", 86_400.)]
    #[case("07:30", 27_000.)]
    #[case("00:05:30", 330.)]
    fn test_parse_duration(#[case] input: &str, #[case] expected: f64) {
        assert_eq!(parse_duration(input).unwrap(), expected);
    }

    #[test]
    fn test_parse_duration_rejects_bad_input() {
        assert_eq!(
            parse_duration("ten minutes"),
            Err(DurationParseError::Malformed("ten minutes".into()))
        );
        assert_eq!(
            parse_duration("3 fortnights"),
            Err(DurationParseError::UnknownUnit {
                input: "3 fortnights".into(),
                unit: "fortnights".into()
            })
        );
        assert!(matches!(
            parse_duration("-5 min"),
            Err(DurationParseError::Negative(_))
        ));
    }

    #[test]
    fn test_time_span_deserializes_from_number_or_string() {
        let spans: Vec<TimeSpan> = serde_json::from_str(r#"[90, "2 min", "01:00:00"]"#).unwrap();
        assert_eq!(
            spans,
            vec![
                TimeSpan::from_seconds(90.),
                TimeSpan::from_minutes(2.),
                TimeSpan::from_seconds(3_600.)
            ]
        );
        assert_eq!(spans[1].minutes(), 2.);
    }
}
