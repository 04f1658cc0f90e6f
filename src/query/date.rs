use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value as YamlValue;

/// A calendar-day comparison against a single timestamp.
///
/// All variants compare localized days, never raw instants: a target matches
/// `after 2024-01-10` anywhere within the 10th in the reference time zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DateCondition {
    /// Target day is on or after the day of `now + period` (seconds, may be negative).
    Relative { period: i64 },
    Specific {
        #[serde(deserialize_with = "deserialize_timestamp")]
        date: DateTime<Utc>,
    },
    After {
        #[serde(deserialize_with = "deserialize_timestamp")]
        date: DateTime<Utc>,
    },
    Before {
        #[serde(deserialize_with = "deserialize_timestamp")]
        date: DateTime<Utc>,
    },
    Between {
        #[serde(deserialize_with = "deserialize_timestamp")]
        from: DateTime<Utc>,
        #[serde(deserialize_with = "deserialize_timestamp")]
        to: DateTime<Utc>,
    },
}

impl DateCondition {
    pub fn matches<Tz: TimeZone>(&self, target: &DateTime<Utc>, now: &DateTime<Tz>) -> bool {
        let tz = now.timezone();
        let day = localize(target, &tz);

        match self {
            DateCondition::Relative { period } => {
                let Some(threshold) = shift(now, *period) else {
                    return false;
                };
                day >= threshold.date_naive()
            }
            DateCondition::Specific { date } => day == localize(date, &tz),
            DateCondition::After { date } => day >= localize(date, &tz),
            DateCondition::Before { date } => day < localize(date, &tz),
            DateCondition::Between { from, to } => {
                localize(from, &tz) <= day && day <= localize(to, &tz)
            }
        }
    }
}

fn shift<Tz: TimeZone>(now: &DateTime<Tz>, seconds: i64) -> Option<DateTime<Tz>> {
    let delta = TimeDelta::try_seconds(seconds)?;
    now.clone().checked_add_signed(delta)
}

pub fn localize<Tz: TimeZone>(instant: &DateTime<Utc>, tz: &Tz) -> NaiveDate {
    instant.with_timezone(tz).date_naive()
}

/// Accepts RFC 3339 strings, `YYYY-MM-DD` (midnight UTC) and epoch milliseconds.
pub fn parse_timestamp(v: &YamlValue) -> Option<DateTime<Utc>> {
    match v {
        YamlValue::String(s) => parse_timestamp_str(s),
        YamlValue::Number(n) => DateTime::from_timestamp_millis(n.as_i64()?),
        _ => None,
    }
}

pub fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

pub fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = YamlValue::deserialize(deserializer)?;
    parse_timestamp(&value)
        .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {:?}", value)))
}

pub fn deserialize_optional_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = YamlValue::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    parse_timestamp(&value)
        .map(Some)
        .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {:?}", value)))
}
