use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Write as _};

use crate::config::DateEncoding;

/// Newtype name the encoder and decoder watch for.
pub(crate) const TOKEN: &str = "$formwire::private::Timestamp";

const ISO8601_MILLIS: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

/// A point in time whose wire form follows [`Config::dates`](crate::Config::dates)
///
/// With other serde formats it serializes transparently as RFC 3339 text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    pub fn new(value: DateTime<Utc>) -> Self {
        Timestamp(value)
    }

    /// Builds a timestamp from milliseconds since the Unix epoch
    pub fn from_millis(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).map(Timestamp)
    }

    pub fn into_inner(self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Timestamp(value)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(value: Timestamp) -> Self {
        value.0
    }
}

fn canonical(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_canonical(text: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(text)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|e| format!("`{text}` is not an RFC 3339 timestamp: {e}"))
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_newtype_struct(TOKEN, &canonical(&self.0))
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TimestampVisitor;

        impl<'de> Visitor<'de> for TimestampVisitor {
            type Value = Timestamp;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an RFC 3339 timestamp")
            }

            fn visit_newtype_struct<D>(self, deserializer: D) -> Result<Timestamp, D::Error>
            where
                D: Deserializer<'de>,
            {
                let text = String::deserialize(deserializer)?;
                self.visit_str(&text)
            }

            fn visit_str<E>(self, v: &str) -> Result<Timestamp, E>
            where
                E: de::Error,
            {
                parse_canonical(v).map(Timestamp).map_err(E::custom)
            }
        }

        deserializer.deserialize_newtype_struct(TOKEN, TimestampVisitor)
    }
}

/// Renders the canonical RFC 3339 text of a timestamp with the configured strategy
pub(crate) fn render(text: &str, encoding: &DateEncoding) -> Result<String, String> {
    if let DateEncoding::Deferred = encoding {
        return Ok(text.to_owned());
    }
    let value = parse_canonical(text)?;
    match encoding {
        DateEncoding::Deferred => Ok(text.to_owned()),
        DateEncoding::SecondsSinceEpoch => Ok(value.timestamp().to_string()),
        DateEncoding::MillisecondsSinceEpoch => Ok(value.timestamp_millis().to_string()),
        DateEncoding::Iso8601 => format_with(&value, ISO8601_MILLIS),
        DateEncoding::Formatted(pattern) => format_with(&value, pattern),
        DateEncoding::Custom(codec) => codec.encode(&value),
    }
}

/// Parses wire text with the configured strategy back into canonical RFC 3339 text
pub(crate) fn canonicalize(text: &str, encoding: &DateEncoding) -> Result<String, String> {
    let value = match encoding {
        DateEncoding::Deferred | DateEncoding::Iso8601 => parse_canonical(text)?,
        DateEncoding::SecondsSinceEpoch => parse_seconds(text)?,
        DateEncoding::MillisecondsSinceEpoch => text
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| format!("`{text}` is not a millisecond timestamp"))?,
        DateEncoding::Formatted(pattern) => parse_with(text, pattern)?,
        DateEncoding::Custom(codec) => codec.decode(text)?,
    };
    Ok(canonical(&value))
}

fn format_with(value: &DateTime<Utc>, pattern: &str) -> Result<String, String> {
    let mut out = String::new();
    write!(out, "{}", value.format(pattern))
        .map_err(|_| format!("invalid date format pattern `{pattern}`"))?;
    Ok(out)
}

fn parse_seconds(text: &str) -> Result<DateTime<Utc>, String> {
    let parsed = match text.parse::<i64>() {
        Ok(secs) => DateTime::from_timestamp(secs, 0),
        // fractional seconds from other producers
        Err(_) => text
            .parse::<f64>()
            .ok()
            .filter(|secs| secs.is_finite())
            .and_then(|secs| DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)),
    };
    parsed.ok_or_else(|| format!("`{text}` is not a seconds timestamp"))
}

fn parse_with(text: &str, pattern: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(value) = DateTime::parse_from_str(text, pattern) {
        return Ok(value.with_timezone(&Utc));
    }
    if let Ok(value) = NaiveDateTime::parse_from_str(text, pattern) {
        return Ok(value.and_utc());
    }
    NaiveDate::parse_from_str(text, pattern)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|value| value.and_utc())
        .ok_or_else(|| format!("`{text}` does not match date pattern `{pattern}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DateCodec;

    fn sample() -> Timestamp {
        // 2024-01-15T10:30:00.250Z
        Timestamp::from_millis(1_705_314_600_250).unwrap()
    }

    #[test]
    fn test_timestamp_json_is_transparent() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(json, r#""2024-01-15T10:30:00.250Z""#);
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn test_render_strategies() {
        let text = canonical(&sample().0);
        assert_eq!(render(&text, &DateEncoding::Deferred).unwrap(), text);
        assert_eq!(
            render(&text, &DateEncoding::SecondsSinceEpoch).unwrap(),
            "1705314600"
        );
        assert_eq!(
            render(&text, &DateEncoding::MillisecondsSinceEpoch).unwrap(),
            "1705314600250"
        );
        assert_eq!(
            render(&text, &DateEncoding::Iso8601).unwrap(),
            "2024-01-15T10:30:00.250+00:00"
        );
        assert_eq!(
            render(&text, &DateEncoding::Formatted("%d/%m/%Y".into())).unwrap(),
            "15/01/2024"
        );
    }

    #[test]
    fn test_canonicalize_strategies() {
        let text = canonical(&sample().0);
        assert_eq!(
            canonicalize("1705314600250", &DateEncoding::MillisecondsSinceEpoch).unwrap(),
            text
        );
        assert_eq!(
            canonicalize("2024-01-15T10:30:00.250+00:00", &DateEncoding::Iso8601).unwrap(),
            text
        );
        assert_eq!(
            canonicalize("1705314600", &DateEncoding::SecondsSinceEpoch).unwrap(),
            "2024-01-15T10:30:00Z"
        );
        assert_eq!(
            canonicalize("15/01/2024", &DateEncoding::Formatted("%d/%m/%Y".into())).unwrap(),
            "2024-01-15T00:00:00Z"
        );
        assert!(canonicalize("yesterday", &DateEncoding::Iso8601).is_err());
        assert!(canonicalize("soon", &DateEncoding::MillisecondsSinceEpoch).is_err());
    }

    #[test]
    fn test_custom_codec() {
        let codec = DateCodec::new(
            |value| Ok(format!("day-{}", value.timestamp() / 86_400)),
            |text| {
                let day: i64 = text
                    .strip_prefix("day-")
                    .and_then(|d| d.parse().ok())
                    .ok_or_else(|| format!("bad day `{text}`"))?;
                DateTime::from_timestamp(day * 86_400, 0).ok_or_else(|| "out of range".to_string())
            },
        );
        let encoding = DateEncoding::Custom(codec);
        let text = canonical(&sample().0);
        assert_eq!(render(&text, &encoding).unwrap(), "day-19737");
        assert_eq!(
            canonicalize("day-19737", &encoding).unwrap(),
            "2024-01-15T00:00:00Z"
        );
        assert!(canonicalize("tomorrow", &encoding).is_err());
    }
}
