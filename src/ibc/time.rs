//! Block timestamp parsing and formatting.
//!
//! RPC nodes report nanosecond RFC 3339 timestamps; everything downstream
//! works at microsecond precision in UTC, truncating the extra digits.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};

/// Format used for every timestamp this crate writes
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an RPC header time such as `2025-03-01T10:00:00.123456789Z`
pub fn parse_block_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc).trunc_subsecs(6))
}

/// Parse a timestamp read back from a CSV.
///
/// Accepts RFC 3339 as well as the naive `T`/space separated forms older
/// exports used, which are taken to be UTC.
pub fn parse_csv_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(dt) = parse_block_time(s) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc).trunc_subsecs(6));
    }
    NAIVE_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(s, fmt)
            .ok()
            .map(|naive| naive.and_utc().trunc_subsecs(6))
    })
}

pub fn format_time(dt: &DateTime<Utc>) -> String {
    dt.format(TIME_FORMAT).to_string()
}

/// Seconds between two instants, microsecond resolution
pub fn seconds_between(from: &DateTime<Utc>, to: &DateTime<Utc>) -> f64 {
    (*to - *from).num_microseconds().unwrap_or(0) as f64 / 1_000_000.0
}

/// Serde adapter for optional timestamps in CSV rows.
///
/// Unparsable values read as empty rather than failing the whole file.
pub mod csv_time {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_str(&super::format_time(dt)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(super::parse_csv_time))
    }
}

/// Serde adapter for required timestamps, such as probe sample times
pub mod csv_datetime {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_time(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_csv_time(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp {:?}", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_nanoseconds_are_truncated() {
        let dt = parse_block_time("2025-03-01T10:00:00.123456789Z").unwrap();
        assert_eq!(dt.nanosecond(), 123_456_000);
        assert_eq!(format_time(&dt), "2025-03-01T10:00:00.123456Z");
    }

    #[test]
    fn test_short_fraction_is_padded() {
        let dt = parse_block_time("2025-03-01T10:00:00.5Z").unwrap();
        assert_eq!(dt.nanosecond(), 500_000_000);
        assert_eq!(format_time(&dt), "2025-03-01T10:00:00.500000Z");
    }

    #[test]
    fn test_parse_csv_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 12, 5, 8, 30, 1).unwrap()
            + chrono::Duration::microseconds(250_000);
        for s in [
            "2024-12-05T08:30:01.250000Z",
            "2024-12-05T08:30:01.25",
            "2024-12-05 08:30:01.250000",
            "2024-12-05 08:30:01.250000+00:00",
        ] {
            assert_eq!(parse_csv_time(s), Some(expected), "{}", s);
        }
        assert_eq!(
            parse_csv_time("2024-12-05T08:30:01"),
            Some(Utc.with_ymd_and_hms(2024, 12, 5, 8, 30, 1).unwrap())
        );
        assert_eq!(parse_csv_time(""), None);
        assert_eq!(parse_csv_time("NaT"), None);
    }

    #[test]
    fn test_seconds_between() {
        let a = parse_block_time("2025-01-01T00:00:00.000000Z").unwrap();
        let b = parse_block_time("2025-01-01T00:00:06.250000Z").unwrap();
        assert_eq!(seconds_between(&a, &b), 6.25);
        assert_eq!(seconds_between(&b, &a), -6.25);
    }
}
