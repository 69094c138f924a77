//! Message timestamps.
//!
//! The store counts from 2001-01-01T00:00:00Z. Older stores use seconds,
//! newer ones nanoseconds; the magnitude tells them apart.

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// 2001-01-01T00:00:00Z in Unix seconds.
pub const APPLE_EPOCH_UNIX: i64 = 978_307_200;

/// Raw values above this are nanoseconds.
const NANOSECOND_THRESHOLD: u64 = 100_000_000_000;

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Convert a raw `message.date` value. Zero means unset.
pub fn from_apple(raw: i64) -> Option<DateTime<Utc>> {
    if raw == 0 {
        return None;
    }
    let (secs, nanos) = if raw.unsigned_abs() > NANOSECOND_THRESHOLD {
        (raw.div_euclid(1_000_000_000), raw.rem_euclid(1_000_000_000) as u32)
    } else {
        (raw, 0)
    };
    DateTime::from_timestamp(secs.checked_add(APPLE_EPOCH_UNIX)?, nanos)
}

/// Zone used when rendering timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    #[default]
    Local,
    Utc,
}

impl std::str::FromStr for Zone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Zone::Local),
            "utc" => Ok(Zone::Utc),
            other => Err(format!("unknown timezone '{other}', expected local or utc")),
        }
    }
}

/// `YYYY-MM-DD HH:MM:SS` in the chosen zone.
pub fn format(at: &DateTime<Utc>, zone: Zone) -> String {
    match zone {
        Zone::Utc => at.format(DISPLAY_FORMAT).to_string(),
        Zone::Local => Local
            .from_utc_datetime(&at.naive_utc())
            .format(DISPLAY_FORMAT)
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_since_2001() {
        let at = from_apple(86_400).unwrap();
        assert_eq!(format(&at, Zone::Utc), "2001-01-02 00:00:00");
    }

    #[test]
    fn nanoseconds_since_2001() {
        let at = from_apple(700_000_000_000_000_000).unwrap();
        assert_eq!(at, from_apple(700_000_000).unwrap());
        assert_eq!(format(&at, Zone::Utc), "2023-03-08 20:26:40");
    }

    #[test]
    fn extreme_values_convert() {
        let latest = from_apple(i64::MAX).unwrap();
        assert_eq!(format(&latest, Zone::Utc), "2293-04-11 23:47:16");
        let earliest = from_apple(i64::MIN).unwrap();
        assert_eq!(format(&earliest, Zone::Utc), "1708-09-22 00:12:43");
    }

    #[test]
    fn zero_is_unset() {
        assert!(from_apple(0).is_none());
    }

    #[test]
    fn parses_zone() {
        assert_eq!("UTC".parse::<Zone>().unwrap(), Zone::Utc);
        assert_eq!(" local ".parse::<Zone>().unwrap(), Zone::Local);
        assert!("mars".parse::<Zone>().is_err());
    }
}
