//! The `TimeSpec` sum type.
//!
//! Replaces the source system's duck-typed "start"/"end" dict (which carries
//! either a `date`, a `dateTime` + named `timeZone`, a trailing-`Z` UTC
//! `dateTime`, or a `dateTime` with only a numeric offset) with a closed,
//! strongly-typed variant per spec.md's DESIGN NOTES. Preserving which
//! variant a value came from is required to satisfy the timezone-fidelity
//! contract in spec.md 4.1: re-serializing a `Fixed` value must omit the zone
//! field rather than coerce it to UTC, or recurring event expansion on the
//! remote calendar drifts across a DST transition.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeSpec {
    /// A whole-day event, keyed by a calendar date with no time-of-day.
    AllDay(NaiveDate),
    /// A wall-clock time paired with a named IANA zone (e.g. "America/New_York").
    /// The zone must be passed through verbatim on any downstream write.
    Zoned { wall: NaiveDateTime, zone: String },
    /// An instant with an explicit `Z` (UTC) suffix in the source.
    Utc(DateTime<Utc>),
    /// An instant carrying only a fixed numeric offset and no named zone.
    /// The zone field must be omitted on downstream writes so the remote
    /// server honors the embedded offset for recurrence expansion.
    Offset(DateTime<FixedOffset>),
}

#[derive(Debug, Error)]
pub enum TimeSpecError {
    #[error("unrecognized named timezone: {0}")]
    UnknownZone(String),
}

impl TimeSpec {
    pub fn is_all_day(&self) -> bool {
        matches!(self, TimeSpec::AllDay(_))
    }

    /// Best-effort conversion to a UTC instant, for storage/comparison.
    /// All-day dates are anchored to midnight UTC.
    pub fn to_utc(&self) -> Result<DateTime<Utc>, TimeSpecError> {
        match self {
            TimeSpec::AllDay(date) => Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap())),
            TimeSpec::Utc(dt) => Ok(*dt),
            TimeSpec::Offset(dt) => Ok(dt.with_timezone(&Utc)),
            TimeSpec::Zoned { wall, zone } => {
                let tz: chrono_tz::Tz = zone
                    .parse()
                    .map_err(|_| TimeSpecError::UnknownZone(zone.clone()))?;
                let local = tz
                    .from_local_datetime(wall)
                    .single()
                    .unwrap_or_else(|| tz.from_utc_datetime(wall));
                Ok(local.with_timezone(&Utc))
            }
        }
    }

    /// The instance-id suffix derivation from spec.md 4.1: `YYYYMMDD` for
    /// all-day originals, `YYYYMMDDThhmmssZ` (UTC, zero-padded) otherwise.
    pub fn instance_suffix(&self) -> Result<String, TimeSpecError> {
        if let TimeSpec::AllDay(date) = self {
            return Ok(date.format("%Y%m%d").to_string());
        }
        let utc = self.to_utc()?;
        Ok(format!("{}Z", utc.format("%Y%m%dT%H%M%S")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    #[test]
    fn all_day_instance_suffix() {
        let spec = TimeSpec::AllDay(NaiveDate::from_ymd_opt(2026, 2, 27).unwrap());
        assert_eq!(spec.instance_suffix().unwrap(), "20260227");
    }

    #[test]
    fn zoned_instance_suffix_converts_to_utc() {
        // 2026-02-27T11:00 America/New_York is 2026-02-27T16:00Z (EST is UTC-5
        // in winter, before the March DST change).
        let wall = NaiveDate::from_ymd_opt(2026, 2, 27)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(11, 0, 0).unwrap());
        let spec = TimeSpec::Zoned {
            wall,
            zone: "America/New_York".to_string(),
        };
        assert_eq!(spec.instance_suffix().unwrap(), "20260227T160000Z");
    }

    #[test]
    fn unknown_zone_is_rejected() {
        let wall = NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        let spec = TimeSpec::Zoned {
            wall,
            zone: "Not/AZone".to_string(),
        };
        assert!(spec.to_utc().is_err());
    }
}
