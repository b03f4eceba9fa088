//! Wire-format conversion between [`TimeSpec`] and the remote calendar's
//! start/end representation, per spec.md 4.1.
//!
//! The remote API represents a start or end as one of:
//!   - `{"date": "2026-03-01"}` for an all-day event
//!   - `{"dateTime": "2026-03-01T11:00:00", "timeZone": "America/New_York"}`
//!     for a wall-clock time in a named zone
//!   - `{"dateTime": "2026-03-01T16:00:00Z"}` for a UTC instant
//!   - `{"dateTime": "2026-03-01T11:00:00-05:00"}` for a fixed-offset instant
//!     with no named zone
//!
//! Which of the last three a value round-trips to is load-bearing: coercing
//! a named-zone or fixed-offset value to UTC on write breaks recurrence
//! expansion across a DST boundary on the remote side.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::TimeSpec;

use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "dateTime")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "timeZone")]
    pub time_zone: Option<String>,
}

pub fn to_wire(spec: &TimeSpec) -> WireTime {
    match spec {
        TimeSpec::AllDay(date) => WireTime {
            date: Some(*date),
            date_time: None,
            time_zone: None,
        },
        TimeSpec::Zoned { wall, zone } => WireTime {
            date: None,
            date_time: Some(wall.format("%Y-%m-%dT%H:%M:%S").to_string()),
            time_zone: Some(zone.clone()),
        },
        TimeSpec::Utc(dt) => WireTime {
            date: None,
            date_time: Some(dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            time_zone: None,
        },
        TimeSpec::Offset(dt) => WireTime {
            date: None,
            date_time: Some(dt.to_rfc3339()),
            time_zone: None,
        },
    }
}

pub fn from_wire(wire: &WireTime) -> GatewayResult<TimeSpec> {
    if let Some(date) = wire.date {
        return Ok(TimeSpec::AllDay(date));
    }
    let raw = wire
        .date_time
        .as_deref()
        .ok_or_else(|| GatewayError::UnexpectedResponse("start/end has neither date nor dateTime".into()))?;

    if let Some(zone) = &wire.time_zone {
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
            .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.naive_local()))
            .map_err(|e| GatewayError::UnexpectedResponse(e.to_string()))?;
        return Ok(TimeSpec::Zoned {
            wall: naive,
            zone: zone.clone(),
        });
    }

    if raw.ends_with('Z') {
        let dt: DateTime<Utc> = raw
            .parse()
            .map_err(|e: chrono::ParseError| GatewayError::UnexpectedResponse(e.to_string()))?;
        return Ok(TimeSpec::Utc(dt));
    }

    let dt: DateTime<FixedOffset> = DateTime::parse_from_rfc3339(raw)
        .map_err(|e| GatewayError::UnexpectedResponse(e.to_string()))?;
    Ok(TimeSpec::Offset(dt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoned_round_trips_through_wire() {
        let wire = WireTime {
            date: None,
            date_time: Some("2026-03-01T11:00:00".into()),
            time_zone: Some("America/New_York".into()),
        };
        let spec = from_wire(&wire).unwrap();
        assert!(matches!(spec, TimeSpec::Zoned { .. }));
        let back = to_wire(&spec);
        assert_eq!(back.time_zone.as_deref(), Some("America/New_York"));
    }

    #[test]
    fn utc_instant_round_trips_with_z_suffix() {
        let wire = WireTime {
            date: None,
            date_time: Some("2026-03-01T16:00:00Z".into()),
            time_zone: None,
        };
        let spec = from_wire(&wire).unwrap();
        assert!(matches!(spec, TimeSpec::Utc(_)));
        let back = to_wire(&spec);
        assert!(back.date_time.unwrap().ends_with('Z'));
        assert!(back.time_zone.is_none());
    }

    #[test]
    fn fixed_offset_never_gains_a_named_zone() {
        let wire = WireTime {
            date: None,
            date_time: Some("2026-03-01T11:00:00-05:00".into()),
            time_zone: None,
        };
        let spec = from_wire(&wire).unwrap();
        assert!(matches!(spec, TimeSpec::Offset(_)));
        let back = to_wire(&spec);
        assert!(back.time_zone.is_none());
    }

    #[test]
    fn all_day_round_trips_as_date_only() {
        let wire = WireTime {
            date: Some(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()),
            date_time: None,
            time_zone: None,
        };
        let spec = from_wire(&wire).unwrap();
        assert!(spec.is_all_day());
        let back = to_wire(&spec);
        assert!(back.date.is_some());
        assert!(back.date_time.is_none());
    }
}
