//! Mentoring session records as served by the backend.
//!
//! The backend is inconsistent about how it encodes a session's duration:
//! older records carry an ISO-8601 string (`"PT90M"`), newer ones a
//! `{seconds: n}` object, and a few hand-entered rows a plain minutes
//! number. `RawDuration` captures all three shapes at the deserialization
//! boundary and `normalize_duration` collapses them to minutes; everything
//! downstream works on `DurationMinutes` only.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::user::UserRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Pending,
    Approved,
    Paid,
    Rejected,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "PENDING",
            SessionStatus::Approved => "APPROVED",
            SessionStatus::Paid => "PAID",
            SessionStatus::Rejected => "REJECTED",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(SessionStatus::Pending),
            "APPROVED" => Ok(SessionStatus::Approved),
            "PAID" => Ok(SessionStatus::Paid),
            "REJECTED" => Ok(SessionStatus::Rejected),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

/// Duration as it appears on the wire. Untagged: serde tries each shape in
/// order, and anything unrecognized lands in `Other` instead of failing the
/// whole session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawDuration {
    Iso(String),
    Seconds { seconds: i64 },
    Minutes(f64),
    Other(serde_json::Value),
}

/// Normalized duration. `Unknown` is a display sentinel, not an error:
/// callers render it as "unknown" rather than refusing the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationMinutes {
    Known(i64),
    Unknown,
}

impl DurationMinutes {
    pub fn minutes(&self) -> Option<i64> {
        match self {
            DurationMinutes::Known(m) => Some(*m),
            DurationMinutes::Unknown => None,
        }
    }
}

impl std::fmt::Display for DurationMinutes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DurationMinutes::Known(m) => write!(f, "{}m", m),
            DurationMinutes::Unknown => write!(f, "unknown"),
        }
    }
}

/// Collapse any wire shape to minutes. Fails closed to `Unknown` — never
/// panics, never errors.
pub fn normalize_duration(raw: &RawDuration) -> DurationMinutes {
    match raw {
        RawDuration::Iso(s) => parse_iso_minutes(s)
            .map(DurationMinutes::Known)
            .unwrap_or(DurationMinutes::Unknown),
        RawDuration::Seconds { seconds } if *seconds >= 0 => {
            DurationMinutes::Known(seconds / 60)
        }
        RawDuration::Minutes(m) if *m >= 0.0 && m.is_finite() => {
            DurationMinutes::Known(*m as i64)
        }
        _ => DurationMinutes::Unknown,
    }
}

/// Parse the `PT[nH][nM][nS]` subset of ISO-8601 that `java.time.Duration`
/// emits. Seconds are floored into whole minutes.
fn parse_iso_minutes(s: &str) -> Option<i64> {
    let rest = s.strip_prefix("PT").or_else(|| s.strip_prefix("pt"))?;
    if rest.is_empty() {
        return None;
    }

    let mut total_seconds: i64 = 0;
    let mut digits = String::new();
    for c in rest.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            let n: i64 = digits.parse().ok()?;
            digits.clear();
            let factor = match c.to_ascii_uppercase() {
                'H' => 3600,
                'M' => 60,
                'S' => 1,
                _ => return None,
            };
            total_seconds = total_seconds.checked_add(n.checked_mul(factor)?)?;
        }
    }
    if !digits.is_empty() {
        // Trailing digits with no unit designator
        return None;
    }
    Some(total_seconds / 60)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: i64,
    pub mentor: UserRef,
    pub session_type: String,
    pub duration: RawDuration,
    pub hourly_rate: Decimal,
    #[serde(default)]
    pub calculated_amount: Option<Decimal>,
    #[serde(default)]
    pub platform_fee: Option<Decimal>,
    #[serde(default)]
    pub gst_amount: Option<Decimal>,
    #[serde(default)]
    pub deductions: Option<Decimal>,
    #[serde(default)]
    pub final_payout_amount: Option<Decimal>,
    #[serde(default)]
    pub session_date_time: Option<NaiveDateTime>,
    pub status: SessionStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Session {
    pub fn duration_minutes(&self) -> DurationMinutes {
        normalize_duration(&self.duration)
    }

    pub fn is_payable(&self) -> bool {
        self.status == SessionStatus::Approved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_iso_minutes() {
        assert_eq!(
            normalize_duration(&RawDuration::Iso("PT90M".into())),
            DurationMinutes::Known(90)
        );
        assert_eq!(
            normalize_duration(&RawDuration::Iso("PT1H30M".into())),
            DurationMinutes::Known(90)
        );
        assert_eq!(
            normalize_duration(&RawDuration::Iso("PT45M30S".into())),
            DurationMinutes::Known(45)
        );
    }

    #[test]
    fn normalize_seconds_object() {
        assert_eq!(
            normalize_duration(&RawDuration::Seconds { seconds: 5400 }),
            DurationMinutes::Known(90)
        );
    }

    #[test]
    fn normalize_plain_number() {
        assert_eq!(
            normalize_duration(&RawDuration::Minutes(90.0)),
            DurationMinutes::Known(90)
        );
    }

    #[test]
    fn normalize_fails_closed() {
        assert_eq!(
            normalize_duration(&RawDuration::Iso("ninety minutes".into())),
            DurationMinutes::Unknown
        );
        assert_eq!(
            normalize_duration(&RawDuration::Iso("PT".into())),
            DurationMinutes::Unknown
        );
        assert_eq!(
            normalize_duration(&RawDuration::Minutes(f64::NAN)),
            DurationMinutes::Unknown
        );
        assert_eq!(
            normalize_duration(&RawDuration::Seconds { seconds: -60 }),
            DurationMinutes::Unknown
        );
        assert_eq!(
            normalize_duration(&RawDuration::Other(serde_json::json!({"weird": true}))),
            DurationMinutes::Unknown
        );
    }

    #[test]
    fn session_deserializes_each_duration_shape() {
        let base = |duration: serde_json::Value| {
            serde_json::json!({
                "id": 1,
                "mentor": {"id": 7, "username": "asha"},
                "sessionType": "ONE_ON_ONE",
                "duration": duration,
                "hourlyRate": 1000,
                "finalPayoutAmount": 900.0,
                "sessionDateTime": "2024-07-15T10:30:00",
                "status": "APPROVED"
            })
        };

        for (raw, expected) in [
            (serde_json::json!("PT90M"), 90),
            (serde_json::json!({"seconds": 5400, "nano": 0}), 90),
            (serde_json::json!(90), 90),
        ] {
            let s: Session = serde_json::from_value(base(raw)).expect("session should parse");
            assert_eq!(s.duration_minutes(), DurationMinutes::Known(expected));
            assert!(s.is_payable());
        }
    }

    #[test]
    fn unknown_duration_shape_does_not_reject_the_record() {
        let v = serde_json::json!({
            "id": 2,
            "mentor": {"id": 7},
            "sessionType": "GROUP",
            "duration": {"unexpected": "shape"},
            "hourlyRate": 500,
            "sessionDateTime": null,
            "status": "PENDING"
        });
        let s: Session = serde_json::from_value(v).expect("record should still parse");
        assert_eq!(s.duration_minutes(), DurationMinutes::Unknown);
        assert_eq!(s.duration_minutes().to_string(), "unknown");
    }

    #[test]
    fn omitted_session_date_time_parses_as_none() {
        // Some endpoints drop the field entirely instead of sending null.
        let s: Session = serde_json::from_value(serde_json::json!({
            "id": 3,
            "mentor": {"id": 7},
            "sessionType": "ONE_ON_ONE",
            "duration": "PT60M",
            "hourlyRate": 1000,
            "status": "APPROVED"
        }))
        .expect("record without sessionDateTime should parse");
        assert_eq!(s.session_date_time, None);
    }
}
