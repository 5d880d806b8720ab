//! Data models for FireWatch.
//!
//! Every entity is a plain serde document. Field names serialize in
//! camelCase and closed enumerations serialize to the exact display strings
//! the browser client expects ("Fire Risk", "In Progress", ...). A string
//! outside an enumeration fails deserialization, which is how membership
//! is validated at the boundary.
//!
//! # Modules
//!
//! - [`alert`]: Alerts and the acknowledge/escalate/extend/resolve lifecycle
//! - [`prediction`]: Scored predictions and deactivation
//! - [`report`]: Reports, publishing, archiving and versioning

pub mod alert;
pub mod prediction;
pub mod report;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use alert::{Alert, AlertStatus, AlertType, NewAlert, Severity};
pub use prediction::{NewPrediction, Prediction};
pub use report::{NewReport, Report, ReportStatus, ReportType};

/// Hours an alert or prediction stays valid when the caller gives no expiry.
pub const DEFAULT_VALIDITY_HOURS: i64 = 24;

/// A request or stored document violated a domain constraint.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Behaviour shared by every stored entity.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    fn id(&self) -> &str;

    fn created_at(&self) -> DateTime<Utc>;

    /// Stamp a modification time.
    fn touch(&mut self, now: DateTime<Utc>);

    /// Check every field constraint of the entity.
    fn validate(&self) -> Result<(), ValidationError>;
}

/// A point on the globe in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_range("coordinates.latitude", self.latitude, -90.0, 90.0)?;
        check_range("coordinates.longitude", self.longitude, -180.0, 180.0)
    }
}

/// Fire risk classification shared by predictions and reports.
///
/// `Critical` is a legal stored value even though the scorer never produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Critical => "Critical",
        }
    }
}

/// Reject empty (after trimming) or over-long text.
pub(crate) fn check_text(field: &str, value: &str, max_chars: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError(format!("{field} is required")));
    }
    let len = value.chars().count();
    if len > max_chars {
        return Err(ValidationError(format!(
            "{field} must be at most {max_chars} characters (got {len})"
        )));
    }
    Ok(())
}

/// Reject optional text that is present but over-long.
pub(crate) fn check_max_len(
    field: &str,
    value: Option<&str>,
    max_chars: usize,
) -> Result<(), ValidationError> {
    match value {
        Some(text) if text.chars().count() > max_chars => Err(ValidationError(format!(
            "{field} must be at most {max_chars} characters"
        ))),
        _ => Ok(()),
    }
}

/// Reject values outside `[min, max]`, including NaN.
pub(crate) fn check_range(field: &str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ValidationError(format!(
            "{field} must be between {min} and {max} (got {value})"
        )))
    }
}

pub(crate) fn check_non_negative(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError(format!(
            "{field} must be zero or greater (got {value})"
        )))
    }
}

/// Milliseconds until `deadline`, never negative.
pub(crate) fn millis_until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (deadline - now).num_milliseconds().max(0)
}

pub(crate) fn default_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::hours(DEFAULT_VALIDITY_HOURS)
}

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Fixed-width RFC 3339 timestamps (`2024-05-01T12:00:00.000Z`).
///
/// The store compares timestamps as text, so every instant is written with
/// millisecond precision and a `Z` suffix. Parsing accepts any RFC 3339 form.
pub mod timestamp {
    use chrono::{DateTime, Datelike, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    /// Latest year that still formats as four digits.
    pub const MAX_YEAR: i32 = 9999;

    /// Whether `at` formats to the fixed-width form that [`parse`] reads back.
    pub fn is_representable(at: &DateTime<Utc>) -> bool {
        (0..=MAX_YEAR).contains(&at.year())
    }

    pub fn format(at: &DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(raw).map(|at| at.with_timezone(&Utc))
    }

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(de::Error::custom)
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer, de};

        pub fn serialize<S: Serializer>(
            at: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match at {
                Some(at) => serializer.serialize_str(&super::format(at)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| super::parse(&raw).map_err(de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_is_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let fractional = whole + Duration::nanoseconds(123_456_789);

        assert_eq!(timestamp::format(&whole), "2024-05-01T12:00:00.000Z");
        assert_eq!(timestamp::format(&fractional), "2024-05-01T12:00:00.123Z");
        assert!(timestamp::format(&whole) < timestamp::format(&fractional));
    }

    #[test]
    fn test_timestamp_range_is_four_digit_years() {
        let last = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
        let first = Utc.with_ymd_and_hms(0, 1, 1, 0, 0, 0).unwrap();

        assert!(timestamp::is_representable(&last));
        assert!(timestamp::is_representable(&first));
        assert!(!timestamp::is_representable(&(last + Duration::seconds(1))));
        assert!(!timestamp::is_representable(&(first - Duration::seconds(1))));

        let formatted = timestamp::format(&last);
        assert_eq!(timestamp::parse(&formatted).unwrap().timestamp(), last.timestamp());
    }

    #[test]
    fn test_timestamp_parses_offsets() {
        let parsed = timestamp::parse("2024-05-01T14:00:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_coordinates_bounds() {
        assert!(Coordinates { latitude: 90.0, longitude: -180.0 }.validate().is_ok());
        assert!(Coordinates { latitude: 90.5, longitude: 0.0 }.validate().is_err());
        assert!(Coordinates { latitude: 0.0, longitude: 181.0 }.validate().is_err());
        assert!(Coordinates { latitude: f64::NAN, longitude: 0.0 }.validate().is_err());
    }

    #[test]
    fn test_check_text() {
        assert!(check_text("title", "Smoke", 150).is_ok());
        assert!(check_text("title", "   ", 150).is_err());
        assert!(check_text("title", &"x".repeat(151), 150).is_err());
    }

    #[test]
    fn test_millis_until_clamps() {
        let now = Utc::now();
        assert_eq!(millis_until(now - Duration::hours(1), now), 0);
        assert_eq!(millis_until(now + Duration::seconds(2), now), 2_000);
    }
}
