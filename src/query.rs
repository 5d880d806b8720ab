//! Query criteria over the document collections.
//!
//! Everything here is pure: list requests are turned into a [`Filter`], a
//! [`Sort`] and a [`Page`], which the storage layer renders to SQL. Field
//! references are static JSON paths, never caller-supplied text.
//!
//! # Area queries
//!
//! [`BoundingBox::around`] approximates a circle with a latitude/longitude
//! box (1° ≈ 111 km). It always over-includes near the corners; callers
//! accept that in exchange for an index-friendly range filter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    AlertStatus, AlertType, Coordinates, ReportStatus, ReportType, RiskLevel, Severity,
    ValidationError,
};

/// Kilometers per degree of latitude.
const KM_PER_DEGREE: f64 = 111.0;

pub const DEFAULT_ALERT_LIMIT: u32 = 50;
pub const DEFAULT_PREDICTION_LIMIT: u32 = 50;
pub const DEFAULT_REPORT_LIMIT: u32 = 20;

/// JSON paths into stored documents.
pub mod path {
    pub const CREATED_AT: &str = "$.createdAt";
    pub const UPDATED_AT: &str = "$.updatedAt";
    pub const TITLE: &str = "$.title";
    pub const DESCRIPTION: &str = "$.description";
    pub const LOCATION: &str = "$.location";
    pub const STATUS: &str = "$.status";
    pub const IS_ACTIVE: &str = "$.isActive";
    pub const LATITUDE: &str = "$.coordinates.latitude";
    pub const LONGITUDE: &str = "$.coordinates.longitude";

    pub const SEVERITY: &str = "$.severity";
    pub const ALERT_TYPE: &str = "$.alertType";
    pub const EXPIRES_AT: &str = "$.expiresAt";
    pub const ESCALATION_LEVEL: &str = "$.escalationLevel";

    pub const PREDICTION_RISK_LEVEL: &str = "$.prediction.riskLevel";
    pub const PREDICTION_RISK_SCORE: &str = "$.prediction.riskScore";
    pub const PREDICTION_CONFIDENCE: &str = "$.prediction.confidence";
    pub const PREDICTION_DATE: &str = "$.predictionDate";
    pub const VALID_UNTIL: &str = "$.validUntil";

    pub const REPORT_TYPE: &str = "$.reportType";
    pub const RISK_LEVEL: &str = "$.riskLevel";
    pub const VISIBILITY: &str = "$.visibility";
    pub const PUBLISHED_AT: &str = "$.publishedAt";
    pub const PERIOD_START: &str = "$.reportPeriod.startDate";
    pub const PERIOD_END: &str = "$.reportPeriod.endDate";
    pub const VIEWS: &str = "$.metrics.views";
    pub const DOWNLOADS: &str = "$.metrics.downloads";
    pub const VERSION: &str = "$.version";
}

/// A scalar compared against a document field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Bool(bool),
    Number(f64),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

/// One predicate over a document. All conditions of a [`Filter`] must hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals {
        path: &'static str,
        value: FieldValue,
    },
    OneOf {
        path: &'static str,
        values: Vec<FieldValue>,
    },
    /// Substring match, case-insensitive across Unicode.
    Contains { path: &'static str, needle: String },
    /// Case-insensitive substring match on any of the paths.
    AnyContains {
        paths: &'static [&'static str],
        needle: String,
    },
    /// Inclusive numeric range.
    Between {
        path: &'static str,
        min: f64,
        max: f64,
    },
    /// Timestamp field later than `instant` (or equal, when inclusive).
    After {
        path: &'static str,
        instant: DateTime<Utc>,
        inclusive: bool,
    },
}

/// A conjunction of conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn equals(mut self, path: &'static str, value: impl Into<FieldValue>) -> Self {
        self.conditions.push(Condition::Equals {
            path,
            value: value.into(),
        });
        self
    }

    pub fn one_of<V: Into<FieldValue>>(
        mut self,
        path: &'static str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.conditions.push(Condition::OneOf {
            path,
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn contains(mut self, path: &'static str, needle: impl Into<String>) -> Self {
        self.conditions.push(Condition::Contains {
            path,
            needle: needle.into(),
        });
        self
    }

    pub fn any_contains(
        mut self,
        paths: &'static [&'static str],
        needle: impl Into<String>,
    ) -> Self {
        self.conditions.push(Condition::AnyContains {
            paths,
            needle: needle.into(),
        });
        self
    }

    pub fn between(mut self, path: &'static str, min: f64, max: f64) -> Self {
        self.conditions.push(Condition::Between { path, min, max });
        self
    }

    /// Field strictly later than `instant`.
    pub fn after(mut self, path: &'static str, instant: DateTime<Utc>) -> Self {
        self.conditions.push(Condition::After {
            path,
            instant,
            inclusive: false,
        });
        self
    }

    /// Field at or later than `instant`.
    pub fn since(mut self, path: &'static str, instant: DateTime<Utc>) -> Self {
        self.conditions.push(Condition::After {
            path,
            instant,
            inclusive: true,
        });
        self
    }

    /// Apply `f` only when `value` is present.
    pub fn when<T>(self, value: Option<T>, f: impl FnOnce(Self, T) -> Self) -> Self {
        match value {
            Some(value) => f(self, value),
            None => self,
        }
    }

    /// `isActive == true` and the expiry field still in the future.
    pub fn live(self, expiry_path: &'static str, now: DateTime<Utc>) -> Self {
        self.equals(path::IS_ACTIVE, true).after(expiry_path, now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    #[default]
    Desc,
}

/// Sort order for a listing. Ties fall back to insertion order in the same
/// direction so pages never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub path: &'static str,
    pub direction: Direction,
}

impl Sort {
    pub fn newest_first() -> Self {
        Self {
            path: path::CREATED_AT,
            direction: Direction::Desc,
        }
    }

    pub fn desc(path: &'static str) -> Self {
        Self {
            path,
            direction: Direction::Desc,
        }
    }

    /// Resolve a caller-supplied field name against an allow-list of
    /// `(name, path)` pairs. Defaults to `createdAt`, descending.
    pub fn resolve(
        field: Option<&str>,
        direction: Option<Direction>,
        allowed: &[(&str, &'static str)],
    ) -> Result<Self, ValidationError> {
        let direction = direction.unwrap_or_default();
        let Some(field) = field.filter(|f| !f.is_empty()) else {
            return Ok(Self {
                path: path::CREATED_AT,
                direction,
            });
        };

        allowed
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, path)| Self { path, direction })
            .ok_or_else(|| {
                let names: Vec<&str> = allowed.iter().map(|(name, _)| *name).collect();
                ValidationError(format!(
                    "Cannot sort by '{field}'; expected one of: {}",
                    names.join(", ")
                ))
            })
    }
}

/// A one-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(
        number: Option<u32>,
        limit: Option<u32>,
        default_limit: u32,
    ) -> Result<Self, ValidationError> {
        let number = number.unwrap_or(1);
        let limit = limit.unwrap_or(default_limit);

        if number == 0 {
            return Err(ValidationError::new("page must be at least 1"));
        }
        if limit == 0 {
            return Err(ValidationError::new("limit must be at least 1"));
        }
        Ok(Self { number, limit })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.limit)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.limit))
    }

    pub fn describe(&self, count: usize, total: u64) -> Pagination {
        Pagination {
            current: self.number,
            total: self.total_pages(total),
            count,
            total_records: total,
        }
    }
}

/// Pagination block of a list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Current page, one-based.
    pub current: u32,
    /// Total number of pages.
    pub total: u64,
    /// Items on this page.
    pub count: usize,
    pub total_records: u64,
}

/// A filter, an order and a window.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub filter: Filter,
    pub sort: Sort,
    pub page: Page,
}

/// A latitude/longitude box around a center point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    /// Box of half-width `radius_km` around `(latitude, longitude)`.
    ///
    /// The longitude span widens with latitude as `1 / cos(lat)`.
    pub fn around(latitude: f64, longitude: f64, radius_km: f64) -> Result<Self, ValidationError> {
        Coordinates {
            latitude,
            longitude,
        }
        .validate()?;
        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(ValidationError(format!(
                "radius must be zero or greater (got {radius_km})"
            )));
        }

        let latitude_delta = radius_km / KM_PER_DEGREE;
        let longitude_delta = radius_km / (KM_PER_DEGREE * latitude.to_radians().cos());

        Ok(Self {
            min_latitude: latitude - latitude_delta,
            max_latitude: latitude + latitude_delta,
            min_longitude: longitude - longitude_delta,
            max_longitude: longitude + longitude_delta,
        })
    }

    pub fn contains(&self, point: &Coordinates) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&point.latitude)
            && (self.min_longitude..=self.max_longitude).contains(&point.longitude)
    }

    pub fn restrict(&self, filter: Filter) -> Filter {
        filter
            .between(path::LATITUDE, self.min_latitude, self.max_latitude)
            .between(path::LONGITUDE, self.min_longitude, self.max_longitude)
    }
}

/// Query string of `GET /api/alerts`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertCriteria {
    pub severity: Option<Severity>,
    pub alert_type: Option<AlertType>,
    pub status: Option<AlertStatus>,
    pub location: Option<String>,
    /// Defaults to `true`: only live, unexpired alerts.
    pub active: Option<bool>,
    pub limit: Option<u32>,
    pub page: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<Direction>,
}

const ALERT_SORT_FIELDS: &[(&str, &str)] = &[
    ("createdAt", path::CREATED_AT),
    ("updatedAt", path::UPDATED_AT),
    ("expiresAt", path::EXPIRES_AT),
    ("severity", path::SEVERITY),
    ("status", path::STATUS),
    ("alertType", path::ALERT_TYPE),
    ("title", path::TITLE),
    ("location", path::LOCATION),
    ("escalationLevel", path::ESCALATION_LEVEL),
];

impl AlertCriteria {
    pub fn to_query(&self, now: DateTime<Utc>) -> Result<ListQuery, ValidationError> {
        let filter = Filter::new()
            .when(self.severity, |f, s| f.equals(path::SEVERITY, s.as_str()))
            .when(self.alert_type, |f, t| f.equals(path::ALERT_TYPE, t.as_str()))
            .when(self.status, |f, s| f.equals(path::STATUS, s.as_str()))
            .when(non_blank(&self.location), |f, l| f.contains(path::LOCATION, l))
            .when(self.active.unwrap_or(true).then_some(()), |f, ()| {
                f.live(path::EXPIRES_AT, now)
            });

        Ok(ListQuery {
            filter,
            sort: Sort::resolve(self.sort_by.as_deref(), self.sort_order, ALERT_SORT_FIELDS)?,
            page: Page::new(self.page, self.limit, DEFAULT_ALERT_LIMIT)?,
        })
    }
}

/// Query string of `GET /api/predictions`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionCriteria {
    pub risk_level: Option<RiskLevel>,
    pub location: Option<String>,
    /// Defaults to `true`: only live, unexpired predictions.
    pub active: Option<bool>,
    pub limit: Option<u32>,
    pub page: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<Direction>,
}

const PREDICTION_SORT_FIELDS: &[(&str, &str)] = &[
    ("createdAt", path::CREATED_AT),
    ("updatedAt", path::UPDATED_AT),
    ("predictionDate", path::PREDICTION_DATE),
    ("validUntil", path::VALID_UNTIL),
    ("location", path::LOCATION),
    ("riskLevel", path::PREDICTION_RISK_LEVEL),
    ("riskScore", path::PREDICTION_RISK_SCORE),
    ("confidence", path::PREDICTION_CONFIDENCE),
];

impl PredictionCriteria {
    pub fn to_query(&self, now: DateTime<Utc>) -> Result<ListQuery, ValidationError> {
        let filter = Filter::new()
            .when(self.risk_level, |f, r| {
                f.equals(path::PREDICTION_RISK_LEVEL, r.as_str())
            })
            .when(non_blank(&self.location), |f, l| f.contains(path::LOCATION, l))
            .when(self.active.unwrap_or(true).then_some(()), |f, ()| {
                f.live(path::VALID_UNTIL, now)
            });

        Ok(ListQuery {
            filter,
            sort: Sort::resolve(
                self.sort_by.as_deref(),
                self.sort_order,
                PREDICTION_SORT_FIELDS,
            )?,
            page: Page::new(self.page, self.limit, DEFAULT_PREDICTION_LIMIT)?,
        })
    }
}

/// Query string of `GET /api/reports`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCriteria {
    pub report_type: Option<ReportType>,
    pub risk_level: Option<RiskLevel>,
    pub status: Option<ReportStatus>,
    pub location: Option<String>,
    /// Substring of title, description or location.
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub page: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<Direction>,
}

const REPORT_SEARCH_FIELDS: &[&str] = &[path::TITLE, path::DESCRIPTION, path::LOCATION];

const REPORT_SORT_FIELDS: &[(&str, &str)] = &[
    ("createdAt", path::CREATED_AT),
    ("updatedAt", path::UPDATED_AT),
    ("publishedAt", path::PUBLISHED_AT),
    ("title", path::TITLE),
    ("location", path::LOCATION),
    ("reportType", path::REPORT_TYPE),
    ("riskLevel", path::RISK_LEVEL),
    ("status", path::STATUS),
    ("views", path::VIEWS),
    ("version", path::VERSION),
];

impl ReportCriteria {
    pub fn to_query(&self) -> Result<ListQuery, ValidationError> {
        let filter = Filter::new()
            .when(self.report_type, |f, t| {
                f.equals(path::REPORT_TYPE, t.as_str())
            })
            .when(self.risk_level, |f, r| f.equals(path::RISK_LEVEL, r.as_str()))
            .when(self.status, |f, s| f.equals(path::STATUS, s.as_str()))
            .when(non_blank(&self.location), |f, l| f.contains(path::LOCATION, l))
            .when(non_blank(&self.search), |f, s| {
                f.any_contains(REPORT_SEARCH_FIELDS, s)
            });

        Ok(ListQuery {
            filter,
            sort: Sort::resolve(self.sort_by.as_deref(), self.sort_order, REPORT_SORT_FIELDS)?,
            page: Page::new(self.page, self.limit, DEFAULT_REPORT_LIMIT)?,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_math() {
        let page = Page::new(Some(3), Some(10), DEFAULT_ALERT_LIMIT).unwrap();

        assert_eq!(page.offset(), 20);
        assert_eq!(page.total_pages(25), 3);
        assert_eq!(page.total_pages(30), 3);
        assert_eq!(page.total_pages(0), 0);

        let described = page.describe(5, 25);
        assert_eq!(described.current, 3);
        assert_eq!(described.total, 3);
        assert_eq!(described.count, 5);
        assert_eq!(described.total_records, 25);
    }

    #[test]
    fn test_page_defaults_and_bounds() {
        let page = Page::new(None, None, DEFAULT_REPORT_LIMIT).unwrap();
        assert_eq!((page.number, page.limit), (1, 20));

        assert!(Page::new(Some(0), None, 10).is_err());
        assert!(Page::new(None, Some(0), 10).is_err());
    }

    #[test]
    fn test_sort_resolution() {
        let sort = Sort::resolve(None, None, ALERT_SORT_FIELDS).unwrap();
        assert_eq!(sort, Sort::newest_first());

        let sort = Sort::resolve(Some("severity"), Some(Direction::Asc), ALERT_SORT_FIELDS).unwrap();
        assert_eq!(sort.path, path::SEVERITY);
        assert_eq!(sort.direction, Direction::Asc);

        let err = Sort::resolve(Some("doc); DROP TABLE alerts"), None, ALERT_SORT_FIELDS);
        assert!(err.is_err());
    }

    #[test]
    fn test_bounding_box_at_equator() {
        let bbox = BoundingBox::around(0.0, 10.0, 111.0).unwrap();

        assert!((bbox.min_latitude + 1.0).abs() < 1e-9);
        assert!((bbox.max_latitude - 1.0).abs() < 1e-9);
        assert!((bbox.min_longitude - 9.0).abs() < 1e-9);
        assert!((bbox.max_longitude - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounding_box_widens_with_latitude() {
        let bbox = BoundingBox::around(60.0, 0.0, 111.0).unwrap();

        // cos(60°) = 0.5, so the longitude span doubles.
        assert!((bbox.max_longitude - 2.0).abs() < 1e-9);
        assert!((bbox.max_latitude - 61.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounding_box_over_includes_corners() {
        let bbox = BoundingBox::around(0.0, 0.0, 111.0).unwrap();

        // Roughly 157 km from the center, outside the radius but inside the box.
        assert!(bbox.contains(&Coordinates {
            latitude: 0.99,
            longitude: 0.99,
        }));
    }

    #[test]
    fn test_zero_radius_degenerates_to_point() {
        let bbox = BoundingBox::around(37.5, -119.5, 0.0).unwrap();

        assert!(bbox.contains(&Coordinates {
            latitude: 37.5,
            longitude: -119.5,
        }));
        assert!(!bbox.contains(&Coordinates {
            latitude: 37.5 + 1e-6,
            longitude: -119.5,
        }));
    }

    #[test]
    fn test_bounding_box_rejects_bad_input() {
        assert!(BoundingBox::around(0.0, 0.0, -1.0).is_err());
        assert!(BoundingBox::around(91.0, 0.0, 1.0).is_err());
        assert!(BoundingBox::around(0.0, 0.0, f64::NAN).is_err());
    }

    #[test]
    fn test_alert_criteria_default_to_live_only() {
        let now = Utc::now();
        let query = AlertCriteria::default().to_query(now).unwrap();

        assert_eq!(
            query.filter.conditions(),
            &[
                Condition::Equals {
                    path: path::IS_ACTIVE,
                    value: FieldValue::Bool(true),
                },
                Condition::After {
                    path: path::EXPIRES_AT,
                    instant: now,
                    inclusive: false,
                },
            ]
        );
        assert_eq!(query.page.limit, DEFAULT_ALERT_LIMIT);
        assert_eq!(query.sort, Sort::newest_first());
    }

    #[test]
    fn test_alert_criteria_filters() {
        let criteria = AlertCriteria {
            severity: Some(Severity::High),
            status: Some(AlertStatus::InProgress),
            location: Some("  pine ".to_string()),
            active: Some(false),
            ..AlertCriteria::default()
        };
        let query = criteria.to_query(Utc::now()).unwrap();

        assert_eq!(
            query.filter.conditions(),
            &[
                Condition::Equals {
                    path: path::SEVERITY,
                    value: FieldValue::Text("High".to_string()),
                },
                Condition::Equals {
                    path: path::STATUS,
                    value: FieldValue::Text("In Progress".to_string()),
                },
                Condition::Contains {
                    path: path::LOCATION,
                    needle: "pine".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_report_criteria_search() {
        let criteria = ReportCriteria {
            search: Some("drought".to_string()),
            ..ReportCriteria::default()
        };
        let query = criteria.to_query().unwrap();

        assert_eq!(
            query.filter.conditions(),
            &[Condition::AnyContains {
                paths: REPORT_SEARCH_FIELDS,
                needle: "drought".to_string(),
            }]
        );
        assert_eq!(query.page.limit, DEFAULT_REPORT_LIMIT);
    }

    #[test]
    fn test_criteria_parse_from_query_string() {
        let criteria: AlertCriteria = serde_urlencoded_like(
            "severity=Critical&alertType=Fire%20Risk&active=false&limit=10&page=2&sortOrder=asc",
        );

        assert_eq!(criteria.severity, Some(Severity::Critical));
        assert_eq!(criteria.alert_type, Some(AlertType::FireRisk));
        assert_eq!(criteria.active, Some(false));
        assert_eq!(criteria.limit, Some(10));
        assert_eq!(criteria.sort_order, Some(Direction::Asc));
    }

    fn serde_urlencoded_like<T: serde::de::DeserializeOwned>(query: &str) -> T {
        let uri: axum::http::Uri = format!("/?{query}").parse().unwrap();
        axum::extract::Query::<T>::try_from_uri(&uri).unwrap().0
    }
}
