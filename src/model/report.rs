//! Fire risk reports.
//!
//! Status changes are advisory: any status can be written through an update.
//! Only [`Report::publish`] and [`Report::archive`] stamp their timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    Coordinates, Record, RiskLevel, ValidationError, check_max_len, check_non_negative, check_text,
    new_id, timestamp,
};

const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 1000;
const MAX_PREDICTIONS_CHARS: usize = 500;
const MAX_ACTION_CHARS: usize = 200;
const MAX_RECOMMENDATION_DESCRIPTION_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportType {
    #[serde(rename = "Risk Assessment")]
    RiskAssessment,
    #[serde(rename = "Weekly Report")]
    WeeklyReport,
    #[serde(rename = "Monthly Report")]
    MonthlyReport,
    #[serde(rename = "Emergency Report")]
    EmergencyReport,
    #[serde(rename = "Analysis Report")]
    AnalysisReport,
    #[serde(rename = "Trend Analysis")]
    TrendAnalysis,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::RiskAssessment => "Risk Assessment",
            ReportType::WeeklyReport => "Weekly Report",
            ReportType::MonthlyReport => "Monthly Report",
            ReportType::EmergencyReport => "Emergency Report",
            ReportType::AnalysisReport => "Analysis Report",
            ReportType::TrendAnalysis => "Trend Analysis",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReportStatus {
    #[default]
    Draft,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Published,
    Archived,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Draft => "Draft",
            ReportStatus::InProgress => "In Progress",
            ReportStatus::Completed => "Completed",
            ReportStatus::Published => "Published",
            ReportStatus::Archived => "Archived",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeneratedBy {
    System,
    #[default]
    Manual,
    #[serde(rename = "AI")]
    Ai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    #[default]
    Internal,
    Restricted,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "Public",
            Visibility::Internal => "Internal",
            Visibility::Restricted => "Restricted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    Immediate,
    #[serde(rename = "Within 24 hours")]
    Within24Hours,
    #[serde(rename = "Within 1 week")]
    WithinWeek,
    #[serde(rename = "Within 1 month")]
    WithinMonth,
    #[serde(rename = "Long term")]
    LongTerm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportConditions {
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    #[serde(default)]
    pub precipitation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soil_moisture: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecommendation {
    pub priority: RiskLevel,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<Timeframe>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(
        default,
        with = "timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub upload_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPeriod {
    #[serde(
        default,
        with = "timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub shares: u64,
}

/// A stored report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    pub title: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    pub report_type: ReportType,
    #[serde(default)]
    pub status: ReportStatus,
    pub risk_level: RiskLevel,
    pub description: String,
    pub environmental_data: ReportConditions,
    pub predictions: String,
    #[serde(default)]
    pub recommendations: Vec<ReportRecommendation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub report_period: ReportPeriod,
    #[serde(default)]
    pub generated_by: GeneratedBy,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub metrics: Metrics,
    #[serde(default = "initial_version")]
    pub version: u32,
    #[serde(
        default,
        with = "timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

fn initial_version() -> u32 {
    1
}

/// Request body for `POST /api/reports`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    pub title: String,
    pub location: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    pub report_type: ReportType,
    #[serde(default)]
    pub status: ReportStatus,
    pub risk_level: RiskLevel,
    pub description: String,
    pub environmental_data: ReportConditions,
    pub predictions: String,
    #[serde(default)]
    pub recommendations: Vec<ReportRecommendation>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub report_period: ReportPeriod,
    #[serde(default)]
    pub generated_by: GeneratedBy,
    #[serde(default)]
    pub visibility: Visibility,
}

impl Report {
    pub fn create(new: NewReport, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        let report = Self {
            id: new_id(),
            title: new.title.trim().to_string(),
            location: new.location.trim().to_string(),
            coordinates: new.coordinates,
            report_type: new.report_type,
            status: new.status,
            risk_level: new.risk_level,
            description: new.description,
            environmental_data: new.environmental_data,
            predictions: new.predictions,
            recommendations: new.recommendations,
            attachments: new.attachments,
            tags: new.tags.into_iter().map(|t| t.trim().to_string()).collect(),
            report_period: new.report_period,
            generated_by: new.generated_by,
            visibility: new.visibility,
            metrics: Metrics::default(),
            version: initial_version(),
            published_at: None,
            archived_at: None,
            created_at: now,
            updated_at: now,
        };

        report.validate()?;
        Ok(report)
    }

    /// Mark the report published. Publishing again refreshes `published_at`.
    pub fn publish(&mut self, now: DateTime<Utc>) {
        self.status = ReportStatus::Published;
        self.published_at = Some(now);
    }

    pub fn archive(&mut self, now: DateTime<Utc>) {
        self.status = ReportStatus::Archived;
        self.archived_at = Some(now);
    }

    /// Count one content revision.
    pub fn bump_version(&mut self) {
        self.version = self.version.saturating_add(1);
    }

    /// Milliseconds since creation.
    pub fn age(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_milliseconds()
    }

    /// Human readable period, e.g. `Wed May 01 2024 - Fri May 31 2024`.
    pub fn formatted_period(&self) -> Option<String> {
        let start = self.report_period.start_date?;
        let end = self.report_period.end_date?;
        Some(format!(
            "{} - {}",
            start.format("%a %b %d %Y"),
            end.format("%a %b %d %Y")
        ))
    }

    pub fn into_view(self, now: DateTime<Utc>) -> ReportView {
        ReportView {
            age: self.age(now),
            formatted_period: self.formatted_period(),
            report: self,
        }
    }
}

impl Record for Report {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn validate(&self) -> Result<(), ValidationError> {
        check_text("title", &self.title, MAX_TITLE_CHARS)?;
        check_text("location", &self.location, usize::MAX)?;
        check_text("description", &self.description, MAX_DESCRIPTION_CHARS)?;
        check_text("predictions", &self.predictions, MAX_PREDICTIONS_CHARS)?;

        if let Some(coordinates) = &self.coordinates {
            coordinates.validate()?;
        }

        for recommendation in &self.recommendations {
            check_text("recommendations.action", &recommendation.action, MAX_ACTION_CHARS)?;
            check_max_len(
                "recommendations.description",
                recommendation.description.as_deref(),
                MAX_RECOMMENDATION_DESCRIPTION_CHARS,
            )?;
            if let Some(cost) = recommendation.estimated_cost {
                check_non_negative("recommendations.estimatedCost", cost)?;
            }
        }

        if self.version == 0 {
            return Err(ValidationError::new("version must be at least 1"));
        }
        Ok(())
    }
}

/// A report with its derived, never-persisted fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    #[serde(flatten)]
    pub report: Report,
    pub age: i64,
    pub formatted_period: Option<String>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn sample_new_report() -> NewReport {
        NewReport {
            title: "Weekly risk outlook".to_string(),
            location: "Pine Valley".to_string(),
            coordinates: Some(Coordinates {
                latitude: 37.5,
                longitude: -119.5,
            }),
            report_type: ReportType::WeeklyReport,
            status: ReportStatus::Draft,
            risk_level: RiskLevel::Medium,
            description: "Conditions are drying out across the valley floor".to_string(),
            environmental_data: ReportConditions {
                temperature: 28.0,
                humidity: 35.0,
                wind_speed: 12.0,
                precipitation: 0.0,
                soil_moisture: Some(18.0),
            },
            predictions: "Risk likely to rise to High by the weekend".to_string(),
            recommendations: vec![ReportRecommendation {
                priority: RiskLevel::High,
                action: "Clear brush along access roads".to_string(),
                description: None,
                estimated_cost: Some(2_500.0),
                timeframe: Some(Timeframe::WithinWeek),
            }],
            attachments: vec![],
            tags: vec![" weekly ".to_string(), "valley".to_string()],
            report_period: ReportPeriod::default(),
            generated_by: GeneratedBy::Manual,
            visibility: Visibility::Public,
        }
    }

    #[test]
    fn test_create_starts_as_draft_v1() {
        let report = Report::create(sample_new_report(), Utc::now()).unwrap();

        assert_eq!(report.status, ReportStatus::Draft);
        assert_eq!(report.version, 1);
        assert_eq!(report.metrics, Metrics::default());
        assert_eq!(report.tags, vec!["weekly".to_string(), "valley".to_string()]);
    }

    #[test]
    fn test_create_rejects_negative_cost() {
        let mut new = sample_new_report();
        new.recommendations[0].estimated_cost = Some(-1.0);

        assert!(Report::create(new, Utc::now()).is_err());
    }

    #[test]
    fn test_create_rejects_long_description() {
        let mut new = sample_new_report();
        new.description = "x".repeat(1001);

        assert!(Report::create(new, Utc::now()).is_err());
    }

    #[test]
    fn test_publish_is_reentrant() {
        let mut report = Report::create(sample_new_report(), Utc::now()).unwrap();
        let first = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap();

        report.publish(first);
        report.publish(second);

        assert_eq!(report.status, ReportStatus::Published);
        assert_eq!(report.published_at, Some(second));
    }

    #[test]
    fn test_archive_stamps_time() {
        let mut report = Report::create(sample_new_report(), Utc::now()).unwrap();
        let now = Utc::now();

        report.archive(now);

        assert_eq!(report.status, ReportStatus::Archived);
        assert_eq!(report.archived_at, Some(now));
    }

    #[test]
    fn test_formatted_period() {
        let mut report = Report::create(sample_new_report(), Utc::now()).unwrap();
        assert_eq!(report.formatted_period(), None);

        report.report_period = ReportPeriod {
            start_date: Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
            end_date: Some(Utc.with_ymd_and_hms(2024, 5, 31, 0, 0, 0).unwrap()),
        };
        assert_eq!(
            report.formatted_period().as_deref(),
            Some("Wed May 01 2024 - Fri May 31 2024")
        );
    }

    #[test]
    fn test_wire_format_omits_empty_attachments() {
        let report = Report::create(sample_new_report(), Utc::now()).unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["reportType"], "Weekly Report");
        assert_eq!(json["generatedBy"], "Manual");
        assert!(json.get("attachments").is_none());
        assert_eq!(json["recommendations"][0]["timeframe"], "Within 1 week");
    }
}
