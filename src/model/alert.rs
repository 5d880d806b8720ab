//! Alerts and their lifecycle.
//!
//! # Lifecycle
//!
//! ```text
//!   Active ⇄ Acknowledged → In Progress → Resolved
//!      \__________________________________→ Cancelled
//! ```
//!
//! Escalation is a separate axis: `escalation_level` climbs from 1 to 5 and,
//! from level 3 on, drags severity forward (Medium → High → Critical).
//! Expiry is never stored; it is derived from `expires_at` at read time.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::{
    Coordinates, Record, ValidationError, check_non_negative, check_range, check_text,
    default_expiry, default_true, millis_until, new_id, timestamp,
};

/// Highest escalation level an alert can reach.
pub const MAX_ESCALATION_LEVEL: u8 = 5;

/// Escalation level from which severity is raised automatically.
const SEVERITY_ESCALATION_LEVEL: u8 = 3;

/// Role recorded when an acknowledgement names none.
pub const DEFAULT_ACKNOWLEDGER_ROLE: &str = "User";

const MAX_TITLE_CHARS: usize = 150;
const MAX_MESSAGE_CHARS: usize = 500;
const MILLIS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertType {
    #[serde(rename = "Fire Risk")]
    FireRisk,
    #[serde(rename = "Weather Warning")]
    WeatherWarning,
    #[serde(rename = "System Alert")]
    SystemAlert,
    Emergency,
    Maintenance,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::FireRisk => "Fire Risk",
            AlertType::WeatherWarning => "Weather Warning",
            AlertType::SystemAlert => "System Alert",
            AlertType::Emergency => "Emergency",
            AlertType::Maintenance => "Maintenance",
        }
    }
}

/// Alert severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "Info",
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AlertStatus {
    #[default]
    Active,
    Acknowledged,
    #[serde(rename = "In Progress")]
    InProgress,
    Resolved,
    Cancelled,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "Active",
            AlertStatus::Acknowledged => "Acknowledged",
            AlertStatus::InProgress => "In Progress",
            AlertStatus::Resolved => "Resolved",
            AlertStatus::Cancelled => "Cancelled",
        }
    }

    /// Statuses that still call for attention.
    pub const OPEN: [AlertStatus; 3] = [
        AlertStatus::Active,
        AlertStatus::Acknowledged,
        AlertStatus::InProgress,
    ];
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedArea {
    /// Radius in kilometers.
    #[serde(rename = "radius")]
    pub radius_km: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<u64>,
    #[serde(default)]
    pub landmarks: Vec<String>,
}

/// Weather conditions attached to an alert. Every reading is optional.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precipitation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactorImpact {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFactor {
    pub factor: String,
    pub impact: FactorImpact,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionPriority {
    Low,
    Medium,
    High,
    Immediate,
}

/// Who a recommendation is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Audience {
    #[default]
    #[serde(rename = "General Public")]
    GeneralPublic,
    #[serde(rename = "Emergency Services")]
    EmergencyServices,
    #[serde(rename = "Forest Rangers")]
    ForestRangers,
    #[serde(rename = "Local Authorities")]
    LocalAuthorities,
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecommendation {
    pub priority: ActionPriority,
    pub action: String,
    #[serde(default)]
    pub target: Audience,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgement {
    pub user_id: String,
    pub name: String,
    pub role: String,
    #[serde(with = "timestamp")]
    pub acknowledged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlertSource {
    #[default]
    Automated,
    Manual,
    Sensor,
    Satellite,
    Report,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertMetadata {
    #[serde(default)]
    pub source: AlertSource,
    /// Percentage in `[0, 100]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    Email,
    #[serde(rename = "SMS")]
    Sms,
    Push,
    Radio,
    Siren,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notifications {
    #[serde(default)]
    pub sent: bool,
    #[serde(
        default,
        with = "timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipients: Option<u64>,
}

/// A stored alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub title: String,
    pub message: String,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub location: String,
    pub coordinates: Coordinates,
    pub affected_area: AffectedArea,
    #[serde(default)]
    pub environmental_data: AlertConditions,
    #[serde(default)]
    pub risk_factors: Vec<RiskFactor>,
    #[serde(default)]
    pub recommendations: Vec<AlertRecommendation>,
    #[serde(default)]
    pub status: AlertStatus,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(with = "timestamp")]
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub acknowledged_by: Vec<Acknowledgement>,
    #[serde(default = "default_escalation_level")]
    pub escalation_level: u8,
    /// Ids of related alerts. Non-owning.
    #[serde(default)]
    pub related_alerts: Vec<String>,
    #[serde(default)]
    pub metadata: AlertMetadata,
    #[serde(default)]
    pub notifications: Notifications,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

fn default_escalation_level() -> u8 {
    1
}

/// Request body for `POST /api/alerts`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    pub title: String,
    pub message: String,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub location: String,
    pub coordinates: Coordinates,
    pub affected_area: AffectedArea,
    #[serde(default)]
    pub environmental_data: AlertConditions,
    #[serde(default)]
    pub risk_factors: Vec<RiskFactor>,
    #[serde(default)]
    pub recommendations: Vec<AlertRecommendation>,
    #[serde(default)]
    pub status: AlertStatus,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Defaults to 24 hours after creation.
    #[serde(default, with = "timestamp::option")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_escalation_level")]
    pub escalation_level: u8,
    #[serde(default)]
    pub related_alerts: Vec<String>,
    #[serde(default)]
    pub metadata: AlertMetadata,
    #[serde(default)]
    pub notifications: Notifications,
}

impl Alert {
    /// Build and validate a new alert.
    pub fn create(new: NewAlert, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        let mut related_alerts: Vec<String> = Vec::with_capacity(new.related_alerts.len());
        for id in new.related_alerts {
            if !related_alerts.contains(&id) {
                related_alerts.push(id);
            }
        }

        let alert = Self {
            id: new_id(),
            title: new.title.trim().to_string(),
            message: new.message,
            alert_type: new.alert_type,
            severity: new.severity,
            location: new.location.trim().to_string(),
            coordinates: new.coordinates,
            affected_area: new.affected_area,
            environmental_data: new.environmental_data,
            risk_factors: new.risk_factors,
            recommendations: new.recommendations,
            status: new.status,
            is_active: new.is_active,
            expires_at: new.expires_at.unwrap_or_else(|| default_expiry(now)),
            acknowledged_by: Vec::new(),
            escalation_level: new.escalation_level,
            related_alerts,
            metadata: new.metadata,
            notifications: new.notifications,
            created_at: now,
            updated_at: now,
        };

        alert.validate()?;
        Ok(alert)
    }

    /// Record that someone has seen the alert.
    ///
    /// Each call appends a record; only the first one on an `Active` alert
    /// changes the status.
    pub fn acknowledge(
        &mut self,
        user_id: &str,
        name: &str,
        role: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        validate_acknowledger(user_id, name)?;

        let role = role
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_ACKNOWLEDGER_ROLE);

        self.acknowledged_by.push(Acknowledgement {
            user_id: user_id.trim().to_string(),
            name: name.trim().to_string(),
            role: role.to_string(),
            acknowledged_at: now,
        });

        if self.status == AlertStatus::Active {
            self.status = AlertStatus::Acknowledged;
        }

        Ok(())
    }

    /// Raise the escalation level by one.
    ///
    /// Returns `false` when the alert is already at the top level, in which
    /// case nothing changes. Severity is never lowered.
    pub fn escalate(&mut self) -> bool {
        if self.escalation_level >= MAX_ESCALATION_LEVEL {
            return false;
        }

        self.escalation_level += 1;

        if self.escalation_level >= SEVERITY_ESCALATION_LEVEL {
            self.severity = match self.severity {
                Severity::High => Severity::Critical,
                Severity::Medium => Severity::High,
                other => other,
            };
        }

        true
    }

    /// Move the expiry by `hours`. Negative values move it backwards.
    ///
    /// The new expiry must stay within years 0 to 9999.
    pub fn extend(&mut self, hours: f64) -> Result<(), ValidationError> {
        let millis = hours * MILLIS_PER_HOUR;
        let shifted = (millis.is_finite() && millis.abs() < i64::MAX as f64)
            .then(|| TimeDelta::try_milliseconds(millis.round() as i64))
            .flatten()
            .and_then(|delta| self.expires_at.checked_add_signed(delta))
            .filter(timestamp::is_representable)
            .ok_or_else(|| ValidationError(format!("hours out of range: {hours}")))?;

        self.expires_at = shifted;
        Ok(())
    }

    /// Close the alert for good. Repeating it is harmless.
    pub fn resolve(&mut self) {
        self.status = AlertStatus::Resolved;
        self.is_active = false;
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Milliseconds until expiry, zero once expired.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> i64 {
        millis_until(self.expires_at, now)
    }

    /// Milliseconds since creation.
    pub fn age(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_milliseconds()
    }

    /// Attach the derived fields for API output.
    pub fn into_view(self, now: DateTime<Utc>) -> AlertView {
        AlertView {
            is_expired: self.is_expired(now),
            time_remaining: self.time_remaining(now),
            age: self.age(now),
            alert: self,
        }
    }
}

/// Acknowledgements need a user id and a name.
pub fn validate_acknowledger(user_id: &str, name: &str) -> Result<(), ValidationError> {
    if user_id.trim().is_empty() || name.trim().is_empty() {
        return Err(ValidationError::new("User ID and name are required"));
    }
    Ok(())
}

impl Record for Alert {
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
        check_text("message", &self.message, MAX_MESSAGE_CHARS)?;
        check_text("location", &self.location, usize::MAX)?;
        self.coordinates.validate()?;
        check_non_negative("affectedArea.radius", self.affected_area.radius_km)?;

        if !(1..=MAX_ESCALATION_LEVEL).contains(&self.escalation_level) {
            return Err(ValidationError(format!(
                "escalationLevel must be between 1 and {MAX_ESCALATION_LEVEL} (got {})",
                self.escalation_level
            )));
        }

        if let Some(confidence) = self.metadata.confidence {
            check_range("metadata.confidence", confidence, 0.0, 100.0)?;
        }

        for factor in &self.risk_factors {
            check_text("riskFactors.factor", &factor.factor, usize::MAX)?;
        }
        for recommendation in &self.recommendations {
            check_text("recommendations.action", &recommendation.action, usize::MAX)?;
        }

        Ok(())
    }
}

/// An alert with its derived, never-persisted fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertView {
    #[serde(flatten)]
    pub alert: Alert,
    pub is_expired: bool,
    /// Milliseconds until expiry.
    pub time_remaining: i64,
    /// Milliseconds since creation.
    pub age: i64,
}
