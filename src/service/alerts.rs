//! Alert listings, lifecycle transitions and statistics.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;

use super::{Change, Listing, merge_patch, modify};
use crate::error::{AppError, AppResult};
use crate::model::alert::validate_acknowledger;
use crate::model::{Alert, AlertStatus, NewAlert, Severity, timestamp};
use crate::query::{AlertCriteria, BoundingBox, Filter, ListQuery, Sort, path};
use crate::storage::{Collection, Storage};

/// Window of the `recentCount` statistic.
const RECENT_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertStats {
    pub summary: AlertSummary,
    /// Alerts created in the last 24 hours.
    pub recent_count: u64,
    #[serde(with = "timestamp")]
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSummary {
    pub total_alerts: u64,
    pub active_alerts: u64,
    pub critical_alerts: u64,
    pub by_severity: Vec<SeverityCount>,
    pub by_status: Vec<StatusCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeverityCount {
    pub severity: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Clone)]
pub struct AlertService {
    storage: Storage,
}

impl AlertService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub async fn list(&self, criteria: &AlertCriteria, now: DateTime<Utc>) -> AppResult<Listing<Alert>> {
        let ListQuery { filter, sort, page } = criteria.to_query(now)?;

        let items: Vec<Alert> = self.storage.find(&filter, sort, Some(page)).await?;
        let total = self.storage.count(Collection::Alerts, &filter).await?;

        Ok(Listing {
            pagination: page.describe(items.len(), total),
            items,
        })
    }

    /// Live alerts that still need attention, most severe first.
    pub async fn active(&self, now: DateTime<Utc>) -> AppResult<Vec<Alert>> {
        let filter = Filter::new()
            .live(path::EXPIRES_AT, now)
            .one_of(path::STATUS, AlertStatus::OPEN.iter().map(|s| s.as_str()));

        let mut alerts: Vec<Alert> = self.storage.find(&filter, Sort::newest_first(), None).await?;
        // Severity is stored as text, so rank it here. The sort is stable
        // and keeps newest-first within a severity.
        alerts.sort_by(|a, b| b.severity.cmp(&a.severity));
        Ok(alerts)
    }

    pub async fn critical(&self, now: DateTime<Utc>) -> AppResult<Vec<Alert>> {
        let filter = Filter::new()
            .equals(path::SEVERITY, Severity::Critical.as_str())
            .live(path::EXPIRES_AT, now);

        Ok(self.storage.find(&filter, Sort::newest_first(), None).await?)
    }

    pub async fn get(&self, id: &str) -> AppResult<Alert> {
        self.storage
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(Collection::Alerts.entity(), id))
    }

    pub async fn create(&self, new: NewAlert, now: DateTime<Utc>) -> AppResult<Alert> {
        let alert = Alert::create(new, now)?;
        self.storage.insert(&alert).await?;
        Ok(alert)
    }

    pub async fn update(&self, id: &str, patch: &Value, now: DateTime<Utc>) -> AppResult<Alert> {
        modify(&self.storage, id, now, |alert: &mut Alert| {
            *alert = merge_patch(alert, patch)?;
            Ok(Change::Modified)
        })
        .await
    }

    /// The acknowledger is checked before the store is read.
    pub async fn acknowledge(
        &self,
        id: &str,
        user_id: &str,
        name: &str,
        role: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<Alert> {
        validate_acknowledger(user_id, name)?;

        modify(&self.storage, id, now, |alert: &mut Alert| {
            alert.acknowledge(user_id, name, role, now)?;
            Ok(Change::Modified)
        })
        .await
    }

    /// A no-op at the top escalation level.
    pub async fn escalate(&self, id: &str, now: DateTime<Utc>) -> AppResult<Alert> {
        modify(&self.storage, id, now, |alert: &mut Alert| {
            Ok(if alert.escalate() {
                Change::Modified
            } else {
                Change::Unchanged
            })
        })
        .await
    }

    pub async fn extend(&self, id: &str, hours: f64, now: DateTime<Utc>) -> AppResult<Alert> {
        modify(&self.storage, id, now, |alert: &mut Alert| {
            alert.extend(hours)?;
            Ok(Change::Modified)
        })
        .await
    }

    pub async fn resolve(&self, id: &str, now: DateTime<Utc>) -> AppResult<Alert> {
        modify(&self.storage, id, now, |alert: &mut Alert| {
            alert.resolve();
            Ok(Change::Modified)
        })
        .await
    }

    /// Live alerts inside the bounding box of the radius.
    pub async fn in_area(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Alert>> {
        let bbox = BoundingBox::around(latitude, longitude, radius_km)?;
        let filter = bbox.restrict(Filter::new().live(path::EXPIRES_AT, now));

        Ok(self.storage.find(&filter, Sort::newest_first(), None).await?)
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> AppResult<AlertStats> {
        let all = Filter::new();
        let storage = &self.storage;

        let total_alerts = storage.count(Collection::Alerts, &all).await?;
        let active_alerts = storage
            .count(Collection::Alerts, &Filter::new().live(path::EXPIRES_AT, now))
            .await?;
        let critical_alerts = storage
            .count(
                Collection::Alerts,
                &Filter::new().equals(path::SEVERITY, Severity::Critical.as_str()),
            )
            .await?;

        let by_severity = storage
            .count_by(Collection::Alerts, path::SEVERITY, &all)
            .await?
            .into_iter()
            .map(|(severity, count)| SeverityCount { severity, count })
            .collect();
        let by_status = storage
            .count_by(Collection::Alerts, path::STATUS, &all)
            .await?
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect();

        let recent_count = storage
            .count(
                Collection::Alerts,
                &Filter::new().since(path::CREATED_AT, now - Duration::hours(RECENT_HOURS)),
            )
            .await?;

        Ok(AlertStats {
            summary: AlertSummary {
                total_alerts,
                active_alerts,
                critical_alerts,
                by_severity,
                by_status,
            },
            recent_count,
            last_updated: now,
        })
    }
}
