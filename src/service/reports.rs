//! Report storage, publishing and statistics.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;

use super::{Change, Listing, merge_patch, modify};
use crate::error::{AppError, AppResult};
use crate::model::report::Visibility;
use crate::model::{NewReport, Report, ReportStatus, timestamp};
use crate::query::{Filter, ListQuery, ReportCriteria, Sort, path};
use crate::storage::{Collection, Storage};

pub const DEFAULT_RECENT_DAYS: i64 = 7;

/// Statuses that count as finished work.
const FINISHED: [ReportStatus; 2] = [ReportStatus::Completed, ReportStatus::Published];

/// Visibilities listed among published reports.
const LISTED: [Visibility; 2] = [Visibility::Public, Visibility::Internal];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStats {
    pub summary: ReportSummary,
    /// Finished reports created in the last 7 days.
    pub recent_count: u64,
    pub published_count: u64,
    #[serde(with = "timestamp")]
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_reports: u64,
    pub by_status: Vec<StatusCount>,
    pub by_risk_level: Vec<RiskLevelCount>,
    pub by_type: Vec<TypeCount>,
    pub total_views: i64,
    pub total_downloads: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskLevelCount {
    pub risk_level: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeCount {
    pub report_type: String,
    pub count: i64,
}

#[derive(Clone)]
pub struct ReportService {
    storage: Storage,
}

impl ReportService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// One page of reports. Attachments are left out of list items.
    pub async fn list(&self, criteria: &ReportCriteria) -> AppResult<Listing<Report>> {
        let ListQuery { filter, sort, page } = criteria.to_query()?;

        let mut items: Vec<Report> = self.storage.find(&filter, sort, Some(page)).await?;
        for report in &mut items {
            report.attachments.clear();
        }
        let total = self.storage.count(Collection::Reports, &filter).await?;

        Ok(Listing {
            pagination: page.describe(items.len(), total),
            items,
        })
    }

    /// Fetch a report and count the view.
    pub async fn get(&self, id: &str) -> AppResult<Report> {
        if !self
            .storage
            .increment(Collection::Reports, id, path::VIEWS, 1)
            .await?
        {
            return Err(self.not_found(id));
        }

        self.storage
            .find_by_id(id)
            .await?
            .ok_or_else(|| self.not_found(id))
    }

    pub async fn create(&self, new: NewReport, now: DateTime<Utc>) -> AppResult<Report> {
        let report = Report::create(new, now)?;
        self.storage.insert(&report).await?;
        Ok(report)
    }

    /// Apply a partial update and count one revision.
    ///
    /// The version is derived from the stored one, never taken from the
    /// patch.
    pub async fn update(&self, id: &str, patch: &Value, now: DateTime<Utc>) -> AppResult<Report> {
        modify(&self.storage, id, now, |report: &mut Report| {
            let version = report.version;
            *report = merge_patch(report, patch)?;
            report.version = version;
            report.bump_version();
            Ok(Change::Modified)
        })
        .await
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        if self.storage.delete(Collection::Reports, id).await? {
            Ok(())
        } else {
            Err(self.not_found(id))
        }
    }

    pub async fn publish(&self, id: &str, now: DateTime<Utc>) -> AppResult<Report> {
        modify(&self.storage, id, now, |report: &mut Report| {
            report.publish(now);
            Ok(Change::Modified)
        })
        .await
    }

    pub async fn archive(&self, id: &str, now: DateTime<Utc>) -> AppResult<Report> {
        modify(&self.storage, id, now, |report: &mut Report| {
            report.archive(now);
            Ok(Change::Modified)
        })
        .await
    }

    /// Published, non-restricted reports, most recently published first.
    pub async fn published(&self) -> AppResult<Vec<Report>> {
        let filter = Filter::new()
            .equals(path::STATUS, ReportStatus::Published.as_str())
            .one_of(path::VISIBILITY, LISTED.iter().map(|v| v.as_str()));

        Ok(self
            .storage
            .find(&filter, Sort::desc(path::PUBLISHED_AT), None)
            .await?)
    }

    /// Finished reports created within the last `days` days.
    pub async fn recent(&self, days: i64, now: DateTime<Utc>) -> AppResult<Vec<Report>> {
        Ok(self
            .storage
            .find(&recent_filter(days, now), Sort::newest_first(), None)
            .await?)
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> AppResult<ReportStats> {
        let all = Filter::new();
        let storage = &self.storage;

        let by_status = storage
            .count_by(Collection::Reports, path::STATUS, &all)
            .await?
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect();
        let by_risk_level = storage
            .count_by(Collection::Reports, path::RISK_LEVEL, &all)
            .await?
            .into_iter()
            .map(|(risk_level, count)| RiskLevelCount { risk_level, count })
            .collect();
        let by_type = storage
            .count_by(Collection::Reports, path::REPORT_TYPE, &all)
            .await?
            .into_iter()
            .map(|(report_type, count)| TypeCount { report_type, count })
            .collect();

        let summary = ReportSummary {
            total_reports: storage.count(Collection::Reports, &all).await?,
            by_status,
            by_risk_level,
            by_type,
            total_views: storage.sum(Collection::Reports, path::VIEWS, &all).await?,
            total_downloads: storage.sum(Collection::Reports, path::DOWNLOADS, &all).await?,
        };

        let recent_count = storage
            .count(Collection::Reports, &recent_filter(DEFAULT_RECENT_DAYS, now))
            .await?;
        let published_count = storage
            .count(
                Collection::Reports,
                &Filter::new().equals(path::STATUS, ReportStatus::Published.as_str()),
            )
            .await?;

        Ok(ReportStats {
            summary,
            recent_count,
            published_count,
            last_updated: now,
        })
    }

    fn not_found(&self, id: &str) -> AppError {
        AppError::not_found(Collection::Reports.entity(), id)
    }
}

fn recent_filter(days: i64, now: DateTime<Utc>) -> Filter {
    Filter::new()
        .since(path::CREATED_AT, now - Duration::days(days))
        .one_of(path::STATUS, FINISHED.iter().map(|s| s.as_str()))
}
