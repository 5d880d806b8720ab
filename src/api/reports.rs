//! Report routes, mounted under `/api/reports`.
//!
//! Reading one report counts a view. Listings leave attachments out.

use axum::{
    Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{AppJson, AppPath, AppQuery, AppState, Envelope};
use crate::error::AppResult;
use crate::model::NewReport;
use crate::model::report::ReportView;
use crate::query::ReportCriteria;
use crate::service::reports::{DEFAULT_RECENT_DAYS, ReportStats};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_reports).post(create_report))
        .route("/published", get(published_reports))
        .route("/recent", get(recent_reports))
        .route("/stats/summary", get(report_stats))
        .route(
            "/:id",
            get(get_report).put(update_report).delete(delete_report),
        )
        .route("/:id/publish", post(publish_report))
        .route("/:id/archive", post(archive_report))
}

/// GET /api/reports
///
/// Filters: `reportType`, `riskLevel`, `status`, `location`, and `search`
/// across title, description and location.
#[instrument(skip(state))]
pub async fn list_reports(
    State(state): State<AppState>,
    AppQuery(criteria): AppQuery<ReportCriteria>,
) -> AppResult<Envelope<Vec<ReportView>>> {
    let now = Utc::now();
    let listing = state
        .reports
        .list(&criteria)
        .await
        .inspect_err(|e| warn!(error = %e, "Failed to list reports"))?;

    info!(
        count = listing.items.len(),
        total = listing.pagination.total_records,
        "Reports listed"
    );
    let views = listing.items.into_iter().map(|r| r.into_view(now)).collect();
    Ok(Envelope::new(views).pagination(listing.pagination))
}

/// GET /api/reports/published - Public and internal reports only.
#[instrument(skip(state))]
pub async fn published_reports(
    State(state): State<AppState>,
) -> AppResult<Envelope<Vec<ReportView>>> {
    let now = Utc::now();
    let reports = state.reports.published().await?;

    Ok(Envelope::new(
        reports.into_iter().map(|r| r.into_view(now)).collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub days: Option<u32>,
}

/// GET /api/reports/recent - Completed or published reports created in the
/// last `days` days (default 7).
#[instrument(skip(state))]
pub async fn recent_reports(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<RecentQuery>,
) -> AppResult<Envelope<Vec<ReportView>>> {
    let now = Utc::now();
    let days = query.days.map_or(DEFAULT_RECENT_DAYS, i64::from);
    let reports = state.reports.recent(days, now).await?;
    let count = reports.len();

    info!(days, count, "Recent reports queried");
    Ok(Envelope::new(reports.into_iter().map(|r| r.into_view(now)).collect()).count(count))
}

/// GET /api/reports/:id - Counts one view.
#[instrument(skip(state))]
pub async fn get_report(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> AppResult<Envelope<ReportView>> {
    let report = state.reports.get(&id).await?;
    Ok(Envelope::new(report.into_view(Utc::now())))
}

#[instrument(skip(state, request))]
pub async fn create_report(
    State(state): State<AppState>,
    AppJson(request): AppJson<NewReport>,
) -> AppResult<impl IntoResponse> {
    let now = Utc::now();
    let report = state
        .reports
        .create(request, now)
        .await
        .inspect_err(|e| warn!(error = %e, "Failed to create report"))?;

    info!(
        id = %report.id,
        report_type = report.report_type.as_str(),
        "Report created"
    );
    Ok(Envelope::new(report.into_view(now))
        .message("Report created successfully")
        .created())
}

/// PUT /api/reports/:id - Partial update. Bumps `version`.
#[instrument(skip(state, patch))]
pub async fn update_report(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    AppJson(patch): AppJson<Value>,
) -> AppResult<Envelope<ReportView>> {
    let now = Utc::now();
    let report = state
        .reports
        .update(&id, &patch, now)
        .await
        .inspect_err(|e| warn!(id = %id, error = %e, "Failed to update report"))?;

    info!(id = %report.id, version = report.version, "Report updated");
    Ok(Envelope::new(report.into_view(now)).message("Report updated successfully"))
}

#[instrument(skip(state))]
pub async fn delete_report(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> AppResult<Envelope<Option<()>>> {
    state
        .reports
        .delete(&id)
        .await
        .inspect_err(|e| warn!(id = %id, error = %e, "Failed to delete report"))?;

    info!(id = %id, "Report deleted");
    Ok(Envelope::new(None).message("Report deleted successfully"))
}

#[instrument(skip(state))]
pub async fn publish_report(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> AppResult<Envelope<ReportView>> {
    let now = Utc::now();
    let report = state
        .reports
        .publish(&id, now)
        .await
        .inspect_err(|e| warn!(id = %id, error = %e, "Failed to publish report"))?;

    info!(id = %report.id, "Report published");
    Ok(Envelope::new(report.into_view(now)).message("Report published successfully"))
}

#[instrument(skip(state))]
pub async fn archive_report(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> AppResult<Envelope<ReportView>> {
    let now = Utc::now();
    let report = state
        .reports
        .archive(&id, now)
        .await
        .inspect_err(|e| warn!(id = %id, error = %e, "Failed to archive report"))?;

    info!(id = %report.id, "Report archived");
    Ok(Envelope::new(report.into_view(now)).message("Report archived successfully"))
}

#[instrument(skip(state))]
pub async fn report_stats(State(state): State<AppState>) -> AppResult<Envelope<ReportStats>> {
    let stats = state.reports.stats(Utc::now()).await?;
    Ok(Envelope::new(stats))
}
