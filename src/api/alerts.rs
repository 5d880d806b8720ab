//! Alert routes, mounted under `/api/alerts`.
//!
//! Lifecycle actions (`acknowledge`, `escalate`, `extend`, `resolve`) are
//! `POST`s on the alert and answer with the updated alert.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{AppJson, AppPath, AppQuery, AppState, Envelope};
use crate::error::{AppError, AppResult};
use crate::model::NewAlert;
use crate::model::alert::AlertView;
use crate::query::AlertCriteria;
use crate::service::alerts::AlertStats;

const DEFAULT_EXTENSION_HOURS: f64 = 24.0;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_alerts).post(create_alert))
        .route("/active", get(active_alerts))
        .route("/critical", get(critical_alerts))
        .route("/stats/summary", get(alert_stats))
        .route("/area/:lat/:lng/:radius", get(alerts_in_area))
        .route("/:id", get(get_alert).put(update_alert))
        .route("/:id/acknowledge", post(acknowledge_alert))
        .route("/:id/escalate", post(escalate_alert))
        .route("/:id/extend", post(extend_alert))
        .route("/:id/resolve", post(resolve_alert))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeBody {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    pub user_role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtendBody {
    pub hours: Option<f64>,
}

impl ExtendBody {
    /// An empty body means the default extension. Anything else must be a
    /// valid JSON object.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, AppError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(raw).map_err(|e| AppError::Validation(e.to_string()))
    }

    pub fn hours(&self) -> f64 {
        self.hours.unwrap_or(DEFAULT_EXTENSION_HOURS)
    }
}

/// GET /api/alerts
///
/// Filters: `severity`, `alertType`, `status`, `location` (substring),
/// `active` (default `true`). Paging with `page`/`limit`, ordering with
/// `sortBy`/`sortOrder`.
#[instrument(skip(state))]
pub async fn list_alerts(
    State(state): State<AppState>,
    AppQuery(criteria): AppQuery<AlertCriteria>,
) -> AppResult<Envelope<Vec<AlertView>>> {
    let now = Utc::now();
    let listing = state
        .alerts
        .list(&criteria, now)
        .await
        .inspect_err(|e| warn!(error = %e, "Failed to list alerts"))?;

    info!(
        count = listing.items.len(),
        total = listing.pagination.total_records,
        "Alerts listed"
    );
    let views = listing.items.into_iter().map(|a| a.into_view(now)).collect();
    Ok(Envelope::new(views).pagination(listing.pagination))
}

/// GET /api/alerts/active - Live alerts, most severe first.
#[instrument(skip(state))]
pub async fn active_alerts(State(state): State<AppState>) -> AppResult<Envelope<Vec<AlertView>>> {
    let now = Utc::now();
    let alerts = state.alerts.active(now).await?;

    Ok(Envelope::new(
        alerts.into_iter().map(|a| a.into_view(now)).collect(),
    ))
}

/// GET /api/alerts/critical
#[instrument(skip(state))]
pub async fn critical_alerts(State(state): State<AppState>) -> AppResult<Envelope<Vec<AlertView>>> {
    let now = Utc::now();
    let alerts = state.alerts.critical(now).await?;

    Ok(Envelope::new(
        alerts.into_iter().map(|a| a.into_view(now)).collect(),
    ))
}

#[instrument(skip(state))]
pub async fn get_alert(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> AppResult<Envelope<AlertView>> {
    let alert = state.alerts.get(&id).await?;
    Ok(Envelope::new(alert.into_view(Utc::now())))
}

/// POST /api/alerts
///
/// Responds `201 Created`. `expiresAt` defaults to 24 hours from now.
#[instrument(skip(state, request))]
pub async fn create_alert(
    State(state): State<AppState>,
    AppJson(request): AppJson<NewAlert>,
) -> AppResult<impl IntoResponse> {
    let now = Utc::now();
    let alert = state
        .alerts
        .create(request, now)
        .await
        .inspect_err(|e| warn!(error = %e, "Failed to create alert"))?;

    info!(
        id = %alert.id,
        severity = alert.severity.as_str(),
        location = %alert.location,
        "Alert created"
    );
    Ok(Envelope::new(alert.into_view(now))
        .message("Alert created successfully")
        .created())
}

/// PUT /api/alerts/:id - Partial update.
#[instrument(skip(state, patch))]
pub async fn update_alert(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    AppJson(patch): AppJson<Value>,
) -> AppResult<Envelope<AlertView>> {
    let now = Utc::now();
    let alert = state
        .alerts
        .update(&id, &patch, now)
        .await
        .inspect_err(|e| warn!(id = %id, error = %e, "Failed to update alert"))?;

    info!(id = %alert.id, "Alert updated");
    Ok(Envelope::new(alert.into_view(now)).message("Alert updated successfully"))
}

/// POST /api/alerts/:id/acknowledge
///
/// ```json
/// { "userId": "u-17", "userName": "Dana Ortiz", "userRole": "Ranger" }
/// ```
///
/// `userId` and `userName` are required.
#[instrument(skip(state, body))]
pub async fn acknowledge_alert(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    AppJson(body): AppJson<AcknowledgeBody>,
) -> AppResult<Envelope<AlertView>> {
    let now = Utc::now();
    let alert = state
        .alerts
        .acknowledge(
            &id,
            &body.user_id,
            &body.user_name,
            body.user_role.as_deref(),
            now,
        )
        .await
        .inspect_err(|e| warn!(id = %id, error = %e, "Failed to acknowledge alert"))?;

    info!(
        id = %alert.id,
        acknowledgements = alert.acknowledged_by.len(),
        "Alert acknowledged"
    );
    Ok(Envelope::new(alert.into_view(now)).message("Alert acknowledged successfully"))
}

/// POST /api/alerts/:id/escalate
///
/// Raises the escalation level by one, up to 5. Every step that reaches
/// level 3 or higher raises the severity one notch (Medium to High, High
/// to Critical).
#[instrument(skip(state))]
pub async fn escalate_alert(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> AppResult<Envelope<AlertView>> {
    let now = Utc::now();
    let alert = state
        .alerts
        .escalate(&id, now)
        .await
        .inspect_err(|e| warn!(id = %id, error = %e, "Failed to escalate alert"))?;

    info!(
        id = %alert.id,
        level = alert.escalation_level,
        severity = alert.severity.as_str(),
        "Alert escalated"
    );
    Ok(Envelope::new(alert.into_view(now)).message("Alert escalated successfully"))
}

/// POST /api/alerts/:id/extend
///
/// Body `{ "hours": 12 }` is optional; 24 hours when the body or `hours`
/// is absent. A body that is not valid JSON is a 400.
#[instrument(skip(state, body))]
pub async fn extend_alert(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    body: Bytes,
) -> AppResult<Envelope<AlertView>> {
    let now = Utc::now();
    let hours = ExtendBody::from_bytes(&body)
        .inspect_err(|e| warn!(id = %id, error = %e, "Rejected extend body"))?
        .hours();

    let alert = state
        .alerts
        .extend(&id, hours, now)
        .await
        .inspect_err(|e| warn!(id = %id, hours, error = %e, "Failed to extend alert"))?;

    info!(id = %alert.id, hours, "Alert extended");
    Ok(Envelope::new(alert.into_view(now)).message(format!("Alert extended by {hours} hours")))
}

#[instrument(skip(state))]
pub async fn resolve_alert(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> AppResult<Envelope<AlertView>> {
    let now = Utc::now();
    let alert = state
        .alerts
        .resolve(&id, now)
        .await
        .inspect_err(|e| warn!(id = %id, error = %e, "Failed to resolve alert"))?;

    info!(id = %alert.id, "Alert resolved");
    Ok(Envelope::new(alert.into_view(now)).message("Alert resolved successfully"))
}

/// GET /api/alerts/area/:lat/:lng/:radius - Radius in kilometres.
#[instrument(skip(state))]
pub async fn alerts_in_area(
    State(state): State<AppState>,
    AppPath((lat, lng, radius)): AppPath<(f64, f64, f64)>,
) -> AppResult<Envelope<Vec<AlertView>>> {
    let now = Utc::now();
    let alerts = state.alerts.in_area(lat, lng, radius, now).await?;
    let count = alerts.len();

    info!(lat, lng, radius, count, "Area alerts queried");
    Ok(Envelope::new(alerts.into_iter().map(|a| a.into_view(now)).collect()).count(count))
}

#[instrument(skip(state))]
pub async fn alert_stats(State(state): State<AppState>) -> AppResult<Envelope<AlertStats>> {
    let stats = state.alerts.stats(Utc::now()).await?;
    Ok(Envelope::new(stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_body_defaults_only_when_absent() {
        assert_eq!(ExtendBody::from_bytes(b"").unwrap().hours(), 24.0);
        assert_eq!(ExtendBody::from_bytes(b"  \n").unwrap().hours(), 24.0);
        assert_eq!(ExtendBody::from_bytes(b"{}").unwrap().hours(), 24.0);
        assert_eq!(ExtendBody::from_bytes(br#"{"hours": -6}"#).unwrap().hours(), -6.0);

        assert!(matches!(
            ExtendBody::from_bytes(br#"{"hours": "twelve"}"#),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            ExtendBody::from_bytes(b"{hours"),
            Err(AppError::Validation(_))
        ));
    }
}
