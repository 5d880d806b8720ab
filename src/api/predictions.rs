//! Prediction routes, mounted under `/api/predictions`.

use axum::{
    Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use rand::{SeedableRng, rngs::StdRng};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{AppJson, AppPath, AppQuery, AppState, Envelope};
use crate::error::AppResult;
use crate::model::{NewPrediction, RiskLevel};
use crate::model::prediction::{NewConditions, PredictionView};
use crate::query::PredictionCriteria;
use crate::scoring::RiskAssessment;
use crate::service::predictions::PredictionStats;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_predictions).post(create_prediction))
        .route("/assess", post(assess_conditions))
        .route("/stats/summary", get(prediction_stats))
        .route("/area/:lat/:lng/:radius", get(predictions_in_area))
        .route("/risk/:level", get(predictions_by_risk_level))
        .route(
            "/:id",
            get(get_prediction)
                .put(update_prediction)
                .delete(delete_prediction),
        )
        .route("/:id/deactivate", post(deactivate_prediction))
}

/// GET /api/predictions
#[instrument(skip(state))]
pub async fn list_predictions(
    State(state): State<AppState>,
    AppQuery(criteria): AppQuery<PredictionCriteria>,
) -> AppResult<Envelope<Vec<PredictionView>>> {
    let now = Utc::now();
    let listing = state
        .predictions
        .list(&criteria, now)
        .await
        .inspect_err(|e| warn!(error = %e, "Failed to list predictions"))?;

    let views = listing.items.into_iter().map(|p| p.into_view(now)).collect();
    Ok(Envelope::new(views).pagination(listing.pagination))
}

#[instrument(skip(state))]
pub async fn get_prediction(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> AppResult<Envelope<PredictionView>> {
    let prediction = state.predictions.get(&id).await?;
    Ok(Envelope::new(prediction.into_view(Utc::now())))
}

/// POST /api/predictions - Score and store.
///
/// # Request Body
///
/// ```json
/// {
///     "location": "Cedar Ridge",
///     "coordinates": { "latitude": 40.0, "longitude": -120.0 },
///     "environmentalData": { "temperature": 36, "humidity": 10, "windSpeed": 26 }
/// }
/// ```
///
/// Responds `201 Created` with the scored prediction.
#[instrument(skip(state, request))]
pub async fn create_prediction(
    State(state): State<AppState>,
    AppJson(request): AppJson<NewPrediction>,
) -> AppResult<impl IntoResponse> {
    let now = Utc::now();
    let mut rng = StdRng::from_entropy();

    let prediction = state
        .predictions
        .create(request, &mut rng, now)
        .await
        .inspect_err(|e| warn!(error = %e, "Failed to create prediction"))?;

    info!(
        id = %prediction.id,
        risk_level = prediction.prediction.risk_level.as_str(),
        risk_score = prediction.prediction.risk_score,
        "Prediction created"
    );
    Ok(Envelope::new(prediction.into_view(now))
        .message("Prediction created successfully")
        .created())
}

/// POST /api/predictions/assess - Score readings without storing them.
#[instrument(skip(state))]
pub async fn assess_conditions(
    State(state): State<AppState>,
    AppJson(readings): AppJson<NewConditions>,
) -> AppResult<Envelope<RiskAssessment>> {
    let mut rng = StdRng::from_entropy();
    let assessment = state.predictions.assess(readings, &mut rng)?;

    info!(
        risk_level = assessment.risk_level.as_str(),
        risk_score = assessment.risk_score,
        "Conditions assessed"
    );
    Ok(Envelope::new(assessment))
}

#[instrument(skip(state, patch))]
pub async fn update_prediction(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    AppJson(patch): AppJson<Value>,
) -> AppResult<Envelope<PredictionView>> {
    let now = Utc::now();
    let prediction = state
        .predictions
        .update(&id, &patch, now)
        .await
        .inspect_err(|e| warn!(id = %id, error = %e, "Failed to update prediction"))?;

    info!(id = %prediction.id, "Prediction updated");
    Ok(Envelope::new(prediction.into_view(now)).message("Prediction updated successfully"))
}

#[instrument(skip(state))]
pub async fn delete_prediction(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> AppResult<Envelope<Option<()>>> {
    state
        .predictions
        .delete(&id)
        .await
        .inspect_err(|e| warn!(id = %id, error = %e, "Failed to delete prediction"))?;

    info!(id = %id, "Prediction deleted");
    Ok(Envelope::new(None).message("Prediction deleted successfully"))
}

#[instrument(skip(state))]
pub async fn deactivate_prediction(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> AppResult<Envelope<PredictionView>> {
    let now = Utc::now();
    let prediction = state.predictions.deactivate(&id, now).await?;

    info!(id = %prediction.id, "Prediction deactivated");
    Ok(Envelope::new(prediction.into_view(now)).message("Prediction deactivated successfully"))
}

/// GET /api/predictions/area/:lat/:lng/:radius - Radius in kilometres.
#[instrument(skip(state))]
pub async fn predictions_in_area(
    State(state): State<AppState>,
    AppPath((lat, lng, radius)): AppPath<(f64, f64, f64)>,
) -> AppResult<Envelope<Vec<PredictionView>>> {
    let now = Utc::now();
    let predictions = state.predictions.in_area(lat, lng, radius, now).await?;
    let count = predictions.len();

    Ok(Envelope::new(predictions.into_iter().map(|p| p.into_view(now)).collect()).count(count))
}

/// GET /api/predictions/risk/:level - Live predictions at `Low`, `Medium`
/// or `High`.
#[instrument(skip(state))]
pub async fn predictions_by_risk_level(
    State(state): State<AppState>,
    AppPath(level): AppPath<RiskLevel>,
) -> AppResult<Envelope<Vec<PredictionView>>> {
    let now = Utc::now();
    let predictions = state.predictions.by_risk_level(level, now).await?;
    let count = predictions.len();

    Ok(Envelope::new(predictions.into_iter().map(|p| p.into_view(now)).collect()).count(count))
}

#[instrument(skip(state))]
pub async fn prediction_stats(
    State(state): State<AppState>,
) -> AppResult<Envelope<PredictionStats>> {
    let stats = state.predictions.stats(Utc::now()).await?;
    Ok(Envelope::new(stats))
}
