//! HTTP API for FireWatch.
//!
//! Every response is JSON. Successful calls answer with an [`Envelope`]:
//!
//! ```json
//! {
//!     "success": true,
//!     "data": { ... },
//!     "message": "Alert created successfully",
//!     "pagination": { "current": 1, "total": 3, "count": 10, "totalRecords": 25 }
//! }
//! ```
//!
//! `message`, `pagination` and `count` appear only where they apply.
//! Failures carry `{ "success": false, "error", "message" }` with the
//! status code chosen by [`AppError`].
//!
//! # Endpoints
//!
//! - `/api/alerts/...` - Alert listings and lifecycle, see [`alerts`]
//! - `/api/predictions/...` - Scoring and predictions, see [`predictions`]
//! - `/api/reports/...` - Reports, see [`reports`]
//! - `GET /api/health` - Liveness and uptime
//! - `GET /` - Endpoint directory

pub mod alerts;
pub mod predictions;
pub mod reports;

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRequest, FromRequestParts, OriginalUri, Request, State},
    http::{
        HeaderValue, Method, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, warn};

use crate::config::Config;
use crate::error::{AppError, ErrorBody, INTERNAL_ERROR_MESSAGE};
use crate::model::timestamp;
use crate::query::Pagination;
use crate::service::{AlertService, PredictionService, ReportService};
use crate::storage::Storage;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub alerts: AlertService,
    pub predictions: PredictionService,
    pub reports: ReportService,
    pub config: Arc<Config>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(storage: Storage, config: Config) -> Self {
        Self {
            alerts: AlertService::new(storage.clone()),
            predictions: PredictionService::new(storage.clone()),
            reports: ReportService::new(storage),
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }
}

/// JSON body extractor whose rejections become [`AppError::Validation`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Query string extractor whose rejections become [`AppError::Validation`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

/// Path extractor whose rejections become [`AppError::Validation`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

/// Successful response body.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
            pagination: None,
            count: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Respond with `201 Created`.
    pub fn created(self) -> (StatusCode, Json<Self>) {
        (StatusCode::CREATED, Json(self))
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Build the full application router with middleware.
pub fn router(state: AppState) -> Router {
    let config = Arc::clone(&state.config);
    let production = config.environment.is_production();

    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health))
        .nest("/api/alerts", alerts::routes())
        .nest("/api/predictions", predictions::routes())
        .nest("/api/reports", reports::routes())
        .fallback(route_not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            redact_internal_errors,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(
                    move |panic: Box<dyn Any + Send + 'static>| panic_response(panic, production),
                ))
                .layer(cors(&config))
                .layer(DefaultBodyLimit::max(config.body_limit_bytes)),
        )
        .with_state(state)
}

fn cors(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring unparsable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    message: &'static str,
    #[serde(with = "timestamp")]
    timestamp: DateTime<Utc>,
    /// Seconds since startup.
    uptime: f64,
}

/// GET /api/health
async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "OK",
        message: "FireWatch API is running",
        timestamp: Utc::now(),
        uptime: state.started_at.elapsed().as_secs_f64(),
    })
}

#[derive(Debug, Serialize)]
struct Directory {
    message: &'static str,
    version: &'static str,
    endpoints: Endpoints,
}

#[derive(Debug, Serialize)]
struct Endpoints {
    predictions: &'static str,
    reports: &'static str,
    alerts: &'static str,
    health: &'static str,
}

/// GET /
async fn root() -> Json<Directory> {
    Json(Directory {
        message: "Welcome to FireWatch API",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: Endpoints {
            predictions: "/api/predictions",
            reports: "/api/reports",
            alerts: "/api/alerts",
            health: "/api/health",
        },
    })
}

async fn route_not_found(method: Method, OriginalUri(uri): OriginalUri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody::new(
            "Route not found",
            format!("Cannot {method} {}", uri.path()),
        )),
    )
}

/// In production, replace the body of every 5xx response.
async fn redact_internal_errors(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    let status = response.status();

    if state.config.environment.is_production() && status.is_server_error() {
        return (
            status,
            Json(ErrorBody::new(INTERNAL_ERROR_MESSAGE, INTERNAL_ERROR_MESSAGE)),
        )
            .into_response();
    }

    response
}

fn panic_response(panic: Box<dyn Any + Send + 'static>, production: bool) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!(panic = %detail, "Handler panicked");

    let message = if production {
        INTERNAL_ERROR_MESSAGE.to_string()
    } else {
        detail
    };

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::new("Something went wrong!", message)),
    )
        .into_response()
}
