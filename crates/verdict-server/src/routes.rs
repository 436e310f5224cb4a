//! HTTP routes and handlers

use axum::{
    body::Body,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Query, State,
    },
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::num::NonZeroUsize;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};
use uuid::Uuid;
use verdict_core::{BatchResult, Error, PredictionResult, ServingState, TopKPrediction};
use verdict_inference::BatchOptions;

use crate::state::AppState;

/// `k` used by `/predict/top-k` when the query omits it
pub const DEFAULT_TOP_K: i64 = 3;

const ENDPOINTS: &[&str] = &[
    "GET /",
    "GET /health",
    "GET /health/live",
    "GET /health/ready",
    "POST /predict",
    "POST /predict/batch",
    "POST /predict/top-k",
    "GET /model/info",
    "GET /metrics",
];

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.server.request_body_limit;

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .route("/predict", post(predict))
        .route("/predict/batch", post(predict_batch))
        .route("/predict/top-k", post(predict_top_k))
        .route("/model/info", get(model_info))
        .route("/metrics", get(metrics))
        .fallback(fallback)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        tracing::info_span!(
                            "request",
                            id = %Uuid::new_v4(),
                            method = %request.method(),
                            uri = %request.uri()
                        )
                    }),
                )
                // Oversized bodies surface as extractor rejections, answered as JSON 413s
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

/// Body of `POST /predict` and `POST /predict/top-k`
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub text: String,
}

/// Body of `POST /predict/batch`
#[derive(Debug, Deserialize)]
pub struct BatchPredictRequest {
    pub texts: Vec<String>,

    #[serde(default = "default_true")]
    pub return_probabilities: bool,
}

#[derive(Debug, Deserialize)]
pub struct TopKQuery {
    #[serde(default = "default_top_k")]
    pub k: i64,
}

#[derive(Debug, Serialize)]
pub struct TopKResponse {
    pub text: String,
    pub top_predictions: Vec<TopKPrediction>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub state: ServingState,
    pub model_loaded: bool,
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
    pub model_type: String,
    pub num_classes: usize,
    pub classes: Vec<String>,
    pub device: String,
    pub max_input_length: usize,
    pub threshold: f32,
}

fn default_true() -> bool {
    true
}

fn default_top_k() -> i64 {
    DEFAULT_TOP_K
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "name": "verdict",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ENDPOINTS,
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.gate.health();
    let status = match snapshot.state {
        ServingState::Ready => "healthy",
        ServingState::Unloaded | ServingState::Loading => "loading",
        ServingState::Failed => "unhealthy",
    };

    Json(HealthResponse {
        status,
        state: snapshot.state,
        model_loaded: snapshot.model_loaded,
        device: snapshot.device,
        error: snapshot.error,
        uptime_seconds: snapshot.uptime_seconds,
    })
}

async fn liveness(State(state): State<AppState>) -> Response {
    let alive = state.gate.is_alive();
    let status = if alive {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(json!({ "alive": alive }))).into_response()
}

async fn readiness(State(state): State<AppState>) -> Response {
    let current = state.gate.state();
    let ready = current == ServingState::Ready;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(json!({ "ready": ready, "state": current }))).into_response()
}

async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictionResult>, AppError> {
    record_request("predict");
    let Json(req) = payload.map_err(body_rejection)?;

    let runtime = state.gate.runtime()?;
    let start = Instant::now();
    let result = run_blocking(move || runtime.predict(&req.text)).await?;
    record_latency("single", start);

    debug!(label = %result.label, confidence = result.confidence, "predict");
    Ok(Json(result))
}

async fn predict_batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchPredictRequest>, JsonRejection>,
) -> Result<Json<BatchResult>, AppError> {
    record_request("predict_batch");
    let Json(req) = payload.map_err(body_rejection)?;

    let max = state.max_batch_size();
    if req.texts.len() > max {
        return Err(Error::validation(
            "texts",
            format!(
                "batch of {} texts exceeds the maximum of {}",
                req.texts.len(),
                max
            ),
        )
        .into());
    }

    let runtime = state.gate.runtime()?;
    let options = BatchOptions {
        return_probabilities: req.return_probabilities,
    };
    let batch_size = req.texts.len();
    let start = Instant::now();
    let result = run_blocking(move || runtime.predict_batch(req.texts.as_slice(), options)).await?;
    record_latency("batch", start);
    metrics::histogram!("verdict_batch_size").record(batch_size as f64);

    debug!(batch_size, "predict_batch");
    Ok(Json(result))
}

async fn predict_top_k(
    State(state): State<AppState>,
    query: Result<Query<TopKQuery>, QueryRejection>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<TopKResponse>, AppError> {
    record_request("predict_top_k");
    let Query(query) = query.map_err(|rejection| Error::validation("k", rejection.body_text()))?;
    let Json(req) = payload.map_err(body_rejection)?;

    let k = usize::try_from(query.k)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| Error::validation("k", format!("k must be at least 1, got {}", query.k)))?;

    let runtime = state.gate.runtime()?;
    let start = Instant::now();
    let PredictRequest { text } = req;
    let (text, top_predictions) = run_blocking(move || {
        let top = runtime.predict_top_k(&text, k)?;
        Ok((text, top))
    })
    .await?;
    record_latency("top_k", start);

    Ok(Json(TopKResponse {
        text,
        top_predictions,
    }))
}

async fn model_info(State(state): State<AppState>) -> Result<Json<ModelInfo>, AppError> {
    record_request("model_info");
    let runtime = state.gate.runtime()?;
    let package = runtime.package();

    Ok(Json(ModelInfo {
        name: package.name().to_string(),
        version: package.version().to_string(),
        model_type: package.model_type().to_string(),
        num_classes: package.num_classes(),
        classes: package.labels().to_vec(),
        device: package.device().to_string(),
        max_input_length: package.max_input_length(),
        threshold: runtime.predictor().threshold(),
    }))
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics exporter not installed").into_response(),
    }
}

async fn fallback() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": {
                "type": "not_found",
                "message": "no such endpoint",
            }
        })),
    )
        .into_response()
}

/// Run model work on the blocking pool.
///
/// If the request is cancelled the computation still finishes and its result
/// is dropped.
async fn run_blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> verdict_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::internal(format!("inference task failed: {}", e)))?
        .map_err(AppError::from)
}

fn record_request(endpoint: &'static str) {
    metrics::counter!("verdict_requests_total", "endpoint" => endpoint).increment(1);
}

fn record_latency(mode: &'static str, start: Instant) {
    metrics::histogram!("verdict_inference_latency_us", "mode" => mode)
        .record(start.elapsed().as_micros() as f64);
}

fn body_rejection(rejection: JsonRejection) -> AppError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::PayloadTooLarge(rejection.body_text());
    }
    Error::validation("body", rejection.body_text()).into()
}

/// Error handling
#[derive(Debug)]
pub enum AppError {
    Verdict(Error),
    PayloadTooLarge(String),
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError::Verdict(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message, field) = match self {
            AppError::PayloadTooLarge(message) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", message, None)
            }
            AppError::Verdict(err) => {
                let kind = err.kind();
                match err {
                    Error::Validation { field, message } => {
                        (StatusCode::UNPROCESSABLE_ENTITY, kind, message, Some(field))
                    }
                    err @ Error::NotReady(_) => {
                        (StatusCode::SERVICE_UNAVAILABLE, kind, err.to_string(), None)
                    }
                    err @ Error::Inference(_) => {
                        error!("Inference failed: {}", err);
                        (StatusCode::INTERNAL_SERVER_ERROR, kind, err.to_string(), None)
                    }
                    err => {
                        error!("Request failed: {}", err);
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            kind,
                            "internal server error".to_string(),
                            None,
                        )
                    }
                }
            }
        };

        if status.is_client_error() {
            warn!("Rejected request ({}): {}", kind, message);
        }
        metrics::counter!("verdict_errors_total", "type" => kind).increment(1);

        let mut error = json!({
            "type": kind,
            "message": message,
        });
        if let Some(field) = field {
            error["field"] = json!(field);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
