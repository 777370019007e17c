//! REST request handlers.

use crate::prometheus::{self, Exposition};
use crate::server::AppState;
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use lumen_core::registry::names;
use lumen_core::{GenerateRequest, LumenError};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Error body: `{ "error": message, "type": kind }`.
pub struct ApiError(LumenError);

impl From<LumenError> for ApiError {
    fn from(err: LumenError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(LumenError::InvalidRequest {
            message: rejection.body_text(),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "error": self.0.to_string(),
            "type": self.0.kind(),
        }));
        let mut response = (status, body).into_response();
        if let LumenError::RateLimited { retry_after_secs } = self.0 {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

/// JSON body extractor whose rejections use the error body shape.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Generate (or fetch) a point cloud.
pub async fn handle_generate(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<GenerateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    debug!(text = %request.text, "Generate request");
    let result = state.orchestrator.generate(request).await?;
    Ok(Json(result))
}

/// Liveness.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Readiness: models (or skip flag) and cache must be usable.
pub async fn handle_ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let orchestrator = &state.orchestrator;
    let body = json!({
        "ready": orchestrator.is_ready(),
        "models_loaded": orchestrator.registry().loaded_names(),
        "cache_connected": orchestrator.cache().is_connected(),
    });
    let status = if orchestrator.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

pub async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.orchestrator.metrics())
}

pub async fn handle_cache_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.orchestrator.cache_stats())
}

pub async fn handle_prometheus(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let orchestrator = &state.orchestrator;
    let metrics = orchestrator.metrics();
    let registry = orchestrator.registry();
    let body = Exposition {
        metrics: &metrics,
        models: names::ALL
            .iter()
            .map(|&name| (name, registry.has(name)))
            .collect(),
        gpu_memory_used_bytes: orchestrator.gpu_info().map_or(0, |info| info.memory_used),
        cache_memory_entries: orchestrator.cache().memory_len(),
    }
    .render();
    ([(header::CONTENT_TYPE, prometheus::CONTENT_TYPE)], body)
}

/// Full diagnostics for humans and dashboards; probes use `/health`.
pub async fn handle_health_detailed(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let orchestrator = &state.orchestrator;
    let gpu = orchestrator.gpu_info();
    Json(json!({
        "status": "healthy",
        "ready": orchestrator.is_ready(),
        "models_loaded": orchestrator.registry().loaded_names(),
        "gpu_available": gpu.is_some(),
        "gpu_name": gpu.as_ref().and_then(|info| info.name.clone()),
        "gpu_memory_used_gb": gpu.as_ref().map_or(0.0, |info| (info.memory_used_gb() * 10.0).round() / 10.0),
        "cache_connected": orchestrator.cache().is_connected(),
        "cache_stats": orchestrator.cache_stats(),
        "uptime_seconds": orchestrator.metrics().uptime_seconds,
    }))
}

/// Loaded models plus the state of every known slot.
pub async fn handle_models(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let registry = state.orchestrator.registry();
    let loaded = registry.loaded_names();
    let slots: Map<String, Value> = names::ALL
        .iter()
        .map(|&name| (name.to_string(), json!(registry.state(name))))
        .collect();
    Json(json!({
        "count": loaded.len(),
        "models": loaded,
        "slots": slots,
    }))
}

/// Drop the in-memory tier; the durable tier is untouched.
pub async fn handle_cache_clear(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cache = state.orchestrator.cache();
    let dropped = cache.memory_len();
    cache.clear_memory();
    info!(dropped, "Cleared in-memory cache");
    Json(json!({"status": "cleared", "dropped": dropped}))
}
