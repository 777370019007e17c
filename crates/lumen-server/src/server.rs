//! HTTP server implementation using Axum.

use crate::handler::{
    handle_cache_clear, handle_cache_stats, handle_generate, handle_health,
    handle_health_detailed, handle_metrics, handle_models, handle_prometheus, handle_ready,
};
use crate::middleware::{limit_per_client, record_response_time, ClientRateLimiter};
use axum::{
    body::Body,
    http::Request,
    middleware,
    routing::{get, post},
    Router,
};
use lumen_core::config::ServerConfig;
use lumen_core::Orchestrator;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span};

/// Serving options that sit outside the pipeline settings.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub max_concurrent_requests: usize,
    /// Generate requests per client address per minute; 0 disables.
    pub client_rate_limit_per_minute: u32,
    /// Mount the `/debug` routes.
    pub enable_debug_routes: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_concurrent_requests: ServerConfig::MAX_CONCURRENT_REQUESTS,
            client_rate_limit_per_minute: ServerConfig::CLIENT_RATE_LIMIT_PER_MINUTE,
            enable_debug_routes: false,
        }
    }
}

/// Application state shared across handlers.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub client_limiter: Option<ClientRateLimiter>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, options: &ServerOptions) -> Self {
        Self {
            orchestrator,
            client_limiter: ClientRateLimiter::per_minute(options.client_rate_limit_per_minute),
        }
    }
}

/// Build the router for `state`.
pub fn router(state: Arc<AppState>, options: &ServerOptions) -> Router {
    let generate = post(handle_generate).route_layer(middleware::from_fn_with_state(
        Arc::clone(&state),
        limit_per_client,
    ));
    let mut app = Router::new()
        .route("/generate", generate)
        .route("/health", get(handle_health))
        .route("/health/ready", get(handle_ready))
        .route("/health/detailed", get(handle_health_detailed))
        .route("/metrics", get(handle_metrics))
        .route("/metrics/prometheus", get(handle_prometheus))
        .route("/cache/stats", get(handle_cache_stats));
    if options.enable_debug_routes {
        app = app.nest(
            "/debug",
            Router::new()
                .route("/health", get(handle_health_detailed))
                .route("/models", get(handle_models))
                .route("/cache/stats", get(handle_cache_stats))
                .route("/cache/clear", post(handle_cache_clear)),
        );
    }

    app.layer(ConcurrencyLimitLayer::new(options.max_concurrent_requests.max(1)))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        let request_id = request
                            .headers()
                            .get("x-request-id")
                            .and_then(|value| value.to_str().ok())
                            .unwrap_or_default();
                        info_span!(
                            "request",
                            method = %request.method(),
                            path = %request.uri().path(),
                            request_id,
                        )
                    }),
                )
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(middleware::from_fn(record_response_time)),
        )
        .with_state(state)
}

/// Start the HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    host: &str,
    port: u16,
    options: ServerOptions,
) -> anyhow::Result<SocketAddr> {
    let state = Arc::new(AppState::new(orchestrator, &options));
    let app = router(state, &options);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!(
        debug_routes = options.enable_debug_routes,
        client_rate_limit = options.client_rate_limit_per_minute,
        "Server listening on {}",
        actual_addr
    );

    tokio::spawn(async move {
        let service = app.into_make_service_with_connect_info::<SocketAddr>();
        if let Err(e) = axum::serve(listener, service).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_server_starts() {
        let orchestrator = Arc::new(Orchestrator::builder().build().await);
        let addr = start_server(orchestrator, "127.0.0.1", 0, ServerOptions::default())
            .await
            .unwrap();
        assert!(addr.port() > 0);
    }

    #[tokio::test]
    async fn test_rejects_bad_host() {
        let orchestrator = Arc::new(Orchestrator::builder().build().await);
        assert!(start_server(orchestrator, "not a host", 0, ServerOptions::default())
            .await
            .is_err());
    }

    async fn app(options: ServerOptions) -> Router {
        let orchestrator = Arc::new(
            Orchestrator::builder()
                .settings(lumen_core::Settings {
                    skip_model_load: true,
                    ..lumen_core::Settings::default()
                })
                .build()
                .await,
        );
        let state = Arc::new(AppState::new(orchestrator, &options));
        router(state, &options)
    }

    fn get_request(path: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .uri(path)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_request_id_and_timing_headers() {
        let app = app(ServerOptions::default()).await;

        let response = app.clone().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let id = response.headers()["x-request-id"].to_str().unwrap();
        assert!(!id.is_empty());
        let elapsed: f64 = response.headers()["x-response-time-ms"]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(elapsed >= 0.0);

        let supplied = axum::http::Request::builder()
            .uri("/health")
            .header("x-request-id", "abc123")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(supplied).await.unwrap();
        assert_eq!(response.headers()["x-request-id"], "abc123");
    }

    #[tokio::test]
    async fn test_debug_routes_are_opt_in() {
        let hidden = app(ServerOptions::default()).await;
        let response = hidden.oneshot(get_request("/debug/models")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let shown = app(ServerOptions {
            enable_debug_routes: true,
            ..ServerOptions::default()
        })
        .await;
        let response = shown.oneshot(get_request("/debug/models")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["count"], 0);
        assert_eq!(body["slots"]["text_to_image"], "unloaded");
    }

    #[tokio::test]
    async fn test_client_limit_applies_to_generate_only() {
        let app = app(ServerOptions {
            client_rate_limit_per_minute: 1,
            ..ServerOptions::default()
        })
        .await;
        let generate = || {
            axum::http::Request::builder()
                .method("POST")
                .uri("/generate")
                .header("content-type", "application/json")
                .header("x-forwarded-for", "198.51.100.9")
                .body(Body::from(r#"{"text": "horse"}"#))
                .unwrap()
        };

        let first = app.clone().oneshot(generate()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = app.clone().oneshot(generate()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key("retry-after"));

        let health = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }
}
