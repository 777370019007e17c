//! Request middleware: per-client admission and response timing.

use crate::handler::ApiError;
use crate::server::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use lumen_core::LumenError;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Wall time spent producing the response, in milliseconds.
pub const X_RESPONSE_TIME_MS: HeaderName = HeaderName::from_static("x-response-time-ms");

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Keyed GCRA limiter over client addresses.
pub struct ClientRateLimiter {
    limiter: DefaultKeyedRateLimiter<IpAddr>,
    clock: DefaultClock,
}

impl ClientRateLimiter {
    /// `None` when `limit` is zero, which disables the limiter.
    pub fn per_minute(limit: u32) -> Option<Self> {
        let limit = NonZeroU32::new(limit)?;
        Some(Self {
            limiter: RateLimiter::keyed(Quota::per_minute(limit)),
            clock: DefaultClock::default(),
        })
    }

    /// Admit one request from `client`, or return whole seconds to wait.
    pub fn check(&self, client: IpAddr) -> Result<(), u64> {
        self.limiter.check_key(&client).map_err(|not_until| {
            let wait = not_until.wait_time_from(self.clock.now());
            (wait.as_secs_f64().ceil() as u64).max(1)
        })
    }
}

/// Peer address, or the first forwarded address when served without
/// connection info.
fn client_addr(request: &Request) -> IpAddr {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip();
    }
    request
        .headers()
        .get(X_FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

pub async fn limit_per_client(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(limiter) = &state.client_limiter {
        let client = client_addr(&request);
        if let Err(retry_after_secs) = limiter.check(client) {
            warn!(%client, retry_after_secs, "Client rate limit exceeded");
            return ApiError::from(LumenError::RateLimited { retry_after_secs }).into_response();
        }
    }
    next.run(request).await
}

pub async fn record_response_time(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let mut response = next.run(request).await;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    if let Ok(value) = HeaderValue::from_str(&format!("{:.1}", elapsed_ms)) {
        response.headers_mut().insert(X_RESPONSE_TIME_MS, value);
    }
    response
}
