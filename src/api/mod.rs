//! ReadAPI (§4.5, §6): HTTP/JSON endpoints over the store plus the
//! `/ws/whale` WebSocket stream. Built on `axum`, matching the teacher's
//! choice of stack for its (optional) HTTP surface.

pub mod auth;
pub mod handlers;

use crate::store::Store;
use crate::whale::fanout::FanoutHub;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

const RATE_LIMIT_PER_MINUTE: u32 = 100;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<Store>>,
    pub whale_fanout: FanoutHub,
    pub jwt_secret: String,
    pub dev_bypass: bool,
    pub started_at: Instant,
    rate_limits: Arc<Mutex<HashMap<std::net::IpAddr, (u32, Instant)>>>,
}

impl AppState {
    pub fn new(store: Arc<Mutex<Store>>, whale_fanout: FanoutHub, jwt_secret: String, dev_bypass: bool) -> Self {
        AppState {
            store,
            whale_fanout,
            jwt_secret,
            dev_bypass,
            started_at: Instant::now(),
            rate_limits: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("rate limited")]
    RateLimited,
    #[error("store unavailable")]
    StoreUnavailable,
}

/// Clients should wait this long before retrying a 429 (§6).
const RATE_LIMIT_RETRY_AFTER_SECS: &str = "60";

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::RateLimited = self {
            let mut resp =
                (StatusCode::TOO_MANY_REQUESTS, Json(json!({"error": "rate limited"})))
                    .into_response();
            resp.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from_static(RATE_LIMIT_RETRY_AFTER_SECS),
            );
            return resp;
        }
        let (status, body) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, json!({"error": "unauthorized"})),
            ApiError::StoreUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({"error": "store unavailable"}),
            ),
            ApiError::RateLimited => unreachable!("handled above"),
        };
        (status, Json(body)).into_response()
    }
}

/// Per-IP fixed-window rate limiter: 100 requests/minute on data endpoints
/// (§4.5). `/health` and the WebSocket upgrade are exempt by router wiring.
async fn rate_limit(
    State(state): State<AppState>,
    addr: axum::extract::ConnectInfo<SocketAddr>,
    request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let ip = addr.0.ip();
    let mut limits = state.rate_limits.lock().await;
    let now = Instant::now();
    let entry = limits.entry(ip).or_insert((0, now));
    if now.duration_since(entry.1) > RATE_LIMIT_WINDOW {
        *entry = (0, now);
    }
    entry.0 += 1;
    if entry.0 > RATE_LIMIT_PER_MINUTE {
        return ApiError::RateLimited.into_response();
    }
    drop(limits);
    next.run(request).await
}

pub fn router(state: AppState) -> Router {
    let data_routes = Router::new()
        .route("/api/prices/latest", get(handlers::latest_price))
        .route("/api/prices/historical", get(handlers::historical_prices))
        .route("/api/prices/comparison", get(handlers::price_comparison))
        .route("/api/whale/latest", get(handlers::whale_latest))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ws/whale", get(handlers::whale_ws))
        .merge(data_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
