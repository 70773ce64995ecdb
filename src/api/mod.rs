pub mod assessments;
pub mod controls;
pub mod files;
pub mod subcontrols;
pub mod vendors;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::store::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(controls::router())
        .merge(subcontrols::router())
        .merge(assessments::router())
        .merge(vendors::router())
        .merge(files::router())
}

/// Full application: API routes, health check and the HTTP middleware stack.
pub fn app(state: AppState) -> Router {
    let cfg = state.config.clone();
    let timeout = TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, cfg.request_timeout);
    Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .merge(router())
        .layer(DefaultBodyLimit::max(cfg.max_upload_bytes))
        .layer(timeout)
        .layer(cors_layer(&cfg.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}
