pub mod summary;

use axum::{
    http::{header, HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::state::AppState;

pub async fn health_check() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "page-summary",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// Application routes.
///
/// Every response from the summary endpoint, errors included, carries a
/// wildcard `Access-Control-Allow-Origin` header.
pub fn router(state: AppState) -> Router {
    let allow_any_origin = SetResponseHeaderLayer::overriding(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/v1/summary",
            get(summary::get_summary).layer(allow_any_origin),
        )
        .with_state(state)
}
