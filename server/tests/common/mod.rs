// Each integration test file is a separate binary; helpers not used in every
// binary would otherwise trigger dead_code warnings from clippy.
#![allow(dead_code)]

use std::net::SocketAddr;

use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use page_summary::{config::Config, handlers, state::AppState};

/// Build the application router with private hosts allowed, so that pages
/// served by a local mock server can be summarized.
pub fn create_test_app() -> Router {
    create_app(true)
}

/// Build the application router with the production private-address check.
pub fn create_guarded_app() -> Router {
    create_app(false)
}

/// Build the guarded application router with `host` pinned to `addr` in the
/// client's DNS, as if a public name server had answered with it.
pub fn create_guarded_app_resolving(host: &str, addr: SocketAddr) -> Router {
    let config = test_config(false);
    let client = config
        .http_client_builder()
        .resolve(host, addr)
        .build()
        .expect("Failed to build HTTP client");
    app_with_client(&config, client)
}

fn create_app(allow_private_hosts: bool) -> Router {
    let config = test_config(allow_private_hosts);
    let client = config.http_client().expect("Failed to build HTTP client");
    app_with_client(&config, client)
}

fn test_config(allow_private_hosts: bool) -> Config {
    let allow = allow_private_hosts.to_string();
    Config::from_lookup(|name| (name == "ALLOW_PRIVATE_HOSTS").then(|| allow.clone()))
        .expect("test config is valid")
}

fn app_with_client(config: &Config, http_client: reqwest::Client) -> Router {
    let state = AppState {
        http_client,
        allow_private_hosts: config.allow_private_hosts,
        max_body_bytes: config.max_body_bytes,
    };
    handlers::router(state)
}

// ── Mock origin helpers ──────────────────────────────────────────────────────

/// Start a mock origin serving `body` at `/page` with the given status and
/// content type.
pub async fn serve_page(status: u16, content_type: &str, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(status).set_body_raw(body, content_type))
        .mount(&server)
        .await;
    server
}

/// Start a mock origin serving an HTML document at `/page`.
pub async fn serve_html(body: &str) -> MockServer {
    serve_page(200, "text/html; charset=utf-8", body).await
}

/// Start a mock origin whose `/page` answers `302` with a `Location` on
/// `location_host` and the origin's own port. The redirect target,
/// `/internal`, serves an HTML page that must never be summarized.
pub async fn serve_redirect_to_internal(location_host: &str) -> MockServer {
    let server = MockServer::start().await;
    let location = format!(
        "http://{location_host}:{}/internal",
        server.address().port()
    );
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", location.as_str()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/internal"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<title>internal secret</title>", "text/html"),
        )
        .mount(&server)
        .await;
    server
}

/// `/v1/summary` URI for `target`, with the target percent-encoded.
pub fn summary_uri(target: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
    format!("/v1/summary?url={encoded}")
}

// ── Request helpers ──────────────────────────────────────────────────────────

pub async fn get(app: Router, uri: &str) -> (StatusCode, HeaderMap, Value) {
    let req = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, req).await
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, json)
}
