use reqwest::Client;

/// Shared application state passed to all handlers.
/// The HTTP client is built once at startup so its connection pool and
/// timeouts are reused across requests.
#[derive(Clone)]
pub struct AppState {
    pub http_client: Client,
    pub allow_private_hosts: bool,
    pub max_body_bytes: u64,
}
