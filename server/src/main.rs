use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use page_summary::config::Config;
use page_summary::handlers;
use page_summary::state::AppState;

#[tokio::main]
async fn main() {
    // Load configuration first so APP_ENV from .env picks the log format.
    let config = Config::from_env().expect("Failed to load configuration");

    // Initialize tracing — JSON in production, human-readable in dev.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "page_summary=info,tower_http=info".parse().unwrap());

    if config.is_production {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("🚀 Page Summary starting...");
    info!(
        fetch_timeout = ?config.fetch_timeout,
        connect_timeout = ?config.connect_timeout,
        max_redirects = config.max_redirects,
        max_body_bytes = config.max_body_bytes,
        "📝 Configuration loaded"
    );

    if config.allow_private_hosts {
        tracing::warn!("🔓 Private-address check disabled (ALLOW_PRIVATE_HOSTS=true)");
    }

    let http_client = config
        .http_client()
        .expect("Failed to build outbound HTTP client");

    let app_state = AppState {
        http_client,
        allow_private_hosts: config.allow_private_hosts,
        max_body_bytes: config.max_body_bytes,
    };

    let addr = config.server_addr();

    // Prometheus metrics layer
    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    let app = handlers::router(app_state)
        .route(
            "/metrics",
            get(move || async move { metric_handle.render() }),
        )
        .layer(prometheus_layer)
        .layer(TraceLayer::new_for_http());

    // Start server
    info!("🎧 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
