use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::summary;

// ── Query params ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub url: Option<String>,
}

// ── Handler ────────────────────────────────────────────────────────────────

/// GET /v1/summary?url=<encoded-url>
///
/// Fetches the page and returns the metadata found in its `<head>` as JSON.
/// Unset fields are omitted from the body.
pub async fn get_summary(
    State(state): State<AppState>,
    Query(params): Query<SummaryQuery>,
) -> AppResult<Response> {
    let url = params
        .url
        .filter(|url| !url.is_empty())
        .ok_or_else(|| AppError::Validation("Url not supplied".into()))?;

    let summary = summary::summarize(
        &state.http_client,
        &url,
        state.allow_private_hosts,
        state.max_body_bytes,
    )
    .await?;
    let body = summary::encode_summary(&summary)?;

    tracing::info!(url = %url, "Page summary served");
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}
