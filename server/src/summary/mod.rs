//! Page summary extraction.
//!
//! The pipeline is: [`fetch::fetch_html`] validates the target and opens the
//! body, [`tokenizer::HtmlTokens`] turns the body into a lazy token stream,
//! and [`extract::extract_summary`] scans the head and builds a
//! [`PageSummary`]. The scan runs on a blocking thread because the tokenizer
//! pulls body bytes synchronously.

pub mod extract;
pub mod fetch;
pub mod resolve;
pub mod tokenizer;

use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::models::PageSummary;

pub use extract::extract_summary;
pub use fetch::{body_reader, fetch_html};
pub use resolve::resolve_link;
pub use tokenizer::{HtmlTokens, Tag, Token, TokenError};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URL resolves to a private or reserved address")]
    BlockedHost,

    #[error("Failed to fetch URL")]
    Network(#[source] reqwest::Error),

    #[error("Provided url was not found (status {0})")]
    NotFound(StatusCode),

    #[error("Provided url is not a web page")]
    UnsupportedType(String),
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Error encountered in processing the web page: {0}")]
    Parse(TokenError),
}

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("Summary extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Fetch `page_url` and summarize its head.
///
/// Exactly one fetch attempt is made. At most `max_body_bytes` of the body
/// are scanned; a head still open at that point is summarized as if the
/// document ended there. The response body is dropped as soon as the scan
/// stops, whether it finished at `</head>`, ran to the end of the document,
/// or failed.
pub async fn summarize(
    client: &Client,
    page_url: &str,
    allow_private_hosts: bool,
    max_body_bytes: u64,
) -> Result<PageSummary, SummaryError> {
    let response = fetch_html(client, page_url, allow_private_hosts).await?;
    let reader = body_reader(response, max_body_bytes);
    let page_url = page_url.to_string();

    let summary = tokio::task::spawn_blocking(move || {
        extract_summary(&page_url, HtmlTokens::new(reader))
    })
    .await??;

    Ok(summary)
}

/// Encode a finished summary as the JSON response body.
pub fn encode_summary(summary: &PageSummary) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(summary)
}
