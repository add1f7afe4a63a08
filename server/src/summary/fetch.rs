use std::error::Error as StdError;
use std::io::{self, Read};
use std::net::{IpAddr, SocketAddr};

use futures::TryStreamExt;
use hyper::client::connect::dns::Name;
use reqwest::dns::{Addrs, Resolve, Resolving};
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use reqwest::{Client, Response, StatusCode};
use thiserror::Error;
use tokio_util::io::{StreamReader, SyncIoBridge};
use url::{Host, Url};

use super::FetchError;

pub const HTML_MEDIA_TYPE: &str = "text/html";

type BoxError = Box<dyn StdError + Send + Sync>;

/// Raised from inside the HTTP client when a connection or redirect would
/// reach a private address.
#[derive(Error, Debug)]
#[error("refusing to connect to private address {0}")]
pub struct PrivateAddress(pub IpAddr);

/// Returns `true` if `ip` is a private, loopback, link-local, or otherwise
/// non-routable address.
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            matches!(
                o,
                [127, ..]
                    | [10, ..]
                    | [169, 254, ..]
                    | [192, 168, ..]
                    | [0, ..]
                    | [255, 255, 255, 255]
            ) || (o[0] == 172 && (16..=31).contains(&o[1]))
                || (o[0] == 100 && (64..=127).contains(&o[1]))
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_private_ip(IpAddr::V4(v4));
            }
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00 == 0xfc00)
                || (v6.segments()[0] & 0xffc0 == 0xfe80)
        }
    }
}

/// Parse `page_url` and reject anything that is not an absolute http(s) URL.
fn parse_page_url(page_url: &str) -> Result<Url, FetchError> {
    let parsed =
        Url::parse(page_url).map_err(|e| FetchError::InvalidUrl(format!("{page_url}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        _ => {
            return Err(FetchError::InvalidUrl(
                "Only http/https URLs are supported".into(),
            ))
        }
    }

    if parsed.host_str().is_none() {
        return Err(FetchError::InvalidUrl("URL has no host".into()));
    }
    Ok(parsed)
}

/// The private address named directly by `url`'s host, if it is an IP
/// literal. The client never consults its resolver for such hosts.
fn private_literal(url: &Url) -> Option<IpAddr> {
    let ip = match url.host()? {
        Host::Ipv4(v4) => IpAddr::V4(v4),
        Host::Ipv6(v6) => IpAddr::V6(v6),
        Host::Domain(_) => return None,
    };
    is_private_ip(ip).then_some(ip)
}

/// DNS resolver that fails the connection if the name maps to any private
/// address.
///
/// The check happens on the addresses the connection will actually use, so a
/// host that answers differently on a second lookup cannot slip through.
#[derive(Debug, Default, Clone, Copy)]
pub struct PublicAddressResolver;

impl Resolve for PublicAddressResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(lookup_public(name))
    }
}

async fn lookup_public(name: Name) -> Result<Addrs, BoxError> {
    let host = name.as_str();
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, 0)).await?.collect();

    if let Some(addr) = addrs.iter().find(|addr| is_private_ip(addr.ip())) {
        tracing::warn!(host, ip = %addr.ip(), "Refusing to connect to private address");
        return Err(Box::new(PrivateAddress(addr.ip())));
    }
    Ok(Box::new(addrs.into_iter()))
}

/// Redirect policy that follows at most `max_redirects` hops and refuses any
/// hop whose host is a private IP literal. Named hosts are checked by
/// [`PublicAddressResolver`] when the hop connects.
pub fn public_redirect_policy(max_redirects: usize) -> Policy {
    let limited = Policy::limited(max_redirects);
    Policy::custom(move |attempt| match private_literal(attempt.url()) {
        Some(ip) => {
            tracing::warn!(url = %attempt.url(), "Refusing redirect to private address");
            attempt.error(PrivateAddress(ip))
        }
        None => limited.redirect(attempt),
    })
}

/// Whether a client error was caused by the private-address guard.
fn hit_private_address(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<PrivateAddress>() {
            return true;
        }
        source = e.source();
    }
    false
}

/// GET `page_url` and check that it is a reachable HTML page.
///
/// Fails if the status is anything but 200 or the content type is not
/// `text/html`; in both cases the body is never read. The returned response
/// owns the connection, which is released when it (or the reader built from
/// it by [`body_reader`]) is dropped.
///
/// Unless `allow_private_hosts` is set, an IP-literal target in a private
/// range is refused here. Named hosts and redirects are left to the guard
/// installed on `client` ([`PublicAddressResolver`], [`public_redirect_policy`]).
pub async fn fetch_html(
    client: &Client,
    page_url: &str,
    allow_private_hosts: bool,
) -> Result<Response, FetchError> {
    let url = parse_page_url(page_url)?;

    if !allow_private_hosts {
        if let Some(ip) = private_literal(&url) {
            tracing::warn!(%ip, url = %page_url, "Refusing to fetch private address");
            return Err(FetchError::BlockedHost);
        }
    }

    let response = client.get(url).send().await.map_err(|e| {
        if hit_private_address(&e) {
            return FetchError::BlockedHost;
        }
        tracing::warn!(error = ?e, url = %page_url, "Failed to fetch URL for page summary");
        FetchError::Network(e)
    })?;

    let status = response.status();
    if status != StatusCode::OK {
        tracing::warn!(%status, url = %page_url, "Page summary target returned non-OK status");
        return Err(FetchError::NotFound(status));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if !content_type.to_ascii_lowercase().starts_with(HTML_MEDIA_TYPE) {
        tracing::warn!(content_type = %content_type, url = %page_url, "Page summary target is not HTML");
        return Err(FetchError::UnsupportedType(content_type));
    }

    Ok(response)
}

/// Blocking reader over the first `max_bytes` of the response body, for use
/// inside `tokio::task::spawn_blocking`.
///
/// Must be called from within the tokio runtime. Body chunks are pulled from
/// the network only as the reader is read. Reaching `max_bytes` looks like the
/// end of the body to the reader.
pub fn body_reader(response: Response, max_bytes: u64) -> impl Read + Send + 'static {
    let stream = Box::pin(
        response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e)),
    );
    SyncIoBridge::new(StreamReader::new(stream)).take(max_bytes)
}
