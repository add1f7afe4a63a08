use url::Url;

/// Resolve an icon or image `path` found on the page at `page_url`.
///
/// Only root-relative paths (and scheme-relative `//host/...` paths) are
/// resolved; anything else, including directory-relative paths like
/// `icon.png`, is returned unchanged. Unparseable input degrades to the
/// unresolved `path` rather than an error.
pub fn resolve_link(path: &str, page_url: &str) -> String {
    if !path.starts_with('/') {
        return path.to_string();
    }

    Url::parse(page_url)
        .and_then(|base| base.join(path))
        .map(|resolved| resolved.to_string())
        .unwrap_or_else(|e| {
            tracing::debug!(error = %e, path, page_url, "Leaving link unresolved");
            path.to_string()
        })
}
