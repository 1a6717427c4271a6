//! Utility functions and helpers.

pub mod http;

use url::Url;

/// Destination URL safe for logs: the final path segment (the webhook
/// token on chat services) and any query are masked.
pub fn redact_webhook(destination: &str) -> String {
    let Ok(mut url) = Url::parse(destination) else {
        return "<invalid url>".to_string();
    };
    url.set_query(None);
    url.set_fragment(None);
    let _ = url.set_password(None);

    let segments: Vec<String> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();
    if segments.len() > 1 {
        let mut path = segments[..segments.len() - 1].join("/");
        path.push_str("/***");
        url.set_path(&path);
    }
    url.to_string()
}

/// Extract the host from a URL string.
pub fn get_domain(url_str: &str) -> Option<String> {
    Url::parse(url_str)
        .ok()
        .and_then(|u| u.host_str().map(|s| s.to_string()))
}
