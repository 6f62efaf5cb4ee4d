//! Domain normalisation and URL helpers (spec §3 invariant iv, §4.1).

use url::Url;

/// Normalise a host for knowledge-base lookups: lowercase, strip scheme,
/// strip `www.`, strip one leading label of {web, m, mobile, www}.
/// Idempotent: `normalize_domain(normalize_domain(x)) == normalize_domain(x)`.
pub fn normalize_domain(input: &str) -> String {
    let mut host = extract_host(input).unwrap_or_else(|| input.to_string());
    host = host.to_lowercase();

    if let Some(rest) = host.strip_prefix("www.") {
        host = rest.to_string();
    }

    for label in ["web", "m", "mobile", "www"] {
        let prefix = format!("{label}.");
        if let Some(rest) = host.strip_prefix(&prefix) {
            host = rest.to_string();
            break;
        }
    }

    host
}

/// Extract the host from a URL-ish string; falls back to treating the whole
/// string as a bare host if it doesn't parse as a URL.
pub fn extract_host(input: &str) -> Option<String> {
    if let Ok(parsed) = Url::parse(input) {
        return parsed.host_str().map(|h| h.to_string());
    }
    // Try prefixing a scheme so bare "example.com/path" still parses.
    if let Ok(parsed) = Url::parse(&format!("https://{input}")) {
        return parsed.host_str().map(|h| h.to_string());
    }
    None
}

/// `scheme://host/path` with query/fragment stripped, used by
/// `KnowledgeBase::getKnownUrl` fallback comparison (spec §4.6).
pub fn canonical_url(input: &str) -> Option<String> {
    let parsed = Url::parse(input).ok()?;
    Some(format!(
        "{}://{}{}",
        parsed.scheme(),
        parsed.host_str().unwrap_or(""),
        parsed.path()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_and_www() {
        assert_eq!(normalize_domain("https://www.example.com/path"), "example.com");
    }

    #[test]
    fn strips_leading_mobile_label() {
        assert_eq!(normalize_domain("https://m.example.com"), "example.com");
        assert_eq!(normalize_domain("https://web.example.com"), "example.com");
    }

    #[test]
    fn bare_host_passthrough() {
        assert_eq!(normalize_domain("EXAMPLE.COM"), "example.com");
    }

    #[test]
    fn idempotent() {
        let once = normalize_domain("https://www.Example.com/a/b");
        let twice = normalize_domain(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn canonical_url_strips_query_and_fragment() {
        assert_eq!(
            canonical_url("https://example.com/a/b?x=1#frag"),
            Some("https://example.com/a/b".to_string())
        );
    }
}
