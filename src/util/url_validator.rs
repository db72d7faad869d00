use thiserror::Error;
use url::Url;

/// Errors that can occur while validating a feed base URL.
#[derive(Error, Debug)]
pub enum UrlError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host: {0}")]
    MissingHost(String),
}

/// Validates a feed base URL.
///
/// Feeds are plain HTTP resources, often served from localhost or a private
/// network next to the consumer, so only the scheme and host are checked.
///
/// # Examples
///
/// ```
/// use budevents::util::validate_base_url;
///
/// assert!(validate_base_url("http://localhost:8080").is_ok());
/// assert!(validate_base_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_base_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost(url_str.to_owned()));
    }

    Ok(url)
}

/// Resolves a link href against a feed's base URL.
///
/// Hrefs published by producers are paths relative to the feed's base URL and
/// are appended to it verbatim, so a base URL carrying a path prefix keeps it.
/// Hrefs that are already absolute http(s) URLs are returned unchanged.
pub fn resolve_href(base_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }

    let base = base_url.trim_end_matches('/');
    if href.is_empty() {
        return base.to_string();
    }
    if href.starts_with('/') {
        format!("{}{}", base, href)
    } else {
        format!("{}/{}", base, href)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_urls() {
        assert!(validate_base_url("https://example.com").is_ok());
        assert!(validate_base_url("http://localhost:8080").is_ok());
        assert!(validate_base_url("http://10.0.0.1:3000/api").is_ok());
    }

    #[test]
    fn test_invalid_schemes() {
        assert!(matches!(
            validate_base_url("file:///etc/passwd"),
            Err(UrlError::UnsupportedScheme(_))
        ));
        assert!(validate_base_url("ftp://example.com").is_err());
    }

    #[test]
    fn test_relative_url_rejected() {
        assert!(matches!(
            validate_base_url("/v1/events"),
            Err(UrlError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_resolve_relative_href() {
        assert_eq!(
            resolve_href("http://localhost:8080", "/v1/events/e1"),
            "http://localhost:8080/v1/events/e1"
        );
        assert_eq!(
            resolve_href("http://localhost:8080/", "/v1/events/e1"),
            "http://localhost:8080/v1/events/e1"
        );
        assert_eq!(
            resolve_href("http://localhost:8080", "v1/events"),
            "http://localhost:8080/v1/events"
        );
    }

    #[test]
    fn test_resolve_keeps_base_path_prefix() {
        assert_eq!(
            resolve_href("https://example.com/orders", "/v1/events"),
            "https://example.com/orders/v1/events"
        );
    }

    #[test]
    fn test_resolve_absolute_href_passthrough() {
        assert_eq!(
            resolve_href("http://localhost:8080", "http://other:9000/v1/events/x"),
            "http://other:9000/v1/events/x"
        );
    }
}
