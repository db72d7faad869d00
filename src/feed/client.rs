use crate::feed::types::{FeedDocument, CONTENT_TYPE};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default cap on a single feed document body.
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 1024 * 1024; // 1MB

/// Transport-level failures while fetching a feed document.
///
/// A `404` is not an error: it is reported as [`Fetched::NotFound`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with a status other than 200 or 404
    #[error("bad status code [{0}]")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Body was not a valid feed document
    #[error("Invalid feed document: {0}")]
    Decode(#[from] serde_json::Error),
    /// Response body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
}

/// Outcome of a successful round-trip to a feed URL.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Found(FeedDocument),
    /// The feed or page does not exist (yet).
    NotFound,
}

impl Fetched {
    pub fn into_document(self) -> Option<FeedDocument> {
        match self {
            Fetched::Found(doc) => Some(doc),
            Fetched::NotFound => None,
        }
    }
}

/// Fetches single feed documents by URL.
///
/// Cheap to clone: the underlying `reqwest::Client` is reference counted, so
/// every poller can hold its own copy of one shared connection pool.
#[derive(Debug, Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    timeout: Duration,
    max_document_bytes: usize,
}

impl Default for FeedClient {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl FeedClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            timeout: DEFAULT_TIMEOUT,
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_document_bytes(mut self, limit: usize) -> Self {
        self.max_document_bytes = limit;
        self
    }

    /// Fetches and decodes the feed document at `url`.
    ///
    /// - `200` with a decodable body → [`Fetched::Found`]
    /// - `404` → [`Fetched::NotFound`]
    /// - anything else → [`FetchError`], never retried here
    pub async fn fetch(&self, url: &str) -> Result<Fetched, FetchError> {
        let request = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, CONTENT_TYPE)
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(url = %url, "Feed document not found");
            return Ok(Fetched::NotFound);
        }
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        // Body gets its own deadline so a stalled upstream cannot hang a poller
        let bytes = tokio::time::timeout(
            self.timeout,
            read_limited_bytes(response, self.max_document_bytes),
        )
        .await
        .map_err(|_| FetchError::Timeout)??;
        let document: FeedDocument = serde_json::from_slice(&bytes)?;
        Ok(Fetched::Found(document))
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
