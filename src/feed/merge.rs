//! Merging several independently paginated feeds into one.
//!
//! Every page of the merged feed is recomputed from the live constituent
//! feeds. A page's `next` link is a [`CompositeCursor`] naming, per stream,
//! the upstream page to look at next: the selected stream advances to its own
//! `next` page while every other stream stays on the page it was already
//! showing.

use crate::feed::client::{FeedClient, FetchError, Fetched};
use crate::feed::types::{FeedDocument, REL_LATEST, REL_NEXT, REL_SELF};
use crate::util::resolve_href;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Route under which merged pages are published.
pub const MERGED_EVENTS_PATH: &str = "/v1/events";

/// Upper bound on concurrent upstream fetches for one merged page.
const MAX_CONCURRENT_FETCHES: usize = 8;

const URL_SEPARATOR: char = '\n';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CursorError {
    #[error("cursor names no streams")]
    Empty,
    #[error("cursor URL is empty or contains a line break: {0:?}")]
    InvalidUrl(String),
    #[error("malformed cursor: {0}")]
    Malformed(String),
    #[error("cursor URL {0} does not belong to any configured stream")]
    UnknownStream(String),
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Cursor(#[from] CursorError),
    #[error("failed to fetch upstream page {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
}

/// A constituent feed of the merged view.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamSource {
    pub base_url: String,
    pub well_known_path: String,
}

/// Opaque resumption token over several feeds: one fully-qualified page URL
/// per constituent stream.
///
/// The wire form is the URLs joined by line breaks, base64url-encoded without
/// padding, which keeps it usable as a single path segment. Clients must
/// treat it as an unparsed blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeCursor {
    urls: Vec<String>,
}

impl CompositeCursor {
    pub fn new(urls: Vec<String>) -> Result<Self, CursorError> {
        if urls.is_empty() {
            return Err(CursorError::Empty);
        }
        if let Some(bad) = urls
            .iter()
            .find(|u| u.is_empty() || u.contains(URL_SEPARATOR))
        {
            return Err(CursorError::InvalidUrl(bad.clone()));
        }
        Ok(Self { urls })
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn encode(&self) -> String {
        let joined = self.urls.join(&URL_SEPARATOR.to_string());
        URL_SAFE_NO_PAD.encode(joined.as_bytes())
    }

    pub fn decode(token: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .map_err(|e| CursorError::Malformed(e.to_string()))?;
        let joined = String::from_utf8(bytes).map_err(|e| CursorError::Malformed(e.to_string()))?;
        if joined.is_empty() {
            return Err(CursorError::Empty);
        }
        Self::new(joined.split(URL_SEPARATOR).map(str::to_string).collect())
    }
}

impl fmt::Display for CompositeCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// The current page of one constituent stream.
#[derive(Debug, Clone)]
pub struct StreamHead {
    /// Base URL of the stream the page belongs to.
    pub base_url: String,
    /// Fully-qualified URL the page was fetched from.
    pub fetched_from: String,
    pub document: FeedDocument,
}

impl StreamHead {
    /// URL that fetches this same page again. Falls back to the fetch URL
    /// for producers that do not publish a `self` link.
    fn self_url(&self) -> String {
        match self.document.self_href() {
            Some(href) => resolve_href(&self.base_url, href),
            None => self.fetched_from.clone(),
        }
    }

    fn next_url(&self) -> Option<String> {
        self.document
            .next_href()
            .map(|href| resolve_href(&self.base_url, href))
    }
}

/// Newest first; equal timestamps fall back to base URL, then event ID.
fn newest_first(a: &StreamHead, b: &StreamHead) -> Ordering {
    b.document
        .data
        .occurred_at
        .cmp(&a.document.data.occurred_at)
        .then_with(|| a.base_url.cmp(&b.base_url))
        .then_with(|| a.document.data.event_id.cmp(&b.document.data.event_id))
}

/// Builds the merged page for a set of constituent heads.
///
/// The newest head becomes the page's data. Its `self` cursor names the self
/// URL of every head (selected first), so following it recomputes this page.
/// Its `next` cursor names the selected head's `next` page followed by the
/// self URL of every other head, and is omitted once all streams are
/// exhausted. Returns `None` when no stream has any event.
///
/// Sidecars that put only the selected head's URL in the `self` cursor
/// produce different tokens for the same page; tokens are not interchangeable.
pub fn merge_heads(
    mut heads: Vec<StreamHead>,
    route_prefix: &str,
) -> Result<Option<FeedDocument>, CursorError> {
    if heads.is_empty() {
        return Ok(None);
    }
    heads.sort_by(newest_first);

    let (chosen, others) = heads.split_at(1);
    let chosen = &chosen[0];

    let mut self_urls = vec![chosen.self_url()];
    let mut next_urls: Vec<String> = chosen.next_url().into_iter().collect();
    for head in others {
        self_urls.push(head.self_url());
        next_urls.push(head.self_url());
    }

    let prefix = route_prefix.trim_end_matches('/');
    let self_cursor = CompositeCursor::new(self_urls)?;
    let mut merged = FeedDocument::new(chosen.document.data.clone())
        .with_link(REL_SELF, format!("{}/{}", prefix, self_cursor.encode()))
        .with_link(REL_LATEST, prefix.to_string());

    if !next_urls.is_empty() {
        let next_cursor = CompositeCursor::new(next_urls)?;
        merged = merged.with_link(REL_NEXT, format!("{}/{}", prefix, next_cursor.encode()));
    }

    Ok(Some(merged))
}

/// Serves merged pages over a fixed set of constituent streams.
#[derive(Debug, Clone)]
pub struct Merger {
    client: FeedClient,
    streams: Vec<StreamSource>,
    route_prefix: String,
}

impl Merger {
    pub fn new(client: FeedClient, streams: Vec<StreamSource>) -> Self {
        Self {
            client,
            streams,
            route_prefix: MERGED_EVENTS_PATH.to_string(),
        }
    }

    pub fn with_route_prefix(mut self, route_prefix: impl Into<String>) -> Self {
        self.route_prefix = route_prefix.into();
        self
    }

    pub fn streams(&self) -> &[StreamSource] {
        &self.streams
    }

    /// Merged head: the newest event across every stream's well-known path.
    pub async fn head(&self) -> Result<Option<FeedDocument>, MergeError> {
        let targets = self
            .streams
            .iter()
            .map(|s| {
                (
                    s.base_url.clone(),
                    resolve_href(&s.base_url, &s.well_known_path),
                )
            })
            .collect();
        self.merge_targets(targets).await
    }

    /// Merged page resumed from an encoded [`CompositeCursor`].
    ///
    /// Every URL in the cursor must belong to a configured stream, so a
    /// crafted cursor cannot make the server fetch arbitrary URLs.
    pub async fn page(&self, token: &str) -> Result<Option<FeedDocument>, MergeError> {
        let cursor = CompositeCursor::decode(token)?;
        let targets = cursor
            .urls()
            .iter()
            .map(|url| {
                self.stream_for(url)
                    .map(|stream| (stream.base_url.clone(), url.clone()))
                    .ok_or_else(|| CursorError::UnknownStream(url.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.merge_targets(targets).await
    }

    /// Longest configured base URL that prefixes `url` on a path boundary.
    fn stream_for(&self, url: &str) -> Option<&StreamSource> {
        self.streams
            .iter()
            .filter(|s| {
                let base = s.base_url.trim_end_matches('/');
                url.strip_prefix(base).is_some_and(|rest| {
                    rest.is_empty() || rest.starts_with('/') || rest.starts_with('?')
                })
            })
            .max_by_key(|s| s.base_url.trim_end_matches('/').len())
    }

    async fn merge_targets(
        &self,
        targets: Vec<(String, String)>,
    ) -> Result<Option<FeedDocument>, MergeError> {
        let fetched: Vec<Result<Option<StreamHead>, MergeError>> = stream::iter(targets)
            .map(|(base_url, url)| {
                let client = self.client.clone();
                async move {
                    match client.fetch(&url).await {
                        Ok(Fetched::Found(document)) => Ok(Some(StreamHead {
                            base_url,
                            fetched_from: url,
                            document,
                        })),
                        Ok(Fetched::NotFound) => {
                            tracing::debug!(url = %url, "Stream has no events at this page");
                            Ok(None)
                        }
                        Err(source) => Err(MergeError::Fetch { url, source }),
                    }
                }
            })
            .buffered(MAX_CONCURRENT_FETCHES)
            .collect()
            .await;

        let mut heads = Vec::with_capacity(fetched.len());
        for result in fetched {
            if let Some(head) = result? {
                heads.push(head);
            }
        }

        Ok(merge_heads(heads, &self.route_prefix)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::Event;
    use crate::feed::walker::tests::{event, mount_feed};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn head(base_url: &str, ev: Event, next: Option<&str>) -> StreamHead {
        let mut document = FeedDocument::new(ev.clone())
            .with_link(REL_SELF, format!("/v1/events/{}", ev.event_id));
        if let Some(next) = next {
            document = document.with_link(REL_NEXT, format!("/v1/events/{}", next));
        }
        StreamHead {
            base_url: base_url.to_string(),
            fetched_from: format!("{}/v1/events", base_url),
            document,
        }
    }

    fn decode_link(doc: &FeedDocument, rel: &str) -> Vec<String> {
        let href = doc.link(rel).unwrap();
        let token = href.rsplit('/').next().unwrap();
        CompositeCursor::decode(token).unwrap().urls().to_vec()
    }

    #[test]
    fn test_newest_head_selected_with_composite_next() {
        // A at 10:05, B at 10:02
        let a = head("http://a", event("a2", 5), Some("a1"));
        let b = head("http://b", event("b7", 2), Some("b6"));

        let merged = merge_heads(vec![b, a], MERGED_EVENTS_PATH).unwrap().unwrap();

        assert_eq!(merged.data.event_id, "a2");
        assert_eq!(
            decode_link(&merged, REL_NEXT),
            vec![
                "http://a/v1/events/a1".to_string(),
                "http://b/v1/events/b7".to_string(),
            ]
        );
        assert_eq!(
            decode_link(&merged, REL_SELF),
            vec![
                "http://a/v1/events/a2".to_string(),
                "http://b/v1/events/b7".to_string(),
            ]
        );
        assert_eq!(merged.link(REL_LATEST), Some(MERGED_EVENTS_PATH));
    }

    #[test]
    fn test_equal_timestamps_break_ties_by_base_url() {
        let a = head("http://a", event("a1", 3), None);
        let b = head("http://b", event("b1", 3), None);

        let first = merge_heads(vec![b.clone(), a.clone()], "/v1/events").unwrap().unwrap();
        let second = merge_heads(vec![a, b], "/v1/events").unwrap().unwrap();

        assert_eq!(first.data.event_id, "a1");
        assert_eq!(first, second);
    }

    #[test]
    fn test_single_exhausted_stream_has_no_next() {
        let only = head("http://a", event("a1", 1), None);
        let merged = merge_heads(vec![only], "/v1/events").unwrap().unwrap();
        assert_eq!(merged.next_href(), None);
        assert_eq!(decode_link(&merged, REL_SELF), vec!["http://a/v1/events/a1".to_string()]);
    }

    #[test]
    fn test_missing_self_link_falls_back_to_fetch_url() {
        let bare = StreamHead {
            base_url: "http://b".to_string(),
            fetched_from: "http://b/v1/events".to_string(),
            document: FeedDocument::new(event("b1", 1)),
        };
        let a = head("http://a", event("a1", 2), None);

        let merged = merge_heads(vec![a, bare], "/v1/events").unwrap().unwrap();
        assert_eq!(decode_link(&merged, REL_NEXT), vec!["http://b/v1/events".to_string()]);
    }

    #[test]
    fn test_no_heads_is_none() {
        assert_eq!(merge_heads(Vec::new(), "/v1/events").unwrap(), None);
    }

    #[test]
    fn test_cursor_rejects_bad_input() {
        assert_eq!(CompositeCursor::new(Vec::new()), Err(CursorError::Empty));
        assert!(matches!(
            CompositeCursor::new(vec!["http://a/x\nhttp://b/y".to_string()]),
            Err(CursorError::InvalidUrl(_))
        ));
        assert!(matches!(
            CompositeCursor::decode("not base64!"),
            Err(CursorError::Malformed(_))
        ));
        assert_eq!(CompositeCursor::decode(""), Err(CursorError::Empty));
    }

    #[test]
    fn test_cursor_is_path_segment_safe() {
        // Bytes chosen so standard base64 would emit '+' and '/'
        let cursor = CompositeCursor::new(vec!["http://a/v1/events/~~~??>".to_string()]).unwrap();
        let token = cursor.encode();
        assert!(!token.contains('/'));
        assert!(!token.contains('+'));
        assert!(!token.contains('='));
    }

    proptest! {
        #[test]
        fn prop_cursor_decode_reconstructs_urls(
            urls in prop::collection::vec("https?://[a-z]{1,8}(:[0-9]{2,4})?(/[a-zA-Z0-9_,.-]{0,12}){0,4}", 1..6)
        ) {
            let cursor = CompositeCursor::new(urls.clone()).unwrap();
            let decoded = CompositeCursor::decode(&cursor.encode()).unwrap();
            prop_assert_eq!(decoded.urls(), urls.as_slice());
        }
    }

    #[tokio::test]
    async fn test_paging_interleaves_streams_newest_first() {
        let a = MockServer::start().await;
        mount_feed(&a, &[event("a2", 5), event("a1", 1)]).await;
        let b = MockServer::start().await;
        mount_feed(&b, &[event("b2", 4), event("b1", 2)]).await;

        let merger = Merger::new(
            FeedClient::default(),
            vec![
                StreamSource {
                    base_url: a.uri(),
                    well_known_path: "/v1/events".to_string(),
                },
                StreamSource {
                    base_url: b.uri(),
                    well_known_path: "/v1/events".to_string(),
                },
            ],
        );

        let mut page = merger.head().await.unwrap().unwrap();
        let mut seen = vec![page.data.event_id.clone()];
        while let Some(next) = page.next_href() {
            let token = next.rsplit('/').next().unwrap().to_string();
            page = merger.page(&token).await.unwrap().unwrap();
            seen.push(page.data.event_id.clone());
        }

        assert_eq!(seen, vec!["a2", "b2", "b1", "a1"]);
    }

    #[tokio::test]
    async fn test_self_cursor_reproduces_page() {
        let a = MockServer::start().await;
        mount_feed(&a, &[event("a2", 5), event("a1", 1)]).await;
        let b = MockServer::start().await;
        mount_feed(&b, &[event("b1", 2)]).await;

        let merger = Merger::new(
            FeedClient::default(),
            vec![
                StreamSource {
                    base_url: a.uri(),
                    well_known_path: "/v1/events".to_string(),
                },
                StreamSource {
                    base_url: b.uri(),
                    well_known_path: "/v1/events".to_string(),
                },
            ],
        );

        let head = merger.head().await.unwrap().unwrap();
        let token = head.self_href().unwrap().rsplit('/').next().unwrap().to_string();
        let again = merger.page(&token).await.unwrap().unwrap();
        assert_eq!(again.data, head.data);
        assert_eq!(again.next_href(), head.next_href());
    }

    #[tokio::test]
    async fn test_empty_stream_contributes_nothing() {
        let a = MockServer::start().await;
        mount_feed(&a, &[event("a1", 1)]).await;
        let empty = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&empty)
            .await;

        let merger = Merger::new(
            FeedClient::default(),
            vec![
                StreamSource {
                    base_url: a.uri(),
                    well_known_path: "/v1/events".to_string(),
                },
                StreamSource {
                    base_url: empty.uri(),
                    well_known_path: "/v1/events".to_string(),
                },
            ],
        );

        let page = merger.head().await.unwrap().unwrap();
        assert_eq!(page.data.event_id, "a1");
        assert_eq!(page.next_href(), None);
    }

    #[tokio::test]
    async fn test_cursor_outside_configured_streams_rejected() {
        let merger = Merger::new(
            FeedClient::default(),
            vec![StreamSource {
                base_url: "http://a.internal".to_string(),
                well_known_path: "/v1/events".to_string(),
            }],
        );

        let foreign = CompositeCursor::new(vec!["http://a.internal.evil/v1/events".to_string()])
            .unwrap()
            .encode();
        let err = merger.page(&foreign).await.unwrap_err();
        assert!(matches!(err, MergeError::Cursor(CursorError::UnknownStream(_))));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_fetch_error() {
        let broken = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&broken)
            .await;

        let merger = Merger::new(
            FeedClient::default(),
            vec![StreamSource {
                base_url: broken.uri(),
                well_known_path: "/v1/events".to_string(),
            }],
        );
        let err = merger.head().await.unwrap_err();
        assert!(matches!(err, MergeError::Fetch { .. }));
    }

    #[test]
    fn test_occurred_at_ordering_scenario() {
        let at = |h: u32, m: u32| Utc.with_ymd_and_hms(2023, 3, 1, h, m, 0).unwrap();
        let mut a = head("http://a", event("a", 0), None);
        a.document.data.occurred_at = at(10, 5);
        let mut b = head("http://b", event("b", 0), None);
        b.document.data.occurred_at = at(10, 2);

        let merged = merge_heads(vec![b, a], "/v1/events").unwrap().unwrap();
        assert_eq!(merged.data.event_id, "a");
    }
}
