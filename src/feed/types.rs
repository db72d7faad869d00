use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Media type of every feed document.
pub const CONTENT_TYPE: &str = "application/vnd.bud.events+json";

/// Link relation pointing at the document itself.
pub const REL_SELF: &str = "self";
/// Link relation pointing at the next-older page. Absent on the oldest page.
pub const REL_NEXT: &str = "next";
/// Link relation pointing at the feed head.
pub const REL_LATEST: &str = "latest";

/// A single published event.
///
/// The payload is opaque: it is carried as whatever JSON value the producer
/// published and never inspected by the feed engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub event_name: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// A navigation link inside a feed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub href: String,
    #[serde(rename = "type", default)]
    pub method: String,
}

impl Reference {
    pub fn get(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            method: "GET".to_string(),
        }
    }
}

/// One page of a feed: the current event plus links to its neighbours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedDocument {
    pub data: Event,
    #[serde(default)]
    pub metadata: BTreeMap<String, Reference>,
}

impl FeedDocument {
    pub fn new(data: Event) -> Self {
        Self {
            data,
            metadata: BTreeMap::new(),
        }
    }

    /// Adds a `GET` link under `rel`, replacing any existing one.
    pub fn with_link(mut self, rel: &str, href: impl Into<String>) -> Self {
        self.metadata.insert(rel.to_string(), Reference::get(href));
        self
    }

    /// Returns the href for `rel`, treating an empty href as absent.
    pub fn link(&self, rel: &str) -> Option<&str> {
        self.metadata
            .get(rel)
            .map(|r| r.href.as_str())
            .filter(|href| !href.is_empty())
    }

    pub fn next_href(&self) -> Option<&str> {
        self.link(REL_NEXT)
    }

    pub fn self_href(&self) -> Option<&str> {
        self.link(REL_SELF)
    }
}

/// Body returned alongside a `404` for an unknown page: only navigation, no data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinksOnly {
    pub metadata: BTreeMap<String, Reference>,
}
