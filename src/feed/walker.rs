use crate::feed::client::{FeedClient, FetchError, Fetched};
use crate::feed::types::Event;
use crate::util::resolve_href;
use std::collections::HashSet;
use thiserror::Error;

/// Page count after which a single walk logs that it is unusually long.
///
/// The walk itself is never cut short: stopping early would skip events.
pub const LONG_WALK_WARN_PAGES: usize = 1000;

#[derive(Debug, Error)]
pub enum WalkError {
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    /// A `next` link led back to an event already visited in this walk.
    #[error("feed at {base_url} links back to already visited event {event_id}")]
    Cycle { base_url: String, event_id: String },
    /// A page linked from `next` vanished mid-walk.
    #[error("page {url} disappeared while walking the feed")]
    MissingPage { url: String },
}

/// Discovers every event newer than `last_event_id`, oldest first.
///
/// Starts at `base_url + well_known_path` and follows `next` links until the
/// page holding `last_event_id` (excluded) or the oldest page is reached. An
/// empty `last_event_id` therefore drains the whole feed, and so does an ID
/// that has aged out of the feed's retention.
///
/// A `404` at the head means the feed has no events yet and yields an empty
/// batch.
pub async fn discover_new_events(
    client: &FeedClient,
    base_url: &str,
    well_known_path: &str,
    last_event_id: &str,
) -> Result<Vec<Event>, WalkError> {
    let head_url = resolve_href(base_url, well_known_path);
    let mut page = match fetch(client, &head_url).await? {
        Fetched::Found(doc) => doc,
        Fetched::NotFound => return Ok(Vec::new()),
    };

    if page.data.event_id == last_event_id {
        return Ok(Vec::new());
    }

    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(page.data.event_id.clone());
    let mut events = vec![page.data.clone()];

    while let Some(next_href) = page.next_href() {
        let url = resolve_href(base_url, next_href);
        page = match fetch(client, &url).await? {
            Fetched::Found(doc) => doc,
            Fetched::NotFound => return Err(WalkError::MissingPage { url }),
        };

        if page.data.event_id == last_event_id {
            break;
        }
        if !seen.insert(page.data.event_id.clone()) {
            return Err(WalkError::Cycle {
                base_url: base_url.to_string(),
                event_id: page.data.event_id,
            });
        }

        events.push(page.data.clone());
        if events.len() == LONG_WALK_WARN_PAGES {
            tracing::warn!(
                base_url = %base_url,
                pages = LONG_WALK_WARN_PAGES,
                last_event_id = %last_event_id,
                "Backward walk is unusually long, still looking for last consumed event"
            );
        }
    }

    // Wire order is newest-first
    events.reverse();

    tracing::debug!(
        base_url = %base_url,
        discovered = events.len(),
        "Backward walk complete"
    );
    Ok(events)
}

async fn fetch(client: &FeedClient, url: &str) -> Result<Fetched, WalkError> {
    client.fetch(url).await.map_err(|source| WalkError::Fetch {
        url: url.to_string(),
        source,
    })
}
