//! Consuming and merging paginated event feeds.
//!
//! A feed is exposed as a head document at a well-known path whose `next`
//! link points at the next-older page. This module provides:
//!
//! - **Fetching**: [`FeedClient`] retrieves one document and tells "found"
//!   from "not found" from transport errors
//! - **Walking**: [`discover_new_events`] follows `next` links back to the
//!   last consumed event and returns the newer events oldest-first
//! - **Listening**: [`Listener`] polls one feed on an interval and delivers
//!   batches to an [`EventHandler`], advancing its cursor only on success
//! - **Consuming**: [`Consumer`] runs many listeners concurrently and stops
//!   them all on the first failure
//! - **Merging**: [`Merger`] presents several feeds as one, paginated through
//!   opaque [`CompositeCursor`]s
//!
//! # Example
//!
//! ```ignore
//! use budevents::feed::{Consumer, FeedClient, ListenerCursor};
//!
//! let cursors = vec![ListenerCursor::new("http://localhost:8080", "/v1/events", interval)];
//! let handler = Arc::new(|events: Vec<Event>| async move {
//!     for e in &events { println!("{}", e.event_id); }
//!     Ok(())
//! });
//! Consumer::new(FeedClient::default(), handler, cursors).consume(shutdown_rx).await?;
//! ```

mod client;
mod consumer;
mod error;
mod handler;
mod listener;
mod merge;
mod types;
mod walker;

pub use client::{FeedClient, FetchError, Fetched, DEFAULT_MAX_DOCUMENT_BYTES, DEFAULT_TIMEOUT};
pub use consumer::Consumer;
pub use error::{ConsumeError, HandlerError};
pub use handler::EventHandler;
pub use listener::{Listener, ListenerCursor, ListenerState};
pub use merge::{
    merge_heads, CompositeCursor, CursorError, MergeError, Merger, StreamHead, StreamSource,
    MERGED_EVENTS_PATH,
};
pub use types::{
    Event, FeedDocument, LinksOnly, Reference, CONTENT_TYPE, REL_LATEST, REL_NEXT, REL_SELF,
};
pub use walker::{discover_new_events, WalkError, LONG_WALK_WARN_PAGES};
