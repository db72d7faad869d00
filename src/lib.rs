//! Polling-based event feeds over plain HTTP.
//!
//! Producers expose their events newest-first as linked JSON documents;
//! consumers poll the head, walk `next` links back to the last event they
//! processed and hand the new events to a handler oldest-first.

pub mod config;
pub mod feed;
pub mod server;
pub mod storage;
pub mod util;
