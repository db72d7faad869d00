//! HTTP surfaces built on the feed engine.
//!
//! - [`producer_router`]: publishes a repository's events as a paginated feed
//! - [`aggregate_router`]: serves several upstream feeds merged into one
//! - [`EventGenerator`]: keeps a repository topped up with random events

mod aggregate;
mod generator;
mod producer;

pub use aggregate::aggregate_router;
pub use generator::{EventGenerator, GENERATED_EVENT_NAME};
pub use producer::{producer_router, NewEvent, EVENTS_PATH};

use axum::Router;
use std::future::Future;
use tokio::net::TcpListener;

/// Serves `router` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, "Listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
