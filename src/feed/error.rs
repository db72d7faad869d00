use crate::feed::walker::WalkError;
use thiserror::Error;

/// Error type returned by event handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures that terminate a listener and, through it, its consumer group.
#[derive(Debug, Error)]
pub enum ConsumeError {
    /// Discovering new events failed (transport error or malformed feed).
    #[error(transparent)]
    Walk(#[from] WalkError),
    /// The handler rejected a batch. The listener cursor was not advanced.
    #[error("handler failed for feed {base_url}: {source}")]
    Handler {
        base_url: String,
        #[source]
        source: HandlerError,
    },
    /// A listener task panicked or was aborted.
    #[error("listener task panicked: {0}")]
    Panicked(String),
}
