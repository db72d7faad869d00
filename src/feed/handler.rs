use crate::feed::error::HandlerError;
use crate::feed::types::Event;
use async_trait::async_trait;
use std::future::Future;

/// Receives each batch of newly discovered events, oldest first.
///
/// One listener never calls its handler concurrently with itself, but a
/// handler shared by a consumer group is called from several listeners at
/// once. Shared state behind it must do its own locking.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, events: Vec<Event>) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(Vec<Event>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, events: Vec<Event>) -> Result<(), HandlerError> {
        (self)(events).await
    }
}
