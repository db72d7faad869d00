use crate::feed::client::FeedClient;
use crate::feed::error::ConsumeError;
use crate::feed::handler::EventHandler;
use crate::feed::listener::{Listener, ListenerCursor};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Runs one [`Listener`] per configured feed, all sharing one handler.
///
/// The group is a long-running subscription: it only finishes when a
/// listener fails (that error is returned and every sibling is cancelled) or
/// when the caller signals shutdown.
pub struct Consumer<H: ?Sized> {
    client: FeedClient,
    handler: Arc<H>,
    cursors: Vec<ListenerCursor>,
}

impl<H> Consumer<H>
where
    H: EventHandler + ?Sized + 'static,
{
    pub fn new(client: FeedClient, handler: Arc<H>, cursors: Vec<ListenerCursor>) -> Self {
        Self {
            client,
            handler,
            cursors,
        }
    }

    /// Consumes every feed concurrently until failure or shutdown.
    ///
    /// Returns `Ok(())` when `shutdown` flips to `true` (or its sender is
    /// dropped) and immediately when no feeds are configured.
    pub async fn consume(self, mut shutdown: watch::Receiver<bool>) -> Result<(), ConsumeError> {
        if self.cursors.is_empty() {
            tracing::warn!("No listeners configured, nothing to consume");
            return Ok(());
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut listeners = JoinSet::new();

        for cursor in self.cursors {
            let base_url = cursor.base_url.clone();
            let listener = Listener::new(cursor, self.client.clone(), Arc::clone(&self.handler));
            let cancel_rx = cancel_rx.clone();
            listeners.spawn(async move {
                listener
                    .run(cancel_rx)
                    .await
                    .map(|_| ())
                    .map_err(|e| (base_url, e))
            });
        }

        tracing::info!(listeners = listeners.len(), "Consumer group started");

        let mut external_shutdown = *shutdown.borrow();
        let mut first_error: Option<ConsumeError> = None;

        while !external_shutdown {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        external_shutdown = true;
                    }
                }

                joined = listeners.join_next() => {
                    match joined {
                        // A listener only returns Ok after cancellation, which has not happened yet
                        Some(Ok(Ok(()))) => {}
                        Some(Ok(Err((_, e)))) => {
                            first_error = Some(e);
                            break;
                        }
                        Some(Err(join_err)) => {
                            first_error = Some(ConsumeError::Panicked(join_err.to_string()));
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        let _ = cancel_tx.send(true);

        // Pollers observe cancellation between polls; wait for them to stop
        while let Some(joined) = listeners.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err((base_url, e))) => {
                    tracing::debug!(base_url = %base_url, error = %e, "Listener failed during shutdown");
                }
                Err(join_err) => {
                    tracing::warn!(error = %join_err, "Listener task panicked during shutdown");
                }
            }
        }

        match first_error {
            Some(e) => {
                tracing::error!(error = %e, "Consumer group stopped after listener failure");
                Err(e)
            }
            None => {
                tracing::info!("Consumer group shut down");
                Ok(())
            }
        }
    }
}
