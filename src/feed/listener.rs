use crate::feed::client::FeedClient;
use crate::feed::error::ConsumeError;
use crate::feed::handler::EventHandler;
use crate::feed::walker::discover_new_events;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Floor applied to poll intervals; `tokio::time::interval` rejects zero.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Resumption state of one feed subscription.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListenerCursor {
    pub base_url: String,
    pub well_known_path: String,
    #[serde(
        alias = "ticker",
        deserialize_with = "crate::util::deserialize_duration"
    )]
    pub poll_interval: Duration,
    /// ID of the newest event already handed to the handler. Empty means
    /// nothing has been consumed and the first poll drains the feed.
    #[serde(default)]
    pub last_event_id: String,
}

impl ListenerCursor {
    pub fn new(
        base_url: impl Into<String>,
        well_known_path: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            well_known_path: well_known_path.into(),
            poll_interval,
            last_event_id: String::new(),
        }
    }

    pub fn resume_after(mut self, last_event_id: impl Into<String>) -> Self {
        self.last_event_id = last_event_id.into();
        self
    }
}

/// Lifecycle of a listener. `Failed` is terminal for [`Listener::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Polling,
    Delivering,
    Failed,
}

/// Polls one feed and hands new events to a handler.
///
/// The listener exclusively owns its cursor. The cursor advances only after
/// the handler accepted a batch, and only to the newest event of that batch,
/// so a failed delivery is replayed from the same point next time.
pub struct Listener<H: ?Sized> {
    cursor: ListenerCursor,
    client: FeedClient,
    handler: Arc<H>,
    state: ListenerState,
}

impl<H> Listener<H>
where
    H: EventHandler + ?Sized,
{
    pub fn new(cursor: ListenerCursor, client: FeedClient, handler: Arc<H>) -> Self {
        Self {
            cursor,
            client,
            handler,
            state: ListenerState::Idle,
        }
    }

    pub fn cursor(&self) -> &ListenerCursor {
        &self.cursor
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Runs a single poll: walk the feed, deliver, advance the cursor.
    ///
    /// Returns the number of events delivered. Calling it again after a
    /// failure retries from the unchanged cursor.
    pub async fn poll_once(&mut self) -> Result<usize, ConsumeError> {
        self.state = ListenerState::Polling;

        let events = match discover_new_events(
            &self.client,
            &self.cursor.base_url,
            &self.cursor.well_known_path,
            &self.cursor.last_event_id,
        )
        .await
        {
            Ok(events) => events,
            Err(e) => {
                self.state = ListenerState::Failed;
                tracing::warn!(base_url = %self.cursor.base_url, error = %e, "Polling feed failed");
                return Err(e.into());
            }
        };

        let Some(newest) = events.last().map(|e| e.event_id.clone()) else {
            self.state = ListenerState::Idle;
            return Ok(0);
        };
        let count = events.len();

        self.state = ListenerState::Delivering;
        if let Err(source) = self.handler.handle(events).await {
            self.state = ListenerState::Failed;
            tracing::warn!(
                base_url = %self.cursor.base_url,
                events = count,
                error = %source,
                "Event handler failed, cursor not advanced"
            );
            return Err(ConsumeError::Handler {
                base_url: self.cursor.base_url.clone(),
                source,
            });
        }

        tracing::debug!(
            base_url = %self.cursor.base_url,
            events = count,
            last_event_id = %newest,
            "Delivered events"
        );
        self.cursor.last_event_id = newest;
        self.state = ListenerState::Idle;
        Ok(count)
    }

    /// Polls on every tick until shutdown is signalled or a poll fails.
    ///
    /// The first tick fires immediately and missed ticks are skipped. Shutdown
    /// is observed between polls, so an in-flight poll completes first. A
    /// closed shutdown channel counts as shutdown. On graceful stop the final
    /// cursor is returned.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<ListenerCursor, ConsumeError> {
        let mut ticker = interval(self.cursor.poll_interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            base_url = %self.cursor.base_url,
            well_known_path = %self.cursor.well_known_path,
            poll_interval_ms = self.cursor.poll_interval.as_millis() as u64,
            last_event_id = %self.cursor.last_event_id,
            "Polling event feed"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    self.poll_once().await?;
                }
            }
        }

        tracing::info!(
            base_url = %self.cursor.base_url,
            last_event_id = %self.cursor.last_event_id,
            "Listener stopped"
        );
        Ok(self.cursor)
    }
}
