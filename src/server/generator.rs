use crate::feed::Event;
use crate::storage::{EventRepository, StorageError};
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Name carried by every generated event.
pub const GENERATED_EVENT_NAME: &str = "some_fake_event";

/// Fills a repository with random events, for demos and load against consumers.
pub struct EventGenerator {
    repo: Arc<dyn EventRepository>,
    max_events: usize,
}

impl EventGenerator {
    pub fn new(repo: Arc<dyn EventRepository>, max_events: usize) -> Self {
        Self { repo, max_events }
    }

    /// Publishes between 1 and `max_events` new events (none when
    /// `max_events` is zero) and returns how many were published.
    pub async fn publish_batch(&self) -> Result<usize, StorageError> {
        let count = batch_size(self.max_events);
        for _ in 0..count {
            self.repo.publish(random_event()).await?;
        }
        Ok(count)
    }

    /// Publishes a batch every `every` until shutdown. A zero interval means
    /// the feed stays as seeded and this returns immediately.
    pub async fn run(
        self,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), StorageError> {
        if every.is_zero() {
            return Ok(());
        }

        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The seed batch stands in for the immediate first tick
        ticker.tick().await;

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
                    let generated = self.publish_batch().await?;
                    tracing::info!(generated, "Generated new events");
                }
            }
        }
        Ok(())
    }
}

fn batch_size(max_events: usize) -> usize {
    if max_events == 0 {
        return 0;
    }
    rand::rng().random_range(1..=max_events)
}

fn random_event() -> Event {
    let mut rng = rand::rng();
    Event {
        event_id: uuid::Uuid::new_v4().to_string(),
        event_name: GENERATED_EVENT_NAME.to_string(),
        occurred_at: Utc::now(),
        payload: serde_json::json!({ "value": rng.random_range(0..1000u32) }),
    }
}
