use super::{EventPage, EventRepository, StorageError};
use crate::feed::Event;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-process event store, lost on restart.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Publication order, oldest first.
    events: Vec<Event>,
    index: HashMap<String, usize>,
}

impl Inner {
    fn page_at(&self, position: usize) -> EventPage {
        EventPage {
            event: self.events[position].clone(),
            previous: position
                .checked_sub(1)
                .map(|p| self.events[p].event_id.clone()),
        }
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while holding the lock cannot leave Inner half-updated: every
    // mutation is a single push plus insert, so poisoning is safe to ignore.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl EventRepository for MemoryRepository {
    async fn publish(&self, event: Event) -> Result<(), StorageError> {
        let mut inner = self.write();
        if inner.index.contains_key(&event.event_id) {
            return Err(StorageError::Duplicate(event.event_id));
        }
        let position = inner.events.len();
        inner.index.insert(event.event_id.clone(), position);
        inner.events.push(event);
        Ok(())
    }

    async fn latest(&self) -> Result<Option<EventPage>, StorageError> {
        let inner = self.read();
        Ok(inner
            .events
            .len()
            .checked_sub(1)
            .map(|last| inner.page_at(last)))
    }

    async fn get(&self, event_id: &str) -> Result<Option<EventPage>, StorageError> {
        let inner = self.read();
        Ok(inner.index.get(event_id).map(|&p| inner.page_at(p)))
    }
}
