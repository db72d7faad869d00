use crate::feed::{
    Event, FeedDocument, LinksOnly, Reference, CONTENT_TYPE, REL_LATEST, REL_NEXT, REL_SELF,
};
use crate::storage::{EventPage, EventRepository, StorageError};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

/// Route of the feed head; single events live underneath it.
pub const EVENTS_PATH: &str = "/v1/events";

/// Body accepted by `POST /v1/events`.
///
/// `event_id` and `occurred_at` are assigned by the server when absent.
#[derive(Debug, Deserialize)]
pub struct NewEvent {
    #[serde(default)]
    pub event_id: Option<String>,
    pub event_name: String,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl NewEvent {
    fn into_event(self) -> Event {
        let event_id = self
            .event_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Event {
            event_id,
            event_name: self.event_name,
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            payload: self.payload,
        }
    }
}

#[derive(Clone)]
struct ProducerState {
    repo: Arc<dyn EventRepository>,
}

/// Router exposing `repo` as a feed.
///
/// - `GET /v1/events`: newest event
/// - `GET /v1/events/{event_id}`: one event, linking to the one before it
/// - `POST /v1/events`: publish
pub fn producer_router(repo: Arc<dyn EventRepository>) -> Router {
    Router::new()
        .route(EVENTS_PATH, get(get_latest).post(publish))
        .route(&format!("{}/{{event_id}}", EVENTS_PATH), get(get_event))
        .with_state(ProducerState { repo })
}

fn event_href(event_id: &str) -> String {
    format!("{}/{}", EVENTS_PATH, event_id)
}

fn page_document(page: EventPage) -> FeedDocument {
    let self_href = event_href(&page.event.event_id);
    let mut doc = FeedDocument::new(page.event)
        .with_link(REL_SELF, self_href)
        .with_link(REL_LATEST, EVENTS_PATH);
    if let Some(previous) = page.previous {
        doc = doc.with_link(REL_NEXT, event_href(&previous));
    }
    doc
}

fn feed_response(status: StatusCode, body: impl serde::Serialize) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE))],
        Json(body),
    )
        .into_response()
}

fn storage_failure(e: StorageError) -> Response {
    tracing::warn!(error = %e, "Event repository failed");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

async fn get_latest(State(state): State<ProducerState>) -> Response {
    match state.repo.latest().await {
        Ok(Some(page)) => feed_response(StatusCode::OK, page_document(page)),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => storage_failure(e),
    }
}

async fn get_event(
    State(state): State<ProducerState>,
    Path(event_id): Path<String>,
) -> Response {
    match state.repo.get(&event_id).await {
        Ok(Some(page)) => feed_response(StatusCode::OK, page_document(page)),
        Ok(None) => {
            let mut body = LinksOnly::default();
            body.metadata
                .insert(REL_LATEST.to_string(), Reference::get(EVENTS_PATH));
            feed_response(StatusCode::NOT_FOUND, body)
        }
        Err(e) => storage_failure(e),
    }
}

/// IDs become path segments, so they may not carry URL delimiters or be a
/// dot segment that URL normalisation would rewrite.
fn is_valid_event_id(id: &str) -> bool {
    if id.is_empty() || id == "." || id == ".." {
        return false;
    }
    !id.chars()
        .any(|c| matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace() || c.is_control())
}

async fn publish(State(state): State<ProducerState>, body: Bytes) -> Response {
    let new_event: NewEvent = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected malformed event");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };
    let event = new_event.into_event();
    if !is_valid_event_id(&event.event_id) {
        return (StatusCode::BAD_REQUEST, "event_id must be a single non-dot path segment").into_response();
    }

    let location = event_href(&event.event_id);
    let event_id = event.event_id.clone();
    match state.repo.publish(event).await {
        Ok(()) => {
            tracing::info!(event_id = %event_id, "Published event");
            (StatusCode::CREATED, [(header::LOCATION, location)]).into_response()
        }
        Err(StorageError::Duplicate(id)) => {
            (StatusCode::CONFLICT, format!("event {} already exists", id)).into_response()
        }
        Err(e) => storage_failure(e),
    }
}
