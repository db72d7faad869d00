use crate::feed::{FeedDocument, MergeError, Merger, CONTENT_TYPE, MERGED_EVENTS_PATH};
use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Router serving the merged view of `merger`'s streams.
///
/// - `GET /v1/events`: merged head
/// - `GET /v1/events/{cursor}`: merged page resumed from a composite cursor
///
/// CORS is open so browser-based feed viewers can page through it.
pub fn aggregate_router(merger: Arc<Merger>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route(MERGED_EVENTS_PATH, get(merged_head))
        .route(&format!("{}/{{cursor}}", MERGED_EVENTS_PATH), get(merged_page))
        .layer(cors)
        .with_state(merger)
}

async fn merged_head(State(merger): State<Arc<Merger>>) -> Response {
    respond(merger.head().await)
}

async fn merged_page(State(merger): State<Arc<Merger>>, Path(cursor): Path<String>) -> Response {
    respond(merger.page(&cursor).await)
}

fn respond(result: Result<Option<FeedDocument>, MergeError>) -> Response {
    match result {
        Ok(Some(doc)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE))],
            Json(doc),
        )
            .into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(MergeError::Cursor(e)) => {
            tracing::debug!(error = %e, "Rejected merged-feed cursor");
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(e @ MergeError::Fetch { .. }) => {
            tracing::warn!(error = %e, "Upstream stream fetch failed");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}
