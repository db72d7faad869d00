//! Integration tests for the merged feed served over several producers.

mod common;

use budevents::feed::{
    CompositeCursor, Consumer, Event, FeedClient, HandlerError, ListenerCursor, Merger, StreamSource,
};
use budevents::server::{aggregate_router, producer_router};
use budevents::storage::MemoryRepository;
use common::{eventually, get_json, post_event, spawn_server, TestServer};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

async fn producer_with(events: &[(&str, u32)]) -> TestServer {
    let server = spawn_server(producer_router(Arc::new(MemoryRepository::new()))).await;
    for (id, minute) in events {
        let response = post_event(
            &server.base_url,
            json!({
                "event_id": id,
                "event_name": "loan_application_submitted",
                "occurred_at": format!("2024-03-01T10:{:02}:00Z", minute),
            }),
        )
        .await;
        assert_eq!(response.status(), 201);
    }
    server
}

fn source(server: &TestServer) -> StreamSource {
    StreamSource {
        base_url: server.base_url.clone(),
        well_known_path: "/v1/events".to_string(),
    }
}

async fn aggregator(streams: Vec<StreamSource>) -> TestServer {
    let merger = Merger::new(FeedClient::default(), streams);
    spawn_server(aggregate_router(Arc::new(merger))).await
}

/// Follows `next` links from the merged head, collecting event IDs.
async fn walk_merged(base_url: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut url = format!("{}/v1/events", base_url);
    loop {
        let (status, body) = get_json(&url).await;
        assert_eq!(status, 200, "GET {}", url);
        ids.push(body["data"]["event_id"].as_str().unwrap().to_string());
        match body["metadata"]["next"]["href"].as_str() {
            Some(href) => url = format!("{}{}", base_url, href),
            None => return ids,
        }
        assert!(ids.len() < 20, "merged feed does not terminate");
    }
}

#[tokio::test]
async fn test_merged_feed_interleaves_by_time() {
    let a = producer_with(&[("a1", 0), ("a2", 5)]).await;
    let b = producer_with(&[("b1", 2), ("b2", 3)]).await;
    let agg = aggregator(vec![source(&a), source(&b)]).await;

    assert_eq!(walk_merged(&agg.base_url).await, vec!["a2", "b2", "b1", "a1"]);
}

#[tokio::test]
async fn test_self_link_reproduces_page() {
    let a = producer_with(&[("a1", 0), ("a2", 5)]).await;
    let b = producer_with(&[("b1", 2)]).await;
    let agg = aggregator(vec![source(&a), source(&b)]).await;

    let (_, head) = get_json(&format!("{}/v1/events", agg.base_url)).await;
    let next = head["metadata"]["next"]["href"].as_str().unwrap();
    let (_, second) = get_json(&format!("{}{}", agg.base_url, next)).await;
    assert_eq!(second["data"]["event_id"], "b1");

    let self_href = second["metadata"]["self"]["href"].as_str().unwrap();
    let (status, again) = get_json(&format!("{}{}", agg.base_url, self_href)).await;
    assert_eq!(status, 200);
    assert_eq!(again, second);
}

#[tokio::test]
async fn test_empty_streams_give_not_found() {
    let a = producer_with(&[]).await;
    let b = producer_with(&[]).await;
    let agg = aggregator(vec![source(&a), source(&b)]).await;

    let (status, _) = get_json(&format!("{}/v1/events", agg.base_url)).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_bad_cursors_rejected() {
    let a = producer_with(&[("a1", 0)]).await;
    let agg = aggregator(vec![source(&a)]).await;

    let (status, _) = get_json(&format!("{}/v1/events/not!base64", agg.base_url)).await;
    assert_eq!(status, 400);

    let foreign = CompositeCursor::new(vec!["http://169.254.169.254/latest".to_string()]).unwrap();
    let (status, _) = get_json(&format!("{}/v1/events/{}", agg.base_url, foreign)).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_unreachable_stream_is_bad_gateway() {
    let a = producer_with(&[("a1", 0)]).await;

    // Reserve a port, then free it so nothing is listening there
    let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed_url = format!("http://{}", closed.local_addr().unwrap());
    drop(closed);

    let agg = aggregator(vec![
        source(&a),
        StreamSource {
            base_url: closed_url,
            well_known_path: "/v1/events".to_string(),
        },
    ])
    .await;

    let (status, _) = get_json(&format!("{}/v1/events", agg.base_url)).await;
    assert_eq!(status, 502);
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let a = producer_with(&[("a1", 0)]).await;
    let agg = aggregator(vec![source(&a)]).await;

    let response = reqwest::Client::new()
        .get(format!("{}/v1/events", agg.base_url))
        .header("origin", "https://viewer.example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap()
            .to_str()
            .unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_merged_feed_is_consumable() {
    let a = producer_with(&[("a1", 0), ("a2", 5)]).await;
    let b = producer_with(&[("b1", 2), ("b2", 3)]).await;
    let agg = aggregator(vec![source(&a), source(&b)]).await;

    let received = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = received.clone();
    let handler = Arc::new(move |events: Vec<Event>| {
        let sink = sink.clone();
        async move {
            sink.lock()
                .unwrap()
                .extend(events.into_iter().map(|e| e.event_id));
            Ok::<(), HandlerError>(())
        }
    });

    let consumer = Consumer::new(
        FeedClient::default(),
        handler,
        vec![ListenerCursor::new(
            agg.base_url.clone(),
            "/v1/events",
            Duration::from_millis(20),
        )],
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let group = tokio::spawn(consumer.consume(shutdown_rx));

    assert!(eventually(|| received.lock().unwrap().len() == 4).await);
    assert_eq!(*received.lock().unwrap(), vec!["a1", "b1", "b2", "a2"]);

    shutdown_tx.send(true).unwrap();
    assert!(group.await.unwrap().is_ok());
}
