//! End-to-end tests for the reqwest clients against a local axum server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use subcount_client::{FetchParams, SocialCountsClient, SubcountClient, SubcountError};

async fn subs(Path(channel_id): Path<String>, Query(q): Query<HashMap<String, String>>) -> Response {
    match channel_id.as_str() {
        "UC_cached" => (
            [("x-from-cache", "true")],
            Json(json!({ "subscriberCount": 100, "fromCache": true })),
        )
            .into_response(),
        "UC_broken" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Failed to fetch subscriber count" })),
        )
            .into_response(),
        "UC_garbage" => ([("x-from-cache", "false")], "<html>oops</html>").into_response(),
        "UC_slow" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({ "subscriberCount": 1 })).into_response()
        }
        // Echo: count is the forwarded cacheTTL, cache flag is the inverse of bypassCache.
        _ => {
            let ttl: u64 = q.get("cacheTTL").and_then(|v| v.parse().ok()).unwrap_or(0);
            let from_cache = if q.get("bypassCache").map(String::as_str) == Some("true") {
                "false"
            } else {
                "true"
            };
            ([("x-from-cache", from_cache)], Json(json!({ "subscriberCount": ttl }))).into_response()
        }
    }
}

async fn live_count(Path(channel_id): Path<String>, headers: HeaderMap) -> Response {
    if channel_id == "UC_missing" {
        return (StatusCode::NOT_FOUND, "no such channel").into_response();
    }
    let use_cache = headers
        .get("x-use-cache")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let ttl: u64 = headers
        .get("x-cache-ttl")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    (
        [("x-from-cache", use_cache)],
        Json(json!({ "est_sub": ttl, "other": "ignored" })),
    )
        .into_response()
}

async fn spawn_server() -> SocketAddr {
    let app = Router::new()
        .route("/api/subs/{channel_id}", get(subs))
        .route("/youtube-live-subscriber-count/{channel_id}", get(live_count));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn params(bypass_cache: bool, cache_ttl_ms: u64) -> FetchParams {
    FetchParams {
        bypass_cache,
        cache_ttl_ms,
    }
}

#[tokio::test]
async fn forwards_cache_params_as_query() {
    let addr = spawn_server().await;
    let client = SubcountClient::new(&format!("http://{addr}/"), Duration::from_secs(2)).unwrap();

    let reading = client.subscriber_count("UC_echo", params(true, 3000)).await.unwrap();
    assert_eq!(reading.subscriber_count, 3000);
    assert!(!reading.from_cache);

    let reading = client.subscriber_count("UC_echo", params(false, 0)).await.unwrap();
    assert_eq!(reading.subscriber_count, 0);
    assert!(reading.from_cache);
}

#[tokio::test]
async fn reads_cache_header() {
    let addr = spawn_server().await;
    let client = SubcountClient::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();

    let reading = client.subscriber_count("UC_cached", params(false, 5000)).await.unwrap();
    assert_eq!(reading.subscriber_count, 100);
    assert!(reading.from_cache);
}

#[tokio::test]
async fn error_status_and_bad_body_fail() {
    let addr = spawn_server().await;
    let client = SubcountClient::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();

    let err = client.subscriber_count("UC_broken", params(false, 5000)).await.unwrap_err();
    assert!(matches!(err, SubcountError::Api { status: 500, .. }));

    let err = client.subscriber_count("UC_garbage", params(false, 5000)).await.unwrap_err();
    assert!(matches!(err, SubcountError::Parse(_)));
}

#[tokio::test]
async fn hung_request_times_out() {
    let addr = spawn_server().await;
    let client = SubcountClient::new(&format!("http://{addr}"), Duration::from_millis(200)).unwrap();

    let err = client.subscriber_count("UC_slow", params(false, 5000)).await.unwrap_err();
    assert!(matches!(err, SubcountError::Network(_)));
}

#[tokio::test]
async fn unreachable_proxy_is_network_error() {
    let client = SubcountClient::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
    let err = client.subscriber_count("UC_any", params(false, 5000)).await.unwrap_err();
    assert!(matches!(err, SubcountError::Network(_)));
}

#[tokio::test]
async fn socialcounts_sends_cache_headers() {
    let addr = spawn_server().await;
    let client = SocialCountsClient::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();

    let count = client.live_subscriber_count("UC_any", true, "7000").await.unwrap();
    assert_eq!(count.est_sub, 7000);
    assert!(count.from_cache);

    let count = client.live_subscriber_count("UC_any", false, "5000").await.unwrap();
    assert!(!count.from_cache);
}

#[tokio::test]
async fn socialcounts_error_status() {
    let addr = spawn_server().await;
    let client = SocialCountsClient::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();

    let err = client.live_subscriber_count("UC_missing", true, "5000").await.unwrap_err();
    match err {
        SubcountError::Api { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "no such channel");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}
