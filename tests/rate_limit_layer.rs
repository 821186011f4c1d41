mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::ConnectInfo,
    http::{Request, StatusCode, header},
    middleware,
    routing::get,
};
use std::net::SocketAddr;
use std::sync::Arc;
use storefront_gateway::middleware::{RateLimitLayerState, rate_limit_middleware};
use storefront_gateway::{RateLimitOptions, RateLimitPolicy, RateLimitPreset, RateLimiterService};
use tower::util::ServiceExt;

use common::HeaderResolver;

fn app(limiter: Arc<RateLimiterService>, policy: RateLimitPolicy) -> Router {
    let layer = RateLimitLayerState::new(limiter, policy).with_resolver(Arc::new(HeaderResolver));
    Router::new()
        .route("/", get(|| async { (StatusCode::CREATED, "made") }))
        .layer(middleware::from_fn_with_state(layer, rate_limit_middleware))
}

fn request_from(ip: &str) -> Request<Body> {
    Request::builder()
        .uri("/")
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_standard_preset_admits_ten_of_eleven() {
    let app = app(
        Arc::new(RateLimiterService::new()),
        RateLimitPreset::Standard.into(),
    );

    let mut statuses = Vec::new();
    let mut last = None;
    for _ in 0..11 {
        let response = app.clone().oneshot(request_from("1.2.3.4")).await.unwrap();
        statuses.push(response.status());
        last = Some(response);
    }

    let limited = statuses
        .iter()
        .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
        .count();
    assert_eq!(limited, 1);
    assert_eq!(statuses.len() - limited, 10);

    let last = last.unwrap();
    assert_eq!(last.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = last.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    assert_eq!(last.headers()["x-ratelimit-limit"], "10");
    assert_eq!(last.headers()["x-ratelimit-remaining"], "0");

    let body = to_bytes(last.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        json["error"],
        "Too many requests. Please try again in a minute."
    );
    assert!(json["retryAfter"].as_u64().is_some());
}

#[tokio::test]
async fn test_admitted_response_keeps_status_and_body() {
    let app = app(
        Arc::new(RateLimiterService::new()),
        RateLimitPolicy::new(RateLimitOptions::new(60_000, 3)),
    );

    let response = app.oneshot(request_from("5.5.5.5")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["x-ratelimit-limit"], "3");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "2");
    assert!(response.headers().get("x-ratelimit-reset").is_some());
    assert!(response.headers().get(header::RETRY_AFTER).is_none());

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"made");
}

#[tokio::test]
async fn test_addresses_limited_separately() {
    let app = app(
        Arc::new(RateLimiterService::new()),
        RateLimitPreset::Order.into(),
    );

    for _ in 0..4 {
        let _ = app.clone().oneshot(request_from("10.0.0.1")).await.unwrap();
    }
    let blocked = app.clone().oneshot(request_from("10.0.0.1")).await.unwrap();
    assert_eq!(blocked.status(), StatusCode::TOO_MANY_REQUESTS);

    let other = app.clone().oneshot(request_from("10.0.0.2")).await.unwrap();
    assert_eq!(other.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_per_user_policy_keys_by_user() {
    let limiter = Arc::new(RateLimiterService::new());
    let app = app(
        limiter.clone(),
        RateLimitPolicy::from(RateLimitPreset::Order).per_user(),
    );

    let from_user = |user: &str| {
        Request::builder()
            .uri("/")
            .header("x-forwarded-for", "7.7.7.7")
            .header("x-test-user", user)
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..3 {
        let r = app.clone().oneshot(from_user("alice")).await.unwrap();
        assert_eq!(r.status(), StatusCode::CREATED);
    }
    let r = app.clone().oneshot(from_user("alice")).await.unwrap();
    assert_eq!(r.status(), StatusCode::TOO_MANY_REQUESTS);

    // same address, different user
    let r = app.clone().oneshot(from_user("bob")).await.unwrap();
    assert_eq!(r.status(), StatusCode::CREATED);

    assert!(limiter.record("user:alice", 60_000).is_some());
    assert!(limiter.record("ip:7.7.7.7", 60_000).is_none());
}

#[tokio::test]
async fn test_per_user_policy_falls_back_to_address() {
    let limiter = Arc::new(RateLimiterService::new());
    let app = app(
        limiter.clone(),
        RateLimitPolicy::from(RateLimitPreset::Order).per_user(),
    );

    let r = app.oneshot(request_from("8.8.8.8")).await.unwrap();
    assert_eq!(r.status(), StatusCode::CREATED);
    assert_eq!(limiter.record("ip:8.8.8.8", 60_000).map(|r| r.count), Some(1));
}

#[tokio::test]
async fn test_direct_clients_keyed_by_peer_address() {
    let limiter = Arc::new(RateLimiterService::new());
    let app = app(limiter.clone(), RateLimitPreset::Order.into());

    let from_peer = |addr: &str| {
        let addr: SocketAddr = addr.parse().unwrap();
        Request::builder()
            .uri("/")
            .extension(ConnectInfo(addr))
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..3 {
        let r = app.clone().oneshot(from_peer("192.0.2.1:50000")).await.unwrap();
        assert_eq!(r.status(), StatusCode::CREATED);
    }
    let r = app.clone().oneshot(from_peer("192.0.2.1:50001")).await.unwrap();
    assert_eq!(r.status(), StatusCode::TOO_MANY_REQUESTS);

    // another direct client is not caught by the first one's quota
    let r = app.clone().oneshot(from_peer("192.0.2.2:50000")).await.unwrap();
    assert_eq!(r.status(), StatusCode::CREATED);

    assert!(limiter.record("ip:unknown", 60_000).is_none());
    assert_eq!(limiter.record("ip:192.0.2.1", 60_000).map(|r| r.count), Some(4));
}
