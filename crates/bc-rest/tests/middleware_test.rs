//! Router-level tests for the cache, invalidation and rate-limit layers.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bc_cache::{CacheService, ConnectionState, KeyValueStore, MemoryStore};
use bc_config::CacheConfig;
use bc_rest::middleware::{
    cache_middleware, invalidate_middleware, rate_limit_middleware, InvalidationState, RateLimitKey,
    RateLimitState, RequestIdentity, RouteCacheState,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn cache() -> (CacheService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (CacheService::new(store.clone(), &CacheConfig::default()), store)
}

/// Attaches the socket peer address axum provides with connect info.
fn with_peer(mut request: Request<Body>, ip: &str) -> Request<Body> {
    let peer = SocketAddr::new(ip.parse().unwrap(), 40000);
    request.extensions_mut().insert(ConnectInfo(peer));
    request
}

fn get_request(uri: &str) -> Request<Body> {
    with_peer(Request::builder().uri(uri).body(Body::empty()).unwrap(), "203.0.113.7")
}

async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Background cache writes and invalidations run on spawned tasks.
async fn wait_for_keys(store: &MemoryStore, pattern: &str, expected: usize) {
    for _ in 0..200 {
        if store.enumerate_keys(pattern).await.unwrap().len() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {} keys matching {}", expected, pattern);
}

fn services_app(cache: CacheService, calls: Arc<AtomicU32>) -> Router {
    Router::new()
        .route(
            "/api/services",
            get(move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Json(json!({"success": true, "data": [{"id": 1, "name": "Cut"}]}))
                }
            }),
        )
        .layer(middleware::from_fn_with_state(
            RouteCacheState::for_routes(cache),
            cache_middleware,
        ))
}

#[tokio::test]
async fn test_second_get_is_served_from_cache() {
    let (cache, store) = cache();
    let calls = Arc::new(AtomicU32::new(0));
    let app = services_app(cache, calls.clone());

    let first = app.clone().oneshot(get_request("/api/services")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header(&first, "x-cache"), Some("MISS"));
    let live = body_json(first).await;
    assert!(live.get("_cached").is_none());

    wait_for_keys(&store, "bc:route:*", 1).await;

    let second = app.clone().oneshot(get_request("/api/services")).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(header(&second, "x-cache"), Some("HIT"));

    let mut cached = body_json(second).await;
    assert_eq!(cached["_cached"], json!(true));
    assert!(cached["_cachedAt"].is_string());

    let map = cached.as_object_mut().unwrap();
    map.remove("_cached");
    map.remove("_cachedAt");
    assert_eq!(cached, live);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_hit_replays_status_and_content_type() {
    let (cache, store) = cache();
    let app = Router::new()
        .route(
            "/api/availability",
            get(|| async {
                (
                    StatusCode::NON_AUTHORITATIVE_INFORMATION,
                    [("content-type", "application/vnd.bc+json; charset=utf-8")],
                    r#"{"slots":["10:00"]}"#,
                )
            }),
        )
        .layer(middleware::from_fn_with_state(
            RouteCacheState::for_routes(cache),
            cache_middleware,
        ));

    let first = app.clone().oneshot(get_request("/api/availability")).await.unwrap();
    assert_eq!(first.status(), StatusCode::NON_AUTHORITATIVE_INFORMATION);
    wait_for_keys(&store, "bc:route:*", 1).await;

    let second = app.oneshot(get_request("/api/availability")).await.unwrap();
    assert_eq!(header(&second, "x-cache"), Some("HIT"));
    assert_eq!(second.status(), StatusCode::NON_AUTHORITATIVE_INFORMATION);
    assert_eq!(
        header(&second, "content-type"),
        Some("application/vnd.bc+json; charset=utf-8")
    );

    let body = body_json(second).await;
    assert_eq!(body["slots"], json!(["10:00"]));
    assert!(body.get("_status").is_none());
    assert!(body.get("_contentType").is_none());
}

#[tokio::test]
async fn test_error_responses_are_not_cached() {
    let (cache, store) = cache();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let app = Router::new()
        .route(
            "/api/stylists/99",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::NOT_FOUND, Json(json!({"success": false})))
                }
            }),
        )
        .layer(middleware::from_fn_with_state(
            RouteCacheState::for_routes(cache),
            cache_middleware,
        ));

    for _ in 0..2 {
        let response = app.clone().oneshot(get_request("/api/stylists/99")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(header(&response, "x-cache"), Some("MISS"));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_bypass_and_non_get_skip_cache() {
    let (cache, store) = cache();
    let calls = Arc::new(AtomicU32::new(0));
    let app = services_app(cache, calls.clone()).route("/api/echo", post(|| async { "ok" }));

    let request = Request::builder()
        .uri("/api/services")
        .header("x-cache-bypass", "true")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(header(&response, "x-cache"), Some("BYPASS"));

    let request = Request::builder()
        .method("POST")
        .uri("/api/echo")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(store.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

async fn identity_from_header(mut request: Request<Body>, next: Next) -> Response {
    let user = request
        .headers()
        .get("x-user")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if let Some(user) = user {
        request.extensions_mut().insert(RequestIdentity(user));
    }
    next.run(request).await
}

#[tokio::test]
async fn test_cache_is_per_identity() {
    let (cache, store) = cache();
    let app = Router::new()
        .route(
            "/api/me",
            get(|request: Request<Body>| async move {
                let user = RequestIdentity::of(&request).unwrap_or("nobody").to_string();
                Json(json!({ "user": user }))
            }),
        )
        .layer(middleware::from_fn_with_state(
            RouteCacheState::for_routes(cache),
            cache_middleware,
        ))
        .layer(middleware::from_fn(identity_from_header));

    let as_user = |user: &str| {
        Request::builder()
            .uri("/api/me")
            .header("x-user", user)
            .body(Body::empty())
            .unwrap()
    };

    app.clone().oneshot(as_user("ana")).await.unwrap();
    wait_for_keys(&store, "bc:route:*", 1).await;

    let other = app.clone().oneshot(as_user("rui")).await.unwrap();
    assert_eq!(header(&other, "x-cache"), Some("MISS"));
    assert_eq!(body_json(other).await["user"], "rui");
    wait_for_keys(&store, "bc:route:*", 2).await;

    let again = app.clone().oneshot(as_user("ana")).await.unwrap();
    assert_eq!(header(&again, "x-cache"), Some("HIT"));
    assert_eq!(body_json(again).await["user"], "ana");
}

#[tokio::test]
async fn test_mutation_invalidates_route_cache() {
    let (cache, store) = cache();
    let calls = Arc::new(AtomicU32::new(0));

    let writes = Router::new()
        .route(
            "/api/services/new",
            post(|| async { (StatusCode::CREATED, Json(json!({"success": true}))) }),
        )
        .layer(middleware::from_fn_with_state(
            InvalidationState::new(cache.clone(), ["route:/api/services*"]),
            invalidate_middleware,
        ));
    let app = services_app(cache, calls.clone()).merge(writes);

    app.clone().oneshot(get_request("/api/services")).await.unwrap();
    wait_for_keys(&store, "bc:route:*", 1).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/services/new")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    wait_for_keys(&store, "bc:route:*", 0).await;

    let response = app.clone().oneshot(get_request("/api/services")).await.unwrap();
    assert_eq!(header(&response, "x-cache"), Some("MISS"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_mutation_keeps_cache() {
    let (cache, store) = cache();
    let writes = Router::new()
        .route(
            "/api/services/new",
            post(|| async { StatusCode::UNPROCESSABLE_ENTITY.into_response() }),
        )
        .layer(middleware::from_fn_with_state(
            InvalidationState::new(cache.clone(), ["route:*"]),
            invalidate_middleware,
        ));
    let app = services_app(cache, Arc::new(AtomicU32::new(0))).merge(writes);

    app.clone().oneshot(get_request("/api/services")).await.unwrap();
    wait_for_keys(&store, "bc:route:*", 1).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/services/new")
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(store.enumerate_keys("bc:route:*").await.unwrap().len(), 1);
}

fn limited_app(cache: CacheService, max: u32, key: RateLimitKey) -> Router {
    Router::new()
        .route("/api/ping", get(|| async { "pong" }))
        .route("/api/auth/login", post(|| async { "welcome" }))
        .layer(middleware::from_fn_with_state(
            RateLimitState::new(cache, max, Duration::from_secs(60), key),
            rate_limit_middleware,
        ))
}

#[tokio::test]
async fn test_rate_limit_headers_and_429() {
    let (cache, _) = cache();
    let app = limited_app(cache, 2, RateLimitKey::ClientAddr);

    for expected in ["1", "0"] {
        let response = app.clone().oneshot(get_request("/api/ping")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-ratelimit-limit"), Some("2"));
        assert_eq!(header(&response, "x-ratelimit-remaining"), Some(expected));
        assert!(header(&response, "x-ratelimit-retry-after").is_none());
    }

    let denied = app.clone().oneshot(get_request("/api/ping")).await.unwrap();
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&denied, "x-ratelimit-remaining"), Some("0"));
    assert_eq!(header(&denied, "x-ratelimit-limit"), Some("2"));
    let retry_after: u64 = header(&denied, "x-ratelimit-retry-after").unwrap().parse().unwrap();
    assert!(retry_after > 0 && retry_after <= 60);
    assert_eq!(header(&denied, "retry-after"), Some(retry_after.to_string().as_str()));

    let body = body_json(denied).await;
    assert_eq!(body["success"], json!(false));
    assert!(body["message"].is_string());
    assert_eq!(body["retryAfter"], json!(retry_after));
}

#[tokio::test]
async fn test_rate_limit_is_per_client() {
    let (cache, _) = cache();
    let app = limited_app(cache, 1, RateLimitKey::ClientAddr);

    let from = |ip: &str| {
        with_peer(Request::builder().uri("/api/ping").body(Body::empty()).unwrap(), ip)
    };

    let status = app.clone().oneshot(from("198.51.100.1")).await.unwrap().status();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        app.clone().oneshot(from("198.51.100.1")).await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    let status = app.clone().oneshot(from("198.51.100.2")).await.unwrap().status();
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_login_throttled_per_account_across_addresses() {
    let (cache, store) = cache();
    let key = RateLimitKey::JsonField {
        field: "email".to_string(),
        prefix: "auth".to_string(),
    };
    let app = limited_app(cache, 2, key);

    let login = |ip: &str| {
        let request = Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"email":"ana@example.com","password":"nope"}"#))
            .unwrap();
        with_peer(request, ip)
    };

    for ip in ["10.0.0.1", "10.0.0.2"] {
        assert_eq!(app.clone().oneshot(login(ip)).await.unwrap().status(), StatusCode::OK);
    }
    assert_eq!(
        app.clone().oneshot(login("10.0.0.3")).await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert!(store.exists("bc:ratelimit:auth:ana@example.com").await.unwrap());
}

#[tokio::test]
async fn test_store_outage_never_fails_requests() {
    let (cache, store) = cache();
    store.set_state(ConnectionState::Disconnected);

    let calls = Arc::new(AtomicU32::new(0));
    let app = services_app(cache.clone(), calls.clone()).layer(middleware::from_fn_with_state(
        RateLimitState::new(cache, 1, Duration::from_secs(60), RateLimitKey::ClientAddr),
        rate_limit_middleware,
    ));

    for _ in 0..3 {
        let response = app.clone().oneshot(get_request("/api/services")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-cache"), Some("MISS"));
        assert_eq!(header(&response, "x-ratelimit-remaining"), Some("1"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
