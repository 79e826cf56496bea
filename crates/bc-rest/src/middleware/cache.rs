//! Response cache decorator for GET routes.
//!
//! On a miss the handler runs and a successful JSON object body is stored
//! in the background with `_timestamp`, `_status` and `_contentType` side
//! fields. A hit replays the stored status and content type, with the side
//! fields swapped for `_cached: true` and `_cachedAt`. The body sent to the
//! caller on a miss is the handler's, byte for byte.

use super::{CacheBypass, RequestIdentity};
use crate::responses::AppError;
use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{
        header::CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use bc_cache::{CacheService, Namespace};
use bc_core::BcError;
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Response header reporting `HIT`, `MISS` or `BYPASS`.
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

const TIMESTAMP_FIELD: &str = "_timestamp";
const STATUS_FIELD: &str = "_status";
const CONTENT_TYPE_FIELD: &str = "_contentType";
const CACHED_FIELD: &str = "_cached";
const CACHED_AT_FIELD: &str = "_cachedAt";
const ANONYMOUS: &str = "anonymous";

/// Default ceiling for a buffered response body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Derives the route part of a cache key from the request.
pub type CacheKeyFn = Arc<dyn Fn(&Request<Body>) -> String + Send + Sync>;

/// Configuration of one cached route group.
#[derive(Clone)]
pub struct RouteCacheState {
    cache: CacheService,
    ttl: Duration,
    max_body_bytes: usize,
    key_fn: Option<CacheKeyFn>,
}

impl RouteCacheState {
    /// Caches responses for `ttl`.
    pub fn new(cache: CacheService, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            key_fn: None,
        }
    }

    /// Caches responses for the configured `route` TTL.
    pub fn for_routes(cache: CacheService) -> Self {
        let ttl = cache.ttl_for(Namespace::Route);
        Self::new(cache, ttl)
    }

    /// Bodies larger than this pass through uncached.
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Replaces path and query with a custom route identifier. The caller
    /// identity is still appended.
    pub fn with_key_fn<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&Request<Body>) -> String + Send + Sync + 'static,
    {
        self.key_fn = Some(Arc::new(key_fn));
        self
    }

    /// `{prefix}:route:{path}:{query}:{identity}`, or
    /// `{prefix}:route:{custom}:{identity}` with a key function.
    pub fn cache_key(&self, request: &Request<Body>) -> String {
        let identity = RequestIdentity::of(request).unwrap_or(ANONYMOUS);
        let keys = self.cache.keys();

        match &self.key_fn {
            Some(key_fn) => keys.key(Namespace::Route, [key_fn(request).as_str(), identity]),
            None => {
                let query = normalized_query(request.uri().query());
                keys.key(Namespace::Route, [request.uri().path(), query.as_str(), identity])
            }
        }
    }

    /// Buffers a successful JSON response and schedules the cache write.
    async fn capture(&self, key: String, response: Response) -> Response {
        if response.status().as_u16() >= 400 || !is_json(response.headers()) {
            return response;
        }

        let fits = response
            .body()
            .size_hint()
            .upper()
            .is_some_and(|len| len <= self.max_body_bytes as u64);
        if !fits {
            debug!(key, "Response body too large or unbounded, not caching");
            return response;
        }

        let (parts, body) = response.into_parts();
        let bytes = match axum::body::to_bytes(body, self.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "Failed to read response body");
                let error = AppError(BcError::internal("Failed to read response body"));
                return error.into_response();
            }
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(mut envelope)) => {
                let now = Utc::now().to_rfc3339();
                envelope.insert(TIMESTAMP_FIELD.to_string(), Value::String(now));
                envelope.insert(STATUS_FIELD.to_string(), Value::from(parts.status.as_u16()));
                if let Some(content_type) = parts.headers.get(CONTENT_TYPE) {
                    if let Ok(content_type) = content_type.to_str() {
                        envelope.insert(
                            CONTENT_TYPE_FIELD.to_string(),
                            Value::String(content_type.to_string()),
                        );
                    }
                }
                let cache = self.cache.clone();
                let ttl = self.ttl;
                tokio::spawn(async move {
                    cache.set(&key, &Value::Object(envelope), ttl).await;
                });
            }
            _ => debug!(key, "Response body is not a JSON object, not caching"),
        }

        Response::from_parts(parts, Body::from(bytes))
    }
}

/// Caches GET responses per path, query and caller identity.
pub async fn cache_middleware(
    State(state): State<RouteCacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    if CacheBypass::of(&request).0 {
        let mut response = next.run(request).await;
        set_outcome(&mut response, "BYPASS");
        return response;
    }

    let key = state.cache_key(&request);

    if let Some(Value::Object(envelope)) = state.cache.get::<Value>(&key).await {
        debug!(key, "Serving cached response");
        let mut response = replay(envelope);
        set_outcome(&mut response, "HIT");
        return response;
    }

    let response = next.run(request).await;
    let mut response = state.capture(key, response).await;
    set_outcome(&mut response, "MISS");
    response
}

/// Rebuilds a response from a stored envelope. Envelopes written before
/// the status and content type were recorded replay as 200 JSON.
fn replay(mut envelope: Map<String, Value>) -> Response {
    let status = envelope
        .remove(STATUS_FIELD)
        .and_then(|v| v.as_u64())
        .and_then(|code| u16::try_from(code).ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::OK);
    let content_type = envelope
        .remove(CONTENT_TYPE_FIELD)
        .and_then(|v| v.as_str().and_then(|ct| HeaderValue::from_str(ct).ok()));

    let mut response = (status, Json(Value::Object(annotate(envelope)))).into_response();
    if let Some(content_type) = content_type {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    response
}

/// Swaps the stored `_timestamp` for the hit annotation.
fn annotate(mut envelope: Map<String, Value>) -> Map<String, Value> {
    let cached_at = envelope.remove(TIMESTAMP_FIELD).unwrap_or(Value::Null);
    envelope.insert(CACHED_FIELD.to_string(), Value::Bool(true));
    envelope.insert(CACHED_AT_FIELD.to_string(), cached_at);
    envelope
}

/// Query pairs sorted by name then value, re-encoded.
fn normalized_query(query: Option<&str>) -> String {
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return String::new();
    };

    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    pairs.sort();

    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            let mime = v.split(';').next().unwrap_or("").trim();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

fn set_outcome(response: &mut Response, outcome: &'static str) {
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static(outcome));
}
