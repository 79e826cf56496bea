//! Fixed-window rate-limit decorator.

use super::ClientAddr;
use crate::responses::RateLimitedBody;
use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{header::RETRY_AFTER, HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use bc_cache::{CacheService, RateLimitDecision};
use bc_config::QuotaConfig;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RETRY_AFTER: HeaderName = HeaderName::from_static("x-ratelimit-retry-after");

/// Largest request body read when keying on a JSON field.
const MAX_IDENTITY_BODY_BYTES: usize = 64 * 1024;

const DENIED_MESSAGE: &str = "Too many requests, please try again later.";

/// Custom identifier function. `None` falls back to the client address.
pub type IdentifierFn = Arc<dyn Fn(&Request<Body>) -> Option<String> + Send + Sync>;

/// What a request is counted against.
#[derive(Clone)]
pub enum RateLimitKey {
    /// `ip:{address}`, the [`ClientAddr`](super::ClientAddr) of the request.
    ClientAddr,
    /// `{header}:{value}`.
    Header(HeaderName),
    /// `{prefix}:{value}` where value is a string field of the JSON body,
    /// trimmed and lowercased. Throttles login attempts per account
    /// regardless of source address.
    JsonField { field: String, prefix: String },
    Custom(IdentifierFn),
}

/// Quota and keying of one rate-limited route group.
#[derive(Clone)]
pub struct RateLimitState {
    cache: CacheService,
    max_attempts: u32,
    window: Duration,
    key: RateLimitKey,
    scope: Option<String>,
}

impl RateLimitState {
    pub fn new(
        cache: CacheService,
        max_attempts: u32,
        window: Duration,
        key: RateLimitKey,
    ) -> Self {
        Self {
            cache,
            max_attempts,
            window,
            key,
            scope: None,
        }
    }

    pub fn from_quota(cache: CacheService, quota: QuotaConfig, key: RateLimitKey) -> Self {
        Self::new(cache, quota.max_attempts, quota.window(), key)
    }

    /// Prefixes every identifier, so two limiters keyed on the same client
    /// keep separate counters.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Resolves the identifier, returning the request intact.
    async fn identify(&self, request: Request<Body>) -> (String, Request<Body>) {
        let (resolved, request) = match &self.key {
            RateLimitKey::ClientAddr => (None, request),
            RateLimitKey::Header(name) => {
                let value = request
                    .headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| format!("{}:{}", name.as_str(), v));
                (value, request)
            }
            RateLimitKey::JsonField { field, prefix } => {
                let (value, request) = json_field(request, field).await;
                (value.map(|v| format!("{}:{}", prefix, v)), request)
            }
            RateLimitKey::Custom(identify) => (identify(&request), request),
        };

        let identifier = resolved.unwrap_or_else(|| match ClientAddr::of(&request) {
            Some(addr) => format!("ip:{}", addr),
            None => "ip:unknown".to_string(),
        });

        match &self.scope {
            Some(scope) => (format!("{}:{}", scope, identifier), request),
            None => (identifier, request),
        }
    }
}

/// Counts the request and short-circuits with 429 once the quota is spent.
///
/// `X-RateLimit-Limit` and `X-RateLimit-Remaining` are set on every
/// response, including the 429.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (identifier, request) = state.identify(request).await;
    let decision = state
        .cache
        .increment_rate_limit(&identifier, state.max_attempts, state.window)
        .await;

    if !decision.allowed {
        debug!(
            identifier = %identifier,
            retry_after = decision.retry_after,
            "Request rate limited"
        );
        let body = RateLimitedBody {
            success: false,
            message: DENIED_MESSAGE.to_string(),
            retry_after: decision.retry_after,
        };
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        apply_headers(&mut response, &decision);
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(&mut response, &decision);
    response
}

fn apply_headers(response: &mut Response, decision: &RateLimitDecision) {
    let headers = response.headers_mut();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    if !decision.allowed {
        headers.insert(X_RATELIMIT_RETRY_AFTER, HeaderValue::from(decision.retry_after));
        headers.insert(RETRY_AFTER, HeaderValue::from(decision.retry_after));
    }
}

/// Reads a string field from a JSON body and rebuilds the request.
async fn json_field(request: Request<Body>, field: &str) -> (Option<String>, Request<Body>) {
    let fits = request
        .body()
        .size_hint()
        .upper()
        .is_some_and(|len| len <= MAX_IDENTITY_BODY_BYTES as u64);
    if !fits {
        return (None, request);
    }

    let (parts, body) = request.into_parts();
    match axum::body::to_bytes(body, MAX_IDENTITY_BODY_BYTES).await {
        Ok(bytes) => {
            let value = serde_json::from_slice::<Value>(&bytes)
                .ok()
                .and_then(|json| {
                    json.get(field)
                        .and_then(Value::as_str)
                        .map(|v| v.trim().to_lowercase())
                })
                .filter(|v| !v.is_empty());
            (value, Request::from_parts(parts, Body::from(bytes)))
        }
        Err(e) => {
            debug!(error = %e, "Could not read request body for rate-limit key");
            (None, Request::from_parts(parts, Body::empty()))
        }
    }
}
