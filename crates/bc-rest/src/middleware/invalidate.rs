//! Invalidation decorator for mutation routes.

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use bc_cache::CacheService;
use futures::future::join_all;
use std::sync::Arc;
use tracing::debug;

/// Patterns to drop after a successful mutation.
#[derive(Clone)]
pub struct InvalidationState {
    cache: CacheService,
    patterns: Arc<[String]>,
}

impl InvalidationState {
    /// Patterns are confined under the application prefix, so
    /// `route:/api/services*` and `stylists:*` are valid arguments.
    pub fn new<I, P>(cache: CacheService, patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| cache.keys().scoped_pattern(p.as_ref()))
            .collect();
        Self { cache, patterns }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// After a 2xx response, deletes the configured patterns in the background.
pub async fn invalidate_middleware(
    State(state): State<InvalidationState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let response = next.run(request).await;

    if response.status().is_success() && !state.patterns.is_empty() {
        let InvalidationState { cache, patterns } = state;
        tokio::spawn(async move {
            let deletes = patterns.iter().map(|pattern| cache.delete_by_pattern(pattern));
            let outcomes = join_all(deletes).await;
            for (pattern, ok) in patterns.iter().zip(outcomes) {
                if ok {
                    debug!(pattern = %pattern, "Invalidated cached responses");
                }
            }
        });
    }

    response
}
