//! Cache administration endpoints.

use crate::{
    responses::{ok, ApiResult, AppError},
    state::AppState,
};
use axum::{
    extract::{Query, State},
    routing::{delete, get},
    Router,
};
use bc_cache::CacheStatus;
use bc_core::BcError;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Query of the invalidation endpoint.
#[derive(Debug, Deserialize)]
pub struct InvalidateQuery {
    /// Glob under the application prefix, e.g. `stylists:*`. The namespace
    /// segment must be literal and must not be `ratelimit`.
    pub pattern: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub pattern: String,
    pub deleted: u64,
}

/// Creates the cache admin routes. [`crate::cache_admin_router`] puts them
/// behind the admin token.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/", delete(invalidate))
}

/// Store state, key prefix and key count.
pub async fn status(State(state): State<AppState>) -> ApiResult<CacheStatus> {
    ok(state.cache.status().await)
}

/// Deletes every key matching `pattern` under the application prefix.
pub async fn invalidate(
    State(state): State<AppState>,
    Query(query): Query<InvalidateQuery>,
) -> ApiResult<InvalidateResponse> {
    let raw = query
        .pattern
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError(BcError::validation("Query parameter 'pattern' is required")))?;

    let pattern = state.cache.keys().invalidation_pattern(&raw).ok_or_else(|| {
        AppError(BcError::validation(
            "Pattern must name a literal namespace other than 'ratelimit'",
        ))
    })?;
    let deleted = state.cache.delete_matching(&pattern).await?;
    info!(pattern = %pattern, deleted, "Cache invalidated by admin request");

    ok(InvalidateResponse { pattern, deleted })
}
