//! Main application router.

use crate::{
    controllers::{cache_controller, health_controller},
    middleware::{
        admin_auth_middleware, cache_middleware, logging_middleware, rate_limit_middleware,
        request_context_middleware, AdminAuthState, RateLimitKey, RateLimitState,
        RequestContextState, RouteCacheState,
    },
    state::AppState,
};
use axum::{http::HeaderValue, middleware, routing::get, Router};
use bc_cache::CacheService;
use bc_config::{QuotaConfig, ServerConfig};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

/// Creates the main application router.
///
/// `api` holds the route handlers being fronted. Each request to them
/// passes the general rate limit (keyed by client address), then the
/// response cache, then reaches the handler. Mutation routes inside `api`
/// attach their own [`InvalidationState`](crate::middleware::InvalidationState)
/// and login routes their own [`auth_rate_limit`] layer.
///
/// The cache admin routes are mounted only when `server.admin_token` is
/// set, behind the same general limit and the token check.
pub fn create_router(state: AppState, api: Router) -> Router {
    let server_config = state.config.server.clone();
    let cors = create_cors_layer(&server_config);
    let request_context = RequestContextState::from_config(&server_config);

    let route_cache = RouteCacheState::for_routes(state.cache.clone())
        .with_max_body_bytes(state.config.cache.max_body_bytes);
    let general_limit = RateLimitState::from_quota(
        state.cache.clone(),
        state.config.rate_limit.general,
        RateLimitKey::ClientAddr,
    )
    .with_scope("general");

    let api = api
        .layer(middleware::from_fn_with_state(route_cache, cache_middleware))
        .layer(middleware::from_fn_with_state(
            general_limit.clone(),
            rate_limit_middleware,
        ));

    let mut router = Router::new()
        // Health endpoints
        .merge(health_controller::router().with_state(state.clone()))
        // Fronted API
        .merge(api);

    match server_config.admin_token() {
        Some(token) => {
            let admin = cache_admin_router(state, AdminAuthState::new(token)).layer(
                middleware::from_fn_with_state(general_limit, rate_limit_middleware),
            );
            router = router.merge(admin);
        }
        None => info!("No admin token configured; cache admin endpoints disabled"),
    }

    let router = router
        .route("/", get(root))
        .layer(middleware::from_fn_with_state(
            request_context,
            request_context_middleware,
        ))
        .layer(TimeoutLayer::new(server_config.request_timeout()))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(logging_middleware))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    info!("Router created");
    router
}

/// Cache admin routes under `/api/v1/cache`, requiring the admin bearer
/// token. For embedders that mount them on their own terms.
pub fn cache_admin_router(state: AppState, auth: AdminAuthState) -> Router {
    Router::new()
        .nest("/api/v1/cache", cache_controller::router())
        .layer(middleware::from_fn_with_state(auth, admin_auth_middleware))
        .with_state(state)
}

/// Rate limit for login and verification routes, keyed by the submitted
/// `email` so rotating source addresses does not reset the count.
pub fn auth_rate_limit(cache: CacheService, quota: QuotaConfig) -> RateLimitState {
    RateLimitState::from_quota(
        cache,
        quota,
        RateLimitKey::JsonField {
            field: "email".to_string(),
            prefix: "auth".to_string(),
        },
    )
}

/// Creates a CORS layer based on server configuration.
fn create_cors_layer(server_config: &ServerConfig) -> CorsLayer {
    if !server_config.cors_enabled {
        return CorsLayer::new();
    }

    if server_config.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = server_config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Root endpoint handler.
async fn root() -> &'static str {
    "bc-edge cache and rate-limit layer"
}
