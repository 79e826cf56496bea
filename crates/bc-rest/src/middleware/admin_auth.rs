//! Bearer-token guard for the cache admin endpoints.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

/// Admin middleware state.
#[derive(Clone)]
pub struct AdminAuthState {
    token: Arc<str>,
}

impl AdminAuthState {
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self {
            token: token.into(),
        }
    }

    fn accepts(&self, presented: &str) -> bool {
        let expected = self.token.as_bytes();
        let presented = presented.as_bytes();
        // Compare every byte so timing does not leak the matching prefix.
        expected.len() == presented.len()
            && expected
                .iter()
                .zip(presented)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

/// Requires `Authorization: Bearer <admin token>`.
///
/// Returns 401 otherwise.
pub async fn admin_auth_middleware(
    State(state): State<AdminAuthState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .is_some_and(|token| state.accepts(token.trim()));

    if !authorized {
        warn!(path = %request.uri().path(), "Rejected unauthenticated admin request");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_comparison() {
        let state = AdminAuthState::new("0123456789abcdef");
        assert!(state.accepts("0123456789abcdef"));
        assert!(!state.accepts("0123456789abcdeF"));
        assert!(!state.accepts("0123456789abcde"));
        assert!(!state.accepts(""));
    }
}
