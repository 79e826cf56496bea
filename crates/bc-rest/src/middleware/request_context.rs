//! Per-request context derived from headers and the connection.
//!
//! Handlers and the cache decorator read these from request extensions.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header::CACHE_CONTROL, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use bc_config::ServerConfig;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Request header that opts a request out of response caching.
pub const CACHE_BYPASS_HEADER: &str = "x-cache-bypass";

/// Proxy header carrying the originating client address. Only read from
/// trusted proxies.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Whether this request's response must not be served from or written to
/// the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheBypass(pub bool);

impl CacheBypass {
    /// Set by `X-Cache-Bypass: true|1|yes` or `Cache-Control: no-cache|no-store`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let flagged = headers
            .get(CACHE_BYPASS_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let no_cache = headers
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(',').any(|d| {
                    matches!(d.trim().to_ascii_lowercase().as_str(), "no-cache" | "no-store")
                })
            })
            .unwrap_or(false);

        Self(flagged || no_cache)
    }

    /// Reads the flag inserted by [`request_context_middleware`], falling
    /// back to the headers when the middleware did not run.
    pub fn of<B>(request: &Request<B>) -> Self {
        request
            .extensions()
            .get::<CacheBypass>()
            .copied()
            .unwrap_or_else(|| Self::from_headers(request.headers()))
    }
}

/// Caller identity resolved by the authentication layer in front of this
/// one. Used to keep personalized responses and quotas per user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity(pub String);

impl RequestIdentity {
    pub fn of<B>(request: &Request<B>) -> Option<&str> {
        request
            .extensions()
            .get::<RequestIdentity>()
            .map(|identity| identity.0.as_str())
    }
}

/// Network address the request is attributed to, resolved once per request
/// by [`request_context_middleware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub IpAddr);

impl ClientAddr {
    /// Resolved address, or the socket peer when the middleware did not
    /// run. `None` when the server was not started with connect info.
    pub fn of<B>(request: &Request<B>) -> Option<IpAddr> {
        request
            .extensions()
            .get::<ClientAddr>()
            .map(|addr| addr.0)
            .or_else(|| peer_addr(request))
    }
}

fn peer_addr<B>(request: &Request<B>) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Proxies allowed to name the client through `X-Forwarded-For`.
#[derive(Debug, Clone)]
pub struct RequestContextState {
    trusted_proxies: Arc<[IpAddr]>,
}

impl Default for RequestContextState {
    fn default() -> Self {
        Self::new([])
    }
}

impl RequestContextState {
    pub fn new(trusted_proxies: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            trusted_proxies: trusted_proxies.into_iter().collect(),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.trusted_proxy_addrs())
    }

    fn is_trusted(&self, addr: &IpAddr) -> bool {
        self.trusted_proxies.contains(addr)
    }

    /// Attributes a request from `peer` to a client address.
    ///
    /// The forwarded chain is only read when `peer` is a trusted proxy. It
    /// is walked from the nearest hop outwards and the first address that
    /// is not itself a trusted proxy wins. Entries a client prepended are
    /// never reached while a trusted proxy appends the real one.
    pub fn resolve(&self, peer: IpAddr, headers: &HeaderMap) -> IpAddr {
        if !self.is_trusted(&peer) {
            return peer;
        }

        let mut hops = headers
            .get_all(FORWARDED_FOR_HEADER)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .collect::<Vec<_>>();
        hops.reverse();

        for hop in hops {
            match hop.parse::<IpAddr>() {
                Ok(addr) if self.is_trusted(&addr) => continue,
                Ok(addr) => return addr,
                // Garbage in the chain: nothing further out can be trusted.
                Err(_) => break,
            }
        }
        peer
    }
}

/// Inserts [`CacheBypass`] and, when the peer address is known,
/// [`ClientAddr`] into the request extensions.
pub async fn request_context_middleware(
    State(state): State<RequestContextState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let bypass = CacheBypass::from_headers(request.headers());
    request.extensions_mut().insert(bypass);

    if let Some(peer) = peer_addr(&request) {
        let client = state.resolve(peer, request.headers());
        request.extensions_mut().insert(ClientAddr(client));
    }

    next.run(request).await
}
