//! Request middleware.

mod admin_auth;
mod cache;
mod invalidate;
mod logging;
mod rate_limit;
mod request_context;

pub use admin_auth::*;
pub use cache::*;
pub use invalidate::*;
pub use logging::*;
pub use rate_limit::*;
pub use request_context::*;
