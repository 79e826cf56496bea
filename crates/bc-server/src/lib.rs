//! # bc-server
//!
//! Wires configuration, the key-value store and the HTTP router into a
//! runnable server.

pub mod app;
pub mod startup;
