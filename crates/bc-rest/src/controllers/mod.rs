//! HTTP controllers.

pub mod cache_controller;
pub mod health_controller;
