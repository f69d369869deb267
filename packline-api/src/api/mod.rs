//! HTTP API handlers for packline-api

pub mod health;
pub mod summary;

pub use health::health_routes;
pub use summary::get_summary;
