//! packline-api library - read-only summary statistics service
//!
//! Serves aggregated production figures for one line over a small HTTP
//! API. The display panel polls `/summary/:line`; `/health` doubles as
//! the discovery probe the panel sweeps the subnet with.

use axum::Router;
use sqlx::MySqlPool;

pub mod api;
pub mod db;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Production database pool (read-only use)
    pub db: MySqlPool,
    /// Count TEMPLATE-tagged rows toward balance/hourly arithmetic
    pub include_template_in_balance: bool,
}

impl AppState {
    pub fn new(db: MySqlPool, include_template_in_balance: bool) -> Self {
        Self {
            db,
            include_template_in_balance,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .route("/summary/:line", get(api::get_summary))
        .merge(api::health_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
