//! API module
//!
//! HTTP surface: routes, middleware, and shared state.

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::notify::NotificationSender;

pub mod middleware;
pub mod routes;

pub use routes::create_router;

/// Shared application state for the router.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub notifier: Arc<dyn NotificationSender>,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Arc<dyn NotificationSender> {
    fn from_ref(state: &AppState) -> Self {
        state.notifier.clone()
    }
}
