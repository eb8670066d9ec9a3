//! HTTP route modules, one per resource (§6).

pub mod audit;
pub mod chat;
pub mod documents;
pub mod models;
pub mod sessions;

use axum::Router;

use crate::state::AppState;

/// Nests every resource's router under its §6 path and returns the
/// complete `/api` sub-tree. The caller (normally [`crate::build_router`])
/// still owns OpenAPI/Swagger mounting and middleware layering.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/sessions", sessions::create_router())
        .nest("/sessions/:id/documents", documents::create_router())
        .nest("/sessions/:id/chat", chat::create_router())
        .nest("/sessions/:id/audit", audit::create_router())
        .nest("/models", models::create_router())
}
