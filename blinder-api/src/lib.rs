//! Blinder API - HTTP surface (§6) over the privacy-preserving pipeline.
//!
//! Wires the session/document/chat/audit/model routes onto a single Axum
//! [`Router`], backed by [`state::AppState`]. The bootstrap binary lives in
//! `main.rs`; this crate only builds the router and its supporting types so
//! it can also be mounted directly in tests (see `test_support`).

pub mod config;
pub mod error;
pub mod extractor;
pub mod macros;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod routes;
pub mod state;
#[cfg(test)]
pub mod test_support;
pub mod types;

use axum::http::Method;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{ApiConfig, AppConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use state::{AppState, AuthLayer, NoopAuth};

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE]);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        let parsed: Vec<_> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        layer.allow_origin(parsed)
    }
}

/// Builds the complete Axum router: every resource nested under `/api`,
/// OpenAPI/Swagger UI when enabled, and the CORS/tracing layers §6 asks
/// the HTTP boundary to carry.
pub fn build_router(state: AppState) -> Router {
    let cors_origins = state.api_config.cors_origins.clone();
    let mut router = Router::new()
        .nest("/api", routes::create_api_router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&cors_origins));

    // Swagger UI's own router already serves `/openapi.json` via `.url(...)`;
    // only register it by hand when Swagger UI itself is compiled out, to
    // avoid registering the same path twice.
    #[cfg(all(feature = "openapi", not(feature = "swagger-ui")))]
    {
        use utoipa::OpenApi;
        router = router.route(
            "/openapi.json",
            axum::routing::get(|| async { axum::Json(openapi::ApiDoc::openapi()) }),
        );
    }

    #[cfg(feature = "swagger-ui")]
    {
        use utoipa::OpenApi;
        use utoipa_swagger_ui::SwaggerUi;
        router = router.merge(
            SwaggerUi::new("/swagger-ui").url("/openapi.json", openapi::ApiDoc::openapi()),
        );
    }

    router
}
