//! Model/provider inventory and runtime settings routes (§6:
//! `GET/POST /api/models[/settings]`). Exposes which of the three
//! providers (§4.13) this deployment has credentials for, and lets an
//! operator change the process-wide default provider/model without a
//! restart.

use axum::{
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::{ModelSettings, ModelsResponse, ProviderInfo};

fn provider_info(state: &AppState, provider: &str) -> ProviderInfo {
    let (model, configured) = match provider {
        "ollama" => (state.llm_config.ollama_model.clone(), true),
        "openai" => (state.llm_config.openai_model.clone(), !state.llm_config.openai_api_key.is_empty()),
        "anthropic" => {
            (state.llm_config.anthropic_model.clone(), !state.llm_config.anthropic_api_key.is_empty())
        }
        _ => (String::new(), false),
    };
    let context_window = blinder_llm::known_context_window(&model);
    ProviderInfo {
        provider: provider.to_string(),
        model,
        configured,
        context_window,
    }
}

/// GET /api/models
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/models",
    tag = "Models",
    responses((status = 200, description = "Provider inventory and current defaults", body = ModelsResponse)),
))]
pub async fn list_models(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let default_provider = state
        .model_settings
        .read()
        .map_err(|_| ApiError::internal_error("model settings lock poisoned"))?
        .default_provider
        .clone();
    let providers = ["ollama", "openai", "anthropic"]
        .iter()
        .map(|p| provider_info(&state, p))
        .collect();
    Ok(Json(ModelsResponse { default_provider, providers }))
}

/// GET /api/models/settings
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/models/settings",
    tag = "Models",
    responses((status = 200, description = "Current runtime default provider/model", body = ModelSettings)),
))]
pub async fn get_settings(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let settings = state
        .model_settings
        .read()
        .map_err(|_| ApiError::internal_error("model settings lock poisoned"))?
        .clone();
    Ok(Json(settings))
}

/// POST /api/models/settings
///
/// §6 lists `403` as a notable code for this route: changing the
/// process-wide default is an administrative action, gated by
/// [`crate::state::AuthLayer`] rather than the no-op default layer in
/// most deployments.
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/models/settings",
    tag = "Models",
    request_body = ModelSettings,
    responses(
        (status = 200, description = "Settings updated", body = ModelSettings),
        (status = 403, description = "Not authorized to change runtime settings", body = ApiError),
    ),
))]
pub async fn update_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ModelSettings>,
) -> ApiResult<impl IntoResponse> {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if !state.auth.is_authorized(bearer) {
        return Err(ApiError::forbidden("not authorized to change runtime model settings"));
    }
    let mut settings = state
        .model_settings
        .write()
        .map_err(|_| ApiError::internal_error("model settings lock poisoned"))?;
    *settings = req.clone();
    Ok(Json(req))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_models))
        .route("/settings", get(get_settings).post(update_settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn list_models_reports_all_three_providers() {
        let state = test_state();
        let app = Router::new().nest("/api/models", create_router()).with_state(state);
        let response = app
            .oneshot(Request::get("/api/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let models: ModelsResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(models.providers.len(), 3);
        assert!(models.providers.iter().any(|p| p.provider == "ollama" && p.configured));
    }

    #[tokio::test]
    async fn updating_settings_changes_the_default_provider() {
        let state = test_state();
        let app = Router::new().nest("/api/models", create_router()).with_state(state);
        let response = app
            .clone()
            .oneshot(
                Request::post("/api/models/settings")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"default_provider": "anthropic", "default_model": "claude-sonnet-4-5-20250929"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/api/models/settings").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let settings: ModelSettings = serde_json::from_slice(&body).unwrap();
        assert_eq!(settings.default_provider, "anthropic");
    }
}
