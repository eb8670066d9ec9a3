//! Session routes (§6): create, list, fetch, update, delete.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use blinder_core::Session;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::{CreateSessionRequest, SessionResponse, UpdateSessionRequest};

/// POST /api/sessions
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/sessions",
    tag = "Sessions",
    request_body = CreateSessionRequest,
    responses((status = 201, description = "Session created", body = SessionResponse)),
))]
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = Session {
        session_id: Uuid::now_v7(),
        title: req.title,
        domain: req.domain,
        salt: blinder_crypto::generate_salt(),
        created_at: chrono::Utc::now(),
    };
    state.storage.session_insert(&session).await?;
    Ok((StatusCode::CREATED, Json(SessionResponse::from(session))))
}

/// GET /api/sessions
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/sessions",
    tag = "Sessions",
    responses((status = 200, description = "All sessions", body = [SessionResponse])),
))]
pub async fn list_sessions(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let sessions = state.storage.session_list().await?;
    let response: Vec<SessionResponse> = sessions.into_iter().map(SessionResponse::from).collect();
    Ok(Json(response))
}

/// GET /api/sessions/{id}
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/sessions/{id}",
    tag = "Sessions",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session found", body = SessionResponse),
        (status = 404, description = "Session not found", body = ApiError),
    ),
))]
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let session = state
        .storage
        .session_get(id)
        .await?
        .ok_or_else(|| ApiError::session_not_found(id))?;
    Ok(Json(SessionResponse::from(session)))
}

/// PATCH /api/sessions/{id}
#[cfg_attr(feature = "openapi", utoipa::path(
    patch,
    path = "/api/sessions/{id}",
    tag = "Sessions",
    params(("id" = Uuid, Path, description = "Session id")),
    request_body = UpdateSessionRequest,
    responses(
        (status = 200, description = "Session updated", body = SessionResponse),
        (status = 404, description = "Session not found", body = ApiError),
    ),
))]
pub async fn update_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateSessionRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut session = state
        .storage
        .session_get(id)
        .await?
        .ok_or_else(|| ApiError::session_not_found(id))?;

    if let Some(title) = req.title {
        state.storage.session_update_title(id, &title).await?;
        session.title = Some(title);
    }
    if let Some(domain) = req.domain {
        state.storage.session_update_domain(id, domain).await?;
        session.domain = Some(domain);
    }
    Ok(Json(SessionResponse::from(session)))
}

/// DELETE /api/sessions/{id}
#[cfg_attr(feature = "openapi", utoipa::path(
    delete,
    path = "/api/sessions/{id}",
    tag = "Sessions",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "Session not found", body = ApiError),
    ),
))]
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state
        .storage
        .session_get(id)
        .await?
        .ok_or_else(|| ApiError::session_not_found(id))?;
    state.storage.session_delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_session).get(list_sessions))
        .route(
            "/:id",
            get(get_session).patch(update_session).delete(delete_session),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn create_then_get_session_round_trips() {
        let state = test_state();
        let app = Router::new().nest("/api/sessions", create_router()).with_state(state);

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/sessions")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"title": "Intake call"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let created: SessionResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(created.title.as_deref(), Some("Intake call"));

        let response = app
            .oneshot(Request::get(format!("/api/sessions/{}", created.session_id)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn get_unknown_session_returns_404() {
        let state = test_state();
        let app = Router::new().nest("/api/sessions", create_router()).with_state(state);
        let response = app
            .oneshot(Request::get(format!("/api/sessions/{}", Uuid::now_v7())).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
