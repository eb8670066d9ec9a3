//! Chat routes (§6): the SSE-streamed send-message endpoint and the
//! plain-JSON full-history endpoint. The heavy lifting lives in
//! [`blinder_orchestrator::RequestOrchestrator::handle_chat`] - this
//! module only adapts [`blinder_orchestrator::SseEvent`] onto Axum's SSE
//! response type and maps storage rows onto wire DTOs.

use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use blinder_orchestrator::ChatRequest;
use futures_util::{Stream, StreamExt};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::{ChatHistoryResponse, ChatRequestBody, MessageResponse};

/// POST /api/sessions/{id}/chat
///
/// Returns an `Ok` response immediately - the SSE body itself is where
/// errors surface, matching §4.14's rule that everything past session
/// lookup collapses into the event stream rather than an HTTP error
/// status (§7: "Errors during (2) are reported structurally").
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/sessions/{id}/chat",
    tag = "Chat",
    params(("id" = Uuid, Path, description = "Session id")),
    request_body = ChatRequestBody,
    responses((status = 200, description = "SSE event stream: start, chunk*, done|error")),
))]
pub async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(body): Json<ChatRequestBody>,
) -> impl IntoResponse {
    let request = ChatRequest {
        session_id,
        message: body.message,
        provider: body.provider,
        model: body.model,
    };
    let events = state.orchestrator.clone().handle_chat(request);
    let sse_stream: std::pin::Pin<Box<dyn Stream<Item = Result<Event, std::convert::Infallible>> + Send>> =
        Box::pin(events.map(|event| {
            let data = serde_json::to_string(&event).unwrap_or_else(|_| {
                r#"{"type":"error","error":"failed to serialise event"}"#.to_string()
            });
            Ok(Event::default().data(data))
        }));
    Sse::new(sse_stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// GET /api/sessions/{id}/chat/history
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/sessions/{id}/chat/history",
    tag = "Chat",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Full conversation history", body = ChatHistoryResponse),
        (status = 404, description = "Session not found", body = ApiError),
    ),
))]
pub async fn chat_history(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state
        .storage
        .session_get(session_id)
        .await?
        .ok_or_else(|| ApiError::session_not_found(session_id))?;
    let messages = state.storage.message_list(session_id).await?;
    Ok(Json(ChatHistoryResponse {
        messages: messages.into_iter().map(MessageResponse::from).collect(),
    }))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", post(send_message))
        .route("/history", get(chat_history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;
    use axum::body::Body;
    use axum::http::Request;
    use blinder_core::Session;
    use tower::ServiceExt;

    async fn seed_session(state: &AppState) -> Uuid {
        let session = Session {
            session_id: Uuid::now_v7(),
            title: None,
            domain: None,
            salt: blinder_crypto::generate_salt(),
            created_at: chrono::Utc::now(),
        };
        state.storage.session_insert(&session).await.unwrap();
        session.session_id
    }

    #[tokio::test]
    async fn chat_history_on_unknown_session_is_404() {
        let state = test_state();
        let app = Router::new().nest("/api/sessions/:id/chat", create_router()).with_state(state);
        let response = app
            .oneshot(
                Request::get(format!("/api/sessions/{}/chat/history", Uuid::now_v7()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_history_starts_empty_for_a_fresh_session() {
        let state = test_state();
        let session_id = seed_session(&state).await;
        let app = Router::new().nest("/api/sessions/:id/chat", create_router()).with_state(state);
        let response = app
            .oneshot(
                Request::get(format!("/api/sessions/{session_id}/chat/history"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let history: ChatHistoryResponse = serde_json::from_slice(&body).unwrap();
        assert!(history.messages.is_empty());
    }

    #[tokio::test]
    async fn sending_a_message_streams_an_sse_body() {
        let state = test_state();
        let session_id = seed_session(&state).await;
        let app = Router::new().nest("/api/sessions/:id/chat", create_router()).with_state(state);
        let response = app
            .oneshot(
                Request::post(format!("/api/sessions/{session_id}/chat"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"message": "What is the weather like on Mars?"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").map(|v| v.to_str().unwrap()),
            Some("text/event-stream")
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("\"type\":\"start\"") || text.contains("\"type\":\"error\""));
    }
}
