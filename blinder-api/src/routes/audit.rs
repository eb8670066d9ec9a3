//! Audit routes (§6): a lightweight summary view and the full
//! downloadable export report. The export itself is built by
//! [`blinder_orchestrator::audit::export_report`]; this module only
//! handles the session lookup and the summary projection.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use blinder_core::EventType;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::{AuditRecordSummary, AuditSummaryResponse};

/// GET /api/sessions/{id}/audit
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/sessions/{id}/audit",
    tag = "Audit",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Audit record summary", body = AuditSummaryResponse),
        (status = 404, description = "Session not found", body = ApiError),
    ),
))]
pub async fn audit_summary(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state
        .storage
        .session_get(session_id)
        .await?
        .ok_or_else(|| ApiError::session_not_found(session_id))?;

    let records = state.storage.audit_list(session_id).await?;
    let total_requests = records.iter().filter(|r| r.event_type == EventType::LlmRequest).count();
    let total_responses = records.iter().filter(|r| r.event_type == EventType::LlmResponse).count();
    let total_tokens_estimated = records.iter().map(|r| r.token_estimate).sum();

    Ok(Json(AuditSummaryResponse {
        total_requests,
        total_responses,
        total_tokens_estimated,
        records: records.into_iter().map(AuditRecordSummary::from).collect(),
    }))
}

/// GET /api/sessions/{id}/audit/export
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/sessions/{id}/audit/export",
    tag = "Audit",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Downloadable JSON audit export"),
        (status = 404, description = "Session not found", body = ApiError),
    ),
))]
pub async fn audit_export(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state
        .storage
        .session_get(session_id)
        .await?
        .ok_or_else(|| ApiError::session_not_found(session_id))?;
    let report = blinder_orchestrator::audit::export_report(state.storage.as_ref(), session_id).await?;
    Ok(Json(report))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(audit_summary))
        .route("/export", get(audit_export))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
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
    async fn audit_summary_on_unknown_session_is_404() {
        let state = test_state();
        let app = Router::new().nest("/api/sessions/:id/audit", create_router()).with_state(state);
        let response = app
            .oneshot(Request::get(format!("/api/sessions/{}/audit", Uuid::now_v7())).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn audit_summary_starts_empty_for_a_fresh_session() {
        let state = test_state();
        let session_id = seed_session(&state).await;
        let app = Router::new().nest("/api/sessions/:id/audit", create_router()).with_state(state);
        let response = app
            .oneshot(Request::get(format!("/api/sessions/{session_id}/audit")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let summary: AuditSummaryResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(summary.total_requests, 0);
        assert!(summary.records.is_empty());
    }

    #[tokio::test]
    async fn audit_export_includes_integrity_note() {
        let state = test_state();
        let session_id = seed_session(&state).await;
        let app = Router::new().nest("/api/sessions/:id/audit", create_router()).with_state(state);
        let response = app
            .oneshot(
                Request::get(format!("/api/sessions/{session_id}/audit/export"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let report: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(report["report_type"], "blinder_audit_export");
        assert!(report["integrity_note"].as_str().unwrap().len() > 0);
    }
}
