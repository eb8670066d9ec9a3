//! OpenAPI document for the Blinder HTTP surface. Only compiled with the
//! `openapi` feature.

use utoipa::OpenApi;

use crate::error::ApiError;
use crate::routes::{audit, chat, documents, models, sessions};
use crate::types::*;

use blinder_core::{Citation, Domain, EventType, Role, ThreatDetail};

/// Aggregates every route's `#[utoipa::path(...)]` annotation and DTO
/// schema into one OpenAPI document, served at `/openapi.json` and
/// rendered by Swagger UI when the `swagger-ui` feature is on.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Blinder API",
        version = "0.1.0",
        description = "Privacy-preserving proxy between confidential documents/prompts and untrusted LLM backends",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers((url = "http://localhost:3000", description = "Local Development")),
    tags(
        (name = "Sessions", description = "Conversation session lifecycle"),
        (name = "Documents", description = "Document ingest, blinding, and chunking"),
        (name = "Chat", description = "SSE-streamed chat and history"),
        (name = "Audit", description = "Audit log summaries and verifiable export"),
        (name = "Models", description = "LLM provider inventory and runtime settings"),
    ),
    paths(
        sessions::create_session,
        sessions::list_sessions,
        sessions::get_session,
        sessions::update_session,
        sessions::delete_session,

        documents::upload_document,
        documents::list_documents,

        chat::send_message,
        chat::chat_history,

        audit::audit_summary,
        audit::audit_export,

        models::list_models,
        models::get_settings,
        models::update_settings,
    ),
    components(
        schemas(
            ApiError,

            CreateSessionRequest, UpdateSessionRequest, SessionResponse,
            DocumentResponse, DocumentUploadResponse,
            ChatRequestBody, MessageResponse, ChatHistoryResponse,
            AuditRecordSummary, AuditSummaryResponse,
            ChunkSummary,
            ProviderInfo, ModelsResponse, ModelSettings,

            Domain, Role, EventType, Citation, ThreatDetail,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_lists_every_resource_root() {
        let openapi = ApiDoc::openapi();
        assert!(!openapi.paths.paths.is_empty());
        assert!(openapi.paths.paths.contains_key("/api/sessions"));
        assert!(openapi.paths.paths.contains_key("/api/models"));
    }
}
