//! Request/response DTOs for the HTTP surface (§6). Kept separate from
//! `blinder-core::entities` so the wire shape (what is safe to expose to
//! a caller) can diverge from the persisted shape (e.g. a [`Session`]'s
//! salt is internal and never serialised here).

use blinder_core::{AuditLog, Chunk, Citation, Document, Domain, Message, Role, Session, ThreatDetail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateSessionRequest {
    pub title: Option<String>,
    pub domain: Option<Domain>,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpdateSessionRequest {
    pub title: Option<String>,
    pub domain: Option<Domain>,
}

/// The externally-visible projection of a [`Session`] - never carries the
/// raw encryption salt.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SessionResponse {
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub session_id: Uuid,
    pub title: Option<String>,
    pub domain: Option<Domain>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = DateTime))]
    pub created_at: DateTime<Utc>,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.session_id,
            title: session.title,
            domain: session.domain,
            created_at: session.created_at,
        }
    }
}

/// The externally-visible projection of a [`Document`] - `raw_text` is
/// never serialised (it is cleared server-side once processing
/// completes anyway, §3 Document invariant).
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DocumentResponse {
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub document_id: Uuid,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub session_id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub blinded_text: Option<String>,
    pub pii_count: i32,
    pub processed: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = DateTime))]
    pub created_at: DateTime<Utc>,
}

impl From<Document> for DocumentResponse {
    fn from(document: Document) -> Self {
        Self {
            document_id: document.document_id,
            session_id: document.session_id,
            filename: document.filename,
            content_type: document.content_type,
            blinded_text: document.blinded_text,
            pii_count: document.pii_count,
            processed: document.processed,
            created_at: document.created_at,
        }
    }
}

/// Returned alongside the created document: PII counts broken down by
/// entity type and every threat the sanitiser surfaced (but did not
/// reject on - high-severity threats abort the upload entirely, §4.8).
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DocumentUploadResponse {
    #[serde(flatten)]
    pub document: DocumentResponse,
    pub pii_summary: std::collections::BTreeMap<String, usize>,
    pub threats: Vec<ThreatDetail>,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChatRequestBody {
    pub message: String,
    pub provider: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MessageResponse {
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub message_id: Uuid,
    pub role: Role,
    pub clear_content: String,
    pub citations: Vec<Citation>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = DateTime))]
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            message_id: message.message_id,
            role: message.role,
            clear_content: message.clear_content,
            citations: message.citations,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChatHistoryResponse {
    pub messages: Vec<MessageResponse>,
}

/// Summary view over `/api/sessions/{id}/audit` - record headers without
/// `payload_blinded`. The full payload is only available via
/// `/audit/export` (§6).
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AuditRecordSummary {
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub audit_id: Uuid,
    pub event_type: blinder_core::EventType,
    pub provider: String,
    pub model: String,
    pub token_estimate: i64,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = DateTime))]
    pub created_at: DateTime<Utc>,
}

impl From<AuditLog> for AuditRecordSummary {
    fn from(record: AuditLog) -> Self {
        Self {
            audit_id: record.audit_id,
            event_type: record.event_type,
            provider: record.provider,
            model: record.model,
            token_estimate: record.token_estimate,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AuditSummaryResponse {
    pub total_requests: usize,
    pub total_responses: usize,
    pub total_tokens_estimated: i64,
    pub records: Vec<AuditRecordSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChunkSummary {
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub chunk_id: Uuid,
    pub index: i32,
    pub token_count: i32,
}

impl From<Chunk> for ChunkSummary {
    fn from(chunk: Chunk) -> Self {
        Self {
            chunk_id: chunk.chunk_id,
            index: chunk.index,
            token_count: chunk.token_count,
        }
    }
}

/// One entry in the `/api/models` provider inventory.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProviderInfo {
    pub provider: String,
    pub model: String,
    pub configured: bool,
    pub context_window: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ModelsResponse {
    pub default_provider: String,
    pub providers: Vec<ProviderInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ModelSettings {
    pub default_provider: String,
    pub default_model: Option<String>,
}
