//! Storage abstraction for the persisted state in §3/§6: sessions, vault
//! entries, documents, chunks, messages, and audit records.
//!
//! Split as an async trait (`StorageTrait`), a `deadpool-postgres` backend
//! in [`pg`], and an in-memory [`MockStorage`] for tests.

pub mod mock;
pub mod pg;

pub use mock::MockStorage;
pub use pg::{PgConfig, PgStorage};

use async_trait::async_trait;
use blinder_core::{AuditLog, BlinderResult, Chunk, Document, Message, Session, VaultEntryRow};
use uuid::Uuid;

/// Fields an existing document is mutated with once blinding completes
/// (§3 Document: `processed=true` implies `raw_text` is `None`).
#[derive(Debug, Clone)]
pub struct DocumentProcessed {
    pub blinded_text: String,
    pub pii_count: i32,
}

/// Aggregate counts for the audit export's vault statistics (§4.15).
#[derive(Debug, Clone, Default)]
pub struct VaultStats {
    pub total_entities: i64,
    pub entities_by_type: Vec<(String, i64)>,
}

/// Async storage operations for every entity in §3, implemented by
/// [`PgStorage`] for production and [`MockStorage`] for tests.
#[async_trait]
pub trait StorageTrait: Send + Sync {
    // === Session operations ===

    async fn session_insert(&self, session: &Session) -> BlinderResult<()>;
    async fn session_get(&self, id: Uuid) -> BlinderResult<Option<Session>>;
    async fn session_list(&self) -> BlinderResult<Vec<Session>>;
    async fn session_update_title(&self, id: Uuid, title: &str) -> BlinderResult<()>;
    async fn session_update_domain(&self, id: Uuid, domain: blinder_core::Domain) -> BlinderResult<()>;
    /// Deletes the session and cascades to every dependent entity (§3
    /// "Ownership").
    async fn session_delete(&self, id: Uuid) -> BlinderResult<()>;

    // === Vault entry operations ===

    /// Inserts one encrypted vault row. Enforces uniqueness on
    /// `(session_id, pseudonym)`; tolerates a duplicate `(session_id,
    /// real_value)` since the real value is ciphertext and cannot be
    /// compared here - deduplication on reload is the vault's job (§5).
    async fn vault_entry_insert(&self, row: &VaultEntryRow) -> BlinderResult<()>;
    async fn vault_entry_append_alias(&self, session_id: Uuid, pseudonym: &str, alias: &str) -> BlinderResult<()>;
    async fn vault_entries_list(&self, session_id: Uuid) -> BlinderResult<Vec<VaultEntryRow>>;
    async fn vault_stats(&self, session_id: Uuid) -> BlinderResult<VaultStats>;

    // === Document operations ===

    async fn document_insert(&self, document: &Document) -> BlinderResult<()>;
    async fn document_get(&self, id: Uuid) -> BlinderResult<Option<Document>>;
    async fn document_list(&self, session_id: Uuid) -> BlinderResult<Vec<Document>>;
    /// Applies the one-shot processing transition (§3 Document lifecycle):
    /// clears `raw_text`, sets `blinded_text`/`pii_count`, flips `processed`.
    async fn document_mark_processed(&self, id: Uuid, update: DocumentProcessed) -> BlinderResult<()>;

    // === Chunk operations ===

    async fn chunk_insert_batch(&self, chunks: &[Chunk]) -> BlinderResult<()>;
    async fn chunk_list_by_document(&self, document_id: Uuid) -> BlinderResult<Vec<Chunk>>;
    /// All chunks for every processed document in the session - the input
    /// to `blinder_retrieval::hybrid_search`'s in-memory fusion (§4.10).
    async fn chunk_list_by_session(&self, session_id: Uuid) -> BlinderResult<Vec<Chunk>>;

    // === Message operations ===

    async fn message_insert(&self, message: &Message) -> BlinderResult<()>;
    async fn message_list(&self, session_id: Uuid) -> BlinderResult<Vec<Message>>;

    // === Audit log operations ===

    /// Appends an audit record. Callers compute `payload_hash` themselves
    /// (SHA-256 of `payload_blinded`, §4.15) before calling; this method
    /// never mutates an existing record (§3 AuditLog: "append-only").
    async fn audit_insert(&self, record: &AuditLog) -> BlinderResult<()>;
    async fn audit_list(&self, session_id: Uuid) -> BlinderResult<Vec<AuditLog>>;
}
