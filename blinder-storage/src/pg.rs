//! PostgreSQL-backed storage: a `DbConfig`/`DbClient` pool-management shape
//! over `deadpool-postgres`, speaking SQL directly against a plain schema.

use crate::{DocumentProcessed, StorageTrait, VaultStats};
use async_trait::async_trait;
use blinder_core::{
    AuditLog, BlinderError, BlinderResult, Chunk, ConfigError, Document, Domain, EntityType,
    EventType, Message, Role, Session, StorageError, ThreatDetail, VaultEntryRow,
};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use postgres_types::Json;
use std::time::Duration;
use tokio_postgres::NoTls;
use uuid::Uuid;

/// The logical schema described in §6: one table per entity, a unique
/// constraint on `(session_id, pseudonym)`, and the indexes a production
/// deployment needs for chunk retrieval. The approximate-nearest-neighbour
/// vector index is left to the operator's choice of extension (e.g.
/// `pgvector`'s `ivfflat`) since that choice is deployment-specific; the
/// full-text index uses Postgres's built-in `tsvector`.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    session_id UUID PRIMARY KEY,
    title TEXT,
    domain TEXT,
    salt BYTEA NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS vault_entries (
    session_id UUID NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
    entity_type TEXT NOT NULL,
    pseudonym TEXT NOT NULL,
    ciphertext BYTEA NOT NULL,
    nonce BYTEA NOT NULL,
    aliases TEXT[] NOT NULL DEFAULT '{}',
    UNIQUE (session_id, pseudonym)
);

CREATE TABLE IF NOT EXISTS documents (
    document_id UUID PRIMARY KEY,
    session_id UUID NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
    filename TEXT NOT NULL,
    content_type TEXT NOT NULL,
    raw_text TEXT,
    blinded_text TEXT,
    pii_count INTEGER NOT NULL DEFAULT 0,
    processed BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS chunks (
    chunk_id UUID PRIMARY KEY,
    session_id UUID NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
    document_id UUID NOT NULL REFERENCES documents(document_id) ON DELETE CASCADE,
    index INTEGER NOT NULL,
    content TEXT NOT NULL,
    content_tsv TSVECTOR GENERATED ALWAYS AS (to_tsvector('english', content)) STORED,
    embedding REAL[],
    token_count INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS chunks_content_tsv_idx ON chunks USING GIN (content_tsv);
CREATE INDEX IF NOT EXISTS chunks_session_idx ON chunks (session_id);

CREATE TABLE IF NOT EXISTS messages (
    message_id UUID PRIMARY KEY,
    session_id UUID NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    clear_content TEXT NOT NULL,
    blinded_content TEXT NOT NULL,
    threats JSONB NOT NULL DEFAULT '[]',
    citations JSONB NOT NULL DEFAULT '[]',
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_log (
    audit_id UUID PRIMARY KEY,
    session_id UUID NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
    event_type TEXT NOT NULL,
    provider TEXT NOT NULL,
    model TEXT NOT NULL,
    payload_blinded TEXT NOT NULL,
    payload_hash TEXT NOT NULL,
    token_estimate BIGINT NOT NULL,
    metadata JSONB NOT NULL DEFAULT '{}',
    created_at TIMESTAMPTZ NOT NULL
);
"#;

/// Connection pool configuration (§6 `DATABASE_URL`).
#[derive(Debug, Clone)]
pub struct PgConfig {
    pub database_url: String,
    pub max_size: usize,
    pub timeout: Duration,
}

impl PgConfig {
    /// `DATABASE_URL` is required (§6); returns [`ConfigError::MissingRequired`]
    /// if unset, matching the fail-fast posture the other boot-time
    /// settings use.
    pub fn from_env() -> BlinderResult<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| BlinderError::Config(ConfigError::MissingRequired("DATABASE_URL".to_string())))?;
        let max_size = std::env::var("BLINDER_DB_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(16);
        let timeout = Duration::from_secs(
            std::env::var("BLINDER_DB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        );
        Ok(Self { database_url, max_size, timeout })
    }

    pub fn create_pool(&self) -> BlinderResult<Pool> {
        let mut cfg = Config::new();
        cfg.url = Some(self.database_url.clone());
        cfg.manager = Some(ManagerConfig { recycling_method: RecyclingMethod::Fast });
        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size: self.max_size,
            timeouts: deadpool_postgres::Timeouts {
                wait: Some(self.timeout),
                create: Some(self.timeout),
                recycle: Some(self.timeout),
            },
            ..Default::default()
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()).into())
    }
}

/// A `deadpool-postgres`-backed [`StorageTrait`] implementation.
#[derive(Clone)]
pub struct PgStorage {
    pool: Pool,
}

impl PgStorage {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &PgConfig) -> BlinderResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Applies [`SCHEMA`]. Idempotent: every statement uses `IF NOT EXISTS`.
    pub async fn migrate(&self) -> BlinderResult<()> {
        let conn = self.conn().await?;
        conn.batch_execute(SCHEMA)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
        Ok(())
    }

    async fn conn(&self) -> BlinderResult<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()).into())
    }
}

fn pg_err(e: tokio_postgres::Error) -> BlinderError {
    StorageError::ConnectionFailed(e.to_string()).into()
}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

fn role_from_str(s: &str) -> Role {
    match s {
        "assistant" => Role::Assistant,
        "system" => Role::System,
        _ => Role::User,
    }
}

fn event_type_to_str(event_type: EventType) -> &'static str {
    match event_type {
        EventType::LlmRequest => "llm_request",
        EventType::LlmResponse => "llm_response",
    }
}

fn event_type_from_str(s: &str) -> EventType {
    match s {
        "llm_response" => EventType::LlmResponse,
        _ => EventType::LlmRequest,
    }
}

fn row_to_session(row: &tokio_postgres::Row) -> Session {
    let salt_bytes: Vec<u8> = row.get("salt");
    let mut salt = [0u8; 32];
    salt.copy_from_slice(&salt_bytes[..32.min(salt_bytes.len())]);
    Session {
        session_id: row.get("session_id"),
        title: row.get("title"),
        domain: row.get::<_, Option<String>>("domain").and_then(|d| Domain::from_db_str(&d).ok()),
        salt,
        created_at: row.get("created_at"),
    }
}

fn row_to_document(row: &tokio_postgres::Row) -> Document {
    Document {
        document_id: row.get("document_id"),
        session_id: row.get("session_id"),
        filename: row.get("filename"),
        content_type: row.get("content_type"),
        raw_text: row.get("raw_text"),
        blinded_text: row.get("blinded_text"),
        pii_count: row.get("pii_count"),
        processed: row.get("processed"),
        created_at: row.get("created_at"),
    }
}

fn row_to_chunk(row: &tokio_postgres::Row) -> Chunk {
    Chunk {
        chunk_id: row.get("chunk_id"),
        session_id: row.get("session_id"),
        document_id: row.get("document_id"),
        index: row.get("index"),
        content: row.get("content"),
        embedding: row.get::<_, Option<Vec<f32>>>("embedding"),
        token_count: row.get("token_count"),
    }
}

fn row_to_message(row: &tokio_postgres::Row) -> Message {
    let threats: Json<Vec<ThreatDetail>> = row.get("threats");
    let citations: Json<Vec<blinder_core::Citation>> = row.get("citations");
    Message {
        message_id: row.get("message_id"),
        session_id: row.get("session_id"),
        role: role_from_str(row.get("role")),
        clear_content: row.get("clear_content"),
        blinded_content: row.get("blinded_content"),
        threats: threats.0,
        citations: citations.0,
        created_at: row.get("created_at"),
    }
}

fn row_to_audit(row: &tokio_postgres::Row) -> AuditLog {
    let metadata: serde_json::Value = row.get("metadata");
    AuditLog {
        audit_id: row.get("audit_id"),
        session_id: row.get("session_id"),
        event_type: event_type_from_str(row.get("event_type")),
        provider: row.get("provider"),
        model: row.get("model"),
        payload_blinded: row.get("payload_blinded"),
        payload_hash: row.get("payload_hash"),
        token_estimate: row.get("token_estimate"),
        metadata,
        created_at: row.get("created_at"),
    }
}

fn row_to_vault_entry(row: &tokio_postgres::Row) -> VaultEntryRow {
    VaultEntryRow {
        session_id: row.get("session_id"),
        entity_type: EntityType::new(row.get::<_, String>("entity_type")),
        pseudonym: row.get("pseudonym"),
        ciphertext: row.get("ciphertext"),
        nonce: row.get("nonce"),
        aliases: row.get("aliases"),
    }
}

#[async_trait]
impl StorageTrait for PgStorage {
    async fn session_insert(&self, session: &Session) -> BlinderResult<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO sessions (session_id, title, domain, salt, created_at) VALUES ($1, $2, $3, $4, $5)",
            &[
                &session.session_id,
                &session.title,
                &session.domain.map(|d| d.as_db_str()),
                &session.salt.as_slice(),
                &session.created_at,
            ],
        )
        .await
        .map_err(pg_err)?;
        Ok(())
    }

    async fn session_get(&self, id: Uuid) -> BlinderResult<Option<Session>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt("SELECT * FROM sessions WHERE session_id = $1", &[&id])
            .await
            .map_err(pg_err)?;
        Ok(row.as_ref().map(row_to_session))
    }

    async fn session_list(&self) -> BlinderResult<Vec<Session>> {
        let conn = self.conn().await?;
        let rows = conn
            .query("SELECT * FROM sessions ORDER BY created_at DESC", &[])
            .await
            .map_err(pg_err)?;
        Ok(rows.iter().map(row_to_session).collect())
    }

    async fn session_update_title(&self, id: Uuid, title: &str) -> BlinderResult<()> {
        let conn = self.conn().await?;
        let affected = conn
            .execute("UPDATE sessions SET title = $2 WHERE session_id = $1", &[&id, &title])
            .await
            .map_err(pg_err)?;
        if affected == 0 {
            return Err(StorageError::NotFound { entity_type: "session".to_string(), id: id.to_string() }.into());
        }
        Ok(())
    }

    async fn session_update_domain(&self, id: Uuid, domain: Domain) -> BlinderResult<()> {
        let conn = self.conn().await?;
        let affected = conn
            .execute(
                "UPDATE sessions SET domain = $2 WHERE session_id = $1",
                &[&id, &domain.as_db_str()],
            )
            .await
            .map_err(pg_err)?;
        if affected == 0 {
            return Err(StorageError::NotFound { entity_type: "session".to_string(), id: id.to_string() }.into());
        }
        Ok(())
    }

    async fn session_delete(&self, id: Uuid) -> BlinderResult<()> {
        let conn = self.conn().await?;
        let affected = conn
            .execute("DELETE FROM sessions WHERE session_id = $1", &[&id])
            .await
            .map_err(pg_err)?;
        if affected == 0 {
            return Err(StorageError::NotFound { entity_type: "session".to_string(), id: id.to_string() }.into());
        }
        Ok(())
    }

    async fn vault_entry_insert(&self, row: &VaultEntryRow) -> BlinderResult<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO vault_entries (session_id, entity_type, pseudonym, ciphertext, nonce, aliases)
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &row.session_id,
                &row.entity_type.as_str(),
                &row.pseudonym,
                &row.ciphertext,
                &row.nonce,
                &row.aliases,
            ],
        )
        .await
        .map_err(|e| StorageError::InsertFailed { entity_type: "vault_entry".to_string(), reason: e.to_string() })?;
        Ok(())
    }

    async fn vault_entry_append_alias(&self, session_id: Uuid, pseudonym: &str, alias: &str) -> BlinderResult<()> {
        let conn = self.conn().await?;
        let affected = conn
            .execute(
                "UPDATE vault_entries SET aliases = array_append(aliases, $3)
                 WHERE session_id = $1 AND pseudonym = $2 AND NOT ($3 = ANY(aliases))",
                &[&session_id, &pseudonym, &alias],
            )
            .await
            .map_err(pg_err)?;
        if affected == 0 {
            // Either already present (no-op, fine) or the pseudonym is unknown; disambiguate.
            let exists = conn
                .query_opt(
                    "SELECT 1 FROM vault_entries WHERE session_id = $1 AND pseudonym = $2",
                    &[&session_id, &pseudonym],
                )
                .await
                .map_err(pg_err)?
                .is_some();
            if !exists {
                return Err(StorageError::NotFound { entity_type: "vault_entry".to_string(), id: session_id.to_string() }.into());
            }
        }
        Ok(())
    }

    async fn vault_entries_list(&self, session_id: Uuid) -> BlinderResult<Vec<VaultEntryRow>> {
        let conn = self.conn().await?;
        let rows = conn
            .query("SELECT * FROM vault_entries WHERE session_id = $1", &[&session_id])
            .await
            .map_err(pg_err)?;
        Ok(rows.iter().map(row_to_vault_entry).collect())
    }

    async fn vault_stats(&self, session_id: Uuid) -> BlinderResult<VaultStats> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT entity_type, COUNT(*) AS c FROM vault_entries WHERE session_id = $1 GROUP BY entity_type ORDER BY entity_type",
                &[&session_id],
            )
            .await
            .map_err(pg_err)?;
        let entities_by_type: Vec<(String, i64)> = rows.iter().map(|r| (r.get("entity_type"), r.get("c"))).collect();
        let total_entities = entities_by_type.iter().map(|(_, c)| c).sum();
        Ok(VaultStats { total_entities, entities_by_type })
    }

    async fn document_insert(&self, document: &Document) -> BlinderResult<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO documents (document_id, session_id, filename, content_type, raw_text, blinded_text, pii_count, processed, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            &[
                &document.document_id,
                &document.session_id,
                &document.filename,
                &document.content_type,
                &document.raw_text,
                &document.blinded_text,
                &document.pii_count,
                &document.processed,
                &document.created_at,
            ],
        )
        .await
        .map_err(|e| StorageError::InsertFailed { entity_type: "document".to_string(), reason: e.to_string() })?;
        Ok(())
    }

    async fn document_get(&self, id: Uuid) -> BlinderResult<Option<Document>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt("SELECT * FROM documents WHERE document_id = $1", &[&id])
            .await
            .map_err(pg_err)?;
        Ok(row.as_ref().map(row_to_document))
    }

    async fn document_list(&self, session_id: Uuid) -> BlinderResult<Vec<Document>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT * FROM documents WHERE session_id = $1 ORDER BY created_at",
                &[&session_id],
            )
            .await
            .map_err(pg_err)?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn document_mark_processed(&self, id: Uuid, update: DocumentProcessed) -> BlinderResult<()> {
        let conn = self.conn().await?;
        let affected = conn
            .execute(
                "UPDATE documents SET raw_text = NULL, blinded_text = $2, pii_count = $3, processed = TRUE WHERE document_id = $1",
                &[&id, &update.blinded_text, &update.pii_count],
            )
            .await
            .map_err(pg_err)?;
        if affected == 0 {
            return Err(StorageError::NotFound { entity_type: "document".to_string(), id: id.to_string() }.into());
        }
        Ok(())
    }

    async fn chunk_insert_batch(&self, chunks: &[Chunk]) -> BlinderResult<()> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(pg_err)?;
        {
            let stmt = tx
                .prepare(
                    "INSERT INTO chunks (chunk_id, session_id, document_id, index, content, embedding, token_count)
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                )
                .await
                .map_err(pg_err)?;
            for chunk in chunks {
                tx.execute(
                    &stmt,
                    &[
                        &chunk.chunk_id,
                        &chunk.session_id,
                        &chunk.document_id,
                        &chunk.index,
                        &chunk.content,
                        &chunk.embedding,
                        &chunk.token_count,
                    ],
                )
                .await
                .map_err(pg_err)?;
            }
        }
        tx.commit().await.map_err(pg_err)?;
        Ok(())
    }

    async fn chunk_list_by_document(&self, document_id: Uuid) -> BlinderResult<Vec<Chunk>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT * FROM chunks WHERE document_id = $1 ORDER BY index",
                &[&document_id],
            )
            .await
            .map_err(pg_err)?;
        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn chunk_list_by_session(&self, session_id: Uuid) -> BlinderResult<Vec<Chunk>> {
        let conn = self.conn().await?;
        let rows = conn
            .query("SELECT * FROM chunks WHERE session_id = $1", &[&session_id])
            .await
            .map_err(pg_err)?;
        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn message_insert(&self, message: &Message) -> BlinderResult<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO messages (message_id, session_id, role, clear_content, blinded_content, threats, citations, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            &[
                &message.message_id,
                &message.session_id,
                &role_to_str(message.role),
                &message.clear_content,
                &message.blinded_content,
                &Json(&message.threats),
                &Json(&message.citations),
                &message.created_at,
            ],
        )
        .await
        .map_err(|e| StorageError::InsertFailed { entity_type: "message".to_string(), reason: e.to_string() })?;
        Ok(())
    }

    async fn message_list(&self, session_id: Uuid) -> BlinderResult<Vec<Message>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT * FROM messages WHERE session_id = $1 ORDER BY created_at",
                &[&session_id],
            )
            .await
            .map_err(pg_err)?;
        Ok(rows.iter().map(row_to_message).collect())
    }

    async fn audit_insert(&self, record: &AuditLog) -> BlinderResult<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO audit_log (audit_id, session_id, event_type, provider, model, payload_blinded, payload_hash, token_estimate, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            &[
                &record.audit_id,
                &record.session_id,
                &event_type_to_str(record.event_type),
                &record.provider,
                &record.model,
                &record.payload_blinded,
                &record.payload_hash,
                &record.token_estimate,
                &record.metadata,
                &record.created_at,
            ],
        )
        .await
        .map_err(|e| StorageError::InsertFailed { entity_type: "audit_log".to_string(), reason: e.to_string() })?;
        Ok(())
    }

    async fn audit_list(&self, session_id: Uuid) -> BlinderResult<Vec<AuditLog>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT * FROM audit_log WHERE session_id = $1 ORDER BY created_at",
                &[&session_id],
            )
            .await
            .map_err(pg_err)?;
        Ok(rows.iter().map(row_to_audit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_database_url_is_a_config_error() {
        std::env::remove_var("DATABASE_URL");
        let err = PgConfig::from_env().unwrap_err();
        assert!(matches!(err, BlinderError::Config(ConfigError::MissingRequired(_))));
    }

    #[test]
    fn schema_defines_every_table() {
        for table in ["sessions", "vault_entries", "documents", "chunks", "messages", "audit_log"] {
            assert!(SCHEMA.contains(table), "schema missing table {table}");
        }
    }
}
