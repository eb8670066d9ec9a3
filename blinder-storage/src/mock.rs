//! In-memory storage for tests: a `RwLock<HashMap<...>>` per entity,
//! `NotFound`/`InsertFailed` errors, no actual I/O.

use crate::{DocumentProcessed, StorageTrait, VaultStats};
use async_trait::async_trait;
use blinder_core::{
    AuditLog, BlinderError, BlinderResult, Chunk, Document, Domain, Message, Session, StorageError,
    VaultEntryRow,
};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MockStorage {
    sessions: RwLock<HashMap<Uuid, Session>>,
    vault_entries: RwLock<HashMap<Uuid, Vec<VaultEntryRow>>>,
    documents: RwLock<HashMap<Uuid, Document>>,
    chunks: RwLock<HashMap<Uuid, Vec<Chunk>>>,
    messages: RwLock<HashMap<Uuid, Vec<Message>>>,
    audit_log: RwLock<HashMap<Uuid, Vec<AuditLog>>>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears every table. Useful between test cases sharing one instance.
    pub fn clear(&self) {
        self.sessions.write().unwrap().clear();
        self.vault_entries.write().unwrap().clear();
        self.documents.write().unwrap().clear();
        self.chunks.write().unwrap().clear();
        self.messages.write().unwrap().clear();
        self.audit_log.write().unwrap().clear();
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    fn not_found(entity_type: &str, id: Uuid) -> BlinderError {
        StorageError::NotFound {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        }
        .into()
    }
}

#[async_trait]
impl StorageTrait for MockStorage {
    async fn session_insert(&self, session: &Session) -> BlinderResult<()> {
        let mut sessions = self.sessions.write().unwrap();
        if sessions.contains_key(&session.session_id) {
            return Err(StorageError::InsertFailed {
                entity_type: "session".to_string(),
                reason: "already exists".to_string(),
            }
            .into());
        }
        sessions.insert(session.session_id, session.clone());
        Ok(())
    }

    async fn session_get(&self, id: Uuid) -> BlinderResult<Option<Session>> {
        Ok(self.sessions.read().unwrap().get(&id).cloned())
    }

    async fn session_list(&self) -> BlinderResult<Vec<Session>> {
        Ok(self.sessions.read().unwrap().values().cloned().collect())
    }

    async fn session_update_title(&self, id: Uuid, title: &str) -> BlinderResult<()> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.get_mut(&id).ok_or_else(|| Self::not_found("session", id))?;
        session.title = Some(title.to_string());
        Ok(())
    }

    async fn session_update_domain(&self, id: Uuid, domain: Domain) -> BlinderResult<()> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.get_mut(&id).ok_or_else(|| Self::not_found("session", id))?;
        session.domain = Some(domain);
        Ok(())
    }

    async fn session_delete(&self, id: Uuid) -> BlinderResult<()> {
        self.sessions
            .write()
            .unwrap()
            .remove(&id)
            .ok_or_else(|| Self::not_found("session", id))?;
        self.vault_entries.write().unwrap().remove(&id);
        self.chunks.write().unwrap().remove(&id);
        self.messages.write().unwrap().remove(&id);
        self.audit_log.write().unwrap().remove(&id);
        let mut documents = self.documents.write().unwrap();
        documents.retain(|_, d| d.session_id != id);
        Ok(())
    }

    async fn vault_entry_insert(&self, row: &VaultEntryRow) -> BlinderResult<()> {
        let mut entries = self.vault_entries.write().unwrap();
        let session_rows = entries.entry(row.session_id).or_default();
        if session_rows.iter().any(|r| r.pseudonym == row.pseudonym) {
            return Err(StorageError::InsertFailed {
                entity_type: "vault_entry".to_string(),
                reason: format!("pseudonym {} already exists for this session", row.pseudonym),
            }
            .into());
        }
        session_rows.push(row.clone());
        Ok(())
    }

    async fn vault_entry_append_alias(&self, session_id: Uuid, pseudonym: &str, alias: &str) -> BlinderResult<()> {
        let mut entries = self.vault_entries.write().unwrap();
        let session_rows = entries
            .get_mut(&session_id)
            .ok_or_else(|| Self::not_found("vault_entry", session_id))?;
        let row = session_rows
            .iter_mut()
            .find(|r| r.pseudonym == pseudonym)
            .ok_or_else(|| Self::not_found("vault_entry", session_id))?;
        if !row.aliases.iter().any(|a| a == alias) {
            row.aliases.push(alias.to_string());
        }
        Ok(())
    }

    async fn vault_entries_list(&self, session_id: Uuid) -> BlinderResult<Vec<VaultEntryRow>> {
        Ok(self
            .vault_entries
            .read()
            .unwrap()
            .get(&session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn vault_stats(&self, session_id: Uuid) -> BlinderResult<VaultStats> {
        let entries = self.vault_entries.read().unwrap();
        let rows = entries.get(&session_id).cloned().unwrap_or_default();
        let mut by_type: HashMap<String, i64> = HashMap::new();
        for row in &rows {
            *by_type.entry(row.entity_type.to_string()).or_insert(0) += 1;
        }
        let mut entities_by_type: Vec<(String, i64)> = by_type.into_iter().collect();
        entities_by_type.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(VaultStats {
            total_entities: rows.len() as i64,
            entities_by_type,
        })
    }

    async fn document_insert(&self, document: &Document) -> BlinderResult<()> {
        let mut documents = self.documents.write().unwrap();
        if documents.contains_key(&document.document_id) {
            return Err(StorageError::InsertFailed {
                entity_type: "document".to_string(),
                reason: "already exists".to_string(),
            }
            .into());
        }
        documents.insert(document.document_id, document.clone());
        Ok(())
    }

    async fn document_get(&self, id: Uuid) -> BlinderResult<Option<Document>> {
        Ok(self.documents.read().unwrap().get(&id).cloned())
    }

    async fn document_list(&self, session_id: Uuid) -> BlinderResult<Vec<Document>> {
        Ok(self
            .documents
            .read()
            .unwrap()
            .values()
            .filter(|d| d.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn document_mark_processed(&self, id: Uuid, update: DocumentProcessed) -> BlinderResult<()> {
        let mut documents = self.documents.write().unwrap();
        let document = documents.get_mut(&id).ok_or_else(|| Self::not_found("document", id))?;
        document.raw_text = None;
        document.blinded_text = Some(update.blinded_text);
        document.pii_count = update.pii_count;
        document.processed = true;
        Ok(())
    }

    async fn chunk_insert_batch(&self, chunks: &[Chunk]) -> BlinderResult<()> {
        let mut store = self.chunks.write().unwrap();
        for chunk in chunks {
            store.entry(chunk.session_id).or_default().push(chunk.clone());
        }
        Ok(())
    }

    async fn chunk_list_by_document(&self, document_id: Uuid) -> BlinderResult<Vec<Chunk>> {
        Ok(self
            .chunks
            .read()
            .unwrap()
            .values()
            .flatten()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn chunk_list_by_session(&self, session_id: Uuid) -> BlinderResult<Vec<Chunk>> {
        Ok(self.chunks.read().unwrap().get(&session_id).cloned().unwrap_or_default())
    }

    async fn message_insert(&self, message: &Message) -> BlinderResult<()> {
        self.messages
            .write()
            .unwrap()
            .entry(message.session_id)
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn message_list(&self, session_id: Uuid) -> BlinderResult<Vec<Message>> {
        Ok(self.messages.read().unwrap().get(&session_id).cloned().unwrap_or_default())
    }

    async fn audit_insert(&self, record: &AuditLog) -> BlinderResult<()> {
        self.audit_log
            .write()
            .unwrap()
            .entry(record.session_id)
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn audit_list(&self, session_id: Uuid) -> BlinderResult<Vec<AuditLog>> {
        Ok(self.audit_log.read().unwrap().get(&session_id).cloned().unwrap_or_default())
    }
}
