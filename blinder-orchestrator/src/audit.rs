//! Audit log and export report (C15, §4.15).

use blinder_core::{AuditLog, BlinderResult, EventType};
use blinder_storage::StorageTrait;
use chrono::Utc;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Lowercase hex SHA-256 of `payload_blinded`, recomputed at export time
/// so an external auditor can verify it independently of what was
/// stored (§4.15).
pub fn payload_hash(payload_blinded: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload_blinded.as_bytes());
    hex::encode(hasher.finalize())
}

/// Append one audit boundary event. `payload_hash` is always computed
/// from `payload_blinded` here, never supplied by the caller, so the
/// hash can never drift from the payload it claims to cover (§4.15).
#[allow(clippy::too_many_arguments)]
pub fn create(
    session_id: Uuid,
    event_type: EventType,
    payload_blinded: String,
    provider: String,
    model: String,
    token_estimate: i64,
    metadata: Value,
) -> AuditLog {
    let payload_hash = payload_hash(&payload_blinded);
    AuditLog {
        audit_id: Uuid::now_v7(),
        session_id,
        event_type,
        provider,
        model,
        payload_blinded,
        payload_hash,
        token_estimate,
        metadata,
        created_at: Utc::now(),
    }
}

/// Build the downloadable JSON audit export report for one session
/// (§6 "Audit export JSON", §4.15). Never includes real values: messages
/// carry only `blinded_content`, documents carry no text at all, and the
/// vault statistics are counts by entity type, never real values.
pub async fn export_report(storage: &dyn StorageTrait, session_id: Uuid) -> BlinderResult<Value> {
    let session = storage.session_get(session_id).await?;
    let audit_logs = storage.audit_list(session_id).await?;
    let messages = storage.message_list(session_id).await?;
    let documents = storage.document_list(session_id).await?;
    let vault_stats = storage.vault_stats(session_id).await?;

    let audit_logs_json: Vec<Value> = audit_logs
        .iter()
        .map(|record| {
            let recomputed = payload_hash(&record.payload_blinded);
            json!({
                "audit_id": record.audit_id,
                "event_type": record.event_type,
                "provider": record.provider,
                "model": record.model,
                "payload_blinded": record.payload_blinded,
                "payload_hash": record.payload_hash,
                "payload_hash_verified": recomputed == record.payload_hash,
                "token_estimate": record.token_estimate,
                "metadata": record.metadata,
                "created_at": record.created_at,
            })
        })
        .collect();

    let messages_json: Vec<Value> = messages
        .iter()
        .map(|message| {
            json!({
                "message_id": message.message_id,
                "role": message.role,
                "blinded_content": message.blinded_content,
                "citations": message.citations,
                "created_at": message.created_at,
            })
        })
        .collect();

    let documents_json: Vec<Value> = documents
        .iter()
        .map(|document| {
            json!({
                "document_id": document.document_id,
                "filename": document.filename,
                "content_type": document.content_type,
                "pii_count": document.pii_count,
                "processed": document.processed,
                "created_at": document.created_at,
            })
        })
        .collect();

    Ok(json!({
        "report_type": "blinder_audit_export",
        "version": "1.0",
        "generated_at": Utc::now(),
        "session": session.map(|s| json!({
            "session_id": s.session_id,
            "title": s.title,
            "domain": s.domain,
            "created_at": s.created_at,
        })),
        "audit_logs": audit_logs_json,
        "messages": messages_json,
        "documents": documents_json,
        "vault_stats": {
            "total_entities": vault_stats.total_entities,
            "entities_by_type": vault_stats.entities_by_type,
        },
        "integrity_note": "Each entry in audit_logs carries payload_hash, the lowercase hex \
            SHA-256 digest of its payload_blinded field. payload_hash_verified is recomputed \
            at export time from the stored payload - an independent auditor can repeat this \
            computation over payload_blinded and confirm it matches payload_hash without \
            trusting this export.",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_hash_is_deterministic_sha256_hex() {
        let a = payload_hash("hello");
        let b = payload_hash("hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn create_computes_hash_from_payload() {
        let record = create(
            Uuid::nil(),
            EventType::LlmRequest,
            "blinded payload".to_string(),
            "ollama".to_string(),
            "llama3".to_string(),
            42,
            json!({}),
        );
        assert_eq!(record.payload_hash, payload_hash("blinded payload"));
    }

    #[tokio::test]
    async fn export_report_never_carries_document_text() {
        let storage = blinder_storage::MockStorage::new();
        let session_id = Uuid::now_v7();
        let session = blinder_core::Session {
            session_id,
            title: None,
            domain: None,
            salt: [0u8; 32],
            created_at: Utc::now(),
        };
        storage.session_insert(&session).await.unwrap();
        let document = blinder_core::Document {
            document_id: Uuid::now_v7(),
            session_id,
            filename: "contract.txt".into(),
            content_type: "text/plain".into(),
            raw_text: None,
            blinded_text: Some("[PERSON_1] signed the contract".into()),
            pii_count: 1,
            processed: true,
            created_at: Utc::now(),
        };
        storage.document_insert(&document).await.unwrap();

        let report = export_report(&storage, session_id).await.unwrap();
        let rendered = report.to_string();
        assert!(!rendered.contains("[PERSON_1] signed the contract"));
        assert_eq!(report["documents"][0]["filename"], "contract.txt");
    }
}
