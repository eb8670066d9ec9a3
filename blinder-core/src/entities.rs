//! Domain entities (§3 DATA MODEL).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enums::{Domain, EventType, Role, Severity};
use crate::EntityType;

/// Stable identity for a conversation (§3 Session).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Session {
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub session_id: Uuid,
    pub title: Option<String>,
    pub domain: Option<Domain>,
    /// 32-byte random salt, generated once at creation and never mutated.
    /// Combined with the process master key to derive the session's AES
    /// key (§4.1).
    #[serde(with = "serde_salt")]
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub salt: [u8; 32],
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = DateTime))]
    pub created_at: DateTime<Utc>,
}

mod serde_salt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(salt: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(salt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("salt must decode to exactly 32 bytes"))
    }
}

/// One real-value <-> pseudonym binding, held in memory for the lifetime
/// of a request (§3 VaultEntry, §4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct VaultEntry {
    pub entity_type: EntityType,
    /// Format `[TYPE_N]`, unique per (session, entity_type).
    pub pseudonym: String,
    pub real_value: String,
    /// Alternative surface forms registered by the entity mapper (§4.5).
    pub aliases: Vec<String>,
}

impl VaultEntry {
    pub fn new(entity_type: EntityType, pseudonym: String, real_value: String) -> Self {
        Self {
            entity_type,
            pseudonym,
            real_value,
            aliases: Vec::new(),
        }
    }
}

/// The persisted shape of a [`VaultEntry`]: the real value is encrypted
/// at rest, never stored in the clear. Converted to/from `VaultEntry` at
/// the storage boundary by the vault's `load_entries`/
/// `dump_for_persistence` operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct VaultEntryRow {
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub session_id: Uuid,
    pub entity_type: EntityType,
    pub pseudonym: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub ciphertext: Vec<u8>,
    /// 12-byte AES-GCM nonce.
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub nonce: Vec<u8>,
    pub aliases: Vec<String>,
}

/// One ingested file (§3 Document).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Document {
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub document_id: Uuid,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub session_id: Uuid,
    pub filename: String,
    pub content_type: String,
    /// Present until processing completes, then cleared. Invariant:
    /// `processed == true` implies this is `None`.
    pub raw_text: Option<String>,
    pub blinded_text: Option<String>,
    pub pii_count: i32,
    pub processed: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = DateTime))]
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Whether this document currently satisfies its lifecycle invariant.
    pub fn is_consistent(&self) -> bool {
        if self.processed {
            self.raw_text.is_none() && self.blinded_text.is_some()
        } else {
            true
        }
    }
}

/// A retrievable fragment of a processed prose document (§3 Chunk).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Chunk {
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub chunk_id: Uuid,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub session_id: Uuid,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub document_id: Uuid,
    pub index: i32,
    /// Always blinded - never contains real PII.
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    pub token_count: i32,
}

/// One turn of conversation (§3 Message).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Message {
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub message_id: Uuid,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub session_id: Uuid,
    pub role: Role,
    /// Real values restored, for display to the human caller.
    pub clear_content: String,
    /// What the LLM actually saw.
    pub blinded_content: String,
    pub threats: Vec<ThreatDetail>,
    pub citations: Vec<Citation>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = DateTime))]
    pub created_at: DateTime<Utc>,
}

/// One detected threat (§3 Threat, transient - never persisted standalone).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ThreatDetail {
    pub threat_type: String,
    pub description: String,
    pub severity: Severity,
    pub matched_pattern: String,
}

/// A citation linking a response to a source chunk or document (§4.14
/// step 11).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Citation {
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub document_id: Uuid,
    pub filename: String,
    pub chunk_index: i32,
    pub score: f32,
    pub snippet_blinded: String,
    pub snippet_clear: String,
    /// Inline `[N]` marker number, `None` for BM25-only citations.
    pub marker: Option<u32>,
}

/// One observed LLM boundary event (§3 AuditLog, §4.15).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AuditLog {
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub audit_id: Uuid,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub session_id: Uuid,
    pub event_type: EventType,
    pub provider: String,
    pub model: String,
    /// The full blinded payload - never real PII.
    pub payload_blinded: String,
    /// Lowercase hex-encoded SHA-256 of `payload_blinded` as stored.
    pub payload_hash: String,
    pub token_estimate: i64,
    pub metadata: serde_json::Value,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = DateTime))]
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_invariant_holds_when_unprocessed() {
        let doc = Document {
            document_id: Uuid::now_v7(),
            session_id: Uuid::now_v7(),
            filename: "f.txt".into(),
            content_type: "text/plain".into(),
            raw_text: Some("hello".into()),
            blinded_text: None,
            pii_count: 0,
            processed: false,
            created_at: Utc::now(),
        };
        assert!(doc.is_consistent());
    }

    #[test]
    fn document_invariant_rejects_processed_with_raw_text() {
        let doc = Document {
            document_id: Uuid::now_v7(),
            session_id: Uuid::now_v7(),
            filename: "f.txt".into(),
            content_type: "text/plain".into(),
            raw_text: Some("hello".into()),
            blinded_text: Some("[PERSON_1]".into()),
            pii_count: 1,
            processed: true,
            created_at: Utc::now(),
        };
        assert!(!doc.is_consistent());
    }

    #[test]
    fn salt_roundtrips_through_serde() {
        let session = Session {
            session_id: Uuid::now_v7(),
            title: None,
            domain: None,
            salt: [7u8; 32],
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back.salt, [7u8; 32]);
    }
}
