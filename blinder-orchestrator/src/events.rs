//! SSE event shapes emitted by [`crate::RequestOrchestrator::handle_chat`]
//! (§6 "SSE event shapes"). Kept as a plain serde-serialisable enum here
//! so `blinder-api` only has to wrap each value in an
//! `axum::response::sse::Event` - the wire shape itself, including the
//! legacy `lawyer_content` field name, lives in one place.

use blinder_core::{Citation, ThreatDetail};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum SseEvent {
    #[serde(rename = "start")]
    Start,

    #[serde(rename = "chunk")]
    Chunk { content: String },

    /// The field is named `lawyer_content` on the wire, not
    /// `clear_content` - a naming quirk carried over verbatim from the
    /// product this was distilled from. Everything on this side of the
    /// serde boundary still calls it `clear_content`.
    #[serde(rename = "done")]
    Done {
        #[serde(rename = "lawyer_content")]
        clear_content: String,
        blinded_content: String,
        message_id: Uuid,
        citations: Vec<Citation>,
        provider: String,
        model: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        domain: Option<String>,
    },

    #[serde(rename = "error")]
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        threats: Option<Vec<ThreatDetail>>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_event_serialises_the_legacy_wire_field_name() {
        let event = SseEvent::Done {
            clear_content: "Jane Smith signed the contract.".into(),
            blinded_content: "[PERSON_1] signed the contract.".into(),
            message_id: Uuid::nil(),
            citations: vec![],
            provider: "ollama".into(),
            model: "llama3".into(),
            title: None,
            domain: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "done");
        assert_eq!(json["lawyer_content"], "Jane Smith signed the contract.");
        assert!(json.get("clear_content").is_none());
    }

    #[test]
    fn start_and_chunk_serialise_with_bare_type_tag() {
        assert_eq!(serde_json::to_value(&SseEvent::Start).unwrap()["type"], "start");
        let chunk = SseEvent::Chunk { content: "hi".into() };
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["type"], "chunk");
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn error_event_omits_threats_when_absent() {
        let event = SseEvent::Error { error: "cannot connect to the language model provider".into(), threats: None };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("threats").is_none());
    }
}
