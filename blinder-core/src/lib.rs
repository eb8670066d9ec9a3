//! Pure data structures shared by every Blinder crate.
//!
//! This crate contains ONLY data types, error taxonomy, and configuration
//! primitives - no business logic. Every other crate in the workspace
//! depends on it.

mod config;
mod entities;
mod enums;
mod error;

pub use config::{
    ChunkConfig, ContextConfig, CryptoConfig, LlmConfig, PiiConfig, RetrievalConfig,
};
pub use entities::{
    AuditLog, Chunk, Citation, Document, Message, Session, ThreatDetail, VaultEntry, VaultEntryRow,
};
pub use enums::{Domain, DomainParseError, EventType, Role, Severity};
pub use error::{
    BlinderError, BlinderResult, ConfigError, CryptoError, FilterError, LlmError,
    OrchestratorError, PiiError, PipelineError, RetrievalError, StorageError, ValidationError,
    VaultError,
};

/// The pseudonym grammar: `[TYPE_N]` where `TYPE` starts with an
/// uppercase letter and `N` is a positive integer. Authoritative
/// everywhere in this workspace - every crate that needs to recognise,
/// mint, or strip a pseudonym parses it with this one pattern.
pub const PSEUDONYM_PATTERN: &str = r"\[([A-Z][A-Z0-9_]*_\d+)\]";

/// Reserved delimiters wrapping document content sent to an LLM. Never
/// valid inside user-supplied content.
pub const BEGIN_DOCUMENT_DELIMITER: &str = "### BEGIN DOCUMENT ###";
pub const END_DOCUMENT_DELIMITER: &str = "### END DOCUMENT ###";

/// A symbolic PII/entity category, e.g. `PERSON`, `ORG`, `SSN`. Represented
/// as an uppercase string rather than a closed enum because detectors
/// (including the NER model, out of scope per spec) may produce labels
/// this crate does not enumerate in advance, and the LLM may hallucinate
/// novel ones in its output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EntityType(pub String);

impl EntityType {
    pub fn new(label: impl AsRef<str>) -> Self {
        Self(label.as_ref().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EntityType {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Well-known entity type labels recognised by Gate A and Gate B (§4.3).
/// Not exhaustive - detectors may emit labels outside this list.
pub mod entity_types {
    pub const PERSON: &str = "PERSON";
    pub const ORG: &str = "ORG";
    pub const EMAIL: &str = "EMAIL";
    pub const PHONE: &str = "PHONE";
    pub const SSN: &str = "SSN";
    pub const CREDIT_CARD: &str = "CREDIT_CARD";
    pub const IP_ADDRESS: &str = "IP_ADDRESS";
    pub const URL: &str = "URL";
    pub const IBAN: &str = "IBAN";
    pub const BANK_ACCOUNT: &str = "BANK_ACCOUNT";
    pub const DRIVER_LICENSE: &str = "DRIVER_LICENSE";
    pub const PASSPORT: &str = "PASSPORT";
    pub const MEDICAL_LICENSE: &str = "MEDICAL_LICENSE";
    pub const LEGAL_CASE_NUMBER: &str = "LEGAL_CASE_NUMBER";
    pub const LOCATION: &str = "LOCATION";
    pub const DATE: &str = "DATE";
    pub const DATE_TIME: &str = "DATE_TIME";
    pub const LEGAL_REF: &str = "LEGAL_REF";
    pub const NORP: &str = "NORP";

    /// Labels that are always treated as PII by the prompt filter (§4.6) -
    /// never suppressed regardless of analytical context.
    pub const ALWAYS_PII: &[&str] = &[
        PERSON,
        EMAIL,
        PHONE,
        SSN,
        CREDIT_CARD,
        BANK_ACCOUNT,
        IBAN,
        DRIVER_LICENSE,
        PASSPORT,
        IP_ADDRESS,
        MEDICAL_LICENSE,
    ];

    /// Labels the prompt filter (§4.6) evaluates for suppression rather
    /// than treating unconditionally as PII.
    pub const CONTEXT_DEPENDENT: &[&str] = &[DATE, DATE_TIME, LOCATION, ORG, NORP];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_normalises_case() {
        assert_eq!(EntityType::new("person").as_str(), "PERSON");
        assert_eq!(EntityType::from("Org"), EntityType::new("ORG"));
    }

    #[test]
    fn pseudonym_pattern_matches_spec_grammar() {
        let re = regex::Regex::new(PSEUDONYM_PATTERN).unwrap();
        assert!(re.is_match("[PERSON_1]"));
        assert!(re.is_match("[LEGAL_CASE_NUMBER_12]"));
        assert!(!re.is_match("[person_1]"));
        assert!(!re.is_match("[1PERSON_1]"));
    }
}
