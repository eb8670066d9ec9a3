//! Small closed enumerations used across the workspace.

use serde::{Deserialize, Serialize};

/// Expert domain selecting the system prompt used by the context builder
/// (§4.12). Persisted on the session after the first-message domain
/// classification call (§4.14 step 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Legal,
    Finance,
    Healthcare,
    Hr,
    General,
}

impl Domain {
    /// The stable string persisted to storage and round-tripped through
    /// the domain-classification LLM call.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Domain::Legal => "legal",
            Domain::Finance => "finance",
            Domain::Healthcare => "healthcare",
            Domain::Hr => "hr",
            Domain::General => "general",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, DomainParseError> {
        match s.trim().to_lowercase().as_str() {
            "legal" => Ok(Domain::Legal),
            "finance" => Ok(Domain::Finance),
            "healthcare" => Ok(Domain::Healthcare),
            "hr" => Ok(Domain::Hr),
            "general" => Ok(Domain::General),
            other => Err(DomainParseError(other.to_string())),
        }
    }
}

impl Default for Domain {
    fn default() -> Self {
        Domain::General
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

/// Returned when a stored or LLM-produced domain string does not match
/// one of the five recognised domains. The orchestrator falls back to
/// [`Domain::General`] rather than propagating this as a hard error.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unrecognised domain: {0:?}")]
pub struct DomainParseError(pub String);

/// Conversation turn role (§3 Message).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Audit boundary event kind (§3 AuditLog).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    LlmRequest,
    LlmResponse,
}

/// Threat severity (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_roundtrips_through_db_str() {
        for d in [
            Domain::Legal,
            Domain::Finance,
            Domain::Healthcare,
            Domain::Hr,
            Domain::General,
        ] {
            assert_eq!(Domain::from_db_str(d.as_db_str()).unwrap(), d);
        }
    }

    #[test]
    fn domain_parse_is_case_insensitive() {
        assert_eq!(Domain::from_db_str("LEGAL").unwrap(), Domain::Legal);
        assert_eq!(Domain::from_db_str(" Finance \n").unwrap(), Domain::Finance);
    }

    #[test]
    fn domain_parse_rejects_unknown() {
        assert!(Domain::from_db_str("astrology").is_err());
    }

    #[test]
    fn severity_orders_low_to_high() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
    }
}
