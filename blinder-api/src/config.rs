//! API-layer configuration: CORS/production hardening (`ApiConfig`) plus
//! the boot-time settings that are the HTTP surface's own responsibility -
//! `DATABASE_URL`, `BLINDER_MASTER_KEY`, `LOG_LEVEL` - combined with the
//! per-component configs `blinder-core` already owns.

use blinder_core::{ChunkConfig, ConfigError, ContextConfig, LlmConfig, PiiConfig, RetrievalConfig};

/// CORS and size-limit hardening for the HTTP boundary (§1: "CORS/CSRF
/// front-end wiring" is out of scope for the *core*, but the HTTP layer
/// still needs an access-control knob - `CORS_ORIGINS`, §6).
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Allowed CORS origins. Empty means allow all (development default).
    pub cors_origins: Vec<String>,
    /// Document upload size limit in bytes (§6: 50 MiB).
    pub max_upload_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let cors_origins = std::env::var("CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            cors_origins,
            ..Self::default()
        }
    }
}

/// The complete boot-time configuration for the process (§6 "Environment
/// configuration"): the master key and database URL the HTTP layer reads
/// before anything else can run, plus every per-component config the
/// inner crates already define.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Raw `BLINDER_MASTER_KEY` value. Required, must decode to at least
    /// 32 hex characters (§6); the process refuses to start without it
    /// since nothing downstream can encrypt without it (§7 fail-fast
    /// posture, matching `ConfigError::WeakMasterKey`).
    pub master_key: String,
    pub log_level: String,
    pub api: ApiConfig,
    pub llm: LlmConfig,
    pub pii: PiiConfig,
    pub chunk: ChunkConfig,
    pub retrieval: RetrievalConfig,
    pub context: ContextConfig,
}

impl AppConfig {
    /// Loads every setting from the environment (§6). Fails fast on a
    /// missing `DATABASE_URL` or a `BLINDER_MASTER_KEY` that does not
    /// decode to at least 32 hex characters - the server must refuse to
    /// start rather than silently run unable to encrypt (§6, §7).
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingRequired("DATABASE_URL".to_string()))?;
        let master_key = std::env::var("BLINDER_MASTER_KEY")
            .map_err(|_| ConfigError::MissingRequired("BLINDER_MASTER_KEY".to_string()))?;
        if master_key.len() < 32 {
            return Err(ConfigError::WeakMasterKey);
        }
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            database_url,
            master_key,
            log_level,
            api: ApiConfig::from_env(),
            llm: LlmConfig::from_env(),
            pii: PiiConfig::from_env(),
            chunk: ChunkConfig::from_env(),
            retrieval: RetrievalConfig::from_env(),
            context: ContextConfig::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_config_default_allows_all_origins() {
        let config = ApiConfig::default();
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn api_config_parses_comma_separated_origins() {
        std::env::set_var("CORS_ORIGINS", "https://a.example, https://b.example");
        let config = ApiConfig::from_env();
        std::env::remove_var("CORS_ORIGINS");
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
    }
}
