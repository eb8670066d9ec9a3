//! Per-session pseudonym vault (C4, §4.4).

use blinder_core::{VaultEntry, VaultEntryRow, VaultError};
use blinder_pii::Span;
use std::collections::HashMap;
use uuid::Uuid;

/// Bidirectional real-value <-> pseudonym map, held in memory for the
/// lifetime of one request. All state is reconstructed per request from
/// [`VaultEntryRow`]s loaded via [`Vault::load_entries`].
pub struct Vault {
    session_salt: [u8; 32],
    encryption_key: [u8; 32],
    /// real_value or alias -> pseudonym
    forward: HashMap<String, String>,
    /// pseudonym -> real_value
    reverse: HashMap<String, String>,
    /// pseudonym -> entry (owns the alias list)
    entries: HashMap<String, VaultEntry>,
    /// entity_type -> highest N allocated so far
    counters: HashMap<String, u64>,
}

impl Vault {
    pub fn new(session_salt: [u8; 32], encryption_key: [u8; 32]) -> Self {
        Self {
            session_salt,
            encryption_key,
            forward: HashMap::new(),
            reverse: HashMap::new(),
            entries: HashMap::new(),
            counters: HashMap::new(),
        }
    }

    pub fn session_salt(&self) -> &[u8; 32] {
        &self.session_salt
    }

    /// Register `real_value` under `entity_type` and return its pseudonym.
    /// If `real_value` is already known, the existing pseudonym is
    /// returned and no new entry/counter increment occurs (§8 "Vault
    /// monotonicity" law).
    pub fn add_entity(&mut self, real_value: &str, entity_type: &str) -> String {
        if let Some(existing) = self.forward.get(real_value) {
            return existing.clone();
        }

        let counter = self.counters.entry(entity_type.to_string()).or_insert(0);
        *counter += 1;
        let pseudonym = format!("[{entity_type}_{counter}]");

        self.forward
            .insert(real_value.to_string(), pseudonym.clone());
        self.reverse
            .insert(pseudonym.clone(), real_value.to_string());
        self.entries.insert(
            pseudonym.clone(),
            VaultEntry::new(entity_type.into(), pseudonym.clone(), real_value.to_string()),
        );
        pseudonym
    }

    pub fn get_pseudonym(&self, real_value: &str) -> Option<&str> {
        self.forward.get(real_value).map(|s| s.as_str())
    }

    pub fn get_real_value(&self, pseudonym: &str) -> Option<&str> {
        self.reverse.get(pseudonym).map(|s| s.as_str())
    }

    pub fn entry(&self, pseudonym: &str) -> Option<&VaultEntry> {
        self.entries.get(pseudonym)
    }

    /// Iterate the forward map (real values and aliases -> pseudonym).
    /// Exposed for the entity mapper's matching strategies (§4.5), which
    /// must be able to match against already-registered aliases too, not
    /// just canonical real values.
    pub fn forward_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.forward.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Register `alias` as an alternative surface form of `pseudonym`.
    /// Fails if `pseudonym` is unknown. Idempotent: a duplicate alias is
    /// not inserted twice.
    pub fn add_alias(&mut self, pseudonym: &str, alias: &str) -> Result<(), VaultError> {
        let entry = self
            .entries
            .get_mut(pseudonym)
            .ok_or_else(|| VaultError::UnknownPseudonym(pseudonym.to_string()))?;
        if !entry.aliases.iter().any(|a| a == alias) {
            entry.aliases.push(alias.to_string());
        }
        self.forward.insert(alias.to_string(), pseudonym.to_string());
        Ok(())
    }

    /// Directly point `surface_text` at `pseudonym` in the forward map
    /// without touching the entry's alias list. Used by the entity mapper
    /// when it needs `pseudonymize_text` to pick up an existing pseudonym
    /// for a surface form that already equals the canonical real value.
    pub fn link_forward(&mut self, surface_text: &str, pseudonym: &str) {
        self.forward
            .insert(surface_text.to_string(), pseudonym.to_string());
    }

    /// Replace each span in `text` with its pseudonym, processing spans in
    /// descending `start` order so earlier offsets remain valid as the
    /// string is spliced (§4.4). Every replacement also calls
    /// [`Vault::add_entity`] so repeated surface forms share one pseudonym.
    pub fn pseudonymize_text(&mut self, text: &str, spans: &[Span]) -> String {
        let mut sorted: Vec<&Span> = spans.iter().collect();
        sorted.sort_by(|a, b| b.start.cmp(&a.start));

        let mut result = text.to_string();
        for span in sorted {
            let pseudonym = self.add_entity(&span.text, &span.label);
            // Byte-offset splice; spans are produced over the same `text`
            // this function receives, so start/end are valid char-boundary
            // byte offsets into it.
            result.replace_range(span.start..span.end, &pseudonym);
        }
        result
    }

    pub fn get_all_entries(&self) -> Vec<&VaultEntry> {
        self.entries.values().collect()
    }

    /// Rehydrate vault state from persisted rows (§4.4): install both
    /// directions of the map, append aliases into the forward map, and
    /// restore each entity type's counter to the maximum N observed so
    /// newly-created entities continue the sequence without collision.
    ///
    /// Concurrent requests can race to mint a pseudonym for the same
    /// `real_value`, so storage tolerates duplicate `(session, real_value)`
    /// rows under distinct pseudonyms (§5). On reload the first-seen row
    /// for a given `real_value` wins the forward mapping - later duplicate
    /// rows still get a `reverse`/`entries` record (their pseudonym is
    /// still valid and may already be referenced elsewhere), but never
    /// displace the forward mapping an earlier row already established.
    pub fn load_entries(&mut self, rows: Vec<(VaultEntryRow, String)>) {
        for (row, real_value) in rows {
            self.forward
                .entry(real_value.clone())
                .or_insert_with(|| row.pseudonym.clone());
            self.reverse.insert(row.pseudonym.clone(), real_value.clone());

            if let Some(n) = parse_counter(&row.pseudonym) {
                let slot = self.counters.entry(row.entity_type.as_str().to_string()).or_insert(0);
                if n > *slot {
                    *slot = n;
                }
            }

            for alias in &row.aliases {
                self.forward
                    .entry(alias.clone())
                    .or_insert_with(|| row.pseudonym.clone());
            }

            self.entries.insert(
                row.pseudonym.clone(),
                VaultEntry {
                    entity_type: row.entity_type.clone(),
                    pseudonym: row.pseudonym.clone(),
                    real_value,
                    aliases: row.aliases.clone(),
                },
            );
        }
    }

    /// Encrypt every entry not yet persisted, for storage as
    /// [`VaultEntryRow`]s (§4.14 step 13).
    pub fn dump_for_persistence(&self, session_id: Uuid) -> Vec<VaultEntryRow> {
        self.entries
            .values()
            .map(|entry| {
                let (ciphertext, nonce) = self.encrypt_value(&entry.real_value);
                VaultEntryRow {
                    session_id,
                    entity_type: entry.entity_type.clone(),
                    pseudonym: entry.pseudonym.clone(),
                    ciphertext,
                    nonce: nonce.to_vec(),
                    aliases: entry.aliases.clone(),
                }
            })
            .collect()
    }

    pub fn encrypt_value(&self, value: &str) -> (Vec<u8>, [u8; 12]) {
        blinder_crypto::encrypt(value, &self.encryption_key)
    }

    pub fn decrypt_value(
        &self,
        ciphertext: &[u8],
        nonce: &[u8; 12],
    ) -> Result<String, blinder_core::CryptoError> {
        blinder_crypto::decrypt(ciphertext, &self.encryption_key, nonce)
    }
}

/// Parse the trailing counter out of a pseudonym like `[PERSON_12]` -> 12.
fn parse_counter(pseudonym: &str) -> Option<u64> {
    let inner = pseudonym.trim_start_matches('[').trim_end_matches(']');
    let (_, num_str) = inner.rsplit_once('_')?;
    num_str.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> Vault {
        Vault::new([0u8; 32], [1u8; 32])
    }

    #[test]
    fn scenario_1_sequential_pseudonyms_per_type() {
        let mut v = vault();
        assert_eq!(v.add_entity("John Smith", "PERSON"), "[PERSON_1]");
        assert_eq!(v.add_entity("Jane Doe", "PERSON"), "[PERSON_2]");
        assert_eq!(v.add_entity("Acme Corp", "ORG"), "[ORG_1]");
        assert_eq!(v.add_entity("John Smith", "PERSON"), "[PERSON_1]");
    }

    #[test]
    fn add_entity_does_not_increment_counter_on_repeat() {
        let mut v = vault();
        v.add_entity("John Smith", "PERSON");
        v.add_entity("John Smith", "PERSON");
        assert_eq!(v.add_entity("New Person", "PERSON"), "[PERSON_2]");
    }

    #[test]
    fn add_alias_is_idempotent() {
        let mut v = vault();
        let p = v.add_entity("John Smith", "PERSON");
        v.add_alias(&p, "Johnny").unwrap();
        v.add_alias(&p, "Johnny").unwrap();
        assert_eq!(v.entry(&p).unwrap().aliases, vec!["Johnny".to_string()]);
        assert_eq!(v.get_pseudonym("Johnny"), Some(p.as_str()));
    }

    #[test]
    fn add_alias_fails_for_unknown_pseudonym() {
        let mut v = vault();
        assert!(v.add_alias("[PERSON_99]", "x").is_err());
    }

    #[test]
    fn pseudonymize_text_splices_from_the_end() {
        let mut v = vault();
        let spans = vec![
            Span {
                text: "John Smith".into(),
                label: "PERSON".into(),
                start: 12,
                end: 22,
                confidence: 0.9,
                gate: blinder_pii::Gate::PatternA,
            },
            Span {
                text: "Acme Corp".into(),
                label: "ORG".into(),
                start: 33,
                end: 42,
                confidence: 0.9,
                gate: blinder_pii::Gate::PatternA,
            },
        ];
        let out = v.pseudonymize_text("The client, John Smith, works at Acme Corp.", &spans);
        assert_eq!(out, "The client, [PERSON_1], works at [ORG_1].");
    }

    #[test]
    fn encrypt_decrypt_roundtrips_through_vault() {
        let v = vault();
        let (ct, nonce) = v.encrypt_value("Jane Doe");
        assert_eq!(v.decrypt_value(&ct, &nonce).unwrap(), "Jane Doe");
    }

    #[test]
    fn load_entries_restores_counters_and_aliases() {
        let mut v = vault();
        let row = VaultEntryRow {
            session_id: Uuid::nil(),
            entity_type: "PERSON".into(),
            pseudonym: "[PERSON_5]".into(),
            ciphertext: vec![],
            nonce: vec![],
            aliases: vec!["Johnny".into()],
        };
        v.load_entries(vec![(row, "John Smith".to_string())]);
        assert_eq!(v.get_pseudonym("John Smith"), Some("[PERSON_5]"));
        assert_eq!(v.get_pseudonym("Johnny"), Some("[PERSON_5]"));
        // Next allocation for PERSON must continue past 5.
        assert_eq!(v.add_entity("New Person", "PERSON"), "[PERSON_6]");
    }

    #[test]
    fn load_entries_keeps_first_seen_pseudonym_for_a_duplicated_real_value() {
        // Two concurrent requests can both mint a pseudonym for the same
        // real value before either commits (§5); storage tolerates the
        // duplicate `(session, real_value)` rows, and on reload the
        // forward mapping must stably resolve to whichever row was
        // first-seen, not whichever was inserted last.
        let mut v = vault();
        let first = VaultEntryRow {
            session_id: Uuid::nil(),
            entity_type: "PERSON".into(),
            pseudonym: "[PERSON_1]".into(),
            ciphertext: vec![],
            nonce: vec![],
            aliases: vec![],
        };
        let duplicate = VaultEntryRow {
            session_id: Uuid::nil(),
            entity_type: "PERSON".into(),
            pseudonym: "[PERSON_2]".into(),
            ciphertext: vec![],
            nonce: vec![],
            aliases: vec![],
        };
        v.load_entries(vec![
            (first, "John Smith".to_string()),
            (duplicate, "John Smith".to_string()),
        ]);
        assert_eq!(v.get_pseudonym("John Smith"), Some("[PERSON_1]"));
        // Both rows still resolve in reverse - the duplicate pseudonym is
        // not discarded, only kept from winning the forward mapping.
        assert_eq!(v.get_real_value("[PERSON_2]"), Some("John Smith"));
    }

    proptest::proptest! {
        #[test]
        fn add_entity_is_monotonic(a in "[a-zA-Z ]{1,20}") {
            let mut v = vault();
            let first = v.add_entity(&a, "PERSON");
            let second = v.add_entity(&a, "PERSON");
            proptest::prop_assert_eq!(first, second);
        }
    }
}
