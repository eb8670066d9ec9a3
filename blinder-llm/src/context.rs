//! Context builder (C12, §4.12): assembles the final message list sent
//! to an LLM, choosing between stuffing full documents and a locally
//! chunked keyword-retrieval fallback when the caller has not already
//! supplied pre-retrieved chunks from the hybrid retriever.

use crate::prompts::get_system_prompt;
use crate::providers::{ChatMessage, LlmClient};
use blinder_core::{BlinderResult, Domain, BEGIN_DOCUMENT_DELIMITER, END_DOCUMENT_DELIMITER};
use std::collections::HashSet;

/// Metadata for one numbered source, so the system prompt's citation
/// rules ("cite using [N]") have something concrete to point the LLM at
/// (§4.12 final paragraph).
#[derive(Debug, Clone)]
pub struct SourceMeta {
    pub index: usize,
    pub filename: String,
}

/// A rough, language-agnostic token count: `len(text) / 4` (§4.12).
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

pub struct ContextBuilder;

impl ContextBuilder {
    /// Build the message list for one chat turn (§4.12).
    ///
    /// - If `retrieved_chunks` is `Some`, those are used verbatim (hybrid
    ///   RAG mode; the caller has already run C9/C10 or the tabular
    ///   engine).
    /// - Else, if stuffing every document fits under
    ///   `context_window_threshold` of the model's context window, all
    ///   documents are stuffed directly.
    /// - Else, falls back to a local keyword retrieve-and-fit pass.
    pub async fn build_messages(
        client: &dyn LlmClient,
        blinded_documents: &[String],
        history: &[ChatMessage],
        new_prompt: &str,
        domain: Domain,
        retrieved_chunks: Option<&[String]>,
        source_metadata: Option<&[SourceMeta]>,
        context_window_threshold: f32,
    ) -> BlinderResult<Vec<ChatMessage>> {
        let system_prompt = get_system_prompt(domain);

        if let Some(chunks) = retrieved_chunks {
            tracing::info!(chunk_count = chunks.len(), "using pre-retrieved chunks (hybrid RAG mode)");
            let doc_text = join_sources(chunks, source_metadata);
            return Ok(Self::build_stuffed(&system_prompt, &doc_text, history, new_prompt));
        }

        let context_window = client.context_window_size().await?;
        let max_tokens = (context_window as f32 * context_window_threshold) as usize;

        let doc_text = combine_documents(blinded_documents);
        let history_tokens: usize = history.iter().map(|m| estimate_tokens(&m.content)).sum();
        let total_estimate =
            estimate_tokens(&system_prompt) + estimate_tokens(&doc_text) + estimate_tokens(new_prompt) + history_tokens;

        if total_estimate < max_tokens {
            Ok(Self::build_stuffed(&system_prompt, &doc_text, history, new_prompt))
        } else {
            tracing::warn!(
                total_estimate,
                max_tokens,
                "content exceeds context window threshold with no retrieved_chunks; falling back to local keyword retrieval"
            );
            let relevant = retrieve_relevant_locally(blinded_documents, new_prompt, max_tokens, history, &system_prompt);
            Ok(Self::build_stuffed(&system_prompt, &relevant, history, new_prompt))
        }
    }

    fn build_stuffed(system_prompt: &str, doc_content: &str, history: &[ChatMessage], new_prompt: &str) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::new(blinder_core::Role::System, system_prompt)];

        if !doc_content.is_empty() {
            messages.push(ChatMessage::new(
                blinder_core::Role::User,
                format!(
                    "{BEGIN_DOCUMENT_DELIMITER}\n{doc_content}\n{END_DOCUMENT_DELIMITER}\n\n\
                     The above documents have been provided for analysis. All identifying \
                     information has been replaced with pseudonyms for privacy. Use ONLY the \
                     exact pseudonyms that appear above in your responses."
                ),
            ));
            messages.push(ChatMessage::new(
                blinder_core::Role::Assistant,
                "I have received the documents. I will use ONLY the exact pseudonyms from the \
                 documents (like [PERSON_1], [ORG_1], etc.) and will never create new pseudonym \
                 formats. How can I help you analyze these documents?",
            ));
        }

        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::new(blinder_core::Role::User, new_prompt));
        messages
    }
}

fn combine_documents(documents: &[String]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("--- Document {} ---\n{doc}", i + 1))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Join already-retrieved chunks, labelling each `[Source N] (filename):`
/// when numbered source metadata is supplied so the LLM can emit inline
/// `[N]` citations (§4.12 final paragraph).
fn join_sources(chunks: &[String], source_metadata: Option<&[SourceMeta]>) -> String {
    match source_metadata {
        Some(meta) if meta.len() == chunks.len() => chunks
            .iter()
            .zip(meta)
            .map(|(chunk, m)| format!("[Source {}] ({}):\n{chunk}", m.index, m.filename))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n"),
        _ => chunks.join("\n\n---\n\n"),
    }
}

/// Keyword-based retrieval (BM25-lite, via plain token overlap) over
/// locally re-chunked documents, used only when the caller has not
/// already run the real hybrid retriever and the documents don't fit
/// (§4.12 "fall back to a lexical retrieve-and-fit pass").
fn retrieve_relevant_locally(
    documents: &[String],
    query: &str,
    max_tokens: usize,
    history: &[ChatMessage],
    system_prompt: &str,
) -> String {
    let chunks: Vec<String> = documents
        .iter()
        .flat_map(|doc| blinder_retrieval::chunk_prose(doc, 512, 50))
        .collect();
    if chunks.is_empty() {
        return String::new();
    }

    let query_tokens: HashSet<String> = query.split_whitespace().map(|t| t.to_lowercase()).collect();
    let mut scored: Vec<(usize, &String)> = chunks
        .iter()
        .map(|chunk| {
            let chunk_tokens: HashSet<String> = chunk.split_whitespace().map(|t| t.to_lowercase()).collect();
            (query_tokens.intersection(&chunk_tokens).count(), chunk)
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    let history_tokens: usize = history.iter().map(|m| estimate_tokens(&m.content)).sum();
    let budget = max_tokens
        .saturating_sub(estimate_tokens(system_prompt))
        .saturating_sub(estimate_tokens(query))
        .saturating_sub(history_tokens)
        .saturating_sub(500);

    let mut selected = Vec::new();
    let mut used = 0;
    for (_, chunk) in scored {
        let chunk_tokens = estimate_tokens(chunk);
        if used + chunk_tokens > budget {
            break;
        }
        selected.push(chunk.clone());
        used += chunk_tokens;
    }
    selected.join("\n\n---\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::create_client;
    use blinder_core::LlmConfig;

    fn ollama_client() -> Box<dyn LlmClient> {
        create_client(&LlmConfig::default(), Some("ollama"), None).unwrap()
    }

    #[tokio::test]
    async fn stuffs_documents_when_small() {
        let client = ollama_client();
        let docs = vec!["Jane Smith signed the contract.".to_string()];
        let messages = ContextBuilder::build_messages(
            client.as_ref(),
            &docs,
            &[],
            "What did Jane sign?",
            Domain::Legal,
            None,
            None,
            0.8,
        )
        .await
        .unwrap();
        assert_eq!(messages[0].role, blinder_core::Role::System);
        assert!(messages[1].content.contains(BEGIN_DOCUMENT_DELIMITER));
        assert!(messages[1].content.contains("Jane Smith signed the contract."));
        assert_eq!(messages.last().unwrap().content, "What did Jane sign?");
    }

    #[tokio::test]
    async fn uses_retrieved_chunks_verbatim_when_supplied() {
        let client = ollama_client();
        let chunks = vec!["chunk one".to_string(), "chunk two".to_string()];
        let meta = vec![
            SourceMeta { index: 1, filename: "a.txt".to_string() },
            SourceMeta { index: 2, filename: "b.txt".to_string() },
        ];
        let messages = ContextBuilder::build_messages(
            client.as_ref(),
            &[],
            &[],
            "question",
            Domain::General,
            Some(&chunks),
            Some(&meta),
            0.8,
        )
        .await
        .unwrap();
        assert!(messages[1].content.contains("[Source 1] (a.txt):"));
        assert!(messages[1].content.contains("chunk one"));
    }

    #[test]
    fn estimate_tokens_is_len_over_four() {
        assert_eq!(estimate_tokens("12345678"), 2);
    }
}
