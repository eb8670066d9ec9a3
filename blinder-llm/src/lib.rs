//! Context assembly, citation extraction, domain prompts, and the LLM
//! provider abstraction (C12, C13, §4.12, §4.13).

mod citations;
mod context;
mod prompts;
mod providers;

pub use citations::{extract_citations, extract_inline, extract_post_hoc, SourceDocument};
pub use context::{estimate_tokens, ContextBuilder, SourceMeta};
pub use prompts::{get_system_prompt, ROUTER_PROMPT, SUPPORTED_DOMAINS, TITLE_PROMPT};
pub use providers::{create_client, known_context_window, ChatMessage, ChatStream, LlmClient};
