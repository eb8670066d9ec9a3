//! Request orchestrator and audit log: the end-to-end chat flow of
//! blind -> retrieve -> build context -> stream -> restore -> cite ->
//! audit -> persist, plus the append-only audit log and its export
//! report (C14, C15, §4.14, §4.15).

pub mod audit;
mod events;
mod orchestrator;

pub use events::SseEvent;
pub use orchestrator::{ChatRequest, RequestOrchestrator};
