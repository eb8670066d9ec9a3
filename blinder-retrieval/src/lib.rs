//! Chunking, embedding, hybrid retrieval, and the tabular query engine
//! (C9, C10, C11).

mod chunker;
mod embedder;
mod hybrid;
mod tabular;

pub use chunker::{chunk_document, chunk_prose, chunk_tabular, is_tabular, TABULAR_SEPARATOR};
pub use embedder::{cosine_similarity, l2_normalize, EmbeddingProvider, EMBED_BATCH_SIZE};
pub use hybrid::{adaptive_top_k, hybrid_search};
pub use tabular::{parse_tabular, try_tabular_query, QueryResult, TabularData};
