pub mod adherence;
pub mod config;
pub mod embedding;
pub mod ingest;
pub mod pipeline;
pub mod store;

pub use config::RagConfig;
pub use embedding::{EmbeddingBackend, EmbeddingClient};
pub use ingest::{ingest_directory, validation_probe, IndexBuildResult, IngestFailure};
pub use pipeline::{answer_question, Citation, QueryError, RagAnswer};
pub use store::{ChunkInsert, IndexStore, ScoredChunk};

pub use manualqa_llm::{LlmClient, LlmProvider, LlmRequest, LlmResponse};
