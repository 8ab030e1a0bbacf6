use anyhow::{anyhow, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use manualqa_core::ChunkConfig;
use manualqa_llm::{LlmClient, LlmProvider};

use crate::embedding::EmbeddingClient;

pub const DEFAULT_TOP_K: usize = 4;
pub const DEFAULT_HASH_DIMENSIONS: usize = 256;

/// All configuration, read once at startup and validated up front.
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub llm_provider: LlmProvider,
    pub llm_model: String,
    pub llm_timeout: Duration,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub hash_dimensions: usize,
    pub chunking: ChunkConfig,
    pub top_k: usize,
    pub manuals_dir: PathBuf,
    pub index_dir: PathBuf,
    pub bind_addr: String,
}

impl RagConfig {
    pub fn from_env() -> Result<Self> {
        let provider_name = env::var("LLM_PROVIDER").unwrap_or_else(|_| "gemini".to_string());
        let llm_provider = LlmProvider::from_str(&provider_name)
            .ok_or_else(|| anyhow!(format!("unknown LLM provider {provider_name}")))?;
        let llm_model = env::var("LLM_MODEL_NAME")
            .unwrap_or_else(|_| llm_provider.default_model().to_string());
        let llm_timeout = Duration::from_secs(parse_env("LLM_TIMEOUT_SECS", 60)?);
        let embedding_provider =
            env::var("EMBEDDING_PROVIDER").unwrap_or_else(|_| "hash".to_string());
        let embedding_model = env::var("EMBEDDING_MODEL_NAME")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());
        let hash_dimensions = parse_env("HASH_EMBED_DIMENSIONS", DEFAULT_HASH_DIMENSIONS)?;
        let chunking = ChunkConfig {
            chunk_size: parse_env("CHUNK_SIZE", ChunkConfig::default().chunk_size)?,
            chunk_overlap: parse_env("CHUNK_OVERLAP", ChunkConfig::default().chunk_overlap)?,
        };
        let top_k = parse_env("TOP_K", DEFAULT_TOP_K)?;
        let manuals_dir =
            PathBuf::from(env::var("MANUALS_DIR").unwrap_or_else(|_| "manuals".to_string()));
        let index_dir =
            PathBuf::from(env::var("INDEX_DIR").unwrap_or_else(|_| "index".to_string()));
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());

        let config = Self {
            llm_provider,
            llm_model,
            llm_timeout,
            embedding_provider,
            embedding_model,
            hash_dimensions,
            chunking,
            top_k,
            manuals_dir,
            index_dir,
            bind_addr,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(anyhow!("CHUNK_SIZE must be positive"));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(anyhow!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            ));
        }
        if self.top_k == 0 {
            return Err(anyhow!("TOP_K must be positive"));
        }
        match self.embedding_provider.as_str() {
            "hash" | "openai" => {}
            other => return Err(anyhow!(format!("unknown embedding provider {other}"))),
        }
        Ok(())
    }

    /// Path of the SQLite index file inside the index directory.
    pub fn index_db(&self) -> PathBuf {
        self.index_dir.join("index.sqlite")
    }

    pub fn llm_client(&self) -> Result<LlmClient> {
        LlmClient::new(self.llm_provider, self.llm_model.clone(), self.llm_timeout)
    }

    pub fn embedding_client(&self) -> Result<EmbeddingClient> {
        match self.embedding_provider.as_str() {
            "openai" => EmbeddingClient::openai(&self.embedding_model),
            _ => Ok(EmbeddingClient::hash(self.hash_dimensions)),
        }
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, default: T) -> Result<T> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!(format!("{var} has an invalid value: {raw}"))),
        Err(_) => Ok(default),
    }
}
