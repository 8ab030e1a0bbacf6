use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use glob::Pattern;
use tracing::{info, warn};
use walkdir::WalkDir;

use manualqa_core::{load_document, ChunkConfig, Chunker};

use crate::embedding::EmbeddingClient;
use crate::store::{ChunkInsert, IndexStore, ScoredChunk};

pub const DEFAULT_PATTERN: &str = "*.pdf";

#[derive(Debug, Clone)]
pub struct IngestFailure {
    pub file: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct IndexBuildResult {
    pub files_discovered: usize,
    pub files_processed: usize,
    pub chunks_indexed: usize,
    pub failures: Vec<IngestFailure>,
}

/// Full rebuild of the index from every manual under `manuals_dir`.
///
/// A file that cannot be extracted is reported and skipped; producing zero
/// chunks while at least one file was present is fatal, as is an embedding
/// backend failure.
pub fn ingest_directory(
    store: &IndexStore,
    embeddings: &EmbeddingClient,
    manuals_dir: &Path,
    pattern: &str,
    chunking: ChunkConfig,
) -> Result<IndexBuildResult> {
    if !manuals_dir.is_dir() {
        return Err(anyhow!(format!(
            "manuals directory {} does not exist",
            manuals_dir.display()
        )));
    }
    let files = discover_files(manuals_dir, pattern)?;
    store.rebuild(&embeddings.model_label())?;
    let mut result = IndexBuildResult {
        files_discovered: files.len(),
        ..Default::default()
    };
    if files.is_empty() {
        info!(
            "no files matched pattern '{}' under {}; index is empty",
            pattern,
            manuals_dir.display()
        );
        return Ok(result);
    }

    let chunker = Chunker::new(chunking);
    for path in &files {
        let document = match load_document(path) {
            Ok(document) => document,
            Err(err) => {
                warn!("skipping {}: {err}", path.display());
                result.failures.push(IngestFailure {
                    file: file_name(path),
                    reason: err.to_string(),
                });
                continue;
            }
        };
        let chunks = chunker.chunk_document(&document);
        if chunks.is_empty() {
            warn!("no usable text in {}", path.display());
            result.failures.push(IngestFailure {
                file: file_name(path),
                reason: "no extractable text".to_string(),
            });
            continue;
        }
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        // Embedding backend failure is systemic, not a per-file problem.
        let vectors = embeddings
            .embed_batch(&texts)
            .with_context(|| format!("embedding failed while indexing {}", path.display()))?;
        let document_id = store.add_document(
            &document.source_file,
            &document.model_tag,
            document.total_pages,
        )?;
        let inserts: Vec<ChunkInsert> = chunks
            .iter()
            .zip(vectors.into_iter())
            .map(|(chunk, embedding)| ChunkInsert {
                page: chunk.page_number,
                ordinal: chunk.ordinal,
                text: chunk.text.clone(),
                embedding,
            })
            .collect();
        let inserted = store.add_chunks(document_id, &inserts)?;
        info!(
            "indexed {} chunks from {}",
            inserted,
            document.source_file
        );
        result.files_processed += 1;
        result.chunks_indexed += inserted;
    }

    if result.chunks_indexed == 0 {
        return Err(anyhow!(format!(
            "no chunks produced from {} file(s); extraction is failing across the board",
            result.files_discovered
        )));
    }
    Ok(result)
}

/// Post-ingest sanity check: retrieve the top chunk for a generic question.
pub fn validation_probe(
    store: &IndexStore,
    embeddings: &EmbeddingClient,
    question: &str,
) -> Result<Option<ScoredChunk>> {
    let query_embedding = embeddings.embed(question)?;
    let mut hits = store.search(&query_embedding, 1)?;
    Ok(hits.pop())
}

fn discover_files(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let patterns = build_patterns(pattern)?;
    let mut files = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or_else(|_| entry.path());
        let rel_norm = rel.to_string_lossy().replace('\\', "/").to_lowercase();
        if !patterns.is_empty() && !patterns.iter().any(|pat| pat.matches(&rel_norm)) {
            continue;
        }
        files.push(entry.path().to_path_buf());
    }
    files.sort();
    Ok(files)
}

fn build_patterns(pattern: &str) -> Result<Vec<Pattern>> {
    let mut patterns = Vec::new();
    for raw in pattern.split(',') {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let normalized = if trimmed.contains('/') {
            trimmed.to_lowercase()
        } else {
            format!("**/{}", trimmed.to_lowercase())
        };
        patterns.push(Pattern::new(&normalized).map_err(|e| anyhow!(e.msg))?);
    }
    Ok(patterns)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string()
}
