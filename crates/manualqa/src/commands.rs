use std::path::PathBuf;

use anyhow::{anyhow, Result};

use manualqa_rag::{
    answer_question, ingest_directory, validation_probe, IndexStore, RagConfig,
};

use crate::logging;

const VALIDATION_QUESTION: &str = "How do I adjust chain slack?";

pub fn ingest(manuals: Option<String>, index: Option<String>, pattern: String) -> Result<()> {
    let mut config = RagConfig::from_env()?;
    if let Some(dir) = manuals {
        config.manuals_dir = PathBuf::from(dir);
    }
    if let Some(dir) = index {
        config.index_dir = PathBuf::from(dir);
    }
    std::fs::create_dir_all(&config.index_dir)?;
    let store = IndexStore::open(config.index_db())?;
    let embeddings = config.embedding_client()?;
    logging::stage(
        "ingest",
        format!(
            "rebuilding index at {} from {}",
            config.index_db().display(),
            config.manuals_dir.display()
        ),
    );
    let result = ingest_directory(
        &store,
        &embeddings,
        &config.manuals_dir,
        &pattern,
        config.chunking,
    )?;
    logging::stage(
        "ingest",
        format!(
            "{} of {} files indexed, {} chunks total",
            result.files_processed, result.files_discovered, result.chunks_indexed
        ),
    );
    for failure in &result.failures {
        logging::stage("ingest", format!("skipped {}: {}", failure.file, failure.reason));
    }
    if result.chunks_indexed == 0 {
        return Ok(());
    }

    logging::stage("validate", format!("test query: '{VALIDATION_QUESTION}'"));
    match validation_probe(&store, &embeddings, VALIDATION_QUESTION)? {
        Some(hit) => {
            let preview: String = hit.text.chars().take(200).collect();
            logging::stage(
                "validate",
                format!("top hit: {} page {}", hit.source_file, hit.page),
            );
            logging::verbose(format!("top hit preview: {}", preview.replace('\n', " ")));
        }
        None => logging::stage("validate", "query returned no results; index may be empty"),
    }
    Ok(())
}

pub fn ask(question: String, top_k: Option<usize>) -> Result<()> {
    let config = RagConfig::from_env()?;
    let store = open_existing_index(&config)?;
    let embeddings = config.embedding_client()?;
    let llm = config.llm_client()?;
    let k = top_k.unwrap_or(config.top_k);
    let answer = answer_question(&store, &embeddings, &llm, &question, k)?;
    println!("{}", answer.answer);
    println!();
    println!(
        "context adherence: {:.0}%",
        answer.adherence_score * 100.0
    );
    for source in &answer.sources {
        let preview: String = source.snippet.chars().take(120).collect();
        println!(
            "  [{} page {}] {}",
            source.source_file,
            source.page,
            preview.replace('\n', " ")
        );
    }
    Ok(())
}

pub fn sources(index: Option<String>) -> Result<()> {
    let mut config = RagConfig::from_env()?;
    if let Some(dir) = index {
        config.index_dir = PathBuf::from(dir);
    }
    let store = open_existing_index(&config)?;
    for file in store.sources()? {
        println!("{file}");
    }
    Ok(())
}

fn open_existing_index(config: &RagConfig) -> Result<IndexStore> {
    let db = config.index_db();
    if !db.exists() {
        return Err(anyhow!(format!(
            "index {} not found; run `manualqa ingest` first",
            db.display()
        )));
    }
    IndexStore::open(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    use manualqa_rag::LlmProvider;

    fn config_with_index(index_dir: std::path::PathBuf) -> RagConfig {
        RagConfig {
            llm_provider: LlmProvider::Local,
            llm_model: "local".to_string(),
            llm_timeout: Duration::from_secs(5),
            embedding_provider: "hash".to_string(),
            embedding_model: String::new(),
            hash_dimensions: 16,
            chunking: Default::default(),
            top_k: 4,
            manuals_dir: std::path::PathBuf::from("manuals"),
            index_dir,
            bind_addr: "127.0.0.1:0".to_string(),
        }
    }

    #[test]
    fn asking_without_an_index_points_at_ingest() {
        let dir = tempdir().unwrap();
        let config = config_with_index(dir.path().join("missing"));
        let err = open_existing_index(&config).unwrap_err();
        assert!(err.to_string().contains("manualqa ingest"));
    }

    #[test]
    fn existing_index_opens() {
        let dir = tempdir().unwrap();
        let config = config_with_index(dir.path().to_path_buf());
        IndexStore::open(config.index_db()).unwrap();
        assert!(open_existing_index(&config).is_ok());
    }
}
