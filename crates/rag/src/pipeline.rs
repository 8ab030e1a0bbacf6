use thiserror::Error;

use manualqa_llm::{LlmClient, LlmRequest, CONTEXT_END, CONTEXT_START};

use crate::adherence;
use crate::embedding::EmbeddingClient;
use crate::store::{IndexStore, ScoredChunk};

/// One failure per pipeline stage; any failure aborts the remaining stages
/// and no partial answer is returned.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("question must not be empty")]
    Validation,
    #[error("failed to embed the question: {0}")]
    Embedding(#[source] anyhow::Error),
    #[error("failed to search the index: {0}")]
    Retrieval(#[source] anyhow::Error),
    #[error("answer generation failed: {0}")]
    Generation(#[source] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct Citation {
    pub source_file: String,
    pub model_tag: String,
    pub page: i64,
    pub snippet: String,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<Citation>,
    pub adherence_score: f32,
}

/// Stateless per question: embed, retrieve, generate, score.
pub fn answer_question(
    store: &IndexStore,
    embeddings: &EmbeddingClient,
    llm: &LlmClient,
    question: &str,
    top_k: usize,
) -> Result<RagAnswer, QueryError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(QueryError::Validation);
    }
    let query_embedding = embeddings.embed(question).map_err(QueryError::Embedding)?;
    let chunks = store
        .search(&query_embedding, top_k)
        .map_err(QueryError::Retrieval)?;
    let prompt = build_prompt(question, &chunks);
    let response = llm
        .chat_blocking(&LlmRequest {
            system: None,
            user: prompt,
        })
        .map_err(QueryError::Generation)?;
    let context_texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
    let adherence_score = adherence::score(&response.content, &context_texts);
    let sources = chunks
        .iter()
        .map(|chunk| Citation {
            source_file: chunk.source_file.clone(),
            model_tag: chunk.model_tag.clone(),
            page: chunk.page,
            snippet: chunk.text.clone(),
            score: chunk.score,
        })
        .collect();
    Ok(RagAnswer {
        answer: response.content,
        sources,
        adherence_score,
    })
}

fn build_prompt(question: &str, chunks: &[ScoredChunk]) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "Use the manual excerpts below to answer the question at the end. \
         If the excerpts do not contain the answer, say that you do not know \
         instead of guessing.\n\n",
    );
    prompt.push_str(CONTEXT_START);
    prompt.push('\n');
    for chunk in chunks {
        prompt.push_str(&format!(
            "[DOC: {}, page {}]\n{}\n\n",
            chunk.source_file, chunk.page, chunk.text
        ));
    }
    prompt.push_str(CONTEXT_END);
    prompt.push_str(&format!("\n\nQuestion: {question}\nAnswer:"));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    use manualqa_llm::LlmProvider;

    use crate::store::ChunkInsert;

    fn local_llm() -> LlmClient {
        LlmClient::new(LlmProvider::Local, "local", Duration::from_secs(5)).unwrap()
    }

    fn seeded_store(dir: &tempfile::TempDir, embeddings: &EmbeddingClient) -> IndexStore {
        let store = IndexStore::open(dir.path().join("index.sqlite")).unwrap();
        store.rebuild(&embeddings.model_label()).unwrap();
        let text = "Tire pressure should be 32 PSI front and 36 PSI rear.";
        let doc_id = store.add_document("SV650_Manual.pdf", "SV650", 1).unwrap();
        store
            .add_chunks(
                doc_id,
                &[ChunkInsert {
                    page: 1,
                    ordinal: 0,
                    text: text.to_string(),
                    embedding: embeddings.embed(text).unwrap(),
                }],
            )
            .unwrap();
        store
    }

    #[test]
    fn empty_question_is_rejected_before_any_lookup() {
        let dir = tempdir().unwrap();
        let embeddings = EmbeddingClient::hash(32);
        let store = IndexStore::open(dir.path().join("index.sqlite")).unwrap();
        let result = answer_question(&store, &embeddings, &local_llm(), "   ", 4);
        assert!(matches!(result, Err(QueryError::Validation)));
    }

    #[test]
    fn answer_cites_only_retrieved_chunks() {
        let dir = tempdir().unwrap();
        let embeddings = EmbeddingClient::hash(64);
        let store = seeded_store(&dir, &embeddings);

        let answer = answer_question(
            &store,
            &embeddings,
            &local_llm(),
            "What is the recommended tire pressure?",
            4,
        )
        .unwrap();

        assert!(answer.answer.contains("32 PSI"));
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].source_file, "SV650_Manual.pdf");
        assert_eq!(answer.sources[0].page, 1);
        assert!(answer.adherence_score > 0.0);
    }

    #[test]
    fn empty_index_yields_answer_with_no_sources_and_zero_score() {
        let dir = tempdir().unwrap();
        let embeddings = EmbeddingClient::hash(32);
        let store = IndexStore::open(dir.path().join("index.sqlite")).unwrap();

        let answer = answer_question(&store, &embeddings, &local_llm(), "anything?", 4).unwrap();
        assert!(answer.sources.is_empty());
        assert_eq!(answer.adherence_score, 0.0);
    }

    #[test]
    fn prompt_tags_each_chunk_with_source_and_page() {
        let chunks = vec![ScoredChunk {
            chunk_id: 1,
            source_file: "CB500_Manual.pdf".to_string(),
            model_tag: "CB500".to_string(),
            page: 12,
            ordinal: 0,
            text: "Chain slack: 20-30 mm.".to_string(),
            score: 0.9,
        }];
        let prompt = build_prompt("How much chain slack?", &chunks);
        assert!(prompt.contains("[DOC: CB500_Manual.pdf, page 12]"));
        assert!(prompt.contains(CONTEXT_START));
        assert!(prompt.contains(CONTEXT_END));
        assert!(prompt.ends_with("Question: How much chain slack?\nAnswer:"));
    }
}
