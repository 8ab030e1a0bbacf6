use anyhow::{anyhow, Result};
use bytemuck::{cast_slice, try_cast_slice};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

const META_EMBEDDING_MODEL: &str = "embedding_model";

/// SQLite-backed vector index. Written once per ingestion run, read-only
/// afterwards; concurrent readers need no coordination.
#[derive(Clone, Debug)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        store.init()?;
        Ok(store)
    }

    fn connection(&self) -> Result<Connection> {
        Ok(Connection::open(&self.path)?)
    }

    pub fn init(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_file TEXT NOT NULL,
                model_tag TEXT NOT NULL,
                page_count INTEGER NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL,
                page INTEGER NOT NULL,
                ordinal INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                FOREIGN KEY(document_id) REFERENCES documents(id)
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);
            "#,
        )?;
        Ok(())
    }

    /// Clear all index contents at the start of a full rebuild and record
    /// which embedding model the new contents will come from.
    pub fn rebuild(&self, embedding_model: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch("DELETE FROM chunks; DELETE FROM documents;")?;
        conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![META_EMBEDDING_MODEL, embedding_model],
        )?;
        Ok(())
    }

    pub fn embedding_model(&self) -> Result<Option<String>> {
        let conn = self.connection()?;
        let value = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                [META_EMBEDDING_MODEL],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn add_document(
        &self,
        source_file: &str,
        model_tag: &str,
        page_count: u32,
    ) -> Result<i64> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO documents (source_file, model_tag, page_count) VALUES (?1, ?2, ?3)",
            params![source_file, model_tag, page_count],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn add_chunks(&self, document_id: i64, chunks: &[ChunkInsert]) -> Result<usize> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        for chunk in chunks {
            let embedding_blob = cast_slice::<f32, u8>(&chunk.embedding);
            tx.execute(
                "INSERT INTO chunks (document_id, page, ordinal, text, embedding) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    document_id,
                    chunk.page,
                    chunk.ordinal,
                    chunk.text,
                    embedding_blob
                ],
            )?;
        }
        tx.commit()?;
        Ok(chunks.len())
    }

    /// Top-k chunks by cosine similarity, descending. The scan walks chunks
    /// in rowid order and the sort is stable, so ties keep insertion order.
    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                chunks.id,
                documents.source_file,
                documents.model_tag,
                chunks.page,
                chunks.ordinal,
                chunks.text,
                chunks.embedding
            FROM chunks
            JOIN documents ON chunks.document_id = documents.id
            ORDER BY chunks.id
            "#,
        )?;
        let mut rows = stmt.query([])?;
        let mut hits = Vec::new();
        while let Some(row) = rows.next()? {
            let embedding_blob: Vec<u8> = row.get(6)?;
            let embedding: &[f32] =
                try_cast_slice(&embedding_blob).map_err(|_| anyhow!("invalid embedding blob"))?;
            let score = cosine_similarity(query_embedding, embedding);
            hits.push(ScoredChunk {
                chunk_id: row.get(0)?,
                source_file: row.get(1)?,
                model_tag: row.get(2)?,
                page: row.get(3)?,
                ordinal: row.get(4)?,
                text: row.get(5)?,
                score,
            });
        }
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if hits.len() > top_k {
            hits.truncate(top_k);
        }
        Ok(hits)
    }

    /// Distinct manual filenames as of the last ingestion run.
    pub fn sources(&self) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT source_file FROM documents ORDER BY source_file")?;
        let files = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(files)
    }

    pub fn chunk_count(&self) -> Result<u64> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[derive(Debug, Clone)]
pub struct ChunkInsert {
    pub page: u32,
    pub ordinal: u32,
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk_id: i64,
    pub source_file: String,
    pub model_tag: String,
    pub page: i64,
    pub ordinal: i64,
    pub text: String,
    pub score: f32,
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut a_norm = 0.0f32;
    let mut b_norm = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        a_norm += x * x;
        b_norm += y * y;
    }
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    dot / (a_norm.sqrt() * b_norm.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_store(dir: &tempfile::TempDir) -> IndexStore {
        IndexStore::open(dir.path().join("index.sqlite")).unwrap()
    }

    fn insert(store: &IndexStore, file: &str, page: u32, text: &str, embedding: Vec<f32>) {
        let doc_id = store.add_document(file, "TEST", page).unwrap();
        store
            .add_chunks(
                doc_id,
                &[ChunkInsert {
                    page,
                    ordinal: 0,
                    text: text.to_string(),
                    embedding,
                }],
            )
            .unwrap();
    }

    #[test]
    fn search_orders_by_similarity_and_truncates() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store.rebuild("hash-3").unwrap();
        insert(&store, "a.pdf", 1, "far", vec![0.0, 1.0, 0.0]);
        insert(&store, "b.pdf", 2, "near", vec![1.0, 0.0, 0.0]);
        insert(&store, "c.pdf", 3, "middling", vec![0.7, 0.7, 0.0]);

        let hits = store.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source_file, "b.pdf");
        assert_eq!(hits[1].source_file, "c.pdf");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn search_breaks_ties_by_insertion_order() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store.rebuild("hash-2").unwrap();
        insert(&store, "first.pdf", 1, "same", vec![1.0, 0.0]);
        insert(&store, "second.pdf", 1, "same", vec![1.0, 0.0]);

        let hits = store.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].source_file, "first.pdf");
        assert_eq!(hits[1].source_file, "second.pdf");
    }

    #[test]
    fn empty_index_returns_empty_result() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let hits = store.search(&[1.0, 0.0], 4).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn rebuild_clears_previous_contents() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store.rebuild("hash-2").unwrap();
        insert(&store, "old.pdf", 1, "stale", vec![1.0, 0.0]);
        assert_eq!(store.chunk_count().unwrap(), 1);

        store.rebuild("hash-2").unwrap();
        assert_eq!(store.chunk_count().unwrap(), 0);
        assert!(store.sources().unwrap().is_empty());
        assert_eq!(store.embedding_model().unwrap().as_deref(), Some("hash-2"));
    }

    #[test]
    fn sources_lists_distinct_files_sorted() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store.rebuild("hash-2").unwrap();
        insert(&store, "z.pdf", 1, "one", vec![1.0, 0.0]);
        insert(&store, "a.pdf", 1, "two", vec![0.0, 1.0]);
        insert(&store, "a.pdf", 2, "three", vec![0.5, 0.5]);

        assert_eq!(
            store.sources().unwrap(),
            vec!["a.pdf".to_string(), "z.pdf".to_string()]
        );
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
