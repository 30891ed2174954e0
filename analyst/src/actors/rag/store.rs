//! Filing chunk store.
//!
//! One SQLite table, `filing_chunks`, holds the split filing. Every chunk is
//! keyed by `chunk_hash` (SHA-256 hex of content), so re-ingesting the same
//! filing is a no-op. Retrieval is lexical: query-token overlap plus a bonus
//! when the whole query phrase occurs in the chunk.

use rusqlite::OptionalExtension;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Thin wrapper around a rusqlite Connection.
///
/// All methods are synchronous. Async callers go through `spawn_blocking`.
pub struct FilingStore {
    conn: rusqlite::Connection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkHit {
    pub rowid: i64,
    pub source_ref: String,
    pub chunk_index: i64,
    pub content: String,
    /// Normalized lexical relevance in [0, 1].
    pub relevance: f64,
}

impl FilingStore {
    /// Open (or create) the store at the given SQLite path.
    /// Use `":memory:"` for an in-process store.
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = if path == ":memory:" {
            rusqlite::Connection::open_in_memory()?
        } else {
            let conn = rusqlite::Connection::open(path)?;
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
            conn
        };

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS filing_chunks (
                rowid INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id TEXT NOT NULL UNIQUE,
                source_ref TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                chunk_hash TEXT NOT NULL UNIQUE
            );
            "#,
        )?;

        Ok(FilingStore { conn })
    }

    pub fn hash_exists(&self, chunk_hash: &str) -> Result<bool, rusqlite::Error> {
        hash_exists(&self.conn, chunk_hash)
    }

    /// Insert every chunk not already present. Returns how many were added.
    ///
    /// Runs in one transaction: a failure part way leaves the store as it was.
    pub fn ingest_chunks(
        &mut self,
        source_ref: &str,
        chunks: &[String],
    ) -> Result<usize, rusqlite::Error> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        for (idx, content) in chunks.iter().enumerate() {
            let hash = chunk_hash(content);
            if hash_exists(&tx, &hash)? {
                continue;
            }
            insert_chunk(&tx, source_ref, idx, content, &hash)?;
            inserted += 1;
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn count(&self) -> Result<usize, rusqlite::Error> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM filing_chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Lexical search: up to `k` chunks with non-zero relevance, best first.
    /// Ties keep document order.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<ChunkHit>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT rowid, source_ref, chunk_index, content FROM filing_chunks")?;
        let mut hits = stmt
            .query_map([], |row| {
                Ok(ChunkHit {
                    rowid: row.get(0)?,
                    source_ref: row.get(1)?,
                    chunk_index: row.get(2)?,
                    content: row.get(3)?,
                    relevance: 0.0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for hit in &mut hits {
            hit.relevance = lexical_relevance(query, &hit.content);
        }
        hits.retain(|hit| hit.relevance > 0.0);
        hits.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.rowid.cmp(&b.rowid))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

fn hash_exists(conn: &rusqlite::Connection, chunk_hash: &str) -> Result<bool, rusqlite::Error> {
    conn.query_row(
        "SELECT 1 FROM filing_chunks WHERE chunk_hash = ? LIMIT 1",
        rusqlite::params![chunk_hash],
        |_| Ok(()),
    )
    .optional()
    .map(|row| row.is_some())
}

fn insert_chunk(
    conn: &rusqlite::Connection,
    source_ref: &str,
    chunk_index: usize,
    content: &str,
    chunk_hash: &str,
) -> Result<(), rusqlite::Error> {
    let item_id = ulid::Ulid::new().to_string();
    conn.execute(
        "INSERT INTO filing_chunks(item_id, source_ref, chunk_index, content, chunk_hash) \
         VALUES (?, ?, ?, ?, ?)",
        rusqlite::params![item_id, source_ref, chunk_index as i64, content, chunk_hash],
    )?;
    Ok(())
}

/// Compute a hex SHA-256 hash for dedup keying.
pub fn chunk_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Compute a lightweight lexical relevance score in [0, 1].
fn lexical_relevance(query: &str, content: &str) -> f64 {
    let query_tokens = tokenize(query);
    if query_tokens.is_empty() {
        return 0.0;
    }

    let content_tokens = tokenize(content);
    let overlap = query_tokens.intersection(&content_tokens).count() as f64;
    let mut score = overlap / query_tokens.len() as f64;

    let q = query.trim().to_ascii_lowercase();
    if !q.is_empty() && content.to_ascii_lowercase().contains(&q) {
        score += 0.2;
    }

    score.clamp(0.0, 1.0)
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_ingest_deduplicates_by_hash() {
        let mut store = FilingStore::open(":memory:").unwrap();
        let filing = chunks(&["Net sales were $383 billion.", "Risk factors include supply."]);

        assert_eq!(store.ingest_chunks("10k", &filing).unwrap(), 2);
        assert_eq!(store.ingest_chunks("10k", &filing).unwrap(), 0);
        assert_eq!(store.count().unwrap(), 2);
        assert!(store
            .hash_exists(&chunk_hash("Net sales were $383 billion."))
            .unwrap());
        assert!(!store.hash_exists(&chunk_hash("never ingested")).unwrap());
    }

    #[test]
    fn test_failed_ingest_rolls_back_whole_batch() {
        let mut store = FilingStore::open(":memory:").unwrap();
        store
            .conn
            .execute_batch(
                "CREATE TRIGGER reject_poison BEFORE INSERT ON filing_chunks \
                 WHEN NEW.content = 'poison' BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let filing = chunks(&["Net sales were $383 billion.", "poison"]);
        assert!(store.ingest_chunks("10k", &filing).is_err());
        assert_eq!(store.count().unwrap(), 0);

        let retry = chunks(&["Net sales were $383 billion."]);
        assert_eq!(store.ingest_chunks("10k", &retry).unwrap(), 1);
    }

    #[test]
    fn test_hash_lookup_surfaces_sqlite_errors() {
        let store = FilingStore::open(":memory:").unwrap();
        store.conn.execute_batch("DROP TABLE filing_chunks;").unwrap();
        assert!(store.hash_exists(&chunk_hash("anything")).is_err());
    }

    #[test]
    fn test_search_ranks_by_overlap_and_drops_unrelated() {
        let mut store = FilingStore::open(":memory:").unwrap();
        store
            .ingest_chunks(
                "10k",
                &chunks(&[
                    "The Company designs smartphones.",
                    "Total net sales increased; services net sales grew.",
                    "Gross margin for services was 70 percent.",
                ]),
            )
            .unwrap();

        let hits = store.search("services net sales", 4).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_index, 1);
        assert!(hits[0].relevance > hits[1].relevance);
        assert!(hits.iter().all(|h| h.chunk_index != 0));
    }

    #[test]
    fn test_search_truncates_to_k() {
        let mut store = FilingStore::open(":memory:").unwrap();
        let filing: Vec<String> = (0..10).map(|i| format!("revenue line {i}")).collect();
        store.ingest_chunks("10k", &filing).unwrap();

        let hits = store.search("revenue", 4).unwrap();
        assert_eq!(hits.len(), 4);
        assert_eq!(
            hits.iter().map(|h| h.chunk_index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }

    #[test]
    fn test_lexical_relevance_phrase_bonus_and_clamp() {
        assert_eq!(lexical_relevance("", "anything"), 0.0);
        assert_eq!(lexical_relevance("net sales", "net sales rose"), 1.0);
        let partial = lexical_relevance("net sales", "sales, net of returns");
        assert!((partial - 1.0).abs() < f64::EPSILON);
        let half = lexical_relevance("gross margin", "margin only");
        assert!((half - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filing.db");
        let path = path.to_str().unwrap();
        {
            let mut store = FilingStore::open(path).unwrap();
            store.ingest_chunks("10k", &chunks(&["persisted chunk"])).unwrap();
        }
        let reopened = FilingStore::open(path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }
}
