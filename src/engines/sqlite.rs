use crate::filter::Where;
use crate::traits::{
    CardCollection, CardRecord, GetRequest, Include, Metadata, NewCard, QueryRequest,
};
use anyhow::{anyhow, bail};
use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use std::path::{Path, PathBuf};

/// File name of the database inside the persist directory.
pub const DB_FILE_NAME: &str = "cards.sqlite3";

/// Card collection persisted in a SQLite file.
///
/// Several named collections can share one database file. Metadata is stored
/// as JSON and filtered with `json_extract`; embeddings are little-endian
/// `f32` blobs scored by brute-force cosine distance.
pub struct SqliteCardCollection {
    db_path: PathBuf,
    name: String,
    conn: Mutex<Connection>,
}

impl SqliteCardCollection {
    /// Opens the collection `name` under `persist_dir`, creating the directory,
    /// the tables and the collection entry when missing.
    pub fn open_or_create(persist_dir: &Path, name: &str) -> anyhow::Result<Self> {
        std::fs::create_dir_all(persist_dir)
            .map_err(|e| anyhow!("Failed to create persist directory {:?}: {}", persist_dir, e))?;
        let db_path = persist_dir.join(DB_FILE_NAME);
        info!("Opening card collection '{}' at {:?}", name, db_path);

        let conn =
            Connection::open(&db_path).map_err(|e| anyhow!("Failed to open database: {}", e))?;
        let collection = SqliteCardCollection {
            db_path,
            name: name.to_string(),
            conn: Mutex::new(conn),
        };
        collection.create_tables()?;
        collection.register()?;
        info!("Card collection '{}' ready", name);
        Ok(collection)
    }

    fn create_tables(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS collections (
                    name TEXT PRIMARY KEY,
                    createdAt REAL NOT NULL
                )",
            [],
        )?;
        debug!("Created collections table if it did not exist.");

        conn.execute(
            "CREATE TABLE IF NOT EXISTS records (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    collection TEXT NOT NULL,
                    id TEXT NOT NULL,
                    document TEXT,
                    metadata TEXT NOT NULL,
                    embedding BLOB NOT NULL,
                    UNIQUE(collection, id),
                    FOREIGN KEY(collection) REFERENCES collections(name)
                )",
            [],
        )?;
        debug!("Created records table if it did not exist.");
        Ok(())
    }

    fn register(&self) -> anyhow::Result<()> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        let rows_affected = self
            .conn
            .lock()
            .execute(
                "INSERT OR IGNORE INTO collections (name, createdAt) VALUES (?1, ?2)",
                rusqlite::params![self.name, now],
            )
            .map_err(|e| anyhow!("Failed to register collection: {}", e))?;
        if rows_affected > 0 {
            info!("Created new collection '{}'", self.name);
        }
        Ok(())
    }

    /// `SELECT` over this collection with the filter applied. Returns the SQL and its parameters.
    fn select(&self, columns: &str, filter: Option<&Where>) -> anyhow::Result<(String, Vec<Value>)> {
        let mut sql = format!("SELECT {} FROM records WHERE collection = ?", columns);
        let mut params = vec![Value::Text(self.name.clone())];
        if let Some(filter) = filter {
            sql.push_str(" AND ");
            push_where(filter, &mut sql, &mut params)?;
        }
        Ok((sql, params))
    }
}

/// Appends the SQL condition for `filter` to `sql`, pushing its bound values.
fn push_where(filter: &Where, sql: &mut String, params: &mut Vec<Value>) -> anyhow::Result<()> {
    match filter {
        Where::Eq { field, value } => {
            if field.is_empty()
                || !field
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                bail!("Invalid metadata field name in filter: {:?}", field);
            }
            sql.push_str("json_extract(metadata, ?) = ?");
            params.push(Value::Text(format!("$.\"{}\"", field)));
            params.push(Value::Text(value.clone()));
        }
        Where::And(clauses) => {
            if clauses.len() < 2 {
                bail!(
                    "Expected $and to have at least two operands, got {}",
                    clauses.len()
                );
            }
            sql.push('(');
            for (i, clause) in clauses.iter().enumerate() {
                if i > 0 {
                    sql.push_str(" AND ");
                }
                push_where(clause, sql, params)?;
            }
            sql.push(')');
        }
    }
    Ok(())
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// `1 - cos(a, b)`. Zero vectors are treated as unrelated (distance 1).
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

fn parse_metadata(raw: &str) -> anyhow::Result<Metadata> {
    serde_json::from_str(raw).map_err(|e| anyhow!("Failed to parse stored metadata: {}", e))
}

impl CardCollection for SqliteCardCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, request: &GetRequest) -> anyhow::Result<Vec<CardRecord>> {
        let (mut sql, mut params) = self.select("id, document, metadata", request.filter.as_ref())?;
        sql.push_str(" ORDER BY seq LIMIT ? OFFSET ?");
        // SQLite treats a negative LIMIT as unbounded.
        let limit = match request.limit {
            Some(limit) => i64::try_from(limit)
                .map_err(|_| anyhow!("Limit {} is too large", limit))?,
            None => -1,
        };
        let offset = i64::try_from(request.offset)
            .map_err(|_| anyhow!("Offset {} is too large", request.offset))?;
        params.push(Value::Integer(limit));
        params.push(Value::Integer(offset));

        let with_documents = request.include.contains(&Include::Documents);
        let with_metadata = request.include.contains(&Include::Metadatas);

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| anyhow!("Failed to prepare get query: {}", e))?;
        let rows = stmt
            .query_map(params_from_iter(params), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| anyhow!("Failed to query records: {}", e))?;

        let mut records = Vec::new();
        for row in rows {
            let (id, document, metadata) =
                row.map_err(|e| anyhow!("Failed to read record row: {}", e))?;
            records.push(CardRecord {
                id,
                document: if with_documents { document } else { None },
                metadata: if with_metadata {
                    parse_metadata(&metadata)?
                } else {
                    Metadata::new()
                },
                distance: None,
            });
        }
        debug!(
            "Get on '{}' (limit {:?}, offset {}) returned {} records.",
            self.name,
            request.limit,
            request.offset,
            records.len()
        );
        Ok(records)
    }

    fn query(&self, request: &QueryRequest) -> anyhow::Result<Vec<CardRecord>> {
        let (mut sql, params) = self.select(
            "id, document, metadata, embedding",
            request.filter.as_ref(),
        )?;
        sql.push_str(" ORDER BY seq");

        let with_documents = request.include.contains(&Include::Documents);
        let with_metadata = request.include.contains(&Include::Metadatas);
        let with_distances = request.include.contains(&Include::Distances);

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| anyhow!("Failed to prepare similarity query: {}", e))?;
        let rows = stmt
            .query_map(params_from_iter(params), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })
            .map_err(|e| anyhow!("Failed to query embeddings: {}", e))?;

        let mut scored = Vec::new();
        for row in rows {
            let (id, document, metadata, embedding_bytes) =
                row.map_err(|e| anyhow!("Failed to read embedding row: {}", e))?;
            let embedding = decode_embedding(&embedding_bytes);
            if embedding.len() != request.query_embedding.len() {
                bail!(
                    "Embedding dimension {} does not match collection dimension {} (record '{}')",
                    request.query_embedding.len(),
                    embedding.len(),
                    id
                );
            }
            let distance = cosine_distance(&request.query_embedding, &embedding);
            scored.push((distance, id, document, metadata));
        }

        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(request.n_results);

        let mut records = Vec::with_capacity(scored.len());
        for (distance, id, document, metadata) in scored {
            records.push(CardRecord {
                id,
                document: if with_documents { document } else { None },
                metadata: if with_metadata {
                    parse_metadata(&metadata)?
                } else {
                    Metadata::new()
                },
                distance: with_distances.then_some(distance),
            });
        }
        debug!(
            "Similarity query on '{}' returned {} results.",
            self.name,
            records.len()
        );
        Ok(records)
    }

    /// Inserts cards, replacing any with the same id in place.
    fn upsert(&self, cards: &[NewCard]) -> anyhow::Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| anyhow!("Failed to start transaction: {}", e))?;
        for card in cards {
            let metadata = serde_json::to_string(&card.metadata)
                .map_err(|e| anyhow!("Failed to serialize metadata: {}", e))?;
            tx.execute(
                "INSERT INTO records (collection, id, document, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(collection, id) DO UPDATE SET
                    document = excluded.document,
                    metadata = excluded.metadata,
                    embedding = excluded.embedding",
                rusqlite::params![
                    self.name,
                    card.id,
                    card.document,
                    metadata,
                    encode_embedding(&card.embedding)
                ],
            )
            .map_err(|e| anyhow!("Failed to upsert card '{}': {}", card.id, e))?;
        }
        tx.commit()
            .map_err(|e| anyhow!("Failed to commit upsert: {}", e))?;
        debug!("Upserted {} cards into '{}'", cards.len(), self.name);
        Ok(cards.len())
    }

    fn count(&self) -> anyhow::Result<i64> {
        let count: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1",
            rusqlite::params![self.name],
            |row| row.get(0),
        )?;
        info!("Total cards in '{}': {}", self.name, count);
        Ok(count)
    }

    /// Reopens the database connection to pick up external changes.
    fn refresh(&self) -> anyhow::Result<()> {
        let new_conn = Connection::open(&self.db_path)
            .map_err(|e| anyhow!("Failed to reopen database: {}", e))?;
        let old_conn = std::mem::replace(&mut *self.conn.lock(), new_conn);
        old_conn
            .close()
            .map_err(|e| anyhow!("Failed to close database connection: {}", e.1))?;
        info!("Database connection refreshed for path: {:?}", self.db_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_collection() -> (SqliteCardCollection, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let collection = SqliteCardCollection::open_or_create(temp_dir.path(), "cards")
            .expect("Failed to open test collection");
        (collection, temp_dir)
    }

    fn card(id: &str, fields: &[(&str, &str)], embedding: Vec<f32>) -> NewCard {
        NewCard {
            id: id.to_string(),
            document: format!("document for {}", id),
            metadata: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            embedding,
        }
    }

    fn all() -> Vec<Include> {
        vec![Include::Documents, Include::Metadatas, Include::Distances]
    }

    fn seed(collection: &SqliteCardCollection) {
        collection
            .upsert(&[
                card("a", &[("name", "Alpha"), ("color", "Red"), ("level", "0")], vec![1.0, 0.0]),
                card("b", &[("name", "Beta"), ("color", "Blue"), ("level", "1")], vec![0.0, 1.0]),
                card("c", &[("name", "Gamma"), ("color", "Red"), ("level", "1")], vec![0.7, 0.7]),
            ])
            .unwrap();
    }

    #[test]
    fn test_open_creates_database_file() {
        let (collection, temp_dir) = create_test_collection();
        assert!(temp_dir.path().join(DB_FILE_NAME).exists());
        assert_eq!(collection.name(), "cards");
        assert_eq!(collection.count().unwrap(), 0);
    }

    #[test]
    fn test_reopen_keeps_records() {
        let temp_dir = TempDir::new().unwrap();
        {
            let collection = SqliteCardCollection::open_or_create(temp_dir.path(), "cards").unwrap();
            seed(&collection);
        }
        let reopened = SqliteCardCollection::open_or_create(temp_dir.path(), "cards").unwrap();
        assert_eq!(reopened.count().unwrap(), 3);
    }

    #[test]
    fn test_collections_are_isolated() {
        let (collection, temp_dir) = create_test_collection();
        seed(&collection);
        let other = SqliteCardCollection::open_or_create(temp_dir.path(), "other").unwrap();
        assert_eq!(other.count().unwrap(), 0);
        assert!(other.get(&GetRequest::default()).unwrap().is_empty());
    }

    #[test]
    fn test_get_in_storage_order_with_pagination() {
        let (collection, _temp_dir) = create_test_collection();
        seed(&collection);

        let request = GetRequest {
            limit: Some(2),
            include: vec![Include::Metadatas],
            ..Default::default()
        };
        let first = collection.get(&request).unwrap();
        let ids: Vec<_> = first.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(first.iter().all(|r| r.document.is_none() && r.distance.is_none()));

        let second = collection
            .get(&GetRequest {
                offset: 2,
                ..request.clone()
            })
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, "c");

        let past_end = collection
            .get(&GetRequest {
                offset: 3,
                ..request
            })
            .unwrap();
        assert!(past_end.is_empty());
    }

    #[test]
    fn test_get_with_filters() {
        let (collection, _temp_dir) = create_test_collection();
        seed(&collection);

        let red = collection
            .get(&GetRequest {
                filter: Some(Where::eq("color", "Red")),
                include: all(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(red.len(), 2);
        assert!(red.iter().all(|r| r.metadata["color"] == "Red"));
        assert_eq!(red[0].document.as_deref(), Some("document for a"));

        let red_level_one = collection
            .get(&GetRequest {
                filter: Some(Where::And(vec![
                    Where::eq("color", "Red"),
                    Where::eq("level", "1"),
                ])),
                include: all(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(red_level_one.len(), 1);
        assert_eq!(red_level_one[0].id, "c");

        let missing_field = collection
            .get(&GetRequest {
                filter: Some(Where::eq("triggers", "Soul")),
                ..Default::default()
            })
            .unwrap();
        assert!(missing_field.is_empty());
    }

    #[test]
    fn test_malformed_filters_are_rejected() {
        let (collection, _temp_dir) = create_test_collection();
        seed(&collection);

        let bad_field = collection.get(&GetRequest {
            filter: Some(Where::eq("color') OR 1=1 --", "Red")),
            ..Default::default()
        });
        assert!(bad_field.is_err());

        let single_and = collection.get(&GetRequest {
            filter: Some(Where::And(vec![Where::eq("color", "Red")])),
            ..Default::default()
        });
        assert!(single_and.is_err());
    }

    #[test]
    fn test_oversized_pagination_is_rejected() {
        let (collection, _temp_dir) = create_test_collection();
        seed(&collection);

        let huge_limit = collection.get(&GetRequest {
            limit: Some(usize::MAX),
            ..Default::default()
        });
        assert!(huge_limit.is_err());

        let huge_offset = collection.get(&GetRequest {
            offset: usize::MAX,
            ..Default::default()
        });
        assert!(huge_offset.is_err());
    }

    #[test]
    fn test_query_ranks_by_ascending_distance() {
        let (collection, _temp_dir) = create_test_collection();
        seed(&collection);

        let results = collection
            .query(&QueryRequest {
                query_embedding: vec![1.0, 0.1],
                filter: None,
                n_results: 10,
                include: all(),
            })
            .unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        let distances: Vec<f32> = results.iter().map(|r| r.distance.unwrap()).collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_query_respects_bound_and_filter() {
        let (collection, _temp_dir) = create_test_collection();
        seed(&collection);

        let results = collection
            .query(&QueryRequest {
                query_embedding: vec![0.0, 1.0],
                filter: Some(Where::eq("color", "Red")),
                n_results: 1,
                include: all(),
            })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "c");
    }

    #[test]
    fn test_query_with_nan_embeddings_still_ranks() {
        let (collection, _temp_dir) = create_test_collection();
        seed(&collection);
        collection
            .upsert(&[card("n", &[("name", "Broken")], vec![f32::NAN, 0.0])])
            .unwrap();

        let results = collection
            .query(&QueryRequest {
                query_embedding: vec![1.0, 0.1],
                filter: None,
                n_results: 10,
                include: all(),
            })
            .unwrap();
        assert_eq!(results.len(), 4);
        let finite: Vec<f32> = results
            .iter()
            .filter_map(|r| r.distance)
            .filter(|d| !d.is_nan())
            .collect();
        assert_eq!(finite.len(), 3);
        assert!(finite.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_query_dimension_mismatch_fails() {
        let (collection, _temp_dir) = create_test_collection();
        seed(&collection);

        let result = collection.query(&QueryRequest {
            query_embedding: vec![1.0, 0.0, 0.0],
            filter: None,
            n_results: 5,
            include: all(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let (collection, _temp_dir) = create_test_collection();
        seed(&collection);

        collection
            .upsert(&[card("a", &[("name", "Alpha Prime"), ("color", "Green")], vec![1.0, 0.0])])
            .unwrap();
        assert_eq!(collection.count().unwrap(), 3);

        let records = collection
            .get(&GetRequest {
                include: vec![Include::Metadatas],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(records[0].id, "a");
        assert_eq!(records[0].metadata["name"], "Alpha Prime");
    }

    #[test]
    fn test_refresh_sees_external_writes() {
        let (collection, temp_dir) = create_test_collection();
        seed(&collection);

        let writer = SqliteCardCollection::open_or_create(temp_dir.path(), "cards").unwrap();
        writer
            .upsert(&[card("d", &[("name", "Delta")], vec![0.5, 0.5])])
            .unwrap();

        collection.refresh().unwrap();
        assert_eq!(collection.count().unwrap(), 4);
    }

    #[test]
    fn test_cosine_distance() {
        assert!(cosine_distance(&[1.0, 0.0], &[2.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }
}
