//! Loads card JSON files into a collection.
//!
//! Each file holds an array of flat card objects, e.g.
//! `[{"code": "W1-001", "name": "...", "color": "Red", "triggers": ["Soul"]}]`.

use crate::traits::{CardCollection, Metadata, NewCard, TextEncoder};
use anyhow::{anyhow, bail};
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

/// Cards embedded and written per batch.
pub const INGEST_BATCH_SIZE: usize = 64;

/// Fields joined into the indexed document when a card has no `document` key.
const DOCUMENT_FIELDS: [&str; 3] = ["name", "abilities", "flavor_text"];

#[derive(Debug, Default)]
pub struct IngestionResult {
    pub indexed_count: usize,
    pub file_count: usize,
    pub failed_files: Vec<String>,
    pub total_document_count: i64,
}

impl IngestionResult {
    fn add_failure(&mut self, file_path: &Path, error: &anyhow::Error) {
        self.failed_files
            .push(format!("{}: {:#}", file_path.to_string_lossy(), error));
        warn!("Failed to process file {:?}: {:#}", file_path, error);
    }
}

fn metadata_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(metadata_value)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

/// Splits a raw card object into id, document text and string metadata.
///
/// The id comes from `id`, falling back to `code`. The document comes from
/// `document`, falling back to the non-empty name, abilities and flavor text.
pub fn parse_card(mut card: Map<String, Value>) -> anyhow::Result<(String, String, Metadata)> {
    let explicit_id = card.remove("id").as_ref().and_then(metadata_value);
    let explicit_document = card.remove("document").as_ref().and_then(metadata_value);

    let metadata: Metadata = card
        .iter()
        .filter_map(|(key, value)| metadata_value(value).map(|v| (key.clone(), v)))
        .collect();

    let id = match explicit_id.or_else(|| metadata.get("code").cloned()) {
        Some(id) if !id.trim().is_empty() => id,
        _ => bail!("card has neither an 'id' nor a 'code'"),
    };

    let document = explicit_document.unwrap_or_else(|| {
        DOCUMENT_FIELDS
            .iter()
            .filter_map(|field| metadata.get(*field))
            .filter(|value| !value.trim().is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n")
    });

    Ok((id, document, metadata))
}

/// Embeds cards from JSON files and upserts them into a collection.
pub struct CardIngestor {
    collection: Arc<dyn CardCollection>,
    encoder: Arc<dyn TextEncoder>,
}

impl CardIngestor {
    pub fn new(collection: Arc<dyn CardCollection>, encoder: Arc<dyn TextEncoder>) -> Self {
        CardIngestor {
            collection,
            encoder,
        }
    }

    /// Ingests one JSON file, or every `.json` file directly inside a directory.
    /// A file that fails is recorded and the rest continue.
    pub fn ingest(&self, path: &Path) -> anyhow::Result<IngestionResult> {
        if !path.exists() {
            bail!("Path {:?} does not exist", path);
        }
        info!("Starting ingestion with path: {:?}", path);

        let files: Vec<_> = if path.is_dir() {
            let mut files: Vec<_> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|file_path| {
                    file_path.is_file()
                        && file_path.extension().and_then(|s| s.to_str()) == Some("json")
                })
                .collect();
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        let mut result = IngestionResult::default();
        let total_files = files.len();
        for (index, file_path) in files.iter().enumerate() {
            info!(
                "Processing file {} of {}: {}",
                index + 1,
                total_files,
                file_path.display()
            );
            match self.process_json_file(file_path) {
                Ok(count) => {
                    result.file_count += 1;
                    result.indexed_count += count;
                    debug!("Indexed {} cards from {:?}", count, file_path);
                }
                Err(e) => result.add_failure(file_path, &e),
            }
        }

        result.total_document_count = self.collection.count()?;
        info!(
            "Ingestion finished: {} cards from {} files, {} failed files",
            result.indexed_count,
            result.file_count,
            result.failed_files.len()
        );
        Ok(result)
    }

    fn process_json_file(&self, file_path: &Path) -> anyhow::Result<usize> {
        let data = std::fs::read_to_string(file_path)?;
        let raw: Vec<Map<String, Value>> = serde_json::from_str(&data)
            .map_err(|e| anyhow!("Expected a JSON array of card objects: {}", e))?;

        let parsed = raw
            .into_iter()
            .enumerate()
            .map(|(i, card)| parse_card(card).map_err(|e| anyhow!("card #{}: {}", i, e)))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut written = 0;
        for chunk in parsed.chunks(INGEST_BATCH_SIZE) {
            let documents: Vec<&str> = chunk.iter().map(|(_, doc, _)| doc.as_str()).collect();
            let embeddings = self.encoder.encode_batch(&documents)?;
            if embeddings.len() != chunk.len() {
                bail!(
                    "Encoder returned {} embeddings for {} cards",
                    embeddings.len(),
                    chunk.len()
                );
            }
            let cards: Vec<NewCard> = chunk
                .iter()
                .zip(embeddings)
                .map(|((id, document, metadata), embedding)| NewCard {
                    id: id.clone(),
                    document: document.clone(),
                    metadata: metadata.clone(),
                    embedding,
                })
                .collect();
            written += self.collection.upsert(&cards)?;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::SqliteCardCollection;
    use crate::traits::{GetRequest, Include};
    use serde_json::json;
    use tempfile::TempDir;

    struct LengthEncoder;

    impl TextEncoder for LengthEncoder {
        fn encode(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {}", other),
        }
    }

    #[test]
    fn test_parse_card_uses_code_and_builds_document() {
        let (id, document, metadata) = parse_card(as_map(json!({
            "code": "W1-001",
            "name": "Alpha",
            "abilities": "Counter",
            "flavor_text": "",
            "level": 2,
            "triggers": ["Soul", "Draw"],
            "image": null
        })))
        .unwrap();
        assert_eq!(id, "W1-001");
        assert_eq!(document, "Alpha\nCounter");
        assert_eq!(metadata["level"], "2");
        assert_eq!(metadata["triggers"], "Soul, Draw");
        assert_eq!(metadata["code"], "W1-001");
        assert!(!metadata.contains_key("image"));
    }

    #[test]
    fn test_parse_card_explicit_id_and_document() {
        let (id, document, metadata) = parse_card(as_map(json!({
            "id": "x1",
            "document": "indexed text",
            "code": "W1-002"
        })))
        .unwrap();
        assert_eq!(id, "x1");
        assert_eq!(document, "indexed text");
        assert!(!metadata.contains_key("id"));
        assert!(!metadata.contains_key("document"));
    }

    #[test]
    fn test_parse_card_without_id_fails() {
        assert!(parse_card(as_map(json!({"name": "Nameless"}))).is_err());
    }

    #[test]
    fn test_ingest_directory() {
        let data_dir = TempDir::new().unwrap();
        std::fs::write(
            data_dir.path().join("set1.json"),
            json!([
                {"code": "A-1", "name": "One", "set_name": "Booster1"},
                {"code": "A-2", "name": "Two", "set_name": "Booster1"}
            ])
            .to_string(),
        )
        .unwrap();
        std::fs::write(
            data_dir.path().join("set2.json"),
            json!([{"code": "B-1", "name": "Three", "set_name": "Booster2"}]).to_string(),
        )
        .unwrap();
        std::fs::write(data_dir.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(data_dir.path().join("notes.txt"), "ignored").unwrap();

        let store_dir = TempDir::new().unwrap();
        let collection: Arc<dyn CardCollection> =
            Arc::new(SqliteCardCollection::open_or_create(store_dir.path(), "cards").unwrap());
        let ingestor = CardIngestor::new(collection.clone(), Arc::new(LengthEncoder));

        let result = ingestor.ingest(data_dir.path()).unwrap();
        assert_eq!(result.indexed_count, 3);
        assert_eq!(result.file_count, 2);
        assert_eq!(result.failed_files.len(), 1);
        assert!(result.failed_files[0].contains("broken.json"));
        assert_eq!(result.total_document_count, 3);

        let records = collection
            .get(&GetRequest {
                include: vec![Include::Documents, Include::Metadatas],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(records[0].id, "A-1");
        assert_eq!(records[0].document.as_deref(), Some("One"));

        // Re-ingesting replaces instead of duplicating.
        ingestor.ingest(&data_dir.path().join("set1.json")).unwrap();
        assert_eq!(collection.count().unwrap(), 3);
    }

    #[test]
    fn test_ingest_missing_path_fails() {
        let store_dir = TempDir::new().unwrap();
        let collection =
            Arc::new(SqliteCardCollection::open_or_create(store_dir.path(), "cards").unwrap());
        let ingestor = CardIngestor::new(collection, Arc::new(LengthEncoder));
        assert!(ingestor.ingest(Path::new("/definitely/not/here")).is_err());
    }
}
