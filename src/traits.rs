use crate::filter::Where;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Card metadata, field name to display string.
pub type Metadata = BTreeMap<String, String>;

/// A card as returned by the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    pub id: String,
    pub document: Option<String>,
    pub metadata: Metadata,
    /// Only set for similarity results. Lower is closer.
    pub distance: Option<f32>,
}

impl CardRecord {
    /// Card name, or `"Unknown"` when the record has none.
    pub fn name(&self) -> &str {
        self.metadata
            .get("name")
            .map(String::as_str)
            .unwrap_or("Unknown")
    }
}

/// Parts of a record a read should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Include {
    Documents,
    Metadatas,
    Distances,
}

/// Unranked read, in storage order.
#[derive(Debug, Clone, Default)]
pub struct GetRequest {
    pub filter: Option<Where>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub include: Vec<Include>,
}

/// Similarity read, ranked by ascending distance to `query_embedding`.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query_embedding: Vec<f32>,
    pub filter: Option<Where>,
    pub n_results: usize,
    pub include: Vec<Include>,
}

/// Card to write into a collection, with its precomputed embedding.
#[derive(Debug, Clone)]
pub struct NewCard {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

/// A named, persisted set of cards with metadata filtering and similarity lookup.
///
/// The search layer only reads; `upsert` exists for the card loader.
pub trait CardCollection: Send + Sync {
    fn name(&self) -> &str;
    fn get(&self, request: &GetRequest) -> anyhow::Result<Vec<CardRecord>>;
    fn query(&self, request: &QueryRequest) -> anyhow::Result<Vec<CardRecord>>;
    fn upsert(&self, cards: &[NewCard]) -> anyhow::Result<usize>;
    fn count(&self) -> anyhow::Result<i64>;
    fn refresh(&self) -> anyhow::Result<()>;
}

/// Turns text into a fixed-dimension embedding vector.
pub trait TextEncoder: Send + Sync {
    fn encode(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    fn encode_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.encode(text)).collect()
    }
}
