//! # Card Search
//!
//! Search over a persisted trading-card collection, served as a small web UI.
//!
//! ## Features
//!
//! - Smart search: ranks cards by embedding distance to free text
//! - Dumb search: filter-only retrieval in storage order
//! - Facet discovery for six metadata filters (set, type, color, rarity, level, triggers)
//! - SQLite-backed collection with JSON metadata and `f32` embedding blobs
//! - Bounded, expiring result caches with manual refresh
//! - HTML search page and JSON API (axum), plus a CLI
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cardsearch::{CardSearcher, CacheSettings, Facet, FacetSelection, LocalEmbedder, SqliteCardCollection, build_filter};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let collection = SqliteCardCollection::open_or_create(Path::new("./CardDataTrimmed"), "cards_collection")?;
//! let embedder = LocalEmbedder::new_with_default_model()?;
//! let searcher = CardSearcher::new(Arc::new(collection), Arc::new(embedder), CacheSettings::default());
//!
//! // Facet values for the filter selectors
//! let colors = searcher.facet_values(Facet::Color)?;
//!
//! // Smart search restricted to one set
//! let filter = build_filter(&FacetSelection::default().with(Facet::SetName, "Booster1"));
//! let ranked = searcher.smart_search("counter send opponent to memory", 10, filter.as_ref())?;
//!
//! // Filter-only search
//! let cards = searcher.dumb_search(filter.as_ref(), 50)?;
//! # let _ = (colors, ranked, cards);
//! # Ok(())
//! # }
//! ```

pub mod traits;
pub use traits::{
    CardCollection, CardRecord, GetRequest, Include, Metadata, NewCard, QueryRequest, TextEncoder,
};

pub mod config;
pub use config::{CacheSettings, CardSearchDirs, Settings};

pub mod filter;
pub use filter::{Facet, FacetSelection, NO_FILTER, Where, build_filter};

pub mod cache;
pub use cache::QueryCache;

pub mod embed;
pub use embed::LocalEmbedder;

pub mod engines;
pub use engines::SqliteCardCollection;

pub mod facets;
pub use facets::{FacetCatalog, unique_values};

pub mod search;
pub use search::CardSearcher;

pub mod render;
pub use render::{CardDetail, result_title};

pub mod ingest;
pub use ingest::{CardIngestor, IngestionResult};

pub mod web;
