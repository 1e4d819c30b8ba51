use crate::cache::QueryCache;
use crate::config::CacheSettings;
use crate::facets::{FacetCatalog, unique_values};
use crate::filter::{Facet, Where};
use crate::traits::{CardCollection, CardRecord, GetRequest, Include, QueryRequest, TextEncoder};
use log::{debug, info};
use std::sync::Arc;

/// Smart and filter-only search over one card collection.
///
/// Holds the collection and model handles it was built with; both are
/// created once by the caller and shared read-only. Facet lists and
/// filter-only results are cached per argument set until they expire or
/// [`CardSearcher::refresh`] is called.
pub struct CardSearcher {
    collection: Arc<dyn CardCollection>,
    encoder: Arc<dyn TextEncoder>,
    facet_cache: QueryCache<Facet, Vec<String>>,
    filtered_cache: QueryCache<(Option<Where>, usize), Vec<CardRecord>>,
}

impl CardSearcher {
    pub fn new(
        collection: Arc<dyn CardCollection>,
        encoder: Arc<dyn TextEncoder>,
        cache: CacheSettings,
    ) -> Self {
        info!(
            "Search ready on collection '{}' (cache capacity {}, ttl {:?})",
            collection.name(),
            cache.capacity,
            cache.ttl
        );
        Self {
            collection,
            encoder,
            facet_cache: QueryCache::new(cache),
            filtered_cache: QueryCache::new(cache),
        }
    }

    pub fn collection(&self) -> &dyn CardCollection {
        self.collection.as_ref()
    }

    /// Distinct values of one facet, cached.
    pub fn facet_values(&self, facet: Facet) -> anyhow::Result<Vec<String>> {
        self.facet_cache.get_or_try_insert_with(facet, || {
            unique_values(self.collection.as_ref(), facet.field())
        })
    }

    /// Distinct values of every facet.
    pub fn facets(&self) -> anyhow::Result<FacetCatalog> {
        let mut catalog = FacetCatalog::default();
        for facet in Facet::ALL {
            catalog.values.insert(facet, self.facet_values(facet)?);
        }
        Ok(catalog)
    }

    /// Up to `n_results` cards closest to `query_text`, nearest first.
    ///
    /// Blank text returns nothing without calling the model or the store.
    pub fn smart_search(
        &self,
        query_text: &str,
        n_results: usize,
        filter: Option<&Where>,
    ) -> anyhow::Result<Vec<CardRecord>> {
        if query_text.trim().is_empty() {
            debug!("Empty smart search query, skipping");
            return Ok(Vec::new());
        }

        let query_embedding = self.encoder.encode(query_text)?;
        let results = self.collection.query(&QueryRequest {
            query_embedding,
            filter: filter.cloned(),
            n_results,
            include: vec![Include::Metadatas, Include::Distances, Include::Documents],
        })?;
        info!(
            "Smart search for '{}' (filter {:?}) returned {} results.",
            query_text,
            filter,
            results.len()
        );
        Ok(results)
    }

    /// Up to `limit` cards matching `filter`, in storage order, with no distance.
    pub fn dumb_search(&self, filter: Option<&Where>, limit: usize) -> anyhow::Result<Vec<CardRecord>> {
        let key = (filter.cloned(), limit);
        let results = self.filtered_cache.get_or_try_insert_with(key, || {
            self.collection.get(&GetRequest {
                filter: filter.cloned(),
                limit: Some(limit),
                offset: 0,
                include: vec![Include::Metadatas, Include::Documents],
            })
        })?;
        info!(
            "Filter-only search (filter {:?}, limit {}) returned {} results.",
            filter,
            limit,
            results.len()
        );
        Ok(results)
    }

    /// Reopens the collection and drops every cached facet list and result.
    pub fn refresh(&self) -> anyhow::Result<()> {
        self.collection.refresh()?;
        self.facet_cache.invalidate_all();
        self.filtered_cache.invalidate_all();
        info!("Search caches cleared for '{}'", self.collection.name());
        Ok(())
    }
}
