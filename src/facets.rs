use crate::filter::Facet;
use crate::traits::{CardCollection, GetRequest, Include};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Records fetched per page while scanning for facet values.
pub const FACET_PAGE_SIZE: usize = 1000;

/// Sorted distinct non-empty values of `field` across the whole collection.
///
/// Values are trimmed and compared exactly (no case folding). Reads the
/// collection page by page until a page comes back empty.
pub fn unique_values(collection: &dyn CardCollection, field: &str) -> anyhow::Result<Vec<String>> {
    let mut values = BTreeSet::new();
    let mut offset = 0;
    loop {
        let page = collection.get(&GetRequest {
            filter: None,
            limit: Some(FACET_PAGE_SIZE),
            offset,
            include: vec![Include::Metadatas],
        })?;
        if page.is_empty() {
            break;
        }
        for record in &page {
            if let Some(value) = record.metadata.get(field) {
                let value = value.trim();
                if !value.is_empty() {
                    values.insert(value.to_string());
                }
            }
        }
        offset += FACET_PAGE_SIZE;
    }
    debug!("Found {} distinct values for '{}'", values.len(), field);
    Ok(values.into_iter().collect())
}

/// Discovered values for every facet, as offered in the filter selectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetCatalog {
    pub values: BTreeMap<Facet, Vec<String>>,
}

impl FacetCatalog {
    pub fn options(&self, facet: Facet) -> &[String] {
        self.values.get(&facet).map(Vec::as_slice).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Metadata;
    use crate::engines::SqliteCardCollection;
    use crate::traits::NewCard;
    use tempfile::TempDir;

    fn collection_with_colors(colors: &[&str]) -> (SqliteCardCollection, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let collection = SqliteCardCollection::open_or_create(temp_dir.path(), "cards").unwrap();
        let cards: Vec<NewCard> = colors
            .iter()
            .enumerate()
            .map(|(i, color)| {
                let mut metadata = Metadata::new();
                metadata.insert("color".to_string(), color.to_string());
                NewCard {
                    id: format!("card-{}", i),
                    document: String::new(),
                    metadata,
                    embedding: vec![1.0],
                }
            })
            .collect();
        collection.upsert(&cards).unwrap();
        (collection, temp_dir)
    }

    #[test]
    fn test_unique_values_are_sorted_and_case_sensitive() {
        let (collection, _temp_dir) = collection_with_colors(&["Red", "red", "", "Blue", " Red "]);
        let values = unique_values(&collection, "color").unwrap();
        assert_eq!(values, vec!["Blue", "Red", "red"]);
    }

    #[test]
    fn test_unique_values_of_missing_field() {
        let (collection, _temp_dir) = collection_with_colors(&["Red"]);
        assert!(unique_values(&collection, "rarity").unwrap().is_empty());
    }

    #[test]
    fn test_unique_values_spans_pages() {
        let colors: Vec<String> = (0..FACET_PAGE_SIZE + 5)
            .map(|i| format!("color-{:05}", i))
            .collect();
        let refs: Vec<&str> = colors.iter().map(String::as_str).collect();
        let (collection, _temp_dir) = collection_with_colors(&refs);

        let values = unique_values(&collection, "color").unwrap();
        assert_eq!(values.len(), FACET_PAGE_SIZE + 5);
        assert_eq!(values.last().map(String::as_str), Some("color-01004"));
    }

    #[test]
    fn test_empty_collection_has_no_values() {
        let (collection, _temp_dir) = collection_with_colors(&[]);
        assert!(unique_values(&collection, "color").unwrap().is_empty());
    }
}
