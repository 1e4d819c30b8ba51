//! Facet selections and the metadata filter expressions built from them.
//!
//! A [`Where`] serializes to the grammar the collection understands:
//! `{"field": "value"}` for a single condition and
//! `{"$and": [{"field": "value"}, ...]}` for a conjunction.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Selector value meaning "do not filter on this facet".
pub const NO_FILTER: &str = "(No Filter)";

/// Metadata fields offered as filters, in display and filter order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facet {
    SetName,
    CardType,
    Color,
    Rarity,
    Level,
    Triggers,
}

impl Facet {
    pub const ALL: [Facet; 6] = [
        Facet::SetName,
        Facet::CardType,
        Facet::Color,
        Facet::Rarity,
        Facet::Level,
        Facet::Triggers,
    ];

    /// Metadata key this facet reads.
    pub fn field(self) -> &'static str {
        match self {
            Facet::SetName => "set_name",
            Facet::CardType => "card_type",
            Facet::Color => "color",
            Facet::Rarity => "rarity",
            Facet::Level => "level",
            Facet::Triggers => "triggers",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Facet::SetName => "Set Name",
            Facet::CardType => "Card Type",
            Facet::Color => "Color",
            Facet::Rarity => "Rarity",
            Facet::Level => "Level",
            Facet::Triggers => "Triggers",
        }
    }
}

/// The value chosen in each facet selector. `None`, empty and [`NO_FILTER`] all mean unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacetSelection {
    pub set_name: Option<String>,
    pub card_type: Option<String>,
    pub color: Option<String>,
    pub rarity: Option<String>,
    pub level: Option<String>,
    pub triggers: Option<String>,
}

impl FacetSelection {
    pub fn get(&self, facet: Facet) -> Option<&str> {
        let value = match facet {
            Facet::SetName => &self.set_name,
            Facet::CardType => &self.card_type,
            Facet::Color => &self.color,
            Facet::Rarity => &self.rarity,
            Facet::Level => &self.level,
            Facet::Triggers => &self.triggers,
        };
        value.as_deref()
    }

    pub fn set(&mut self, facet: Facet, value: impl Into<String>) {
        let slot = match facet {
            Facet::SetName => &mut self.set_name,
            Facet::CardType => &mut self.card_type,
            Facet::Color => &mut self.color,
            Facet::Rarity => &mut self.rarity,
            Facet::Level => &mut self.level,
            Facet::Triggers => &mut self.triggers,
        };
        *slot = Some(value.into());
    }

    pub fn with(mut self, facet: Facet, value: impl Into<String>) -> Self {
        self.set(facet, value);
        self
    }

    /// Selected facets with a real value, in [`Facet::ALL`] order.
    pub fn active(&self) -> impl Iterator<Item = (Facet, &str)> {
        Facet::ALL.into_iter().filter_map(|facet| {
            self.get(facet)
                .filter(|value| !value.is_empty() && *value != NO_FILTER)
                .map(|value| (facet, value))
        })
    }
}

/// Metadata filter expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Where {
    /// `metadata[field] == value`
    Eq { field: String, value: String },
    /// Every clause must match. Needs at least two clauses.
    And(Vec<Where>),
}

impl Where {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Where::Eq {
            field: field.into(),
            value: value.into(),
        }
    }
}

impl Serialize for Where {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Where::Eq { field, value } => map.serialize_entry(field, value)?,
            Where::And(clauses) => map.serialize_entry("$and", clauses)?,
        }
        map.end()
    }
}

/// Builds the filter for a set of facet selections.
///
/// No active selection gives `None`, one gives a bare equality, and two or
/// more are wrapped in an explicit `$and` so the store never sees a
/// multi-key mapping.
pub fn build_filter(selection: &FacetSelection) -> Option<Where> {
    let mut conditions: Vec<Where> = selection
        .active()
        .map(|(facet, value)| Where::eq(facet.field(), value))
        .collect();
    match conditions.len() {
        0 => None,
        1 => conditions.pop(),
        _ => Some(Where::And(conditions)),
    }
}
