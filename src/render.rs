use crate::traits::{CardRecord, Metadata};
use serde::Serialize;

/// Width in pixels card images are shown at.
pub const IMAGE_WIDTH: u32 = 250;

/// Metadata fields shown for a card, with their labels, in display order.
pub const DETAIL_FIELDS: [(&str, &str); 14] = [
    ("name", "Name"),
    ("code", "Code"),
    ("rarity", "Rarity"),
    ("expansion", "Expansion"),
    ("card_type", "Card Type"),
    ("color", "Color"),
    ("level", "Level"),
    ("cost", "Cost"),
    ("power", "Power"),
    ("triggers", "Triggers"),
    ("attributes", "Attributes"),
    ("abilities", "Abilities"),
    ("flavor_text", "Flavor Text"),
    ("set_name", "Set Name"),
];

/// Display projection of one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardDetail {
    pub image: Option<String>,
    /// `(label, value)` pairs; missing fields are empty strings.
    pub fields: Vec<(&'static str, String)>,
}

impl CardDetail {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let image = metadata
            .get("image")
            .filter(|image| !image.is_empty())
            .cloned();
        let fields = DETAIL_FIELDS
            .iter()
            .map(|(key, label)| (*label, metadata.get(*key).cloned().unwrap_or_default()))
            .collect();
        Self { image, fields }
    }
}

/// Heading of a result panel: the card name, plus the distance for smart results.
///
/// Whole distances keep one decimal place (`Distance=0.0`, `Distance=1.0`).
pub fn result_title(record: &CardRecord) -> String {
    match record.distance {
        Some(distance) => format!("{} (Distance={:?})", record.name(), round3(distance)),
        None => record.name().to_string(),
    }
}

fn round3(value: f32) -> f64 {
    (value as f64 * 1000.0).round() / 1000.0
}
