//! Edition Metadata and Run Manifest

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{AttributeMode, CollectionConfig, RarityId};
use crate::dna::{Dna, Placement};

/// One entry of the `attributes` list; the shape follows `AttributeMode`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Attribute {
    Trait { trait_type: String, value: String },
    Rarity { name: String, rarity: RarityId },
}

impl Attribute {
    pub fn for_placement(mode: AttributeMode, placement: &Placement<'_>, rarity: &str) -> Self {
        match mode {
            AttributeMode::Trait => Self::Trait {
                trait_type: placement.layer.id.clone(),
                value: placement.element.name.clone(),
            },
            AttributeMode::Rarity => Self::Rarity {
                name: placement.element.name.clone(),
                rarity: rarity.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EditionMetadata {
    pub dna: String,
    pub name: String,
    pub description: String,
    pub image: String,
    pub edition: String,
    pub attributes: Vec<Attribute>,
}

impl EditionMetadata {
    pub fn new(config: &CollectionConfig, edition: u32, dna: &Dna, attributes: Vec<Attribute>) -> Self {
        Self {
            dna: dna.key(),
            name: format!("#{}", edition),
            description: config.description.clone(),
            image: format!("{}/{}", config.base_image_uri, edition),
            edition: edition.to_string(),
            attributes,
        }
    }
}

/// Everything produced for one accepted edition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditionRecord {
    pub edition: u32,
    pub rarity: RarityId,
    pub dna: Dna,
    pub metadata: EditionMetadata,
    pub image_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub edition: u32,
    pub rarity: RarityId,
    pub dna: Dna,
    pub image_hash: String,
}

impl From<&EditionRecord> for ManifestEntry {
    fn from(record: &EditionRecord) -> Self {
        Self {
            edition: record.edition,
            rarity: record.rarity.clone(),
            dna: record.dna.clone(),
            image_hash: record.image_hash.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunManifest {
    pub run_id: String,
    pub collection: String,
    pub engine_version: String,
    pub created_at: DateTime<Utc>,
    pub config_hash: String,
    pub rounds: u32,
    pub editions: Vec<ManifestEntry>,
    #[serde(default)]
    pub manifest_hash: String,
}
