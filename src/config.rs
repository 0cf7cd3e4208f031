//! Collection Config - The Run Contract
//!
//! Everything a generation run needs, loaded once and checked before use.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type RarityId = String;
pub type LayerId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rarity tier not found: {rarity} (referenced by {context})")]
    RarityTierNotFound { rarity: RarityId, context: String },

    #[error("Unknown layer: {layer} (referenced by {context})")]
    UnknownLayer { layer: LayerId, context: String },

    #[error("Invalid range for rarity {rarity}: from {from} > to {to}")]
    InvalidRange { rarity: RarityId, from: u32, to: u32 },

    #[error("Rarity {rarity} ends at edition {to}, past editionSize {edition_size}")]
    RangeBeyondCollection { rarity: RarityId, to: u32, edition_size: u32 },

    #[error("Editions from {start} for {edition_size} editions overflow u32")]
    EditionOverflow { start: u32, edition_size: u32 },

    #[error("Duplicate {kind} id: {id}")]
    DuplicateId { kind: &'static str, id: String },

    #[error("Collection is empty: {0}")]
    EmptyCollection(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub base_image_uri: String,
    #[serde(default = "default_start_edition")]
    pub start_edition_from: u32,
    pub edition_size: u32,
    /// Prepended to every element id, to tell DNA from separate catalogs apart.
    #[serde(default)]
    pub edition_dna_prefix: String,
    pub rarities: Vec<RaritySpec>,
    pub layers: Vec<LayerSpec>,
    #[serde(default)]
    pub layer_rarity_overrides: Vec<LayerOverrideSpec>,
    #[serde(default)]
    pub obstructions: Vec<Vec<String>>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub mode: GenerationMode,
    #[serde(default)]
    pub attribute_mode: AttributeMode,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_true")]
    pub draw_background: bool,
    #[serde(default = "default_layers_dir")]
    pub layers_dir: PathBuf,
    #[serde(default)]
    pub validation: ValidationConfig,
}

fn default_true() -> bool { true }
fn default_name() -> String { "collection".to_string() }
fn default_dimension() -> u32 { 1000 }
fn default_start_edition() -> u32 { 1 }
fn default_max_attempts() -> u32 { 10_000 }
fn default_layers_dir() -> PathBuf { PathBuf::from("input") }

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RaritySpec {
    pub id: RarityId,
    pub from: u32,
    pub to: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSpec {
    pub id: LayerId,
    #[serde(default)]
    pub position: Option<Position>,
    /// Defaults to the full canvas.
    #[serde(default)]
    pub size: Option<Size>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerOverrideSpec {
    pub rarity: RarityId,
    pub layer: LayerId,
    pub percentages: Vec<TierWeight>,
}

/// One entry of an ordered percentage distribution over rarity tiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierWeight {
    pub rarity: RarityId,
    pub percent: f64,
}

impl TierWeight {
    pub fn new(rarity: impl Into<RarityId>, percent: f64) -> Self {
        Self { rarity: rarity.into(), percent }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    #[default]
    Parallel,
    Sequential,
}

/// Shape of the per-edition `attributes` list in the metadata output.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttributeMode {
    /// `{trait_type, value}` per layer
    #[default]
    Trait,
    /// `{name, rarity}` per layer
    Rarity,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationConfig {
    #[serde(default)]
    pub failure_mode: FailureMode,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    #[default]
    Block,
    Warn,
    Log,
}

impl CollectionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Edition numbers covered by this run. `check` rejects configs where the end overflows.
    pub fn editions(&self) -> std::ops::Range<u32> {
        self.start_edition_from..self.start_edition_from.saturating_add(self.edition_size)
    }

    pub fn rarity(&self, id: &str) -> Option<&RaritySpec> {
        self.rarities.iter().find(|r| r.id == id)
    }

    pub fn layer(&self, id: &str) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// Overrides registered for one layer, as (tier, distribution) pairs.
    pub fn overrides_for_layer<'a>(
        &'a self,
        layer: &'a str,
    ) -> impl Iterator<Item = &'a LayerOverrideSpec> + 'a {
        self.layer_rarity_overrides.iter().filter(move |o| o.layer == layer)
    }

    pub fn worker_count(&self) -> usize {
        self.workers
            .filter(|w| *w > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
            })
    }

    /// Structural checks. Anything failing here stops the run before generation.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.edition_size == 0 {
            return Err(ConfigError::EmptyCollection("editionSize is 0"));
        }
        if self.rarities.is_empty() {
            return Err(ConfigError::EmptyCollection("no rarities configured"));
        }
        if self.layers.is_empty() {
            return Err(ConfigError::EmptyCollection("no layers configured"));
        }
        if self.start_edition_from.checked_add(self.edition_size).is_none() {
            return Err(ConfigError::EditionOverflow {
                start: self.start_edition_from,
                edition_size: self.edition_size,
            });
        }

        let mut seen = HashSet::new();
        for rarity in &self.rarities {
            if !seen.insert(rarity.id.as_str()) {
                return Err(ConfigError::DuplicateId { kind: "rarity", id: rarity.id.clone() });
            }
            if rarity.from > rarity.to {
                return Err(ConfigError::InvalidRange {
                    rarity: rarity.id.clone(),
                    from: rarity.from,
                    to: rarity.to,
                });
            }
            // ranges are batch-relative; anything past editionSize never gets read
            if rarity.to > self.edition_size {
                return Err(ConfigError::RangeBeyondCollection {
                    rarity: rarity.id.clone(),
                    to: rarity.to,
                    edition_size: self.edition_size,
                });
            }
        }

        let mut seen = HashSet::new();
        for layer in &self.layers {
            if !seen.insert(layer.id.as_str()) {
                return Err(ConfigError::DuplicateId { kind: "layer", id: layer.id.clone() });
            }
        }

        for o in &self.layer_rarity_overrides {
            let context = format!("override {}/{}", o.rarity, o.layer);
            if self.rarity(&o.rarity).is_none() {
                return Err(ConfigError::RarityTierNotFound {
                    rarity: o.rarity.clone(),
                    context,
                });
            }
            if self.layer(&o.layer).is_none() {
                return Err(ConfigError::UnknownLayer { layer: o.layer.clone(), context });
            }
            if let Some(missing) = o.percentages.iter().find(|w| self.rarity(&w.rarity).is_none()) {
                return Err(ConfigError::RarityTierNotFound {
                    rarity: missing.rarity.clone(),
                    context,
                });
            }
            if o.percentages.is_empty() {
                return Err(ConfigError::EmptyCollection("override with no percentages"));
            }
        }

        Ok(())
    }
}
