//! Layer Catalog - Selectable Elements per Layer and Tier
//!
//! Built once at startup and handed to the generator as an immutable value.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{CollectionConfig, LayerId, Position, RarityId, Size, TierWeight};

pub type ElementId = String;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to scan {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Duplicate element id {id} (layers {first} and {second})")]
    DuplicateElementId {
        id: ElementId,
        first: LayerId,
        second: LayerId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Element {
    pub id: ElementId,
    /// Display name; obstruction groups match on this, not on `id`.
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Layer {
    pub id: LayerId,
    pub position: Position,
    pub size: Size,
    elements: HashMap<RarityId, Vec<Element>>,
    overrides: HashMap<RarityId, Vec<TierWeight>>,
}

impl Layer {
    pub fn new(id: impl Into<LayerId>, position: Position, size: Size) -> Self {
        Self {
            id: id.into(),
            position,
            size,
            elements: HashMap::new(),
            overrides: HashMap::new(),
        }
    }

    pub fn with_elements(mut self, rarity: impl Into<RarityId>, elements: Vec<Element>) -> Self {
        self.elements.insert(rarity.into(), elements);
        self
    }

    pub fn with_override(mut self, rarity: impl Into<RarityId>, distribution: Vec<TierWeight>) -> Self {
        self.overrides.insert(rarity.into(), distribution);
        self
    }

    /// Elements selectable under a tier, in catalog order. Empty when the tier has none.
    pub fn elements_for(&self, rarity: &str) -> &[Element] {
        self.elements.get(rarity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The tier-local projection of `elements_for` onto ids.
    pub fn element_ids_for(&self, rarity: &str) -> Vec<&ElementId> {
        self.elements_for(rarity).iter().map(|e| &e.id).collect()
    }

    pub fn override_for(&self, rarity: &str) -> Option<&[TierWeight]> {
        self.overrides.get(rarity).map(Vec::as_slice)
    }

    /// Look an element up by id across every tier of this layer.
    pub fn find_element(&self, id: &str) -> Option<&Element> {
        self.elements.values().flatten().find(|e| e.id == id)
    }

    pub fn all_elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values().flatten()
    }

    pub fn tier_counts(&self) -> HashMap<&str, usize> {
        self.elements.iter().map(|(k, v)| (k.as_str(), v.len())).collect()
    }
}

/// Ordered layers; catalog order is DNA order and compositing order.
#[derive(Debug, Clone)]
pub struct LayerCatalog {
    layers: Vec<Layer>,
}

impl LayerCatalog {
    /// Build a catalog from hand-assembled layers, rejecting duplicate element ids.
    pub fn new(layers: Vec<Layer>) -> Result<Self, CatalogError> {
        let mut owners: HashMap<&str, &str> = HashMap::new();
        for layer in &layers {
            let mut local = HashSet::new();
            for element in layer.all_elements() {
                // the same element listed under two tiers of one layer is fine
                if !local.insert(element.id.as_str()) {
                    continue;
                }
                if let Some(first) = owners.insert(&element.id, &layer.id) {
                    return Err(CatalogError::DuplicateElementId {
                        id: element.id.clone(),
                        first: first.to_string(),
                        second: layer.id.clone(),
                    });
                }
            }
        }
        Ok(Self { layers })
    }

    /// Scan `<layers_dir>/<layer>/<rarity>/*.png`.
    ///
    /// Element ids are `<prefix><n>` with `n` counted across the whole catalog.
    /// A missing tier directory yields an empty pool for that tier.
    pub fn load(config: &CollectionConfig) -> Result<Self, CatalogError> {
        let mut counter = 0usize;
        let mut layers = Vec::with_capacity(config.layers.len());

        for spec in &config.layers {
            let size = spec.size.unwrap_or(Size {
                width: config.width,
                height: config.height,
            });
            let mut layer = Layer::new(spec.id.clone(), spec.position.unwrap_or_default(), size);

            for rarity in &config.rarities {
                let dir = config.layers_dir.join(&spec.id).join(&rarity.id);
                let mut elements = Vec::new();
                for path in list_element_files(&dir)? {
                    let name = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    elements.push(Element {
                        id: format!("{}{}", config.edition_dna_prefix, counter),
                        name,
                        path,
                    });
                    counter += 1;
                }
                debug!(layer = %spec.id, rarity = %rarity.id, count = elements.len(), "Loaded elements");
                layer.elements.insert(rarity.id.clone(), elements);
            }

            for o in config.overrides_for_layer(&spec.id) {
                layer.overrides.insert(o.rarity.clone(), o.percentages.clone());
            }

            layers.push(layer);
        }

        Self::new(layers)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// Every element name in the catalog.
    pub fn element_names(&self) -> HashSet<&str> {
        self.layers
            .iter()
            .flat_map(Layer::all_elements)
            .map(|e| e.name.as_str())
            .collect()
    }
}

fn list_element_files(dir: &Path) -> Result<Vec<PathBuf>, CatalogError> {
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "Tier directory missing, pool is empty");
        return Ok(vec![]);
    }

    let io_err = |source: std::io::Error| CatalogError::Io { path: dir.to_path_buf(), source };
    let mut files = vec![];
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && path.extension().map_or(false, |e| e.eq_ignore_ascii_case("png")) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
