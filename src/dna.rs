//! DNA Generator - One Element per Layer
//!
//! A DNA is the ordered list of element ids chosen for an edition, one per
//! layer, in catalog order. Obstruction checks only look at layers chosen
//! earlier in that order, so reordering the catalog changes the outcome.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use crate::catalog::{Element, ElementId, Layer, LayerCatalog};
use crate::config::{LayerId, RarityId};
use crate::obstruction::ObstructionRules;
use crate::rarity::draw_tier;

/// RNG used for every edition task.
pub type EditionRng = ChaCha8Rng;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DnaError {
    #[error("Catalog exhausted: layer {layer} has no elements for rarity {rarity}")]
    CatalogExhausted { layer: LayerId, rarity: RarityId },

    #[error("Layer {layer} stayed obstructed for rarity {rarity} after {attempts} attempts")]
    LayerObstructed {
        layer: LayerId,
        rarity: RarityId,
        attempts: u32,
    },

    #[error("Element {element} not found in layer {layer}")]
    UnknownElement { layer: LayerId, element: ElementId },

    #[error("DNA has {actual} ids but the catalog has {expected} layers")]
    LengthMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dna(Vec<ElementId>);

impl Dna {
    pub fn new(ids: Vec<ElementId>) -> Self {
        Self(ids)
    }

    pub fn ids(&self) -> &[ElementId] {
        &self.0
    }

    /// Concatenated ids. Uniqueness is judged on this key.
    pub fn key(&self) -> String {
        self.0.concat()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Dna {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("-"))
    }
}

/// The element chosen for one layer, with the layer's placement.
#[derive(Debug, Clone, Copy)]
pub struct Placement<'a> {
    pub layer: &'a Layer,
    pub element: &'a Element,
}

pub struct DnaGenerator<'a> {
    catalog: &'a LayerCatalog,
    obstructions: &'a ObstructionRules,
    max_attempts: u32,
}

impl<'a> DnaGenerator<'a> {
    pub fn new(catalog: &'a LayerCatalog, obstructions: &'a ObstructionRules, max_attempts: u32) -> Self {
        Self {
            catalog,
            obstructions,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn create_dna<R: Rng>(&self, rarity: &str, rng: &mut R) -> Result<Dna, DnaError> {
        let mut ids = Vec::with_capacity(self.catalog.len());
        let mut selected: HashSet<&str> = HashSet::new();

        for layer in self.catalog.layers() {
            let element = self.pick_for_layer(layer, rarity, &selected, rng)?;
            selected.insert(&element.name);
            ids.push(element.id.clone());
        }

        Ok(Dna(ids))
    }

    fn pick_for_layer<R: Rng>(
        &self,
        layer: &'a Layer,
        rarity: &str,
        selected: &HashSet<&str>,
        rng: &mut R,
    ) -> Result<&'a Element, DnaError> {
        for _ in 0..self.max_attempts {
            let effective = match layer.override_for(rarity) {
                Some(distribution) => draw_tier(distribution, rng).map_or(rarity, String::as_str),
                None => rarity,
            };

            let pool = layer.elements_for(effective);
            if pool.is_empty() {
                return Err(DnaError::CatalogExhausted {
                    layer: layer.id.clone(),
                    rarity: effective.to_string(),
                });
            }

            let element = &pool[rng.random_range(0..pool.len())];
            if self.obstructions.blocks(selected, &element.name) {
                tracing::trace!(layer = %layer.id, element = %element.name, "Obstructed, redrawing layer");
                continue;
            }
            return Ok(element);
        }

        Err(DnaError::LayerObstructed {
            layer: layer.id.clone(),
            rarity: rarity.to_string(),
            attempts: self.max_attempts,
        })
    }

    /// Map a DNA back onto the catalog for rendering and metadata.
    pub fn placements(&self, dna: &Dna) -> Result<Vec<Placement<'a>>, DnaError> {
        if dna.len() != self.catalog.len() {
            return Err(DnaError::LengthMismatch {
                expected: self.catalog.len(),
                actual: dna.len(),
            });
        }

        self.catalog
            .layers()
            .iter()
            .zip(dna.ids())
            .map(|(layer, id)| {
                layer
                    .find_element(id)
                    .map(|element| Placement { layer, element })
                    .ok_or_else(|| DnaError::UnknownElement {
                        layer: layer.id.clone(),
                        element: id.clone(),
                    })
            })
            .collect()
    }
}
