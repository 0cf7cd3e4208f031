//! Uniqueness Ledger - Accepted DNA per Rarity Tier
//!
//! Owned by one run. Insert-only; seeding from a prior manifest extends a
//! collection without repeating its DNA.

use std::collections::{HashMap, HashSet};

use crate::config::RarityId;
use crate::dna::Dna;
use crate::metadata::RunManifest;

#[derive(Debug, Clone, Default)]
pub struct UniquenessLedger {
    by_rarity: HashMap<RarityId, HashSet<String>>,
}

impl UniquenessLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_manifest(manifest: &RunManifest) -> Self {
        let mut ledger = Self::new();
        for entry in &manifest.editions {
            ledger.record(entry.rarity.clone(), &entry.dna);
        }
        ledger
    }

    pub fn is_unique(&self, rarity: &str, dna: &Dna) -> bool {
        self.by_rarity
            .get(rarity)
            .map_or(true, |accepted| !accepted.contains(&dna.key()))
    }

    /// Insert without checking. Callers test `is_unique` first.
    pub fn record(&mut self, rarity: RarityId, dna: &Dna) {
        self.by_rarity.entry(rarity).or_default().insert(dna.key());
    }

    pub fn count(&self, rarity: &str) -> usize {
        self.by_rarity.get(rarity).map_or(0, HashSet::len)
    }

    pub fn total(&self) -> usize {
        self.by_rarity.values().map(HashSet::len).sum()
    }
}
