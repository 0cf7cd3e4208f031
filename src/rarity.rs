//! Rarity Schedule - Edition to Tier Lookup
//!
//! The slot table is built once, on first lookup, and is read-only afterwards.

use rand::Rng;
use std::sync::OnceLock;
use thiserror::Error;

use crate::config::{CollectionConfig, RarityId, RaritySpec, TierWeight};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Edition {edition} has no rarity slot (schedule holds {slots} slots for {edition_size} editions from {start})")]
    EditionOutOfSchedule {
        edition: u32,
        start: u32,
        edition_size: u32,
        slots: usize,
    },
}

/// Maps edition numbers to rarity tiers.
///
/// Tiers are stably sorted by descending `from`, then each tier's
/// `[from, to]` range is appended to a flat slot table. Edition `e` of a run
/// starting at `start` reads slot `edition_size - (e - start + 1)`, so the
/// first edition lands on the last slot written. A run starting at
/// `edition_size + 1` repeats the tiers of the run starting at 1.
/// Overlapping ranges are not merged: every tier contributes its full range
/// and the inverted lookup decides which one an edition sees.
#[derive(Debug)]
pub struct RaritySchedule {
    tiers: Vec<RaritySpec>,
    edition_size: u32,
    start: u32,
    slots: OnceLock<Vec<RarityId>>,
}

impl RaritySchedule {
    pub fn new(tiers: Vec<RaritySpec>, edition_size: u32, start: u32) -> Self {
        Self {
            tiers,
            edition_size,
            start,
            slots: OnceLock::new(),
        }
    }

    pub fn from_config(config: &CollectionConfig) -> Self {
        Self::new(config.rarities.clone(), config.edition_size, config.start_edition_from)
    }

    fn slots(&self) -> &[RarityId] {
        self.slots.get_or_init(|| {
            let mut ordered: Vec<&RaritySpec> = self.tiers.iter().collect();
            ordered.sort_by(|a, b| b.from.cmp(&a.from));

            let mut slots = Vec::new();
            for tier in ordered {
                for _ in tier.from..=tier.to {
                    slots.push(tier.id.clone());
                }
            }
            slots
        })
    }

    pub fn rarity_for_edition(&self, edition: u32) -> Result<&RarityId, ScheduleError> {
        let slots = self.slots();
        let out_of_schedule = || ScheduleError::EditionOutOfSchedule {
            edition,
            start: self.start,
            edition_size: self.edition_size,
            slots: slots.len(),
        };

        let position = edition
            .checked_sub(self.start)
            .and_then(|offset| offset.checked_add(1))
            .ok_or_else(out_of_schedule)?;
        let index = self
            .edition_size
            .checked_sub(position)
            .ok_or_else(out_of_schedule)? as usize;
        slots.get(index).ok_or_else(out_of_schedule)
    }

    pub fn slot_count(&self) -> usize {
        self.slots().len()
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn tiers(&self) -> &[RaritySpec] {
        &self.tiers
    }
}

/// Draw a tier from an ordered percentage distribution.
pub fn draw_tier<'a, R: Rng>(distribution: &'a [TierWeight], rng: &mut R) -> Option<&'a RarityId> {
    let r = rng.random::<f64>() * 100.0;
    draw_tier_at(distribution, r)
}

/// Resolve a draw value `r` in `[0, 100)` against the distribution.
///
/// Returns the first tier whose running total exceeds `r`. When the
/// percentages run out before that happens, the first entry is returned.
/// `None` only for an empty distribution.
pub fn draw_tier_at(distribution: &[TierWeight], r: f64) -> Option<&RarityId> {
    let mut cumulative = 0.0;
    for weight in distribution {
        cumulative += weight.percent;
        if cumulative > r {
            return Some(&weight.rarity);
        }
    }
    distribution.first().map(|w| &w.rarity)
}
