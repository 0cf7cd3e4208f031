//! LayerForge Core - Layered Edition Generator
//!
//! # The Five Laws (Non-Negotiable)
//! 1. The Schedule Decides The Tier
//! 2. DNA Is Unique Within Its Tier
//! 3. Obstructed Combinations Never Ship
//! 4. Validation Is Protective
//! 5. Manifests Enable Reproduction

pub mod config;
pub mod rarity;
pub mod catalog;
pub mod obstruction;
pub mod dna;
pub mod ledger;
pub mod hashing;
pub mod metadata;
pub mod render;
pub mod output;
pub mod validation;
pub mod pipeline;

pub use config::{CollectionConfig, ConfigError, GenerationMode, AttributeMode, RarityId, LayerId};
pub use rarity::{RaritySchedule, ScheduleError, draw_tier};
pub use catalog::{Element, ElementId, Layer, LayerCatalog, CatalogError};
pub use obstruction::{ObstructionGroup, ObstructionRules};
pub use dna::{Dna, DnaError, DnaGenerator, EditionRng, Placement};
pub use ledger::UniquenessLedger;
pub use hashing::{compute_manifest_hash, compute_config_hash, canonical_json, verify_manifest};
pub use metadata::{Attribute, EditionMetadata, EditionRecord, RunManifest};
pub use render::{ImageRenderer, Renderer, RenderError};
pub use output::{OutputWriter, OutputError};
pub use validation::{ValidationResult, ValidationRule, ValidationViolation, ViolationSeverity};
pub use pipeline::{GenerationPipeline, GenerationReport, GenerationError, Generated};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
