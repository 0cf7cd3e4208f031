//! Generation Pipeline - Single Entry Point
//!
//! CRITICAL: run MUST call validate internally. No bypass.
//!
//! The ledger is only touched from the calling thread. Workers generate and
//! render; reconciliation against the ledger happens between rounds.

use chrono::Utc;
use rand::SeedableRng;
use rayon::prelude::*;
use std::ops::Range;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{CatalogError, LayerCatalog};
use crate::config::{CollectionConfig, ConfigError, GenerationMode, RarityId};
use crate::dna::{Dna, DnaError, DnaGenerator, EditionRng};
use crate::hashing::{compute_config_hash, compute_manifest_hash};
use crate::ledger::UniquenessLedger;
use crate::metadata::{Attribute, EditionMetadata, EditionRecord, ManifestEntry, RunManifest};
use crate::obstruction::ObstructionRules;
use crate::output::{OutputError, OutputWriter};
use crate::rarity::{RaritySchedule, ScheduleError};
use crate::render::{ImageRenderer, RenderError, Renderer};
use crate::validation::{CollectionContext, ValidationResult, Validator};
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Edition {edition}: {source}")]
    Dna {
        edition: u32,
        #[source]
        source: DnaError,
    },

    #[error("Edition {edition}: render failed: {source}")]
    Render {
        edition: u32,
        #[source]
        source: RenderError,
    },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Edition {edition} ({rarity}) still duplicated after {attempts} attempts")]
    AttemptsExhausted {
        edition: u32,
        rarity: RarityId,
        attempts: u32,
    },

    #[error("{pending} editions still duplicated after {rounds} rounds (first: {first})")]
    RoundsExhausted { pending: usize, rounds: u32, first: u32 },

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Accepted editions plus how many rounds it took to get them.
#[derive(Debug, Clone)]
pub struct Generated {
    pub records: Vec<EditionRecord>,
    pub rounds: u32,
}

#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub validation: ValidationResult,
    pub manifest: RunManifest,
    pub records: Vec<EditionRecord>,
}

/// A DNA produced by a worker, waiting for reconciliation.
struct Candidate {
    edition: u32,
    rarity: RarityId,
    dna: Dna,
    rng: EditionRng,
}

/// The generation pipeline - single entry point for a collection run
pub struct GenerationPipeline {
    config: CollectionConfig,
    catalog: LayerCatalog,
    obstructions: ObstructionRules,
    schedule: RaritySchedule,
    renderer: Box<dyn Renderer>,
    validator: Validator,
}

impl GenerationPipeline {
    pub fn new(
        config: CollectionConfig,
        catalog: LayerCatalog,
        renderer: Box<dyn Renderer>,
    ) -> Result<Self, GenerationError> {
        config.check()?;
        let obstructions = ObstructionRules::from_names(&config.obstructions).resolve(&catalog);
        let schedule = RaritySchedule::from_config(&config);

        Ok(Self {
            config,
            catalog,
            obstructions,
            schedule,
            renderer,
            validator: Validator::new(),
        })
    }

    /// Load the catalog from `layersDir` and render with `ImageRenderer`.
    pub fn from_config(config: CollectionConfig) -> Result<Self, GenerationError> {
        config.check()?;
        let catalog = LayerCatalog::load(&config)?;
        let renderer = ImageRenderer::new(config.width, config.height).with_background(config.draw_background);
        Self::new(config, catalog, Box::new(renderer))
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    pub fn catalog(&self) -> &LayerCatalog {
        &self.catalog
    }

    pub fn schedule(&self) -> &RaritySchedule {
        &self.schedule
    }

    /// This is the ONLY validation entry point.
    pub fn validate(&self) -> ValidationResult {
        let ctx = CollectionContext {
            config: &self.config,
            catalog: &self.catalog,
            schedule: &self.schedule,
            obstructions: &self.obstructions,
        };
        self.validator.validate(&ctx)
    }

    /// Generate the whole collection, write metadata and manifest.
    ///
    /// CRITICAL: This ALWAYS calls validate internally. No bypass possible.
    pub fn run(
        &self,
        ledger: &mut UniquenessLedger,
        output: &OutputWriter,
    ) -> Result<GenerationReport, GenerationError> {
        // MANDATORY: Validation is always called.
        let validation = self.validate();
        if !validation.valid {
            let messages: Vec<_> = validation
                .violations
                .iter()
                .map(|v| format!("{}: {}", v.rule, v.message))
                .collect();
            return Err(GenerationError::ValidationFailed(messages.join("; ")));
        }
        for v in &validation.violations {
            warn!(rule = %v.rule, "{}", v.message);
        }

        info!(
            collection = %self.config.name,
            editions = self.config.edition_size,
            mode = ?self.config.mode,
            "Starting generation"
        );
        let generated = self.generate(self.config.editions(), ledger, output)?;

        let metadata: Vec<EditionMetadata> = generated.records.iter().map(|r| r.metadata.clone()).collect();
        output.write_metadata(&metadata)?;

        let mut manifest = RunManifest {
            run_id: Uuid::new_v4().to_string(),
            collection: self.config.name.clone(),
            engine_version: ENGINE_VERSION.to_string(),
            created_at: Utc::now(),
            config_hash: compute_config_hash(&self.config, ENGINE_VERSION)?,
            rounds: generated.rounds,
            editions: generated.records.iter().map(ManifestEntry::from).collect(),
            manifest_hash: String::new(), // Computed after
        };
        manifest.manifest_hash = compute_manifest_hash(&manifest)?;
        output.write_manifest(&manifest)?;

        info!(
            editions = generated.records.len(),
            rounds = generated.rounds,
            manifest = %manifest.manifest_hash,
            "Generation finished"
        );

        Ok(GenerationReport {
            validation,
            manifest,
            records: generated.records,
        })
    }

    /// Produce one accepted record per edition in `editions`.
    pub fn generate(
        &self,
        editions: Range<u32>,
        ledger: &mut UniquenessLedger,
        output: &OutputWriter,
    ) -> Result<Generated, GenerationError> {
        match self.config.mode {
            GenerationMode::Sequential => self.generate_sequential(editions, ledger, output),
            GenerationMode::Parallel => self.generate_parallel(editions, ledger, output),
        }
    }

    fn generator(&self) -> DnaGenerator<'_> {
        DnaGenerator::new(&self.catalog, &self.obstructions, self.config.max_attempts)
    }

    fn generate_sequential(
        &self,
        editions: Range<u32>,
        ledger: &mut UniquenessLedger,
        output: &OutputWriter,
    ) -> Result<Generated, GenerationError> {
        let generator = self.generator();
        let mut rng = match self.config.seed {
            Some(seed) => EditionRng::seed_from_u64(seed),
            None => EditionRng::from_os_rng(),
        };
        let mut records = Vec::with_capacity(editions.len());

        for edition in editions {
            let rarity = self.schedule.rarity_for_edition(edition)?;
            let create = |rng: &mut EditionRng| {
                generator
                    .create_dna(rarity, rng)
                    .map_err(|source| GenerationError::Dna { edition, source })
            };

            let mut dna = create(&mut rng)?;
            let mut attempts = 1;
            while !ledger.is_unique(rarity, &dna) {
                if attempts >= self.config.max_attempts {
                    return Err(GenerationError::AttemptsExhausted {
                        edition,
                        rarity: rarity.clone(),
                        attempts,
                    });
                }
                debug!(edition, dna = %dna, "Duplicate DNA, regenerating");
                dna = create(&mut rng)?;
                attempts += 1;
            }

            let record = self.finish(&generator, edition, rarity, dna, &mut rng, output)?;
            ledger.record(rarity.clone(), &record.dna);
            debug!(edition, rarity = %rarity, dna = %record.dna, "Edition created");
            records.push(record);
        }

        Ok(Generated { records, rounds: 1 })
    }

    fn generate_parallel(
        &self,
        editions: Range<u32>,
        ledger: &mut UniquenessLedger,
        output: &OutputWriter,
    ) -> Result<Generated, GenerationError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.worker_count())
            .build()?;
        let generator = self.generator();

        let mut pending: Vec<u32> = editions.collect();
        let mut records = Vec::with_capacity(pending.len());
        let mut rounds = 0;

        while !pending.is_empty() {
            if rounds >= self.config.max_attempts {
                return Err(GenerationError::RoundsExhausted {
                    pending: pending.len(),
                    rounds,
                    first: pending[0],
                });
            }
            rounds += 1;
            info!(round = rounds, pending = pending.len(), "Generating round");

            // Workers never read the ledger.
            let candidates: Vec<Candidate> = pool.install(|| {
                pending
                    .par_iter()
                    .map(|&edition| self.candidate(&generator, edition, rounds))
                    .collect::<Result<Vec<_>, GenerationError>>()
            })?;

            // Reconcile on this thread, in collection order.
            let mut accepted = Vec::with_capacity(candidates.len());
            let mut retry = Vec::new();
            for candidate in candidates {
                if ledger.is_unique(&candidate.rarity, &candidate.dna) {
                    ledger.record(candidate.rarity.clone(), &candidate.dna);
                    accepted.push(candidate);
                } else {
                    debug!(edition = candidate.edition, dna = %candidate.dna, "Duplicate DNA, deferred to next round");
                    retry.push(candidate.edition);
                }
            }

            let finished: Vec<EditionRecord> = pool.install(|| {
                accepted
                    .into_par_iter()
                    .map(|mut c| self.finish(&generator, c.edition, &c.rarity, c.dna, &mut c.rng, output))
                    .collect::<Result<Vec<_>, GenerationError>>()
            })?;
            records.extend(finished);
            pending = retry;
        }

        Ok(Generated { records, rounds })
    }

    fn candidate(
        &self,
        generator: &DnaGenerator<'_>,
        edition: u32,
        round: u32,
    ) -> Result<Candidate, GenerationError> {
        let rarity = self.schedule.rarity_for_edition(edition)?;
        let mut rng = self.edition_rng(edition, round);
        let dna = generator
            .create_dna(rarity, &mut rng)
            .map_err(|source| GenerationError::Dna { edition, source })?;
        Ok(Candidate {
            edition,
            rarity: rarity.clone(),
            dna,
            rng,
        })
    }

    /// Seeded runs give every (round, edition) its own ChaCha stream.
    fn edition_rng(&self, edition: u32, round: u32) -> EditionRng {
        match self.config.seed {
            Some(seed) => {
                let mut rng = EditionRng::seed_from_u64(seed);
                rng.set_stream((u64::from(round) << 32) | u64::from(edition));
                rng
            }
            None => EditionRng::from_os_rng(),
        }
    }

    /// Render and persist an accepted DNA.
    fn finish(
        &self,
        generator: &DnaGenerator<'_>,
        edition: u32,
        rarity: &str,
        dna: Dna,
        rng: &mut EditionRng,
        output: &OutputWriter,
    ) -> Result<EditionRecord, GenerationError> {
        let placements = generator
            .placements(&dna)
            .map_err(|source| GenerationError::Dna { edition, source })?;

        let bytes = self
            .renderer
            .render(&placements, rng)
            .map_err(|source| GenerationError::Render { edition, source })?;
        let image_hash = output.write_image(edition, self.renderer.extension(), &bytes)?;

        let attributes = placements
            .iter()
            .map(|p| Attribute::for_placement(self.config.attribute_mode, p, rarity))
            .collect();
        let metadata = EditionMetadata::new(&self.config, edition, &dna, attributes);

        Ok(EditionRecord {
            edition,
            rarity: rarity.to_string(),
            dna,
            metadata,
            image_hash,
        })
    }
}
