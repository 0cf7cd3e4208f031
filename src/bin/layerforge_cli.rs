//! LayerForge CLI
//!
//! Commands: validate, schedule, layers, generate
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 on validation failure, 1 on any other failure

use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use layerforge_core::{
    output::{read_manifest, OutputWriter},
    CollectionConfig, GenerationError, GenerationMode, GenerationPipeline, LayerCatalog,
    RaritySchedule, UniquenessLedger,
};

#[derive(Parser)]
#[command(name = "layerforge-cli")]
#[command(about = "LayerForge CLI - Layered Edition Generator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the collection config
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Override the layers directory
    #[arg(long)]
    layers_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the collection without generating
    Validate,

    /// Print the edition to rarity schedule
    Schedule,

    /// List layers with per-rarity element counts
    Layers,

    /// Generate images, metadata and manifest
    Generate {
        /// Output directory
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Worker threads (defaults to available parallelism)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Generate on a single thread
        #[arg(long)]
        sequential: bool,

        /// Seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,

        /// Manifest of an earlier run whose DNA must not repeat
        #[arg(long)]
        resume: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("layerforge_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(error: impl std::fmt::Display, code: u8) -> ExitCode {
    let output = json!({
        "success": false,
        "error": error.to_string(),
    });
    println!("{}", output);
    ExitCode::from(code)
}

fn print_json(value: &impl serde::Serialize) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(s) => {
            println!("{}", s);
            ExitCode::SUCCESS
        }
        Err(e) => fail(e, 1),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let mut config = match CollectionConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => return fail(format!("Failed to load config: {}", e), 1),
    };
    if let Some(dir) = cli.layers_dir {
        config.layers_dir = dir;
    }

    match cli.command {
        Commands::Validate => {
            let pipeline = match GenerationPipeline::from_config(config) {
                Ok(p) => p,
                Err(e) => return fail(&e, exit_code(&e)),
            };
            let result = pipeline.validate();
            let code = print_json(&result);
            if result.valid {
                code
            } else {
                ExitCode::from(2) // Validation failure
            }
        }

        Commands::Schedule => {
            if let Err(e) = config.check() {
                return fail(e, 2);
            }
            let schedule = RaritySchedule::from_config(&config);
            let rows: Vec<_> = config
                .editions()
                .map(|edition| match schedule.rarity_for_edition(edition) {
                    Ok(rarity) => json!({"edition": edition, "rarity": rarity}),
                    Err(e) => json!({"edition": edition, "rarity": null, "error": e.to_string()}),
                })
                .collect();
            print_json(&rows)
        }

        Commands::Layers => {
            let catalog = match LayerCatalog::load(&config) {
                Ok(c) => c,
                Err(e) => return fail(e, 1),
            };
            let layers: Vec<_> = catalog
                .layers()
                .iter()
                .map(|layer| {
                    json!({
                        "id": layer.id,
                        "position": layer.position,
                        "size": layer.size,
                        "elements": layer.tier_counts(),
                    })
                })
                .collect();
            print_json(&layers)
        }

        Commands::Generate { output, workers, sequential, seed, resume } => {
            if workers.is_some() {
                config.workers = workers;
            }
            if sequential {
                config.mode = GenerationMode::Sequential;
            }
            if seed.is_some() {
                config.seed = seed;
            }

            let mut ledger = match resume {
                Some(path) => match read_manifest(&path) {
                    Ok(manifest) => UniquenessLedger::from_manifest(&manifest),
                    Err(e) => return fail(format!("Failed to read manifest: {}", e), 1),
                },
                None => UniquenessLedger::new(),
            };

            let writer = match OutputWriter::create(&output) {
                Ok(w) => w,
                Err(e) => return fail(e, 1),
            };
            let pipeline = match GenerationPipeline::from_config(config) {
                Ok(p) => p,
                Err(e) => return fail(&e, exit_code(&e)),
            };

            match pipeline.run(&mut ledger, &writer) {
                Ok(report) => print_json(&json!({
                    "success": true,
                    "output": writer.dir(),
                    "editions": report.manifest.editions.len(),
                    "rounds": report.manifest.rounds,
                    "runId": report.manifest.run_id,
                    "manifestHash": report.manifest.manifest_hash,
                    "violations": report.validation.violations,
                })),
                Err(e) => fail(&e, exit_code(&e)),
            }
        }
    }
}

fn exit_code(error: &GenerationError) -> u8 {
    match error {
        GenerationError::Config(_) | GenerationError::ValidationFailed(_) => 2,
        _ => 1,
    }
}
