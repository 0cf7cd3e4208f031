//! Contract Invariant Tests
//!
//! These tests verify the non-negotiable guarantees against a catalog loaded
//! from real PNG files.

use image::{Rgba, RgbaImage};
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::path::Path;

use layerforge_core::{
    output::{read_manifest, MANIFEST_FILE, METADATA_FILE},
    CollectionConfig, EditionRecord, GenerationError, GenerationMode, GenerationPipeline, LayerCatalog,
    ObstructionRules, OutputWriter, UniquenessLedger,
};

const TIERS: [(&str, &str); 3] = [("super_rare", "s"), ("rare", "r"), ("original", "o")];

/// `<dir>/<layer>/<tier>/<short>_<t><n>.png`, one tiny solid-colour image per element.
fn write_layer(dir: &Path, layer: &str, short: &str, per_tier: usize) {
    for (rarity, tier) in TIERS {
        let tier_dir = dir.join(layer).join(rarity);
        std::fs::create_dir_all(&tier_dir).unwrap();
        for i in 0..per_tier {
            let shade = (i * 40) as u8;
            RgbaImage::from_pixel(4, 4, Rgba([shade, 255 - shade, 128, 200]))
                .save(tier_dir.join(format!("{}_{}{}.png", short, tier, i)))
                .unwrap();
        }
    }
}

fn config_json(layers_dir: &Path, layers: &[&str], obstructions: &str) -> String {
    let layers: Vec<String> = layers
        .iter()
        .map(|l| format!(r#"{{"id": "{}", "size": {{"width": 8, "height": 8}}}}"#, l))
        .collect();
    format!(
        r#"{{
            "name": "eyeballs",
            "description": "Generated test collection",
            "baseImageUri": "https://example.com/nft",
            "width": 8,
            "height": 8,
            "editionSize": 10,
            "editionDnaPrefix": "0",
            "rarities": [
                {{"id": "super_rare", "from": 1, "to": 1}},
                {{"id": "rare", "from": 2, "to": 5}},
                {{"id": "original", "from": 6, "to": 10}}
            ],
            "layers": [{}],
            "obstructions": {},
            "layersDir": {},
            "workers": 4
        }}"#,
        layers.join(", "),
        obstructions,
        serde_json::to_string(layers_dir).unwrap(),
    )
}

fn config(layers_dir: &Path, layers: &[&str], obstructions: &str, mode: GenerationMode, seed: Option<u64>) -> CollectionConfig {
    let mut config = CollectionConfig::from_json(&config_json(layers_dir, layers, obstructions)).unwrap();
    config.mode = mode;
    config.seed = seed;
    config
}

/// Two layers with five elements per tier.
fn two_layer_fixture(dir: &Path) {
    write_layer(dir, "ball", "ball", 5);
    write_layer(dir, "eye color", "eye", 5);
}

const OBSTRUCTIONS: &str = r#"[["ball_o0", "eye_o0"], ["ball_r1", "eye_r1"]]"#;

fn run(config: CollectionConfig, out: &Path) -> Vec<EditionRecord> {
    let pipeline = GenerationPipeline::from_config(config).unwrap();
    let writer = OutputWriter::create(out).unwrap();
    let mut ledger = UniquenessLedger::new();
    pipeline.run(&mut ledger, &writer).unwrap().records
}

fn assert_batch_valid(records: &[EditionRecord], expected: RangeInclusive<u32>, catalog: &LayerCatalog, rules: &ObstructionRules) {
    let mut editions: Vec<u32> = records.iter().map(|r| r.edition).collect();
    editions.sort_unstable();
    assert_eq!(editions, expected.collect::<Vec<_>>(), "each edition exactly once");

    let mut seen: HashMap<&str, HashSet<String>> = HashMap::new();
    for r in records {
        assert!(
            seen.entry(&r.rarity).or_default().insert(r.dna.key()),
            "duplicate DNA {} within {}",
            r.dna,
            r.rarity
        );

        let names: HashSet<&str> = catalog
            .layers()
            .iter()
            .zip(r.dna.ids())
            .map(|(layer, id)| layer.find_element(id).unwrap().name.as_str())
            .collect();
        assert!(rules.violated_by(&names).is_none(), "edition {} is obstructed", r.edition);
    }
}

#[test]
fn invariant_schedule_assigns_tiers_by_inverted_slot() {
    let dir = tempfile::tempdir().unwrap();
    write_layer(dir.path(), "ball", "ball", 5);
    let config = config(dir.path(), &["ball"], "[]", GenerationMode::Sequential, Some(1));
    let pipeline = GenerationPipeline::from_config(config).unwrap();

    let tiers: Vec<&str> = (1..=10)
        .map(|e| pipeline.schedule().rarity_for_edition(e).unwrap().as_str())
        .collect();
    assert_eq!(tiers[0], "super_rare");
    assert!(tiers[1..5].iter().all(|t| *t == "rare"));
    assert!(tiers[5..].iter().all(|t| *t == "original"));

    // stable across calls
    assert_eq!(pipeline.schedule().rarity_for_edition(1).unwrap(), "super_rare");
}

#[test]
fn invariant_single_layer_batch_fills_every_edition() {
    let dir = tempfile::tempdir().unwrap();
    write_layer(dir.path(), "ball", "ball", 5);
    let out = dir.path().join("out");
    let config = config(dir.path(), &["ball"], "[]", GenerationMode::Parallel, None);
    let reference = GenerationPipeline::from_config(config.clone()).unwrap();

    let records = run(config, &out);
    assert_eq!(records.len(), 10);
    let catalog = reference.catalog();
    assert_batch_valid(&records, 1..=10, catalog, &ObstructionRules::default());
    for r in &records {
        assert_eq!(&r.rarity, reference.schedule().rarity_for_edition(r.edition).unwrap());
        // the element really comes from the edition's tier
        let ball = catalog.get("ball").unwrap();
        assert!(ball.elements_for(&r.rarity).iter().any(|e| e.id == r.dna.ids()[0]));
        assert!(out.join(format!("{}.png", r.edition)).exists());
    }
}

#[test]
fn invariant_sequential_and_parallel_are_both_valid() {
    let dir = tempfile::tempdir().unwrap();
    two_layer_fixture(dir.path());

    for (i, mode) in [GenerationMode::Sequential, GenerationMode::Parallel].into_iter().enumerate() {
        let config = config(dir.path(), &["ball", "eye color"], OBSTRUCTIONS, mode, Some(7));
        let pipeline = GenerationPipeline::from_config(config.clone()).unwrap();
        let records = run(config, &dir.path().join(format!("out{}", i)));

        let rules = ObstructionRules::from_names(&pipeline.config().obstructions).resolve(pipeline.catalog());
        assert!(rules.groups().iter().all(|g| g.is_active()));
        assert_batch_valid(&records, 1..=10, pipeline.catalog(), &rules);
    }
}

#[test]
fn invariant_seeded_runs_are_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    two_layer_fixture(dir.path());

    let outputs: Vec<Vec<(u32, String, String)>> = (0..2)
        .map(|i| {
            let config = config(dir.path(), &["ball", "eye color"], OBSTRUCTIONS, GenerationMode::Parallel, Some(99));
            run(config, &dir.path().join(format!("run{}", i)))
                .into_iter()
                .map(|r| (r.edition, r.dna.key(), r.image_hash))
                .collect()
        })
        .collect();

    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn invariant_metadata_and_manifest_written() {
    let dir = tempfile::tempdir().unwrap();
    two_layer_fixture(dir.path());
    let out = dir.path().join("out");
    let config = config(dir.path(), &["ball", "eye color"], OBSTRUCTIONS, GenerationMode::Parallel, Some(3));
    let records = run(config, &out);

    let metadata: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join(METADATA_FILE)).unwrap()).unwrap();
    let entries = metadata.as_array().unwrap();
    assert_eq!(entries.len(), 10);
    for entry in entries {
        let edition = entry["edition"].as_str().unwrap();
        assert_eq!(entry["name"], format!("#{}", edition));
        assert_eq!(entry["image"], format!("https://example.com/nft/{}", edition));
        assert_eq!(entry["description"], "Generated test collection");
        let attributes = entry["attributes"].as_array().unwrap();
        assert_eq!(attributes[0]["trait_type"], "ball");
        assert_eq!(attributes[1]["trait_type"], "eye color");
    }

    let manifest = read_manifest(&out.join(MANIFEST_FILE)).unwrap();
    assert_eq!(manifest.editions.len(), 10);
    assert_eq!(manifest.manifest_hash.len(), 64);
    for r in &records {
        let bytes = std::fs::read(out.join(format!("{}.png", r.edition))).unwrap();
        assert_eq!(layerforge_core::hashing::sha256_hex(&bytes), r.image_hash);
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (8, 8));
    }
}

#[test]
fn invariant_resume_extends_collection_without_repeating_dna() {
    let dir = tempfile::tempdir().unwrap();
    two_layer_fixture(dir.path());

    let first = dir.path().join("first");
    run(
        config(dir.path(), &["ball", "eye color"], OBSTRUCTIONS, GenerationMode::Parallel, Some(1)),
        &first,
    );
    let manifest = read_manifest(&first.join(MANIFEST_FILE)).unwrap();

    // second batch continues the numbering at 11
    let mut next = config(dir.path(), &["ball", "eye color"], OBSTRUCTIONS, GenerationMode::Parallel, Some(1));
    next.start_edition_from = 11;
    let pipeline = GenerationPipeline::from_config(next).unwrap();
    let validation = pipeline.validate();
    assert!(validation.valid, "{:?}", validation.violations);

    let writer = OutputWriter::create(dir.path().join("second")).unwrap();
    let mut ledger = UniquenessLedger::from_manifest(&manifest);
    let second = pipeline.run(&mut ledger, &writer).unwrap();

    let rules = ObstructionRules::from_names(&pipeline.config().obstructions).resolve(pipeline.catalog());
    assert_batch_valid(&second.records, 11..=20, pipeline.catalog(), &rules);

    // edition 10 + e gets the tier edition e got
    let first_tiers: HashMap<u32, &str> = manifest.editions.iter().map(|e| (e.edition, e.rarity.as_str())).collect();
    for r in &second.records {
        assert_eq!(r.rarity, first_tiers[&(r.edition - 10)], "edition {}", r.edition);
        assert!(dir.path().join("second").join(format!("{}.png", r.edition)).exists());
    }

    let previous: HashSet<(String, String)> =
        manifest.editions.iter().map(|e| (e.rarity.clone(), e.dna.key())).collect();
    for r in &second.records {
        assert!(!previous.contains(&(r.rarity.clone(), r.dna.key())), "edition {} repeats", r.edition);
    }
    assert_eq!(ledger.total(), 20);
}

#[test]
fn invariant_edited_manifest_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_layer(dir.path(), "ball", "ball", 5);
    let out = dir.path().join("out");
    run(config(dir.path(), &["ball"], "[]", GenerationMode::Sequential, Some(4)), &out);

    let path = out.join(MANIFEST_FILE);
    let mut value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    value["editions"][0]["rarity"] = serde_json::Value::String("rare".to_string());
    std::fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();

    let err = read_manifest(&path).unwrap_err();
    assert!(matches!(err, layerforge_core::OutputError::ManifestMismatch { .. }));
}

#[test]
fn invariant_run_calls_validate() {
    // 3 elements per tier on one layer cannot hold 4 rare editions
    let dir = tempfile::tempdir().unwrap();
    write_layer(dir.path(), "ball", "ball", 3);
    let config = config(dir.path(), &["ball"], "[]", GenerationMode::Parallel, Some(1));
    let pipeline = GenerationPipeline::from_config(config).unwrap();

    let validation = pipeline.validate();
    assert!(!validation.valid);
    assert!(validation.violations.iter().any(|v| v.rule == "capacity"));

    let out = dir.path().join("out");
    let writer = OutputWriter::create(&out).unwrap();
    let err = pipeline.run(&mut UniquenessLedger::new(), &writer).unwrap_err();
    assert!(matches!(err, GenerationError::ValidationFailed(_)));
    assert!(!out.join(METADATA_FILE).exists());
}

#[test]
fn invariant_exhausted_tier_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    write_layer(dir.path(), "ball", "ball", 3);

    let mut sequential = config(dir.path(), &["ball"], "[]", GenerationMode::Sequential, Some(1));
    sequential.max_attempts = 100;
    let pipeline = GenerationPipeline::from_config(sequential).unwrap();
    let writer = OutputWriter::create(dir.path().join("seq")).unwrap();
    let err = pipeline.generate(1..11, &mut UniquenessLedger::new(), &writer).unwrap_err();
    assert!(matches!(err, GenerationError::AttemptsExhausted { ref rarity, .. } if rarity == "rare"));

    let mut parallel = config(dir.path(), &["ball"], "[]", GenerationMode::Parallel, Some(1));
    parallel.max_attempts = 20;
    let pipeline = GenerationPipeline::from_config(parallel).unwrap();
    let writer = OutputWriter::create(dir.path().join("par")).unwrap();
    let err = pipeline.generate(1..11, &mut UniquenessLedger::new(), &writer).unwrap_err();
    assert!(matches!(err, GenerationError::RoundsExhausted { rounds: 20, .. }));
}

#[test]
fn invariant_missing_tier_is_catalog_exhausted() {
    let dir = tempfile::tempdir().unwrap();
    write_layer(dir.path(), "ball", "ball", 5);
    std::fs::remove_dir_all(dir.path().join("ball").join("super_rare")).unwrap();

    let config = config(dir.path(), &["ball"], "[]", GenerationMode::Sequential, Some(1));
    let pipeline = GenerationPipeline::from_config(config).unwrap();
    assert!(pipeline.validate().violations.iter().any(|v| v.rule == "element_pool"));

    let writer = OutputWriter::create(dir.path().join("out")).unwrap();
    let err = pipeline.generate(1..2, &mut UniquenessLedger::new(), &writer).unwrap_err();
    assert!(matches!(err, GenerationError::Dna { edition: 1, .. }));
    assert!(err.to_string().contains("ball"));
}
