//! Hashing System - SHA-256 for Manifests and Images
//!
//! A manifest is hashed over its canonical JSON with `manifestHash` blank, so
//! the stored hash can be checked before a run is resumed from it.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::CollectionConfig;
use crate::metadata::RunManifest;

/// Lowercase hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Serialize with object keys sorted at every depth and no whitespace
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(&canonicalize(serde_json::to_value(value)?))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, canonicalize(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Hash of a run manifest, ignoring whatever `manifest_hash` currently holds
pub fn compute_manifest_hash(manifest: &RunManifest) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(manifest)?;
    if let Some(stored) = value.get_mut("manifestHash") {
        *stored = Value::String(String::new());
    }
    Ok(sha256_hex(canonical_json(&value)?.as_bytes()))
}

/// True when the stored `manifest_hash` matches the manifest's content.
pub fn verify_manifest(manifest: &RunManifest) -> Result<bool, serde_json::Error> {
    Ok(compute_manifest_hash(manifest)? == manifest.manifest_hash)
}

/// config_hash = sha256(canonical_config + ":" + engine_version)
pub fn compute_config_hash(
    config: &CollectionConfig,
    engine_version: &str,
) -> Result<String, serde_json::Error> {
    let canonical = canonical_json(config)?;
    Ok(sha256_hex(format!("{}:{}", canonical, engine_version).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorted() {
        let obj = json!({"z": 1, "a": 2, "m": 3});
        let canonical = canonical_json(&obj).unwrap();
        assert_eq!(canonical, r#"{"a":2,"m":3,"z":1}"#);
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    fn manifest() -> RunManifest {
        let mut manifest: RunManifest = serde_json::from_value(json!({
            "runId": "run-1",
            "collection": "eyeballs",
            "engineVersion": "1.0.0",
            "createdAt": "2026-01-01T00:00:00Z",
            "configHash": "abc",
            "rounds": 1,
            "editions": [
                {"edition": 1, "rarity": "super_rare", "dna": ["0", "5"], "imageHash": "ff"}
            ]
        }))
        .unwrap();
        manifest.manifest_hash = compute_manifest_hash(&manifest).unwrap();
        manifest
    }

    #[test]
    fn test_manifest_hash_ignores_stored_hash() {
        let mut manifest = manifest();
        let hash = manifest.manifest_hash.clone();
        manifest.manifest_hash = "something else".to_string();
        assert_eq!(compute_manifest_hash(&manifest).unwrap(), hash);
    }

    #[test]
    fn test_verify_manifest_detects_edits() {
        let mut manifest = manifest();
        assert!(verify_manifest(&manifest).unwrap());

        manifest.editions[0].rarity = "rare".to_string();
        assert!(!verify_manifest(&manifest).unwrap());
    }

    #[test]
    fn test_config_hash_tracks_engine_version() {
        let config = CollectionConfig::from_json(crate::config::tests::sample_json()).unwrap();
        let h1 = compute_config_hash(&config, "1.0.0").unwrap();
        let h2 = compute_config_hash(&config, "1.0.0").unwrap();
        let h3 = compute_config_hash(&config, "1.1.0").unwrap();
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }
}
