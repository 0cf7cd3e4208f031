//! Output Writer - Shared Output Directory
//!
//! Workers hash their images in parallel; the file writes go through one lock.

use parking_lot::Mutex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::hashing::{sha256_hex, verify_manifest};
use crate::metadata::{EditionMetadata, RunManifest};

pub const METADATA_FILE: &str = "_metadata.json";
pub const MANIFEST_FILE: &str = "_manifest.json";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Manifest {path} does not match its manifestHash")]
    ManifestMismatch { path: PathBuf },
}

pub struct OutputWriter {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl OutputWriter {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, OutputError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| OutputError::Io { path: dir.clone(), source })?;
        Ok(Self { dir, lock: Mutex::new(()) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `<edition>.<ext>` and return the SHA-256 of its bytes.
    pub fn write_image(&self, edition: u32, extension: &str, bytes: &[u8]) -> Result<String, OutputError> {
        let hash = sha256_hex(bytes);
        let path = self.dir.join(format!("{}.{}", edition, extension));

        let _guard = self.lock.lock();
        fs::write(&path, bytes).map_err(|source| OutputError::Io { path, source })?;
        Ok(hash)
    }

    pub fn write_metadata(&self, metadata: &[EditionMetadata]) -> Result<PathBuf, OutputError> {
        self.write_json(METADATA_FILE, metadata)
    }

    pub fn write_manifest(&self, manifest: &RunManifest) -> Result<PathBuf, OutputError> {
        self.write_json(MANIFEST_FILE, manifest)
    }

    fn write_json<T: Serialize + ?Sized>(&self, file_name: &str, value: &T) -> Result<PathBuf, OutputError> {
        let path = self.dir.join(file_name);
        let json = serde_json::to_string_pretty(value)?;

        let _guard = self.lock.lock();
        fs::write(&path, json).map_err(|source| OutputError::Io { path: path.clone(), source })?;
        Ok(path)
    }
}

/// Read a manifest written by an earlier run. Edited manifests are rejected.
pub fn read_manifest(path: &Path) -> Result<RunManifest, OutputError> {
    let content = fs::read_to_string(path).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let manifest: RunManifest = serde_json::from_str(&content)?;
    if !verify_manifest(&manifest)? {
        return Err(OutputError::ManifestMismatch { path: path.to_path_buf() });
    }
    Ok(manifest)
}
