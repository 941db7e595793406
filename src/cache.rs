//! Content-addressed store of compiled artifacts.
//!
//! Artifacts are named `script-<hash>.wasm`. A name only ever appears once
//! its bytes are complete: installs go through a rename, or through a
//! temporary file in the cache directory that is persisted under the final
//! name.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::{IoContext, PipelineError, Result};

pub const ARTIFACT_PREFIX: &str = "script-";
pub const ARTIFACT_EXT: &str = "wasm";

/// File name of the artifact for `hash`.
pub fn artifact_name(hash: &str) -> String {
    format!("{}{}.{}", ARTIFACT_PREFIX, hash, ARTIFACT_EXT)
}

/// Hash encoded in an artifact file name, if it is one.
pub fn hash_of(file_name: &str) -> Option<&str> {
    let hash = file_name
        .strip_prefix(ARTIFACT_PREFIX)?
        .strip_suffix(ARTIFACT_EXT)?
        .strip_suffix('.')?;
    (!hash.is_empty() && hash.chars().all(|c| c.is_ascii_hexdigit())).then_some(hash)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub hash: String,
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct Cache {
    dir: PathBuf,
}

impl Cache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, hash: &str) -> PathBuf {
        self.dir.join(artifact_name(hash))
    }

    /// Path of the cached artifact for `hash`, when present.
    pub fn lookup(&self, hash: &str) -> Option<PathBuf> {
        let path = self.path_for(hash);
        path.is_file().then_some(path)
    }

    /// Moves `artifact` into the cache under `hash`.
    ///
    /// A failed rename (for example across devices) falls back to copying
    /// into a temporary file beside the target and persisting it.
    pub fn install(&self, artifact: &Path, hash: &str) -> Result<PathBuf> {
        let target = self.path_for(hash);
        std::fs::create_dir_all(&self.dir).map_err(|source| PipelineError::CacheWrite {
            path: self.dir.clone(),
            source,
        })?;

        match std::fs::rename(artifact, &target) {
            Ok(()) => {}
            Err(err) => {
                tracing::debug!(%err, "rename into cache failed, copying");
                self.copy_in(artifact, &target)
                    .map_err(|source| PipelineError::CacheWrite {
                        path: target.clone(),
                        source,
                    })?;
            }
        }
        Ok(target)
    }

    fn copy_in(&self, artifact: &Path, target: &Path) -> io::Result<()> {
        let mut source = std::fs::File::open(artifact)?;
        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)?;
        io::copy(&mut source, temp.as_file_mut())?;
        temp.as_file().sync_all()?;
        temp.persist(target).map_err(|err| err.error)?;
        Ok(())
    }

    /// Every artifact in the cache, sorted by hash.
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in walkdir::WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|err| {
                let context = format!("list cache {}", self.dir.display());
                PipelineError::io(context, err.into())
            })?;
            let Some(hash) = entry.file_name().to_str().and_then(hash_of) else {
                continue;
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let size = entry
                .metadata()
                .map(|m| m.len())
                .unwrap_or_default();
            entries.push(CacheEntry {
                hash: hash.to_string(),
                path: entry.path().to_path_buf(),
                size,
            });
        }
        entries.sort_by(|a, b| a.hash.cmp(&b.hash));
        Ok(entries)
    }

    /// Removes every artifact and returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let entries = self.entries()?;
        for entry in &entries {
            std::fs::remove_file(&entry.path)
                .io_context(|| format!("remove {}", entry.path.display()))?;
        }
        tracing::info!(removed = entries.len(), dir = %self.dir.display(), "cleared artifact cache");
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_names() {
        assert_eq!(artifact_name("ba7816bf"), "script-ba7816bf.wasm");
        assert_eq!(hash_of("script-ba7816bf.wasm"), Some("ba7816bf"));
        assert_eq!(hash_of("script-ba7816bf-loader.js"), None);
        assert_eq!(hash_of("script-.wasm"), None);
        assert_eq!(hash_of("styles-ba7816bf.wasm"), None);
    }

    #[test]
    fn test_install_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path().join("cache"));
        assert_eq!(cache.lookup("ba7816bf"), None);

        let artifact = dir.path().join("script.wasm");
        std::fs::write(&artifact, b"\0asm").unwrap();
        let installed = cache.install(&artifact, "ba7816bf").unwrap();

        assert_eq!(installed, cache.path_for("ba7816bf"));
        assert_eq!(cache.lookup("ba7816bf"), Some(installed.clone()));
        assert!(!artifact.exists());
        assert_eq!(std::fs::read(installed).unwrap(), b"\0asm");
    }

    #[test]
    fn test_install_missing_artifact_is_cache_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path());
        let err = cache.install(&dir.path().join("nope.wasm"), "00000000").unwrap_err();
        assert!(matches!(err, PipelineError::CacheWrite { .. }), "{err}");
    }

    #[test]
    fn test_entries_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path());
        std::fs::write(cache.path_for("bbbbbbbb"), b"12").unwrap();
        std::fs::write(cache.path_for("aaaaaaaa"), b"1").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

        let entries = cache.entries().unwrap();
        let hashes: Vec<_> = entries.iter().map(|e| e.hash.as_str()).collect();
        assert_eq!(hashes, ["aaaaaaaa", "bbbbbbbb"]);
        assert_eq!(entries[1].size, 2);

        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.entries().unwrap().is_empty());
        assert!(dir.path().join("notes.txt").exists());
    }
}
