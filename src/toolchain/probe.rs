//! `PATH` lookups for the compiler executables.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::OnceLock;

use super::Backend;

/// Resolves `bin` on `PATH` (or as a path when it contains a separator).
pub fn locate(bin: &str) -> Option<PathBuf> {
    which::which(bin).ok()
}

/// A once-per-process answer to "is this executable installed?".
///
/// The answer never changes after the first lookup, so a compile can still
/// fail if `PATH` changes later in the process.
#[derive(Debug)]
pub struct CachedProbe {
    bin: String,
    found: OnceLock<Option<PathBuf>>,
}

impl CachedProbe {
    pub fn new(bin: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            found: OnceLock::new(),
        }
    }

    pub fn bin(&self) -> &str {
        &self.bin
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.found
            .get_or_init(|| {
                let found = locate(&self.bin);
                tracing::debug!(bin = %self.bin, found = ?found, "probed toolchain executable");
                found
            })
            .as_ref()
    }

    pub fn available(&self) -> bool {
        self.path().is_some()
    }
}

/// What `islet doctor` prints.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub backends: Vec<BackendStatus>,
    pub root: Option<PathBuf>,
    pub glue: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub backend: &'static str,
    pub bin: String,
    pub path: Option<PathBuf>,
}

impl ProbeReport {
    pub fn backend(&self, backend: Backend) -> Option<&BackendStatus> {
        self.backends.iter().find(|status| status.backend == backend.as_str())
    }

    /// The backend a compile would use given the size preference.
    pub fn selected(&self, prefer_small: bool) -> Option<Backend> {
        let available = |b: Backend| self.backend(b).is_some_and(|s| s.path.is_some());
        if prefer_small && available(Backend::Small) {
            Some(Backend::Small)
        } else if available(Backend::Standard) {
            Some(Backend::Standard)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(backend: Backend, path: Option<&str>) -> BackendStatus {
        BackendStatus {
            backend: backend.as_str(),
            bin: backend.as_str().to_string(),
            path: path.map(PathBuf::from),
        }
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let probe = CachedProbe::new("islet-definitely-not-installed-bin");
        assert!(!probe.available());
        // Second call reads the cached answer.
        assert!(probe.path().is_none());
    }

    #[test]
    fn test_selected_backend() {
        let report = ProbeReport {
            backends: vec![
                status(Backend::Standard, Some("/usr/bin/go")),
                status(Backend::Small, None),
            ],
            root: None,
            glue: None,
        };
        assert_eq!(report.selected(true), Some(Backend::Standard));
        assert_eq!(report.selected(false), Some(Backend::Standard));

        let none = ProbeReport { backends: vec![], root: None, glue: None };
        assert_eq!(none.selected(true), None);
    }
}
