//! The module manifest written next to every prepared program.
//!
//! Each program requires the framework's support library. While developing
//! the framework itself the requirement is redirected to the local checkout
//! with a replace directive; installed builds pin the released version.

use std::path::{Path, PathBuf};

use crate::toolchain::Toolchain;

/// Name of the module manifest file.
pub const MODULE_FILE: &str = "go.mod";

/// Module path of every generated program.
pub const PROGRAM_MODULE: &str = "islet_script";

/// Language version declared by the generated manifest.
pub const LANGUAGE_VERSION: &str = "1.21";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkModule {
    /// Module path of the support library.
    pub path: String,
    /// Released version, with or without a leading `v`.
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Version-zero requirement replaced by a local directory.
    Local(PathBuf),
    /// A released version, always `v`-prefixed.
    Pinned(String),
}

impl FrameworkModule {
    pub fn new(path: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            version: version.into(),
        }
    }

    /// Resolution order: a checkout above the running executable, then the
    /// toolchain's view of the module unless it lives in the module cache,
    /// then the pinned release.
    pub async fn resolve(&self, toolchain: &dyn Toolchain) -> Requirement {
        let exe_dir = std::env::current_exe()
            .and_then(|exe| exe.canonicalize())
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        if let Some(root) = exe_dir.and_then(|dir| find_declaring_root(&dir, &self.path)) {
            tracing::debug!(root = %root.display(), "using local framework checkout");
            return Requirement::Local(root);
        }

        if let Some(dir) = toolchain.module_dir(&self.path).await {
            let cache = toolchain.module_cache().await;
            if !in_module_cache(&dir, cache.as_deref()) {
                tracing::debug!(dir = %dir.display(), "using toolchain-resolved framework module");
                return Requirement::Local(dir);
            }
        }

        Requirement::Pinned(pin(&self.version))
    }

    /// The `require` (and `replace`) directives for `requirement`.
    pub fn directives(&self, requirement: &Requirement) -> String {
        match requirement {
            Requirement::Local(dir) => format!(
                "require {path} v0.0.0\n\nreplace {path} => {dir}\n",
                path = self.path,
                dir = dir.display()
            ),
            Requirement::Pinned(version) => format!("require {} {}\n", self.path, version),
        }
    }

    /// Full manifest text for a generated program.
    pub fn manifest(&self, requirement: &Requirement) -> String {
        format!(
            "module {}\n\ngo {}\n\n{}",
            PROGRAM_MODULE,
            LANGUAGE_VERSION,
            self.directives(requirement)
        )
    }
}

fn pin(version: &str) -> String {
    if version.starts_with('v') {
        version.to_string()
    } else {
        format!("v{}", version)
    }
}

/// Whether `text` is a module manifest declaring `module`.
pub fn declares_module(text: &str, module: &str) -> bool {
    text.lines().any(|line| {
        let mut words = line.split_whitespace();
        words.next() == Some("module")
            && words.next().map(|m| m.trim_matches('"')) == Some(module)
            && words.next().is_none()
    })
}

/// Walks from `start` upward to the first directory whose manifest
/// declares `module`.
pub fn find_declaring_root(start: &Path, module: &str) -> Option<PathBuf> {
    start.ancestors().find_map(|dir| {
        let text = std::fs::read_to_string(dir.join(MODULE_FILE)).ok()?;
        declares_module(&text, module).then(|| dir.to_path_buf())
    })
}

fn in_module_cache(dir: &Path, cache: Option<&Path>) -> bool {
    match cache {
        Some(cache) => dir.starts_with(cache),
        None => {
            let components: Vec<_> = dir.components().map(|c| c.as_os_str()).collect();
            components.windows(2).any(|w| w[0] == "pkg" && w[1] == "mod")
        }
    }
}
