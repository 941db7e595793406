//! The seam between the pipeline and the external compiler toolchain.
//!
//! Everything the driver needs from the outside world goes through the
//! [`Toolchain`] trait, so tests can substitute a stub that writes fake
//! artifacts and counts invocations.

pub mod probe;
pub mod process;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub use process::ProcessToolchain;

/// Which compiler produces the WebAssembly artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Backend {
    /// The standard compiler targeting `wasm` on a `js` host.
    #[default]
    Standard,
    /// The size-optimizing compiler.
    Small,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Standard => "standard",
            Backend::Small => "small",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relative locations of the runtime glue inside a toolchain root, in
/// search order.
pub const GLUE_LOCATIONS: [&str; 2] = ["misc/wasm/wasm_exec.js", "lib/wasm/wasm_exec.js"];

/// Searches `root` for the runtime glue.
pub fn find_glue(root: &Path) -> Option<PathBuf> {
    GLUE_LOCATIONS
        .iter()
        .map(|rel| root.join(rel))
        .find(|candidate| candidate.is_file())
}

#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Whether `backend` can be invoked right now.
    fn backend_available(&self, backend: Backend) -> bool;

    /// Runs the module-tidy command in `dir`.
    async fn tidy(&self, dir: &Path) -> Result<()>;

    /// Compiles the program in `dir` to `out` and returns the combined
    /// output of the compiler.
    ///
    /// `out` is absolute. A non-zero exit is a `Toolchain` error carrying
    /// that output.
    async fn compile(&self, dir: &Path, out: &Path, backend: Backend) -> Result<Vec<u8>>;

    /// On-disk directory of `module` as resolved by the toolchain.
    async fn module_dir(&self, module: &str) -> Option<PathBuf>;

    /// The toolchain's downloaded-module cache.
    async fn module_cache(&self) -> Option<PathBuf>;

    /// The toolchain's installation root.
    async fn root(&self) -> Option<PathBuf>;

    /// Location of the runtime glue shipped with the toolchain.
    async fn locate_glue(&self) -> Option<PathBuf> {
        let root = self.root().await?;
        find_glue(&root)
    }
}
