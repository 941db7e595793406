//! Compiles prepared scripts into cached WebAssembly artifacts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::cache::Cache;
use crate::config::PipelineConfig;
use crate::error::{IoContext, PipelineError, Result};
use crate::flight::Flights;
use crate::hash::{content_hash, DEFAULT_HASH_LEN};
use crate::module_file::{FrameworkModule, MODULE_FILE};
use crate::prepare::{prepare, PrepareOptions, PreparedProgram};
use crate::toolchain::{Backend, Toolchain};

/// Main source file of the generated program.
pub const MAIN_FILE: &str = "main.go";

/// Artifact name inside the ephemeral build directory.
pub const BUILD_OUTPUT: &str = "script.wasm";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledModule {
    pub hash: String,
    pub wasm_path: PathBuf,
}

type SharedResult = std::result::Result<CompiledModule, Arc<PipelineError>>;

pub struct Compiler {
    toolchain: Arc<dyn Toolchain>,
    cache: Cache,
    build_root: PathBuf,
    hash_len: usize,
    small_backend: bool,
    framework: FrameworkModule,
    flights: Flights<SharedResult>,
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("cache", &self.cache)
            .field("build_root", &self.build_root)
            .field("hash_len", &self.hash_len)
            .field("small_backend", &self.small_backend)
            .field("framework", &self.framework)
            .finish_non_exhaustive()
    }
}

/// The module key for hot-reload state: the page file's basename.
pub fn module_id(page_path: &Path) -> String {
    page_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| page_path.to_string_lossy().into_owned())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().io_context(|| "resolve current directory")?;
    Ok(cwd.join(path))
}

fn list_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

impl Compiler {
    pub fn new(
        toolchain: Arc<dyn Toolchain>,
        cache_dir: impl Into<PathBuf>,
        build_root: impl Into<PathBuf>,
        framework: FrameworkModule,
    ) -> Self {
        Self {
            toolchain,
            cache: Cache::new(cache_dir),
            build_root: build_root.into(),
            hash_len: DEFAULT_HASH_LEN,
            small_backend: false,
            framework,
            flights: Flights::new(),
        }
    }

    pub fn from_config(config: &PipelineConfig, toolchain: Arc<dyn Toolchain>) -> Self {
        let framework = FrameworkModule::new(
            config.toolchain.framework_module.clone(),
            config.toolchain.framework_version.clone(),
        );
        Self::new(toolchain, config.wasm_cache_dir(), config.build_dir.clone(), framework)
            .with_hash_len(config.hash_len)
            .with_small_backend(config.small_backend)
    }

    pub fn with_hash_len(mut self, hash_len: usize) -> Self {
        self.hash_len = hash_len;
        self
    }

    pub fn with_small_backend(mut self, small_backend: bool) -> Self {
        self.small_backend = small_backend;
        self
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn toolchain(&self) -> &Arc<dyn Toolchain> {
        &self.toolchain
    }

    pub fn hash(&self, source: &str) -> String {
        content_hash(source, self.hash_len)
    }

    /// The size-optimizing backend when requested and installed.
    pub fn backend(&self) -> Backend {
        if self.small_backend && self.toolchain.backend_available(Backend::Small) {
            Backend::Small
        } else {
            Backend::Standard
        }
    }

    /// The program that would be compiled for `source` on `page_path`.
    pub fn prepare(&self, source: &str, page_path: &Path) -> PreparedProgram {
        let hash = self.hash(source);
        let module_id = module_id(page_path);
        prepare(
            source,
            &PrepareOptions {
                module_id: &module_id,
                hash: &hash,
                backend: self.backend(),
            },
        )
    }

    /// Compiles `source`, reusing the cached artifact for its hash.
    ///
    /// Concurrent calls for the same hash share a single build. Dropping the
    /// returned future kills the compiler and removes the build directory.
    pub async fn compile(&self, source: &str, page_path: &Path) -> Result<CompiledModule> {
        let hash = self.hash(source);
        if let Some(wasm_path) = self.cache.lookup(&hash) {
            tracing::debug!(%hash, path = %wasm_path.display(), "cache hit");
            return Ok(CompiledModule { hash, wasm_path });
        }

        self.flights
            .run(&hash, || async {
                self.build(source, page_path, &hash).await.map_err(Arc::new)
            })
            .await
            .map_err(PipelineError::from_shared)
    }

    async fn build(&self, source: &str, page_path: &Path, hash: &str) -> Result<CompiledModule> {
        // A previous leader may have finished between the lookup and the join.
        if let Some(wasm_path) = self.cache.lookup(hash) {
            return Ok(CompiledModule { hash: hash.to_string(), wasm_path });
        }

        let started = Instant::now();
        let build_root = absolute(&self.build_root)?;
        tokio::fs::create_dir_all(&build_root)
            .await
            .io_context(|| format!("create build root {}", build_root.display()))?;
        let build_dir = tempfile::Builder::new()
            .prefix(&format!("{}-", hash))
            .tempdir_in(&build_root)
            .io_context(|| format!("create build dir in {}", build_root.display()))?;
        let dir = build_dir.path();

        let backend = self.backend();
        let module_id = module_id(page_path);
        let program = prepare(
            source,
            &PrepareOptions {
                module_id: &module_id,
                hash,
                backend,
            },
        );

        let main_file = dir.join(MAIN_FILE);
        tokio::fs::write(&main_file, &program.source)
            .await
            .io_context(|| format!("write {}", main_file.display()))?;

        let requirement = self.framework.resolve(self.toolchain.as_ref()).await;
        let module_file = dir.join(MODULE_FILE);
        tokio::fs::write(&module_file, self.framework.manifest(&requirement))
            .await
            .io_context(|| format!("write {}", module_file.display()))?;

        self.toolchain.tidy(dir).await?;

        let out = dir.join(BUILD_OUTPUT);
        let output = self.toolchain.compile(dir, &out, backend).await?;

        if !out.is_file() {
            return Err(PipelineError::MissingArtifact {
                path: out,
                output: String::from_utf8_lossy(&output).into_owned(),
                files: list_files(dir),
            });
        }

        let wasm_path = self.cache.install(&out, hash)?;
        tracing::info!(
            %hash,
            %backend,
            module_id = %module_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            path = %wasm_path.display(),
            "compiled script"
        );

        Ok(CompiledModule { hash: hash.to_string(), wasm_path })
    }
}
