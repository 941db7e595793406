//! A stand-in compiler toolchain and a scratch project for the integration
//! tests.

#![allow(dead_code)]

use async_trait::async_trait;
use islet::toolchain::{Backend, Toolchain};
use islet::{Compiler, PipelineConfig, PipelineError, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const WASM_MAGIC: &[u8] = b"\0asm\x01\0\0\0";

/// Writes `WASM_MAGIC` followed by the program text, counting every call.
///
/// A program line with an unbalanced `"` fails like a real compiler would.
pub struct StubToolchain {
    root: PathBuf,
    pub compiles: AtomicUsize,
    pub tidies: AtomicUsize,
    pub delay: Duration,
    pub with_glue: bool,
    pub small: bool,
    pub skip_artifact: bool,
}

impl StubToolchain {
    pub fn new(root: &Path) -> Self {
        let glue = root.join("misc/wasm");
        std::fs::create_dir_all(&glue).unwrap();
        std::fs::write(glue.join("wasm_exec.js"), "// runtime glue\n").unwrap();
        Self {
            root: root.to_path_buf(),
            compiles: AtomicUsize::new(0),
            tidies: AtomicUsize::new(0),
            delay: Duration::ZERO,
            with_glue: true,
            small: false,
            skip_artifact: false,
        }
    }

    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }
}

fn unbalanced_string(program: &str) -> Option<(usize, &str)> {
    program.lines().enumerate().find(|(_, line)| {
        let stripped = line.replace("\\\\", "").replace("\\\"", "");
        stripped.matches('"').count() % 2 == 1
    })
}

#[async_trait]
impl Toolchain for StubToolchain {
    fn backend_available(&self, backend: Backend) -> bool {
        match backend {
            Backend::Standard => true,
            Backend::Small => self.small,
        }
    }

    async fn tidy(&self, dir: &Path) -> Result<()> {
        assert!(dir.join("go.mod").is_file(), "module file written before tidy");
        self.tidies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn compile(&self, dir: &Path, out: &Path, _backend: Backend) -> Result<Vec<u8>> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let program = std::fs::read_to_string(dir.join("main.go")).unwrap();
        if let Some((line, _)) = unbalanced_string(&program) {
            return Err(PipelineError::Toolchain {
                output: format!("./main.go:{}:1: newline in string", line + 1),
            });
        }
        if !self.skip_artifact {
            let mut bytes = WASM_MAGIC.to_vec();
            bytes.extend_from_slice(program.as_bytes());
            std::fs::write(out, bytes).unwrap();
        }
        Ok(b"stub build ok\n".to_vec())
    }

    async fn module_dir(&self, _module: &str) -> Option<PathBuf> {
        None
    }

    async fn module_cache(&self) -> Option<PathBuf> {
        None
    }

    async fn root(&self) -> Option<PathBuf> {
        self.with_glue.then(|| self.root.clone())
    }
}

/// A scratch project with `pages/`, `dist/` and a stub toolchain.
pub struct Project {
    pub dir: TempDir,
    pub config: PipelineConfig,
    pub toolchain: Arc<StubToolchain>,
    pub compiler: Arc<Compiler>,
}

impl Project {
    pub fn new() -> Self {
        Self::with_toolchain(|_| {})
    }

    pub fn with_toolchain(tweak: impl FnOnce(&mut StubToolchain)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let config = PipelineConfig {
            out_dir: root.join("dist"),
            pages_dir: root.join("pages"),
            public_dir: root.join("public"),
            build_dir: root.join("build"),
            ..PipelineConfig::default()
        };
        let mut stub = StubToolchain::new(&root.join("toolchain"));
        tweak(&mut stub);
        let toolchain = Arc::new(stub);
        let compiler = Arc::new(Compiler::from_config(&config, toolchain.clone()));
        Self { dir, config, toolchain, compiler }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write_page(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.config.pages_dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Entries left in the build root once builds have finished.
    pub fn leftover_build_dirs(&self) -> usize {
        std::fs::read_dir(&self.config.build_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

pub fn page(body: &str, scripts: &[(&str, &str)]) -> String {
    let mut page = format!("<html><head><title>t</title></head><body>{}</body></html>\n", body);
    for (attrs, content) in scripts {
        page.push_str(&format!("<script {}>\n{}\n</script>\n", attrs, content));
    }
    page
}
