use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;

use super::probe::{BackendStatus, CachedProbe, ProbeReport};
use super::{find_glue, Backend, Toolchain};
use crate::config::ToolchainConfig;
use crate::error::{PipelineError, Result};

/// Environment variable naming the toolchain root.
pub const ROOT_ENV: &str = "GOROOT";

/// Drives the real compiler executables as child processes.
///
/// Every child is spawned with `kill_on_drop`, so dropping a pending
/// compile future terminates the compiler.
#[derive(Debug)]
pub struct ProcessToolchain {
    config: ToolchainConfig,
    standard: CachedProbe,
    small: CachedProbe,
}

fn combined(output: &Output) -> Vec<u8> {
    let mut bytes = output.stdout.clone();
    bytes.extend_from_slice(&output.stderr);
    bytes
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl ProcessToolchain {
    pub fn new(config: ToolchainConfig) -> Self {
        let standard = CachedProbe::new(config.std_bin.clone());
        let small = CachedProbe::new(config.small_bin.clone());
        Self { config, standard, small }
    }

    pub fn config(&self) -> &ToolchainConfig {
        &self.config
    }

    fn probe(&self, backend: Backend) -> &CachedProbe {
        match backend {
            Backend::Standard => &self.standard,
            Backend::Small => &self.small,
        }
    }

    async fn run<I, S>(&self, dir: Option<&Path>, bin: &str, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(bin);
        cmd.args(args).kill_on_drop(true);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        cmd.output()
            .await
            .map_err(|source| PipelineError::io(format!("spawn {}", bin), source))
    }

    /// Value of `<std-bin> env <name>`, if the toolchain reports one.
    async fn env_value(&self, name: &str) -> Option<PathBuf> {
        let output = self.run(None, &self.config.std_bin, ["env", name]).await.ok()?;
        if !output.status.success() {
            return None;
        }
        let value = lossy(&output.stdout).trim().to_string();
        (!value.is_empty()).then(|| PathBuf::from(value))
    }

    /// Backend availability, the toolchain root and the glue location.
    pub async fn report(&self) -> ProbeReport {
        let backends = [Backend::Standard, Backend::Small]
            .into_iter()
            .map(|backend| {
                let probe = self.probe(backend);
                BackendStatus {
                    backend: backend.as_str(),
                    bin: probe.bin().to_string(),
                    path: probe.path().cloned(),
                }
            })
            .collect();
        let root = self.root().await;
        let glue = match &root {
            Some(root) => find_glue(root),
            None => None,
        };
        ProbeReport { backends, root, glue }
    }
}

#[async_trait]
impl Toolchain for ProcessToolchain {
    fn backend_available(&self, backend: Backend) -> bool {
        self.probe(backend).available()
    }

    async fn tidy(&self, dir: &Path) -> Result<()> {
        tracing::debug!(dir = %dir.display(), "running module tidy");
        let output = self
            .run(Some(dir), &self.config.std_bin, ["mod", "tidy"])
            .await?;
        if !output.status.success() {
            return Err(PipelineError::Tidy {
                output: lossy(&combined(&output)),
            });
        }
        Ok(())
    }

    async fn compile(&self, dir: &Path, out: &Path, backend: Backend) -> Result<Vec<u8>> {
        let mut cmd = match backend {
            Backend::Small => {
                let mut cmd = Command::new(&self.config.small_bin);
                cmd.arg("build")
                    .arg("-o")
                    .arg(out)
                    .args(["-target", "wasm", "."]);
                cmd
            }
            Backend::Standard => {
                let mut cmd = Command::new(&self.config.std_bin);
                cmd.arg("build")
                    .arg("-o")
                    .arg(out)
                    .arg(".")
                    .env("GOOS", "js")
                    .env("GOARCH", "wasm");
                cmd
            }
        };
        cmd.current_dir(dir).kill_on_drop(true);

        tracing::debug!(%backend, dir = %dir.display(), out = %out.display(), "invoking compiler");
        let output = cmd.output().await.map_err(|source| {
            PipelineError::io(format!("spawn {} compiler", backend), source)
        })?;

        let bytes = combined(&output);
        if !output.status.success() {
            return Err(PipelineError::Toolchain { output: lossy(&bytes) });
        }
        Ok(bytes)
    }

    async fn module_dir(&self, module: &str) -> Option<PathBuf> {
        let output = self
            .run(None, &self.config.std_bin, ["list", "-m", "-f", "{{.Dir}}", module])
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let dir = lossy(&output.stdout).trim().to_string();
        (!dir.is_empty()).then(|| PathBuf::from(dir))
    }

    async fn module_cache(&self) -> Option<PathBuf> {
        self.env_value("GOMODCACHE").await
    }

    async fn root(&self) -> Option<PathBuf> {
        if let Some(root) = &self.config.root {
            return Some(root.clone());
        }
        if let Some(root) = std::env::var_os(ROOT_ENV).filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(root));
        }
        self.env_value(ROOT_ENV).await
    }
}
