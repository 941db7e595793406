use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{IoContext, Result};

/// Name of the optional project configuration file.
pub const CONFIG_FILE: &str = "islet.toml";

/// How pages are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Static,
    Server,
    Hybrid,
}

impl OutputMode {
    /// Whether the SSR manifest is produced for this mode.
    pub fn needs_manifest(self) -> bool {
        matches!(self, OutputMode::Server | OutputMode::Hybrid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    #[serde(default = "default_pages_dir")]
    pub pages_dir: PathBuf,
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
    /// Root under which ephemeral per-script build directories are created.
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    #[serde(default)]
    pub output: OutputMode,
    #[serde(default)]
    pub dev: bool,
    /// Prefer the size-optimizing backend when it is installed.
    #[serde(default)]
    pub small_backend: bool,
    #[serde(default = "default_hash_len")]
    pub hash_len: usize,
    #[serde(default)]
    pub toolchain: ToolchainConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainConfig {
    #[serde(default = "default_std_bin")]
    pub std_bin: String,
    #[serde(default = "default_small_bin")]
    pub small_bin: String,
    /// Module path of the framework support library required by every script.
    #[serde(default = "default_framework_module")]
    pub framework_module: String,
    /// Version pinned when no local checkout of the framework module is found.
    #[serde(default = "default_framework_version")]
    pub framework_version: String,
    /// Toolchain root override; otherwise taken from the environment or the toolchain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            out_dir: default_out_dir(),
            pages_dir: default_pages_dir(),
            public_dir: default_public_dir(),
            build_dir: default_build_dir(),
            output: OutputMode::default(),
            dev: false,
            small_backend: false,
            hash_len: default_hash_len(),
            toolchain: ToolchainConfig::default(),
        }
    }
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            std_bin: default_std_bin(),
            small_bin: default_small_bin(),
            framework_module: default_framework_module(),
            framework_version: default_framework_version(),
            root: None,
        }
    }
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_pages_dir() -> PathBuf {
    PathBuf::from("pages")
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_build_dir() -> PathBuf {
    PathBuf::from(".islet").join("wasm-build")
}

fn default_hash_len() -> usize {
    8
}

fn default_std_bin() -> String {
    "go".to_string()
}

fn default_small_bin() -> String {
    "tinygo".to_string()
}

fn default_framework_module() -> String {
    "github.com/islet-dev/islet".to_string()
}

fn default_framework_version() -> String {
    crate::build_info::VERSION.to_string()
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .io_context(|| format!("read config {}", path.display()))?;
        let mut config: PipelineConfig = toml::from_str(&content)?;
        config.apply_env();
        config.normalize();
        Ok(config)
    }

    /// Loads `islet.toml` from `root` when present, defaults otherwise.
    pub fn discover(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if path.exists() {
            return Self::load(&path);
        }
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// `ISLET_DEV=1` forces development mode.
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var("ISLET_DEV") {
            self.dev = matches!(value.as_str(), "1" | "true" | "yes");
        }
    }

    fn normalize(&mut self) {
        // Digests shorter than 8 or longer than a full SHA-256 make no sense.
        self.hash_len = self.hash_len.clamp(8, 64);
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.out_dir.join("_assets")
    }

    pub fn wasm_cache_dir(&self) -> PathBuf {
        self.assets_dir().join("wasm")
    }

    pub fn server_dir(&self) -> PathBuf {
        self.out_dir.join("server")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.server_dir().join("_assets").join("wasm-manifest.json")
    }
}
