//! The server-mode manifest mapping pages to their compiled assets.
//!
//! Stored as JSON at `<out>/server/_assets/wasm-manifest.json`:
//!
//! ```json
//! {
//!   "assets": {
//!     "blog/post.page": {
//!       "wasmModules": [
//!         { "hash": "ba7816bf",
//!           "wasmPath": "/_assets/wasm/script-ba7816bf.wasm",
//!           "loaderPath": "/_assets/script-ba7816bf-loader.js" }
//!       ],
//!       "jsScripts": ["/_assets/script-0c1d2e3f.js"]
//!     }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component as PathComponent, Path, PathBuf};

use crate::bundle::Bundler;
use crate::component::{PageParser, Route};
use crate::error::{IoContext, Result};
use crate::inject::{insert_before, module_script_tag, AssetInjector, WasmAsset};

pub const MANIFEST_FILE: &str = "wasm-manifest.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageAssets {
    #[serde(default)]
    pub wasm_modules: Vec<WasmAsset>,
    #[serde(default)]
    pub js_scripts: Vec<String>,
}

impl PageAssets {
    pub fn is_empty(&self) -> bool {
        self.wasm_modules.is_empty() && self.js_scripts.is_empty()
    }

    /// Every asset URL this page references.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.wasm_modules
            .iter()
            .flat_map(|m| [m.wasm_path.as_str(), m.loader_path.as_str()])
            .chain(self.js_scripts.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub assets: BTreeMap<String, PageAssets>,
}

/// Manifest key of `file_path`: its path below `pages_dir`, `/`-separated.
pub fn page_key(pages_dir: &Path, file_path: &Path) -> String {
    let rel = file_path.strip_prefix(pages_dir).unwrap_or(file_path);
    rel.components()
        .filter_map(|c| match c {
            PathComponent::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// URL path served for a manifest key: extension dropped, `index` mapped
/// to its directory.
pub fn route_for_key(key: &str) -> String {
    let (dir, file) = match key.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, key),
    };
    let stem = file.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(file);
    match (dir, stem) {
        (None, "index") => "/".to_string(),
        (Some(dir), "index") => format!("/{}", dir),
        (None, stem) => format!("/{}", stem),
        (Some(dir), stem) => format!("/{}/{}", dir, stem),
    }
}

fn normalize_url(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, assets: PageAssets) {
        self.assets.insert(key.into(), assets);
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .io_context(|| format!("read manifest {}", path.display()))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .io_context(|| format!("create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).io_context(|| format!("write manifest {}", path.display()))?;
        tracing::info!(path = %path.display(), pages = self.assets.len(), "wrote manifest");
        Ok(())
    }

    /// Assets of the page stored under `page_key`.
    pub fn resolve(&self, page_key: &str) -> Option<&PageAssets> {
        self.assets.get(page_key)
    }

    /// Assets of the page served at `url`.
    pub fn resolve_url(&self, url: &str) -> Option<(&str, &PageAssets)> {
        let url = normalize_url(url);
        self.assets
            .iter()
            .find(|(key, _)| route_for_key(key) == url)
            .map(|(key, assets)| (key.as_str(), assets))
    }

    /// Referenced URLs with no file under `asset_root`, which serves
    /// `/_assets`.
    pub fn missing_files(&self, asset_root: &Path) -> Vec<String> {
        self.assets
            .values()
            .flat_map(PageAssets::urls)
            .filter(|url| {
                let rel = url.trim_start_matches('/').trim_start_matches("_assets/");
                !asset_root.join(rel).is_file()
            })
            .map(str::to_string)
            .collect()
    }
}

/// Splices a page's manifest entry into server-rendered HTML.
///
/// Glue and loaders go in through the [`AssetInjector`] rules; each JS
/// bundle follows as a module script.
pub fn inject_page_assets(html: &str, assets: &PageAssets, injector: &AssetInjector) -> String {
    let mut html = injector.inject(html, None, None, None, &assets.wasm_modules);
    for js in &assets.js_scripts {
        html = insert_before(&html, "</body>", &module_script_tag(js));
    }
    html
}

/// Compiles and bundles every page route and records its assets.
///
/// Endpoints and pages with neither modules nor scripts are skipped.
pub async fn build_manifest(
    bundler: &Bundler,
    parser: &dyn PageParser,
    pages_dir: &Path,
    routes: &[Route],
) -> Result<Manifest> {
    let mut manifest = Manifest::new();
    for route in routes.iter().filter(|r| !r.is_endpoint) {
        let source = tokio::fs::read_to_string(&route.file_path)
            .await
            .io_context(|| format!("read page {}", route.file_path.display()))?;
        let component = parser.parse(&source)?;

        let wasm_modules = bundler.bundle_wasm_scripts(&component, &route.file_path).await?;
        let js_scripts: Vec<String> = bundler.bundle_scripts(&component)?.into_iter().collect();
        let assets = PageAssets { wasm_modules, js_scripts };
        if assets.is_empty() {
            continue;
        }
        manifest.insert(page_key(pages_dir, &route.file_path), assets);
    }
    Ok(manifest)
}

/// Default manifest location below the server output directory.
pub fn manifest_path(server_dir: &Path) -> PathBuf {
    server_dir.join("_assets").join(MANIFEST_FILE)
}
