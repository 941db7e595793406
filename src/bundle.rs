//! Per-page asset bundling: styles, JavaScript, and compiled modules.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::artifact_name;
use crate::component::Component;
use crate::driver::{module_id, Compiler};
use crate::error::{IoContext, Result};
use crate::hash::{content_hash, scope_id, DEFAULT_HASH_LEN};
use crate::inject::{WasmAsset, SCOPE_PREFIX};
use crate::loader::{loader, loader_file_name};

/// URL prefix of everything under `<out>/_assets`.
pub const ASSETS_URL: &str = "/_assets";

/// Everything a page needs injected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageBundle {
    pub css_url: Option<String>,
    pub js_url: Option<String>,
    pub scope_id: Option<String>,
    pub wasm: Vec<WasmAsset>,
}

/// Prefixes every rule selector of `css` with the scope attribute.
///
/// Works line by line: a line containing `{` is treated as a rule header.
/// At-rules and comments pass through unchanged.
pub fn scope_css(css: &str, scope_attr: &str) -> String {
    let mut scoped = String::with_capacity(css.len());
    for line in css.lines() {
        let trimmed = line.trim();
        let header = trimmed
            .split_once('{')
            .filter(|_| !trimmed.starts_with("/*") && !trimmed.starts_with('@'));
        match header {
            Some((selector, rest)) => {
                let selectors = selector
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| format!("[{}] {}", scope_attr, s))
                    .collect::<Vec<_>>()
                    .join(", ");
                scoped.push_str(&format!("{} {{{}\n", selectors, rest));
            }
            None => {
                scoped.push_str(line);
                scoped.push('\n');
            }
        }
    }
    scoped
}

pub struct Bundler {
    out_dir: PathBuf,
    compiler: Arc<Compiler>,
    scope_prefix: String,
}

impl std::fmt::Debug for Bundler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bundler")
            .field("out_dir", &self.out_dir)
            .field("scope_prefix", &self.scope_prefix)
            .finish_non_exhaustive()
    }
}

impl Bundler {
    pub fn new(out_dir: impl Into<PathBuf>, compiler: Arc<Compiler>) -> Self {
        Self {
            out_dir: out_dir.into(),
            compiler,
            scope_prefix: SCOPE_PREFIX.to_string(),
        }
    }

    pub fn compiler(&self) -> &Arc<Compiler> {
        &self.compiler
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.out_dir.join("_assets")
    }

    pub fn wasm_dir(&self) -> PathBuf {
        self.assets_dir().join("wasm")
    }

    fn write_asset(&self, file_name: &str, content: &str) -> Result<String> {
        let dir = self.assets_dir();
        std::fs::create_dir_all(&dir).io_context(|| format!("create {}", dir.display()))?;
        let path = dir.join(file_name);
        std::fs::write(&path, content).io_context(|| format!("write {}", path.display()))?;
        Ok(format!("{}/{}", ASSETS_URL, file_name))
    }

    /// Concatenates the page's styles, scoping the scoped ones, into
    /// `styles-<hash>.css`. Returns its URL.
    pub fn bundle_styles(&self, component: &Component, page_path: &Path) -> Result<Option<String>> {
        if component.styles.is_empty() {
            return Ok(None);
        }
        let scope = scope_id(&page_path.to_string_lossy());
        let attr = format!("data-{}-{}", self.scope_prefix, scope);

        let mut combined = String::new();
        for style in &component.styles {
            if style.scoped {
                combined.push_str(&scope_css(&style.content, &attr));
            } else {
                combined.push_str(&style.content);
            }
            combined.push('\n');
        }

        let name = format!("styles-{}.css", content_hash(&combined, DEFAULT_HASH_LEN));
        self.write_asset(&name, &combined).map(Some)
    }

    /// Concatenates every script that is not compiled to WebAssembly into
    /// `script-<hash>.js`. Returns its URL.
    pub fn bundle_scripts(&self, component: &Component) -> Result<Option<String>> {
        let combined = component
            .scripts
            .iter()
            .filter(|s| !s.is_wasm())
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if combined.is_empty() {
            return Ok(None);
        }

        let name = format!("script-{}.js", content_hash(&combined, DEFAULT_HASH_LEN));
        self.write_asset(&name, &combined).map(Some)
    }

    /// Compiles every WebAssembly script of the page in source order and
    /// writes its artifact and loader under the assets directory.
    ///
    /// Scripts that hash identically yield one asset.
    pub async fn bundle_wasm_scripts(
        &self,
        component: &Component,
        page_path: &Path,
    ) -> Result<Vec<WasmAsset>> {
        let mut assets = Vec::new();
        let mut seen = HashSet::new();
        let module = module_id(page_path);

        for script in component.wasm_scripts() {
            let compiled = self.compiler.compile(&script.content, page_path).await?;
            if !seen.insert(compiled.hash.clone()) {
                continue;
            }

            let wasm_name = artifact_name(&compiled.hash);
            let wasm_dir = self.wasm_dir();
            let dest = wasm_dir.join(&wasm_name);
            tokio::fs::create_dir_all(&wasm_dir)
                .await
                .io_context(|| format!("create {}", wasm_dir.display()))?;
            if compiled.wasm_path != dest {
                tokio::fs::copy(&compiled.wasm_path, &dest)
                    .await
                    .io_context(|| format!("copy {} to {}", compiled.wasm_path.display(), dest.display()))?;
            }

            let wasm_url = format!("{}/wasm/{}", ASSETS_URL, wasm_name);
            let loader_name = loader_file_name(&compiled.hash);
            let loader_path = self.assets_dir().join(&loader_name);
            tokio::fs::write(&loader_path, loader(&wasm_url, &module))
                .await
                .io_context(|| format!("write {}", loader_path.display()))?;

            assets.push(WasmAsset {
                hash: compiled.hash,
                wasm_path: wasm_url,
                loader_path: format!("{}/{}", ASSETS_URL, loader_name),
            });
        }

        Ok(assets)
    }

    /// Styles, scripts and modules for one page.
    pub async fn bundle_page(&self, component: &Component, page_path: &Path) -> Result<PageBundle> {
        let css_url = self.bundle_styles(component, page_path)?;
        let js_url = self.bundle_scripts(component)?;
        let wasm = self.bundle_wasm_scripts(component, page_path).await?;
        let scope_id = component
            .styles
            .iter()
            .any(|s| s.scoped)
            .then(|| scope_id(&page_path.to_string_lossy()));
        tracing::debug!(
            page = %page_path.display(),
            css = css_url.is_some(),
            js = js_url.is_some(),
            modules = wasm.len(),
            "bundled page"
        );
        Ok(PageBundle { css_url, js_url, scope_id, wasm })
    }
}
