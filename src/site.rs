//! Output stage: static HTML pages and the server-mode asset tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bundle::{Bundler, PageBundle};
use crate::component::{PageParser, Route};
use crate::config::{OutputMode, PipelineConfig};
use crate::driver::Compiler;
use crate::error::{IoContext, PipelineError, Result};
use crate::inject::{AssetInjector, WasmAsset, GLUE_URL, HMR_CLIENT_URL};
use crate::loader::HMR_RUNTIME;
use crate::manifest::{build_manifest, page_key, route_for_key, Manifest};
use crate::watch::PAGE_EXT;

/// File name of the runtime glue in the output tree.
pub const GLUE_FILE: &str = "wasm_exec.js";

/// HTML file written for a route pattern: `/` is `index.html`, `/a/b` is
/// `a/b/index.html`.
pub fn output_path(out_dir: &Path, pattern: &str) -> PathBuf {
    let trimmed = pattern.trim_matches('/');
    if trimmed.is_empty() {
        return out_dir.join("index.html");
    }
    trimmed
        .split('/')
        .fold(out_dir.to_path_buf(), |path, segment| path.join(segment))
        .join("index.html")
}

/// Rewrites a root-relative URL so it resolves from the page written for
/// `pattern`.
pub fn relative_url(url: &str, pattern: &str) -> String {
    let Some(rest) = url.strip_prefix('/') else {
        return url.to_string();
    };
    let depth = pattern.split('/').filter(|s| !s.is_empty()).count();
    format!("{}{}", "../".repeat(depth), rest)
}

fn relative_bundle(bundle: &PageBundle, pattern: &str) -> PageBundle {
    let relative = |url: &Option<String>| url.as_deref().map(|u| relative_url(u, pattern));
    PageBundle {
        css_url: relative(&bundle.css_url),
        js_url: relative(&bundle.js_url),
        scope_id: bundle.scope_id.clone(),
        wasm: bundle
            .wasm
            .iter()
            .map(|asset| WasmAsset {
                hash: asset.hash.clone(),
                wasm_path: relative_url(&asset.wasm_path, pattern),
                loader_path: relative_url(&asset.loader_path, pattern),
            })
            .collect(),
    }
}

/// Copies every file below `from` into `to`, keeping relative paths.
pub fn mirror_dir(from: &Path, to: &Path) -> Result<usize> {
    if !from.is_dir() {
        return Ok(0);
    }
    let mut copied = 0;
    for entry in walkdir::WalkDir::new(from) {
        let entry = entry.map_err(|err| {
            PipelineError::io(format!("walk {}", from.display()), err.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let dest = to.join(rel);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).io_context(|| format!("create {}", parent.display()))?;
        }
        std::fs::copy(entry.path(), &dest)
            .io_context(|| format!("copy {} to {}", entry.path().display(), dest.display()))?;
        copied += 1;
    }
    Ok(copied)
}

/// Every `.page` file below `pages_dir` as a route, sorted by pattern.
pub fn discover_routes(pages_dir: &Path) -> Result<Vec<Route>> {
    let mut routes = Vec::new();
    if !pages_dir.is_dir() {
        return Ok(routes);
    }
    for entry in walkdir::WalkDir::new(pages_dir) {
        let entry = entry.map_err(|err| {
            PipelineError::io(format!("walk {}", pages_dir.display()), err.into())
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || !path.extension().is_some_and(|ext| ext == PAGE_EXT) {
            continue;
        }
        let pattern = route_for_key(&page_key(pages_dir, path));
        routes.push(Route::page(pattern, path));
    }
    routes.sort_by(|a, b| a.pattern.cmp(&b.pattern));
    Ok(routes)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// HTML pages written in static output.
    pub pages: Vec<PathBuf>,
    /// Manifest written in server output.
    pub manifest: Option<PathBuf>,
    /// Where the runtime glue was copied to.
    pub glue: Vec<PathBuf>,
}

pub struct Site {
    config: PipelineConfig,
    bundler: Bundler,
    parser: Arc<dyn PageParser>,
}

impl std::fmt::Debug for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Site")
            .field("config", &self.config)
            .field("bundler", &self.bundler)
            .finish_non_exhaustive()
    }
}

impl Site {
    pub fn new(config: PipelineConfig, compiler: Arc<Compiler>, parser: Arc<dyn PageParser>) -> Self {
        let bundler = Bundler::new(config.out_dir.clone(), compiler);
        Self { config, bundler, parser }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn bundler(&self) -> &Bundler {
        &self.bundler
    }

    async fn read_component(&self, route: &Route) -> Result<crate::component::Component> {
        let source = tokio::fs::read_to_string(&route.file_path)
            .await
            .io_context(|| format!("read page {}", route.file_path.display()))?;
        self.parser.parse(&source)
    }

    /// Bundles one page and writes its HTML with assets injected.
    ///
    /// The page template stands in for the rendered HTML.
    pub async fn build_static_page(&self, route: &Route) -> Result<PathBuf> {
        let component = self.read_component(route).await?;
        let bundle = self.bundler.bundle_page(&component, &route.file_path).await?;
        let bundle = relative_bundle(&bundle, &route.pattern);

        let injector = AssetInjector::new(self.config.dev)
            .with_glue_url(relative_url(GLUE_URL, &route.pattern));
        let html = injector.inject(
            &component.template,
            bundle.css_url.as_deref(),
            bundle.js_url.as_deref(),
            bundle.scope_id.as_deref(),
            &bundle.wasm,
        );

        let out = output_path(&self.config.out_dir, &route.pattern);
        if let Some(parent) = out.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .io_context(|| format!("create {}", parent.display()))?;
        }
        tokio::fs::write(&out, html)
            .await
            .io_context(|| format!("write {}", out.display()))?;
        tracing::info!(page = %route.file_path.display(), out = %out.display(), "wrote page");
        Ok(out)
    }

    /// Copies the toolchain's runtime glue to `dest`; `None` when the
    /// toolchain ships none.
    pub async fn copy_glue(&self, dest: &Path) -> Result<Option<PathBuf>> {
        let Some(glue) = self.bundler.compiler().toolchain().locate_glue().await else {
            tracing::warn!(dest = %dest.display(), "runtime glue not found, pages with modules will not load");
            return Ok(None);
        };
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .io_context(|| format!("create {}", parent.display()))?;
        }
        tokio::fs::copy(&glue, dest)
            .await
            .io_context(|| format!("copy {} to {}", glue.display(), dest.display()))?;
        Ok(Some(dest.to_path_buf()))
    }

    /// Writes the HMR client below `root` at the URL pages load it from.
    /// Only dev builds reference it.
    pub async fn write_hmr_client(&self, root: &Path) -> Result<Option<PathBuf>> {
        if !self.config.dev {
            return Ok(None);
        }
        let dest = root.join(HMR_CLIENT_URL.trim_start_matches('/'));
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .io_context(|| format!("create {}", parent.display()))?;
        }
        tokio::fs::write(&dest, HMR_RUNTIME)
            .await
            .io_context(|| format!("write {}", dest.display()))?;
        Ok(Some(dest))
    }

    /// Copies the public directory into the output root.
    pub fn copy_public(&self) -> Result<usize> {
        mirror_dir(&self.config.public_dir, &self.config.out_dir)
    }

    /// Writes every non-endpoint page as HTML plus the runtime glue.
    pub async fn build_static(&self, routes: &[Route]) -> Result<BuildReport> {
        let mut report = BuildReport::default();
        self.copy_public()?;
        for route in routes.iter().filter(|r| !r.is_endpoint) {
            report.pages.push(self.build_static_page(route).await?);
        }
        if let Some(glue) = self.copy_glue(&self.config.out_dir.join(GLUE_FILE)).await? {
            report.glue.push(glue);
        }
        self.write_hmr_client(&self.config.out_dir).await?;
        Ok(report)
    }

    /// Builds the manifest, mirrors the assets below the server directory
    /// and places the runtime glue beside it.
    ///
    /// Fails with `GlueNotFound` when some page has modules but the
    /// toolchain ships no glue.
    pub async fn build_server(&self, routes: &[Route]) -> Result<BuildReport> {
        let manifest = build_manifest(
            &self.bundler,
            self.parser.as_ref(),
            &self.config.pages_dir,
            routes,
        )
        .await?;
        let manifest_path = self.config.manifest_path();
        manifest.save(&manifest_path)?;

        let server_assets = self.config.server_dir().join("_assets");
        let copied = mirror_dir(&self.config.assets_dir(), &server_assets)?;
        tracing::debug!(copied, dest = %server_assets.display(), "mirrored assets for server");

        let mut report = BuildReport {
            manifest: Some(manifest_path),
            ..BuildReport::default()
        };
        self.write_hmr_client(&self.config.server_dir()).await?;

        let dest = self.config.server_dir().join(GLUE_FILE);
        match self.copy_glue(&dest).await? {
            Some(glue) => report.glue.push(glue),
            None if has_modules(&manifest) => {
                let root = self.bundler.compiler().toolchain().root().await;
                return Err(PipelineError::GlueNotFound(root));
            }
            None => {}
        }
        Ok(report)
    }

    /// Builds according to the configured output mode.
    pub async fn build(&self, routes: &[Route]) -> Result<BuildReport> {
        match self.config.output {
            OutputMode::Static => self.build_static(routes).await,
            OutputMode::Server => self.build_server(routes).await,
            OutputMode::Hybrid => {
                let mut report = self.build_static(routes).await?;
                let server = self.build_server(routes).await?;
                report.manifest = server.manifest;
                report.glue.extend(server.glue);
                Ok(report)
            }
        }
    }
}

fn has_modules(manifest: &Manifest) -> bool {
    manifest.assets.values().any(|a| !a.wasm_modules.is_empty())
}
