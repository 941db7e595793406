//! Dev-mode page watching: file changes in, HMR messages out.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::bundle::Bundler;
use crate::component::PageParser;
use crate::driver::module_id;
use crate::error::{IoContext, Result};
use crate::inject::WasmAsset;
use crate::manifest::{page_key, Manifest, PageAssets};
use crate::runtime::HmrMessage;

/// Extension of page source files.
pub const PAGE_EXT: &str = "page";

fn is_page(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == PAGE_EXT)
}

/// Watches a pages directory and yields changed page files.
pub struct PageWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<PathBuf>,
    pending: VecDeque<PathBuf>,
}

impl PageWatcher {
    pub fn new(pages_dir: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    return;
                }
                for path in event.paths.into_iter().filter(|p| is_page(p)) {
                    // The receiver is gone once the watcher is dropped.
                    let _ = tx.send(path);
                }
            }
            Err(err) => tracing::warn!(%err, "watch error"),
        })?;
        watcher.watch(pages_dir, RecursiveMode::Recursive)?;
        tracing::info!(dir = %pages_dir.display(), "watching pages");
        Ok(Self {
            _watcher: watcher,
            rx,
            pending: VecDeque::new(),
        })
    }

    /// Next changed page. Editors often emit several events per save, so
    /// repeats already queued are collapsed.
    pub async fn next_change(&mut self) -> Option<PathBuf> {
        let path = match self.pending.pop_front() {
            Some(path) => path,
            None => self.rx.recv().await?,
        };
        while let Ok(queued) = self.rx.try_recv() {
            if queued != path && !self.pending.contains(&queued) {
                self.pending.push_back(queued);
            }
        }
        Some(path)
    }
}

/// Turns page changes into messages for connected pages, tracking what
/// each page currently loads.
pub struct Reloader {
    bundler: Arc<Bundler>,
    parser: Arc<dyn PageParser>,
    pages_dir: PathBuf,
    manifest: Manifest,
}

impl Reloader {
    pub fn new(bundler: Arc<Bundler>, parser: Arc<dyn PageParser>, pages_dir: impl Into<PathBuf>) -> Self {
        Self {
            bundler,
            parser,
            pages_dir: pages_dir.into(),
            manifest: Manifest::new(),
        }
    }

    /// Starts from an existing manifest so the first change of an already
    /// built page swaps only what differs.
    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Rebuilds `page` and reports what the page must do.
    ///
    /// Changed modules become `wasm_reload` messages (see [`module_swaps`]);
    /// a page without modules gets a full reload; a failed build becomes an
    /// `error` message and the page keeps its old modules.
    pub async fn page_changed(&mut self, page: &Path) -> Vec<HmrMessage> {
        match self.rebuild(page).await {
            Ok(messages) => messages,
            Err(err) => {
                tracing::error!(page = %page.display(), %err, "rebuild failed");
                vec![HmrMessage::Error { message: err.to_string() }]
            }
        }
    }

    async fn rebuild(&mut self, page: &Path) -> Result<Vec<HmrMessage>> {
        let source = tokio::fs::read_to_string(page)
            .await
            .io_context(|| format!("read page {}", page.display()))?;
        let component = self.parser.parse(&source)?;
        let key = page_key(&self.pages_dir, page);

        if !component.has_wasm() {
            self.manifest.assets.remove(&key);
            return Ok(vec![HmrMessage::Reload]);
        }

        let wasm_modules = self.bundler.bundle_wasm_scripts(&component, page).await?;
        let js_scripts: Vec<String> = self.bundler.bundle_scripts(&component)?.into_iter().collect();

        let previous = self.manifest.resolve(&key).cloned().unwrap_or_default();
        let messages = if previous.js_scripts != js_scripts {
            vec![HmrMessage::Reload]
        } else {
            module_swaps(&module_id(page), &previous.wasm_modules, &wasm_modules)
        };

        self.manifest.insert(key, PageAssets { wasm_modules, js_scripts });
        Ok(messages)
    }
}

/// Messages that move a page from the `previous` modules to `current`.
///
/// Modules pair up by position and only changed pairs are swapped, each
/// replacing its own instance. A page seen for the first time swaps its
/// only module; once the number of modules changes, or a first-seen page
/// has several, the page reloads.
pub fn module_swaps(module_id: &str, previous: &[WasmAsset], current: &[WasmAsset]) -> Vec<HmrMessage> {
    match (previous, current) {
        ([], [only]) => vec![HmrMessage::wasm_reload(module_id, only)],
        _ if previous.len() != current.len() => vec![HmrMessage::Reload],
        _ => previous
            .iter()
            .zip(current)
            .filter(|(old, new)| old.hash != new.hash)
            .map(|(old, new)| HmrMessage::wasm_swap(module_id, old, new))
            .collect(),
    }
}
