use anyhow::{Context, Result};
use colored::*;
use islet::manifest::route_for_key;
use islet::Manifest;
use std::path::{Path, PathBuf};

use super::{load_config, print_success, print_warning};

pub fn show_manifest(config: Option<&Path>, path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => load_config(config)?.manifest_path(),
    };
    let manifest = Manifest::load(&path).with_context(|| format!("Failed to load {}", path.display()))?;

    for (key, assets) in &manifest.assets {
        println!("{} {}", key.bold(), format!("({})", route_for_key(key)).dimmed());
        for module in &assets.wasm_modules {
            println!("  {} {} {}", "wasm".cyan(), module.hash, module.wasm_path);
        }
        for script in &assets.js_scripts {
            println!("  {} {}", "js".yellow(), script);
        }
    }

    if let Some(asset_root) = path.parent() {
        for url in manifest.missing_files(asset_root) {
            print_warning(&format!("Missing asset: {}", url));
        }
    }
    print_success(&format!("{} page(s) in {}", manifest.len(), path.display()));
    Ok(())
}
