use anyhow::{Context, Result};
use colored::*;
use islet::config::CONFIG_FILE;
use islet::{Compiler, PipelineConfig, ProcessToolchain, Toolchain};
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod build;
mod clean;
mod compile;
mod doctor;
mod manifest;
mod page;
mod prepare;
mod watch;

pub use build::{build_site, Mode};
pub use clean::clean_cache;
pub use compile::compile_script;
pub use doctor::doctor_check;
pub use manifest::show_manifest;
pub use page::build_page;
pub use prepare::prepare_script;
pub use watch::watch_pages;

/// Nearest directory at or above the current one holding `islet.toml`;
/// the current directory when there is none.
pub fn find_project_root() -> Result<PathBuf> {
    let current = std::env::current_dir()?;
    let mut path = current.as_path();

    loop {
        if path.join(CONFIG_FILE).exists() {
            return Ok(path.to_path_buf());
        }
        match path.parent() {
            Some(parent) => path = parent,
            None => return Ok(current),
        }
    }
}

fn rooted(root: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = root.join(&*path);
    }
}

/// Loads the project configuration with every directory made absolute
/// against the project root.
pub fn load_config(explicit: Option<&Path>) -> Result<PipelineConfig> {
    let (root, mut config) = match explicit {
        Some(path) => {
            let config = PipelineConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            let root = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or(std::env::current_dir()?);
            (root, config)
        }
        None => {
            let root = find_project_root()?;
            let config = PipelineConfig::discover(&root)
                .with_context(|| format!("Failed to load {}", root.join(CONFIG_FILE).display()))?;
            (root, config)
        }
    };

    rooted(&root, &mut config.out_dir);
    rooted(&root, &mut config.pages_dir);
    rooted(&root, &mut config.public_dir);
    rooted(&root, &mut config.build_dir);
    Ok(config)
}

pub fn toolchain(config: &PipelineConfig) -> Arc<ProcessToolchain> {
    Arc::new(ProcessToolchain::new(config.toolchain.clone()))
}

pub fn compiler(config: &PipelineConfig) -> Arc<Compiler> {
    let toolchain: Arc<dyn Toolchain> = toolchain(config);
    Arc::new(Compiler::from_config(config, toolchain))
}

pub fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}
