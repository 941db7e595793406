use anyhow::Result;
use colored::*;
use islet::Cache;
use std::path::Path;

use super::{load_config, print_error, print_info, print_success, print_warning, toolchain};

pub async fn doctor_check(config: Option<&Path>, json: bool) -> Result<()> {
    let config = load_config(config)?;
    let report = toolchain(&config).report().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let info = format!(
        "islet {} ({}, built {})",
        islet::build_info::VERSION,
        islet::build_info::GIT_HASH,
        islet::build_info::BUILD_TIME
    );
    print_info(&info);
    println!("{}", "Checking toolchain...".bold());
    println!();

    for status in &report.backends {
        match &status.path {
            Some(path) => print_success(&format!("{} backend: {} ({})", status.backend, status.bin, path.display())),
            None => print_warning(&format!("{} backend: {} not found on PATH", status.backend, status.bin)),
        }
    }

    match &report.root {
        Some(root) => print_info(&format!("Toolchain root: {}", root.display())),
        None => print_warning("Toolchain root unknown"),
    }
    match &report.glue {
        Some(glue) => print_success(&format!("Runtime glue: {}", glue.display())),
        None => print_warning("Runtime glue (wasm_exec.js) not found; pages with modules will not load"),
    }

    match report.selected(config.small_backend) {
        Some(backend) => print_info(&format!("Scripts will compile with the {} backend", backend)),
        None => print_error("No compiler available; scripts cannot be compiled"),
    }

    if !config.pages_dir.is_dir() {
        print_warning(&format!("Pages directory {} does not exist", config.pages_dir.display()));
    }
    let cached = Cache::new(config.wasm_cache_dir()).entries()?;
    let bytes: u64 = cached.iter().map(|e| e.size).sum();
    print_info(&format!("Cached artifacts: {} ({} KB)", cached.len(), bytes / 1024));

    Ok(())
}
