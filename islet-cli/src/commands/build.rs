use anyhow::Result;
use clap::ValueEnum;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use islet::site::discover_routes;
use islet::{OutputMode, Site, TagParser};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{compiler, load_config, print_info, print_success, print_warning};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Mode {
    Static,
    Server,
    Hybrid,
}

impl From<Mode> for OutputMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Static => OutputMode::Static,
            Mode::Server => OutputMode::Server,
            Mode::Hybrid => OutputMode::Hybrid,
        }
    }
}

pub async fn build_site(config: Option<&Path>, output: Option<Mode>, dev: bool) -> Result<()> {
    let mut config = load_config(config)?;
    if let Some(output) = output {
        config.output = output.into();
    }
    config.dev |= dev;

    let routes = discover_routes(&config.pages_dir)?;
    if routes.is_empty() {
        print_warning(&format!("No pages found in {}", config.pages_dir.display()));
    }
    print_info(&format!("Building {} page(s) ({:?} output)...", routes.len(), config.output));

    let started = Instant::now();
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    spinner.set_message("Compiling scripts...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let site = Site::new(config.clone(), compiler(&config), Arc::new(TagParser));
    let result = site.build(&routes).await;
    spinner.finish_and_clear();
    let report = result?;

    for page in &report.pages {
        println!("  {} {}", "wrote".green(), page.display());
    }
    if let Some(manifest) = &report.manifest {
        println!("  {} {}", "manifest".green(), manifest.display());
    }
    if report.glue.is_empty() {
        print_warning("Runtime glue not copied; install the compiler toolchain to ship wasm_exec.js");
    }

    print_success(&format!(
        "Built {} page(s) in {:.2}s",
        report.pages.len(),
        started.elapsed().as_secs_f64()
    ));
    Ok(())
}
