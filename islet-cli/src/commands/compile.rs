use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

use super::{compiler, load_config, print_error, print_success, read_source};

pub async fn compile_script(config: Option<&Path>, script: &Path, page: &Path) -> Result<()> {
    let config = load_config(config)?;
    let source = read_source(script)?;
    let compiler = compiler(&config);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    spinner.set_message(format!("Compiling {} ({} backend)...", script.display(), compiler.backend()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = compiler.compile(&source, page).await;
    spinner.finish_and_clear();

    match result {
        Ok(module) => {
            print_success(&format!("{} -> {}", module.hash, module.wasm_path.display()));
            Ok(())
        }
        Err(err) => {
            print_error(&format!("Compilation of {} failed", script.display()));
            Err(err.into())
        }
    }
}
