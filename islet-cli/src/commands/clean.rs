use anyhow::Result;
use islet::Cache;
use std::path::Path;

use super::{load_config, print_success};

pub fn clean_cache(config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let cache = Cache::new(config.wasm_cache_dir());
    let removed = cache.clear()?;
    print_success(&format!("Removed {} cached artifact(s) from {}", removed, cache.dir().display()));
    Ok(())
}
