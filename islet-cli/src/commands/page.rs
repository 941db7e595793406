use anyhow::Result;
use islet::manifest::{page_key, route_for_key};
use islet::site::GLUE_FILE;
use islet::{Route, Site, TagParser};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{compiler, load_config, print_info, print_success};

pub async fn build_page(config: Option<&Path>, page: &Path, out: Option<PathBuf>) -> Result<()> {
    let mut config = load_config(config)?;
    if let Some(out) = out {
        config.out_dir = out;
    }

    let page = std::path::absolute(page)?;
    let pattern = if page.starts_with(&config.pages_dir) {
        route_for_key(&page_key(&config.pages_dir, &page))
    } else {
        let name = page.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        route_for_key(&name)
    };
    let route = Route::page(pattern, &page);

    let out_dir = config.out_dir.clone();
    let site = Site::new(config.clone(), compiler(&config), Arc::new(TagParser));
    let written = site.build_static_page(&route).await?;
    print_success(&format!("{} -> {}", route.pattern, written.display()));

    if site.copy_glue(&out_dir.join(GLUE_FILE)).await?.is_none() {
        print_info("No runtime glue found; pages with modules need wasm_exec.js beside them");
    }
    Ok(())
}
