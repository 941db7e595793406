use anyhow::Result;
use islet::{Bundler, Manifest, PageWatcher, Reloader, TagParser};
use std::path::Path;
use std::sync::Arc;

use super::{compiler, load_config, print_info};

pub async fn watch_pages(config: Option<&Path>) -> Result<()> {
    let mut config = load_config(config)?;
    config.dev = true;

    let bundler = Arc::new(Bundler::new(config.out_dir.clone(), compiler(&config)));
    let mut reloader = Reloader::new(bundler, Arc::new(TagParser), config.pages_dir.clone());
    if let Ok(manifest) = Manifest::load(&config.manifest_path()) {
        reloader = reloader.with_manifest(manifest);
    }

    let mut watcher = PageWatcher::new(&config.pages_dir)?;
    print_info(&format!("Watching {} (Ctrl-C to stop)", config.pages_dir.display()));

    loop {
        tokio::select! {
            change = watcher.next_change() => {
                let Some(page) = change else { break };
                tracing::info!(page = %page.display(), "page changed");
                for message in reloader.page_changed(&page).await {
                    println!("{}", message.to_json()?);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}
