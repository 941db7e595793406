use anyhow::Result;
use std::path::Path;

use super::{compiler, load_config, read_source};

pub fn prepare_script(config: Option<&Path>, script: &Path, page: &Path) -> Result<()> {
    let config = load_config(config)?;
    let source = read_source(script)?;
    let program = compiler(&config).prepare(&source, page);
    print!("{}", program.source);
    Ok(())
}
