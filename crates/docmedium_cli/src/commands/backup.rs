//! Backup command implementation.

use super::{check, context, document_url, CommandResult};
use docmedium_core::{Config, Medium, OpenMode, Outcome};
use std::path::Path;
use tracing::info;

/// Copies the document to `<name>.bak` in the configured backup directory.
pub fn run(path: &Path, answer: Outcome) -> CommandResult {
    let config = Config::default();
    let dir = config
        .backup_dir
        .clone()
        .ok_or("no backup directory configured")?;
    create(path, config, answer)?;
    println!("✓ Backup created in {}", dir.display());
    Ok(())
}

/// Takes the backup with `config`, returning its URL.
pub fn create(path: &Path, config: Config, answer: Outcome) -> CommandResult<String> {
    info!("Creating backup of {:?}", path);
    let url = document_url(path)?;
    let mut medium = Medium::open(context(config, answer), url.as_str(), OpenMode::READ);
    medium.do_backup();
    check(&medium, "backup")?;
    let backup = medium
        .backup_url()
        .map(ToString::to_string)
        .ok_or_else(|| format!("{} is not a document", path.display()))?;
    Ok(backup)
}
