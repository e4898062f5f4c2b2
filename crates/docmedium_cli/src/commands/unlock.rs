//! Unlock command implementation.

use super::{document_url, CommandResult};
use docmedium_core::{Config, LockFile, LockIdentity, MediumContext};
use std::path::Path;
use tracing::info;

/// Removes the lock file of the document at `path`.
///
/// Without `force` only a lock of this installation is removed.
pub fn run(path: &Path, force: bool) -> CommandResult {
    let config = Config::default();
    let identity = config.identity.clone();
    if remove(path, MediumContext::new(config), &identity, force)? {
        println!("✓ Lock removed");
    } else {
        println!("{} is not locked", path.display());
    }
    Ok(())
}

/// Removes the lock; false if there was none.
pub fn remove(path: &Path, ctx: MediumContext, identity: &LockIdentity, force: bool) -> CommandResult<bool> {
    let url = document_url(path)?;
    let lock = LockFile::for_document(&url, ctx.content).ok_or("document has no parent folder")?;
    if !lock.exists() {
        return Ok(false);
    }
    lock.remove(identity, force)?;
    info!(lock = %lock.url(), force, "lock file removed");
    Ok(true)
}
