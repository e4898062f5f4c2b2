//! Save command implementation.
//!
//! Runs the same cycle an editor does: lock the document, stage the new
//! content in a temp file, optionally back up the old content, commit and
//! release the lock.

use super::{check, context, document_url, CommandResult};
use docmedium_core::{Config, LockingPolicy, Medium, OpenMode, Outcome};
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::info;

/// Replaces the document at `path` with the content of `input`.
pub fn run(path: &Path, input: &Path, answer: Outcome, backup: bool, lock: bool) -> CommandResult {
    let mut config = Config::default();
    if !lock {
        config = config.locking(LockingPolicy::disabled());
    }
    let url = document_url(path)?;
    let mut source = File::open(input).map_err(|e| format!("cannot read {}: {e}", input.display()))?;

    let mut medium = Medium::open(context(config, answer), url.as_str(), OpenMode::READWRITE);
    if lock {
        medium.lock_orig_file_on_demand(true, false);
        check(&medium, "locking")?;
        if medium.is_read_only() {
            return Err(format!("{} is locked by someone else", path.display()).into());
        }
    }

    if backup {
        medium.do_backup();
        check(&medium, "backup")?;
        if let Some(backup) = medium.backup_url() {
            info!(%backup, "previous content backed up");
        }
    }

    let written = match medium.get_out_stream() {
        Some(out) => {
            out.set_len(0)?;
            io::copy(&mut source, out)?
        }
        None => {
            check(&medium, "staging")?;
            return Err("no output stream".into());
        }
    };

    if !medium.commit() {
        check(&medium, "save")?;
        return Err("save failed".into());
    }
    info!(document = %url, bytes = written, "document saved");
    println!("✓ Saved {} ({written} bytes)", path.display());
    Ok(())
}
