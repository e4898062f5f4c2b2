//! Inspect command implementation.

use super::{context, document_url, CommandResult};
use docmedium_core::{Config, LockEntry, LockFile, Medium, OpenMode, Outcome};
use serde::Serialize;
use std::path::Path;

/// Document inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Document URL.
    pub url: String,
    /// Size in bytes.
    pub size: u64,
    /// The file refuses writes.
    pub read_only: bool,
    /// The document is a package.
    pub is_package: bool,
    /// Current lock record, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock: Option<LockInfo>,
    /// Stored revisions.
    pub versions: Vec<String>,
}

/// A lock record as shown to the user.
#[derive(Debug, Serialize)]
pub struct LockInfo {
    /// Who holds the lock.
    pub holder: String,
    /// Host the lock was taken on.
    pub host: String,
    /// When the lock was taken.
    pub since: String,
    /// The lock belongs to this installation.
    pub ours: bool,
}

impl LockInfo {
    fn new(entry: &LockEntry, ours: bool) -> Self {
        let holder = if entry.app_user_name.is_empty() {
            entry.sys_user_name.clone()
        } else {
            entry.app_user_name.clone()
        };
        Self {
            holder,
            host: entry.host.clone(),
            since: entry.edit_time.clone(),
            ours,
        }
    }
}

/// Runs the inspect command.
pub fn run(path: &Path, answer: Outcome, format: &str) -> CommandResult {
    let result = inspect(path, answer)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

/// Collects what is known about the document without changing it.
pub fn inspect(path: &Path, answer: Outcome) -> CommandResult<InspectResult> {
    let config = Config::default();
    let identity = config.identity.clone();
    let ctx = context(config, answer);
    let url = document_url(path)?;

    let properties = ctx
        .content
        .content(&url)
        .and_then(|c| c.properties())
        .map_err(|e| format!("no document at {}: {e}", path.display()))?;
    if !properties.is_document {
        return Err(format!("{} is not a document", path.display()).into());
    }

    let lock = LockFile::for_document(&url, ctx.content.clone())
        .filter(LockFile::exists)
        .and_then(|lock| match lock.read_data() {
            Ok(entry) => Some(LockInfo::new(&entry, entry.is_same_installation(&identity))),
            Err(e) => {
                tracing::warn!(lock = %lock.url(), error = %e, "unreadable lock file");
                None
            }
        });

    let mut medium = Medium::open(ctx, url.as_str(), OpenMode::READ);
    let is_package = medium.is_storage();
    let versions = if is_package {
        medium
            .get_version_list(false)
            .iter()
            .map(|tag| tag.identifier.clone())
            .collect()
    } else {
        Vec::new()
    };

    Ok(InspectResult {
        url: url.to_string(),
        size: properties.size,
        read_only: properties.is_read_only,
        is_package,
        lock,
        versions,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Document: {}", result.url);
    println!("  Size: {} bytes", result.size);
    println!("  Read-only: {}", if result.read_only { "yes" } else { "no" });
    println!("  Package: {}", if result.is_package { "yes" } else { "no" });
    match &result.lock {
        Some(lock) => {
            let owner = if lock.ours { " (this installation)" } else { "" };
            println!("  Locked by: {} on {} since {}{owner}", lock.holder, lock.host, lock.since);
        }
        None => println!("  Locked by: nobody"),
    }
    if result.is_package {
        println!("  Versions: {}", result.versions.len());
        for version in &result.versions {
            println!("    {version}");
        }
    }
}
