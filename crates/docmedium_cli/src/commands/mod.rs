//! CLI command implementations.

pub mod backup;
pub mod inspect;
pub mod save;
pub mod unlock;
pub mod versions;

use docmedium_core::{Config, ErrorCode, FixedOutcome, Medium, MediumContext, Outcome};
use docmedium_storage::DocUrl;
use std::path::Path;
use std::sync::Arc;

/// Result type shared by the commands.
pub type CommandResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Context answering every question with `answer`.
pub fn context(config: Config, answer: Outcome) -> MediumContext {
    MediumContext::new(config).with_default_interaction(Arc::new(FixedOutcome(answer)))
}

/// URL of a document path, made absolute against the working directory.
pub fn document_url(path: &Path) -> CommandResult<DocUrl> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(DocUrl::from_path(&absolute))
}

/// Turns the medium's sticky error into a command error.
pub fn check(medium: &Medium, what: &str) -> CommandResult {
    match medium.error_code() {
        ErrorCode::None => Ok(()),
        code => Err(format!("{what} failed: {code}").into()),
    }
}
