//! Questions the medium asks the user.

use chrono::{DateTime, Utc};

/// Answer to an interaction request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Yes / open read-only / retry.
    Approve,
    /// No / open as copy / ignore own lock.
    Disapprove,
    /// Cancel the whole operation.
    Abort,
}

/// A document lock held by somebody else, or by this user elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConflict {
    /// Document URL.
    pub document: String,
    /// Human-readable holder and time.
    pub info: String,
    /// The lock belongs to this user.
    pub own_lock: bool,
    /// The conflict arose while loading, not saving.
    pub loading: bool,
}

/// A yes/no question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    /// Question text.
    pub message: String,
    /// Whether [`Outcome::Abort`] is meaningful.
    pub allow_abort: bool,
}

/// Resolves interaction requests.
///
/// Handlers are shared between media and must be thread-safe.
pub trait InteractionHandler: Send + Sync {
    /// Decides what to do about a foreign or stale lock.
    fn resolve_lock_conflict(&self, conflict: &LockConflict) -> Outcome;

    /// Decides whether to proceed on a file system without locking support.
    fn resolve_missing_locking(&self, document: &str) -> Outcome;

    /// Decides whether to proceed after the document changed on disk.
    fn resolve_changed_by_others(&self, document: &str, modified: Option<DateTime<Utc>>) -> Outcome {
        let _ = (document, modified);
        Outcome::Approve
    }

    /// Answers a generic question.
    fn approve(&self, request: &ApprovalRequest) -> Outcome {
        let _ = request;
        Outcome::Approve
    }
}

/// Answers every request the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedOutcome(pub Outcome);

impl InteractionHandler for FixedOutcome {
    fn resolve_lock_conflict(&self, conflict: &LockConflict) -> Outcome {
        tracing::debug!(document = %conflict.document, outcome = ?self.0, "lock conflict answered");
        self.0
    }

    fn resolve_missing_locking(&self, _document: &str) -> Outcome {
        self.0
    }

    fn resolve_changed_by_others(&self, _document: &str, _modified: Option<DateTime<Utc>>) -> Outcome {
        self.0
    }

    fn approve(&self, _request: &ApprovalRequest) -> Outcome {
        self.0
    }
}
