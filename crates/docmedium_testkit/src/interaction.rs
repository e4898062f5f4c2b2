//! A scripted interaction handler.

use chrono::{DateTime, Utc};
use docmedium_core::{ApprovalRequest, InteractionHandler, LockConflict, Outcome};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// One question the medium asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// The document is locked.
    LockConflict(LockConflict),
    /// The lock file could not be created.
    MissingLocking(String),
    /// The document changed on disk since it was loaded.
    ChangedByOthers(String),
    /// A yes/no question.
    Approval(ApprovalRequest),
}

/// Answers prompts from a queue, falling back to a fixed outcome, and
/// records every prompt it saw.
#[derive(Debug)]
pub struct ScriptedInteraction {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedInteraction {
    /// Creates a handler answering `fallback` once the script is exhausted.
    pub fn new(fallback: Outcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queues the answer to the next unanswered prompt.
    #[must_use]
    pub fn then(self, outcome: Outcome) -> Self {
        self.script.lock().push_back(outcome);
        self
    }

    /// Prompts seen so far, oldest first.
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().clone()
    }

    /// Number of prompts seen so far.
    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().len()
    }

    fn answer(&self, prompt: Prompt) -> Outcome {
        tracing::debug!(?prompt, "scripted prompt");
        self.prompts.lock().push(prompt);
        self.script.lock().pop_front().unwrap_or(self.fallback)
    }
}

impl InteractionHandler for ScriptedInteraction {
    fn resolve_lock_conflict(&self, conflict: &LockConflict) -> Outcome {
        self.answer(Prompt::LockConflict(conflict.clone()))
    }

    fn resolve_missing_locking(&self, document: &str) -> Outcome {
        self.answer(Prompt::MissingLocking(document.to_string()))
    }

    fn resolve_changed_by_others(&self, document: &str, _modified: Option<DateTime<Utc>>) -> Outcome {
        self.answer(Prompt::ChangedByOthers(document.to_string()))
    }

    fn approve(&self, request: &ApprovalRequest) -> Outcome {
        self.answer(Prompt::Approval(request.clone()))
    }
}
