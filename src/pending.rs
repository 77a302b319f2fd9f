//! Pending Operation Store
//!
//! Each slot stages SQL text independently for its next read and its next write.
//! Staged text is consumed at most once: the slot registry clears it only after a
//! successful execution, so a failed attempt can be inspected or retried without
//! re-staging.

use serde::{Deserialize, Serialize};

/// Which staged text an operation refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PendingKind {
    /// Staged query for the next `READ`
    Read,
    /// Staged command for the next `WRITE`
    Write,
}

/// What happens to staged text after a successful execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingPolicy {
    /// Clear after success (at-most-once execution)
    #[default]
    Consume,
    /// Keep after success so repeated triggers re-run the same text
    Retain,
}

/// Staging policy for one slot, per direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStaging {
    #[serde(default)]
    pub read: StagingPolicy,
    #[serde(default)]
    pub write: StagingPolicy,
}

impl SlotStaging {
    fn policy(&self, kind: PendingKind) -> StagingPolicy {
        match kind {
            PendingKind::Read => self.read,
            PendingKind::Write => self.write,
        }
    }
}

/// Staged read and write text for one slot
#[derive(Debug, Clone, Default)]
pub struct PendingOperation {
    read: Option<String>,
    write: Option<String>,
    staging: SlotStaging,
}

impl PendingOperation {
    pub fn new(staging: SlotStaging) -> Self {
        Self { read: None, write: None, staging }
    }

    fn entry(&mut self, kind: PendingKind) -> &mut Option<String> {
        match kind {
            PendingKind::Read => &mut self.read,
            PendingKind::Write => &mut self.write,
        }
    }

    /// Unconditional overwrite, no validation of the SQL content
    pub fn set(&mut self, kind: PendingKind, text: impl Into<String>) {
        *self.entry(kind) = Some(text.into());
    }

    /// Effective text for the next execution
    ///
    /// An inline override replaces the staged text before use, and stays staged
    /// if the execution then fails. Blank text counts as not set, and a blank
    /// inline value leaves the staged text alone.
    pub fn take(&mut self, kind: PendingKind, inline: Option<String>) -> Option<String> {
        let entry = self.entry(kind);
        if let Some(text) = inline.filter(|text| !text.trim().is_empty()) {
            *entry = Some(text);
        }
        entry.clone().filter(|text| !text.trim().is_empty())
    }

    /// Record a successful execution of `kind`
    pub fn commit(&mut self, kind: PendingKind) {
        if self.staging.policy(kind) == StagingPolicy::Consume {
            *self.entry(kind) = None;
        }
    }

    /// Currently staged text, empty when nothing is staged
    #[must_use]
    pub fn peek(&self, kind: PendingKind) -> &str {
        match kind {
            PendingKind::Read => self.read.as_deref(),
            PendingKind::Write => self.write.as_deref(),
        }
        .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_peek_are_independent_per_kind() {
        let mut pending = PendingOperation::default();
        pending.set(PendingKind::Read, "SELECT 1");
        pending.set(PendingKind::Write, "INSERT INTO t VALUES (1)");

        assert_eq!(pending.peek(PendingKind::Read), "SELECT 1");
        assert_eq!(pending.peek(PendingKind::Write), "INSERT INTO t VALUES (1)");
    }

    #[test]
    fn test_inline_overrides_staged_text() {
        let mut pending = PendingOperation::default();
        pending.set(PendingKind::Read, "SELECT 1");

        let effective = pending.take(PendingKind::Read, Some("SELECT 2".to_string()));
        assert_eq!(effective.as_deref(), Some("SELECT 2"));
        assert_eq!(pending.peek(PendingKind::Read), "SELECT 2");
    }

    #[test]
    fn test_take_without_commit_keeps_text() {
        let mut pending = PendingOperation::default();
        pending.set(PendingKind::Write, "DELETE FROM t");

        assert!(pending.take(PendingKind::Write, None).is_some());
        assert_eq!(pending.peek(PendingKind::Write), "DELETE FROM t");

        pending.commit(PendingKind::Write);
        assert_eq!(pending.peek(PendingKind::Write), "");
    }

    #[test]
    fn test_empty_text_is_not_set() {
        let mut pending = PendingOperation::default();
        assert_eq!(pending.take(PendingKind::Read, None), None);

        pending.set(PendingKind::Read, "   ");
        assert_eq!(pending.take(PendingKind::Read, None), None);
    }

    #[test]
    fn test_blank_inline_does_not_replace_staged_text() {
        let mut pending = PendingOperation::default();
        pending.set(PendingKind::Write, "INSERT INTO t VALUES (1)");

        let effective = pending.take(PendingKind::Write, Some(" \t".to_string()));
        assert_eq!(effective.as_deref(), Some("INSERT INTO t VALUES (1)"));
    }

    #[test]
    fn test_retain_policy_keeps_text_after_commit() {
        let mut pending = PendingOperation::new(SlotStaging {
            read: StagingPolicy::Consume,
            write: StagingPolicy::Retain,
        });
        pending.set(PendingKind::Read, "SELECT 1");
        pending.set(PendingKind::Write, "UPDATE t SET x = 1");

        pending.commit(PendingKind::Read);
        pending.commit(PendingKind::Write);

        assert_eq!(pending.peek(PendingKind::Read), "");
        assert_eq!(pending.peek(PendingKind::Write), "UPDATE t SET x = 1");
    }
}
