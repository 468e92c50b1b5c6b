//! Activation outcomes and conflict resolution values
//!
//! A conflicting activation does not block: the coordinator hands back a
//! [`PendingResolution`] and the caller resumes it later through
//! [`Coordinator::resolve`](super::Coordinator::resolve) with a [`Resolution`].

use crate::model::{DefinitionError, MacroDefinition};
use std::collections::HashSet;

/// Caller's answer to a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Deactivate the conflicting groups, then activate the candidate
    Replace,
    /// Abandon the candidate, keep the conflicting groups running
    KeepExisting,
    /// Behave as if the activation was never requested
    Cancel,
}

/// How a category is switched on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryMode {
    /// Add the category's groups to whatever is already active
    #[default]
    Additive,
    /// Deactivate everything first, then activate the category
    Exclusive,
}

/// What a pending activation was about to switch on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationTarget {
    Group(String),
    Category { id: String, mode: CategoryMode },
}

/// An activation paused on a trigger conflict
#[derive(Debug, Clone)]
pub struct PendingResolution {
    pub(crate) token: u64,
    pub(crate) target: ActivationTarget,
    pub(crate) group_keys: Vec<String>,
    pub(crate) conflicts: Vec<MacroDefinition>,
}

impl PendingResolution {
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn target(&self) -> &ActivationTarget {
        &self.target
    }

    /// Group keys the activation would switch on
    pub fn group_keys(&self) -> &[String] {
        &self.group_keys
    }

    /// Active macros colliding with the candidate
    pub fn conflicts(&self) -> &[MacroDefinition] {
        &self.conflicts
    }

    /// Distinct group keys of the conflicting macros, in report order
    pub fn conflicting_group_keys(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.conflicts
            .iter()
            .map(|m| m.group_key().to_string())
            .filter(|key| seen.insert(key.clone()))
            .collect()
    }
}

/// Per-member results of an activation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Macro ids now registered and active
    pub activated: Vec<String>,
    /// Macro ids the backend refused, with the reason
    pub failed: Vec<(String, String)>,
    /// Macro ids switched off to make room (Replace / Exclusive)
    pub deactivated: Vec<String>,
    /// Group keys skipped because their definition is invalid
    pub rejected: Vec<(String, DefinitionError)>,
}

impl ActivationReport {
    pub fn merge(&mut self, other: ActivationReport) {
        self.activated.extend(other.activated);
        self.failed.extend(other.failed);
        self.deactivated.extend(other.deactivated);
        self.rejected.extend(other.rejected);
    }

    /// Nothing failed or was rejected
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.rejected.is_empty()
    }
}

/// Per-member results of a deactivation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeactivationReport {
    /// Macro ids removed from the active set
    pub deactivated: Vec<String>,
    /// Subset whose backend cancel failed
    pub cancel_failed: Vec<(String, String)>,
}

impl DeactivationReport {
    pub fn merge(&mut self, other: DeactivationReport) {
        self.deactivated.extend(other.deactivated);
        self.cancel_failed.extend(other.cancel_failed);
    }
}

/// Result of an activation request or of resolving one
#[derive(Debug, Clone)]
pub enum ActivationOutcome {
    Activated(ActivationReport),
    /// Every member was already active; nothing was sent to the backend
    AlreadyActive,
    /// A conflict needs the caller's decision
    Pending(PendingResolution),
    /// Resolved with [`Resolution::KeepExisting`]
    KeptExisting,
    /// Resolved with [`Resolution::Cancel`]
    Cancelled,
    /// Definition error; nothing was sent to the backend
    Rejected(DefinitionError),
}

impl ActivationOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, ActivationOutcome::Pending(_))
    }

    pub fn into_pending(self) -> Option<PendingResolution> {
        match self {
            ActivationOutcome::Pending(pending) => Some(pending),
            _ => None,
        }
    }

    pub fn report(&self) -> Option<&ActivationReport> {
        match self {
            ActivationOutcome::Activated(report) => Some(report),
            _ => None,
        }
    }
}

/// Lifecycle state of one group key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Inactive,
    /// Some members active, typically after a partial registration failure
    PartiallyActive,
    Active,
    /// An activation of this group awaits conflict resolution
    PendingResolution,
}
