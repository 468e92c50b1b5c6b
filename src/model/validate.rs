//! Definition checks run before any backend call

use super::types::{MacroDefinition, MacroRole, MacroTrigger, TriggerKind};
use std::collections::HashSet;
use thiserror::Error;

/// Reasons a macro, group or category cannot be acted upon
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("macro '{0}' not found")]
    UnknownMacro(String),

    #[error("category '{0}' not found")]
    UnknownCategory(String),

    #[error("macro '{id}' has a malformed trigger: {reason}")]
    MalformedTrigger { id: String, reason: String },

    #[error("group '{group}' is incomplete: no {missing} macro")]
    IncompleteGroup { group: String, missing: MacroRole },

    #[error("group '{group}' has more than one {role} macro")]
    DuplicateRole { group: String, role: MacroRole },

    #[error("conflict resolution #{0} is no longer pending")]
    StaleResolution(u64),
}

/// Check a trigger's shape; returns the reason it is malformed
pub fn validate_trigger(trigger: &MacroTrigger) -> Result<(), String> {
    if let Some(channel) = trigger.channel {
        if channel > 15 {
            return Err(format!("channel {} out of range 0-15", channel));
        }
    }
    for (field, value) in [
        ("note", trigger.note),
        ("controller", trigger.controller),
        ("value", trigger.value),
    ] {
        if let Some(v) = value {
            if v > 127 {
                return Err(format!("{} {} out of range 0-127", field, v));
            }
        }
    }

    match trigger.kind {
        TriggerKind::NoteOn | TriggerKind::NoteOff => {
            if trigger.note.is_none() {
                return Err("note trigger without a note number".to_string());
            }
            if trigger.controller.is_some() {
                return Err("note trigger with a controller number".to_string());
            }
            if trigger.direction.is_some() {
                return Err("encoder direction on a note trigger".to_string());
            }
        }
        TriggerKind::ControlChange => {
            if trigger.controller.is_none() {
                return Err("control-change trigger without a controller number".to_string());
            }
            if trigger.note.is_some() {
                return Err("control-change trigger with a note number".to_string());
            }
        }
    }

    Ok(())
}

/// Validate the members of one group key (or a lone standalone macro)
///
/// Every trigger must be well formed, roles must be unique, and any group
/// using encoder roles needs both an increment and a decrement face.
pub fn validate_group(key: &str, members: &[MacroDefinition]) -> Result<(), DefinitionError> {
    if members.is_empty() {
        return Err(DefinitionError::UnknownMacro(key.to_string()));
    }

    for member in members {
        validate_trigger(&member.trigger).map_err(|reason| DefinitionError::MalformedTrigger {
            id: member.id.clone(),
            reason,
        })?;
    }

    let mut seen = HashSet::new();
    for member in members {
        let role = member.role_or_standard();
        if !seen.insert(role) {
            return Err(DefinitionError::DuplicateRole {
                group: key.to_string(),
                role,
            });
        }
    }

    if seen.iter().any(MacroRole::is_encoder) {
        for required in [MacroRole::EncoderIncrement, MacroRole::EncoderDecrement] {
            if !seen.contains(&required) {
                return Err(DefinitionError::IncompleteGroup {
                    group: key.to_string(),
                    missing: required,
                });
            }
        }
    }

    Ok(())
}
