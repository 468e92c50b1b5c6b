//! Macro data model
//!
//! Defines the records the engine stores and reasons about: triggers,
//! opaque actions, macro definitions and categories, plus the validation
//! rules applied before anything is sent to the execution backend.

mod types;
mod validate;

pub use types::{
    Action, EncoderDirection, MacroCategory, MacroDefinition, MacroRole, MacroTrigger,
    TriggerKind, DEFAULT_CATEGORY_ID,
};
pub use validate::{validate_group, validate_trigger, DefinitionError};
