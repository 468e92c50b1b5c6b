//! Macro type definitions
//!
//! Records are serialized in camelCase so persisted documents and
//! export bundles stay readable by the surrounding editor tooling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Category every macro falls back to when none is set
pub const DEFAULT_CATEGORY_ID: &str = "default";

/// MIDI message class a trigger listens for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerKind {
    NoteOn,
    NoteOff,
    ControlChange,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerKind::NoteOn => write!(f, "note-on"),
            TriggerKind::NoteOff => write!(f, "note-off"),
            TriggerKind::ControlChange => write!(f, "cc"),
        }
    }
}

/// Rotation direction of a relative encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderDirection {
    Increment,
    Decrement,
}

/// The MIDI event shape that fires a macro
///
/// Missing numeric fields are treated as 0 wherever two triggers are compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroTrigger {
    pub kind: TriggerKind,
    /// MIDI channel (0-15)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
    /// Note number, NoteOn/NoteOff only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<u8>,
    /// Controller number, ControlChange only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<u8>,
    /// Specific value; absent means any value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u8>,
    /// Encoder direction, ControlChange only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<EncoderDirection>,
}

impl MacroTrigger {
    pub fn note_on(channel: u8, note: u8) -> Self {
        Self {
            kind: TriggerKind::NoteOn,
            channel: Some(channel),
            note: Some(note),
            controller: None,
            value: None,
            direction: None,
        }
    }

    pub fn note_off(channel: u8, note: u8) -> Self {
        Self {
            kind: TriggerKind::NoteOff,
            ..Self::note_on(channel, note)
        }
    }

    pub fn control_change(channel: u8, controller: u8) -> Self {
        Self {
            kind: TriggerKind::ControlChange,
            channel: Some(channel),
            note: None,
            controller: Some(controller),
            value: None,
            direction: None,
        }
    }

    pub fn with_value(mut self, value: u8) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_direction(mut self, direction: EncoderDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Channel with the missing-means-zero rule applied
    pub fn channel_or_default(&self) -> u8 {
        self.channel.unwrap_or(0)
    }

    /// Note or controller number, depending on the kind
    pub fn number(&self) -> u8 {
        match self.kind {
            TriggerKind::NoteOn | TriggerKind::NoteOff => self.note.unwrap_or(0),
            TriggerKind::ControlChange => self.controller.unwrap_or(0),
        }
    }
}

impl std::fmt::Display for MacroTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ch{} #{}", self.kind, self.channel_or_default(), self.number())?;
        if let Some(value) = self.value {
            write!(f, " ={}", value)?;
        }
        match self.direction {
            Some(EncoderDirection::Increment) => write!(f, " (+)"),
            Some(EncoderDirection::Decrement) => write!(f, " (-)"),
            None => Ok(()),
        }
    }
}

/// One step of a macro's effect
///
/// Opaque to the engine: it is stored and forwarded to the backend as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// How a macro participates in its group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MacroRole {
    #[default]
    Standard,
    EncoderIncrement,
    EncoderDecrement,
    EncoderClick,
}

impl MacroRole {
    pub fn is_encoder(&self) -> bool {
        !matches!(self, MacroRole::Standard)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MacroRole::Standard => "standard",
            MacroRole::EncoderIncrement => "encoder-increment",
            MacroRole::EncoderDecrement => "encoder-decrement",
            MacroRole::EncoderClick => "encoder-click",
        }
    }
}

impl std::fmt::Display for MacroRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of storage: one MIDI trigger bound to a list of actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroDefinition {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Shared by every face of a multi-part control
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MacroRole>,
    pub trigger: MacroTrigger,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_actions: Option<Vec<Action>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_actions: Option<Vec<Action>>,
    /// Execution timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MacroDefinition {
    pub fn new(id: impl Into<String>, trigger: MacroTrigger) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            group_id: None,
            category_id: None,
            role: None,
            trigger,
            actions: Vec::new(),
            before_actions: None,
            after_actions: None,
            timeout: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn in_group(mut self, group_id: impl Into<String>, role: MacroRole) -> Self {
        self.group_id = Some(group_id.into());
        self.role = Some(role);
        self
    }

    pub fn in_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    /// Key used for grouping and ordering: the group id, or the macro's own id
    pub fn group_key(&self) -> &str {
        self.group_id.as_deref().unwrap_or(&self.id)
    }

    pub fn category(&self) -> &str {
        self.category_id.as_deref().unwrap_or(DEFAULT_CATEGORY_ID)
    }

    pub fn role_or_standard(&self) -> MacroRole {
        self.role.unwrap_or_default()
    }

    /// Whether both macros carry the same explicit group id
    pub fn shares_group_with(&self, other: &MacroDefinition) -> bool {
        matches!((&self.group_id, &other.group_id), (Some(a), Some(b)) if a == b)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Organizational bucket for macros
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroCategory {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_expanded: Option<bool>,
}

impl MacroCategory {
    pub fn new(id: impl Into<String>, name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: color.into(),
            is_expanded: None,
        }
    }

    /// The always-present fallback category
    pub fn default_category() -> Self {
        Self {
            id: DEFAULT_CATEGORY_ID.to_string(),
            name: "Default".to_string(),
            color: "#6b7280".to_string(),
            is_expanded: Some(true),
        }
    }

    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_CATEGORY_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_key_falls_back_to_id() {
        let standalone = MacroDefinition::new("m1", MacroTrigger::note_on(0, 60));
        assert_eq!(standalone.group_key(), "m1");

        let face = MacroDefinition::new("m2", MacroTrigger::control_change(0, 10))
            .in_group("enc", MacroRole::EncoderIncrement);
        assert_eq!(face.group_key(), "enc");
    }

    #[test]
    fn test_category_defaults() {
        let m = MacroDefinition::new("m1", MacroTrigger::note_on(0, 60));
        assert_eq!(m.category(), DEFAULT_CATEGORY_ID);
        assert_eq!(m.role_or_standard(), MacroRole::Standard);
    }

    #[test]
    fn test_deserialize_camel_case_record() {
        let json = r#"{
            "id": "vol-up",
            "groupId": "vol",
            "role": "encoder-increment",
            "trigger": { "kind": "controlChange", "channel": 1, "controller": 10, "direction": "increment" },
            "actions": [ { "id": "a1", "type": "keyPress", "params": { "key": "VolumeUp" } } ],
            "beforeActions": [],
            "timeout": 500,
            "createdAt": "2024-03-01T10:00:00Z"
        }"#;

        let m: MacroDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(m.group_id.as_deref(), Some("vol"));
        assert_eq!(m.role, Some(MacroRole::EncoderIncrement));
        assert_eq!(m.trigger.kind, TriggerKind::ControlChange);
        assert_eq!(m.trigger.direction, Some(EncoderDirection::Increment));
        assert_eq!(m.actions[0].kind, "keyPress");
        assert_eq!(m.timeout, Some(500));
        assert!(m.category_id.is_none());
    }

    #[test]
    fn test_action_params_survive_unchanged() {
        let json = r#"{"id":"a","type":"custom","params":{"nested":{"x":[1,2,3]},"flag":true}}"#;
        let action: Action = serde_json::from_str(json).unwrap();
        let back = serde_json::to_value(&action).unwrap();
        assert_eq!(back, serde_json::from_str::<Value>(json).unwrap());
    }

    #[test]
    fn test_trigger_display() {
        let t = MacroTrigger::control_change(1, 10)
            .with_value(5)
            .with_direction(EncoderDirection::Decrement);
        assert_eq!(t.to_string(), "cc ch1 #10 =5 (-)");
    }
}
