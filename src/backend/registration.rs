//! Registration payloads sent to the execution backend
//!
//! Macro actions are opaque `{id, type, params}` records inside the engine.
//! At the backend boundary they are decoded once into [`BackendAction`], with
//! a pass-through variant for kinds this crate does not know.

use crate::midi::MidiEvent;
use crate::model::{Action, EncoderDirection, MacroDefinition, TriggerKind};
use serde::Deserialize;
use serde_json::Value;

/// Numeric identity of a trigger, as the backend matches it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerIdentity {
    pub kind: TriggerKind,
    pub channel: u8,
    /// Note or controller number
    pub number: u8,
    /// Specific value; `None` accepts any value
    pub value: Option<u8>,
    pub direction: Option<EncoderDirection>,
}

impl TriggerIdentity {
    /// Whether an incoming event fires this trigger
    pub fn fired_by(&self, event: &MidiEvent) -> bool {
        event.hits(self.kind, self.channel, self.number, self.value, self.direction)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyChord {
    pub key: String,
    #[serde(default)]
    pub modifiers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MouseMove {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub relative: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MouseScroll {
    #[serde(default)]
    pub dx: i32,
    #[serde(default)]
    pub dy: i32,
}

#[derive(Deserialize)]
struct ClickParams {
    #[serde(default)]
    button: MouseButton,
}

#[derive(Deserialize)]
struct TextParams {
    text: String,
}

#[derive(Deserialize)]
struct DelayParams {
    ms: u64,
}

/// Decoded action, one variant per action kind
#[derive(Debug, Clone, PartialEq)]
pub enum BackendAction {
    KeyPress(KeyChord),
    KeyDown(KeyChord),
    KeyUp(KeyChord),
    TypeText(String),
    MouseClick(MouseButton),
    MouseMove(MouseMove),
    MouseScroll(MouseScroll),
    Delay(u64),
    /// Unknown kind or unexpected params, forwarded untouched
    Passthrough(Action),
}

impl BackendAction {
    pub fn from_action(action: &Action) -> Self {
        let params = Value::Object(action.params.clone());
        let decoded = match action.kind.as_str() {
            "keyPress" => serde_json::from_value(params).map(BackendAction::KeyPress),
            "keyDown" => serde_json::from_value(params).map(BackendAction::KeyDown),
            "keyUp" => serde_json::from_value(params).map(BackendAction::KeyUp),
            "typeText" => serde_json::from_value::<TextParams>(params)
                .map(|p| BackendAction::TypeText(p.text)),
            "mouseClick" => serde_json::from_value::<ClickParams>(params)
                .map(|p| BackendAction::MouseClick(p.button)),
            "mouseMove" => serde_json::from_value(params).map(BackendAction::MouseMove),
            "mouseScroll" => serde_json::from_value(params).map(BackendAction::MouseScroll),
            "delay" => serde_json::from_value::<DelayParams>(params)
                .map(|p| BackendAction::Delay(p.ms)),
            _ => return BackendAction::Passthrough(action.clone()),
        };
        decoded.unwrap_or_else(|_| BackendAction::Passthrough(action.clone()))
    }

    pub fn decode_all(actions: &[Action]) -> Vec<BackendAction> {
        actions.iter().map(Self::from_action).collect()
    }
}

/// Everything the backend needs to run one macro
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub macro_id: String,
    pub group_id: Option<String>,
    pub trigger: TriggerIdentity,
    pub actions: Vec<BackendAction>,
    pub before_actions: Vec<BackendAction>,
    pub after_actions: Vec<BackendAction>,
    /// Milliseconds
    pub timeout: Option<u64>,
}

impl Registration {
    /// Build the payload for one member of a group
    ///
    /// Before/after actions and the timeout are shared across a group: a
    /// member without its own falls back to the first member that has them.
    pub fn for_member(member: &MacroDefinition, group: &[MacroDefinition]) -> Self {
        let shared = |pick: fn(&MacroDefinition) -> Option<&Vec<Action>>| {
            pick(member)
                .or_else(|| group.iter().find_map(pick))
                .map(|actions| BackendAction::decode_all(actions))
                .unwrap_or_default()
        };

        let trigger = &member.trigger;
        Self {
            macro_id: member.id.clone(),
            group_id: member.group_id.clone(),
            trigger: TriggerIdentity {
                kind: trigger.kind,
                channel: trigger.channel_or_default(),
                number: trigger.number(),
                value: trigger.value,
                direction: trigger.direction,
            },
            actions: BackendAction::decode_all(&member.actions),
            before_actions: shared(|m| m.before_actions.as_ref()),
            after_actions: shared(|m| m.after_actions.as_ref()),
            timeout: member
                .timeout
                .or_else(|| group.iter().find_map(|m| m.timeout)),
        }
    }

    pub fn action_count(&self) -> usize {
        self.before_actions.len() + self.actions.len() + self.after_actions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MacroRole, MacroTrigger};
    use serde_json::json;

    fn action(kind: &str, params: Value) -> Action {
        Action {
            id: format!("{}-1", kind),
            kind: kind.to_string(),
            params: params.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_decodes_known_kinds() {
        assert_eq!(
            BackendAction::from_action(&action("keyPress", json!({"key": "A", "modifiers": ["ctrl"]}))),
            BackendAction::KeyPress(KeyChord {
                key: "A".to_string(),
                modifiers: vec!["ctrl".to_string()],
            })
        );
        assert_eq!(
            BackendAction::from_action(&action("delay", json!({"ms": 50}))),
            BackendAction::Delay(50)
        );
        assert_eq!(
            BackendAction::from_action(&action("mouseClick", json!({}))),
            BackendAction::MouseClick(MouseButton::Left)
        );
    }

    #[test]
    fn test_unknown_or_malformed_actions_pass_through() {
        let custom = action("launchApp", json!({"path": "/usr/bin/true"}));
        assert_eq!(
            BackendAction::from_action(&custom),
            BackendAction::Passthrough(custom.clone())
        );

        let broken = action("delay", json!({"ms": "soon"}));
        assert_eq!(
            BackendAction::from_action(&broken),
            BackendAction::Passthrough(broken.clone())
        );
    }

    #[test]
    fn test_group_shares_before_after_and_timeout() {
        let mut inc = MacroDefinition::new("inc", MacroTrigger::control_change(1, 10))
            .in_group("enc", MacroRole::EncoderIncrement);
        inc.before_actions = Some(vec![action("keyDown", json!({"key": "Shift"}))]);
        inc.after_actions = Some(vec![action("keyUp", json!({"key": "Shift"}))]);
        inc.timeout = Some(250);
        let dec = MacroDefinition::new("dec", MacroTrigger::control_change(1, 11))
            .in_group("enc", MacroRole::EncoderDecrement);
        let group = vec![inc.clone(), dec.clone()];

        let reg = Registration::for_member(&dec, &group);
        assert_eq!(reg.macro_id, "dec");
        assert_eq!(reg.group_id.as_deref(), Some("enc"));
        assert_eq!(reg.trigger.number, 11);
        assert_eq!(reg.trigger.channel, 1);
        assert_eq!(reg.before_actions.len(), 1);
        assert_eq!(reg.after_actions.len(), 1);
        assert_eq!(reg.timeout, Some(250));
    }

    #[test]
    fn test_fired_by_direction() {
        let identity = TriggerIdentity {
            kind: TriggerKind::ControlChange,
            channel: 0,
            number: 16,
            value: None,
            direction: Some(EncoderDirection::Decrement),
        };
        let ccw = MidiEvent::ControlChange {
            channel: 0,
            controller: 16,
            value: 65,
        };
        let cw = MidiEvent::ControlChange {
            channel: 0,
            controller: 16,
            value: 1,
        };
        assert!(identity.fired_by(&ccw));
        assert!(!identity.fired_by(&cw));
    }

    #[test]
    fn test_fired_by_note_and_value() {
        let identity = TriggerIdentity {
            kind: TriggerKind::NoteOn,
            channel: 2,
            number: 60,
            value: None,
            direction: None,
        };
        assert!(identity.fired_by(&MidiEvent::NoteOn {
            channel: 2,
            note: 60,
            velocity: 90
        }));
        assert!(!identity.fired_by(&MidiEvent::NoteOff {
            channel: 2,
            note: 60,
            velocity: 0
        }));
        assert!(!identity.fired_by(&MidiEvent::NoteOn {
            channel: 3,
            note: 60,
            velocity: 90
        }));
    }
}
