//! MIDI utilities and message types
//!
//! Decodes the channel messages macros can be bound to. Everything else
//! (pitch bend, SysEx, realtime) is ignored by the engine.

use crate::model::{EncoderDirection, MacroTrigger, TriggerKind};
use std::fmt;

/// Incoming MIDI event relevant to macro triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    /// Note On: channel (0-15), note (0-127), velocity (1-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Control Change: channel (0-15), controller (0-127), value (0-127)
    ControlChange { channel: u8, controller: u8, value: u8 },
}

impl MidiEvent {
    /// Parse a MIDI event from raw bytes
    ///
    /// Returns `None` for running status, truncated messages and message
    /// types macros cannot bind to.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let status = *data.first()?;

        // Running status and system messages
        if !(0x80..0xF0).contains(&status) {
            return None;
        }
        if data.len() < 3 {
            return None;
        }

        let channel = status & 0x0F;
        let data1 = data[1] & 0x7F;
        let data2 = data[2] & 0x7F;

        match status & 0xF0 {
            0x80 => Some(MidiEvent::NoteOff {
                channel,
                note: data1,
                velocity: data2,
            }),
            // Note On with velocity 0 is a Note Off
            0x90 if data2 == 0 => Some(MidiEvent::NoteOff {
                channel,
                note: data1,
                velocity: 0,
            }),
            0x90 => Some(MidiEvent::NoteOn {
                channel,
                note: data1,
                velocity: data2,
            }),
            0xB0 => Some(MidiEvent::ControlChange {
                channel,
                controller: data1,
                value: data2,
            }),
            _ => None,
        }
    }

    /// Encode back to raw bytes
    pub fn to_bytes(&self) -> [u8; 3] {
        match *self {
            MidiEvent::NoteOff {
                channel,
                note,
                velocity,
            } => [0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } => [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiEvent::ControlChange {
                channel,
                controller,
                value,
            } => [0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F],
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ControlChange { channel, .. } => channel,
        }
    }

    /// Whether this event fires a macro trigger
    pub fn fires(&self, trigger: &MacroTrigger) -> bool {
        self.hits(
            trigger.kind,
            trigger.channel_or_default(),
            trigger.number(),
            trigger.value,
            trigger.direction,
        )
    }

    pub(crate) fn hits(
        &self,
        kind: TriggerKind,
        channel: u8,
        number: u8,
        value: Option<u8>,
        direction: Option<EncoderDirection>,
    ) -> bool {
        if self.channel() != channel {
            return false;
        }

        match (*self, kind) {
            (MidiEvent::NoteOn { note, velocity, .. }, TriggerKind::NoteOn)
            | (MidiEvent::NoteOff { note, velocity, .. }, TriggerKind::NoteOff) => {
                note == number && value.map_or(true, |v| v == velocity)
            }
            (MidiEvent::ControlChange { controller, value: actual, .. }, TriggerKind::ControlChange) => {
                if controller != number {
                    return false;
                }
                if direction.is_some() && self.encoder_direction() != direction {
                    return false;
                }
                value.map_or(true, |v| v == actual)
            }
            _ => false,
        }
    }

    /// Encoder direction of a relative (two's complement) CC value
    ///
    /// 1-63 turns clockwise, 65-127 counter-clockwise; 0 and 64 carry no
    /// movement.
    pub fn encoder_direction(&self) -> Option<EncoderDirection> {
        match *self {
            MidiEvent::ControlChange { value, .. } => match value {
                1..=63 => Some(EncoderDirection::Increment),
                65..=127 => Some(EncoderDirection::Decrement),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } => write!(f, "NoteOn ch{} note={} vel={}", channel, note, velocity),
            MidiEvent::NoteOff {
                channel,
                note,
                velocity,
            } => write!(f, "NoteOff ch{} note={} vel={}", channel, note, velocity),
            MidiEvent::ControlChange {
                channel,
                controller,
                value,
            } => write!(f, "CC ch{} cc={} value={}", channel, controller, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_on() {
        let event = MidiEvent::parse(&[0x91, 60, 100]).unwrap();
        assert_eq!(
            event,
            MidiEvent::NoteOn {
                channel: 1,
                note: 60,
                velocity: 100
            }
        );
    }

    #[test]
    fn test_note_on_velocity_zero_is_note_off() {
        let event = MidiEvent::parse(&[0x90, 60, 0]).unwrap();
        assert!(matches!(event, MidiEvent::NoteOff { note: 60, .. }));
    }

    #[test]
    fn test_parse_control_change() {
        let event = MidiEvent::parse(&[0xB0, 10, 5]).unwrap();
        assert_eq!(
            event,
            MidiEvent::ControlChange {
                channel: 0,
                controller: 10,
                value: 5
            }
        );
        assert_eq!(event.to_bytes(), [0xB0, 10, 5]);
    }

    #[test]
    fn test_ignores_unsupported_and_truncated() {
        assert!(MidiEvent::parse(&[]).is_none());
        assert!(MidiEvent::parse(&[0x3C, 0x40]).is_none()); // running status
        assert!(MidiEvent::parse(&[0xE0, 0x00, 0x40]).is_none()); // pitch bend
        assert!(MidiEvent::parse(&[0xF8]).is_none()); // clock
        assert!(MidiEvent::parse(&[0x90, 60]).is_none());
    }

    #[test]
    fn test_encoder_direction() {
        let cw = MidiEvent::ControlChange {
            channel: 0,
            controller: 16,
            value: 1,
        };
        let ccw = MidiEvent::ControlChange {
            channel: 0,
            controller: 16,
            value: 65,
        };
        let idle = MidiEvent::ControlChange {
            channel: 0,
            controller: 16,
            value: 64,
        };
        assert_eq!(cw.encoder_direction(), Some(EncoderDirection::Increment));
        assert_eq!(ccw.encoder_direction(), Some(EncoderDirection::Decrement));
        assert_eq!(idle.encoder_direction(), None);
    }

    #[test]
    fn test_fires_respects_channel_and_direction() {
        let trigger = MacroTrigger::control_change(1, 16).with_direction(EncoderDirection::Decrement);
        let ccw = MidiEvent::ControlChange {
            channel: 1,
            controller: 16,
            value: 70,
        };
        let cw = MidiEvent::ControlChange {
            channel: 1,
            controller: 16,
            value: 3,
        };
        assert!(ccw.fires(&trigger));
        assert!(!cw.fires(&trigger));

        let pad = MacroTrigger::note_on(0, 36);
        let hit = MidiEvent::NoteOn {
            channel: 0,
            note: 36,
            velocity: 90,
        };
        let other_channel = MidiEvent::NoteOn {
            channel: 2,
            note: 36,
            velocity: 90,
        };
        assert!(hit.fires(&pad));
        assert!(!other_channel.fires(&pad));
    }
}
