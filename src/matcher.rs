//! Trigger matching
//!
//! Decides whether two triggers denote the same physical MIDI control.
//! Missing channel, note and controller numbers compare as 0.

use crate::model::{MacroTrigger, TriggerKind};

/// Whether `a` and `b` listen for the same MIDI event class
///
/// A ControlChange trigger without a value is a catch-all for its
/// controller and collides with every value-specific trigger on it.
pub fn matches(a: &MacroTrigger, b: &MacroTrigger) -> bool {
    if a.kind != b.kind {
        return false;
    }

    if a.channel.unwrap_or(0) != b.channel.unwrap_or(0) {
        return false;
    }

    match a.kind {
        TriggerKind::NoteOn | TriggerKind::NoteOff => a.note.unwrap_or(0) == b.note.unwrap_or(0),
        TriggerKind::ControlChange => {
            if a.controller.unwrap_or(0) != b.controller.unwrap_or(0) {
                return false;
            }
            match (a.value, b.value) {
                (Some(x), Some(y)) => x == y,
                _ => true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EncoderDirection;
    use proptest::prelude::*;

    #[test]
    fn test_kind_mismatch() {
        assert!(!matches(
            &MacroTrigger::note_on(0, 60),
            &MacroTrigger::note_off(0, 60)
        ));
        assert!(!matches(
            &MacroTrigger::note_on(0, 10),
            &MacroTrigger::control_change(0, 10)
        ));
    }

    #[test]
    fn test_channel_mismatch() {
        assert!(!matches(
            &MacroTrigger::note_on(0, 60),
            &MacroTrigger::note_on(1, 60)
        ));
    }

    #[test]
    fn test_missing_channel_is_channel_zero() {
        let mut implicit = MacroTrigger::note_on(0, 60);
        implicit.channel = None;
        assert!(matches(&implicit, &MacroTrigger::note_on(0, 60)));
        assert!(!matches(&implicit, &MacroTrigger::note_on(3, 60)));
    }

    #[test]
    fn test_cc_catch_all_value() {
        let any = MacroTrigger::control_change(1, 10);
        let five = MacroTrigger::control_change(1, 10).with_value(5);
        let six = MacroTrigger::control_change(1, 10).with_value(6);

        assert!(matches(&any, &five));
        assert!(matches(&five, &any));
        assert!(matches(&five, &five.clone()));
        assert!(!matches(&five, &six));
    }

    #[test]
    fn test_cc_different_controller() {
        assert!(!matches(
            &MacroTrigger::control_change(1, 10),
            &MacroTrigger::control_change(1, 11)
        ));
    }

    #[test]
    fn test_direction_does_not_separate_triggers() {
        let inc = MacroTrigger::control_change(1, 10).with_direction(EncoderDirection::Increment);
        let dec = MacroTrigger::control_change(1, 10).with_direction(EncoderDirection::Decrement);
        assert!(matches(&inc, &dec));
    }

    fn note_kind() -> impl Strategy<Value = TriggerKind> {
        prop_oneof![Just(TriggerKind::NoteOn), Just(TriggerKind::NoteOff)]
    }

    proptest! {
        #[test]
        fn prop_note_match_reflexive(kind in note_kind(), ch in 0u8..16, note in 0u8..128) {
            let mut t = MacroTrigger::note_on(ch, note);
            t.kind = kind;
            prop_assert!(matches(&t, &t));
        }

        #[test]
        fn prop_note_match_symmetric(
            kind in note_kind(),
            ch_a in 0u8..16, ch_b in 0u8..16,
            note_a in 0u8..128, note_b in 0u8..128,
        ) {
            let mut a = MacroTrigger::note_on(ch_a, note_a);
            let mut b = MacroTrigger::note_on(ch_b, note_b);
            a.kind = kind;
            b.kind = kind;
            prop_assert_eq!(matches(&a, &b), matches(&b, &a));
            prop_assert_eq!(matches(&a, &b), ch_a == ch_b && note_a == note_b);
        }

        #[test]
        fn prop_cc_undefined_value_always_matches(
            ch in 0u8..16, cc in 0u8..128, value in 0u8..128, b_first in any::<bool>(),
        ) {
            let any_value = MacroTrigger::control_change(ch, cc);
            let specific = MacroTrigger::control_change(ch, cc).with_value(value);
            if b_first {
                prop_assert!(matches(&specific, &any_value));
            } else {
                prop_assert!(matches(&any_value, &specific));
            }
        }

        #[test]
        fn prop_cc_distinct_values_never_match(
            ch in 0u8..16, cc in 0u8..128, a in 0u8..128, b in 0u8..128,
        ) {
            prop_assume!(a != b);
            let ta = MacroTrigger::control_change(ch, cc).with_value(a);
            let tb = MacroTrigger::control_change(ch, cc).with_value(b);
            prop_assert!(!matches(&ta, &tb));
        }
    }
}
