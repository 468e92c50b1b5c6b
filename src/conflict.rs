//! Conflict detection between a candidate macro and the active set
//!
//! Pure functions: they never mutate anything and can be used to preview
//! collisions before deciding to activate.

use crate::matcher::matches;
use crate::model::MacroDefinition;
use std::collections::HashSet;

/// Active macros that would collide with `candidate`
///
/// Skips the candidate itself and macros sharing its group id.
pub fn find_conflicts<'a, I>(candidate: &MacroDefinition, active: I) -> Vec<MacroDefinition>
where
    I: IntoIterator<Item = &'a MacroDefinition>,
{
    active
        .into_iter()
        .filter(|m| m.id != candidate.id)
        .filter(|m| !candidate.shares_group_with(m))
        .filter(|m| matches(&candidate.trigger, &m.trigger))
        .cloned()
        .collect()
}

/// Union of the conflicts of every member of a group, without duplicates
///
/// Members of the group itself are never reported, even when they are
/// standalone macros addressed by their own id.
pub fn find_group_conflicts<'a, I>(members: &[MacroDefinition], active: I) -> Vec<MacroDefinition>
where
    I: IntoIterator<Item = &'a MacroDefinition>,
    I::IntoIter: Clone,
{
    let member_ids: HashSet<&str> = members.iter().map(|m| m.id.as_str()).collect();
    let active = active.into_iter();

    let mut seen = HashSet::new();
    let mut conflicts = Vec::new();
    for member in members {
        for conflict in find_conflicts(member, active.clone()) {
            if member_ids.contains(conflict.id.as_str()) {
                continue;
            }
            if seen.insert(conflict.id.clone()) {
                conflicts.push(conflict);
            }
        }
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MacroRole, MacroTrigger};

    fn encoder_group() -> Vec<MacroDefinition> {
        vec![
            MacroDefinition::new("inc", MacroTrigger::control_change(1, 10))
                .in_group("enc", MacroRole::EncoderIncrement),
            MacroDefinition::new("dec", MacroTrigger::control_change(1, 11))
                .in_group("enc", MacroRole::EncoderDecrement),
        ]
    }

    #[test]
    fn test_standalone_conflicts_with_catch_all_increment() {
        let active = encoder_group();
        let standalone =
            MacroDefinition::new("solo", MacroTrigger::control_change(1, 10).with_value(5));

        let conflicts = find_conflicts(&standalone, &active);
        let ids: Vec<&str> = conflicts.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["inc"]);
    }

    #[test]
    fn test_value_specific_increment_does_not_conflict_with_other_value() {
        let mut active = encoder_group();
        active[0].trigger.value = Some(1);
        let standalone =
            MacroDefinition::new("solo", MacroTrigger::control_change(1, 10).with_value(5));

        assert!(find_conflicts(&standalone, &active).is_empty());
    }

    #[test]
    fn test_group_members_never_conflict_with_each_other() {
        let a = MacroDefinition::new("a", MacroTrigger::note_on(0, 60))
            .in_group("pad", MacroRole::Standard);
        let b = MacroDefinition::new("b", MacroTrigger::note_on(0, 60))
            .in_group("pad", MacroRole::EncoderClick);

        assert!(find_conflicts(&a, [&b]).is_empty());
        assert!(find_conflicts(&b, [&a]).is_empty());
    }

    #[test]
    fn test_candidate_is_not_its_own_conflict() {
        let m = MacroDefinition::new("m", MacroTrigger::note_on(0, 60));
        assert!(find_conflicts(&m, [&m]).is_empty());
    }

    #[test]
    fn test_different_groups_do_conflict() {
        let a = MacroDefinition::new("a", MacroTrigger::note_on(0, 60))
            .in_group("g1", MacroRole::Standard);
        let b = MacroDefinition::new("b", MacroTrigger::note_on(0, 60))
            .in_group("g2", MacroRole::Standard);
        assert_eq!(find_conflicts(&a, [&b]).len(), 1);
    }

    #[test]
    fn test_group_conflicts_are_deduplicated() {
        let group = encoder_group();
        // One catch-all active macro per encoder face plus a shared one on CC 10.
        let active = vec![
            MacroDefinition::new("x", MacroTrigger::control_change(1, 10)),
            MacroDefinition::new("y", MacroTrigger::control_change(1, 11).with_value(3)),
        ];
        let conflicts = find_group_conflicts(&group, &active);
        let mut ids: Vec<&str> = conflicts.iter().map(|m| m.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["x", "y"]);

        let doubled = vec![active[0].clone(), active[0].clone()];
        assert_eq!(find_group_conflicts(&group, &doubled).len(), 1);
    }
}
