//! MacroStore - primary macro table with a group index and the category list

use crate::model::{MacroCategory, MacroDefinition, DEFAULT_CATEGORY_ID};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Rejected store mutations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("the default category cannot be deleted")]
    DefaultCategoryProtected,

    #[error("category '{0}' already exists")]
    DuplicateCategory(String),

    #[error("category '{0}' not found")]
    UnknownCategory(String),
}

/// Macro definitions keyed by id, kept in insertion order
///
/// `groups` maps every `groupId` to its member ids and is updated on each
/// insert/remove so group lookups never scan the whole table.
#[derive(Debug, Clone)]
pub struct MacroStore {
    macros: HashMap<String, MacroDefinition>,
    order: Vec<String>,
    groups: HashMap<String, Vec<String>>,
    categories: Vec<MacroCategory>,
}

impl MacroStore {
    /// Empty store holding only the default category
    pub fn new() -> Self {
        Self {
            macros: HashMap::new(),
            order: Vec::new(),
            groups: HashMap::new(),
            categories: vec![MacroCategory::default_category()],
        }
    }

    /// Build a store from persisted records
    ///
    /// Records repeating an id are dropped (first occurrence wins). Returns
    /// the store and the number of duplicates discarded.
    pub fn from_records(records: Vec<MacroDefinition>, categories: Vec<MacroCategory>) -> (Self, usize) {
        let mut store = Self {
            macros: HashMap::new(),
            order: Vec::new(),
            groups: HashMap::new(),
            categories: Vec::new(),
        };

        let mut seen = HashSet::new();
        for category in categories {
            if seen.insert(category.id.clone()) {
                store.categories.push(category);
            }
        }

        let mut duplicates = 0;
        for record in records {
            if store.macros.contains_key(&record.id) {
                duplicates += 1;
                continue;
            }
            store.insert_new(record);
        }

        (store, duplicates)
    }

    fn insert_new(&mut self, def: MacroDefinition) {
        if let Some(group_id) = &def.group_id {
            self.groups
                .entry(group_id.clone())
                .or_default()
                .push(def.id.clone());
        }
        self.order.push(def.id.clone());
        self.macros.insert(def.id.clone(), def);
    }

    fn unindex_group(&mut self, group_id: &str, id: &str) {
        if let Some(members) = self.groups.get_mut(group_id) {
            members.retain(|m| m != id);
            if members.is_empty() {
                self.groups.remove(group_id);
            }
        }
    }

    // =========================================================================
    // Macros
    // =========================================================================

    pub fn get(&self, id: &str) -> Option<&MacroDefinition> {
        self.macros.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.macros.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// All macros in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &MacroDefinition> {
        self.order.iter().filter_map(|id| self.macros.get(id))
    }

    /// Records in insertion order, as persisted
    pub fn to_records(&self) -> Vec<MacroDefinition> {
        self.iter().cloned().collect()
    }

    /// Insert or replace a macro, keeping its position when it already exists
    pub fn upsert(&mut self, def: MacroDefinition) -> Option<MacroDefinition> {
        let Some(old) = self.macros.get(&def.id).cloned() else {
            self.insert_new(def);
            return None;
        };

        if old.group_id != def.group_id {
            if let Some(group_id) = &old.group_id {
                self.unindex_group(group_id, &old.id);
            }
            if let Some(group_id) = &def.group_id {
                self.groups
                    .entry(group_id.clone())
                    .or_default()
                    .push(def.id.clone());
            }
        }
        self.macros.insert(def.id.clone(), def);
        Some(old)
    }

    pub fn remove(&mut self, id: &str) -> Option<MacroDefinition> {
        let removed = self.macros.remove(id)?;
        self.order.retain(|m| m != id);
        if let Some(group_id) = &removed.group_id {
            self.unindex_group(group_id, id);
        }
        Some(removed)
    }

    /// Member ids of a `groupId`, in insertion order
    pub fn group_member_ids(&self, group_id: &str) -> &[String] {
        self.groups.get(group_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Macros addressed by a group key: the group's members, or the lone macro
    pub fn members_of_key(&self, key: &str) -> Vec<&MacroDefinition> {
        if let Some(ids) = self.groups.get(key) {
            return ids.iter().filter_map(|id| self.macros.get(id)).collect();
        }
        self.macros.get(key).into_iter().collect()
    }

    /// Group key of the macro with this id
    pub fn group_key_of(&self, id: &str) -> Option<String> {
        self.macros.get(id).map(|m| m.group_key().to_string())
    }

    /// Distinct group keys of a category, in macro insertion order
    pub fn group_keys_in_category(&self, category_id: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.iter()
            .filter(|m| m.category() == category_id)
            .map(|m| m.group_key().to_string())
            .filter(|key| seen.insert(key.clone()))
            .collect()
    }

    pub fn macros_in_category(&self, category_id: &str) -> Vec<&MacroDefinition> {
        self.iter().filter(|m| m.category() == category_id).collect()
    }

    /// Point a macro at another category; returns false for unknown ids
    pub fn set_category(&mut self, id: &str, category_id: &str) -> bool {
        match self.macros.get_mut(id) {
            Some(m) => {
                m.category_id = Some(category_id.to_string());
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Categories
    // =========================================================================

    pub fn categories(&self) -> &[MacroCategory] {
        &self.categories
    }

    pub fn category(&self, id: &str) -> Option<&MacroCategory> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn has_category(&self, id: &str) -> bool {
        self.category(id).is_some()
    }

    /// Insert the default category if it is missing; true when it was added
    pub fn ensure_default_category(&mut self) -> bool {
        if self.has_category(DEFAULT_CATEGORY_ID) {
            return false;
        }
        self.categories.insert(0, MacroCategory::default_category());
        true
    }

    pub fn add_category(&mut self, category: MacroCategory) -> Result<(), StoreError> {
        if self.has_category(&category.id) {
            return Err(StoreError::DuplicateCategory(category.id));
        }
        self.categories.push(category);
        Ok(())
    }

    pub fn update_category(&mut self, category: MacroCategory) -> Result<(), StoreError> {
        let slot = self
            .categories
            .iter_mut()
            .find(|c| c.id == category.id)
            .ok_or_else(|| StoreError::UnknownCategory(category.id.clone()))?;
        *slot = category;
        Ok(())
    }

    /// Remove a category, moving its macros to the default category
    ///
    /// Returns the ids of the reassigned macros.
    pub fn remove_category(&mut self, id: &str) -> Result<Vec<String>, StoreError> {
        if id == DEFAULT_CATEGORY_ID {
            return Err(StoreError::DefaultCategoryProtected);
        }
        let position = self
            .categories
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| StoreError::UnknownCategory(id.to_string()))?;
        self.categories.remove(position);

        let mut reassigned = Vec::new();
        for macro_id in &self.order {
            if let Some(m) = self.macros.get_mut(macro_id) {
                if m.category() == id {
                    m.category_id = Some(DEFAULT_CATEGORY_ID.to_string());
                    reassigned.push(m.id.clone());
                }
            }
        }
        self.ensure_default_category();
        Ok(reassigned)
    }
}

impl Default for MacroStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MacroRole, MacroTrigger};

    fn standalone(id: &str, note: u8) -> MacroDefinition {
        MacroDefinition::new(id, MacroTrigger::note_on(0, note))
    }

    fn face(id: &str, group: &str, role: MacroRole) -> MacroDefinition {
        MacroDefinition::new(id, MacroTrigger::control_change(0, 10)).in_group(group, role)
    }

    #[test]
    fn test_from_records_keeps_first_duplicate() {
        let mut second = standalone("m1", 61);
        second.name = Some("second".to_string());
        let (store, dropped) = MacroStore::from_records(
            vec![standalone("m1", 60), standalone("m2", 62), second],
            vec![MacroCategory::default_category()],
        );

        assert_eq!(dropped, 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("m1").unwrap().trigger.note, Some(60));
        assert!(store.get("m1").unwrap().name.is_none());
    }

    #[test]
    fn test_group_index_tracks_inserts_and_removes() {
        let mut store = MacroStore::new();
        store.upsert(face("inc", "enc", MacroRole::EncoderIncrement));
        store.upsert(face("dec", "enc", MacroRole::EncoderDecrement));
        store.upsert(standalone("solo", 60));

        assert_eq!(store.group_member_ids("enc"), ["inc".to_string(), "dec".to_string()]);
        assert_eq!(store.members_of_key("enc").len(), 2);
        assert_eq!(store.members_of_key("solo").len(), 1);
        assert!(store.members_of_key("missing").is_empty());

        store.remove("inc");
        assert_eq!(store.group_member_ids("enc"), ["dec".to_string()]);
        store.remove("dec");
        assert!(store.group_member_ids("enc").is_empty());
    }

    #[test]
    fn test_upsert_moving_between_groups_reindexes() {
        let mut store = MacroStore::new();
        store.upsert(face("a", "g1", MacroRole::Standard));
        store.upsert(face("a", "g2", MacroRole::Standard));

        assert!(store.group_member_ids("g1").is_empty());
        assert_eq!(store.group_member_ids("g2"), ["a".to_string()]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_group_keys_in_category_are_unique_and_ordered() {
        let mut store = MacroStore::new();
        store.upsert(standalone("a", 60));
        store.upsert(face("inc", "enc", MacroRole::EncoderIncrement));
        store.upsert(face("dec", "enc", MacroRole::EncoderDecrement));
        store.upsert(standalone("b", 61).in_category("other"));

        assert_eq!(
            store.group_keys_in_category(DEFAULT_CATEGORY_ID),
            vec!["a".to_string(), "enc".to_string()]
        );
        assert_eq!(store.group_keys_in_category("other"), vec!["b".to_string()]);
    }

    #[test]
    fn test_remove_category_reassigns_to_default() {
        let mut store = MacroStore::new();
        store
            .add_category(MacroCategory::new("fx", "Effects", "#ff0000"))
            .unwrap();
        store.upsert(standalone("a", 60).in_category("fx"));

        let moved = store.remove_category("fx").unwrap();
        assert_eq!(moved, vec!["a".to_string()]);
        assert_eq!(store.get("a").unwrap().category(), DEFAULT_CATEGORY_ID);
        assert!(!store.has_category("fx"));
    }

    #[test]
    fn test_default_category_cannot_be_removed() {
        let mut store = MacroStore::new();
        assert_eq!(
            store.remove_category(DEFAULT_CATEGORY_ID),
            Err(StoreError::DefaultCategoryProtected)
        );
    }

    #[test]
    fn test_duplicate_category_rejected() {
        let mut store = MacroStore::new();
        let err = store
            .add_category(MacroCategory::default_category())
            .unwrap_err();
        assert_eq!(err, StoreError::DuplicateCategory(DEFAULT_CATEGORY_ID.to_string()));
    }
}
