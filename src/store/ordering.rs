//! Ordering map - per-category display order of group keys
//!
//! Advisory only. Keys missing from a stored order are appended in macro
//! insertion order, stale keys are ignored. A category gets a stored order
//! the first time something is reordered or dropped into it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderingMap {
    orders: BTreeMap<String, Vec<String>>,
}

impl OrderingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored order for a category (empty when never materialized)
    pub fn stored(&self, category_id: &str) -> &[String] {
        self.orders
            .get(category_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Display order for a category given its current group keys
    pub fn ordered_keys(&self, category_id: &str, current: &[String]) -> Vec<String> {
        let present: HashSet<&str> = current.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();

        let mut keys: Vec<String> = self
            .stored(category_id)
            .iter()
            .filter(|k| present.contains(k.as_str()))
            .filter(|k| seen.insert(k.as_str()))
            .cloned()
            .collect();

        for key in current {
            if !seen.contains(key.as_str()) {
                keys.push(key.clone());
            }
        }
        keys
    }

    /// Move `dragged` to the slot `target` occupied
    ///
    /// Dragging downwards lands after the target, upwards before it. An
    /// unknown target sends the key to the end. Returns false when nothing
    /// changed.
    pub fn reorder(&mut self, category_id: &str, current: &[String], dragged: &str, target: &str) -> bool {
        if dragged == target {
            return false;
        }

        let mut keys = self.ordered_keys(category_id, current);
        let target_index = keys.iter().position(|k| k == target);
        keys.retain(|k| k != dragged);
        match target_index {
            Some(index) => keys.insert(index.min(keys.len()), dragged.to_string()),
            None => keys.push(dragged.to_string()),
        }

        let changed = self.stored(category_id) != keys.as_slice();
        self.orders.insert(category_id.to_string(), keys);
        changed
    }

    /// Insert `key` before `target` in a category's order
    ///
    /// Used when a group is dropped onto a key of another category.
    pub fn insert_before(&mut self, category_id: &str, current: &[String], key: &str, target: &str) {
        let mut keys = self.ordered_keys(category_id, current);
        keys.retain(|k| k != key);
        match keys.iter().position(|k| k == target) {
            Some(index) => keys.insert(index, key.to_string()),
            None => keys.push(key.to_string()),
        }
        self.orders.insert(category_id.to_string(), keys);
    }

    /// Forget a key in one category's stored order
    pub fn remove_key(&mut self, category_id: &str, key: &str) -> bool {
        let Some(keys) = self.orders.get_mut(category_id) else {
            return false;
        };
        let before = keys.len();
        keys.retain(|k| k != key);
        keys.len() != before
    }

    /// Forget a key everywhere (group deleted)
    pub fn remove_key_everywhere(&mut self, key: &str) -> bool {
        let mut changed = false;
        for keys in self.orders.values_mut() {
            let before = keys.len();
            keys.retain(|k| k != key);
            changed |= keys.len() != before;
        }
        changed
    }

    pub fn remove_category(&mut self, category_id: &str) -> bool {
        self.orders.remove(category_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unmaterialized_order_follows_membership() {
        let map = OrderingMap::new();
        let current = keys(&["a", "b", "c"]);
        assert_eq!(map.ordered_keys("cat", &current), current);
        assert!(map.stored("cat").is_empty());
    }

    #[test]
    fn test_first_reorder_materializes_list() {
        let mut map = OrderingMap::new();
        let current = keys(&["a", "b", "c"]);

        assert!(map.reorder("cat", &current, "c", "a"));
        assert_eq!(map.stored("cat"), keys(&["c", "a", "b"]).as_slice());
    }

    #[test]
    fn test_drag_down_lands_after_target() {
        let mut map = OrderingMap::new();
        let current = keys(&["a", "b", "c", "d"]);

        map.reorder("cat", &current, "a", "c");
        assert_eq!(map.ordered_keys("cat", &current), keys(&["b", "c", "a", "d"]));
    }

    #[test]
    fn test_missing_keys_appended_and_stale_ignored() {
        let mut map = OrderingMap::new();
        map.reorder("cat", &keys(&["a", "b"]), "b", "a");

        // "a" was deleted, "c" and "d" were created since the last reorder
        let current = keys(&["b", "c", "d"]);
        assert_eq!(map.ordered_keys("cat", &current), keys(&["b", "c", "d"]));

        let current = keys(&["a", "b", "c"]);
        assert_eq!(map.ordered_keys("cat", &current), keys(&["b", "a", "c"]));
    }

    #[test]
    fn test_reorder_onto_itself_is_noop() {
        let mut map = OrderingMap::new();
        assert!(!map.reorder("cat", &keys(&["a", "b"]), "a", "a"));
        assert!(map.stored("cat").is_empty());
    }

    #[test]
    fn test_insert_before_target() {
        let mut map = OrderingMap::new();
        map.insert_before("dest", &keys(&["x", "y"]), "moved", "y");
        assert_eq!(map.stored("dest"), keys(&["x", "moved", "y"]).as_slice());
    }

    #[test]
    fn test_remove_key() {
        let mut map = OrderingMap::new();
        map.reorder("cat", &keys(&["a", "b"]), "b", "a");
        assert!(map.remove_key("cat", "a"));
        assert!(!map.remove_key("cat", "a"));
        assert!(!map.remove_key("other", "a"));
        assert_eq!(map.stored("cat"), keys(&["b"]).as_slice());
    }
}
