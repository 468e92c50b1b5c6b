//! Active set - ids of the macros registered with the execution backend

use super::macro_store::MacroStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Macro ids the UI shows as active
///
/// Reflects desired state: an id leaves the set on deactivation even when
/// the backend fails to acknowledge the cancel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActiveSet {
    ids: BTreeSet<String>,
}

impl ActiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.ids.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.ids.iter()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Drop ids that no longer reference a stored macro; returns them
    pub fn retain_known(&mut self, store: &MacroStore) -> Vec<String> {
        let dangling: Vec<String> = self
            .ids
            .iter()
            .filter(|id| !store.contains(id))
            .cloned()
            .collect();
        for id in &dangling {
            self.ids.remove(id);
        }
        dangling
    }
}

impl FromIterator<String> for ActiveSet {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
