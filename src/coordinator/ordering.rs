//! Display order and category moves

use super::{Coordinator, EngineEvent};
use crate::model::DefinitionError;
use crate::store::Document;
use anyhow::Result;
use tracing::{debug, info};

impl Coordinator {
    /// Group keys of a category in display order
    pub async fn ordered_group_keys(&self, category_id: &str) -> Vec<String> {
        let state = self.state.read().await;
        let current = state.store.group_keys_in_category(category_id);
        state.ordering.ordered_keys(category_id, &current)
    }

    /// Drag `dragged` onto `target` within a category
    ///
    /// Returns false when the order did not change.
    pub async fn reorder(&self, category_id: &str, dragged: &str, target: &str) -> Result<bool> {
        let changed = {
            let mut state = self.state.write().await;
            if !state.store.has_category(category_id) {
                return Err(DefinitionError::UnknownCategory(category_id.to_string()).into());
            }
            let current = state.store.group_keys_in_category(category_id);
            if !current.iter().any(|k| k == dragged) {
                return Err(DefinitionError::UnknownMacro(dragged.to_string()).into());
            }
            state.ordering.reorder(category_id, &current, dragged, target)
        };

        if changed {
            debug!("Reordered '{}' onto '{}' in '{}'", dragged, target, category_id);
            self.persist(&[Document::Ordering]).await?;
            self.notify(EngineEvent::OrderingChanged {
                category_id: category_id.to_string(),
            });
        }
        Ok(changed)
    }

    /// Move a whole group to another category
    ///
    /// `key` is a group key or the id of any member; every member of the
    /// group moves. With a drop target the group lands before that key in the
    /// destination order; otherwise it is appended.
    pub async fn move_to_category(&self, key: &str, category_id: &str, drop_target: Option<&str>) -> Result<()> {
        let (key, source) = {
            let mut state = self.state.write().await;
            if !state.store.has_category(category_id) {
                return Err(DefinitionError::UnknownCategory(category_id.to_string()).into());
            }
            let key = state.store.group_key_of(key).unwrap_or_else(|| key.to_string());
            let ids: Vec<String> = state
                .store
                .members_of_key(&key)
                .into_iter()
                .map(|m| m.id.clone())
                .collect();
            let Some(first) = ids.first() else {
                return Err(DefinitionError::UnknownMacro(key).into());
            };
            let source = state
                .store
                .get(first)
                .map(|m| m.category().to_string())
                .unwrap_or_default();

            for id in &ids {
                state.store.set_category(id, category_id);
            }

            // Members may have been split across categories; drop every stale slot
            state.ordering.remove_key_everywhere(&key);
            if let Some(target) = drop_target {
                let current = state.store.group_keys_in_category(category_id);
                state.ordering.insert_before(category_id, &current, &key, target);
            }
            (key, source)
        };

        info!("📁 Moved '{}' from '{}' to '{}'", key, source, category_id);
        self.persist(&[Document::Macros, Document::Ordering]).await?;
        self.notify(EngineEvent::MacrosChanged);
        if source != category_id {
            self.notify(EngineEvent::OrderingChanged { category_id: source });
        }
        self.notify(EngineEvent::OrderingChanged {
            category_id: category_id.to_string(),
        });
        Ok(())
    }
}
