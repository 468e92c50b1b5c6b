//! Macro and category edits
//!
//! Edits to a group with active members deactivate it first and activate the
//! new definition afterwards, so the backend never runs a stale registration.

use super::{ActivationOutcome, Coordinator, DeactivationReport, EngineEvent};
use crate::model::{validate_group, validate_trigger, DefinitionError, MacroCategory, MacroDefinition};
use crate::store::Document;
use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

impl Coordinator {
    /// Insert or replace one macro
    ///
    /// Returns the re-activation outcome when the macro's group had active
    /// members before the edit.
    pub async fn save_macro(&self, mut def: MacroDefinition) -> Result<Option<ActivationOutcome>> {
        validate_trigger(&def.trigger).map_err(|reason| DefinitionError::MalformedTrigger {
            id: def.id.clone(),
            reason,
        })?;

        let restore_keys = {
            let state = self.state.read().await;
            if !state.store.has_category(def.category()) {
                return Err(DefinitionError::UnknownCategory(def.category().to_string()).into());
            }
            if let Some(group) = &def.group_id {
                let role = def.role_or_standard();
                let clash = state
                    .store
                    .members_of_key(group)
                    .into_iter()
                    .any(|m| m.id != def.id && m.role_or_standard() == role);
                if clash {
                    return Err(DefinitionError::DuplicateRole {
                        group: group.clone(),
                        role,
                    }
                    .into());
                }
            }

            let mut keys = vec![def.group_key().to_string()];
            if let Some(old) = state.store.group_key_of(&def.id) {
                if !keys.contains(&old) {
                    keys.push(old);
                }
            }
            keys.retain(|k| {
                state
                    .store
                    .members_of_key(k)
                    .iter()
                    .any(|m| state.active.contains(&m.id))
            });
            keys
        };

        for key in &restore_keys {
            self.deactivate_group(key).await?;
        }

        let new_key = def.group_key().to_string();
        {
            let mut state = self.state.write().await;
            if let Some(existing) = state.store.get(&def.id) {
                def.created_at = existing.created_at;
                def.updated_at = Some(Utc::now());
            }
            let previous = state.store.upsert(def);
            if let Some(old_key) = previous.as_ref().map(|p| p.group_key().to_string()) {
                if old_key != new_key && state.store.members_of_key(&old_key).is_empty() {
                    state.ordering.remove_key_everywhere(&old_key);
                }
            }
        }
        self.persist(&[Document::Macros, Document::Ordering]).await?;
        self.notify(EngineEvent::MacrosChanged);

        self.reactivate(&new_key, restore_keys).await
    }

    /// Replace every member of a group at once
    ///
    /// Members not in `members` are deleted. The whole set is validated
    /// before anything changes.
    pub async fn save_group(&self, group_id: &str, members: Vec<MacroDefinition>) -> Result<Option<ActivationOutcome>> {
        let members: Vec<MacroDefinition> = members
            .into_iter()
            .map(|mut m| {
                m.group_id = Some(group_id.to_string());
                m
            })
            .collect();
        validate_group(group_id, &members)?;

        let restore_keys = {
            let state = self.state.read().await;
            if let Some(m) = members.iter().find(|m| !state.store.has_category(m.category())) {
                return Err(DefinitionError::UnknownCategory(m.category().to_string()).into());
            }

            let mut keys = vec![group_id.to_string()];
            for m in &members {
                if let Some(old) = state.store.group_key_of(&m.id) {
                    if !keys.contains(&old) {
                        keys.push(old);
                    }
                }
            }
            keys.retain(|k| {
                state
                    .store
                    .members_of_key(k)
                    .iter()
                    .any(|m| state.active.contains(&m.id))
            });
            keys
        };

        for key in &restore_keys {
            self.deactivate_group(key).await?;
        }

        {
            let mut state = self.state.write().await;
            let stale: Vec<String> = state
                .store
                .group_member_ids(group_id)
                .iter()
                .filter(|id| !members.iter().any(|m| &m.id == *id))
                .cloned()
                .collect();
            for id in &stale {
                state.store.remove(id);
            }

            let now = Utc::now();
            for mut member in members {
                let old_key = state.store.group_key_of(&member.id);
                if let Some(existing) = state.store.get(&member.id) {
                    member.created_at = existing.created_at;
                    member.updated_at = Some(now);
                }
                state.store.upsert(member);
                if let Some(old_key) = old_key {
                    if old_key != group_id && state.store.members_of_key(&old_key).is_empty() {
                        state.ordering.remove_key_everywhere(&old_key);
                    }
                }
            }
        }
        info!("💾 Saved group '{}'", group_id);
        self.persist(&[Document::Macros, Document::Ordering]).await?;
        self.notify(EngineEvent::MacrosChanged);

        self.reactivate(group_id, restore_keys).await
    }

    async fn reactivate(&self, key: &str, restore_keys: Vec<String>) -> Result<Option<ActivationOutcome>> {
        let mut outcome = None;
        for restore in restore_keys {
            if self.state.read().await.store.members_of_key(&restore).is_empty() {
                continue;
            }
            let result = self.activate_group(&restore).await?;
            if let ActivationOutcome::Rejected(e) = &result {
                warn!("Could not reactivate '{}' after edit: {}", restore, e);
            }
            if restore == key {
                outcome = Some(result);
            }
        }
        Ok(outcome)
    }

    /// Delete one macro
    ///
    /// A macro in an active group takes the whole group down with it; the
    /// remaining members stay inactive.
    pub async fn delete_macro(&self, macro_id: &str) -> Result<DeactivationReport> {
        let key = self
            .state
            .read()
            .await
            .store
            .group_key_of(macro_id)
            .ok_or_else(|| DefinitionError::UnknownMacro(macro_id.to_string()))?;

        let _guard = self.group_locks.acquire(&key).await;
        let active: Vec<String> = {
            let state = self.state.read().await;
            state
                .store
                .members_of_key(&key)
                .into_iter()
                .filter(|m| state.active.contains(&m.id))
                .map(|m| m.id.clone())
                .collect()
        };
        let report = self.cancel_ids(active).await?;

        {
            let mut state = self.state.write().await;
            state.store.remove(macro_id);
            if state.store.members_of_key(&key).is_empty() {
                state.ordering.remove_key_everywhere(&key);
            }
        }
        info!("🗑️  Deleted macro '{}'", macro_id);
        self.persist(&[Document::Macros, Document::Ordering]).await?;
        self.notify(EngineEvent::MacrosChanged);
        Ok(report)
    }

    /// Delete every member of a group key
    pub async fn delete_group(&self, key: &str) -> Result<DeactivationReport> {
        let _guard = self.group_locks.acquire(key).await;
        let (ids, active): (Vec<String>, Vec<String>) = {
            let state = self.state.read().await;
            let members = state.store.members_of_key(key);
            if members.is_empty() {
                return Err(DefinitionError::UnknownMacro(key.to_string()).into());
            }
            (
                members.iter().map(|m| m.id.clone()).collect(),
                members
                    .iter()
                    .filter(|m| state.active.contains(&m.id))
                    .map(|m| m.id.clone())
                    .collect(),
            )
        };
        let report = self.cancel_ids(active).await?;

        {
            let mut state = self.state.write().await;
            for id in &ids {
                state.store.remove(id);
            }
            state.ordering.remove_key_everywhere(key);
        }
        info!("🗑️  Deleted group '{}' ({} macro(s))", key, ids.len());
        self.persist(&[Document::Macros, Document::Ordering]).await?;
        self.notify(EngineEvent::MacrosChanged);
        Ok(report)
    }

    // =========================================================================
    // Categories
    // =========================================================================

    pub async fn create_category(&self, category: MacroCategory) -> Result<()> {
        self.state.write().await.store.add_category(category)?;
        self.persist(&[Document::Categories]).await?;
        self.notify(EngineEvent::CategoriesChanged);
        Ok(())
    }

    pub async fn update_category(&self, category: MacroCategory) -> Result<()> {
        self.state.write().await.store.update_category(category)?;
        self.persist(&[Document::Categories]).await?;
        self.notify(EngineEvent::CategoriesChanged);
        Ok(())
    }

    /// Remember whether a category is folded open in the UI
    pub async fn set_category_expanded(&self, category_id: &str, expanded: bool) -> Result<()> {
        let mut category = self
            .state
            .read()
            .await
            .store
            .category(category_id)
            .cloned()
            .ok_or_else(|| DefinitionError::UnknownCategory(category_id.to_string()))?;
        category.is_expanded = Some(expanded);
        self.update_category(category).await
    }

    /// Delete a category; its macros move to the default category
    ///
    /// Returns the ids of the reassigned macros. Activation state is left
    /// untouched.
    pub async fn delete_category(&self, category_id: &str) -> Result<Vec<String>> {
        let reassigned = {
            let mut state = self.state.write().await;
            let reassigned = state.store.remove_category(category_id)?;
            state.ordering.remove_category(category_id);
            reassigned
        };
        info!(
            "🗑️  Deleted category '{}' ({} macro(s) moved to default)",
            category_id,
            reassigned.len()
        );
        self.persist(&[Document::Macros, Document::Categories, Document::Ordering])
            .await?;
        self.notify(EngineEvent::CategoriesChanged);
        if !reassigned.is_empty() {
            self.notify(EngineEvent::MacrosChanged);
        }
        Ok(reassigned)
    }
}
