//! Whole-category activation

use super::{
    ActivationOutcome, ActivationReport, ActivationTarget, CategoryMode, Coordinator,
    DeactivationReport,
};
use crate::model::DefinitionError;
use anyhow::Result;
use tracing::info;

impl Coordinator {
    /// Activate every group of a category
    ///
    /// In [`CategoryMode::Additive`] the category's groups are checked against
    /// the active macros of other categories; collisions inside the category
    /// are allowed. [`CategoryMode::Exclusive`] switches everything else off
    /// first and never pauses.
    pub async fn activate_category(&self, category_id: &str, mode: CategoryMode) -> Result<ActivationOutcome> {
        let target = ActivationTarget::Category {
            id: category_id.to_string(),
            mode,
        };
        let (inactive_keys, conflicts) = {
            let state = self.state.read().await;
            if !state.store.has_category(category_id) {
                return Ok(ActivationOutcome::Rejected(DefinitionError::UnknownCategory(
                    category_id.to_string(),
                )));
            }

            let keys = state.store.group_keys_in_category(category_id);
            if mode == CategoryMode::Additive
                && !keys.is_empty()
                && keys.iter().all(|k| state.is_key_fully_active(k))
            {
                return Ok(ActivationOutcome::AlreadyActive);
            }

            let inactive_keys: Vec<String> = keys
                .into_iter()
                .filter(|k| !state.is_key_fully_active(k))
                .collect();
            (inactive_keys, state.conflicts_for(&target))
        };

        if !conflicts.is_empty() {
            let pending = self
                .open_pending(target, inactive_keys, conflicts)
                .await;
            return Ok(ActivationOutcome::Pending(pending));
        }

        self.activate_category_unchecked(category_id, mode).await
    }

    /// Activate a category's groups without looking for conflicts
    pub(crate) async fn activate_category_unchecked(
        &self,
        category_id: &str,
        mode: CategoryMode,
    ) -> Result<ActivationOutcome> {
        let mut report = ActivationReport::default();
        if mode == CategoryMode::Exclusive {
            report.deactivated = self.deactivate_all().await?.deactivated;
        }

        let keys = self.state.read().await.store.group_keys_in_category(category_id);
        for key in keys {
            match self.activate_key_unchecked(&key).await? {
                ActivationOutcome::Activated(group) => report.merge(group),
                ActivationOutcome::Rejected(e) => report.rejected.push((key, e)),
                _ => {}
            }
        }

        info!(
            "📂 Category '{}' activated ({:?}): {} macro(s) on, {} off",
            category_id,
            mode,
            report.activated.len(),
            report.deactivated.len()
        );
        Ok(ActivationOutcome::Activated(report))
    }

    /// Deactivate every active group of a category
    pub async fn deactivate_category(&self, category_id: &str) -> Result<DeactivationReport> {
        let keys = self.state.read().await.store.group_keys_in_category(category_id);
        let mut report = DeactivationReport::default();
        for key in keys {
            report.merge(self.deactivate_group(&key).await?);
        }
        Ok(report)
    }

    /// True when the category has groups and all of them are fully active
    pub async fn is_category_active(&self, category_id: &str) -> bool {
        let state = self.state.read().await;
        let keys = state.store.group_keys_in_category(category_id);
        !keys.is_empty() && keys.iter().all(|k| state.is_key_fully_active(k))
    }
}
