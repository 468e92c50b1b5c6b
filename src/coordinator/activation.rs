//! Group activation, deactivation and conflict resolution

use super::{
    ActivationOutcome, ActivationReport, ActivationTarget, Coordinator, DeactivationReport,
    EngineEvent, PendingResolution, Resolution,
};
use crate::backend::Registration;
use crate::model::{validate_group, DefinitionError, MacroDefinition};
use crate::store::Document;
use anyhow::Result;
use std::collections::HashMap;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, warn};

impl Coordinator {
    /// Activate the group the macro belongs to
    ///
    /// Returns [`ActivationOutcome::Pending`] when an active macro listens
    /// for the same MIDI event; nothing is registered until the caller
    /// resolves it.
    pub async fn activate(&self, macro_id: &str) -> Result<ActivationOutcome> {
        let key = self.state.read().await.store.group_key_of(macro_id);
        match key {
            Some(key) => self.activate_group(&key).await,
            None => Ok(ActivationOutcome::Rejected(DefinitionError::UnknownMacro(
                macro_id.to_string(),
            ))),
        }
    }

    /// Activate every member of a group key
    pub async fn activate_group(&self, key: &str) -> Result<ActivationOutcome> {
        let target = ActivationTarget::Group(key.to_string());
        let conflicts = {
            let state = self.state.read().await;
            let members = state.members_cloned(key);
            if let Err(e) = validate_group(key, &members) {
                debug!("Refusing to activate '{}': {}", key, e);
                return Ok(ActivationOutcome::Rejected(e));
            }
            if state.is_key_fully_active(key) {
                return Ok(ActivationOutcome::AlreadyActive);
            }
            state.conflicts_for(&target)
        };

        if !conflicts.is_empty() {
            let pending = self
                .open_pending(target, vec![key.to_string()], conflicts)
                .await;
            return Ok(ActivationOutcome::Pending(pending));
        }

        self.activate_key_unchecked(key).await
    }

    /// Conflicts the macro's group would hit if activated now
    pub async fn preview_conflicts(&self, macro_id: &str) -> Vec<MacroDefinition> {
        let state = self.state.read().await;
        let Some(key) = state.store.group_key_of(macro_id) else {
            return Vec::new();
        };
        state.conflicts_for(&ActivationTarget::Group(key))
    }

    /// Record a paused activation
    ///
    /// A target already awaiting resolution keeps its token; its conflict
    /// list is refreshed and handed back again.
    pub(crate) async fn open_pending(
        &self,
        target: ActivationTarget,
        group_keys: Vec<String>,
        conflicts: Vec<MacroDefinition>,
    ) -> PendingResolution {
        let pending = {
            let mut state = self.state.write().await;
            if let Some(open) = state.pending.values_mut().find(|p| p.target == target) {
                open.group_keys = group_keys;
                open.conflicts = conflicts;
                debug!("Activation of {:?} already awaits resolution #{}", open.target, open.token);
                return open.clone();
            }

            let pending = PendingResolution {
                token: self.next_token(),
                target,
                group_keys,
                conflicts,
            };
            state.pending.insert(pending.token, pending.clone());
            pending
        };

        let conflict_ids: Vec<String> = pending.conflicts.iter().map(|m| m.id.clone()).collect();
        info!(
            "⚠️  Activation of {:?} conflicts with {:?}, awaiting resolution #{}",
            pending.target, conflict_ids, pending.token
        );
        self.notify(EngineEvent::ConflictPending {
            token: pending.token,
            conflicts: conflict_ids,
        });
        pending
    }

    /// Resume a paused activation
    pub async fn resolve(&self, pending: PendingResolution, resolution: Resolution) -> Result<ActivationOutcome> {
        let open = self.state.write().await.pending.remove(&pending.token).is_some();
        if !open {
            return Ok(ActivationOutcome::Rejected(DefinitionError::StaleResolution(
                pending.token,
            )));
        }

        match resolution {
            Resolution::Cancel => {
                info!("Resolution #{}: cancelled", pending.token);
                Ok(ActivationOutcome::Cancelled)
            }
            Resolution::KeepExisting => {
                info!("Resolution #{}: keeping existing macros", pending.token);
                Ok(ActivationOutcome::KeptExisting)
            }
            Resolution::Replace => {
                // The active set may have moved since the conflict was reported
                let mut keys = pending.conflicting_group_keys();
                let current = self.state.read().await.conflicts_for(&pending.target);
                for conflict in &current {
                    let key = conflict.group_key();
                    if !keys.iter().any(|k| k == key) {
                        keys.push(key.to_string());
                    }
                }

                info!("Resolution #{}: replacing {:?}", pending.token, keys);
                let mut replaced = DeactivationReport::default();
                for key in &keys {
                    replaced.merge(self.deactivate_group(key).await?);
                }

                let outcome = match &pending.target {
                    ActivationTarget::Group(key) => self.activate_key_unchecked(key).await?,
                    ActivationTarget::Category { id, mode } => {
                        self.activate_category_unchecked(id, *mode).await?
                    }
                };

                Ok(match outcome {
                    ActivationOutcome::Activated(mut report) => {
                        let mut deactivated = replaced.deactivated;
                        deactivated.extend(report.deactivated);
                        report.deactivated = deactivated;
                        ActivationOutcome::Activated(report)
                    }
                    other => other,
                })
            }
        }
    }

    /// Activate a group without looking for conflicts
    pub(crate) async fn activate_key_unchecked(&self, key: &str) -> Result<ActivationOutcome> {
        let members = {
            let state = self.state.read().await;
            let members = state.members_cloned(key);
            if let Err(e) = validate_group(key, &members) {
                return Ok(ActivationOutcome::Rejected(e));
            }
            if state.is_key_fully_active(key) {
                return Ok(ActivationOutcome::AlreadyActive);
            }
            members
        };

        let report = self.register_members(key, &members).await?;
        Ok(ActivationOutcome::Activated(report))
    }

    /// Register the inactive members of a group with the backend
    ///
    /// Members are registered concurrently; a refused member is reported and
    /// the others still go live.
    async fn register_members(&self, key: &str, members: &[MacroDefinition]) -> Result<ActivationReport> {
        let _guard = self.group_locks.acquire(key).await;

        let registrations: Vec<Registration> = {
            let state = self.state.read().await;
            members
                .iter()
                .filter(|m| state.store.contains(&m.id) && !state.active.contains(&m.id))
                .map(|m| Registration::for_member(m, members))
                .collect()
        };

        let report = self.register_batch(registrations).await;

        if !report.activated.is_empty() {
            let mut state = self.state.write().await;
            for id in &report.activated {
                state.active.insert(id.clone());
            }
        }
        self.settle_activation(&report).await?;

        info!(
            "✅ Group '{}' activated ({} ok, {} failed)",
            key,
            report.activated.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Issue registrations concurrently and await them as a batch
    async fn register_batch(&self, registrations: Vec<Registration>) -> ActivationReport {
        let order: Vec<String> = registrations.iter().map(|r| r.macro_id.clone()).collect();

        let mut tasks = JoinSet::new();
        let mut task_ids: HashMap<task::Id, String> = HashMap::new();
        for registration in registrations {
            let backend = self.backend.clone();
            let id = registration.macro_id.clone();
            let handle = tasks.spawn(async move { backend.register(registration).await });
            task_ids.insert(handle.id(), id);
        }

        let mut report = ActivationReport::default();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((task_id, Ok(()))) => report.activated.extend(task_ids.remove(&task_id)),
                Ok((task_id, Err(e))) => {
                    let id = task_ids.remove(&task_id).unwrap_or_default();
                    warn!("Backend refused macro '{}': {}", id, e);
                    report.failed.push((id, e.to_string()));
                }
                Err(e) => {
                    let id = task_ids.remove(&e.id()).unwrap_or_default();
                    error!("Registration task for '{}' failed: {}", id, e);
                    report.failed.push((id, format!("registration task failed: {}", e)));
                }
            }
        }

        // Completion order is arbitrary; report in member order
        let position = |id: &String| order.iter().position(|o| o == id).unwrap_or(usize::MAX);
        report.activated.sort_by_key(|id| position(id));
        report.failed.sort_by_key(|(id, _)| position(id));
        report
    }

    async fn settle_activation(&self, report: &ActivationReport) -> Result<()> {
        for (macro_id, reason) in &report.failed {
            self.notify(EngineEvent::RegistrationFailed {
                macro_id: macro_id.clone(),
                reason: reason.clone(),
            });
        }
        if !report.activated.is_empty() {
            self.persist(&[Document::ActiveSet]).await?;
            self.notify(EngineEvent::ActiveSetChanged {
                active: self.active_ids().await,
            });
        }
        Ok(())
    }

    /// Deactivate the group the macro belongs to
    pub async fn deactivate(&self, macro_id: &str) -> Result<DeactivationReport> {
        let key = self.state.read().await.store.group_key_of(macro_id);
        match key {
            Some(key) => self.deactivate_group(&key).await,
            None => {
                debug!("Deactivate: macro '{}' not found", macro_id);
                Ok(DeactivationReport::default())
            }
        }
    }

    /// Deactivate every active member of a group key
    pub async fn deactivate_group(&self, key: &str) -> Result<DeactivationReport> {
        let _guard = self.group_locks.acquire(key).await;

        let ids: Vec<String> = {
            let state = self.state.read().await;
            state
                .store
                .members_of_key(key)
                .into_iter()
                .filter(|m| state.active.contains(&m.id))
                .map(|m| m.id.clone())
                .collect()
        };

        let report = self.cancel_ids(ids).await?;
        if !report.deactivated.is_empty() {
            info!("⏹️  Group '{}' deactivated", key);
        }
        Ok(report)
    }

    /// Cancel macros with the backend and drop them from the active set
    ///
    /// Ids leave the active set whether or not the backend acknowledged the
    /// cancel. The caller must hold the group lock.
    pub(crate) async fn cancel_ids(&self, ids: Vec<String>) -> Result<DeactivationReport> {
        if ids.is_empty() {
            return Ok(DeactivationReport::default());
        }

        let mut tasks = JoinSet::new();
        let mut task_ids: HashMap<task::Id, String> = HashMap::new();
        for id in ids.iter().cloned() {
            let backend = self.backend.clone();
            let handle = tasks.spawn({
                let id = id.clone();
                async move { backend.cancel(&id).await }
            });
            task_ids.insert(handle.id(), id);
        }

        let mut report = DeactivationReport {
            deactivated: ids.clone(),
            cancel_failed: Vec::new(),
        };
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((task_id, Err(e))) => {
                    let id = task_ids.remove(&task_id).unwrap_or_default();
                    warn!("Backend failed to cancel macro '{}': {}", id, e);
                    report.cancel_failed.push((id, e.to_string()));
                }
                Err(e) => {
                    let id = task_ids.remove(&e.id()).unwrap_or_default();
                    error!("Cancel task for '{}' failed: {}", id, e);
                    report.cancel_failed.push((id, format!("cancel task failed: {}", e)));
                }
            }
        }
        report
            .cancel_failed
            .sort_by_key(|(id, _)| ids.iter().position(|i| i == id));

        {
            let mut state = self.state.write().await;
            for id in &ids {
                state.active.remove(id);
            }
        }
        self.persist(&[Document::ActiveSet]).await?;

        for (macro_id, reason) in &report.cancel_failed {
            self.notify(EngineEvent::CancelFailed {
                macro_id: macro_id.clone(),
                reason: reason.clone(),
            });
        }
        self.notify(EngineEvent::ActiveSetChanged {
            active: self.active_ids().await,
        });
        Ok(report)
    }

    /// Deactivate every active group
    pub async fn deactivate_all(&self) -> Result<DeactivationReport> {
        let keys = self.state.read().await.active_group_keys();
        let mut report = DeactivationReport::default();
        for key in keys {
            report.merge(self.deactivate_group(&key).await?);
        }
        Ok(report)
    }

    /// Register the persisted active set with the backend
    ///
    /// Run once at startup. Exactly the persisted ids are registered, without
    /// conflict checks; ids the backend refuses leave the active set.
    pub async fn restore_registrations(&self) -> Result<ActivationReport> {
        let plan: Vec<(String, Vec<Registration>)> = {
            let state = self.state.read().await;
            state
                .active_group_keys()
                .into_iter()
                .map(|key| {
                    let members = state.members_cloned(&key);
                    let registrations = members
                        .iter()
                        .filter(|m| state.active.contains(&m.id))
                        .map(|m| Registration::for_member(m, &members))
                        .collect();
                    (key, registrations)
                })
                .collect()
        };

        let mut report = ActivationReport::default();
        for (key, registrations) in plan {
            let _guard = self.group_locks.acquire(&key).await;
            report.merge(self.register_batch(registrations).await);
        }

        if !report.failed.is_empty() {
            {
                let mut state = self.state.write().await;
                for (id, _) in &report.failed {
                    state.active.remove(id);
                }
            }
            self.persist(&[Document::ActiveSet]).await?;
            for (macro_id, reason) in &report.failed {
                self.notify(EngineEvent::RegistrationFailed {
                    macro_id: macro_id.clone(),
                    reason: reason.clone(),
                });
            }
            self.notify(EngineEvent::ActiveSetChanged {
                active: self.active_ids().await,
            });
        }

        info!(
            "Restored {} registration(s), {} refused",
            report.activated.len(),
            report.failed.len()
        );
        Ok(report)
    }
}
