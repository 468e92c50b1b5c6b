//! Coordinator module - activation state machine and its shared state
//!
//! The Coordinator is the only writer of the active set and the ordering map.
//! It manages:
//! - Group and category activation/deactivation against the execution backend
//! - Conflict detection and caller-driven resolution
//! - Macro/category edits that must keep registrations consistent
//! - Display ordering and category moves
//!
//! Engine state sits behind a `tokio::sync::RwLock` that is never held across
//! a backend call. Operations on one group key are serialized by a per-key
//! async mutex, so a deactivation issued while an activation of the same
//! group is in flight waits for it to settle.

mod activation;
mod category;
mod crud;
mod events;
mod ordering;
mod resolution;

pub use events::{EngineEvent, EventCallback};
pub use resolution::{
    ActivationOutcome, ActivationReport, ActivationTarget, CategoryMode, DeactivationReport,
    GroupState, PendingResolution, Resolution,
};


use crate::backend::ExecutionBackend;
use crate::conflict::find_group_conflicts;
use crate::model::{validate_group, MacroCategory, MacroDefinition};
use crate::store::{ActiveSet, Document, LoadReport, MacroStore, OrderingMap, Persistence, StoragePort};
use anyhow::Result;
use parking_lot::{Mutex as SyncMutex, RwLock as SyncRwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

/// Tables the coordinator owns
pub(crate) struct EngineState {
    pub(crate) store: MacroStore,
    pub(crate) active: ActiveSet,
    pub(crate) ordering: OrderingMap,
    /// Open conflict resolutions by token
    pub(crate) pending: HashMap<u64, PendingResolution>,
}

impl EngineState {
    /// Definitions of the active macros, in store order
    pub(crate) fn active_macros(&self) -> Vec<&MacroDefinition> {
        self.store
            .iter()
            .filter(|m| self.active.contains(&m.id))
            .collect()
    }

    pub(crate) fn members_cloned(&self, key: &str) -> Vec<MacroDefinition> {
        self.store.members_of_key(key).into_iter().cloned().collect()
    }

    pub(crate) fn is_key_fully_active(&self, key: &str) -> bool {
        let members = self.store.members_of_key(key);
        !members.is_empty() && members.iter().all(|m| self.active.contains(&m.id))
    }

    /// Distinct group keys holding at least one active macro, in store order
    pub(crate) fn active_group_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for m in self.active_macros() {
            let key = m.group_key();
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
        keys
    }

    /// Active macros the target would collide with right now
    ///
    /// Additive categories only look at macros outside the category; an
    /// exclusive category switches everything off and never conflicts.
    pub(crate) fn conflicts_for(&self, target: &ActivationTarget) -> Vec<MacroDefinition> {
        match target {
            ActivationTarget::Group(key) => {
                let members = self.members_cloned(key);
                if validate_group(key, &members).is_err() {
                    return Vec::new();
                }
                find_group_conflicts(&members, self.active_macros())
            }
            ActivationTarget::Category {
                mode: CategoryMode::Exclusive,
                ..
            } => Vec::new(),
            ActivationTarget::Category { id, .. } => {
                let outside: Vec<&MacroDefinition> = self
                    .active_macros()
                    .into_iter()
                    .filter(|m| m.category() != id)
                    .collect();
                let mut seen = HashSet::new();
                let mut conflicts = Vec::new();
                for key in self.store.group_keys_in_category(id) {
                    let members = self.members_cloned(&key);
                    if self.is_key_fully_active(&key) || validate_group(&key, &members).is_err() {
                        continue;
                    }
                    for conflict in find_group_conflicts(&members, outside.iter().copied()) {
                        if seen.insert(conflict.id.clone()) {
                            conflicts.push(conflict);
                        }
                    }
                }
                conflicts
            }
        }
    }
}

/// Per-group-key async locks
#[derive(Default)]
pub(crate) struct GroupLocks {
    locks: SyncMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl GroupLocks {
    pub(crate) async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }
}

/// Activation coordinator
pub struct Coordinator {
    pub(crate) state: Arc<RwLock<EngineState>>,
    pub(crate) backend: Arc<dyn ExecutionBackend>,
    pub(crate) persistence: Persistence,
    pub(crate) group_locks: GroupLocks,
    pub(crate) subscribers: Arc<SyncRwLock<Vec<EventCallback>>>,
    pub(crate) next_token: AtomicU64,
    load_report: LoadReport,
}

impl Coordinator {
    /// Load persisted state (repairing it if needed) and wire the backend
    ///
    /// Nothing is registered with the backend yet; call
    /// [`restore_registrations`](Self::restore_registrations) once the
    /// backend is ready.
    pub async fn load(storage: Arc<dyn StoragePort>, backend: Arc<dyn ExecutionBackend>) -> Result<Self> {
        let persistence = Persistence::new(storage);
        let loaded = persistence.load().await?;

        if !loaded.report.is_clean() {
            info!("Repaired persisted macro state: {:?}", loaded.report);
        }
        debug!("Coordinator using backend '{}'", backend.name());

        Ok(Self {
            state: Arc::new(RwLock::new(EngineState {
                store: loaded.store,
                active: loaded.active,
                ordering: loaded.ordering,
                pending: HashMap::new(),
            })),
            backend,
            persistence,
            group_locks: GroupLocks::default(),
            subscribers: Arc::new(SyncRwLock::new(Vec::new())),
            next_token: AtomicU64::new(1),
            load_report: loaded.report,
        })
    }

    /// Repairs performed while loading
    pub fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    pub fn backend(&self) -> &Arc<dyn ExecutionBackend> {
        &self.backend
    }

    /// Subscribe to engine notifications
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        self.subscribers.write().push(Arc::new(listener));
    }

    pub(crate) fn notify(&self, event: EngineEvent) {
        let subscribers = self.subscribers.read().clone();
        for subscriber in subscribers.iter() {
            subscriber(&event);
        }
    }

    pub(crate) fn next_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::SeqCst)
    }

    /// Write the given documents from a snapshot of the current state
    pub(crate) async fn persist(&self, docs: &[Document]) -> Result<()> {
        let (store, active, ordering) = {
            let state = self.state.read().await;
            let wants = |doc: Document| docs.contains(&doc);
            (
                (wants(Document::Macros) || wants(Document::Categories)).then(|| state.store.clone()),
                wants(Document::ActiveSet).then(|| state.active.clone()),
                wants(Document::Ordering).then(|| state.ordering.clone()),
            )
        };

        if let Some(store) = &store {
            if docs.contains(&Document::Macros) {
                self.persistence.save_macros(store).await?;
            }
            if docs.contains(&Document::Categories) {
                self.persistence.save_categories(store).await?;
            }
        }
        if let Some(active) = &active {
            self.persistence.save_active(active).await?;
        }
        if let Some(ordering) = &ordering {
            self.persistence.save_ordering(ordering).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// All macros in insertion order
    pub async fn macros(&self) -> Vec<MacroDefinition> {
        self.state.read().await.store.to_records()
    }

    pub async fn get_macro(&self, id: &str) -> Option<MacroDefinition> {
        self.state.read().await.store.get(id).cloned()
    }

    pub async fn categories(&self) -> Vec<MacroCategory> {
        self.state.read().await.store.categories().to_vec()
    }

    pub async fn macros_in_category(&self, category_id: &str) -> Vec<MacroDefinition> {
        self.state
            .read()
            .await
            .store
            .macros_in_category(category_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Members addressed by a group key
    pub async fn group_members(&self, key: &str) -> Vec<MacroDefinition> {
        self.state.read().await.members_cloned(key)
    }

    pub async fn active_ids(&self) -> Vec<String> {
        self.state.read().await.active.to_vec()
    }

    pub async fn is_active(&self, macro_id: &str) -> bool {
        self.state.read().await.active.contains(macro_id)
    }

    /// Whether every member of the group is active
    pub async fn is_group_active(&self, key: &str) -> bool {
        self.state.read().await.is_key_fully_active(key)
    }

    pub async fn group_state(&self, key: &str) -> GroupState {
        let state = self.state.read().await;
        if state
            .pending
            .values()
            .any(|p| p.group_keys.iter().any(|k| k == key))
        {
            return GroupState::PendingResolution;
        }

        let members = state.store.members_of_key(key);
        let active = members
            .iter()
            .filter(|m| state.active.contains(&m.id))
            .count();
        match active {
            0 => GroupState::Inactive,
            n if n == members.len() => GroupState::Active,
            _ => GroupState::PartiallyActive,
        }
    }

    /// Tokens of the conflict resolutions still waiting for the caller
    pub async fn pending_tokens(&self) -> Vec<u64> {
        let mut tokens: Vec<u64> = self.state.read().await.pending.keys().copied().collect();
        tokens.sort_unstable();
        tokens
    }
}
