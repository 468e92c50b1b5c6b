//! Console backend - logs registrations and simulated trigger hits
//!
//! Useful for:
//! - Trying macro sets without an input-injection backend
//! - Debugging activation and conflict resolution from the REPL
//! - Tests that need a backend refusing specific macros

use crate::backend::{ExecutionBackend, FiredCallback, FiredEvent, Registration};
use crate::midi::MidiEvent;
use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::RwLock as SyncRwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub struct ConsoleBackend {
    name: String,
    /// Registered macros by id
    registrations: Arc<RwLock<BTreeMap<String, Registration>>>,
    /// Macro ids whose registration is refused
    reject: HashSet<String>,
    fired_callbacks: Arc<SyncRwLock<Vec<FiredCallback>>>,
    /// Registration counter for debugging
    register_count: AtomicU64,
}

impl ConsoleBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registrations: Arc::new(RwLock::new(BTreeMap::new())),
            reject: HashSet::new(),
            fired_callbacks: Arc::new(SyncRwLock::new(Vec::new())),
            register_count: AtomicU64::new(0),
        }
    }

    /// Refuse registrations for these macro ids
    pub fn rejecting<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reject.extend(ids.into_iter().map(Into::into));
        self
    }

    pub async fn registered_ids(&self) -> Vec<String> {
        self.registrations.read().await.keys().cloned().collect()
    }

    pub async fn registration(&self, macro_id: &str) -> Option<Registration> {
        self.registrations.read().await.get(macro_id).cloned()
    }

    pub fn register_count(&self) -> u64 {
        self.register_count.load(Ordering::Relaxed)
    }

    /// Simulate an incoming MIDI event
    ///
    /// Logs the actions of every registration the event fires, notifies
    /// subscribers and returns the fired macro ids.
    pub async fn fire(&self, event: MidiEvent) -> Vec<String> {
        let registrations = self.registrations.read().await;
        let fired: Vec<&Registration> = registrations
            .values()
            .filter(|r| r.trigger.fired_by(&event))
            .collect();

        let callbacks = self.fired_callbacks.read().clone();

        if fired.is_empty() {
            debug!("🎹 {} → no macro registered", event);
            let notification = FiredEvent {
                event,
                macro_id: None,
            };
            for callback in &callbacks {
                callback(&notification);
            }
            return Vec::new();
        }

        let mut ids = Vec::with_capacity(fired.len());
        for registration in fired {
            info!(
                "🎹 {} → '{}' ({} action(s){})",
                event,
                registration.macro_id,
                registration.action_count(),
                registration
                    .timeout
                    .map(|t| format!(", timeout {}ms", t))
                    .unwrap_or_default()
            );
            for action in registration
                .before_actions
                .iter()
                .chain(&registration.actions)
                .chain(&registration.after_actions)
            {
                debug!("   ↳ {:?}", action);
            }

            let notification = FiredEvent {
                event,
                macro_id: Some(registration.macro_id.clone()),
            };
            for callback in &callbacks {
                callback(&notification);
            }
            ids.push(registration.macro_id.clone());
        }
        ids
    }
}

#[async_trait]
impl ExecutionBackend for ConsoleBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn register(&self, registration: Registration) -> Result<()> {
        if self.reject.contains(&registration.macro_id) {
            warn!(
                "⚠️  ConsoleBackend '{}' refusing macro '{}'",
                self.name, registration.macro_id
            );
            bail!("macro '{}' refused by backend", registration.macro_id);
        }

        let count = self.register_count.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            "▶️  [{}] #{} register '{}' on {:?} ch{} #{}",
            self.name,
            count,
            registration.macro_id,
            registration.trigger.kind,
            registration.trigger.channel,
            registration.trigger.number
        );

        self.registrations
            .write()
            .await
            .insert(registration.macro_id.clone(), registration);
        Ok(())
    }

    async fn cancel(&self, macro_id: &str) -> Result<()> {
        if self.registrations.write().await.remove(macro_id).is_none() {
            bail!("macro '{}' is not registered", macro_id);
        }
        info!("⏹️  [{}] cancel '{}'", self.name, macro_id);
        Ok(())
    }

    fn subscribe_fired(&self, callback: FiredCallback) {
        self.fired_callbacks.write().push(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MacroDefinition, MacroTrigger};
    use std::sync::atomic::AtomicUsize;

    fn registration(id: &str, trigger: MacroTrigger) -> Registration {
        let def = MacroDefinition::new(id, trigger);
        Registration::for_member(&def, std::slice::from_ref(&def))
    }

    #[tokio::test]
    async fn test_register_and_cancel() {
        let backend = ConsoleBackend::new("console");
        backend
            .register(registration("a", MacroTrigger::note_on(0, 60)))
            .await
            .unwrap();
        assert_eq!(backend.registered_ids().await, vec!["a".to_string()]);

        backend.cancel("a").await.unwrap();
        assert!(backend.registered_ids().await.is_empty());
        assert!(backend.cancel("a").await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_configured_ids() {
        let backend = ConsoleBackend::new("console").rejecting(["bad"]);
        assert!(backend
            .register(registration("bad", MacroTrigger::note_on(0, 60)))
            .await
            .is_err());
        assert!(backend.registration("bad").await.is_none());
        assert_eq!(backend.register_count(), 0);
    }

    #[tokio::test]
    async fn test_fire_notifies_subscribers() {
        let backend = ConsoleBackend::new("console");
        backend
            .register(registration("pad", MacroTrigger::note_on(0, 36)))
            .await
            .unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let misses = Arc::new(AtomicUsize::new(0));
        let (h, m) = (hits.clone(), misses.clone());
        backend.subscribe_fired(Arc::new(move |fired: &FiredEvent| {
            if fired.macro_id.is_some() {
                h.fetch_add(1, Ordering::SeqCst);
            } else {
                m.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let fired = backend
            .fire(MidiEvent::NoteOn {
                channel: 0,
                note: 36,
                velocity: 100,
            })
            .await;
        assert_eq!(fired, vec!["pad".to_string()]);

        backend
            .fire(MidiEvent::NoteOn {
                channel: 0,
                note: 37,
                velocity: 100,
            })
            .await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(misses.load(Ordering::SeqCst), 1);
    }
}
