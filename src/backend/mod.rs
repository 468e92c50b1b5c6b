//! Execution backends
//!
//! A backend performs the synthetic input actions when MIDI arrives. The
//! engine only consumes the accept/reject result of `register` and `cancel`;
//! fired-trigger notifications are exposed for observability.

use crate::midi::MidiEvent;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub mod console;
mod registration;

pub use console::ConsoleBackend;
pub use registration::{
    BackendAction, KeyChord, MouseButton, MouseMove, MouseScroll, Registration, TriggerIdentity,
};

/// Notification that an incoming MIDI event hit (or missed) a registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredEvent {
    pub event: MidiEvent,
    /// Macro whose trigger matched, `None` when nothing was registered for it
    pub macro_id: Option<String>,
}

/// Callback type for fired-trigger notifications
pub type FiredCallback = Arc<dyn Fn(&FiredEvent) + Send + Sync>;

/// Backend trait - the engine's only way to make a macro live
///
/// Note: All methods take &self to support Arc<dyn ExecutionBackend>.
/// Backends should use interior mutability for their registration table.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Backend name (e.g., "console")
    fn name(&self) -> &str;

    /// Start listening for a macro's trigger
    ///
    /// Registering an id that is already registered replaces it.
    async fn register(&self, registration: Registration) -> Result<()>;

    /// Stop listening for a macro's trigger
    async fn cancel(&self, macro_id: &str) -> Result<()>;

    /// Subscribe to fired-trigger notifications
    ///
    /// Default implementation: no-op (backend doesn't report fired triggers)
    fn subscribe_fired(&self, _callback: FiredCallback) {}
}
