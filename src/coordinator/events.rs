//! Notifications published to the UI layer

use std::sync::Arc;

/// Something observers of the engine should re-render
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The active set changed; carries the full new set
    ActiveSetChanged { active: Vec<String> },
    /// The backend refused to register a macro
    RegistrationFailed { macro_id: String, reason: String },
    /// The backend failed to cancel a macro (it left the active set anyway)
    CancelFailed { macro_id: String, reason: String },
    /// An activation is waiting for the caller to resolve a conflict
    ConflictPending { token: u64, conflicts: Vec<String> },
    MacrosChanged,
    CategoriesChanged,
    OrderingChanged { category_id: String },
}

/// Subscriber callback function type
pub type EventCallback = Arc<dyn Fn(&EngineEvent) + Send + Sync>;
