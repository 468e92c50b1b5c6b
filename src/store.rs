//! Store module - macro definitions, active set and display ordering
//!
//! Holds the in-memory tables the coordinator works on, and the persistence
//! layer that loads them (self-healing corrupted documents) and writes them
//! back through an injected [`StoragePort`].

mod active_set;
mod macro_store;
mod ordering;
mod persistence;
mod storage;

pub use active_set::ActiveSet;
pub use macro_store::{MacroStore, StoreError};
pub use ordering::OrderingMap;
pub use persistence::{LoadReport, LoadedState, Persistence};
pub use storage::{Document, MemoryStorage, SledStorage, StoragePort};
