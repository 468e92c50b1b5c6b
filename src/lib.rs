//! MIDI Macros - macro activation and conflict resolution engine
//!
//! Macros bind a MIDI trigger (note or control change) to a list of
//! keyboard/mouse actions. This crate decides which macros are live on the
//! execution backend, refuses to let two active macros listen for the same
//! physical control, and keeps the macro library, active set and display
//! order persisted.

pub mod backend;
pub mod bundle;
pub mod cli;
pub mod config;
pub mod conflict;
pub mod coordinator;
pub mod matcher;
pub mod midi;
pub mod model;
pub mod paths;
pub mod ports;
pub mod store;
