//! Tabulon Core - reactive in-memory tabular store
//!
//! This crate provides a store of tables, rows, cells and keyed values with:
//! - Path-pattern listeners with wildcard segments
//! - Transactions that batch mutations into a single atomic commit
//! - Mutator listeners whose writes are folded into the same commit
//! - Optional schemas with type checks and cell defaults
//! - Checkpoint-based undo/redo
//! - Metrics and relationships derived from store content

pub use tabulon_core_types;

pub mod checkpoints;
pub mod config;
pub mod derived;
pub mod errors;
pub mod listeners;
pub mod logging_facility;
pub mod model;
pub mod store;

// Re-export commonly used types
pub use checkpoints::{CheckpointIds, Checkpoints};
pub use config::TabulonConfig;
pub use derived::{Aggregate, Metrics, Relationships};
pub use errors::{ExError, ExErrorKind, Result, StoreError};
pub use listeners::{DiagnosticSink, ListenerFailure, ListenerId};
pub use model::{CellValue, Changes, Content, Id};
pub use store::{Reaction, Store};
