//! Canonical schema constants for structured logging and events
//!
//! `tracing` field names must be identifiers at the call site, so the
//! emitting macros spell these out literally; readers of captured or
//! exported events look fields up through the constants.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_STORE_ID: &str = "store_id";
pub const FIELD_TX_ID: &str = "tx_id";

// Listener identifiers
pub const FIELD_LISTENER_ID: &str = "listener_id";
pub const FIELD_LISTENER_CATEGORY: &str = "listener_category";

// Collection sizes
pub const FIELD_CHANGED_CELLS: &str = "changed_cells";
pub const FIELD_CHANGED_VALUES: &str = "changed_values";
pub const FIELD_MUTATOR_ROUNDS: &str = "mutator_rounds";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
pub const EVENT_LISTENER_FAILED: &str = "listener_failed";
