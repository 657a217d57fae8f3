//! Objects computed from a store and kept current through its listeners
//!
//! Each derived object subscribes to the rows it depends on with an
//! observer, updates its own state incrementally, and exposes a listener
//! registry of its own with the same registration contract as the store.
//! Observers hold the object's state weakly, so dropping the object stops
//! its updates even if the store listener is never removed.

pub mod metrics;
pub mod relationships;

pub use metrics::{Aggregate, MetricChange, Metrics, MetricsListenerKind};
pub use relationships::{
    LinkedRowIdsChange, LocalRowIdsChange, RelationshipEvent, Relationships,
    RelationshipsListenerKind, RemoteRowIdChange,
};
