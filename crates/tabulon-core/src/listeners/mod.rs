//! Path-pattern listener registry shared by the store, checkpoints and
//! derived objects

pub mod consumer;
pub mod diagnostics;
pub mod path;
pub mod registry;
mod tree;

pub use consumer::ConsumerCallback;
pub(crate) use consumer::{send, ConsumerNotifications, ListenerHost};
pub(crate) use diagnostics::guarded;
pub use diagnostics::{DiagnosticSink, ListenerFailure, TracingSink};
pub use path::{PathPattern, Segment};
pub use registry::{ListenerCategory, ListenerId, ListenerRegistry, ListenerStats, Notification};
