//! Delivery for registries whose callbacks only receive an event
//!
//! Checkpoints and derived objects keep their state behind a `RefCell` and
//! resolve notifications while it is borrowed. The callbacks themselves run
//! through [`deliver`] after that borrow is released.

use std::cell::RefCell;
use std::rc::Rc;

use super::diagnostics::{guarded, DiagnosticSink, ListenerFailure, TracingSink};
use super::registry::{ListenerCategory, ListenerId, ListenerRegistry, Notification};

/// Callback handle for event-only listeners
pub type ConsumerCallback<E> = Rc<RefCell<dyn FnMut(&E)>>;

pub(crate) type ConsumerNotifications<K, E> = Vec<Notification<K, ConsumerCallback<E>, E>>;

/// Invoke each notification whose listener is still registered
pub(crate) fn deliver<K: ListenerCategory, E>(
    notifications: ConsumerNotifications<K, E>,
    still_registered: impl Fn(ListenerId) -> bool,
    sink: &dyn DiagnosticSink,
) {
    for notification in notifications {
        if !still_registered(notification.id) {
            continue;
        }
        let event = &notification.event;
        let outcome = match notification.callback.try_borrow_mut() {
            Ok(mut f) => guarded(|| (*f)(event)),
            Err(_) => Err("listener is already running".to_string()),
        };
        if let Err(message) = outcome {
            sink.listener_failed(&ListenerFailure {
                listener_id: notification.id,
                category: notification.category.name(),
                message,
                transaction_id: None,
            });
        }
    }
}

/// State object that owns an event-only listener registry
pub(crate) trait ListenerHost {
    type Kind: ListenerCategory;
    type Event;

    fn registry(&self) -> &ListenerRegistry<Self::Kind, ConsumerCallback<Self::Event>>;

    /// Sink for failing callbacks; `None` reports through tracing
    fn sink(&self) -> Option<Rc<dyn DiagnosticSink>>;
}

/// Deliver notifications resolved by `host`, reporting failures to its sink
///
/// Must be called with no outstanding borrow of `host`.
pub(crate) fn send<H: ListenerHost>(
    host: &Rc<RefCell<H>>,
    notes: ConsumerNotifications<H::Kind, H::Event>,
) {
    if notes.is_empty() {
        return;
    }
    let sink = host.try_borrow().ok().and_then(|h| h.sink());
    let sink: &dyn DiagnosticSink = match &sink {
        Some(sink) => sink.as_ref(),
        None => &TracingSink,
    };
    deliver(
        notes,
        |id| host.try_borrow().map_or(true, |h| h.registry().contains(id)),
        sink,
    );
}
