//! Reporting of listener callbacks that panic
//!
//! A panicking callback must not abort its siblings or the commit, so every
//! invocation goes through [`guarded`] and failures are handed to a
//! [`DiagnosticSink`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tabulon_core_types::TransactionId;

use super::registry::ListenerId;

/// A listener callback that panicked or could not be entered
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerFailure {
    pub listener_id: ListenerId,
    pub category: &'static str,
    pub message: String,
    pub transaction_id: Option<TransactionId>,
}

/// Receiver for listener failures
pub trait DiagnosticSink {
    fn listener_failed(&self, failure: &ListenerFailure);
}

/// Default sink: one error-level `tracing` event per failure
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn listener_failed(&self, failure: &ListenerFailure) {
        tracing::error!(
            component = module_path!(),
            event = tabulon_core_types::schema::EVENT_LISTENER_FAILED,
            listener_id = failure.listener_id.raw(),
            listener_category = failure.category,
            tx_id = failure.transaction_id.as_ref().map(TransactionId::as_str),
            message = %failure.message,
        );
    }
}

/// Run a callback, turning a panic into its message
pub(crate) fn guarded<F: FnOnce()>(f: F) -> std::result::Result<(), String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "listener panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guarded_passes_through_success() {
        let mut ran = false;
        assert!(guarded(|| ran = true).is_ok());
        assert!(ran);
    }

    #[test]
    fn test_guarded_captures_panic_message() {
        assert_eq!(guarded(|| panic!("boom")), Err("boom".to_string()));
        let n = 3;
        assert_eq!(
            guarded(|| panic!("bad {}", n)),
            Err("bad 3".to_string())
        );
    }
}
