use std::cell::RefCell;
use std::rc::Rc;

use tabulon_core::listeners::{DiagnosticSink, ListenerFailure};
use tabulon_core::model::row;
use tabulon_core::Store;

/// Shared log of whatever a listener saw
#[allow(dead_code)]
pub type Log<T> = Rc<RefCell<Vec<T>>>;

#[allow(dead_code)]
pub fn new_log<T>() -> Log<T> {
    Rc::new(RefCell::new(Vec::new()))
}

/// Diagnostic sink that keeps every failure for assertions
#[allow(dead_code)]
#[derive(Default)]
pub struct CollectingSink {
    pub failures: RefCell<Vec<ListenerFailure>>,
}

impl DiagnosticSink for CollectingSink {
    fn listener_failed(&self, failure: &ListenerFailure) {
        self.failures.borrow_mut().push(failure.clone());
    }
}

/// Store with a small `pets` table
///
/// fido: brown dog, felix: black cat.
#[allow(dead_code)]
pub fn pets_store() -> Store {
    let mut store = Store::new();
    store
        .set_row(
            "pets",
            "fido",
            row([("species", "dog".into()), ("color", "brown".into())]),
        )
        .unwrap();
    store
        .set_row(
            "pets",
            "felix",
            row([("species", "cat".into()), ("color", "black".into())]),
        )
        .unwrap();
    store
}
