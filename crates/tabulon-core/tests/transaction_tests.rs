//! Transaction Engine Tests
//!
//! ## Scenarios Covered
//!
//! 1. Listeners never see a partially applied batch
//! 2. Nested transactions commit once, at the outermost finish
//! 3. Commit phase ordering
//! 4. Mutator writes fold into the same commit, round by round
//! 5. Mutator overflow is surfaced to the caller
//! 6. A panicking listener does not stop its siblings or the commit
//! 7. Rejected writes leave the rest of the transaction intact

mod common;

use std::rc::Rc;

use common::{new_log, pets_store, CollectingSink};
use tabulon_core::config::{StoreConfig, TabulonConfig};
use tabulon_core::store::{CellChange, InvalidCellAttempt, TransactionInfo, ValueChange};
use tabulon_core::{CellValue, Reaction, Store, StoreError};

#[test]
fn test_listener_sees_whole_batch() {
    // GIVEN a listener reading both cells a transfer touches
    let mut store = Store::new();
    store.set_cell("accounts", "a", "balance", 10).unwrap();
    store.set_cell("accounts", "b", "balance", 0).unwrap();
    let totals = new_log::<f64>();
    let log = totals.clone();
    store
        .add_cell_listener(
            Some("accounts"),
            None,
            Some("balance"),
            Reaction::observe(move |store, _: &CellChange| {
                let total: f64 = ["a", "b"]
                    .iter()
                    .filter_map(|r| store.get_cell("accounts", r, "balance"))
                    .filter_map(CellValue::as_number)
                    .sum();
                log.borrow_mut().push(total);
            }),
        )
        .unwrap();

    // WHEN money moves inside one transaction
    store
        .transaction(|s| {
            s.set_cell("accounts", "a", "balance", 4).unwrap();
            s.set_cell("accounts", "b", "balance", 6).unwrap();
        })
        .unwrap();

    // THEN every notification saw the conserved total
    assert_eq!(*totals.borrow(), vec![10.0, 10.0]);
}

#[test]
fn test_nested_transactions_commit_at_outermost_finish() {
    let mut store = Store::new();
    let seen = new_log::<ValueChange>();
    let log = seen.clone();
    store
        .add_value_listener(
            None,
            Reaction::observe(move |_, change: &ValueChange| log.borrow_mut().push(change.clone())),
        )
        .unwrap();

    store.start_transaction();
    store.start_transaction();
    store.set_value("open", true).unwrap();
    store.finish_transaction().unwrap();
    assert!(store.is_in_transaction());
    assert!(seen.borrow().is_empty());

    store.finish_transaction().unwrap();
    assert!(!store.is_in_transaction());
    assert_eq!(seen.borrow().len(), 1);

    // finishing with nothing open is a no-op
    store.finish_transaction().unwrap();
}

#[test]
fn test_commit_phase_order() {
    // GIVEN one listener of every phase
    let mut store = Store::new();
    let order = new_log::<&'static str>();

    let log = order.clone();
    store
        .add_start_transaction_listener(move |_, _| log.borrow_mut().push("start"))
        .unwrap();
    let log = order.clone();
    store
        .add_did_finish_transaction_listener(move |_, _| log.borrow_mut().push("did_finish"))
        .unwrap();
    let log = order.clone();
    store
        .add_value_listener(
            None,
            Reaction::observe(move |_, _: &ValueChange| log.borrow_mut().push("observer")),
        )
        .unwrap();
    let log = order.clone();
    store
        .add_will_finish_transaction_listener(move |_, _| log.borrow_mut().push("will_finish"))
        .unwrap();
    let log = order.clone();
    store
        .add_value_listener(
            None,
            Reaction::mutate(move |_, _: &ValueChange| log.borrow_mut().push("mutator")),
        )
        .unwrap();

    // WHEN a value is set
    store.set_value("open", true).unwrap();

    // THEN phases ran in commit order regardless of registration order
    assert_eq!(
        *order.borrow(),
        vec!["start", "mutator", "will_finish", "observer", "did_finish"]
    );
}

#[test]
fn test_mutator_writes_join_the_same_commit() {
    // GIVEN a mutator that keeps `double` at twice `n`
    let mut store = Store::new();
    store
        .add_cell_listener(
            Some("t"),
            None,
            Some("n"),
            Reaction::mutate(|store, change: &CellChange| {
                if let Some(n) = change.new.as_ref().and_then(CellValue::as_number) {
                    store
                        .set_cell(&change.table_id, &change.row_id, "double", n * 2.0)
                        .unwrap();
                }
            }),
        )
        .unwrap();
    let infos = new_log::<TransactionInfo>();
    let log = infos.clone();
    store
        .add_did_finish_transaction_listener(move |_, info| log.borrow_mut().push(info.clone()))
        .unwrap();
    let doubles = new_log::<CellChange>();
    let log = doubles.clone();
    store
        .add_cell_listener(
            Some("t"),
            None,
            Some("double"),
            Reaction::observe(move |_, change: &CellChange| log.borrow_mut().push(change.clone())),
        )
        .unwrap();

    // WHEN n is set
    store.set_cell("t", "r", "n", 21).unwrap();

    // THEN the derived write is part of one commit
    assert_eq!(store.get_cell("t", "r", "double"), Some(&CellValue::from(42)));
    assert_eq!(doubles.borrow().len(), 1);
    let infos = infos.borrow();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].cells_changed, 2);
}

#[test]
fn test_later_mutator_rounds_only_see_new_changes() {
    // GIVEN a wildcard mutator that counts its calls and touches `b` once
    let mut store = Store::new();
    let calls = new_log::<String>();
    let log = calls.clone();
    store
        .add_value_listener(
            None,
            Reaction::mutate(move |store, change: &ValueChange| {
                log.borrow_mut().push(change.value_id.clone());
                if change.value_id == "a" {
                    store.set_value("b", true).unwrap();
                }
            }),
        )
        .unwrap();

    // WHEN `a` is set
    store.set_value("a", true).unwrap();

    // THEN round one saw `a` and round two saw only `b`
    assert_eq!(*calls.borrow(), vec!["a", "b"]);
}

#[test]
fn test_mutator_overflow_is_fatal_but_observers_see_applied_state() {
    // GIVEN a mutator that never settles and a low round bound
    let config = TabulonConfig::from_toml_str("[store]\nmax_mutator_rounds = 5").unwrap();
    let mut store = Store::with_config(config.store);
    store
        .add_value_listener(
            Some("n"),
            Reaction::mutate(|store, change: &ValueChange| {
                let n = change.new.as_ref().and_then(CellValue::as_number).unwrap_or(0.0);
                store.set_value("n", n + 1.0).unwrap();
            }),
        )
        .unwrap();
    let observed = new_log::<ValueChange>();
    let log = observed.clone();
    store
        .add_value_listener(
            None,
            Reaction::observe(move |_, change: &ValueChange| log.borrow_mut().push(change.clone())),
        )
        .unwrap();

    // WHEN the loop is started
    let err = store.set_value("n", 0).unwrap_err();

    // THEN the caller gets the overflow and observers saw the net change once
    assert!(matches!(err, StoreError::MutatorOverflow { rounds: 5, .. }));
    assert_eq!(
        *observed.borrow(),
        vec![ValueChange {
            value_id: "n".to_string(),
            new: Some(CellValue::from(5)),
            old: None,
        }]
    );
    assert!(!store.is_in_transaction());
    assert_eq!(store.get_value("n"), Some(&CellValue::from(5)));
}

#[test]
fn test_default_round_bound() {
    assert_eq!(StoreConfig::default().max_mutator_rounds, 100);
    assert_eq!(Store::new().config().max_mutator_rounds, 100);
}

#[test]
fn test_panicking_listener_is_isolated() {
    // GIVEN a panicking observer between two well-behaved ones
    let mut store = pets_store();
    let sink = Rc::new(CollectingSink::default());
    store.set_diagnostic_sink(sink.clone());
    let seen = new_log::<&'static str>();

    let log = seen.clone();
    store
        .add_cell_listener(
            None,
            None,
            None,
            Reaction::observe(move |_, _: &CellChange| log.borrow_mut().push("before")),
        )
        .unwrap();
    let bad = store
        .add_cell_listener(
            None,
            None,
            None,
            Reaction::observe(|_, _: &CellChange| panic!("listener exploded")),
        )
        .unwrap();
    let log = seen.clone();
    store
        .add_cell_listener(
            None,
            None,
            None,
            Reaction::observe(move |_, _: &CellChange| log.borrow_mut().push("after")),
        )
        .unwrap();

    // WHEN a cell changes
    let result = store.set_cell("pets", "fido", "color", "white");

    // THEN the commit succeeded, siblings ran and the failure was reported
    assert!(result.is_ok());
    assert_eq!(*seen.borrow(), vec!["before", "after"]);
    let failures = sink.failures.borrow();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].listener_id, bad);
    assert_eq!(failures[0].category, "cell");
    assert_eq!(failures[0].message, "listener exploded");
    assert!(failures[0].transaction_id.is_some());
}

#[test]
fn test_rejected_write_leaves_transaction_intact() {
    // GIVEN an invalid-cell listener
    let mut store = Store::new();
    let attempts = new_log::<InvalidCellAttempt>();
    let log = attempts.clone();
    store
        .add_invalid_cell_listener(
            None,
            None,
            None,
            Reaction::observe(move |_, attempt: &InvalidCellAttempt| {
                log.borrow_mut().push(attempt.clone())
            }),
        )
        .unwrap();

    // WHEN a transaction mixes a valid write with a non-finite number
    store
        .transaction(|s| {
            s.set_cell("t", "r", "ok", 1).unwrap();
            let err = s.set_cell("t", "r", "bad", f64::NAN).unwrap_err();
            assert!(matches!(err, StoreError::InvalidCell { .. }));
        })
        .unwrap();

    // THEN the valid write committed and the attempt was reported
    assert!(store.has_cell("t", "r", "ok"));
    assert!(!store.has_cell("t", "r", "bad"));
    let attempts = attempts.borrow();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].cell_id, "bad");
    assert_eq!(attempts[0].attempts.len(), 1);
}

#[test]
fn test_transaction_changes_visible_to_did_finish() {
    let mut store = pets_store();
    let inverse = new_log::<bool>();
    let log = inverse.clone();
    store
        .add_did_finish_transaction_listener(move |store, _| {
            let changes = store.transaction_changes();
            let undo = changes.to_inverse();
            log.borrow_mut().push(
                undo.tables["pets"].as_ref().is_some_and(|t| t.contains_key("fido")),
            );
        })
        .unwrap();

    store.set_cell("pets", "fido", "color", "white").unwrap();

    assert_eq!(*inverse.borrow(), vec![true]);
}

#[test]
fn test_transaction_returns_closure_value() {
    let mut store = Store::new();
    let id = store
        .transaction(|s| s.add_row("pets", tabulon_core::model::row([("legs", 4.into())])))
        .unwrap()
        .unwrap();
    assert_eq!(id, Some("0".to_string()));
}
