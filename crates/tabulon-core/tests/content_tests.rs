//! Content And Change-Set Tests
//!
//! Whole-store snapshots and partial change-sets, the two shapes external
//! persisters and synchronizers exchange with a store.

mod common;

use common::{new_log, pets_store};
use tabulon_core::model::{row, Changes, Content, Row, Tables, Values};
use tabulon_core::store::RowChange;
use tabulon_core::{CellValue, Reaction, Store, StoreError};

#[test]
fn test_content_survives_json_round_trip() {
    let mut store = pets_store();
    store.set_value("open", true).unwrap();

    let json = store.get_content().to_json().unwrap();
    let mut copy = Store::new();
    copy.set_content(Content::from_json(&json).unwrap()).unwrap();

    assert_eq!(copy.get_content(), store.get_content());
}

#[test]
fn test_malformed_json_is_serialization_error() {
    let err = Content::from_json(r#"{"tables": {"pets": {"fido": {"tags": []}}}}"#).unwrap_err();
    assert!(matches!(err, StoreError::Serialization { .. }));
}

#[test]
fn test_set_content_replaces_everything_in_one_commit() {
    // GIVEN a store and a did-finish counter
    let mut store = pets_store();
    store.set_value("open", true).unwrap();
    let commits = new_log::<usize>();
    let log = commits.clone();
    store
        .add_did_finish_transaction_listener(move |_, info| log.borrow_mut().push(info.cells_changed))
        .unwrap();

    // WHEN replacing the content with a single toy
    let mut tables = Tables::new();
    tables
        .entry("toys".to_string())
        .or_default()
        .insert("ball".to_string(), row([("color", "red".into())]));
    store.set_content(Content::new(tables, Values::new())).unwrap();

    // THEN the old content is gone after one commit
    assert_eq!(store.get_table_ids(), vec!["toys"]);
    assert!(!store.has_values());
    assert_eq!(commits.borrow().len(), 1);
    assert_eq!(commits.borrow()[0], 5);
}

#[test]
fn test_apply_changes_sets_and_deletes() {
    // GIVEN the pets store and a change-set from elsewhere
    let mut store = pets_store();
    let mut changes = Changes::new();
    changes
        .set_cell("pets", "fido", "color", Some("white".into()))
        .del_row("pets", "felix")
        .set_cell("toys", "ball", "color", Some("red".into()))
        .set_value("open", Some(true.into()));

    let rows = new_log::<RowChange>();
    let log = rows.clone();
    store
        .add_row_listener(
            None,
            None,
            Reaction::observe(move |_, change: &RowChange| log.borrow_mut().push(change.clone())),
        )
        .unwrap();

    // WHEN the change-set is applied
    store.apply_changes(&changes).unwrap();

    // THEN every part landed in one commit
    assert_eq!(
        store.get_cell("pets", "fido", "color"),
        Some(&CellValue::from("white"))
    );
    assert!(!store.has_row("pets", "felix"));
    assert!(store.has_table("toys"));
    assert_eq!(store.get_value("open"), Some(&CellValue::from(true)));
    assert_eq!(rows.borrow().len(), 3);
}

#[test]
fn test_apply_changes_is_all_or_nothing() {
    let mut store = pets_store();
    let before = store.get_content();
    let mut changes = Changes::new();
    changes
        .set_cell("pets", "fido", "color", Some("white".into()))
        .set_value("ratio", Some(f64::INFINITY.into()));

    let err = store.apply_changes(&changes).unwrap_err();

    assert!(matches!(err, StoreError::InvalidValue { .. }));
    assert_eq!(store.get_content(), before);
}

#[test]
fn test_add_row_uses_next_free_numeric_id() {
    let mut store = Store::new();
    store.set_cell("log", "1", "n", 1).unwrap();

    let first = store.add_row("log", row([("n", 0.into())])).unwrap();
    let second = store.add_row("log", row([("n", 2.into())])).unwrap();
    let empty = store.add_row("log", Row::new()).unwrap();

    assert_eq!(first.as_deref(), Some("0"));
    assert_eq!(second.as_deref(), Some("2"));
    assert_eq!(empty, None);
    assert_eq!(store.get_row_ids("log"), vec!["0", "1", "2"]);
}

#[test]
fn test_partial_row_keeps_other_cells() {
    let mut store = pets_store();
    store
        .set_partial_row("pets", "fido", row([("legs", 4.into())]))
        .unwrap();
    assert_eq!(
        store.get_cell_ids("pets", "fido"),
        vec!["color", "legs", "species"]
    );

    store.set_row("pets", "fido", row([("legs", 3.into())])).unwrap();
    assert_eq!(store.get_cell_ids("pets", "fido"), vec!["legs"]);
    assert_eq!(store.get_table_cell_ids("pets"), vec!["color", "legs", "species"]);
}

#[test]
fn test_deleting_everything_leaves_empty_store() {
    let mut store = pets_store();
    store.set_value("open", true).unwrap();

    store.del_tables().unwrap();
    store.del_values().unwrap();

    assert!(store.get_content().is_empty());
    assert!(store.get_table_ids().is_empty());
    assert_eq!(store.get_row_count("pets"), 0);
}
