//! Schema Tests
//!
//! Type checks at the mutation boundary, defaults, and conforming existing
//! content when a schema is installed.

mod common;

use std::collections::BTreeMap;

use common::{new_log, pets_store};
use tabulon_core::model::{row, CellKind, CellSchema, TablesSchema, ValuesSchema};
use tabulon_core::store::{InvalidCellAttempt, InvalidValueAttempt};
use tabulon_core::{CellValue, Reaction, Store, StoreError};

fn pets_schema() -> TablesSchema {
    let mut cells = BTreeMap::new();
    cells.insert("species".to_string(), CellSchema::new(CellKind::String));
    cells.insert(
        "legs".to_string(),
        CellSchema::new(CellKind::Number).with_default(4),
    );
    cells.insert(
        "sold".to_string(),
        CellSchema::new(CellKind::Boolean).with_default(false),
    );
    let mut schema = TablesSchema::new();
    schema.insert("pets".to_string(), cells);
    schema
}

#[test]
fn test_new_rows_get_declared_defaults() {
    let mut store = Store::new();
    store.set_tables_schema(pets_schema()).unwrap();

    store.set_cell("pets", "fido", "species", "dog").unwrap();

    assert_eq!(
        store.get_row("pets", "fido"),
        Some(&row([
            ("legs", 4.into()),
            ("sold", false.into()),
            ("species", "dog".into()),
        ]))
    );
}

#[test]
fn test_wrong_kind_and_undeclared_writes_are_rejected() {
    // GIVEN a schema and an invalid-cell listener
    let mut store = Store::new();
    store.set_tables_schema(pets_schema()).unwrap();
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

    // WHEN writing a string into a number, an undeclared cell and an undeclared table
    let wrong_kind = store.set_cell("pets", "fido", "legs", "four").unwrap_err();
    let undeclared = store.set_cell("pets", "fido", "name", "Fido").unwrap_err();
    let no_table = store.set_cell("toys", "ball", "color", "red").unwrap_err();

    // THEN each is rejected, nothing is written and every attempt is reported
    assert!(matches!(wrong_kind, StoreError::InvalidCell { ref cell_id, .. } if cell_id == "legs"));
    assert!(matches!(undeclared, StoreError::InvalidCell { .. }));
    assert!(matches!(no_table, StoreError::InvalidCell { .. }));
    assert!(!store.has_tables());
    assert_eq!(attempts.borrow().len(), 3);
    assert_eq!(attempts.borrow()[0].attempts, vec![CellValue::from("four")]);
}

#[test]
fn test_row_with_one_bad_cell_is_not_applied() {
    let mut store = Store::new();
    store.set_tables_schema(pets_schema()).unwrap();

    let err = store
        .set_row(
            "pets",
            "fido",
            row([("species", "dog".into()), ("legs", true.into())]),
        )
        .unwrap_err();

    assert!(matches!(err, StoreError::InvalidCell { .. }));
    assert!(!store.has_row("pets", "fido"));
}

#[test]
fn test_del_cell_restores_default_and_force_del_removes() {
    let mut store = Store::new();
    store.set_tables_schema(pets_schema()).unwrap();
    store.set_cell("pets", "fido", "legs", 3).unwrap();

    store.del_cell("pets", "fido", "legs").unwrap();
    assert_eq!(store.get_cell("pets", "fido", "legs"), Some(&CellValue::from(4)));

    store.force_del_cell("pets", "fido", "legs").unwrap();
    assert!(!store.has_cell("pets", "fido", "legs"));
}

#[test]
fn test_installing_schema_conforms_existing_content() {
    // GIVEN pets with a cell the schema will not allow
    let mut store = pets_store();
    store.set_cell("toys", "ball", "color", "red").unwrap();

    // WHEN the schema is installed
    store.set_tables_schema(pets_schema()).unwrap();

    // THEN undeclared cells are gone and defaults are filled
    assert!(!store.has_table("toys"));
    assert!(!store.has_cell("pets", "fido", "color"));
    assert_eq!(store.get_cell("pets", "fido", "species"), Some(&CellValue::from("dog")));
    assert_eq!(store.get_cell("pets", "felix", "legs"), Some(&CellValue::from(4)));
}

#[test]
fn test_default_of_wrong_kind_is_invalid_schema() {
    let mut schema = TablesSchema::new();
    schema.entry("pets".to_string()).or_default().insert(
        "legs".to_string(),
        CellSchema::new(CellKind::Number).with_default("four"),
    );
    let mut store = Store::new();

    let err = store.set_tables_schema(schema).unwrap_err();

    assert!(matches!(err, StoreError::InvalidSchema { .. }));
    assert!(store.get_tables_schema().is_empty());
}

#[test]
fn test_values_schema_defaults_and_rejections() {
    let mut schema = ValuesSchema::new();
    schema.insert(
        "open".to_string(),
        CellSchema::new(CellKind::Boolean).with_default(true),
    );
    schema.insert("motto".to_string(), CellSchema::new(CellKind::String));
    let mut store = Store::new();
    let attempts = new_log::<InvalidValueAttempt>();
    let log = attempts.clone();
    store
        .add_invalid_value_listener(
            Some("open"),
            Reaction::observe(move |_, attempt: &InvalidValueAttempt| {
                log.borrow_mut().push(attempt.clone())
            }),
        )
        .unwrap();

    store.set_values_schema(schema).unwrap();
    assert_eq!(store.get_value("open"), Some(&CellValue::from(true)));

    store.set_value("open", false).unwrap();
    store.del_value("open").unwrap();
    assert_eq!(store.get_value("open"), Some(&CellValue::from(true)));

    let err = store.set_value("open", "yes").unwrap_err();
    assert!(matches!(err, StoreError::InvalidValue { .. }));
    assert_eq!(attempts.borrow().len(), 1);

    store.del_values_schema();
    store.set_value("anything", 1).unwrap();
    assert!(store.has_value("anything"));
}
