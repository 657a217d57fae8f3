use tabulon_core::errors::{ExError, ExErrorKind, StoreError};
use tabulon_core::listeners::ListenerId;
use tabulon_core::tabulon_core_types::TransactionId;

#[test]
fn test_invalid_cell_carries_path() {
    let err = StoreError::InvalidCell {
        table_id: "pets".to_string(),
        row_id: "fido".to_string(),
        cell_id: "legs".to_string(),
        reason: "expected number, got string".to_string(),
    };

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::InvalidCell);
    assert_eq!(ex_err.code(), "ERR_INVALID_CELL");
    assert_eq!(ex_err.path(), ["pets", "fido", "legs"]);
    assert!(ex_err.message().contains("expected number"));
}

#[test]
fn test_invalid_value_distinct_from_invalid_cell() {
    let err = StoreError::InvalidValue {
        value_id: "open".to_string(),
        reason: "numbers must be finite".to_string(),
    };

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::InvalidValue);
    assert_ne!(ex_err.kind(), ExErrorKind::InvalidCell);
    assert_eq!(ex_err.path(), ["open"]);
}

#[test]
fn test_pattern_errors_name_the_registration() {
    let unbounded: ExError = StoreError::UnboundedPattern {
        category: "linked_row_ids".to_string(),
        required: 2,
    }
    .into();
    assert_eq!(unbounded.code(), "ERR_UNBOUNDED_PATTERN");
    assert_eq!(unbounded.op(), Some("add_linked_row_ids_listener"));

    let invalid: ExError = StoreError::InvalidPattern {
        category: "cell".to_string(),
        expected: 3,
        actual: 1,
    }
    .into();
    assert_eq!(invalid.kind(), ExErrorKind::InvalidPattern);
    assert_eq!(invalid.message(), "expected 3 segments, got 1");
}

#[test]
fn test_mutator_overflow_keeps_transaction_id() {
    let tx = TransactionId::new();
    let err = StoreError::MutatorOverflow {
        rounds: 100,
        transaction_id: tx.to_string(),
    };

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::MutatorOverflow);
    assert_eq!(ex_err.op(), Some("commit"));
    assert_eq!(ex_err.transaction_id(), Some(&tx));
}

#[test]
fn test_transaction_open_names_operation() {
    let ex_err: ExError = StoreError::TransactionOpen {
        op: "go_backward".to_string(),
    }
    .into();

    assert_eq!(ex_err.code(), "ERR_TRANSACTION_OPEN");
    assert_eq!(ex_err.op(), Some("go_backward"));
}

#[test]
fn test_serde_errors_convert() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: StoreError = json_err.into();
    assert!(matches!(err, StoreError::Serialization { .. }));
    assert_eq!(ExError::from(err).code(), "ERR_SERIALIZATION");

    let toml_err = toml::from_str::<toml::Value>("= nope").unwrap_err();
    let err: StoreError = toml_err.into();
    assert!(matches!(err, StoreError::Config { .. }));
    assert_eq!(ExError::from(err).code(), "ERR_CONFIG");
}

#[test]
fn test_ex_error_builder_pattern() {
    let err = ExError::new(ExErrorKind::Internal)
        .with_op("dispatch")
        .with_listener_id(ListenerId::from_raw(7))
        .with_message("listener is already running");

    assert_eq!(err.kind(), ExErrorKind::Internal);
    assert_eq!(err.op(), Some("dispatch"));
    assert_eq!(err.listener_id(), Some(ListenerId::from_raw(7)));
    assert!(err.to_string().contains("listener_id: 7"));
}

#[test]
fn test_error_kind_code_mapping() {
    let kinds = vec![
        (ExErrorKind::InvalidInput, "ERR_INVALID_INPUT"),
        (ExErrorKind::InvalidCell, "ERR_INVALID_CELL"),
        (ExErrorKind::InvalidValue, "ERR_INVALID_VALUE"),
        (ExErrorKind::InvalidSchema, "ERR_INVALID_SCHEMA"),
        (ExErrorKind::InvalidPattern, "ERR_INVALID_PATTERN"),
        (ExErrorKind::UnboundedPattern, "ERR_UNBOUNDED_PATTERN"),
        (ExErrorKind::MutatorOverflow, "ERR_MUTATOR_OVERFLOW"),
        (ExErrorKind::TransactionOpen, "ERR_TRANSACTION_OPEN"),
        (ExErrorKind::Serialization, "ERR_SERIALIZATION"),
        (ExErrorKind::Config, "ERR_CONFIG"),
        (ExErrorKind::Internal, "ERR_INTERNAL"),
    ];

    for (kind, expected_code) in kinds {
        assert_eq!(kind.code(), expected_code);
    }
}
