//! Operation logging macros
//!
//! Every event carries `component` (the calling module), `op` and `event`.
//! Extra `name = value` fields may follow the required arguments.

/// Log the start of an operation at info level
///
/// ```
/// # use tabulon_core::log_op_start;
/// log_op_start!("commit");
/// log_op_start!("commit", tx_id = "tx-1");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr $(, $($field:tt)*)?) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::tabulon_core_types::schema::EVENT_START,
            $($($field)*)?
        );
    };
}

/// Log the successful end of an operation at info level
///
/// ```
/// # use tabulon_core::log_op_end;
/// log_op_end!("commit", duration_ms = 42);
/// log_op_end!("commit", duration_ms = 42, mutator_rounds = 1);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::tabulon_core_types::schema::EVENT_END,
            duration_ms = $duration,
            $($($field)*)?
        );
    };
}

/// Log a failed operation at error level with the error's kind and code
///
/// `$err` is anything convertible into [`ExError`](crate::errors::ExError),
/// usually a `StoreError`.
///
/// ```
/// # use tabulon_core::{log_op_error, errors::StoreError};
/// let err = StoreError::TransactionOpen {
///     op: "go_to".to_string(),
/// };
/// log_op_error!("go_to", err, duration_ms = 0);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {{
        let ex_err: $crate::errors::ExError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::tabulon_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?ex_err.kind(),
            err.code = ex_err.code(),
            $($($field)*)?
        );
    }};
}
