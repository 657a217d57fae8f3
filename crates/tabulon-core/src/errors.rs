use tabulon_core_types::TransactionId;
use thiserror::Error;

use crate::listeners::ListenerId;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// This taxonomy provides a stable, structured classification of all errors
/// raised by the store, its checkpoints and its derived objects. Each kind
/// maps to a stable error code that can be used for programmatic error
/// handling, testing, and external API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Validation
    InvalidInput,
    InvalidCell,
    InvalidValue,
    InvalidSchema,

    // Listener registration
    InvalidPattern,
    UnboundedPattern,

    // Transaction engine
    MutatorOverflow,
    TransactionOpen,

    // Integration
    Serialization,
    Config,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::InvalidCell => "ERR_INVALID_CELL",
            ExErrorKind::InvalidValue => "ERR_INVALID_VALUE",
            ExErrorKind::InvalidSchema => "ERR_INVALID_SCHEMA",
            ExErrorKind::InvalidPattern => "ERR_INVALID_PATTERN",
            ExErrorKind::UnboundedPattern => "ERR_UNBOUNDED_PATTERN",
            ExErrorKind::MutatorOverflow => "ERR_MUTATOR_OVERFLOW",
            ExErrorKind::TransactionOpen => "ERR_TRANSACTION_OPEN",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Config => "ERR_CONFIG",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// This error type provides a structured representation of errors with
/// classification fields for programmatic handling and rich context for debugging.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    path: Vec<String>,
    listener_id: Option<ListenerId>,
    transaction_id: Option<TransactionId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            path: Vec::new(),
            listener_id: None,
            transaction_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add the concrete store path the error refers to
    pub fn with_path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path = path.into_iter().map(Into::into).collect();
        self
    }

    /// Add listener context
    pub fn with_listener_id(mut self, id: ListenerId) -> Self {
        self.listener_id = Some(id);
        self
    }

    /// Add transaction correlation context
    pub fn with_transaction_id(mut self, id: TransactionId) -> Self {
        self.transaction_id = Some(id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the path context (empty when the error is not path-specific)
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Get the listener context, if any
    pub fn listener_id(&self) -> Option<ListenerId> {
        self.listener_id
    }

    /// Get the transaction context, if any
    pub fn transaction_id(&self) -> Option<&TransactionId> {
        self.transaction_id.as_ref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if !self.path.is_empty() {
            write!(f, " (path: {})", self.path.join("/"))?;
        }
        if let Some(id) = self.listener_id {
            write!(f, " (listener_id: {})", id)?;
        }
        if let Some(tx) = &self.transaction_id {
            write!(f, " (tx_id: {})", tx)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

// ========== End Error Facility ==========

/// Error taxonomy for store, checkpoint and derived-object operations
///
/// Absence is never an error: reading missing data, deleting an unknown
/// listener or navigating to an unknown checkpoint all have defined empty
/// results instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// A cell write was rejected before anything was applied
    #[error("Invalid cell {table_id}/{row_id}/{cell_id}: {reason}")]
    InvalidCell {
        table_id: String,
        row_id: String,
        cell_id: String,
        reason: String,
    },

    /// A value write was rejected before anything was applied
    #[error("Invalid value {value_id}: {reason}")]
    InvalidValue { value_id: String, reason: String },

    /// A schema declares a default that does not match its own type
    #[error("Invalid schema: {reason}")]
    InvalidSchema { reason: String },

    /// A pattern has the wrong number of segments for its listener category
    #[error("Pattern for {category} listeners needs {expected} segments, got {actual}")]
    InvalidPattern {
        category: String,
        expected: usize,
        actual: usize,
    },

    /// A pattern starts with wildcards where the category needs concrete ids
    #[error("{category} listeners need {required} leading concrete ids; wildcards would make the reachable set unbounded")]
    UnboundedPattern { category: String, required: usize },

    /// Mutator listeners kept changing the store past the configured bound
    #[error("Mutator listeners still changing the store after {rounds} rounds in transaction {transaction_id}")]
    MutatorOverflow {
        rounds: usize,
        transaction_id: String,
    },

    /// The operation cannot run while a store transaction is open
    #[error("Operation {op} cannot run inside an open transaction")]
    TransactionOpen { op: String },

    /// Content could not be (de)serialized
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Configuration could not be parsed
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Conversion from StoreError to ExError
impl From<StoreError> for ExError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidCell {
                table_id,
                row_id,
                cell_id,
                reason,
            } => ExError::new(ExErrorKind::InvalidCell)
                .with_path([table_id, row_id, cell_id])
                .with_message(reason),

            StoreError::InvalidValue { value_id, reason } => {
                ExError::new(ExErrorKind::InvalidValue)
                    .with_path([value_id])
                    .with_message(reason)
            }

            StoreError::InvalidSchema { reason } => {
                ExError::new(ExErrorKind::InvalidSchema).with_message(reason)
            }

            StoreError::InvalidPattern {
                category,
                expected,
                actual,
            } => ExError::new(ExErrorKind::InvalidPattern)
                .with_op(format!("add_{}_listener", category))
                .with_message(format!("expected {} segments, got {}", expected, actual)),

            StoreError::UnboundedPattern { category, required } => {
                ExError::new(ExErrorKind::UnboundedPattern)
                    .with_op(format!("add_{}_listener", category))
                    .with_message(format!("{} leading concrete ids required", required))
            }

            StoreError::MutatorOverflow {
                rounds,
                transaction_id,
            } => ExError::new(ExErrorKind::MutatorOverflow)
                .with_op("commit")
                .with_transaction_id(TransactionId::from_string(transaction_id))
                .with_message(format!("still changing after {} rounds", rounds)),

            StoreError::TransactionOpen { op } => ExError::new(ExErrorKind::TransactionOpen)
                .with_op(op)
                .with_message("a store transaction is open"),

            StoreError::Serialization { message } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }

            StoreError::Config { message } => {
                ExError::new(ExErrorKind::Config).with_message(message)
            }
        }
    }
}

/// Conversion from serde_json::Error to StoreError
impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Conversion from toml::de::Error to StoreError
impl From<toml::de::Error> for StoreError {
    fn from(err: toml::de::Error) -> Self {
        StoreError::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_codes_are_unique() {
        let kinds = [
            ExErrorKind::InvalidInput,
            ExErrorKind::InvalidCell,
            ExErrorKind::InvalidValue,
            ExErrorKind::InvalidSchema,
            ExErrorKind::InvalidPattern,
            ExErrorKind::UnboundedPattern,
            ExErrorKind::MutatorOverflow,
            ExErrorKind::TransactionOpen,
            ExErrorKind::Serialization,
            ExErrorKind::Config,
            ExErrorKind::Internal,
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in &kinds[i + 1..] {
                assert_ne!(a.code(), b.code(), "{:?} and {:?} share a code", a, b);
            }
        }
    }

    #[test]
    fn test_display_includes_path_and_op() {
        let err = ExError::new(ExErrorKind::InvalidCell)
            .with_op("set_cell")
            .with_path(["pets", "fido", "legs"])
            .with_message("expected number");
        let rendered = err.to_string();
        assert!(rendered.starts_with("[ERR_INVALID_CELL]"));
        assert!(rendered.contains("set_cell"));
        assert!(rendered.contains("pets/fido/legs"));
    }

    #[test]
    fn test_source_chain() {
        let inner = ExError::new(ExErrorKind::Serialization);
        let outer = ExError::new(ExErrorKind::Config).with_source(inner);
        assert_eq!(
            outer.source_error().map(|e| e.kind()),
            Some(ExErrorKind::Serialization)
        );
    }
}
