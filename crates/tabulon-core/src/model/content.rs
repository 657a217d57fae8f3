use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::cell::CellValue;
use crate::errors::Result;

/// Identifier of a table, row, cell or value
pub type Id = String;

/// Cells of one row, keyed by cell id
pub type Row = BTreeMap<Id, CellValue>;

/// Rows of one table, keyed by row id
pub type Table = BTreeMap<Id, Row>;

/// All tables, keyed by table id
pub type Tables = BTreeMap<Id, Table>;

/// The flat keyed values map
pub type Values = BTreeMap<Id, CellValue>;

/// Full serializable snapshot of a store
///
/// This is what a persister saves and loads back through `Store::set_content`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub tables: Tables,
    #[serde(default)]
    pub values: Values,
}

impl Content {
    pub fn new(tables: Tables, values: Values) -> Self {
        Self { tables, values }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.values.is_empty()
    }

    /// Serialize to a JSON string
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if serde_json fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from a JSON string
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the JSON is malformed or holds non-scalar cells.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Build a row from `(cell id, value)` pairs
///
/// ```
/// use tabulon_core::model::row;
///
/// let fido = row([("species", "dog".into()), ("legs", 4.into())]);
/// assert_eq!(fido.len(), 2);
/// ```
pub fn row<I, K>(cells: I) -> Row
where
    I: IntoIterator<Item = (K, CellValue)>,
    K: Into<Id>,
{
    cells.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
