//! Partial change-sets
//!
//! A `Changes` value describes edits rather than whole content: `None` at any
//! level deletes that table, row, cell or value. It is the unit a
//! synchronizer merges and the unit checkpoints replay.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::cell::CellValue;
use super::content::Id;

/// Cell id → new cell value, `None` deleting the cell
pub type RowChanges = BTreeMap<Id, Option<CellValue>>;

/// Row id → row edits, `None` deleting the row
pub type TableChanges = BTreeMap<Id, Option<RowChanges>>;

/// Table id → table edits, `None` deleting the table
pub type TablesChanges = BTreeMap<Id, Option<TableChanges>>;

/// Value id → new value, `None` deleting the value
pub type ValuesChanges = BTreeMap<Id, Option<CellValue>>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Changes {
    #[serde(default)]
    pub tables: TablesChanges,
    #[serde(default)]
    pub values: ValuesChanges,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.values.is_empty()
    }

    /// Record a cell edit, creating the enclosing table/row entries
    ///
    /// An earlier whole-row or whole-table deletion at the same path is
    /// replaced by a row entry holding only this edit.
    pub fn set_cell(
        &mut self,
        table_id: &str,
        row_id: &str,
        cell_id: &str,
        value: Option<CellValue>,
    ) -> &mut Self {
        let table = self
            .tables
            .entry(table_id.to_string())
            .or_insert_with(|| Some(TableChanges::new()))
            .get_or_insert_with(TableChanges::new);
        table
            .entry(row_id.to_string())
            .or_insert_with(|| Some(RowChanges::new()))
            .get_or_insert_with(RowChanges::new)
            .insert(cell_id.to_string(), value);
        self
    }

    pub fn del_row(&mut self, table_id: &str, row_id: &str) -> &mut Self {
        self.tables
            .entry(table_id.to_string())
            .or_insert_with(|| Some(TableChanges::new()))
            .get_or_insert_with(TableChanges::new)
            .insert(row_id.to_string(), None);
        self
    }

    pub fn del_table(&mut self, table_id: &str) -> &mut Self {
        self.tables.insert(table_id.to_string(), None);
        self
    }

    pub fn set_value(&mut self, value_id: &str, value: Option<CellValue>) -> &mut Self {
        self.values.insert(value_id.to_string(), value);
        self
    }
}
