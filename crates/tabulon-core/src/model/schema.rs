//! Declared types and defaults for cells and values
//!
//! A store without schemas accepts any storable scalar anywhere. Once a
//! tables schema is set, only declared tables and cells are writable, and
//! only with values of the declared kind. The same applies to values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::cell::{CellKind, CellValue};
use super::content::Id;
use crate::errors::{Result, StoreError};

/// Declaration of a single cell or value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSchema {
    #[serde(rename = "type")]
    pub kind: CellKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<CellValue>,
}

impl CellSchema {
    pub fn new(kind: CellKind) -> Self {
        Self {
            kind,
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<CellValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    fn accepts(&self, value: &CellValue) -> bool {
        value.kind() == self.kind
    }
}

/// Table id → cell id → declaration
pub type TablesSchema = BTreeMap<Id, BTreeMap<Id, CellSchema>>;

/// Value id → declaration
pub type ValuesSchema = BTreeMap<Id, CellSchema>;

/// Why a write was rejected
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Rejection {
    NotStorable,
    UndeclaredTable,
    Undeclared,
    WrongKind { expected: CellKind, actual: CellKind },
}

impl Rejection {
    pub(crate) fn reason(&self) -> String {
        match self {
            Rejection::NotStorable => "numbers must be finite".to_string(),
            Rejection::UndeclaredTable => "table is not declared in the schema".to_string(),
            Rejection::Undeclared => "not declared in the schema".to_string(),
            Rejection::WrongKind { expected, actual } => {
                format!("expected {}, got {}", expected, actual)
            }
        }
    }
}

/// The pair of schemas a store validates against
#[derive(Debug, Clone, Default)]
pub(crate) struct Schemas {
    tables: TablesSchema,
    values: ValuesSchema,
}

impl Schemas {
    pub(crate) fn tables(&self) -> &TablesSchema {
        &self.tables
    }

    pub(crate) fn values(&self) -> &ValuesSchema {
        &self.values
    }

    /// Install a tables schema after checking its defaults
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` if a default has the wrong kind or is not storable.
    pub(crate) fn set_tables(&mut self, schema: TablesSchema) -> Result<()> {
        for (table_id, cells) in &schema {
            for (cell_id, cell) in cells {
                check_default(&format!("{}/{}", table_id, cell_id), cell)?;
            }
        }
        self.tables = schema;
        Ok(())
    }

    /// Install a values schema after checking its defaults
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` if a default has the wrong kind or is not storable.
    pub(crate) fn set_values(&mut self, schema: ValuesSchema) -> Result<()> {
        for (value_id, value) in &schema {
            check_default(value_id, value)?;
        }
        self.values = schema;
        Ok(())
    }

    pub(crate) fn check_cell(
        &self,
        table_id: &str,
        cell_id: &str,
        value: &CellValue,
    ) -> std::result::Result<(), Rejection> {
        if !value.is_storable() {
            return Err(Rejection::NotStorable);
        }
        if self.tables.is_empty() {
            return Ok(());
        }
        let cells = self.tables.get(table_id).ok_or(Rejection::UndeclaredTable)?;
        let declared = cells.get(cell_id).ok_or(Rejection::Undeclared)?;
        if declared.accepts(value) {
            Ok(())
        } else {
            Err(Rejection::WrongKind {
                expected: declared.kind,
                actual: value.kind(),
            })
        }
    }

    pub(crate) fn check_value(
        &self,
        value_id: &str,
        value: &CellValue,
    ) -> std::result::Result<(), Rejection> {
        if !value.is_storable() {
            return Err(Rejection::NotStorable);
        }
        if self.values.is_empty() {
            return Ok(());
        }
        let declared = self.values.get(value_id).ok_or(Rejection::Undeclared)?;
        if declared.accepts(value) {
            Ok(())
        } else {
            Err(Rejection::WrongKind {
                expected: declared.kind,
                actual: value.kind(),
            })
        }
    }

    pub(crate) fn cell_default(&self, table_id: &str, cell_id: &str) -> Option<&CellValue> {
        self.tables
            .get(table_id)
            .and_then(|cells| cells.get(cell_id))
            .and_then(|cell| cell.default.as_ref())
    }

    /// Declared defaults of a table, in cell id order
    pub(crate) fn cell_defaults(&self, table_id: &str) -> Vec<(Id, CellValue)> {
        self.tables
            .get(table_id)
            .map(|cells| {
                cells
                    .iter()
                    .filter_map(|(id, cell)| cell.default.clone().map(|d| (id.clone(), d)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn value_default(&self, value_id: &str) -> Option<&CellValue> {
        self.values.get(value_id).and_then(|v| v.default.as_ref())
    }

    pub(crate) fn value_defaults(&self) -> Vec<(Id, CellValue)> {
        self.values
            .iter()
            .filter_map(|(id, v)| v.default.clone().map(|d| (id.clone(), d)))
            .collect()
    }
}

fn check_default(path: &str, schema: &CellSchema) -> Result<()> {
    if let Some(default) = &schema.default {
        if !default.is_storable() || !schema.accepts(default) {
            return Err(StoreError::InvalidSchema {
                reason: format!(
                    "default for {} is not a {} ({})",
                    path, schema.kind, default
                ),
            });
        }
    }
    Ok(())
}
