//! Mutation surface
//!
//! Public writes validate all of their input first. If anything is rejected,
//! every rejected cell or value is recorded for the invalid-cell and
//! invalid-value listeners, the first rejection is returned, and nothing is
//! applied. Valid writes go through the primitives at the bottom of this
//! file, which record net changes before touching the data.

use super::Store;
use crate::errors::{Result, StoreError};
use crate::model::schema::{Rejection, TablesSchema, ValuesSchema};
use crate::model::{CellValue, Changes, Content, Id, Row, Table, Tables, Values};

type CellRef<'a> = (&'a str, &'a str, &'a str, &'a CellValue);

fn row_cells<'a>(table_id: &'a str, row_id: &'a str, row: &'a Row) -> impl Iterator<Item = CellRef<'a>> {
    row.iter()
        .map(move |(c, v)| (table_id, row_id, c.as_str(), v))
}

fn table_cells<'a>(table_id: &'a str, table: &'a Table) -> impl Iterator<Item = CellRef<'a>> {
    table
        .iter()
        .flat_map(move |(r, row)| row_cells(table_id, r, row))
}

fn tables_cells(tables: &Tables) -> impl Iterator<Item = CellRef<'_>> {
    tables.iter().flat_map(|(t, table)| table_cells(t, table))
}

fn changes_cells(changes: &Changes) -> impl Iterator<Item = CellRef<'_>> {
    changes.tables.iter().flat_map(|(t, table)| {
        table.iter().flatten().flat_map(move |(r, row)| {
            row.iter().flatten().filter_map(move |(c, v)| {
                v.as_ref()
                    .map(|v| (t.as_str(), r.as_str(), c.as_str(), v))
            })
        })
    })
}

impl Store {
    // ---- Tables ----

    /// Replace all tables
    ///
    /// # Errors
    ///
    /// Returns `InvalidCell` for the first rejected cell; nothing is applied.
    pub fn set_tables(&mut self, tables: Tables) -> Result<()> {
        self.batch(|s| {
            s.validate_cells(tables_cells(&tables))?;
            s.replace_tables(&tables);
            Ok(())
        })
    }

    /// Replace one table; an empty table deletes it
    ///
    /// # Errors
    ///
    /// Returns `InvalidCell` for the first rejected cell; nothing is applied.
    pub fn set_table(&mut self, table_id: &str, table: Table) -> Result<()> {
        self.batch(|s| {
            s.validate_cells(table_cells(table_id, &table))?;
            s.replace_table(table_id, &table);
            Ok(())
        })
    }

    /// Replace one row; an empty row deletes it
    ///
    /// Declared defaults fill any cell the row leaves out.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCell` for the first rejected cell; nothing is applied.
    pub fn set_row(&mut self, table_id: &str, row_id: &str, row: Row) -> Result<()> {
        self.batch(|s| {
            s.validate_cells(row_cells(table_id, row_id, &row))?;
            s.replace_row(table_id, row_id, &row);
            Ok(())
        })
    }

    /// Set the given cells of a row, leaving the others untouched
    ///
    /// # Errors
    ///
    /// Returns `InvalidCell` for the first rejected cell; nothing is applied.
    pub fn set_partial_row(&mut self, table_id: &str, row_id: &str, row: Row) -> Result<()> {
        self.batch(|s| {
            s.validate_cells(row_cells(table_id, row_id, &row))?;
            s.merge_row(table_id, row_id, &row);
            Ok(())
        })
    }

    /// Add a row under the next free numeric id
    ///
    /// Returns `None` without writing anything if the row is empty.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCell` for the first rejected cell; nothing is applied.
    pub fn add_row(&mut self, table_id: &str, row: Row) -> Result<Option<Id>> {
        if row.is_empty() {
            return Ok(None);
        }
        self.batch(|s| {
            let row_id = s.next_row_id(table_id);
            s.validate_cells(row_cells(table_id, &row_id, &row))?;
            s.replace_row(table_id, &row_id, &row);
            Ok(Some(row_id))
        })
    }

    /// # Errors
    ///
    /// Returns `InvalidCell` if the value is not finite or the schema rejects it.
    pub fn set_cell(
        &mut self,
        table_id: &str,
        row_id: &str,
        cell_id: &str,
        value: impl Into<CellValue>,
    ) -> Result<()> {
        let value = value.into();
        self.batch(|s| {
            s.validate_cells([(table_id, row_id, cell_id, &value)])?;
            let creating = !s.has_row(table_id, row_id);
            s.write_cell(table_id, row_id, cell_id, Some(value.clone()));
            if creating {
                s.fill_defaults(table_id, row_id);
            }
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Returns `MutatorOverflow` if committing fails.
    pub fn del_tables(&mut self) -> Result<()> {
        self.batch(|s| {
            for table_id in s.get_table_ids() {
                s.remove_table(&table_id);
            }
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Returns `MutatorOverflow` if committing fails.
    pub fn del_table(&mut self, table_id: &str) -> Result<()> {
        self.batch(|s| {
            s.remove_table(table_id);
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Returns `MutatorOverflow` if committing fails.
    pub fn del_row(&mut self, table_id: &str, row_id: &str) -> Result<()> {
        self.batch(|s| {
            s.remove_row(table_id, row_id);
            Ok(())
        })
    }

    /// Delete a cell, or reset it to its declared default
    ///
    /// # Errors
    ///
    /// Returns `MutatorOverflow` if committing fails.
    pub fn del_cell(&mut self, table_id: &str, row_id: &str, cell_id: &str) -> Result<()> {
        self.batch(|s| {
            if s.has_cell(table_id, row_id, cell_id) {
                let default = s.schemas.cell_default(table_id, cell_id).cloned();
                s.write_cell(table_id, row_id, cell_id, default);
            }
            Ok(())
        })
    }

    /// Delete a cell even if it has a declared default
    ///
    /// # Errors
    ///
    /// Returns `MutatorOverflow` if committing fails.
    pub fn force_del_cell(&mut self, table_id: &str, row_id: &str, cell_id: &str) -> Result<()> {
        self.batch(|s| {
            s.write_cell(table_id, row_id, cell_id, None);
            Ok(())
        })
    }

    // ---- Values ----

    /// Replace all values; declared defaults fill the ones left out
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` for the first rejected value; nothing is applied.
    pub fn set_values(&mut self, values: Values) -> Result<()> {
        self.batch(|s| {
            s.validate_values(values.iter().map(|(v, x)| (v.as_str(), x)))?;
            s.replace_values(&values);
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Returns `InvalidValue` for the first rejected value; nothing is applied.
    pub fn set_partial_values(&mut self, values: Values) -> Result<()> {
        self.batch(|s| {
            s.validate_values(values.iter().map(|(v, x)| (v.as_str(), x)))?;
            for (value_id, value) in &values {
                s.write_value(value_id, Some(value.clone()));
            }
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Returns `InvalidValue` if the value is not finite or the schema rejects it.
    pub fn set_value(&mut self, value_id: &str, value: impl Into<CellValue>) -> Result<()> {
        let value = value.into();
        self.batch(|s| {
            s.validate_values([(value_id, &value)])?;
            s.write_value(value_id, Some(value.clone()));
            Ok(())
        })
    }

    /// Delete all values, leaving declared defaults in place
    ///
    /// # Errors
    ///
    /// Returns `MutatorOverflow` if committing fails.
    pub fn del_values(&mut self) -> Result<()> {
        self.batch(|s| {
            s.replace_values(&Values::new());
            Ok(())
        })
    }

    /// Delete a value, or reset it to its declared default
    ///
    /// # Errors
    ///
    /// Returns `MutatorOverflow` if committing fails.
    pub fn del_value(&mut self, value_id: &str) -> Result<()> {
        self.batch(|s| {
            if s.has_value(value_id) {
                let default = s.schemas.value_default(value_id).cloned();
                s.write_value(value_id, default);
            }
            Ok(())
        })
    }

    // ---- Whole store ----

    /// Replace all tables and values in one transaction
    ///
    /// # Errors
    ///
    /// Returns the first `InvalidCell` or `InvalidValue`; nothing is applied.
    pub fn set_content(&mut self, content: Content) -> Result<()> {
        self.batch(|s| {
            let cells = s.validate_cells(tables_cells(&content.tables));
            let values = s.validate_values(content.values.iter().map(|(v, x)| (v.as_str(), x)));
            cells?;
            values?;
            s.replace_tables(&content.tables);
            s.replace_values(&content.values);
            Ok(())
        })
    }

    /// Apply a partial change-set in one transaction
    ///
    /// Deletions are forced: declared defaults are not restored and rows
    /// created by the change-set are not filled with defaults. This is the
    /// entry point for replaying history and merging remote changes.
    ///
    /// # Errors
    ///
    /// Returns the first `InvalidCell` or `InvalidValue`; nothing is applied.
    pub fn apply_changes(&mut self, changes: &Changes) -> Result<()> {
        self.batch(|s| {
            let cells = s.validate_cells(changes_cells(changes));
            let values = s.validate_values(
                changes
                    .values
                    .iter()
                    .filter_map(|(v, x)| x.as_ref().map(|x| (v.as_str(), x))),
            );
            cells?;
            values?;

            for (table_id, table) in &changes.tables {
                let Some(table) = table else {
                    s.remove_table(table_id);
                    continue;
                };
                for (row_id, row) in table {
                    let Some(row) = row else {
                        s.remove_row(table_id, row_id);
                        continue;
                    };
                    for (cell_id, value) in row {
                        s.write_cell(table_id, row_id, cell_id, value.clone());
                    }
                }
            }
            for (value_id, value) in &changes.values {
                s.write_value(value_id, value.clone());
            }
            Ok(())
        })
    }

    // ---- Schemas ----

    /// Install a tables schema and conform existing content to it
    ///
    /// Cells the schema rejects are removed and declared defaults are filled
    /// into every existing row, in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` if a default does not match its declared type.
    pub fn set_tables_schema(&mut self, schema: TablesSchema) -> Result<()> {
        self.schemas.set_tables(schema)?;
        self.batch(|s| {
            s.conform_tables();
            Ok(())
        })
    }

    /// Install a values schema and conform existing values to it
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` if a default does not match its declared type.
    pub fn set_values_schema(&mut self, schema: ValuesSchema) -> Result<()> {
        self.schemas.set_values(schema)?;
        self.batch(|s| {
            s.conform_values();
            Ok(())
        })
    }

    /// Drop the tables schema; content is left as it is
    pub fn del_tables_schema(&mut self) {
        let _ = self.schemas.set_tables(TablesSchema::new());
    }

    /// Drop the values schema; content is left as it is
    pub fn del_values_schema(&mut self) {
        let _ = self.schemas.set_values(ValuesSchema::new());
    }

    // ---- Validation ----

    fn validate_cells<'a>(&mut self, cells: impl IntoIterator<Item = CellRef<'a>>) -> Result<()> {
        let mut first = None;
        for (table_id, row_id, cell_id, value) in cells {
            if let Err(rejection) = self.schemas.check_cell(table_id, cell_id, value) {
                let err = self.reject_cell(table_id, row_id, cell_id, value, &rejection);
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }

    fn validate_values<'a>(
        &mut self,
        values: impl IntoIterator<Item = (&'a str, &'a CellValue)>,
    ) -> Result<()> {
        let mut first = None;
        for (value_id, value) in values {
            if let Err(rejection) = self.schemas.check_value(value_id, value) {
                let err = self.reject_value(value_id, value, &rejection);
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }

    fn reject_cell(
        &mut self,
        table_id: &str,
        row_id: &str,
        cell_id: &str,
        value: &CellValue,
        rejection: &Rejection,
    ) -> StoreError {
        for set in [&mut self.tx.pending, &mut self.tx.round] {
            set.record_invalid_cell(table_id, row_id, cell_id, value.clone());
        }
        tracing::debug!(
            component = module_path!(),
            table_id,
            row_id,
            cell_id,
            reason = %rejection.reason(),
            "cell write rejected"
        );
        StoreError::InvalidCell {
            table_id: table_id.to_string(),
            row_id: row_id.to_string(),
            cell_id: cell_id.to_string(),
            reason: rejection.reason(),
        }
    }

    fn reject_value(&mut self, value_id: &str, value: &CellValue, rejection: &Rejection) -> StoreError {
        for set in [&mut self.tx.pending, &mut self.tx.round] {
            set.record_invalid_value(value_id, value.clone());
        }
        tracing::debug!(
            component = module_path!(),
            value_id,
            reason = %rejection.reason(),
            "value write rejected"
        );
        StoreError::InvalidValue {
            value_id: value_id.to_string(),
            reason: rejection.reason(),
        }
    }

    // ---- Structural helpers (caller holds a transaction) ----

    fn replace_tables(&mut self, tables: &Tables) {
        for table_id in self.get_table_ids() {
            if !tables.contains_key(&table_id) {
                self.remove_table(&table_id);
            }
        }
        for (table_id, table) in tables {
            self.replace_table(table_id, table);
        }
    }

    fn replace_table(&mut self, table_id: &str, table: &Table) {
        for row_id in self.get_row_ids(table_id) {
            if !table.contains_key(&row_id) {
                self.remove_row(table_id, &row_id);
            }
        }
        for (row_id, row) in table {
            self.replace_row(table_id, row_id, row);
        }
    }

    fn replace_row(&mut self, table_id: &str, row_id: &str, row: &Row) {
        let mut target = row.clone();
        if !target.is_empty() {
            for (cell_id, default) in self.schemas.cell_defaults(table_id) {
                target.entry(cell_id).or_insert(default);
            }
        }
        for (cell_id, value) in &target {
            self.write_cell(table_id, row_id, cell_id, Some(value.clone()));
        }
        for cell_id in self.get_cell_ids(table_id, row_id) {
            if !target.contains_key(&cell_id) {
                self.write_cell(table_id, row_id, &cell_id, None);
            }
        }
    }

    fn merge_row(&mut self, table_id: &str, row_id: &str, row: &Row) {
        let creating = !self.has_row(table_id, row_id);
        for (cell_id, value) in row {
            self.write_cell(table_id, row_id, cell_id, Some(value.clone()));
        }
        if creating {
            self.fill_defaults(table_id, row_id);
        }
    }

    /// Fill declared defaults into an existing row
    fn fill_defaults(&mut self, table_id: &str, row_id: &str) {
        if !self.has_row(table_id, row_id) {
            return;
        }
        for (cell_id, default) in self.schemas.cell_defaults(table_id) {
            if !self.has_cell(table_id, row_id, &cell_id) {
                self.write_cell(table_id, row_id, &cell_id, Some(default));
            }
        }
    }

    fn remove_table(&mut self, table_id: &str) {
        for row_id in self.get_row_ids(table_id) {
            self.remove_row(table_id, &row_id);
        }
    }

    fn remove_row(&mut self, table_id: &str, row_id: &str) {
        for cell_id in self.get_cell_ids(table_id, row_id) {
            self.write_cell(table_id, row_id, &cell_id, None);
        }
    }

    fn replace_values(&mut self, values: &Values) {
        let mut target = values.clone();
        for (value_id, default) in self.schemas.value_defaults() {
            target.entry(value_id).or_insert(default);
        }
        for value_id in self.get_value_ids() {
            if !target.contains_key(&value_id) {
                self.write_value(&value_id, None);
            }
        }
        for (value_id, value) in target {
            self.write_value(&value_id, Some(value));
        }
    }

    fn conform_tables(&mut self) {
        let mut rejected = Vec::new();
        let mut rows = Vec::new();
        for (table_id, table) in &self.tables {
            for (row_id, row) in table {
                rows.push((table_id.clone(), row_id.clone()));
                for (cell_id, value) in row {
                    if self.schemas.check_cell(table_id, cell_id, value).is_err() {
                        rejected.push((table_id.clone(), row_id.clone(), cell_id.clone()));
                    }
                }
            }
        }
        for (table_id, row_id, cell_id) in rejected {
            self.write_cell(&table_id, &row_id, &cell_id, None);
        }
        for (table_id, row_id) in rows {
            self.fill_defaults(&table_id, &row_id);
        }
    }

    fn conform_values(&mut self) {
        let rejected: Vec<Id> = self
            .values
            .iter()
            .filter(|(value_id, value)| self.schemas.check_value(value_id, value).is_err())
            .map(|(value_id, _)| value_id.clone())
            .collect();
        for value_id in rejected {
            self.write_value(&value_id, None);
        }
        for (value_id, default) in self.schemas.value_defaults() {
            if !self.has_value(&value_id) {
                self.write_value(&value_id, Some(default));
            }
        }
    }

    fn next_row_id(&mut self, table_id: &str) -> Id {
        let mut next = self.next_row_ids.get(table_id).copied().unwrap_or(0);
        while self.has_row(table_id, &next.to_string()) {
            next += 1;
        }
        self.next_row_ids.insert(table_id.to_string(), next + 1);
        next.to_string()
    }

    // ---- Primitives ----

    /// Set or remove one cell, recording the net change
    ///
    /// Removing the last cell of a row removes the row, and removing the
    /// last row of a table removes the table.
    pub(crate) fn write_cell(
        &mut self,
        table_id: &str,
        row_id: &str,
        cell_id: &str,
        new: Option<CellValue>,
    ) {
        let old = self.get_cell(table_id, row_id, cell_id).cloned();
        if old == new {
            return;
        }
        for set in [&mut self.tx.pending, &mut self.tx.round] {
            set.record_cell(
                &self.tables,
                &self.cell_id_counts,
                (table_id, row_id, cell_id),
                old.clone(),
                new.clone(),
            );
        }

        match new {
            Some(value) => {
                let row = self
                    .tables
                    .entry(table_id.to_string())
                    .or_default()
                    .entry(row_id.to_string())
                    .or_default();
                if row.insert(cell_id.to_string(), value).is_none() {
                    *self
                        .cell_id_counts
                        .entry(table_id.to_string())
                        .or_default()
                        .entry(cell_id.to_string())
                        .or_insert(0) += 1;
                }
            }
            None => {
                let Some(table) = self.tables.get_mut(table_id) else {
                    return;
                };
                let Some(row) = table.get_mut(row_id) else {
                    return;
                };
                if row.remove(cell_id).is_some() {
                    if let Some(ids) = self.cell_id_counts.get_mut(table_id) {
                        if let Some(count) = ids.get_mut(cell_id) {
                            *count -= 1;
                            if *count == 0 {
                                ids.remove(cell_id);
                            }
                        }
                        if ids.is_empty() {
                            self.cell_id_counts.remove(table_id);
                        }
                    }
                }
                if row.is_empty() {
                    table.remove(row_id);
                }
                if table.is_empty() {
                    self.tables.remove(table_id);
                }
            }
        }
    }

    /// Set or remove one value, recording the net change
    pub(crate) fn write_value(&mut self, value_id: &str, new: Option<CellValue>) {
        let old = self.values.get(value_id).cloned();
        if old == new {
            return;
        }
        for set in [&mut self.tx.pending, &mut self.tx.round] {
            set.record_value(&self.values, value_id, old.clone(), new.clone());
        }
        match new {
            Some(value) => {
                self.values.insert(value_id.to_string(), value);
            }
            None => {
                self.values.remove(value_id);
            }
        }
    }
}
