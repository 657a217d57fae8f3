//! The reactive store
//!
//! A `Store` holds tabular data (Tables → Rows → Cells) and a flat map of
//! Values. Every mutation happens inside a transaction, explicit or implicit,
//! and listeners registered against path patterns are notified once per
//! changed concrete path when the outermost transaction commits.
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use tabulon_core::store::{CellChange, Reaction, Store};
//!
//! let mut store = Store::new();
//! store.set_cell("pets", "fido", "color", "brown").unwrap();
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = seen.clone();
//! store
//!     .add_cell_listener(
//!         Some("pets"),
//!         None,
//!         Some("color"),
//!         Reaction::observe(move |_, change: &CellChange| {
//!             sink.borrow_mut().push(change.new.clone());
//!         }),
//!     )
//!     .unwrap();
//!
//! store.set_cell("pets", "fido", "color", "walnut").unwrap();
//! assert_eq!(seen.borrow().len(), 1);
//! ```

mod changeset;
pub mod events;
mod listen;
mod mutate;
mod transaction;

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use tabulon_core_types::StoreId;

use crate::config::StoreConfig;
use crate::listeners::{DiagnosticSink, ListenerRegistry, TracingSink};
use crate::model::schema::Schemas;
use crate::model::{CellValue, Content, Id, Row, Table, Tables, TablesSchema, Values, ValuesSchema};

pub use changeset::TransactionChanges;
pub use events::{
    CellChange, EventPayload, ExistenceChange, InvalidCellAttempt, InvalidValueAttempt, Reaction,
    RowChange, RowCountChange, StoreEvent, StoreListenerKind, TableChange, TransactionInfo,
    ValueChange,
};

use changeset::CellIdCounts;
use events::Callback;
use transaction::TransactionState;

pub struct Store {
    id: StoreId,
    config: StoreConfig,
    tables: Tables,
    values: Values,
    schemas: Schemas,
    cell_id_counts: CellIdCounts,
    next_row_ids: BTreeMap<Id, u64>,
    listeners: ListenerRegistry<StoreListenerKind, Callback>,
    sink: Rc<dyn DiagnosticSink>,
    tx: TransactionState,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id)
            .field("tables", &self.tables)
            .field("values", &self.values)
            .field("listeners", &self.listeners.len())
            .field("transaction_depth", &self.tx.depth)
            .finish()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            id: StoreId::new(),
            config,
            tables: Tables::new(),
            values: Values::new(),
            schemas: Schemas::default(),
            cell_id_counts: CellIdCounts::new(),
            next_row_ids: BTreeMap::new(),
            listeners: ListenerRegistry::new(),
            sink: Rc::new(TracingSink),
            tx: TransactionState::default(),
        }
    }

    /// Unique id of this store, carried by its commit log events
    pub fn id(&self) -> &StoreId {
        &self.id
    }

    /// Configuration the store was created with
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Sink that receives listener failures
    pub fn diagnostic_sink(&self) -> Rc<dyn DiagnosticSink> {
        self.sink.clone()
    }

    /// Replace the sink that receives listener failures
    pub fn set_diagnostic_sink(&mut self, sink: Rc<dyn DiagnosticSink>) {
        self.sink = sink;
    }

    // ---- Tables ----

    /// All tables
    pub fn get_tables(&self) -> &Tables {
        &self.tables
    }

    /// A table, or `None` if it has no rows
    pub fn get_table(&self, table_id: &str) -> Option<&Table> {
        self.tables.get(table_id)
    }

    /// A row, or `None` if it has no cells
    pub fn get_row(&self, table_id: &str, row_id: &str) -> Option<&Row> {
        self.tables.get(table_id)?.get(row_id)
    }

    /// A cell value, or `None` if absent
    pub fn get_cell(&self, table_id: &str, row_id: &str, cell_id: &str) -> Option<&CellValue> {
        self.get_row(table_id, row_id)?.get(cell_id)
    }

    /// Ids of every table, sorted
    pub fn get_table_ids(&self) -> Vec<Id> {
        self.tables.keys().cloned().collect()
    }

    /// Ids of the rows in a table, sorted; empty for a missing table
    pub fn get_row_ids(&self, table_id: &str) -> Vec<Id> {
        self.get_table(table_id)
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of rows in a table
    pub fn get_row_count(&self, table_id: &str) -> usize {
        self.get_table(table_id).map_or(0, |table| table.len())
    }

    /// Ids of the cells in a row, sorted
    pub fn get_cell_ids(&self, table_id: &str, row_id: &str) -> Vec<Id> {
        self.get_row(table_id, row_id)
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Union of the cell ids used by any row of the table
    pub fn get_table_cell_ids(&self, table_id: &str) -> Vec<Id> {
        self.cell_id_counts
            .get(table_id)
            .map(|ids| ids.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Check if any table exists
    pub fn has_tables(&self) -> bool {
        !self.tables.is_empty()
    }

    /// Check if a table exists
    pub fn has_table(&self, table_id: &str) -> bool {
        self.tables.contains_key(table_id)
    }

    /// Check if any row of the table has the cell
    pub fn has_table_cell(&self, table_id: &str, cell_id: &str) -> bool {
        self.cell_id_counts
            .get(table_id)
            .is_some_and(|ids| ids.contains_key(cell_id))
    }

    /// Check if a row exists
    pub fn has_row(&self, table_id: &str, row_id: &str) -> bool {
        self.get_row(table_id, row_id).is_some()
    }

    /// Check if a cell exists
    pub fn has_cell(&self, table_id: &str, row_id: &str, cell_id: &str) -> bool {
        self.get_cell(table_id, row_id, cell_id).is_some()
    }

    // ---- Values ----

    /// All values
    pub fn get_values(&self) -> &Values {
        &self.values
    }

    /// A value, or `None` if absent
    pub fn get_value(&self, value_id: &str) -> Option<&CellValue> {
        self.values.get(value_id)
    }

    /// Ids of every value, sorted
    pub fn get_value_ids(&self) -> Vec<Id> {
        self.values.keys().cloned().collect()
    }

    /// Check if any value exists
    pub fn has_values(&self) -> bool {
        !self.values.is_empty()
    }

    /// Check if a value exists
    pub fn has_value(&self, value_id: &str) -> bool {
        self.values.contains_key(value_id)
    }

    // ---- Whole store ----

    /// Snapshot of all tables and values
    pub fn get_content(&self) -> Content {
        Content::new(self.tables.clone(), self.values.clone())
    }

    /// Schema applied to cell writes
    pub fn get_tables_schema(&self) -> &TablesSchema {
        self.schemas.tables()
    }

    /// Schema applied to value writes
    pub fn get_values_schema(&self) -> &ValuesSchema {
        self.schemas.values()
    }
}
