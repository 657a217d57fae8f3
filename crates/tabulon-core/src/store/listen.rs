//! Subscription surface
//!
//! `None` in any id argument is a wildcard. Store categories accept a
//! wildcard in every position, so registration only fails for a pattern of
//! the wrong shape, which these typed methods cannot produce.

use super::events::{
    CellChange, EventPayload, ExistenceChange, InvalidCellAttempt, InvalidValueAttempt, Reaction,
    RowChange, RowCountChange, StoreListenerKind, TableChange, TransactionInfo, ValueChange,
};
use super::Store;
use crate::errors::Result;
use crate::listeners::{ListenerId, ListenerStats, PathPattern};

impl Store {
    fn add_listener<E: EventPayload>(
        &mut self,
        kind: StoreListenerKind,
        pattern: &[Option<&str>],
        reaction: Reaction<E>,
    ) -> Result<ListenerId> {
        let mutator = reaction.is_mutator();
        let id = self.listeners.register(
            kind,
            PathPattern::from_options(pattern),
            mutator,
            reaction.into_callback(),
        )?;
        tracing::debug!(
            component = module_path!(),
            listener_id = id.raw(),
            listener_category = ?kind,
            mutator,
            "listener added"
        );
        Ok(id)
    }

    /// Remove a listener; unknown ids are ignored
    pub fn del_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    /// Active listeners per category
    pub fn get_listener_stats(&self) -> ListenerStats<StoreListenerKind> {
        self.listeners.stats()
    }

    // ---- Tables ----

    /// Called when the store gains its first table or loses its last
    pub fn add_has_tables_listener(&mut self, reaction: Reaction<ExistenceChange>) -> Result<ListenerId> {
        self.add_listener(StoreListenerKind::HasTables, &[], reaction)
    }

    /// Called once per commit that changed any cell
    pub fn add_tables_listener(&mut self, reaction: Reaction<()>) -> Result<ListenerId> {
        self.add_listener(StoreListenerKind::Tables, &[], reaction)
    }

    /// Called when a table is created or removed
    pub fn add_table_ids_listener(&mut self, reaction: Reaction<()>) -> Result<ListenerId> {
        self.add_listener(StoreListenerKind::TableIds, &[], reaction)
    }

    /// Called when a table starts or stops existing
    pub fn add_has_table_listener(
        &mut self,
        table_id: Option<&str>,
        reaction: Reaction<ExistenceChange>,
    ) -> Result<ListenerId> {
        self.add_listener(StoreListenerKind::HasTable, &[table_id], reaction)
    }

    /// Called when any cell of a table changed
    pub fn add_table_listener(
        &mut self,
        table_id: Option<&str>,
        reaction: Reaction<TableChange>,
    ) -> Result<ListenerId> {
        self.add_listener(StoreListenerKind::Table, &[table_id], reaction)
    }

    /// Called when the union of cell ids across a table's rows changed
    pub fn add_table_cell_ids_listener(
        &mut self,
        table_id: Option<&str>,
        reaction: Reaction<TableChange>,
    ) -> Result<ListenerId> {
        self.add_listener(StoreListenerKind::TableCellIds, &[table_id], reaction)
    }

    /// Called when rows were added to or removed from a table
    pub fn add_row_ids_listener(
        &mut self,
        table_id: Option<&str>,
        reaction: Reaction<TableChange>,
    ) -> Result<ListenerId> {
        self.add_listener(StoreListenerKind::RowIds, &[table_id], reaction)
    }

    /// Called with the old and new row count of a table
    pub fn add_row_count_listener(
        &mut self,
        table_id: Option<&str>,
        reaction: Reaction<RowCountChange>,
    ) -> Result<ListenerId> {
        self.add_listener(StoreListenerKind::RowCount, &[table_id], reaction)
    }

    /// Called when a row starts or stops existing
    pub fn add_has_row_listener(
        &mut self,
        table_id: Option<&str>,
        row_id: Option<&str>,
        reaction: Reaction<ExistenceChange>,
    ) -> Result<ListenerId> {
        self.add_listener(StoreListenerKind::HasRow, &[table_id, row_id], reaction)
    }

    /// Called when any cell of a row changed
    pub fn add_row_listener(
        &mut self,
        table_id: Option<&str>,
        row_id: Option<&str>,
        reaction: Reaction<RowChange>,
    ) -> Result<ListenerId> {
        self.add_listener(StoreListenerKind::Row, &[table_id, row_id], reaction)
    }

    /// Called when cells were added to or removed from a row
    pub fn add_cell_ids_listener(
        &mut self,
        table_id: Option<&str>,
        row_id: Option<&str>,
        reaction: Reaction<RowChange>,
    ) -> Result<ListenerId> {
        self.add_listener(StoreListenerKind::CellIds, &[table_id, row_id], reaction)
    }

    /// Called when a cell starts or stops existing
    pub fn add_has_cell_listener(
        &mut self,
        table_id: Option<&str>,
        row_id: Option<&str>,
        cell_id: Option<&str>,
        reaction: Reaction<ExistenceChange>,
    ) -> Result<ListenerId> {
        self.add_listener(StoreListenerKind::HasCell, &[table_id, row_id, cell_id], reaction)
    }

    /// Called with the old and new value of a changed cell
    pub fn add_cell_listener(
        &mut self,
        table_id: Option<&str>,
        row_id: Option<&str>,
        cell_id: Option<&str>,
        reaction: Reaction<CellChange>,
    ) -> Result<ListenerId> {
        self.add_listener(StoreListenerKind::Cell, &[table_id, row_id, cell_id], reaction)
    }

    /// Called with the cell writes a commit rejected
    pub fn add_invalid_cell_listener(
        &mut self,
        table_id: Option<&str>,
        row_id: Option<&str>,
        cell_id: Option<&str>,
        reaction: Reaction<InvalidCellAttempt>,
    ) -> Result<ListenerId> {
        self.add_listener(
            StoreListenerKind::InvalidCell,
            &[table_id, row_id, cell_id],
            reaction,
        )
    }

    // ---- Values ----

    /// Called when the store gains its first value or loses its last
    pub fn add_has_values_listener(&mut self, reaction: Reaction<ExistenceChange>) -> Result<ListenerId> {
        self.add_listener(StoreListenerKind::HasValues, &[], reaction)
    }

    /// Called once per commit that changed any value
    pub fn add_values_listener(&mut self, reaction: Reaction<()>) -> Result<ListenerId> {
        self.add_listener(StoreListenerKind::Values, &[], reaction)
    }

    /// Called when a value is created or removed
    pub fn add_value_ids_listener(&mut self, reaction: Reaction<()>) -> Result<ListenerId> {
        self.add_listener(StoreListenerKind::ValueIds, &[], reaction)
    }

    /// Called when a value starts or stops existing
    pub fn add_has_value_listener(
        &mut self,
        value_id: Option<&str>,
        reaction: Reaction<ExistenceChange>,
    ) -> Result<ListenerId> {
        self.add_listener(StoreListenerKind::HasValue, &[value_id], reaction)
    }

    /// Called with the old and new content of a changed value
    pub fn add_value_listener(
        &mut self,
        value_id: Option<&str>,
        reaction: Reaction<ValueChange>,
    ) -> Result<ListenerId> {
        self.add_listener(StoreListenerKind::Value, &[value_id], reaction)
    }

    /// Called with the value writes a commit rejected
    pub fn add_invalid_value_listener(
        &mut self,
        value_id: Option<&str>,
        reaction: Reaction<InvalidValueAttempt>,
    ) -> Result<ListenerId> {
        self.add_listener(StoreListenerKind::InvalidValue, &[value_id], reaction)
    }

    // ---- Transactions ----

    /// Called when the outermost transaction begins
    pub fn add_start_transaction_listener(
        &mut self,
        f: impl FnMut(&Store, &TransactionInfo) + 'static,
    ) -> Result<ListenerId> {
        self.add_listener(StoreListenerKind::StartTransaction, &[], Reaction::observe(f))
    }

    /// Called once mutators have settled or overflowed, before observers run
    pub fn add_will_finish_transaction_listener(
        &mut self,
        f: impl FnMut(&Store, &TransactionInfo) + 'static,
    ) -> Result<ListenerId> {
        self.add_listener(
            StoreListenerKind::WillFinishTransaction,
            &[],
            Reaction::observe(f),
        )
    }

    /// Called after every observer of the commit ran
    ///
    /// [`Store::transaction_changes`] still describes the committed
    /// transaction at this point.
    pub fn add_did_finish_transaction_listener(
        &mut self,
        f: impl FnMut(&Store, &TransactionInfo) + 'static,
    ) -> Result<ListenerId> {
        self.add_listener(
            StoreListenerKind::DidFinishTransaction,
            &[],
            Reaction::observe(f),
        )
    }
}
