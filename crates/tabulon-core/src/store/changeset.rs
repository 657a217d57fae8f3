//! Net change tracking for one transaction
//!
//! Every write records the first old value and the latest new value of the
//! touched path, plus a footprint of the enclosing row and table taken just
//! before their first touch. At commit the footprints are compared with the
//! settled store to derive exactly one event per changed concrete path and
//! category. Paths whose old and new values are equal produce nothing.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use super::events::{
    CellChange, ExistenceChange, InvalidCellAttempt, InvalidValueAttempt, RowChange,
    RowCountChange, StoreEvent, StoreListenerKind, TableChange, ValueChange,
};
use crate::model::{CellValue, Changes, Id, Tables, Values};

/// Table id → cell id → number of rows holding that cell
pub(crate) type CellIdCounts = BTreeMap<Id, BTreeMap<Id, usize>>;

type CellKey = (Id, Id, Id);
type Delta = (Option<CellValue>, Option<CellValue>);

/// One resolved change, ready for the registry
pub(crate) type ChangedPath = (StoreListenerKind, Vec<Id>, StoreEvent);

#[derive(Debug, Clone)]
struct TableFootprint {
    row_count: usize,
    cell_ids: BTreeSet<Id>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ChangeSet {
    cells: BTreeMap<CellKey, Delta>,
    values: BTreeMap<Id, Delta>,
    tables_before: BTreeMap<Id, TableFootprint>,
    rows_before: BTreeMap<(Id, Id), bool>,
    had_tables: Option<bool>,
    had_values: Option<bool>,
    invalid_cells: BTreeMap<CellKey, Vec<CellValue>>,
    invalid_values: BTreeMap<Id, Vec<CellValue>>,
}

impl ChangeSet {
    /// Record a cell write; must be called before the write is applied
    pub(crate) fn record_cell(
        &mut self,
        tables: &Tables,
        counts: &CellIdCounts,
        path: (&str, &str, &str),
        old: Option<CellValue>,
        new: Option<CellValue>,
    ) {
        let (table_id, row_id, cell_id) = path;
        self.had_tables.get_or_insert(!tables.is_empty());
        if !self.tables_before.contains_key(table_id) {
            let footprint = TableFootprint {
                row_count: tables.get(table_id).map_or(0, |t| t.len()),
                cell_ids: counts
                    .get(table_id)
                    .map(|ids| ids.keys().cloned().collect())
                    .unwrap_or_default(),
            };
            self.tables_before.insert(table_id.to_string(), footprint);
        }
        self.rows_before
            .entry((table_id.to_string(), row_id.to_string()))
            .or_insert_with(|| tables.get(table_id).is_some_and(|t| t.contains_key(row_id)));

        let key = (table_id.to_string(), row_id.to_string(), cell_id.to_string());
        match self.cells.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert((old, new));
            }
            Entry::Occupied(mut entry) => entry.get_mut().1 = new,
        }
    }

    /// Record a value write; must be called before the write is applied
    pub(crate) fn record_value(
        &mut self,
        values: &Values,
        value_id: &str,
        old: Option<CellValue>,
        new: Option<CellValue>,
    ) {
        self.had_values.get_or_insert(!values.is_empty());
        match self.values.entry(value_id.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert((old, new));
            }
            Entry::Occupied(mut entry) => entry.get_mut().1 = new,
        }
    }

    pub(crate) fn record_invalid_cell(
        &mut self,
        table_id: &str,
        row_id: &str,
        cell_id: &str,
        attempt: CellValue,
    ) {
        self.invalid_cells
            .entry((table_id.to_string(), row_id.to_string(), cell_id.to_string()))
            .or_default()
            .push(attempt);
    }

    pub(crate) fn record_invalid_value(&mut self, value_id: &str, attempt: CellValue) {
        self.invalid_values
            .entry(value_id.to_string())
            .or_default()
            .push(attempt);
    }

    fn net_cells(&self) -> impl Iterator<Item = (&CellKey, &Delta)> {
        self.cells.iter().filter(|(_, (old, new))| old != new)
    }

    fn net_values(&self) -> impl Iterator<Item = (&Id, &Delta)> {
        self.values.iter().filter(|(_, (old, new))| old != new)
    }

    pub(crate) fn cells_changed(&self) -> usize {
        self.net_cells().count()
    }

    pub(crate) fn values_changed(&self) -> usize {
        self.net_values().count()
    }

    /// Derive the changed paths of every category against the settled state
    pub(crate) fn events(
        &self,
        tables: &Tables,
        values: &Values,
        counts: &CellIdCounts,
    ) -> Vec<ChangedPath> {
        let mut out = Vec::new();

        for ((t, r, c), attempts) in &self.invalid_cells {
            out.push((
                StoreListenerKind::InvalidCell,
                vec![t.clone(), r.clone(), c.clone()],
                StoreEvent::InvalidCell(InvalidCellAttempt {
                    table_id: t.clone(),
                    row_id: r.clone(),
                    cell_id: c.clone(),
                    attempts: attempts.clone(),
                }),
            ));
        }
        for (v, attempts) in &self.invalid_values {
            out.push((
                StoreListenerKind::InvalidValue,
                vec![v.clone()],
                StoreEvent::InvalidValue(InvalidValueAttempt {
                    value_id: v.clone(),
                    attempts: attempts.clone(),
                }),
            ));
        }

        self.table_events(tables, counts, &mut out);
        self.value_events(values, &mut out);
        out
    }

    fn table_events(&self, tables: &Tables, counts: &CellIdCounts, out: &mut Vec<ChangedPath>) {
        let mut changed_rows: BTreeSet<(&Id, &Id)> = BTreeSet::new();
        let mut cell_ids_rows: BTreeSet<(&Id, &Id)> = BTreeSet::new();

        for ((t, r, c), (old, new)) in self.net_cells() {
            changed_rows.insert((t, r));
            if old.is_some() != new.is_some() {
                cell_ids_rows.insert((t, r));
                out.push((
                    StoreListenerKind::HasCell,
                    vec![t.clone(), r.clone(), c.clone()],
                    existence(vec![t.clone(), r.clone(), c.clone()], new.is_some()),
                ));
            }
            out.push((
                StoreListenerKind::Cell,
                vec![t.clone(), r.clone(), c.clone()],
                StoreEvent::Cell(CellChange {
                    table_id: t.clone(),
                    row_id: r.clone(),
                    cell_id: c.clone(),
                    new: new.clone(),
                    old: old.clone(),
                }),
            ));
        }
        if changed_rows.is_empty() {
            return;
        }

        for (t, r) in &cell_ids_rows {
            out.push((
                StoreListenerKind::CellIds,
                vec![(*t).clone(), (*r).clone()],
                row_event(t, r),
            ));
        }

        let mut changed_tables: BTreeSet<&Id> = BTreeSet::new();
        let mut row_ids_tables: BTreeSet<&Id> = BTreeSet::new();
        for (t, r) in &changed_rows {
            changed_tables.insert(*t);
            let existed = self
                .rows_before
                .get(&((*t).clone(), (*r).clone()))
                .copied()
                .unwrap_or(false);
            let exists = tables.get(*t).is_some_and(|table| table.contains_key(*r));
            if existed != exists {
                row_ids_tables.insert(*t);
                out.push((
                    StoreListenerKind::HasRow,
                    vec![(*t).clone(), (*r).clone()],
                    existence(vec![(*t).clone(), (*r).clone()], exists),
                ));
            }
            out.push((
                StoreListenerKind::Row,
                vec![(*t).clone(), (*r).clone()],
                row_event(t, r),
            ));
        }

        for t in &row_ids_tables {
            out.push((StoreListenerKind::RowIds, vec![(*t).clone()], table_event(t)));
        }

        let mut table_ids_changed = false;
        for t in &changed_tables {
            let row_count = tables.get(*t).map_or(0, |table| table.len());
            let (count_before, ids_before) = match self.tables_before.get(*t) {
                Some(fp) => (fp.row_count, Some(&fp.cell_ids)),
                None => (0, None),
            };
            if count_before != row_count {
                out.push((
                    StoreListenerKind::RowCount,
                    vec![(*t).clone()],
                    StoreEvent::RowCount(RowCountChange {
                        table_id: (*t).clone(),
                        count: row_count,
                    }),
                ));
            }
            if (count_before > 0) != (row_count > 0) {
                table_ids_changed = true;
                out.push((
                    StoreListenerKind::HasTable,
                    vec![(*t).clone()],
                    existence(vec![(*t).clone()], row_count > 0),
                ));
            }
            let ids_now = counts.get(*t).into_iter().flat_map(|ids| ids.keys());
            let ids_same = match ids_before {
                Some(before) => before.iter().eq(ids_now),
                None => ids_now.count() == 0,
            };
            if !ids_same {
                out.push((
                    StoreListenerKind::TableCellIds,
                    vec![(*t).clone()],
                    table_event(t),
                ));
            }
            out.push((StoreListenerKind::Table, vec![(*t).clone()], table_event(t)));
        }

        if table_ids_changed {
            out.push((StoreListenerKind::TableIds, Vec::new(), StoreEvent::Unit));
        }
        out.push((StoreListenerKind::Tables, Vec::new(), StoreEvent::Unit));
        let has_tables = !tables.is_empty();
        if self.had_tables.is_some_and(|had| had != has_tables) {
            out.push((
                StoreListenerKind::HasTables,
                Vec::new(),
                existence(Vec::new(), has_tables),
            ));
        }
    }

    fn value_events(&self, values: &Values, out: &mut Vec<ChangedPath>) {
        let mut any = false;
        let mut ids_changed = false;
        for (v, (old, new)) in self.net_values() {
            any = true;
            if old.is_some() != new.is_some() {
                ids_changed = true;
                out.push((
                    StoreListenerKind::HasValue,
                    vec![v.clone()],
                    existence(vec![v.clone()], new.is_some()),
                ));
            }
            out.push((
                StoreListenerKind::Value,
                vec![v.clone()],
                StoreEvent::Value(ValueChange {
                    value_id: v.clone(),
                    new: new.clone(),
                    old: old.clone(),
                }),
            ));
        }
        if !any {
            return;
        }
        if ids_changed {
            out.push((StoreListenerKind::ValueIds, Vec::new(), StoreEvent::Unit));
        }
        out.push((StoreListenerKind::Values, Vec::new(), StoreEvent::Unit));
        let has_values = !values.is_empty();
        if self.had_values.is_some_and(|had| had != has_values) {
            out.push((
                StoreListenerKind::HasValues,
                Vec::new(),
                existence(Vec::new(), has_values),
            ));
        }
    }
}

fn existence(path: Vec<Id>, exists: bool) -> StoreEvent {
    StoreEvent::Existence(ExistenceChange { path, exists })
}

fn table_event(table_id: &Id) -> StoreEvent {
    StoreEvent::Table(TableChange {
        table_id: table_id.clone(),
    })
}

fn row_event(table_id: &Id, row_id: &Id) -> StoreEvent {
    StoreEvent::Row(RowChange {
        table_id: table_id.clone(),
        row_id: row_id.clone(),
    })
}

/// Net changes of the transaction being committed
///
/// Obtained from [`Store::transaction_changes`](super::Store::transaction_changes);
/// most useful from did-finish listeners. Outside a commit it is empty.
#[derive(Debug, Clone, Copy)]
pub struct TransactionChanges<'a> {
    set: &'a ChangeSet,
}

impl<'a> TransactionChanges<'a> {
    pub(crate) fn new(set: &'a ChangeSet) -> Self {
        Self { set }
    }

    /// Check if the transaction made no net change
    pub fn is_empty(&self) -> bool {
        self.set.net_cells().next().is_none() && self.set.net_values().next().is_none()
    }

    /// Net cell changes, in path order
    pub fn cells(&self) -> Vec<CellChange> {
        self.set
            .net_cells()
            .map(|((t, r, c), (old, new))| CellChange {
                table_id: t.clone(),
                row_id: r.clone(),
                cell_id: c.clone(),
                new: new.clone(),
                old: old.clone(),
            })
            .collect()
    }

    /// Net value changes, in id order
    pub fn values(&self) -> Vec<ValueChange> {
        self.set
            .net_values()
            .map(|(v, (old, new))| ValueChange {
                value_id: v.clone(),
                new: new.clone(),
                old: old.clone(),
            })
            .collect()
    }

    /// The changes as a replayable change-set
    pub fn to_changes(&self) -> Changes {
        self.collect_side(|(_, new)| new.clone())
    }

    /// The change-set that undoes this transaction
    pub fn to_inverse(&self) -> Changes {
        self.collect_side(|(old, _)| old.clone())
    }

    fn collect_side(&self, side: impl Fn(&Delta) -> Option<CellValue>) -> Changes {
        let mut changes = Changes::new();
        for ((t, r, c), delta) in self.set.net_cells() {
            changes.set_cell(t, r, c, side(delta));
        }
        for (v, delta) in self.set.net_values() {
            changes.set_value(v, side(delta));
        }
        changes
    }
}
