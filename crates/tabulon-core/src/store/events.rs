//! Listener categories and the events delivered to store listeners

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use tabulon_core_types::TransactionId;

use super::Store;
use crate::listeners::ListenerCategory;
use crate::model::{CellValue, Id};

/// Category of a store listener
///
/// The category fixes the shape of the pattern a listener registers with and
/// the event type it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreListenerKind {
    HasTables,
    Tables,
    TableIds,
    HasTable,
    Table,
    TableCellIds,
    RowIds,
    RowCount,
    HasRow,
    Row,
    CellIds,
    HasCell,
    Cell,
    HasValues,
    Values,
    ValueIds,
    HasValue,
    Value,
    InvalidCell,
    InvalidValue,
    StartTransaction,
    WillFinishTransaction,
    DidFinishTransaction,
}

impl ListenerCategory for StoreListenerKind {
    fn depth(&self) -> usize {
        use StoreListenerKind::*;
        match self {
            HasTables | Tables | TableIds | HasValues | Values | ValueIds | StartTransaction
            | WillFinishTransaction | DidFinishTransaction => 0,
            HasTable | Table | TableCellIds | RowIds | RowCount | HasValue | Value
            | InvalidValue => 1,
            HasRow | Row | CellIds => 2,
            HasCell | Cell | InvalidCell => 3,
        }
    }

    fn name(&self) -> &'static str {
        use StoreListenerKind::*;
        match self {
            HasTables => "has_tables",
            Tables => "tables",
            TableIds => "table_ids",
            HasTable => "has_table",
            Table => "table",
            TableCellIds => "table_cell_ids",
            RowIds => "row_ids",
            RowCount => "row_count",
            HasRow => "has_row",
            Row => "row",
            CellIds => "cell_ids",
            HasCell => "has_cell",
            Cell => "cell",
            HasValues => "has_values",
            Values => "values",
            ValueIds => "value_ids",
            HasValue => "has_value",
            Value => "value",
            InvalidCell => "invalid_cell",
            InvalidValue => "invalid_value",
            StartTransaction => "start_transaction",
            WillFinishTransaction => "will_finish_transaction",
            DidFinishTransaction => "did_finish_transaction",
        }
    }
}

/// Something started or stopped existing
///
/// `path` is the concrete path of the node: empty for the whole tables or
/// values section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExistenceChange {
    pub path: Vec<Id>,
    pub exists: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableChange {
    pub table_id: Id,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowCountChange {
    pub table_id: Id,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowChange {
    pub table_id: Id,
    pub row_id: Id,
}

/// Net change of one cell; `None` means absent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellChange {
    pub table_id: Id,
    pub row_id: Id,
    pub cell_id: Id,
    pub new: Option<CellValue>,
    pub old: Option<CellValue>,
}

/// Net change of one value; `None` means absent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueChange {
    pub value_id: Id,
    pub new: Option<CellValue>,
    pub old: Option<CellValue>,
}

/// Rejected writes to one cell path during a transaction, in attempt order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidCellAttempt {
    pub table_id: Id,
    pub row_id: Id,
    pub cell_id: Id,
    pub attempts: Vec<CellValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidValueAttempt {
    pub value_id: Id,
    pub attempts: Vec<CellValue>,
}

/// Passed to transaction listeners
///
/// The counts are net changes and are zero for start-transaction listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionInfo {
    pub id: TransactionId,
    pub depth: usize,
    pub cells_changed: usize,
    pub values_changed: usize,
}

impl TransactionInfo {
    /// Check if the transaction changed any cell or value
    pub fn changed(&self) -> bool {
        self.cells_changed > 0 || self.values_changed > 0
    }
}

/// Any event a store listener can receive
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Unit,
    Existence(ExistenceChange),
    Table(TableChange),
    RowCount(RowCountChange),
    Row(RowChange),
    Cell(CellChange),
    Value(ValueChange),
    InvalidCell(InvalidCellAttempt),
    InvalidValue(InvalidValueAttempt),
    Transaction(TransactionInfo),
}

/// Typed view of a [`StoreEvent`]
pub trait EventPayload: Sized + 'static {
    fn from_event(event: &StoreEvent) -> Option<&Self>;
}

impl EventPayload for () {
    fn from_event(event: &StoreEvent) -> Option<&Self> {
        match event {
            StoreEvent::Unit => Some(&()),
            _ => None,
        }
    }
}

macro_rules! event_payload {
    ($ty:ty, $variant:ident) => {
        impl EventPayload for $ty {
            fn from_event(event: &StoreEvent) -> Option<&Self> {
                match event {
                    StoreEvent::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

event_payload!(ExistenceChange, Existence);
event_payload!(TableChange, Table);
event_payload!(RowCountChange, RowCount);
event_payload!(RowChange, Row);
event_payload!(CellChange, Cell);
event_payload!(ValueChange, Value);
event_payload!(InvalidCellAttempt, InvalidCell);
event_payload!(InvalidValueAttempt, InvalidValue);
event_payload!(TransactionInfo, Transaction);

pub(crate) type ObserveFn = dyn FnMut(&Store, &StoreEvent);
pub(crate) type MutateFn = dyn FnMut(&mut Store, &StoreEvent);

/// Callback handle held by the store's registry
#[derive(Clone)]
pub(crate) enum Callback {
    Observe(Rc<RefCell<ObserveFn>>),
    Mutate(Rc<RefCell<MutateFn>>),
}

/// What a listener does when notified
///
/// Observers see the settled store after all mutators ran. Mutators run
/// first, receive `&mut Store`, and their writes are folded into the same
/// commit.
pub enum Reaction<E> {
    Observe(Box<dyn FnMut(&Store, &E)>),
    Mutate(Box<dyn FnMut(&mut Store, &E)>),
}

impl<E: EventPayload> Reaction<E> {
    pub fn observe(f: impl FnMut(&Store, &E) + 'static) -> Self {
        Reaction::Observe(Box::new(f))
    }

    pub fn mutate(f: impl FnMut(&mut Store, &E) + 'static) -> Self {
        Reaction::Mutate(Box::new(f))
    }

    pub fn is_mutator(&self) -> bool {
        matches!(self, Reaction::Mutate(_))
    }

    pub(crate) fn into_callback(self) -> Callback {
        match self {
            Reaction::Observe(mut f) => {
                let cb: Rc<RefCell<ObserveFn>> =
                    Rc::new(RefCell::new(move |store: &Store, event: &StoreEvent| {
                        if let Some(payload) = E::from_event(event) {
                            f(store, payload);
                        }
                    }));
                Callback::Observe(cb)
            }
            Reaction::Mutate(mut f) => {
                let cb: Rc<RefCell<MutateFn>> =
                    Rc::new(RefCell::new(move |store: &mut Store, event: &StoreEvent| {
                        if let Some(payload) = E::from_event(event) {
                            f(store, payload);
                        }
                    }));
                Callback::Mutate(cb)
            }
        }
    }
}
