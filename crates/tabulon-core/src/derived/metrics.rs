//! Aggregates over one cell of every row in a table
//!
//! Each metric keeps the number contributed by each row, so a row change
//! only touches that row's entry. Rows whose cell is missing or not a number
//! contribute nothing. Count without a cell id counts every row.
//!
//! ```
//! use tabulon_core::derived::{Aggregate, Metrics};
//! use tabulon_core::store::Store;
//!
//! let mut store = Store::new();
//! let metrics = Metrics::new();
//! metrics
//!     .set_metric_definition(&mut store, "total", "sales", Aggregate::Sum, Some("amount"))
//!     .unwrap();
//!
//! store.set_cell("sales", "a", "amount", 3.0).unwrap();
//! store.set_cell("sales", "b", "amount", 4.5).unwrap();
//! assert_eq!(metrics.get_metric("total"), Some(7.5));
//! ```

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::listeners::{
    send, ConsumerCallback, ConsumerNotifications, DiagnosticSink, ListenerCategory,
    ListenerHost, ListenerId, ListenerRegistry, ListenerStats, PathPattern,
};
use crate::model::Id;
use crate::store::{Reaction, RowChange, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsListenerKind {
    Metric,
}

impl ListenerCategory for MetricsListenerKind {
    fn depth(&self) -> usize {
        1
    }

    fn name(&self) -> &'static str {
        "metric"
    }
}

/// A metric's aggregate moved; `None` means there is nothing to aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricChange {
    pub metric_id: Id,
    pub new: Option<f64>,
    pub old: Option<f64>,
}

type Notes = ConsumerNotifications<MetricsListenerKind, MetricChange>;

/// Total-ordered key so numbers can live in a multiset
#[derive(Debug, Clone, Copy)]
struct Number(f64);

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Number {}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug)]
struct Definition {
    table_id: Id,
    cell_id: Option<Id>,
    aggregate: Aggregate,
    store_listener: ListenerId,
    numbers: BTreeMap<Id, f64>,
    sorted: BTreeMap<Number, usize>,
    sum: f64,
    value: Option<f64>,
}

impl Definition {
    fn number_of(&self, store: &Store, row_id: &str) -> Option<f64> {
        match &self.cell_id {
            Some(cell_id) => store
                .get_cell(&self.table_id, row_id, cell_id)
                .and_then(|v| v.as_number()),
            None => store.has_row(&self.table_id, row_id).then_some(1.0),
        }
    }

    fn update_row(&mut self, row_id: &str, number: Option<f64>) {
        let old = match number {
            Some(n) => self.numbers.insert(row_id.to_string(), n),
            None => self.numbers.remove(row_id),
        };
        if old == number {
            return;
        }
        if let Some(old) = old {
            self.sum -= old;
            if let Some(count) = self.sorted.get_mut(&Number(old)) {
                *count -= 1;
                if *count == 0 {
                    self.sorted.remove(&Number(old));
                }
            }
        }
        if let Some(new) = number {
            self.sum += new;
            *self.sorted.entry(Number(new)).or_insert(0) += 1;
        }
    }

    fn aggregate(&self) -> Option<f64> {
        let count = self.numbers.len();
        if count == 0 {
            return None;
        }
        match self.aggregate {
            Aggregate::Count => Some(count as f64),
            Aggregate::Sum => Some(self.sum),
            Aggregate::Avg => Some(self.sum / count as f64),
            Aggregate::Min => self.sorted.keys().next().map(|n| n.0),
            Aggregate::Max => self.sorted.keys().next_back().map(|n| n.0),
        }
    }
}

#[derive(Default)]
struct MetricsState {
    definitions: BTreeMap<Id, Definition>,
    listeners: ListenerRegistry<MetricsListenerKind, ConsumerCallback<MetricChange>>,
    sink: Option<Rc<dyn DiagnosticSink>>,
}

impl MetricsState {
    fn refresh(&mut self, metric_id: &str, store: &Store, row_ids: &[Id]) -> Notes {
        let Some(definition) = self.definitions.get_mut(metric_id) else {
            return Vec::new();
        };
        for row_id in row_ids {
            let number = definition.number_of(store, row_id);
            definition.update_row(row_id, number);
        }
        let old = definition.value;
        let new = definition.aggregate();
        if old == new {
            return Vec::new();
        }
        definition.value = new;
        tracing::trace!(
            component = module_path!(),
            metric_id,
            ?new,
            "metric changed"
        );
        self.changed(metric_id, new, old)
    }

    fn changed(&self, metric_id: &str, new: Option<f64>, old: Option<f64>) -> Notes {
        self.listeners.notify(
            [(
                MetricsListenerKind::Metric,
                vec![metric_id.to_string()],
                MetricChange {
                    metric_id: metric_id.to_string(),
                    new,
                    old,
                },
            )],
            None,
        )
    }
}

impl ListenerHost for MetricsState {
    type Kind = MetricsListenerKind;
    type Event = MetricChange;

    fn registry(&self) -> &ListenerRegistry<MetricsListenerKind, ConsumerCallback<MetricChange>> {
        &self.listeners
    }

    fn sink(&self) -> Option<Rc<dyn DiagnosticSink>> {
        self.sink.clone()
    }
}

/// Named aggregates kept current as a store changes
///
/// Definitions take the store they aggregate over; one `Metrics` may span
/// several tables of the same store. Dropping a `Metrics` stops its updates,
/// but its row listeners stay registered in the store until
/// [`Metrics::destroy`] removes them.
#[derive(Default)]
pub struct Metrics {
    state: Rc<RefCell<MetricsState>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define (or redefine) a metric and compute it from the current rows
    ///
    /// Failing metric listeners are reported to the store's diagnostic sink
    /// unless [`Metrics::set_diagnostic_sink`] chose another.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store rejects the listener registration.
    pub fn set_metric_definition(
        &self,
        store: &mut Store,
        metric_id: &str,
        table_id: &str,
        aggregate: Aggregate,
        cell_id: Option<&str>,
    ) -> Result<()> {
        let previous = self.state.borrow_mut().definitions.remove(metric_id);
        let previous_value = previous.as_ref().and_then(|d| d.value);
        if let Some(previous) = previous {
            store.del_listener(previous.store_listener);
        }

        let weak: Weak<RefCell<MetricsState>> = Rc::downgrade(&self.state);
        let watched = metric_id.to_string();
        let store_listener = store.add_row_listener(
            Some(table_id),
            None,
            Reaction::observe(move |store: &Store, change: &RowChange| {
                let Some(state) = weak.upgrade() else {
                    return;
                };
                let notes = match state.try_borrow_mut() {
                    Ok(mut inner) => {
                        inner.refresh(&watched, store, std::slice::from_ref(&change.row_id))
                    }
                    Err(_) => return,
                };
                send(&state, notes);
            }),
        )?;

        let notes = {
            let mut state = self.state.borrow_mut();
            state.sink.get_or_insert_with(|| store.diagnostic_sink());
            state.definitions.insert(
                metric_id.to_string(),
                Definition {
                    table_id: table_id.to_string(),
                    cell_id: cell_id.map(str::to_string),
                    aggregate,
                    store_listener,
                    numbers: BTreeMap::new(),
                    sorted: BTreeMap::new(),
                    sum: 0.0,
                    value: previous_value,
                },
            );
            tracing::debug!(
                component = module_path!(),
                metric_id,
                table_id,
                ?aggregate,
                "metric defined"
            );
            state.refresh(metric_id, store, &store.get_row_ids(table_id))
        };
        send(&self.state, notes);
        Ok(())
    }

    /// Remove a metric, notifying its listeners if it had a value
    pub fn del_metric_definition(&self, store: &mut Store, metric_id: &str) {
        let notes = {
            let mut state = self.state.borrow_mut();
            let Some(definition) = state.definitions.remove(metric_id) else {
                return;
            };
            store.del_listener(definition.store_listener);
            match definition.value {
                Some(old) => state.changed(metric_id, None, Some(old)),
                None => Vec::new(),
            }
        };
        send(&self.state, notes);
    }

    pub fn get_metric(&self, metric_id: &str) -> Option<f64> {
        self.state
            .borrow()
            .definitions
            .get(metric_id)
            .and_then(|d| d.value)
    }

    pub fn get_metric_ids(&self) -> Vec<Id> {
        self.state.borrow().definitions.keys().cloned().collect()
    }

    pub fn has_metric(&self, metric_id: &str) -> bool {
        self.state.borrow().definitions.contains_key(metric_id)
    }

    pub fn get_table_id(&self, metric_id: &str) -> Option<Id> {
        self.state
            .borrow()
            .definitions
            .get(metric_id)
            .map(|d| d.table_id.clone())
    }

    /// Listen to one metric, or every metric with `None`
    pub fn add_metric_listener(
        &self,
        metric_id: Option<&str>,
        f: impl FnMut(&MetricChange) + 'static,
    ) -> Result<ListenerId> {
        let callback: ConsumerCallback<MetricChange> = Rc::new(RefCell::new(f));
        self.state.borrow_mut().listeners.register(
            MetricsListenerKind::Metric,
            PathPattern::from_options(&[metric_id]),
            false,
            callback,
        )
    }

    pub fn del_listener(&self, id: ListenerId) -> bool {
        self.state.borrow_mut().listeners.unregister(id)
    }

    pub fn get_listener_stats(&self) -> ListenerStats<MetricsListenerKind> {
        self.state.borrow().listeners.stats()
    }

    pub fn set_diagnostic_sink(&self, sink: Rc<dyn DiagnosticSink>) {
        self.state.borrow_mut().sink = Some(sink);
    }

    /// Remove every definition and its store listener
    pub fn destroy(&self, store: &mut Store) {
        for metric_id in self.get_metric_ids() {
            self.del_metric_definition(store, &metric_id);
        }
    }
}
