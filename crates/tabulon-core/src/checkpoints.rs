//! Linear undo/redo over a store
//!
//! The stack is `(backward, current, forward)`: backward ids oldest first,
//! forward ids nearest first. Each checkpoint keeps the net delta that led
//! to it from its predecessor, so moving backward replays the old side of
//! the current checkpoint's delta and moving forward replays the new side of
//! the next one. Navigation runs as a single store transaction while the
//! stack ignores its own changes.
//!
//! ```
//! use tabulon_core::checkpoints::Checkpoints;
//! use tabulon_core::store::Store;
//!
//! let mut store = Store::new();
//! let checkpoints = Checkpoints::new(&mut store).unwrap();
//!
//! store.set_cell("pets", "fido", "sold", false).unwrap();
//! checkpoints.add_checkpoint(Some("sale"));
//! checkpoints.go_backward(&mut store).unwrap();
//! assert!(!store.has_tables());
//! checkpoints.go_forward(&mut store).unwrap();
//! assert!(store.has_cell("pets", "fido", "sold"));
//! ```

use std::cell::RefCell;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};

use serde::Serialize;

use crate::config::CheckpointsConfig;
use crate::errors::{Result, StoreError};
use crate::listeners::{
    send, ConsumerCallback, ConsumerNotifications, DiagnosticSink, ListenerCategory,
    ListenerHost, ListenerId, ListenerRegistry, ListenerStats, PathPattern,
};
use crate::model::{CellValue, Changes, Id};
use crate::store::{Store, TransactionChanges};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointListenerKind {
    CheckpointIds,
    Checkpoint,
}

impl ListenerCategory for CheckpointListenerKind {
    fn depth(&self) -> usize {
        match self {
            CheckpointListenerKind::CheckpointIds => 0,
            CheckpointListenerKind::Checkpoint => 1,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            CheckpointListenerKind::CheckpointIds => "checkpoint_ids",
            CheckpointListenerKind::Checkpoint => "checkpoint",
        }
    }
}

/// Position of every checkpoint in the stack
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CheckpointIds {
    pub backward: Vec<Id>,
    pub current: Option<Id>,
    pub forward: Vec<Id>,
}

/// A checkpoint was relabelled or removed (`label` is `None` when removed)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointChange {
    pub checkpoint_id: Id,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointEvent {
    Ids(CheckpointIds),
    Checkpoint(CheckpointChange),
}

type Notes = ConsumerNotifications<CheckpointListenerKind, CheckpointEvent>;

#[derive(Debug, Clone, Default)]
struct Delta {
    cells: BTreeMap<(Id, Id, Id), (Option<CellValue>, Option<CellValue>)>,
    values: BTreeMap<Id, (Option<CellValue>, Option<CellValue>)>,
}

impl Delta {
    fn merge(&mut self, changes: TransactionChanges<'_>) {
        for cell in changes.cells() {
            match self.cells.entry((cell.table_id, cell.row_id, cell.cell_id)) {
                Entry::Vacant(entry) => {
                    entry.insert((cell.old, cell.new));
                }
                Entry::Occupied(mut entry) => entry.get_mut().1 = cell.new,
            }
        }
        for value in changes.values() {
            match self.values.entry(value.value_id) {
                Entry::Vacant(entry) => {
                    entry.insert((value.old, value.new));
                }
                Entry::Occupied(mut entry) => entry.get_mut().1 = value.new,
            }
        }
    }

    /// Drop paths that ended up where they started
    fn settle(&mut self) {
        self.cells.retain(|_, (old, new)| old != new);
        self.values.retain(|_, (old, new)| old != new);
    }

    fn undo(&self) -> Changes {
        self.side(|(old, _)| old.clone())
    }

    fn redo(&self) -> Changes {
        self.side(|(_, new)| new.clone())
    }

    fn side(
        &self,
        pick: impl Fn(&(Option<CellValue>, Option<CellValue>)) -> Option<CellValue>,
    ) -> Changes {
        let mut changes = Changes::new();
        for ((t, r, c), delta) in &self.cells {
            changes.set_cell(t, r, c, pick(delta));
        }
        for (v, delta) in &self.values {
            changes.set_value(v, pick(delta));
        }
        changes
    }
}

struct CheckpointState {
    config: CheckpointsConfig,
    backward: Vec<Id>,
    current: Option<Id>,
    forward: Vec<Id>,
    deltas: HashMap<Id, Delta>,
    labels: HashMap<Id, String>,
    pending: Delta,
    next_id: u64,
    listening: bool,
    listeners: ListenerRegistry<CheckpointListenerKind, ConsumerCallback<CheckpointEvent>>,
    sink: Option<Rc<dyn DiagnosticSink>>,
}

impl CheckpointState {
    fn new(config: CheckpointsConfig) -> Self {
        Self {
            config,
            backward: Vec::new(),
            current: None,
            forward: Vec::new(),
            deltas: HashMap::new(),
            labels: HashMap::new(),
            pending: Delta::default(),
            next_id: 0,
            listening: true,
            listeners: ListenerRegistry::new(),
            sink: None,
        }
    }

    fn ids(&self) -> CheckpointIds {
        CheckpointIds {
            backward: self.backward.clone(),
            current: self.current.clone(),
            forward: self.forward.clone(),
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.deltas.contains_key(id)
    }

    /// A store transaction committed
    fn record(&mut self, changes: TransactionChanges<'_>) -> Notes {
        if !self.listening || changes.is_empty() {
            return Vec::new();
        }
        self.pending.merge(changes);
        let mut notes = Vec::new();
        if let Some(current) = self.current.take() {
            self.backward.push(current);
            self.drop_forward(&mut notes);
            self.trim(&mut notes);
            notes.extend(self.ids_changed());
        }
        notes
    }

    fn add_checkpoint(&mut self, label: &str) -> (Id, Notes) {
        let mut notes = Vec::new();
        let id = if let Some(id) = self.current.clone() {
            id
        } else {
            let id = self.next_id.to_string();
            self.next_id += 1;
            let mut delta = std::mem::take(&mut self.pending);
            delta.settle();
            self.deltas.insert(id.clone(), delta);
            self.labels.insert(id.clone(), String::new());
            self.current = Some(id.clone());
            tracing::debug!(
                component = module_path!(),
                checkpoint_id = id.as_str(),
                "checkpoint added"
            );
            self.trim(&mut notes);
            notes.extend(self.ids_changed());
            id
        };
        if !label.is_empty() {
            notes.extend(self.set_label(&id, label));
        }
        (id, notes)
    }

    fn set_label(&mut self, id: &str, label: &str) -> Notes {
        match self.labels.get_mut(id) {
            Some(existing) if existing.as_str() != label => {
                *existing = label.to_string();
                self.checkpoint_changed(id, Some(label.to_string()))
            }
            _ => Vec::new(),
        }
    }

    fn remove(&mut self, id: &str, notes: &mut Notes) {
        self.deltas.remove(id);
        self.labels.remove(id);
        notes.extend(self.checkpoint_changed(id, None));
    }

    fn drop_forward(&mut self, notes: &mut Notes) {
        for id in std::mem::take(&mut self.forward) {
            self.remove(&id, notes);
        }
    }

    /// Evict the oldest backward checkpoints beyond the configured size
    fn trim(&mut self, notes: &mut Notes) {
        let excess = self.backward.len().saturating_sub(self.config.size);
        for id in self.backward.drain(..excess).collect::<Vec<_>>() {
            self.remove(&id, notes);
        }
    }

    fn clear(&mut self) -> Notes {
        let mut notes = Vec::new();
        let ids: Vec<Id> = self.deltas.keys().cloned().collect();
        for id in ids {
            self.remove(&id, &mut notes);
        }
        self.backward.clear();
        self.forward.clear();
        self.current = None;
        self.pending = Delta::default();
        self.next_id = 0;
        let (_, added) = self.add_checkpoint("");
        notes.extend(added);
        notes
    }

    /// Deltas to replay for a move of `steps` (negative is backward)
    fn plan(&self, steps: isize) -> Vec<Changes> {
        if steps < 0 {
            let path = self.current.iter().chain(self.backward.iter().rev());
            path.take(steps.unsigned_abs().min(self.backward.len()))
                .filter_map(|id| self.deltas.get(id))
                .map(Delta::undo)
                .collect()
        } else {
            self.forward
                .iter()
                .take(steps.unsigned_abs())
                .filter_map(|id| self.deltas.get(id))
                .map(Delta::redo)
                .collect()
        }
    }

    /// Move the cursor after `applied` deltas of a plan were replayed
    fn shift(&mut self, backward: bool, applied: usize) -> Notes {
        if applied == 0 {
            return Vec::new();
        }
        for _ in 0..applied {
            if backward {
                let Some(previous) = self.backward.pop() else { break };
                if let Some(current) = self.current.replace(previous) {
                    self.forward.insert(0, current);
                }
            } else {
                if self.forward.is_empty() {
                    break;
                }
                let next = self.forward.remove(0);
                if let Some(current) = self.current.replace(next) {
                    self.backward.push(current);
                }
            }
        }
        self.ids_changed()
    }

    fn ids_changed(&self) -> Notes {
        self.listeners.notify(
            [(
                CheckpointListenerKind::CheckpointIds,
                Vec::<Id>::new(),
                CheckpointEvent::Ids(self.ids()),
            )],
            None,
        )
    }

    fn checkpoint_changed(&self, id: &str, label: Option<String>) -> Notes {
        self.listeners.notify(
            [(
                CheckpointListenerKind::Checkpoint,
                vec![id.to_string()],
                CheckpointEvent::Checkpoint(CheckpointChange {
                    checkpoint_id: id.to_string(),
                    label,
                }),
            )],
            None,
        )
    }
}

impl ListenerHost for CheckpointState {
    type Kind = CheckpointListenerKind;
    type Event = CheckpointEvent;

    fn registry(&self) -> &ListenerRegistry<CheckpointListenerKind, ConsumerCallback<CheckpointEvent>> {
        &self.listeners
    }

    fn sink(&self) -> Option<Rc<dyn DiagnosticSink>> {
        self.sink.clone()
    }
}

/// Undo/redo stack attached to one store
///
/// Navigation methods take the same store the stack was created with.
/// Dropping the stack stops recording, but its did-finish listener stays
/// registered in the store until [`Checkpoints::detach`] removes it.
pub struct Checkpoints {
    state: Rc<RefCell<CheckpointState>>,
    store_listener: ListenerId,
}

impl Checkpoints {
    /// Attach a stack to `store`, starting at checkpoint `"0"`
    ///
    /// # Errors
    ///
    /// Returns an error only if the store rejects the listener registration.
    pub fn new(store: &mut Store) -> Result<Self> {
        Self::with_config(store, CheckpointsConfig::default())
    }

    /// # Errors
    ///
    /// Returns an error only if the store rejects the listener registration.
    pub fn with_config(store: &mut Store, config: CheckpointsConfig) -> Result<Self> {
        let state = Rc::new(RefCell::new(CheckpointState::new(config)));
        state.borrow_mut().sink = Some(store.diagnostic_sink());
        state.borrow_mut().add_checkpoint("");

        let weak: Weak<RefCell<CheckpointState>> = Rc::downgrade(&state);
        let store_listener = store.add_did_finish_transaction_listener(move |store, _| {
            let Some(state) = weak.upgrade() else {
                return;
            };
            let notes = match state.try_borrow_mut() {
                Ok(mut inner) => inner.record(store.transaction_changes()),
                Err(_) => return,
            };
            send(&state, notes);
        })?;

        Ok(Self {
            state,
            store_listener,
        })
    }

    /// Checkpoint the current content, returning its id
    ///
    /// If nothing changed since the current checkpoint, its id is returned
    /// and only the label is applied.
    pub fn add_checkpoint(&self, label: Option<&str>) -> Id {
        let (id, notes) = self.state.borrow_mut().add_checkpoint(label.unwrap_or(""));
        send(&self.state, notes);
        id
    }

    /// Relabel a checkpoint; unknown ids are ignored
    pub fn set_checkpoint(&self, checkpoint_id: &str, label: &str) {
        let notes = self.state.borrow_mut().set_label(checkpoint_id, label);
        send(&self.state, notes);
    }

    /// Label of a checkpoint, `""` if never set, `None` if it does not exist
    pub fn get_checkpoint(&self, checkpoint_id: &str) -> Option<String> {
        self.state.borrow().labels.get(checkpoint_id).cloned()
    }

    pub fn has_checkpoint(&self, checkpoint_id: &str) -> bool {
        self.state.borrow().contains(checkpoint_id)
    }

    pub fn get_checkpoint_ids(&self) -> CheckpointIds {
        self.state.borrow().ids()
    }

    pub fn size(&self) -> usize {
        self.state.borrow().config.size
    }

    /// Change the maximum backward length, evicting the oldest if needed
    pub fn set_size(&self, size: usize) {
        let notes = {
            let mut state = self.state.borrow_mut();
            state.config.size = size;
            let mut notes = Vec::new();
            state.trim(&mut notes);
            if !notes.is_empty() {
                notes.extend(state.ids_changed());
            }
            notes
        };
        send(&self.state, notes);
    }

    /// Undo to the previous checkpoint
    ///
    /// Uncheckpointed changes are checkpointed first so they can be redone.
    /// Does nothing at the oldest checkpoint.
    ///
    /// # Errors
    ///
    /// Returns `TransactionOpen` if the store is inside a transaction, or the
    /// store's error if replaying the delta fails.
    pub fn go_backward(&self, store: &mut Store) -> Result<()> {
        self.move_by(store, "go_backward", Some(-1))
    }

    /// Redo to the next checkpoint; does nothing if there is none
    ///
    /// # Errors
    ///
    /// Returns `TransactionOpen` if the store is inside a transaction, or the
    /// store's error if replaying the delta fails.
    pub fn go_forward(&self, store: &mut Store) -> Result<()> {
        self.move_by(store, "go_forward", Some(1))
    }

    /// Move to any existing checkpoint; unknown ids are ignored
    ///
    /// # Errors
    ///
    /// Returns `TransactionOpen` if the store is inside a transaction, or the
    /// store's error if replaying the deltas fails.
    pub fn go_to(&self, store: &mut Store, checkpoint_id: &str) -> Result<()> {
        if store.is_in_transaction() {
            return Err(StoreError::TransactionOpen {
                op: "go_to".to_string(),
            });
        }
        if !self.has_checkpoint(checkpoint_id) {
            return Ok(());
        }
        self.capture_pending();
        let steps = {
            let state = self.state.borrow();
            if state.current.as_deref() == Some(checkpoint_id) {
                None
            } else if let Some(pos) = state.backward.iter().position(|id| id == checkpoint_id) {
                Some(-((state.backward.len() - pos) as isize))
            } else {
                state
                    .forward
                    .iter()
                    .position(|id| id == checkpoint_id)
                    .map(|pos| (pos + 1) as isize)
            }
        };
        self.move_by(store, "go_to", steps)
    }

    /// Drop all history, keeping the current content as checkpoint `"0"`
    pub fn clear(&self) {
        let notes = self.state.borrow_mut().clear();
        send(&self.state, notes);
    }

    /// Drop every redoable checkpoint
    pub fn clear_forward(&self) {
        let notes = {
            let mut state = self.state.borrow_mut();
            if state.forward.is_empty() {
                return;
            }
            let mut notes = Vec::new();
            state.drop_forward(&mut notes);
            notes.extend(state.ids_changed());
            notes
        };
        send(&self.state, notes);
    }

    /// Report failing checkpoint listeners to `sink` instead of the store's
    pub fn set_diagnostic_sink(&self, sink: Rc<dyn DiagnosticSink>) {
        self.state.borrow_mut().sink = Some(sink);
    }

    /// Stop recording changes of `store`
    pub fn detach(&self, store: &mut Store) {
        store.del_listener(self.store_listener);
    }

    pub fn add_checkpoint_ids_listener(
        &self,
        mut f: impl FnMut(&CheckpointIds) + 'static,
    ) -> Result<ListenerId> {
        let callback: ConsumerCallback<CheckpointEvent> =
            Rc::new(RefCell::new(move |event: &CheckpointEvent| {
                if let CheckpointEvent::Ids(ids) = event {
                    f(ids);
                }
            }));
        self.state.borrow_mut().listeners.register(
            CheckpointListenerKind::CheckpointIds,
            PathPattern::root(),
            false,
            callback,
        )
    }

    /// Listen to relabelling and removal of one checkpoint, or any with `None`
    pub fn add_checkpoint_listener(
        &self,
        checkpoint_id: Option<&str>,
        mut f: impl FnMut(&CheckpointChange) + 'static,
    ) -> Result<ListenerId> {
        let callback: ConsumerCallback<CheckpointEvent> =
            Rc::new(RefCell::new(move |event: &CheckpointEvent| {
                if let CheckpointEvent::Checkpoint(change) = event {
                    f(change);
                }
            }));
        self.state.borrow_mut().listeners.register(
            CheckpointListenerKind::Checkpoint,
            PathPattern::from_options(&[checkpoint_id]),
            false,
            callback,
        )
    }

    pub fn del_listener(&self, id: ListenerId) -> bool {
        self.state.borrow_mut().listeners.unregister(id)
    }

    pub fn get_listener_stats(&self) -> ListenerStats<CheckpointListenerKind> {
        self.state.borrow().listeners.stats()
    }

    fn capture_pending(&self) {
        let notes = {
            let mut state = self.state.borrow_mut();
            if state.current.is_some() {
                return;
            }
            state.add_checkpoint("").1
        };
        send(&self.state, notes);
    }

    fn move_by(&self, store: &mut Store, op: &str, steps: Option<isize>) -> Result<()> {
        if store.is_in_transaction() {
            return Err(StoreError::TransactionOpen { op: op.to_string() });
        }
        let Some(steps) = steps.filter(|s| *s != 0) else {
            return Ok(());
        };
        if steps < 0 {
            self.capture_pending();
        }

        let plan = {
            let mut state = self.state.borrow_mut();
            let plan = state.plan(steps);
            if plan.is_empty() {
                return Ok(());
            }
            state.listening = false;
            plan
        };

        let replayed = store.transaction(|s| {
            let mut applied = 0;
            for changes in &plan {
                if let Err(err) = s.apply_changes(changes) {
                    return (applied, Err(err));
                }
                applied += 1;
            }
            (applied, Ok(()))
        });

        let notes = {
            let mut state = self.state.borrow_mut();
            state.listening = true;
            let applied = replayed.as_ref().map_or(plan.len(), |(applied, _)| *applied);
            state.shift(steps < 0, applied)
        };
        send(&self.state, notes);
        tracing::debug!(
            component = module_path!(),
            op,
            steps,
            "checkpoint navigation"
        );

        let (_, step_result) = replayed?;
        step_result
    }
}
