//! Row links from a local table to a remote table through one cell
//!
//! A local row points at the remote row whose id is the string form of its
//! link cell. When the local and remote tables are the same, following the
//! links from a first row forms a linked list; its listeners must name both
//! the relationship and the first row.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::{Rc, Weak};

use serde::Serialize;

use crate::errors::Result;
use crate::listeners::{
    send, ConsumerCallback, ConsumerNotifications, DiagnosticSink, ListenerCategory,
    ListenerHost, ListenerId, ListenerRegistry, ListenerStats, PathPattern,
};
use crate::model::Id;
use crate::store::{Reaction, RowChange, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipsListenerKind {
    RemoteRowId,
    LocalRowIds,
    LinkedRowIds,
}

impl ListenerCategory for RelationshipsListenerKind {
    fn depth(&self) -> usize {
        2
    }

    fn required_leading_ids(&self) -> usize {
        match self {
            RelationshipsListenerKind::LinkedRowIds => 2,
            _ => 0,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            RelationshipsListenerKind::RemoteRowId => "remote_row_id",
            RelationshipsListenerKind::LocalRowIds => "local_row_ids",
            RelationshipsListenerKind::LinkedRowIds => "linked_row_ids",
        }
    }
}

/// A local row now points somewhere else (`None` is no remote row)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteRowIdChange {
    pub relationship_id: Id,
    pub local_row_id: Id,
    pub new: Option<Id>,
    pub old: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalRowIdsChange {
    pub relationship_id: Id,
    pub remote_row_id: Id,
    pub local_row_ids: Vec<Id>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkedRowIdsChange {
    pub relationship_id: Id,
    pub first_row_id: Id,
    pub row_ids: Vec<Id>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipEvent {
    RemoteRowId(RemoteRowIdChange),
    LocalRowIds(LocalRowIdsChange),
    LinkedRowIds(LinkedRowIdsChange),
}

type Notes = ConsumerNotifications<RelationshipsListenerKind, RelationshipEvent>;

#[derive(Debug)]
struct Definition {
    local_table_id: Id,
    remote_table_id: Id,
    cell_id: Id,
    store_listener: ListenerId,
    remote_of: BTreeMap<Id, Id>,
    locals_of: BTreeMap<Id, BTreeSet<Id>>,
}

impl Definition {
    fn remote_in_store(&self, store: &Store, local_row_id: &str) -> Option<Id> {
        store
            .get_cell(&self.local_table_id, local_row_id, &self.cell_id)
            .map(ToString::to_string)
    }

    fn local_row_ids(&self, remote_row_id: &str) -> Vec<Id> {
        self.locals_of
            .get(remote_row_id)
            .map(|locals| locals.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Point `local_row_id` at `remote`, returning the previous remote
    fn relink(&mut self, local_row_id: &str, remote: Option<Id>) -> Option<Id> {
        let old = match &remote {
            Some(remote) => self.remote_of.insert(local_row_id.to_string(), remote.clone()),
            None => self.remote_of.remove(local_row_id),
        };
        if let Some(old) = &old {
            if let Some(locals) = self.locals_of.get_mut(old) {
                locals.remove(local_row_id);
                if locals.is_empty() {
                    self.locals_of.remove(old);
                }
            }
        }
        if let Some(remote) = remote {
            self.locals_of
                .entry(remote)
                .or_default()
                .insert(local_row_id.to_string());
        }
        old
    }
}

/// Follow links from `first_row_id` until a row has none or a row repeats
fn linked_row_ids(definition: Option<&Definition>, first_row_id: &str) -> Vec<Id> {
    let mut row_ids = vec![first_row_id.to_string()];
    let Some(definition) = definition else {
        return row_ids;
    };
    let mut seen: BTreeSet<&str> = BTreeSet::from([first_row_id]);
    let mut next = definition.remote_of.get(first_row_id);
    while let Some(row_id) = next {
        if !seen.insert(row_id.as_str()) {
            break;
        }
        row_ids.push(row_id.clone());
        next = definition.remote_of.get(row_id);
    }
    row_ids
}

/// A linked list some listener is watching, with its last known rows
#[derive(Debug)]
struct WatchedList {
    listeners: usize,
    row_ids: Vec<Id>,
}

#[derive(Default)]
struct RelationshipsState {
    definitions: BTreeMap<Id, Definition>,
    watched: BTreeMap<(Id, Id), WatchedList>,
    watch_of: HashMap<ListenerId, (Id, Id)>,
    listeners: ListenerRegistry<RelationshipsListenerKind, ConsumerCallback<RelationshipEvent>>,
    sink: Option<Rc<dyn DiagnosticSink>>,
}

impl RelationshipsState {
    fn refresh(&mut self, relationship_id: &str, store: &Store, local_row_ids: &[Id]) -> Notes {
        let Some(definition) = self.definitions.get_mut(relationship_id) else {
            return Vec::new();
        };
        let mut changed = Vec::new();
        let mut touched_remotes = BTreeSet::new();
        for local_row_id in local_row_ids {
            let new = definition.remote_in_store(store, local_row_id);
            let old = definition.relink(local_row_id, new.clone());
            if old == new {
                continue;
            }
            touched_remotes.extend(old.iter().cloned());
            touched_remotes.extend(new.iter().cloned());
            changed.push((
                RelationshipsListenerKind::RemoteRowId,
                vec![relationship_id.to_string(), local_row_id.clone()],
                RelationshipEvent::RemoteRowId(RemoteRowIdChange {
                    relationship_id: relationship_id.to_string(),
                    local_row_id: local_row_id.clone(),
                    new,
                    old,
                }),
            ));
        }
        if changed.is_empty() {
            return Vec::new();
        }
        tracing::trace!(
            component = module_path!(),
            relationship_id,
            links = changed.len(),
            "relationship changed"
        );

        for remote_row_id in touched_remotes {
            let local_row_ids = definition.local_row_ids(&remote_row_id);
            changed.push((
                RelationshipsListenerKind::LocalRowIds,
                vec![relationship_id.to_string(), remote_row_id.clone()],
                RelationshipEvent::LocalRowIds(LocalRowIdsChange {
                    relationship_id: relationship_id.to_string(),
                    remote_row_id,
                    local_row_ids,
                }),
            ));
        }
        changed.extend(self.relist(relationship_id));
        self.listeners.notify(changed, None)
    }

    /// Recompute watched linked lists of one relationship
    fn relist(&mut self, relationship_id: &str) -> Vec<(RelationshipsListenerKind, Vec<Id>, RelationshipEvent)> {
        let definition = self.definitions.get(relationship_id);
        let mut changed = Vec::new();
        for ((rel, first), watched) in self.watched.iter_mut() {
            if rel != relationship_id {
                continue;
            }
            let row_ids = linked_row_ids(definition, first);
            if row_ids == watched.row_ids {
                continue;
            }
            watched.row_ids = row_ids.clone();
            changed.push((
                RelationshipsListenerKind::LinkedRowIds,
                vec![rel.clone(), first.clone()],
                RelationshipEvent::LinkedRowIds(LinkedRowIdsChange {
                    relationship_id: rel.clone(),
                    first_row_id: first.clone(),
                    row_ids,
                }),
            ));
        }
        changed
    }

    /// Unlink every local row of a relationship that is going away
    fn unlink_all(&mut self, relationship_id: &str) -> Notes {
        let Some(definition) = self.definitions.get(relationship_id) else {
            return Vec::new();
        };
        let mut changed = Vec::new();
        for (local_row_id, remote_row_id) in &definition.remote_of {
            changed.push((
                RelationshipsListenerKind::RemoteRowId,
                vec![relationship_id.to_string(), local_row_id.clone()],
                RelationshipEvent::RemoteRowId(RemoteRowIdChange {
                    relationship_id: relationship_id.to_string(),
                    local_row_id: local_row_id.clone(),
                    new: None,
                    old: Some(remote_row_id.clone()),
                }),
            ));
        }
        for remote_row_id in definition.locals_of.keys() {
            changed.push((
                RelationshipsListenerKind::LocalRowIds,
                vec![relationship_id.to_string(), remote_row_id.clone()],
                RelationshipEvent::LocalRowIds(LocalRowIdsChange {
                    relationship_id: relationship_id.to_string(),
                    remote_row_id: remote_row_id.clone(),
                    local_row_ids: Vec::new(),
                }),
            ));
        }
        self.definitions.remove(relationship_id);
        changed.extend(self.relist(relationship_id));
        self.listeners.notify(changed, None)
    }
}

impl ListenerHost for RelationshipsState {
    type Kind = RelationshipsListenerKind;
    type Event = RelationshipEvent;

    fn registry(
        &self,
    ) -> &ListenerRegistry<RelationshipsListenerKind, ConsumerCallback<RelationshipEvent>> {
        &self.listeners
    }

    fn sink(&self) -> Option<Rc<dyn DiagnosticSink>> {
        self.sink.clone()
    }
}

/// Named row links kept current as a store changes
///
/// Each definition registers a row listener on the store. Dropping a
/// `Relationships` stops its updates, but the registrations stay counted in
/// the store until [`Relationships::destroy`] removes them.
#[derive(Default)]
pub struct Relationships {
    state: Rc<RefCell<RelationshipsState>>,
}

impl Relationships {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define (or redefine) a relationship and link the current local rows
    ///
    /// Failing relationship listeners are reported to the store's diagnostic
    /// sink unless [`Relationships::set_diagnostic_sink`] chose another.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store rejects the listener registration.
    pub fn set_relationship_definition(
        &self,
        store: &mut Store,
        relationship_id: &str,
        local_table_id: &str,
        remote_table_id: &str,
        cell_id: &str,
    ) -> Result<()> {
        self.del_relationship_definition(store, relationship_id);

        let weak: Weak<RefCell<RelationshipsState>> = Rc::downgrade(&self.state);
        let watched = relationship_id.to_string();
        let store_listener = store.add_row_listener(
            Some(local_table_id),
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
                relationship_id.to_string(),
                Definition {
                    local_table_id: local_table_id.to_string(),
                    remote_table_id: remote_table_id.to_string(),
                    cell_id: cell_id.to_string(),
                    store_listener,
                    remote_of: BTreeMap::new(),
                    locals_of: BTreeMap::new(),
                },
            );
            tracing::debug!(
                component = module_path!(),
                relationship_id,
                local_table_id,
                remote_table_id,
                "relationship defined"
            );
            state.refresh(relationship_id, store, &store.get_row_ids(local_table_id))
        };
        send(&self.state, notes);
        Ok(())
    }

    /// Remove a relationship, notifying listeners of every link it dropped
    pub fn del_relationship_definition(&self, store: &mut Store, relationship_id: &str) {
        let notes = {
            let mut state = self.state.borrow_mut();
            let Some(store_listener) = state
                .definitions
                .get(relationship_id)
                .map(|d| d.store_listener)
            else {
                return;
            };
            store.del_listener(store_listener);
            state.unlink_all(relationship_id)
        };
        send(&self.state, notes);
    }

    pub fn get_relationship_ids(&self) -> Vec<Id> {
        self.state.borrow().definitions.keys().cloned().collect()
    }

    pub fn has_relationship(&self, relationship_id: &str) -> bool {
        self.state.borrow().definitions.contains_key(relationship_id)
    }

    pub fn get_local_table_id(&self, relationship_id: &str) -> Option<Id> {
        self.state
            .borrow()
            .definitions
            .get(relationship_id)
            .map(|d| d.local_table_id.clone())
    }

    pub fn get_remote_table_id(&self, relationship_id: &str) -> Option<Id> {
        self.state
            .borrow()
            .definitions
            .get(relationship_id)
            .map(|d| d.remote_table_id.clone())
    }

    pub fn get_remote_row_id(&self, relationship_id: &str, local_row_id: &str) -> Option<Id> {
        self.state
            .borrow()
            .definitions
            .get(relationship_id)
            .and_then(|d| d.remote_of.get(local_row_id).cloned())
    }

    /// Local rows pointing at `remote_row_id`, in id order
    pub fn get_local_row_ids(&self, relationship_id: &str, remote_row_id: &str) -> Vec<Id> {
        self.state
            .borrow()
            .definitions
            .get(relationship_id)
            .map(|d| d.local_row_ids(remote_row_id))
            .unwrap_or_default()
    }

    /// `first_row_id` followed by every row reached through its links
    ///
    /// Stops before a row that was already visited, so a cycle yields each
    /// of its rows once. An unknown relationship yields just the first row.
    pub fn get_linked_row_ids(&self, relationship_id: &str, first_row_id: &str) -> Vec<Id> {
        let state = self.state.borrow();
        linked_row_ids(state.definitions.get(relationship_id), first_row_id)
    }

    pub fn add_remote_row_id_listener(
        &self,
        relationship_id: Option<&str>,
        local_row_id: Option<&str>,
        mut f: impl FnMut(&RemoteRowIdChange) + 'static,
    ) -> Result<ListenerId> {
        self.register(
            RelationshipsListenerKind::RemoteRowId,
            &[relationship_id, local_row_id],
            move |event| {
                if let RelationshipEvent::RemoteRowId(change) = event {
                    f(change);
                }
            },
        )
    }

    pub fn add_local_row_ids_listener(
        &self,
        relationship_id: Option<&str>,
        remote_row_id: Option<&str>,
        mut f: impl FnMut(&LocalRowIdsChange) + 'static,
    ) -> Result<ListenerId> {
        self.register(
            RelationshipsListenerKind::LocalRowIds,
            &[relationship_id, remote_row_id],
            move |event| {
                if let RelationshipEvent::LocalRowIds(change) = event {
                    f(change);
                }
            },
        )
    }

    /// Listen to the linked list starting at `first_row_id`
    ///
    /// # Errors
    ///
    /// Returns `UnboundedPattern` if either id is a wildcard.
    pub fn add_linked_row_ids_listener(
        &self,
        relationship_id: Option<&str>,
        first_row_id: Option<&str>,
        mut f: impl FnMut(&LinkedRowIdsChange) + 'static,
    ) -> Result<ListenerId> {
        let id = self.register(
            RelationshipsListenerKind::LinkedRowIds,
            &[relationship_id, first_row_id],
            move |event| {
                if let RelationshipEvent::LinkedRowIds(change) = event {
                    f(change);
                }
            },
        )?;
        if let (Some(rel), Some(first)) = (relationship_id, first_row_id) {
            let mut state = self.state.borrow_mut();
            let key = (rel.to_string(), first.to_string());
            let row_ids = linked_row_ids(state.definitions.get(rel), first);
            state
                .watched
                .entry(key.clone())
                .or_insert(WatchedList {
                    listeners: 0,
                    row_ids,
                })
                .listeners += 1;
            state.watch_of.insert(id, key);
        }
        Ok(id)
    }

    pub fn del_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state.borrow_mut();
        if let Some(key) = state.watch_of.remove(&id) {
            if let Some(watched) = state.watched.get_mut(&key) {
                watched.listeners -= 1;
                if watched.listeners == 0 {
                    state.watched.remove(&key);
                }
            }
        }
        state.listeners.unregister(id)
    }

    pub fn get_listener_stats(&self) -> ListenerStats<RelationshipsListenerKind> {
        self.state.borrow().listeners.stats()
    }

    pub fn set_diagnostic_sink(&self, sink: Rc<dyn DiagnosticSink>) {
        self.state.borrow_mut().sink = Some(sink);
    }

    /// Remove every definition and its store listener
    pub fn destroy(&self, store: &mut Store) {
        for relationship_id in self.get_relationship_ids() {
            self.del_relationship_definition(store, &relationship_id);
        }
    }

    fn register(
        &self,
        kind: RelationshipsListenerKind,
        pattern: &[Option<&str>],
        f: impl FnMut(&RelationshipEvent) + 'static,
    ) -> Result<ListenerId> {
        let callback: ConsumerCallback<RelationshipEvent> = Rc::new(RefCell::new(f));
        self.state
            .borrow_mut()
            .listeners
            .register(kind, PathPattern::from_options(pattern), false, callback)
    }
}
