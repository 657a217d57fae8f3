use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;

use super::path::PathPattern;
use super::tree::PathTree;
use crate::errors::{Result, StoreError};

/// Handle returned by every listener registration
///
/// Ids are handed out in increasing order, so sorting by id yields
/// registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A kind of listener with a fixed pattern shape
pub trait ListenerCategory: Copy + Eq + Hash + Ord + fmt::Debug {
    /// Number of segments a pattern for this category has
    fn depth(&self) -> usize;

    /// Number of leading segments that must be concrete ids
    fn required_leading_ids(&self) -> usize {
        0
    }

    /// Stable snake_case name used in errors and logs
    fn name(&self) -> &'static str;
}

struct Registration<K, C> {
    category: K,
    pattern: PathPattern,
    mutator: bool,
    callback: C,
}

/// One resolved (listener, event) pair ready to be invoked
pub struct Notification<K, C, E> {
    pub id: ListenerId,
    pub category: K,
    pub callback: C,
    pub event: E,
}

/// Active-listener counts per category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerStats<K: Ord> {
    counts: BTreeMap<K, usize>,
}

impl<K: Ord + Copy> ListenerStats<K> {
    pub fn get(&self, category: K) -> usize {
        self.counts.get(&category).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, usize)> + '_ {
        self.counts.iter().map(|(k, v)| (*k, *v))
    }
}

/// Path-pattern listener registry
///
/// Generic over the category type `K` and the callback handle `C`, so the
/// store, the checkpoint stack and each derived object own an instance of
/// the same structure. Callbacks are cloned out on resolution; `C` is
/// expected to be a cheap handle such as an `Rc`.
pub struct ListenerRegistry<K, C> {
    next_id: u64,
    mutators: usize,
    registrations: BTreeMap<ListenerId, Registration<K, C>>,
    trees: HashMap<K, PathTree>,
}

impl<K, C> Default for ListenerRegistry<K, C> {
    fn default() -> Self {
        Self {
            next_id: 0,
            mutators: 0,
            registrations: BTreeMap::new(),
            trees: HashMap::new(),
        }
    }
}

impl<K: ListenerCategory, C: Clone> ListenerRegistry<K, C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for a category and pattern
    ///
    /// # Errors
    ///
    /// Returns `InvalidPattern` if the pattern has the wrong number of
    /// segments for the category, or `UnboundedPattern` if it has fewer
    /// leading concrete ids than the category requires.
    pub fn register(
        &mut self,
        category: K,
        pattern: PathPattern,
        mutator: bool,
        callback: C,
    ) -> Result<ListenerId> {
        if pattern.len() != category.depth() {
            return Err(StoreError::InvalidPattern {
                category: category.name().to_string(),
                expected: category.depth(),
                actual: pattern.len(),
            });
        }
        let required = category.required_leading_ids();
        if pattern.leading_ids() < required {
            return Err(StoreError::UnboundedPattern {
                category: category.name().to_string(),
                required,
            });
        }

        let id = ListenerId(self.next_id);
        self.next_id += 1;
        if mutator {
            self.mutators += 1;
        }
        self.trees
            .entry(category)
            .or_default()
            .insert(pattern.segments(), id);
        self.registrations.insert(
            id,
            Registration {
                category,
                pattern,
                mutator,
                callback,
            },
        );
        Ok(id)
    }

    /// Remove a registration; unknown ids are ignored
    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let Some(registration) = self.registrations.remove(&id) else {
            return false;
        };
        if registration.mutator {
            self.mutators -= 1;
        }
        if let Some(tree) = self.trees.get_mut(&registration.category) {
            tree.remove(registration.pattern.segments(), id);
            if tree.is_empty() {
                self.trees.remove(&registration.category);
            }
        }
        true
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.registrations.contains_key(&id)
    }

    pub fn category(&self, id: ListenerId) -> Option<K> {
        self.registrations.get(&id).map(|r| r.category)
    }

    pub fn pattern(&self, id: ListenerId) -> Option<&PathPattern> {
        self.registrations.get(&id).map(|r| &r.pattern)
    }

    pub fn is_mutator(&self, id: ListenerId) -> Option<bool> {
        self.registrations.get(&id).map(|r| r.mutator)
    }

    pub fn has_mutators(&self) -> bool {
        self.mutators > 0
    }

    /// Whether any listener at all is registered for `category`
    pub fn has_listeners(&self, category: K) -> bool {
        self.trees.contains_key(&category)
    }

    /// Listeners whose pattern in `category` matches a concrete path
    pub fn resolve<S: AsRef<str>>(&self, category: K, path: &[S]) -> BTreeSet<ListenerId> {
        let mut out = BTreeSet::new();
        if let Some(tree) = self.trees.get(&category) {
            tree.collect(path, &mut out);
        }
        out
    }

    /// Resolve a batch of changed paths into ordered notifications
    ///
    /// Each `(category, path, event)` entry yields one notification per
    /// matching listener. `mutators` restricts the result to mutator
    /// (`Some(true)`) or observer (`Some(false)`) registrations. The result
    /// is ordered by listener id, then by the position of the entry in
    /// `changed`.
    pub fn notify<E, S, I>(&self, changed: I, mutators: Option<bool>) -> Vec<Notification<K, C, E>>
    where
        E: Clone,
        S: AsRef<str>,
        I: IntoIterator<Item = (K, Vec<S>, E)>,
    {
        let mut resolved = Vec::new();
        for (seq, (category, path, event)) in changed.into_iter().enumerate() {
            for id in self.resolve(category, &path) {
                let Some(registration) = self.registrations.get(&id) else {
                    continue;
                };
                if mutators.is_some_and(|m| m != registration.mutator) {
                    continue;
                }
                resolved.push((
                    seq,
                    Notification {
                        id,
                        category,
                        callback: registration.callback.clone(),
                        event: event.clone(),
                    },
                ));
            }
        }
        resolved.sort_by_key(|(seq, n)| (n.id, *seq));
        resolved.into_iter().map(|(_, n)| n).collect()
    }

    pub fn stats(&self) -> ListenerStats<K> {
        let mut counts = BTreeMap::new();
        for registration in self.registrations.values() {
            *counts.entry(registration.category).or_insert(0) += 1;
        }
        ListenerStats { counts }
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
