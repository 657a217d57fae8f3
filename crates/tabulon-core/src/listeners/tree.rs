//! Segment-keyed tree of registrations
//!
//! Every level holds a map of concrete-id branches and at most one wildcard
//! branch. Resolving a concrete path walks the matching concrete branch and
//! the wildcard branch at each level, so the cost depends on the number of
//! patterns that can match, not on the number of registrations.

use std::collections::{BTreeSet, HashMap};

use super::path::Segment;
use super::registry::ListenerId;

#[derive(Debug, Default)]
pub(crate) struct PathTree {
    listeners: BTreeSet<ListenerId>,
    children: HashMap<String, PathTree>,
    wildcard: Option<Box<PathTree>>,
}

impl PathTree {
    pub(crate) fn insert(&mut self, segments: &[Segment], id: ListenerId) {
        match segments.split_first() {
            None => {
                self.listeners.insert(id);
            }
            Some((Segment::Id(key), rest)) => self
                .children
                .entry(key.clone())
                .or_default()
                .insert(rest, id),
            Some((Segment::Any, rest)) => self
                .wildcard
                .get_or_insert_with(Box::default)
                .insert(rest, id),
        }
    }

    /// Remove a registration, pruning branches left empty
    pub(crate) fn remove(&mut self, segments: &[Segment], id: ListenerId) -> bool {
        match segments.split_first() {
            None => self.listeners.remove(&id),
            Some((Segment::Id(key), rest)) => {
                let Some(child) = self.children.get_mut(key) else {
                    return false;
                };
                let removed = child.remove(rest, id);
                if child.is_empty() {
                    self.children.remove(key);
                }
                removed
            }
            Some((Segment::Any, rest)) => {
                let Some(child) = self.wildcard.as_mut() else {
                    return false;
                };
                let removed = child.remove(rest, id);
                if child.is_empty() {
                    self.wildcard = None;
                }
                removed
            }
        }
    }

    /// Collect every listener whose pattern matches `path`
    ///
    /// The set dedups listeners reachable through more than one branch.
    pub(crate) fn collect<S: AsRef<str>>(&self, path: &[S], out: &mut BTreeSet<ListenerId>) {
        match path.split_first() {
            None => out.extend(self.listeners.iter().copied()),
            Some((id, rest)) => {
                if let Some(child) = self.children.get(id.as_ref()) {
                    child.collect(rest, out);
                }
                if let Some(child) = &self.wildcard {
                    child.collect(rest, out);
                }
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.listeners.is_empty() && self.children.is_empty() && self.wildcard.is_none()
    }
}
