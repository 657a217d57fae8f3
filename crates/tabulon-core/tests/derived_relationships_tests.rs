//! Relationships Tests
//!
//! Local rows link to remote rows through a cell; the links and their
//! reverse index stay current, and linked lists notify their listeners.

mod common;

use common::{new_log, pets_store};
use tabulon_core::derived::{LinkedRowIdsChange, LocalRowIdsChange, RemoteRowIdChange};
use tabulon_core::{Relationships, Store, StoreError};

fn owned_pets() -> (Store, Relationships) {
    let mut store = pets_store();
    store.set_cell("pets", "fido", "owner", "alice").unwrap();
    store.set_cell("pets", "felix", "owner", "bob").unwrap();
    store.set_cell("people", "alice", "age", 30).unwrap();
    store.set_cell("people", "bob", "age", 40).unwrap();
    let relationships = Relationships::new();
    relationships
        .set_relationship_definition(&mut store, "owner", "pets", "people", "owner")
        .unwrap();
    (store, relationships)
}

#[test]
fn test_links_from_existing_rows() {
    let (_store, relationships) = owned_pets();

    assert_eq!(
        relationships.get_remote_row_id("owner", "fido"),
        Some("alice".to_string())
    );
    assert_eq!(relationships.get_local_row_ids("owner", "bob"), vec!["felix"]);
    assert!(relationships.get_local_row_ids("owner", "carol").is_empty());
    assert_eq!(relationships.get_local_table_id("owner").as_deref(), Some("pets"));
    assert_eq!(relationships.get_remote_table_id("owner").as_deref(), Some("people"));
}

#[test]
fn test_relinking_updates_both_directions_and_notifies() {
    // GIVEN listeners on fido's link and on every remote row
    let (mut store, relationships) = owned_pets();
    let remote = new_log::<RemoteRowIdChange>();
    let log = remote.clone();
    relationships
        .add_remote_row_id_listener(Some("owner"), Some("fido"), move |change| {
            log.borrow_mut().push(change.clone())
        })
        .unwrap();
    let locals = new_log::<LocalRowIdsChange>();
    let log = locals.clone();
    relationships
        .add_local_row_ids_listener(Some("owner"), None, move |change| {
            log.borrow_mut().push(change.clone())
        })
        .unwrap();

    // WHEN fido moves to bob
    store.set_cell("pets", "fido", "owner", "bob").unwrap();

    // THEN the forward and reverse maps agree
    assert_eq!(
        relationships.get_remote_row_id("owner", "fido"),
        Some("bob".to_string())
    );
    assert_eq!(
        relationships.get_local_row_ids("owner", "bob"),
        vec!["felix", "fido"]
    );
    assert!(relationships.get_local_row_ids("owner", "alice").is_empty());

    // AND the listeners saw one link change and two remote rows change
    let remote = remote.borrow();
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].old.as_deref(), Some("alice"));
    assert_eq!(remote[0].new.as_deref(), Some("bob"));
    let locals = locals.borrow();
    assert_eq!(locals.len(), 2);
    assert_eq!(locals[0].remote_row_id, "alice");
    assert!(locals[0].local_row_ids.is_empty());
    assert_eq!(locals[1].remote_row_id, "bob");
}

#[test]
fn test_unrelated_cell_change_is_silent() {
    let (mut store, relationships) = owned_pets();
    let remote = new_log::<RemoteRowIdChange>();
    let log = remote.clone();
    relationships
        .add_remote_row_id_listener(None, None, move |change| log.borrow_mut().push(change.clone()))
        .unwrap();

    store.set_cell("pets", "fido", "color", "white").unwrap();

    assert!(remote.borrow().is_empty());
}

#[test]
fn test_deleted_local_row_is_unlinked() {
    let (mut store, relationships) = owned_pets();

    store.del_row("pets", "fido").unwrap();

    assert_eq!(relationships.get_remote_row_id("owner", "fido"), None);
    assert!(relationships.get_local_row_ids("owner", "alice").is_empty());
}

#[test]
fn test_linked_list_listener() {
    // GIVEN a chain a -> b in one table
    let mut store = Store::new();
    let relationships = Relationships::new();
    relationships
        .set_relationship_definition(&mut store, "next", "steps", "steps", "next")
        .unwrap();
    store.set_cell("steps", "a", "next", "b").unwrap();
    let seen = new_log::<LinkedRowIdsChange>();
    let log = seen.clone();
    relationships
        .add_linked_row_ids_listener(Some("next"), Some("a"), move |change| {
            log.borrow_mut().push(change.clone())
        })
        .unwrap();

    // WHEN the chain grows, and an unrelated link is made
    store.set_cell("steps", "b", "next", "c").unwrap();
    store.set_cell("steps", "x", "next", "y").unwrap();

    // THEN only the growth was reported
    assert_eq!(relationships.get_linked_row_ids("next", "a"), vec!["a", "b", "c"]);
    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].row_ids, vec!["a", "b", "c"]);
}

#[test]
fn test_linked_list_listener_needs_concrete_ids() {
    let relationships = Relationships::new();
    let err = relationships
        .add_linked_row_ids_listener(None, None, |_| {})
        .unwrap_err();
    assert!(matches!(err, StoreError::UnboundedPattern { required: 2, .. }));
}

#[test]
fn test_deleting_definition_unlinks_everything() {
    let (mut store, relationships) = owned_pets();
    let remote = new_log::<RemoteRowIdChange>();
    let log = remote.clone();
    relationships
        .add_remote_row_id_listener(Some("owner"), None, move |change| {
            log.borrow_mut().push(change.clone())
        })
        .unwrap();

    relationships.del_relationship_definition(&mut store, "owner");

    assert_eq!(remote.borrow().len(), 2);
    assert!(remote.borrow().iter().all(|change| change.new.is_none()));
    assert!(!relationships.has_relationship("owner"));
    assert_eq!(relationships.get_remote_row_id("owner", "fido"), None);
    assert_eq!(store.get_listener_stats().total(), 0);
}
