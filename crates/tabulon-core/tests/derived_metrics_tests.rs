//! Metrics Tests
//!
//! Aggregates stay current as rows change and notify their listeners only
//! when the aggregate moves.

mod common;

use std::rc::Rc;

use common::{new_log, pets_store, CollectingSink};
use tabulon_core::derived::{MetricChange, MetricsListenerKind};
use tabulon_core::{Aggregate, Metrics, Store};

fn sales_store() -> Store {
    let mut store = Store::new();
    for (id, amount) in [("a", 5.0), ("b", 2.0), ("c", 8.0)] {
        store.set_cell("sales", id, "amount", amount).unwrap();
    }
    store
}

#[test]
fn test_every_aggregate_over_existing_rows() {
    let mut store = sales_store();
    let metrics = Metrics::new();
    for (id, aggregate) in [
        ("count", Aggregate::Count),
        ("sum", Aggregate::Sum),
        ("avg", Aggregate::Avg),
        ("min", Aggregate::Min),
        ("max", Aggregate::Max),
    ] {
        metrics
            .set_metric_definition(&mut store, id, "sales", aggregate, Some("amount"))
            .unwrap();
    }

    assert_eq!(metrics.get_metric("count"), Some(3.0));
    assert_eq!(metrics.get_metric("sum"), Some(15.0));
    assert_eq!(metrics.get_metric("avg"), Some(5.0));
    assert_eq!(metrics.get_metric("min"), Some(2.0));
    assert_eq!(metrics.get_metric("max"), Some(8.0));
    assert_eq!(metrics.get_metric("missing"), None);
    assert_eq!(metrics.get_metric_ids().len(), 5);
}

#[test]
fn test_metric_follows_row_changes() {
    // GIVEN a max metric
    let mut store = sales_store();
    let metrics = Metrics::new();
    metrics
        .set_metric_definition(&mut store, "max", "sales", Aggregate::Max, Some("amount"))
        .unwrap();

    // WHEN the largest row is removed and a smaller one grows
    store.del_row("sales", "c").unwrap();
    assert_eq!(metrics.get_metric("max"), Some(5.0));
    store.set_cell("sales", "b", "amount", 6.5).unwrap();

    // THEN the metric tracked both
    assert_eq!(metrics.get_metric("max"), Some(6.5));

    // AND an emptied table has no metric
    store.del_table("sales").unwrap();
    assert_eq!(metrics.get_metric("max"), None);
}

#[test]
fn test_listener_fires_only_when_aggregate_moves() {
    // GIVEN a count metric and a listener on it
    let mut store = pets_store();
    let metrics = Metrics::new();
    metrics
        .set_metric_definition(&mut store, "pets", "pets", Aggregate::Count, None)
        .unwrap();
    let seen = new_log::<MetricChange>();
    let log = seen.clone();
    metrics
        .add_metric_listener(Some("pets"), move |change| log.borrow_mut().push(change.clone()))
        .unwrap();

    // WHEN an existing pet changes color, then a pet is added in a batch of edits
    store.set_cell("pets", "fido", "color", "white").unwrap();
    store
        .transaction(|s| {
            s.set_cell("pets", "rex", "species", "dog").unwrap();
            s.set_cell("pets", "rex", "color", "gold").unwrap();
        })
        .unwrap();

    // THEN one notification, for the new count
    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].old, Some(2.0));
    assert_eq!(seen[0].new, Some(3.0));
    assert_eq!(
        metrics.get_listener_stats().get(MetricsListenerKind::Metric),
        1
    );
}

#[test]
fn test_deleting_definition_notifies_and_unsubscribes() {
    let mut store = sales_store();
    let metrics = Metrics::new();
    metrics
        .set_metric_definition(&mut store, "sum", "sales", Aggregate::Sum, Some("amount"))
        .unwrap();
    let seen = new_log::<MetricChange>();
    let log = seen.clone();
    metrics
        .add_metric_listener(None, move |change| log.borrow_mut().push(change.clone()))
        .unwrap();

    metrics.del_metric_definition(&mut store, "sum");

    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(seen.borrow()[0].new, None);
    assert_eq!(store.get_listener_stats().total(), 0);
    assert!(metrics.get_table_id("sum").is_none());
}

#[test]
fn test_dropped_metrics_stop_updating() {
    let mut store = sales_store();
    {
        let metrics = Metrics::new();
        metrics
            .set_metric_definition(&mut store, "sum", "sales", Aggregate::Sum, Some("amount"))
            .unwrap();
    }
    // the store listener outlives the metrics object but does nothing
    store.set_cell("sales", "d", "amount", 1.0).unwrap();
    assert_eq!(store.get_row_count("sales"), 4);
}

#[test]
fn test_metric_listener_failures_follow_the_chosen_sink() {
    // GIVEN a store sink and a panicking metric listener
    let mut store = sales_store();
    let store_sink = Rc::new(CollectingSink::default());
    store.set_diagnostic_sink(store_sink.clone());
    let metrics = Metrics::new();
    metrics
        .set_metric_definition(&mut store, "max", "sales", Aggregate::Max, Some("amount"))
        .unwrap();
    metrics
        .add_metric_listener(Some("max"), |_| panic!("metric listener failed"))
        .unwrap();

    // WHEN the metric moves
    store.set_cell("sales", "d", "amount", 20.0).unwrap();

    // THEN the store's sink saw the failure
    assert_eq!(store_sink.failures.borrow().len(), 1);
    assert_eq!(store_sink.failures.borrow()[0].category, "metric");

    // AND after choosing another sink, only that one does
    let own_sink = Rc::new(CollectingSink::default());
    metrics.set_diagnostic_sink(own_sink.clone());
    store.set_cell("sales", "e", "amount", 30.0).unwrap();
    assert_eq!(store_sink.failures.borrow().len(), 1);
    assert_eq!(own_sink.failures.borrow().len(), 1);
}
