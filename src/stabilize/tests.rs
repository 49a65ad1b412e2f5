use std::rc::Rc;

use crate::{Aggregate, Records, View, ViewCache};

fn records(values: &[i32]) -> Records<i32> {
    Records::from_values(values.iter().map(|v| Rc::new(*v)).collect())
}

#[test]
fn ready_stores_and_serves_records() {
    let mut cache = ViewCache::new();
    let view = cache.stabilize(&Aggregate::Ready(records(&[1, 2])));
    assert!(!view.is_error());
    assert!(!view.is_refreshing());
    let values: Vec<i32> = view.records().unwrap().iter().copied().collect();
    assert_eq!(values, [1, 2]);
}

#[test]
fn loading_before_first_ready_has_no_records() {
    let mut cache = ViewCache::<i32>::new();
    let view = cache.stabilize(&Aggregate::Loading);
    assert!(view.records().is_none());
    assert!(view.is_refreshing());
    assert!(view.is_loading());
}

#[test]
fn loading_after_ready_serves_cached_records_verbatim() {
    let mut cache = ViewCache::new();
    let ready = cache.stabilize(&Aggregate::Ready(records(&[1, 2])));
    let refreshing = cache.stabilize(&Aggregate::Loading);
    assert!(refreshing.is_refreshing());
    assert!(!refreshing.is_loading());
    assert!(Records::ptr_eq(
        ready.records().unwrap(),
        refreshing.records().unwrap()
    ));
}

#[test]
fn errored_keeps_cached_records_and_flags_error() {
    let mut cache = ViewCache::new();
    cache.stabilize(&Aggregate::Ready(records(&[1])));
    let view = cache.stabilize(&Aggregate::Errored);
    assert!(view.is_error());
    assert!(!view.is_refreshing());
    let values: Vec<i32> = view.records().unwrap().iter().copied().collect();
    assert_eq!(values, [1]);
}

#[test]
fn errored_before_first_ready_has_no_records() {
    let mut cache = ViewCache::<i32>::new();
    let view = cache.stabilize(&Aggregate::Errored);
    assert!(view.is_error());
    assert!(view.records().is_none());
}

#[test]
fn equal_ready_content_keeps_cached_allocation() {
    let mut cache = ViewCache::new();
    let first = cache.stabilize(&Aggregate::Ready(records(&[1, 2])));
    let second = cache.stabilize(&Aggregate::Ready(records(&[1, 2])));
    assert!(Records::ptr_eq(
        first.records().unwrap(),
        second.records().unwrap()
    ));
}

#[test]
fn changed_ready_content_replaces_cache() {
    let mut cache = ViewCache::new();
    let first = cache.stabilize(&Aggregate::Ready(records(&[1, 2])));
    let second = cache.stabilize(&Aggregate::Ready(records(&[1, 3])));
    assert!(!Records::ptr_eq(
        first.records().unwrap(),
        second.records().unwrap()
    ));
    let values: Vec<i32> = second.records().unwrap().iter().copied().collect();
    assert_eq!(values, [1, 3]);
}

#[test]
fn clear_forgets_records() {
    let mut cache = ViewCache::new();
    cache.stabilize(&Aggregate::Ready(records(&[1])));
    cache.clear();
    let view = cache.stabilize(&Aggregate::Loading);
    assert!(view.records().is_none());
}

#[test]
fn views_compare_by_content() {
    let mut a = ViewCache::new();
    let mut b = ViewCache::new();
    let left = a.stabilize(&Aggregate::Ready(records(&[1])));
    let right = b.stabilize(&Aggregate::Ready(records(&[1])));
    assert_eq!(left, right);
    let refreshing = b.stabilize(&Aggregate::Loading);
    assert_ne!(left, refreshing);
}

#[test]
fn serialize_view() {
    let mut cache = ViewCache::new();
    let view = cache.stabilize(&Aggregate::Ready(records(&[1, 2])));
    let value = serde_json::to_value(&view).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "records": [1, 2],
            "is_error": false,
            "is_refreshing": false,
        })
    );
}

#[test]
fn detached_view_is_empty() {
    let view = View::<i32>::detached();
    assert!(view.records().is_none());
    assert!(!view.is_error());
    assert!(!view.is_loading());
}
