use super::*;
use serde_json::json;

fn rec(value: serde_json::Value) -> AnnotationRecord {
    AnnotationRecord::from_value(value).unwrap()
}

// =============================================================================
// IdRegistry
// =============================================================================

#[test]
fn first_id_is_a000001() {
    let mut reg = IdRegistry::new();
    assert_eq!(reg.new_id(), "a000001");
}

#[test]
fn ids_are_monotonic() {
    let mut reg = IdRegistry::new();
    let a = reg.new_id();
    let b = reg.new_id();
    let c = reg.new_id();
    assert_eq!((a.as_str(), b.as_str(), c.as_str()), ("a000001", "a000002", "a000003"));
}

#[test]
fn group_ids_share_counter() {
    let mut reg = IdRegistry::new();
    assert_eq!(reg.new_id(), "a000001");
    assert_eq!(reg.new_group_id(), "g000002");
    assert_eq!(reg.new_id(), "a000003");
}

#[test]
fn observe_advances_past_generated_shape() {
    let mut reg = IdRegistry::new();
    reg.observe("a000010");
    assert_eq!(reg.new_id(), "a000011");
}

#[test]
fn observe_never_moves_backward() {
    let mut reg = IdRegistry::new();
    reg.observe("g000020");
    reg.observe("a000005");
    assert_eq!(reg.new_id(), "a000021");
}

#[test]
fn observe_ignores_foreign_ids() {
    let mut reg = IdRegistry::new();
    reg.observe("box-7");
    reg.observe("a");
    reg.observe("a12x");
    reg.observe("");
    assert_eq!(reg.new_id(), "a000001");
}

#[test]
fn default_matches_new() {
    let mut reg = IdRegistry::default();
    assert_eq!(reg.new_id(), "a000001");
}

// =============================================================================
// IdIndex
// =============================================================================

#[test]
fn rebuild_indexes_positions() {
    let records = vec![
        rec(json!({"id": "a000001", "kind": "rect"})),
        rec(json!({"id": "a000002", "kind": "line"})),
    ];
    let mut index = IdIndex::new();
    index.rebuild(&records);
    assert_eq!(index.get("a000001"), Some(0));
    assert_eq!(index.get("a000002"), Some(1));
    assert_eq!(index.len(), 2);
}

#[test]
fn rebuild_skips_records_without_id() {
    let records = vec![
        rec(json!({"kind": "rect"})),
        rec(json!({"id": "", "kind": "rect"})),
        rec(json!({"id": 7, "kind": "rect"})),
        rec(json!({"id": "a000003", "kind": "rect"})),
    ];
    let mut index = IdIndex::new();
    index.rebuild(&records);
    assert_eq!(index.len(), 1);
    assert_eq!(index.get("a000003"), Some(3));
}

#[test]
fn rebuild_keeps_first_duplicate() {
    let records = vec![
        rec(json!({"id": "a000001", "kind": "rect"})),
        rec(json!({"id": "a000001", "kind": "ellipse"})),
    ];
    let mut index = IdIndex::new();
    index.rebuild(&records);
    assert_eq!(index.get("a000001"), Some(0));
    assert_eq!(index.len(), 1);
}

#[test]
fn rebuild_replaces_previous_entries() {
    let mut index = IdIndex::new();
    index.rebuild(&[rec(json!({"id": "a000001"}))]);
    index.rebuild(&[rec(json!({"id": "a000002"}))]);
    assert!(!index.contains("a000001"));
    assert!(index.contains("a000002"));
}

#[test]
fn clear_empties_index() {
    let mut index = IdIndex::new();
    index.rebuild(&[rec(json!({"id": "a000001"}))]);
    index.clear();
    assert!(index.is_empty());
}
