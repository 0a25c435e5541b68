#![allow(clippy::float_cmp)]

use serde_json::json;

use super::*;

fn rec(value: Value) -> AnnotationRecord {
    AnnotationRecord::from_value(value).unwrap()
}

fn keys(fields: &Fields) -> Vec<&str> {
    fields.keys().map(String::as_str).collect()
}

// =============================================================================
// Kind
// =============================================================================

#[test]
fn kind_wire_names_round_trip() {
    for kind in Kind::ALL {
        assert_eq!(Kind::parse(kind.as_str()), Some(kind));
    }
}

#[test]
fn kind_serde_uses_wire_names() {
    let v = serde_json::to_value(Kind::BlockArrow).unwrap();
    assert_eq!(v, json!("blockarrow"));
    let k: Kind = serde_json::from_value(json!("roundedrect")).unwrap();
    assert_eq!(k, Kind::RoundedRect);
}

#[test]
fn kind_resolves_diagram_aliases() {
    assert_eq!(Kind::resolve("person"), Some(Kind::RoundedRect));
    assert_eq!(Kind::resolve("external_system"), Some(Kind::RoundedRect));
    assert_eq!(Kind::resolve("container_queue"), Some(Kind::RoundedRect));
    assert_eq!(Kind::resolve("container_db"), Some(Kind::Cylinder));
    assert_eq!(Kind::resolve("database"), Some(Kind::Cylinder));
    assert_eq!(Kind::resolve("actor"), Some(Kind::Ellipse));
    assert_eq!(Kind::resolve("rectangle"), Some(Kind::Rect));
    assert_eq!(Kind::resolve("sparkle"), None);
}

#[test]
fn kind_required_geometry() {
    assert_eq!(Kind::Line.required_geom(), &["x1", "y1", "x2", "y2"]);
    assert_eq!(Kind::Text.required_geom(), &["x", "y"]);
    assert!(Kind::Group.required_geom().is_empty());
}

// =============================================================================
// AnnotationRecord
// =============================================================================

#[test]
fn id_requires_non_empty_string() {
    assert_eq!(rec(json!({"id": "a000001"})).id(), Some("a000001"));
    assert_eq!(rec(json!({"id": ""})).id(), None);
    assert_eq!(rec(json!({"id": 3})).id(), None);
    assert_eq!(rec(json!({})).id(), None);
}

#[test]
fn set_z_zero_removes_field() {
    let mut r = rec(json!({"kind": "rect", "z": 4}));
    assert_eq!(r.z(), 4);
    r.set_z(0);
    assert!(r.get("z").is_none());
    assert_eq!(r.z(), 0);
}

#[test]
fn geom_number_accepts_numeric_strings() {
    let r = rec(json!({"kind": "rect", "geom": {"x": "12.5", "y": 3}}));
    assert_eq!(r.geom_number("x"), Some(12.5));
    assert_eq!(r.geom_number("y"), Some(3.0));
    assert_eq!(r.geom_number("w"), None);
}

#[test]
fn merge_keeps_fields_fresh_lacks() {
    let mut stored = rec(json!({"id": "a1", "kind": "rect", "geom": {"x": 1}, "custom": "keep"}));
    let fresh = rec(json!({"id": "a1", "kind": "rect", "geom": {"x": 9}}));
    stored.merge_from(&fresh);
    assert_eq!(stored.geom_number("x"), Some(9.0));
    assert_eq!(stored.get("custom"), Some(&json!("keep")));
    assert_eq!(keys(stored.fields()), vec!["id", "kind", "geom", "custom"]);
}

#[test]
fn children_skip_non_objects() {
    let r = rec(json!({"kind": "group", "children": [{"id": "a1"}, 5, {"id": "a2"}]}));
    let ids: Vec<_> = r.children().iter().filter_map(|c| c.id().map(str::to_string)).collect();
    assert_eq!(ids, vec!["a1", "a2"]);
}

// =============================================================================
// Parse / validate
// =============================================================================

#[test]
fn parse_rejects_malformed_json() {
    let err = parse("{\"annotations\": [").unwrap_err();
    assert_eq!(err.error_code(), "E_PARSE");
}

#[test]
fn parse_rejects_top_level_array() {
    let err = parse("[]").unwrap_err();
    assert!(matches!(err, DocError::Schema(_)));
    assert!(err.to_string().contains("annotations"));
}

#[test]
fn parse_rejects_missing_annotations() {
    assert!(matches!(parse("{\"version\": \"draft-1\"}"), Err(DocError::Schema(_))));
    assert!(matches!(parse("{\"annotations\": {}}"), Err(DocError::Schema(_))));
}

#[test]
fn parse_rejects_non_object_entry() {
    let err = parse("{\"annotations\": [1]}").unwrap_err();
    assert_eq!(err.error_code(), "E_SCHEMA");
}

#[test]
fn parse_rejects_missing_geometry() {
    let text = r#"{"annotations": [{"kind": "line", "geom": {"x1": 0, "y1": 0, "x2": 5}}]}"#;
    let err = parse(text).unwrap_err();
    assert!(err.to_string().contains("geom.y2"));
}

#[test]
fn parse_validates_group_children() {
    let text = r#"{"annotations": [{"kind": "group", "children": [{"kind": "rect", "geom": {}}]}]}"#;
    assert!(matches!(parse(text), Err(DocError::Schema(_))));
}

#[test]
fn parse_accepts_unknown_kinds() {
    let text = r#"{"annotations": [{"kind": "sparkle", "whatever": true}, {"geom": {}}]}"#;
    let draft = parse(text).unwrap();
    assert_eq!(draft.len(), 2);
}

#[test]
fn parse_reads_image_size() {
    let draft = parse(r#"{"image": {"width": 1000, "height": "800"}, "annotations": []}"#).unwrap();
    assert_eq!(draft.image_size(), Some(ImageSize::new(1000.0, 800.0)));
    assert!(draft.is_empty());
}

// =============================================================================
// Normalization
// =============================================================================

#[test]
fn normalize_meta_fills_defaults_in_order() {
    let meta = normalize_meta(&Fields::new(), "rect");
    assert_eq!(
        keys(&meta),
        vec![
            "label",
            "tech",
            "note",
            "label_align",
            "label_size",
            "tech_align",
            "tech_size",
            "note_align",
            "note_size",
            "text_valign",
            "text_spacing",
            "text_box_width",
            "text_box_height",
        ]
    );
    assert_eq!(meta["label_size"], json!(12));
    assert_eq!(meta["tech_size"], json!(10));
    assert_eq!(meta["label_align"], json!("center"));
    assert_eq!(meta["text_valign"], json!("top"));
}

#[test]
fn normalize_meta_keeps_values_and_extras() {
    let mut meta = Fields::new();
    meta.insert("owner".into(), json!("ops"));
    meta.insert("label".into(), json!("API"));
    meta.insert("label_size".into(), json!(18));
    let out = normalize_meta(&meta, "rect");
    assert_eq!(out["label"], json!("API"));
    assert_eq!(out["label_size"], json!(18));
    assert_eq!(keys(&out).last(), Some(&"owner"));
}

#[test]
fn normalize_meta_text_note_falls_back_to_label() {
    let mut meta = Fields::new();
    meta.insert("label".into(), json!("hello"));
    assert_eq!(normalize_meta(&meta, "text")["note"], json!("hello"));
    assert_eq!(normalize_meta(&meta, "rect")["note"], json!(""));
}

#[test]
fn normalize_is_idempotent() {
    let draft = parse(
        r#"{"annotations": [{"kind": "group", "z": 0, "children": [{"kind": "text", "geom": {"x": 1, "y": 2}, "meta": {"label": "x"}}]}]}"#,
    )
    .unwrap();
    let once = normalize_draft(&draft);
    let twice = normalize_draft(&once);
    assert_eq!(once, twice);
    assert!(once.annotations()[0].get("z").is_none());
    assert!(once.annotations()[0].children()[0].meta().is_some());
}

#[test]
fn fill_default_style_fills_only_missing() {
    let mut r = rec(json!({"kind": "rect", "style": {"pen": {"color": "#00FF00"}}}));
    fill_default_style(&mut r);
    let style = r.style().unwrap();
    assert_eq!(style["pen"]["color"], json!("#00FF00"));
    assert_eq!(style["pen"]["width"], json!(2));
    assert_eq!(style["brush"]["color"], json!("#00000000"));
    assert_eq!(style["text"]["color"], json!("#FFFF00"));
    assert_eq!(style["text"]["size_pt"], json!(12));
}

// =============================================================================
// Canonical order
// =============================================================================

#[test]
fn sort_annotation_keys_canonical_then_extras() {
    let r = rec(json!({"z": 2, "text": "t", "style": {}, "custom": 1, "geom": {}, "kind": "text", "id": "a1"}));
    let sorted = sort_annotation_keys(&r);
    assert_eq!(keys(sorted.fields()), vec!["id", "kind", "geom", "style", "text", "z", "custom"]);
}

#[test]
fn sort_annotation_keys_recurses_into_children() {
    let r = rec(json!({"children": [{"geom": {}, "id": "a2"}], "id": "g1", "kind": "group"}));
    let sorted = sort_annotation_keys(&r);
    assert_eq!(keys(sorted.fields()), vec!["id", "kind", "children"]);
    assert_eq!(keys(sorted.children()[0].fields()), vec!["id", "geom"]);
}

#[test]
fn sort_draft_data_keeps_record_order() {
    let draft = parse(r#"{"annotations": [{"id": "b"}, {"id": "a"}]}"#).unwrap();
    let sorted = sort_draft_data(&draft);
    let ids: Vec<_> = sorted.annotations().iter().filter_map(AnnotationRecord::id).collect();
    assert_eq!(ids, vec!["b", "a"]);
}

// =============================================================================
// Serialize
// =============================================================================

#[test]
fn serialize_orders_top_level_keys() {
    let draft = parse(r#"{"annotations": [], "source": "ai", "image": {"width": 1}, "version": "draft-1"}"#).unwrap();
    let text = serialize(&draft, 2).unwrap();
    let v = text.find("\"version\"").unwrap();
    let i = text.find("\"image\"").unwrap();
    let a = text.find("\"annotations\"").unwrap();
    let s = text.find("\"source\"").unwrap();
    assert!(v < i && i < a && a < s);
}

#[test]
fn serialize_is_stable() {
    let text = r#"{"annotations": [{"id": "a000001", "kind": "rect", "geom": {"x": 1, "y": 2, "w": 3, "h": 4}, "extra": [1, 2]}]}"#;
    let first = serialize(&parse(text).unwrap(), 2).unwrap();
    let second = serialize(&parse(&first).unwrap(), 2).unwrap();
    assert_eq!(first, second);
    assert!(first.contains("\"extra\""));
}

#[test]
fn serialize_respects_indent() {
    let text = serialize(&Draft::new(), 4).unwrap();
    assert!(text.contains("\n    \"version\": \"draft-1\""));
}

// =============================================================================
// Model output extraction
// =============================================================================

#[test]
fn strip_fences_removes_language_tag() {
    assert_eq!(strip_markdown_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
    assert_eq!(strip_markdown_fences("  {\"a\": 1} "), "{\"a\": 1}");
}

#[test]
fn extract_object_from_prose() {
    let raw = "Here you go:\n{\"annotations\": [{\"text\": \"a } brace\"}]}\nThanks!";
    let v = extract_first_json_object(raw).unwrap();
    assert_eq!(v["annotations"][0]["text"], json!("a } brace"));
}

#[test]
fn extract_object_from_fence() {
    let v = extract_first_json_object("```json\n{\"annotations\": []}\n```").unwrap();
    assert!(v["annotations"].is_array());
}

#[test]
fn extract_object_none_without_braces() {
    assert!(extract_first_json_object("no json here").is_none());
    assert!(extract_first_json_object("[1, 2]").is_none());
}
