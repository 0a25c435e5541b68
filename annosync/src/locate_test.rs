use super::*;

const DOC: &str = r#"{
  "version": "draft-1",
  "annotations": [
    {
      "id": "a000001",
      "kind": "rect",
      "geom": {"x": 1, "y": 2, "w": 3, "h": 4},
      "meta": {"label": "has \"id\": \"fake\" and } brace"}
    },
    {
      "kind": "group",
      "id": "g000002",
      "children": [
        {"id": "a000003", "kind": "text", "geom": {"x": 5, "y": 6}}
      ]
    }
  ]
}"#;

fn offset_of(needle: &str) -> usize {
    DOC.find(needle).unwrap()
}

#[test]
fn cursor_in_nested_geom_resolves_record() {
    assert_eq!(annotation_at(DOC, offset_of("\"w\": 3")), Some("a000001".into()));
}

#[test]
fn cursor_in_string_with_braces_resolves_record() {
    assert_eq!(annotation_at(DOC, offset_of("and } brace")), Some("a000001".into()));
}

#[test]
fn cursor_in_group_child_resolves_child() {
    assert_eq!(annotation_at(DOC, offset_of("\"y\": 6")), Some("a000003".into()));
}

#[test]
fn cursor_in_group_body_resolves_group() {
    assert_eq!(annotation_at(DOC, offset_of("\"children\"")), Some("g000002".into()));
}

#[test]
fn cursor_outside_records_is_none() {
    assert_eq!(annotation_at(DOC, offset_of("\"version\"")), None);
    assert_eq!(annotation_at(DOC, 0), None);
    assert_eq!(annotation_at("", 0), None);
}

#[test]
fn id_nested_deeper_is_not_direct() {
    let text = r#"{"annotations": [{"meta": {"id": "inner"}, "kind": "rect"}]}"#;
    assert_eq!(annotation_at(text, text.find("\"kind\"").unwrap()), None);
    assert_eq!(annotation_at(text, text.find("inner").unwrap()), Some("inner".into()));
}

#[test]
fn unclosed_object_is_ignored() {
    let text = r#"{"annotations": [{"id": "a000001", "kind": "rect", "#;
    assert_eq!(annotation_at(text, text.len()), None);
}

#[test]
fn span_covers_whole_object() {
    let span = annotation_span(DOC, "a000001").unwrap();
    assert_eq!(&DOC[span.start..=span.start], "{");
    assert_eq!(&DOC[span.end - 1..span.end], "}");
    assert_eq!(span.first_line, 3);
    assert_eq!(span.last_line, 8);
}

#[test]
fn span_ignores_fake_id_in_string() {
    assert!(annotation_span(DOC, "fake").is_none());
}

#[test]
fn span_missing_id_is_none() {
    assert!(annotation_span(DOC, "a999999").is_none());
}

#[test]
fn line_helpers() {
    let text = "a\nbb\nccc";
    assert_eq!(line_of(text, 0), 0);
    assert_eq!(line_of(text, 3), 1);
    assert_eq!(line_start(text, 2), 5);
    assert_eq!(line_start(text, 9), text.len());
}
