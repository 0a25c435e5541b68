#![allow(clippy::float_cmp)]

use serde_json::json;

use super::*;
use crate::event::{self, EventReceiver};

fn fields(value: Value) -> Fields {
    value.as_object().cloned().unwrap()
}

fn rec(value: Value) -> AnnotationRecord {
    AnnotationRecord::from_value(value).unwrap()
}

fn drain(rx: &mut EventReceiver) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

#[test]
fn spec_from_record_keeps_alias_kind_text() {
    let r = rec(json!({"id": "a000001", "kind": "person", "geom": {"x": 1, "y": 2, "w": 3, "h": 4}, "z": 3}));
    let spec = ItemSpec::from_record(&r, None).unwrap();
    assert_eq!(spec.kind, Kind::RoundedRect);
    assert_eq!(spec.kind_name, "person");
    assert_eq!(spec.id.as_deref(), Some("a000001"));
    assert_eq!(spec.z, 3);
}

#[test]
fn spec_from_record_skips_groups_and_unknown() {
    assert!(ItemSpec::from_record(&rec(json!({"kind": "group", "children": []})), None).is_none());
    assert!(ItemSpec::from_record(&rec(json!({"kind": "sparkle"})), None).is_none());
}

#[test]
fn create_is_silent_and_exports_record() {
    let (tx, mut rx) = event::channel();
    let mut scene = Scene::with_events(tx);
    let r = rec(json!({"id": "a000001", "kind": "rect", "geom": {"x": 1.234, "y": 2, "w": 3, "h": 4},
        "meta": {"label": "API"}, "style": {"pen": {"color": "#000000"}}}));
    let h = scene.create(&ItemSpec::from_record(&r, None).unwrap());
    assert!(drain(&mut rx).is_empty());

    let out = scene.export_record(h).unwrap();
    assert_eq!(out.id(), Some("a000001"));
    assert_eq!(out.kind_name(), Some("rect"));
    assert_eq!(out.geom_number("x"), Some(1.23));
    assert_eq!(out.meta().unwrap()["label"], json!("API"));
    assert!(out.get("z").is_none());
}

#[test]
fn draw_emits_created_with_default_style() {
    let (tx, mut rx) = event::channel();
    let mut scene = Scene::with_events(tx);
    let h = scene.draw(Kind::Ellipse, fields(json!({"x": 0, "y": 0, "w": 10, "h": 10})));
    assert_eq!(drain(&mut rx), vec![Event::Scene(SceneEvent::Created(h))]);
    let out = scene.export_record(h).unwrap();
    assert_eq!(out.id(), None);
    assert_eq!(out.style().unwrap()["pen"]["color"], json!("#FF0000"));
}

#[test]
fn move_by_shifts_line_endpoints() {
    let mut scene = Scene::new();
    let h = scene.draw(Kind::Line, fields(json!({"x1": 0, "y1": 0, "x2": 10, "y2": 10})));
    assert!(scene.move_by(h, 5.0, -2.0, true));
    let out = scene.export_record(h).unwrap();
    assert_eq!(out.geom_number("x1"), Some(5.0));
    assert_eq!(out.geom_number("y2"), Some(8.0));
}

#[test]
fn set_selection_emits_only_on_change() {
    let (tx, mut rx) = event::channel();
    let mut scene = Scene::with_events(tx);
    let r = rec(json!({"id": "a000001", "kind": "rect", "geom": {"x": 0, "y": 0, "w": 1, "h": 1}}));
    scene.create(&ItemSpec::from_record(&r, None).unwrap());

    scene.set_selection(&["a000001".to_string()]);
    assert_eq!(drain(&mut rx), vec![Event::Scene(SceneEvent::SelectionChanged)]);
    scene.set_selection(&["a000001".to_string()]);
    assert!(drain(&mut rx).is_empty());
    assert_eq!(scene.selection(), vec!["a000001".to_string()]);
}

#[test]
fn removing_selected_item_emits_selection_changed() {
    let (tx, mut rx) = event::channel();
    let mut scene = Scene::with_events(tx);
    let h = scene.draw(Kind::Rect, fields(json!({"x": 0, "y": 0, "w": 1, "h": 1})));
    scene.select(&[h]);
    drain(&mut rx);
    assert!(scene.remove(h));
    assert_eq!(drain(&mut rx), vec![Event::Scene(SceneEvent::SelectionChanged)]);
    assert!(!scene.remove(h));
}

#[test]
fn decorations_are_not_mirrored() {
    let mut scene = Scene::new();
    scene.set_background(ImageSize::new(1000.0, 800.0));
    scene.add_decoration(Decoration::Indicator { label: "busy".into() });
    scene.draw(Kind::Rect, fields(json!({"x": 0, "y": 0, "w": 1, "h": 1})));
    assert_eq!(scene.mirrored().len(), 1);
    assert_eq!(scene.decorations().count(), 2);
    assert_eq!(scene.background(), Some(ImageSize::new(1000.0, 800.0)));

    scene.set_background(ImageSize::new(10.0, 10.0));
    assert_eq!(scene.decorations().count(), 2);
    scene.clear();
    assert!(scene.background().is_none());
}

#[test]
fn find_and_owner() {
    let mut scene = Scene::new();
    let r = rec(json!({"id": "a000002", "kind": "text", "geom": {"x": 0, "y": 0}, "text": "hi"}));
    let h = scene.create(&ItemSpec::from_record(&r, Some("g000001")).unwrap());
    assert_eq!(scene.find("a000002"), Some(h));
    assert_eq!(scene.item_owner(h).as_deref(), Some("g000001"));
    assert_eq!(scene.export_record(h).unwrap().text(), Some("hi"));
    assert!(scene.find("a999999").is_none());
}

#[test]
fn alignment_updates_geometry_and_pen() {
    let (tx, mut rx) = event::channel();
    let mut scene = Scene::with_events(tx);
    let h = scene.draw(Kind::RoundedRect, fields(json!({"x": 0, "y": 0, "w": 1, "h": 1})));
    drain(&mut rx);
    let alignment = Alignment {
        x: 10.0,
        y: 20.0,
        w: 30.0,
        h: 40.0,
        adjust1: Some(6.0),
        pen_width: Some(3.0),
        pen_color: Some("#112233".into()),
    };
    assert!(scene.apply_alignment(h, &alignment));
    assert_eq!(
        drain(&mut rx),
        vec![Event::Scene(SceneEvent::Changed { handle: h, interacting: false })]
    );
    let out = scene.export_record(h).unwrap();
    assert_eq!(out.geom_number("w"), Some(30.0));
    assert_eq!(out.geom_number("adjust1"), Some(6.0));
    assert_eq!(out.style().unwrap()["pen"]["color"], json!("#112233"));
}

#[test]
fn set_z_exports_non_zero_only() {
    let mut scene = Scene::new();
    let h = scene.draw(Kind::Rect, fields(json!({"x": 0, "y": 0, "w": 1, "h": 1})));
    scene.set_z(h, 2);
    assert_eq!(scene.export_record(h).unwrap().z(), 2);
    scene.set_z(h, 0);
    assert!(scene.export_record(h).unwrap().get("z").is_none());
}
