use super::*;
use crate::event::{self, EventReceiver};

const TEXT: &str = "{\n  \"annotations\": [\n    {\n      \"id\": \"a000001\",\n      \"kind\": \"rect\"\n    },\n    {\n      \"id\": \"a000002\",\n      \"kind\": \"line\"\n    }\n  ]\n}";

fn drain(rx: &mut EventReceiver) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

#[test]
fn suppressed_write_is_silent() {
    let (tx, mut rx) = event::channel();
    let mut buf = TextBuffer::with_events(tx);
    buf.set_text(TEXT, true);
    assert!(drain(&mut rx).is_empty());
    buf.set_text(TEXT, false);
    assert_eq!(drain(&mut rx), vec![Event::Editor(EditorEvent::TextChanged)]);
}

#[test]
fn always_notify_ignores_suppression() {
    let (tx, mut rx) = event::channel();
    let mut buf = TextBuffer::with_events(tx);
    buf.set_always_notify(true);
    buf.set_text(TEXT, true);
    assert_eq!(drain(&mut rx), vec![Event::Editor(EditorEvent::TextChanged)]);
}

#[test]
fn user_edits_emit_events() {
    let (tx, mut rx) = event::channel();
    let mut buf = TextBuffer::with_events(tx);
    buf.replace_all("{}");
    buf.insert(1, "\"a\": 1");
    buf.move_cursor(0);
    assert_eq!(
        drain(&mut rx),
        vec![
            Event::Editor(EditorEvent::TextChanged),
            Event::Editor(EditorEvent::TextChanged),
            Event::Editor(EditorEvent::CursorMoved),
        ]
    );
    assert_eq!(buf.as_str(), "{\"a\": 1}");
}

#[test]
fn cursor_locates_annotation() {
    let mut buf = TextBuffer::new();
    buf.set_text(TEXT, true);
    buf.move_cursor(TEXT.find("\"line\"").unwrap());
    assert_eq!(buf.annotation_at_cursor().as_deref(), Some("a000002"));
}

#[test]
fn programmatic_write_keeps_cursor_and_clamps() {
    let mut buf = TextBuffer::new();
    buf.set_text(TEXT, true);
    buf.move_cursor(40);
    buf.set_text(TEXT, true);
    assert_eq!(buf.cursor(), 40);
    buf.set_text("{}", true);
    assert_eq!(buf.cursor(), 2);
}

#[test]
fn scroll_to_moves_viewport_only() {
    let mut buf = TextBuffer::new();
    buf.set_text(TEXT, true);
    assert!(buf.scroll_to("a000002"));
    assert_eq!(buf.top_line(), 6);
    assert_eq!(buf.cursor(), 0);
    assert!(!buf.scroll_to("a999999"));
}

#[test]
fn highlight_tracks_record_lines() {
    let mut buf = TextBuffer::new();
    buf.set_text(TEXT, true);
    buf.set_highlight(Some("a000001"));
    let h = buf.highlight().unwrap();
    assert_eq!((h.first_line, h.last_line), (2, 5));
    buf.set_highlight(None);
    assert!(buf.highlight().is_none());
    buf.set_highlight(Some("missing"));
    assert!(buf.highlight().is_none());
}
