//! Editor collaborator contract and an in-memory text buffer.
//!
//! The controller owns what the text says; the editor owns how it is viewed
//! (cursor, first visible line, highlighted record). A programmatic
//! `set_text` keeps the cursor and the viewport where they were, clamped to
//! the new text, so a sync push does not yank the user's view around.

#[cfg(test)]
#[path = "editor_test.rs"]
mod editor_test;

use tracing::debug;

use crate::event::{EditorEvent, Event, EventSender};
use crate::locate;

/// What the sync controller needs from a text editor.
pub trait Editor {
    fn text(&self) -> String;

    /// Replace the whole buffer. With `suppress_change_event` the editor does
    /// not report the write as a user edit.
    fn set_text(&mut self, text: &str, suppress_change_event: bool);

    /// Id of the record whose object encloses the cursor.
    fn annotation_at_cursor(&self) -> Option<String>;

    /// Scroll so the record's first line is at the top. Returns `false` if the
    /// record is not in the text.
    fn scroll_to(&mut self, id: &str) -> bool;

    /// Mark a record's lines in the gutter, or clear the mark.
    fn set_highlight(&mut self, id: Option<&str>);
}

/// Gutter mark over one record's lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub id: String,
    pub first_line: usize,
    pub last_line: usize,
}

/// In-memory editor.
#[derive(Debug, Default)]
pub struct TextBuffer {
    text: String,
    cursor: usize,
    top_line: usize,
    highlight: Option<Highlight>,
    always_notify: bool,
    events: Option<EventSender>,
}

impl TextBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer that reports user edits and cursor moves on `events`.
    #[must_use]
    pub fn with_events(events: EventSender) -> Self {
        Self { events: Some(events), ..Self::default() }
    }

    /// Report every write as a change, even when asked to suppress it. Some
    /// widgets cannot tell programmatic writes apart; this mimics them.
    pub fn set_always_notify(&mut self, on: bool) {
        self.always_notify = on;
    }

    fn emit(&self, event: EditorEvent) {
        if let Some(tx) = &self.events {
            if tx.send(Event::Editor(event)).is_err() {
                debug!(?event, "editor event dropped; receiver closed");
            }
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn top_line(&self) -> usize {
        self.top_line
    }

    #[must_use]
    pub fn highlight(&self) -> Option<&Highlight> {
        self.highlight.as_ref()
    }

    /// The user replaces the whole buffer (paste over everything). Emits
    /// `TextChanged`.
    pub fn replace_all(&mut self, text: &str) {
        self.text = text.to_string();
        self.clamp_view();
        self.emit(EditorEvent::TextChanged);
    }

    /// The user types at a byte offset. Emits `TextChanged`.
    pub fn insert(&mut self, offset: usize, s: &str) {
        let at = floor_boundary(&self.text, offset);
        self.text.insert_str(at, s);
        self.cursor = at + s.len();
        self.emit(EditorEvent::TextChanged);
    }

    /// The user moves the cursor. Emits `CursorMoved`.
    pub fn move_cursor(&mut self, offset: usize) {
        self.cursor = floor_boundary(&self.text, offset);
        self.emit(EditorEvent::CursorMoved);
    }

    fn clamp_view(&mut self) {
        self.cursor = floor_boundary(&self.text, self.cursor);
        let last_line = locate::line_of(&self.text, self.text.len());
        self.top_line = self.top_line.min(last_line);
    }
}

impl Editor for TextBuffer {
    fn text(&self) -> String {
        self.text.clone()
    }

    fn set_text(&mut self, text: &str, suppress_change_event: bool) {
        self.text = text.to_string();
        self.clamp_view();
        if let Some(h) = self.highlight.take() {
            self.set_highlight(Some(&h.id));
        }
        if !suppress_change_event || self.always_notify {
            self.emit(EditorEvent::TextChanged);
        }
    }

    fn annotation_at_cursor(&self) -> Option<String> {
        locate::annotation_at(&self.text, self.cursor)
    }

    fn scroll_to(&mut self, id: &str) -> bool {
        match locate::annotation_span(&self.text, id) {
            Some(span) => {
                self.top_line = span.first_line;
                true
            }
            None => false,
        }
    }

    fn set_highlight(&mut self, id: Option<&str>) {
        self.highlight = id.and_then(|id| {
            locate::annotation_span(&self.text, id).map(|span| Highlight {
                id: id.to_string(),
                first_line: span.first_line,
                last_line: span.last_line,
            })
        });
    }
}

fn floor_boundary(text: &str, offset: usize) -> usize {
    let mut at = offset.min(text.len());
    while !text.is_char_boundary(at) {
        at -= 1;
    }
    at
}
