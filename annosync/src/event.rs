//! Events delivered to the sync controller.
//!
//! DESIGN
//! ======
//! Collaborators never call into the controller. The canvas, the editor and
//! background workers push `Event`s into one unbounded channel; the control
//! thread drains it and dispatches each event in arrival order. This keeps
//! all document and scene mutation on one thread and makes reentrancy
//! explicit: an event produced while a guard is held is dispatched while the
//! guard is still held and is dropped by its handler.
//!
//! Workers only ever produce `WorkerEvent`s carrying plain result values.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::scene::ItemHandle;

/// Sending half of the controller's event channel.
pub type EventSender = mpsc::UnboundedSender<Event>;

/// Receiving half of the controller's event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Create the controller's event channel.
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Anything the controller reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Scene(SceneEvent),
    Editor(EditorEvent),
    Worker(WorkerEvent),
}

/// Notifications from the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneEvent {
    /// The user drew a new item.
    Created(ItemHandle),
    /// An item's geometry or style changed. `interacting` is set while a
    /// drag or resize is still in progress.
    Changed { handle: ItemHandle, interacting: bool },
    /// The selected item set changed.
    SelectionChanged,
    /// Stacking order of one or more items changed.
    ZOrderChanged,
}

/// Notifications from the text editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorEvent {
    /// The buffer changed through user input.
    TextChanged,
    /// The cursor moved to a new offset.
    CursorMoved,
}

/// Completions from background workers.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    ExtractionFinished { request: RequestId, raw: String },
    ExtractionFailed { request: RequestId, message: String },
    AlignmentFinished { request: RequestId, id: String, result: Alignment },
    AlignmentFailed { request: RequestId, id: String, message: String },
}

/// Identifier of one outstanding background request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh random request id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Refined placement for one item, as returned by the alignment service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alignment {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjust1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pen_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pen_color: Option<String>,
}
