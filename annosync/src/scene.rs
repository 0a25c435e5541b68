//! Scene mirror: the canvas collaborator contract and an in-memory canvas.
//!
//! DESIGN
//! ======
//! The controller drives the canvas through the [`Canvas`] trait and hears
//! back from it only through the event channel. A canvas holds two sorts of
//! node: annotation items, which mirror one document record each and carry
//! its id, and decorations (background image, status indicators), which the
//! controller never touches during a rebuild. The split is a tagged variant
//! ([`SceneNode`]) so "is this mirrored?" is a match, not a probe.
//!
//! Group records are flattened at this boundary: every member becomes its
//! own item tagged with the owning group's id.
//!
//! [`Scene`] is the in-memory canvas. Besides the trait it exposes the
//! user-side operations (draw, drag, select, restack) a real canvas would
//! get from input devices; those emit events exactly where a GUI canvas
//! would.

#[cfg(test)]
#[path = "scene_test.rs"]
mod scene_test;

use serde_json::{Value, json};
use tracing::debug;

use crate::consts::{
    DEFAULT_BRUSH_COLOR, DEFAULT_PEN_COLOR, DEFAULT_PEN_WIDTH, DEFAULT_TEXT_COLOR, DEFAULT_TEXT_SIZE_PT,
    GEOMETRY_DECIMALS,
};
use crate::doc::{AnnotationRecord, Fields, ImageSize, Kind, as_number};
use crate::event::{Alignment, Event, EventSender, SceneEvent};
use crate::geom::round_to;

// =============================================================================
// CONTRACT
// =============================================================================

/// Opaque handle of a visual object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemHandle(pub u64);

/// Everything needed to instantiate one visual object for a record.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSpec {
    pub kind: Kind,
    /// The record's `kind` text, kept so aliases survive a round trip.
    pub kind_name: String,
    pub id: Option<String>,
    /// Id of the group record this item belongs to, if any.
    pub owner: Option<String>,
    pub geom: Fields,
    pub style: Fields,
    pub meta: Fields,
    pub text: Option<String>,
    pub z: i64,
}

impl ItemSpec {
    /// Build the spec for a non-group record. Returns `None` for groups and
    /// records of unknown kind.
    #[must_use]
    pub fn from_record(rec: &AnnotationRecord, owner: Option<&str>) -> Option<Self> {
        let kind = rec.kind()?;
        if kind == Kind::Group {
            return None;
        }
        Some(Self {
            kind,
            kind_name: rec.kind_name().unwrap_or(kind.as_str()).to_string(),
            id: rec.id().map(str::to_string),
            owner: owner.map(str::to_string),
            geom: rec.geom().cloned().unwrap_or_default(),
            style: rec.style().cloned().unwrap_or_default(),
            meta: rec.meta().cloned().unwrap_or_default(),
            text: rec.text().map(str::to_string),
            z: rec.z(),
        })
    }
}

/// What the sync controller needs from a canvas.
pub trait Canvas {
    /// Instantiate a visual object. Emits no event.
    fn create(&mut self, spec: &ItemSpec) -> ItemHandle;

    /// Destroy a visual object. Returns `false` if the handle is unknown.
    fn remove(&mut self, handle: ItemHandle) -> bool;

    /// Current state of an item as a partial record (kind, id, geom, meta,
    /// style, text, z).
    fn export_record(&self, handle: ItemHandle) -> Option<AnnotationRecord>;

    /// Handles of every annotation-backed item, in stacking-insertion order.
    fn mirrored(&self) -> Vec<ItemHandle>;

    fn item_id(&self, handle: ItemHandle) -> Option<String>;

    fn set_item_id(&mut self, handle: ItemHandle, id: &str);

    /// Group id the item belongs to, if any.
    fn item_owner(&self, handle: ItemHandle) -> Option<String>;

    /// Stacking value of an item.
    fn item_z(&self, handle: ItemHandle) -> Option<i64>;

    /// First mirrored item carrying `id`.
    fn find(&self, id: &str) -> Option<ItemHandle>;

    /// Ids of the selected items.
    fn selection(&self) -> Vec<String>;

    /// Replace the selection with the items carrying `ids`.
    fn set_selection(&mut self, ids: &[String]);

    /// Apply a refined placement to an item.
    fn apply_alignment(&mut self, handle: ItemHandle, alignment: &Alignment) -> bool;

    /// Install (or replace) the background image decoration.
    fn set_background(&mut self, size: ImageSize);

    /// Remove every node, decorations included.
    fn clear(&mut self);
}

// =============================================================================
// IN-MEMORY SCENE
// =============================================================================

/// One annotation-backed visual object.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneItem {
    pub handle: ItemHandle,
    pub kind: Kind,
    pub kind_name: String,
    pub id: Option<String>,
    pub owner: Option<String>,
    pub geom: Fields,
    pub style: Fields,
    pub meta: Fields,
    pub text: Option<String>,
    pub z: i64,
    pub selected: bool,
}

impl SceneItem {
    fn export(&self) -> AnnotationRecord {
        let mut rec = AnnotationRecord::default();
        if let Some(id) = &self.id {
            rec.set_id(id.clone());
        }
        rec.insert("kind", Value::String(self.kind_name.clone()));
        let geom = self
            .geom
            .iter()
            .map(|(k, v)| {
                let v = match as_number(v) {
                    Some(n) if v.is_number() => Value::from(round_to(n, GEOMETRY_DECIMALS)),
                    _ => v.clone(),
                };
                (k.clone(), v)
            })
            .collect();
        rec.insert("geom", Value::Object(geom));
        rec.insert("meta", Value::Object(self.meta.clone()));
        rec.insert("style", Value::Object(self.style.clone()));
        if let Some(text) = &self.text {
            rec.insert("text", Value::String(text.clone()));
        }
        rec.set_z(self.z);
        rec
    }

    fn shift(&mut self, dx: f64, dy: f64) {
        let (xs, ys): (&[&str], &[&str]) = match self.kind {
            Kind::Line => (&["x1", "x2"], &["y1", "y2"]),
            _ => (&["x"], &["y"]),
        };
        for (keys, d) in [(xs, dx), (ys, dy)] {
            for key in keys {
                let v = self.geom.get(*key).and_then(as_number).unwrap_or(0.0);
                self.geom.insert((*key).to_string(), Value::from(v + d));
            }
        }
    }
}

/// Non-mirrored scene content.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoration {
    Background { width: f64, height: f64 },
    Indicator { label: String },
}

/// A node on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneNode {
    Annotation(SceneItem),
    Decoration(Decoration),
}

impl SceneNode {
    /// The item if this node mirrors a record.
    #[must_use]
    pub fn as_mirrorable(&self) -> Option<&SceneItem> {
        match self {
            Self::Annotation(item) => Some(item),
            Self::Decoration(_) => None,
        }
    }

    fn as_mirrorable_mut(&mut self) -> Option<&mut SceneItem> {
        match self {
            Self::Annotation(item) => Some(item),
            Self::Decoration(_) => None,
        }
    }
}

/// In-memory canvas.
#[derive(Debug, Default)]
pub struct Scene {
    nodes: Vec<SceneNode>,
    next_handle: u64,
    events: Option<EventSender>,
}

impl Scene {
    /// A scene that reports nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A scene that reports user actions on `events`.
    #[must_use]
    pub fn with_events(events: EventSender) -> Self {
        Self { events: Some(events), ..Self::default() }
    }

    fn emit(&self, event: SceneEvent) {
        if let Some(tx) = &self.events {
            if tx.send(Event::Scene(event)).is_err() {
                debug!(?event, "scene event dropped; receiver closed");
            }
        }
    }

    fn alloc(&mut self) -> ItemHandle {
        self.next_handle += 1;
        ItemHandle(self.next_handle)
    }

    fn item_mut(&mut self, handle: ItemHandle) -> Option<&mut SceneItem> {
        self.nodes
            .iter_mut()
            .filter_map(SceneNode::as_mirrorable_mut)
            .find(|i| i.handle == handle)
    }

    /// Look up an item.
    #[must_use]
    pub fn item(&self, handle: ItemHandle) -> Option<&SceneItem> {
        self.items().find(|i| i.handle == handle)
    }

    /// Every annotation-backed item.
    pub fn items(&self) -> impl Iterator<Item = &SceneItem> {
        self.nodes.iter().filter_map(SceneNode::as_mirrorable)
    }

    /// Every decoration.
    pub fn decorations(&self) -> impl Iterator<Item = &Decoration> {
        self.nodes.iter().filter_map(|n| match n {
            SceneNode::Decoration(d) => Some(d),
            SceneNode::Annotation(_) => None,
        })
    }

    /// Add a non-mirrored decoration.
    pub fn add_decoration(&mut self, decoration: Decoration) {
        self.nodes.push(SceneNode::Decoration(decoration));
    }

    /// Background image size, if one is installed.
    #[must_use]
    pub fn background(&self) -> Option<ImageSize> {
        self.decorations().find_map(|d| match d {
            Decoration::Background { width, height } => Some(ImageSize::new(*width, *height)),
            Decoration::Indicator { .. } => None,
        })
    }

    // -------------------------------------------------------------------------
    // User-side operations
    // -------------------------------------------------------------------------

    /// The user draws a new shape with the default style. Emits `Created`.
    pub fn draw(&mut self, kind: Kind, geom: Fields) -> ItemHandle {
        let handle = self.alloc();
        let style = json!({
            "pen": {"color": DEFAULT_PEN_COLOR, "width": DEFAULT_PEN_WIDTH},
            "brush": {"color": DEFAULT_BRUSH_COLOR},
            "text": {"color": DEFAULT_TEXT_COLOR, "size_pt": DEFAULT_TEXT_SIZE_PT},
        });
        let item = SceneItem {
            handle,
            kind,
            kind_name: kind.as_str().to_string(),
            id: None,
            owner: None,
            geom,
            style: style.as_object().cloned().unwrap_or_default(),
            meta: Fields::new(),
            text: (kind == Kind::Text).then(String::new),
            z: 0,
            selected: false,
        };
        self.nodes.push(SceneNode::Annotation(item));
        self.emit(SceneEvent::Created(handle));
        handle
    }

    /// The user drags an item. Emits `Changed`.
    pub fn move_by(&mut self, handle: ItemHandle, dx: f64, dy: f64, interacting: bool) -> bool {
        let Some(item) = self.item_mut(handle) else {
            return false;
        };
        item.shift(dx, dy);
        self.emit(SceneEvent::Changed { handle, interacting });
        true
    }

    /// The user resizes a bounding-box item. Emits `Changed`.
    pub fn resize(&mut self, handle: ItemHandle, w: f64, h: f64) -> bool {
        let Some(item) = self.item_mut(handle) else {
            return false;
        };
        item.geom.insert("w".into(), Value::from(w));
        item.geom.insert("h".into(), Value::from(h));
        self.emit(SceneEvent::Changed { handle, interacting: false });
        true
    }

    /// The user edits a meta field in the properties panel. Emits `Changed`.
    pub fn set_meta(&mut self, handle: ItemHandle, key: &str, value: Value) -> bool {
        let Some(item) = self.item_mut(handle) else {
            return false;
        };
        item.meta.insert(key.to_string(), value);
        self.emit(SceneEvent::Changed { handle, interacting: false });
        true
    }

    /// The user clicks items. Emits `SelectionChanged`.
    pub fn select(&mut self, handles: &[ItemHandle]) {
        for node in &mut self.nodes {
            if let Some(item) = node.as_mirrorable_mut() {
                item.selected = handles.contains(&item.handle);
            }
        }
        self.emit(SceneEvent::SelectionChanged);
    }

    /// The user restacks an item. Emits `ZOrderChanged`.
    pub fn set_z(&mut self, handle: ItemHandle, z: i64) -> bool {
        let Some(item) = self.item_mut(handle) else {
            return false;
        };
        item.z = z;
        self.emit(SceneEvent::ZOrderChanged);
        true
    }
}

impl Canvas for Scene {
    fn create(&mut self, spec: &ItemSpec) -> ItemHandle {
        let handle = self.alloc();
        self.nodes.push(SceneNode::Annotation(SceneItem {
            handle,
            kind: spec.kind,
            kind_name: spec.kind_name.clone(),
            id: spec.id.clone(),
            owner: spec.owner.clone(),
            geom: spec.geom.clone(),
            style: spec.style.clone(),
            meta: spec.meta.clone(),
            text: spec.text.clone(),
            z: spec.z,
            selected: false,
        }));
        handle
    }

    fn remove(&mut self, handle: ItemHandle) -> bool {
        let Some(pos) = self
            .nodes
            .iter()
            .position(|n| n.as_mirrorable().is_some_and(|i| i.handle == handle))
        else {
            return false;
        };
        let node = self.nodes.remove(pos);
        if node.as_mirrorable().is_some_and(|i| i.selected) {
            self.emit(SceneEvent::SelectionChanged);
        }
        true
    }

    fn export_record(&self, handle: ItemHandle) -> Option<AnnotationRecord> {
        self.item(handle).map(SceneItem::export)
    }

    fn mirrored(&self) -> Vec<ItemHandle> {
        self.items().map(|i| i.handle).collect()
    }

    fn item_id(&self, handle: ItemHandle) -> Option<String> {
        self.item(handle).and_then(|i| i.id.clone())
    }

    fn set_item_id(&mut self, handle: ItemHandle, id: &str) {
        if let Some(item) = self.item_mut(handle) {
            item.id = Some(id.to_string());
        }
    }

    fn item_owner(&self, handle: ItemHandle) -> Option<String> {
        self.item(handle).and_then(|i| i.owner.clone())
    }

    fn item_z(&self, handle: ItemHandle) -> Option<i64> {
        self.item(handle).map(|i| i.z)
    }

    fn find(&self, id: &str) -> Option<ItemHandle> {
        self.items()
            .find(|i| i.id.as_deref() == Some(id))
            .map(|i| i.handle)
    }

    fn selection(&self) -> Vec<String> {
        self.items()
            .filter(|i| i.selected)
            .filter_map(|i| i.id.clone())
            .collect()
    }

    fn set_selection(&mut self, ids: &[String]) {
        let mut changed = false;
        for node in &mut self.nodes {
            if let Some(item) = node.as_mirrorable_mut() {
                let want = item.id.as_ref().is_some_and(|id| ids.contains(id));
                changed |= item.selected != want;
                item.selected = want;
            }
        }
        if changed {
            self.emit(SceneEvent::SelectionChanged);
        }
    }

    fn apply_alignment(&mut self, handle: ItemHandle, alignment: &Alignment) -> bool {
        let Some(item) = self.item_mut(handle) else {
            return false;
        };
        for (key, v) in [("x", alignment.x), ("y", alignment.y), ("w", alignment.w), ("h", alignment.h)] {
            item.geom.insert(key.into(), Value::from(v));
        }
        if let Some(adjust) = alignment.adjust1 {
            item.geom.insert("adjust1".into(), Value::from(adjust));
        }
        if alignment.pen_width.is_some() || alignment.pen_color.is_some() {
            let pen = item
                .style
                .entry("pen")
                .or_insert_with(|| Value::Object(Fields::new()));
            if let Some(pen) = pen.as_object_mut() {
                if let Some(width) = alignment.pen_width {
                    pen.insert("width".into(), Value::from(width));
                }
                if let Some(color) = &alignment.pen_color {
                    pen.insert("color".into(), Value::String(color.clone()));
                }
            }
        }
        self.emit(SceneEvent::Changed { handle, interacting: false });
        true
    }

    fn set_background(&mut self, size: ImageSize) {
        self.nodes
            .retain(|n| !matches!(n, SceneNode::Decoration(Decoration::Background { .. })));
        self.nodes.insert(
            0,
            SceneNode::Decoration(Decoration::Background { width: size.width, height: size.height }),
        );
    }

    fn clear(&mut self) {
        self.nodes.clear();
    }
}
