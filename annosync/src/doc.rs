//! Document model: annotation records, draft documents, and their canonical form.
//!
//! This module defines the record kinds (`Kind`), a single annotation record
//! (`AnnotationRecord`) backed by an order-preserving JSON map so fields the
//! engine does not understand survive every edit, and the draft document that
//! owns the ordered record list (`Draft`).
//!
//! Text flows into this layer through [`parse`] (hand edits, imports, AI
//! drafts) and out through [`serialize`]. Serialization always normalizes meta
//! and applies the canonical key order first, so a document that has not
//! changed produces byte-identical text.

#[cfg(test)]
#[path = "doc_test.rs"]
mod doc_test;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::ErrorCode;
use crate::consts::{
    ANNOTATION_KEY_ORDER, DEFAULT_ALIGN, DEFAULT_BRUSH_COLOR, DEFAULT_LABEL_SIZE, DEFAULT_NOTE_SIZE,
    DEFAULT_PEN_COLOR, DEFAULT_PEN_WIDTH, DEFAULT_TECH_SIZE, DEFAULT_TEXT_COLOR, DEFAULT_TEXT_SIZE_PT,
    DEFAULT_VALIGN, DRAFT_KEY_ORDER, DRAFT_VERSION,
};

/// Order-preserving JSON object. Alias to reduce noise in signatures.
pub type Fields = Map<String, Value>;

// =============================================================================
// ERRORS
// =============================================================================

/// Errors produced while reading or writing document text.
#[derive(Debug, thiserror::Error)]
pub enum DocError {
    /// The text is not well-formed JSON.
    #[error("JSON parse error: {0}")]
    Parse(String),

    /// Well-formed JSON that does not have the draft shape.
    #[error("invalid schema: {0}")]
    Schema(String),

    /// The document could not be rendered to text.
    #[error("serialize failed: {0}")]
    Serialize(String),
}

impl ErrorCode for DocError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Parse(_) => "E_PARSE",
            Self::Schema(_) => "E_SCHEMA",
            Self::Serialize(_) => "E_SERIALIZE",
        }
    }
}

// =============================================================================
// KIND
// =============================================================================

/// The kind of an annotation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Axis-aligned rectangle.
    Rect,
    /// Rectangle with rounded corners; `adjust1` is the corner radius.
    RoundedRect,
    /// Ellipse inscribed in the bounding box.
    Ellipse,
    /// Straight line between `x1,y1` and `x2,y2`.
    Line,
    /// Free text anchored at `x,y`.
    Text,
    /// Hexagon; `adjust1` is the horizontal inset fraction.
    Hexagon,
    /// Cylinder; `adjust1` is the cap height fraction.
    Cylinder,
    /// Right-pointing block arrow; `adjust1` shaft fraction, `adjust2` head length.
    BlockArrow,
    /// Polygon with `points` relative to its bounding box.
    Polygon,
    /// Container whose members live in `children`.
    Group,
}

impl Kind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::Rect,
        Self::RoundedRect,
        Self::Ellipse,
        Self::Line,
        Self::Text,
        Self::Hexagon,
        Self::Cylinder,
        Self::BlockArrow,
        Self::Polygon,
        Self::Group,
    ];

    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rect => "rect",
            Self::RoundedRect => "roundedrect",
            Self::Ellipse => "ellipse",
            Self::Line => "line",
            Self::Text => "text",
            Self::Hexagon => "hexagon",
            Self::Cylinder => "cylinder",
            Self::BlockArrow => "blockarrow",
            Self::Polygon => "polygon",
            Self::Group => "group",
        }
    }

    /// Parse an exact wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// Parse a wire name or one of the external diagram type names that map
    /// onto a kind (C4 and PlantUML element types).
    #[must_use]
    pub fn resolve(name: &str) -> Option<Self> {
        Self::parse(name).or_else(|| resolve_alias(name))
    }

    /// Geometry fields a record of this kind must carry.
    #[must_use]
    pub fn required_geom(self) -> &'static [&'static str] {
        match self {
            Self::Line => &["x1", "y1", "x2", "y2"],
            Self::Text => &["x", "y"],
            Self::Group => &[],
            _ => &["x", "y", "w", "h"],
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn resolve_alias(name: &str) -> Option<Kind> {
    let base = name.strip_prefix("external_").unwrap_or(name);
    if base.ends_with("_db") || base == "database" {
        return Some(Kind::Cylinder);
    }
    let base = base.strip_suffix("_queue").unwrap_or(base);
    match base {
        "person" | "system" | "container" | "component" | "boundary" => Some(Kind::RoundedRect),
        "actor" | "interface" | "usecase" => Some(Kind::Ellipse),
        "rectangle" | "node" => Some(Kind::Rect),
        _ => None,
    }
}

// =============================================================================
// NUMBERS
// =============================================================================

/// Read a JSON value as a number. Numeric strings (`"12.5"`) count, matching
/// how loosely hand-edited and model-produced documents spell numbers.
#[must_use]
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Some(n),
            _ => None,
        },
        _ => None,
    }
}

// =============================================================================
// ANNOTATION RECORD
// =============================================================================

/// One serializable annotation. Wraps the record's JSON object so unknown
/// and future fields are carried verbatim, in their original order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationRecord(Fields);

impl AnnotationRecord {
    /// Create a record with a kind and geometry and nothing else.
    #[must_use]
    pub fn new(kind: Kind, geom: Fields) -> Self {
        let mut fields = Fields::new();
        fields.insert("kind".into(), Value::String(kind.as_str().into()));
        if kind != Kind::Group {
            fields.insert("geom".into(), Value::Object(geom));
        }
        Self(fields)
    }

    /// Wrap an existing JSON object.
    #[must_use]
    pub fn from_fields(fields: Fields) -> Self {
        Self(fields)
    }

    /// Wrap a JSON value if it is an object.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    /// Borrow the underlying JSON object.
    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.0
    }

    /// Raw field access.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Insert or replace a field. A new key goes to the end; an existing key
    /// keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// The record id, if it is a non-empty string.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.0
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Set the record id.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert("id".into(), Value::String(id.into()));
    }

    /// The `kind` field exactly as written.
    #[must_use]
    pub fn kind_name(&self) -> Option<&str> {
        self.0.get("kind").and_then(Value::as_str)
    }

    /// The resolved kind, if the `kind` field names one (directly or by alias).
    #[must_use]
    pub fn kind(&self) -> Option<Kind> {
        self.kind_name().and_then(Kind::resolve)
    }

    /// Geometry sub-record.
    #[must_use]
    pub fn geom(&self) -> Option<&Fields> {
        self.0.get("geom").and_then(Value::as_object)
    }

    /// A numeric geometry field.
    #[must_use]
    pub fn geom_number(&self, key: &str) -> Option<f64> {
        self.geom().and_then(|g| g.get(key)).and_then(as_number)
    }

    /// Meta sub-record.
    #[must_use]
    pub fn meta(&self) -> Option<&Fields> {
        self.0.get("meta").and_then(Value::as_object)
    }

    /// Style sub-record.
    #[must_use]
    pub fn style(&self) -> Option<&Fields> {
        self.0.get("style").and_then(Value::as_object)
    }

    /// Raw text content (text-kind items).
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.0.get("text").and_then(Value::as_str)
    }

    /// Stacking order. Absent means zero.
    #[must_use]
    pub fn z(&self) -> i64 {
        match self.0.get("z") {
            Some(v) => v
                .as_i64()
                .or_else(|| as_number(v).map(f64_to_i64))
                .unwrap_or(0),
            None => 0,
        }
    }

    /// Set the stacking order. Zero removes the field.
    pub fn set_z(&mut self, z: i64) {
        if z == 0 {
            self.0.shift_remove("z");
        } else {
            self.0.insert("z".into(), Value::from(z));
        }
    }

    /// Member records of a group. Non-object entries are skipped.
    #[must_use]
    pub fn children(&self) -> Vec<AnnotationRecord> {
        self.0
            .get("children")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_object().cloned().map(Self))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replace the member records of a group.
    pub fn set_children(&mut self, children: Vec<AnnotationRecord>) {
        let list = children.into_iter().map(|c| Value::Object(c.0)).collect();
        self.0.insert("children".into(), Value::Array(list));
    }

    /// Overwrite this record's fields with every field present in `fresh`.
    /// Fields `fresh` does not carry are kept as they are.
    pub fn merge_from(&mut self, fresh: &AnnotationRecord) {
        for (k, v) in &fresh.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn f64_to_i64(v: f64) -> i64 {
    v as i64
}

// =============================================================================
// IMAGE SIZE
// =============================================================================

/// Pixel dimensions of a source or background image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageSize {
    pub width: f64,
    pub height: f64,
}

impl ImageSize {
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Whether both dimensions are strictly positive.
    #[must_use]
    pub fn is_positive(self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

// =============================================================================
// DRAFT DOCUMENT
// =============================================================================

/// A draft document: an ordered annotation list plus top-level fields
/// (`version`, `image`, and anything else the source carried).
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    annotations: Vec<AnnotationRecord>,
    extra: Fields,
}

impl Draft {
    /// An empty document as created from the scene side.
    #[must_use]
    pub fn new() -> Self {
        let mut extra = Fields::new();
        extra.insert("version".into(), Value::String(DRAFT_VERSION.into()));
        extra.insert("image".into(), json!({}));
        Self { annotations: Vec::new(), extra }
    }

    /// Validate a parsed JSON value and build a document from it.
    ///
    /// # Errors
    ///
    /// Returns [`DocError::Schema`] if the value is not an object with an
    /// `annotations` list, if an entry is not an object, or if a record of a
    /// recognized kind lacks a required numeric geometry field.
    pub fn from_value(value: Value) -> Result<Self, DocError> {
        let Value::Object(mut root) = value else {
            return Err(DocError::Schema("must contain 'annotations' list".into()));
        };
        let Some(Value::Array(list)) = root.shift_remove("annotations") else {
            return Err(DocError::Schema("must contain 'annotations' list".into()));
        };
        let mut annotations = Vec::with_capacity(list.len());
        for (i, entry) in list.into_iter().enumerate() {
            let Some(rec) = AnnotationRecord::from_value(entry) else {
                return Err(DocError::Schema(format!("annotations[{i}] is not an object")));
            };
            validate_record(&rec, &format!("annotations[{i}]"))?;
            annotations.push(rec);
        }
        Ok(Self { annotations, extra: root })
    }

    /// Render to a JSON value. `version`, `image` and `annotations` come
    /// first, other top-level fields follow in their original order.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut root = Fields::new();
        for key in DRAFT_KEY_ORDER {
            if key == "annotations" {
                let list = self
                    .annotations
                    .iter()
                    .map(|r| Value::Object(r.fields().clone()))
                    .collect();
                root.insert(key.into(), Value::Array(list));
            } else if let Some(v) = self.extra.get(key) {
                root.insert(key.into(), v.clone());
            }
        }
        for (k, v) in &self.extra {
            if !root.contains_key(k) {
                root.insert(k.clone(), v.clone());
            }
        }
        Value::Object(root)
    }

    /// The version tag, if present.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.extra.get("version").and_then(Value::as_str)
    }

    /// Declared source image size, if both dimensions are present and numeric.
    #[must_use]
    pub fn image_size(&self) -> Option<ImageSize> {
        let image = self.extra.get("image")?.as_object()?;
        let width = image.get("width").and_then(as_number)?;
        let height = image.get("height").and_then(as_number)?;
        Some(ImageSize::new(width, height))
    }

    /// The records, in document order.
    #[must_use]
    pub fn annotations(&self) -> &[AnnotationRecord] {
        &self.annotations
    }

    /// Mutable access to the record list.
    pub fn annotations_mut(&mut self) -> &mut Vec<AnnotationRecord> {
        &mut self.annotations
    }

    /// Number of top-level records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    /// Returns `true` if the document has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }
}

impl Default for Draft {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_record(rec: &AnnotationRecord, path: &str) -> Result<(), DocError> {
    let Some(kind) = rec.kind() else {
        return Ok(());
    };
    if kind == Kind::Group {
        let Some(children) = rec.get("children") else {
            return Ok(());
        };
        let Some(list) = children.as_array() else {
            return Err(DocError::Schema(format!("{path}.children must be a list")));
        };
        for (i, child) in list.iter().enumerate() {
            let child_path = format!("{path}.children[{i}]");
            let Some(child) = child.as_object() else {
                return Err(DocError::Schema(format!("{child_path} is not an object")));
            };
            validate_record(&AnnotationRecord(child.clone()), &child_path)?;
        }
        return Ok(());
    }
    for key in kind.required_geom() {
        if rec.geom_number(key).is_none() {
            return Err(DocError::Schema(format!("{path} ({kind}) is missing numeric geom.{key}")));
        }
    }
    Ok(())
}

// =============================================================================
// NORMALIZATION
// =============================================================================

/// Fill every recognized meta field, keeping values already present.
///
/// Unrecognized meta keys are kept after the recognized ones, in their
/// original order. Text items with an empty note take the label as note.
#[must_use]
pub fn normalize_meta(meta: &Fields, kind: &str) -> Fields {
    let present = |key: &str| meta.get(key).filter(|v| !v.is_null()).cloned();
    let defaults: [(&str, Value); 13] = [
        ("label", json!("")),
        ("tech", json!("")),
        ("note", json!("")),
        ("label_align", json!(DEFAULT_ALIGN)),
        ("label_size", json!(DEFAULT_LABEL_SIZE)),
        ("tech_align", json!(DEFAULT_ALIGN)),
        ("tech_size", json!(DEFAULT_TECH_SIZE)),
        ("note_align", json!(DEFAULT_ALIGN)),
        ("note_size", json!(DEFAULT_NOTE_SIZE)),
        ("text_valign", json!(DEFAULT_VALIGN)),
        ("text_spacing", json!(0)),
        ("text_box_width", json!(0.0)),
        ("text_box_height", json!(0.0)),
    ];

    let mut out = Fields::new();
    for (key, default) in defaults {
        out.insert(key.into(), present(key).unwrap_or(default));
    }
    for (k, v) in meta {
        if !out.contains_key(k) {
            out.insert(k.clone(), v.clone());
        }
    }

    if kind == Kind::Text.as_str() {
        let note_empty = out.get("note").and_then(Value::as_str).is_some_and(str::is_empty);
        let label = out.get("label").and_then(Value::as_str).unwrap_or("").to_string();
        if note_empty && !label.is_empty() {
            out.insert("note".into(), Value::String(label));
        }
    }
    out
}

/// Normalize one record: uniform meta shape, no zero `z`, children recursed.
#[must_use]
pub fn normalize_record(rec: &AnnotationRecord) -> AnnotationRecord {
    let mut out = rec.clone();
    let kind = rec.kind_name().unwrap_or("").to_string();
    let meta = rec.meta().cloned().unwrap_or_default();
    out.insert("meta", Value::Object(normalize_meta(&meta, &kind)));
    if out.get("z").is_some() {
        let z = out.z();
        out.set_z(z);
    }
    if out.get("children").is_some_and(Value::is_array) {
        let children = out.children().iter().map(normalize_record).collect();
        out.set_children(children);
    }
    out
}

/// Normalize every record of a document.
#[must_use]
pub fn normalize_draft(draft: &Draft) -> Draft {
    Draft {
        annotations: draft.annotations.iter().map(normalize_record).collect(),
        extra: draft.extra.clone(),
    }
}

/// Fill missing style sub-fields with fixed defaults so the record can be
/// rendered however minimally it was written. Recurses into group members.
pub fn fill_default_style(rec: &mut AnnotationRecord) {
    let style = rec
        .0
        .entry("style")
        .or_insert_with(|| Value::Object(Fields::new()));
    if !style.is_object() {
        *style = Value::Object(Fields::new());
    }
    if let Some(style) = style.as_object_mut() {
        fill_sub(style, "pen", &[("color", json!(DEFAULT_PEN_COLOR)), ("width", json!(DEFAULT_PEN_WIDTH))]);
        fill_sub(style, "brush", &[("color", json!(DEFAULT_BRUSH_COLOR))]);
        fill_sub(
            style,
            "text",
            &[("color", json!(DEFAULT_TEXT_COLOR)), ("size_pt", json!(DEFAULT_TEXT_SIZE_PT))],
        );
    }
    if rec.get("children").is_some_and(Value::is_array) {
        let mut children = rec.children();
        for child in &mut children {
            fill_default_style(child);
        }
        rec.set_children(children);
    }
}

fn fill_sub(style: &mut Fields, key: &str, defaults: &[(&str, Value)]) {
    let sub = style
        .entry(key)
        .or_insert_with(|| Value::Object(Fields::new()));
    if !sub.is_object() {
        *sub = Value::Object(Fields::new());
    }
    if let Some(sub) = sub.as_object_mut() {
        for (k, v) in defaults {
            if sub.get(*k).is_none_or(Value::is_null) {
                sub.insert((*k).to_string(), v.clone());
            }
        }
    }
}

// =============================================================================
// CANONICAL ORDER
// =============================================================================

/// Reorder a record's keys: id, kind, children, geom, meta, style, text, then
/// every other key in its original relative order. Recurses into `children`.
#[must_use]
pub fn sort_annotation_keys(rec: &AnnotationRecord) -> AnnotationRecord {
    let mut out = Fields::new();
    for key in ANNOTATION_KEY_ORDER {
        let Some(value) = rec.0.get(key) else {
            continue;
        };
        if key == "children" {
            if let Value::Array(list) = value {
                let sorted = list
                    .iter()
                    .map(|c| match c {
                        Value::Object(f) => Value::Object(sort_annotation_keys(&AnnotationRecord(f.clone())).0),
                        other => other.clone(),
                    })
                    .collect();
                out.insert(key.into(), Value::Array(sorted));
                continue;
            }
        }
        out.insert(key.into(), value.clone());
    }
    for (k, v) in &rec.0 {
        if !out.contains_key(k) {
            out.insert(k.clone(), v.clone());
        }
    }
    AnnotationRecord(out)
}

/// Apply [`sort_annotation_keys`] to every top-level record.
#[must_use]
pub fn sort_draft_data(draft: &Draft) -> Draft {
    Draft {
        annotations: draft.annotations.iter().map(sort_annotation_keys).collect(),
        extra: draft.extra.clone(),
    }
}

// =============================================================================
// TEXT
// =============================================================================

/// Parse editor text into a document.
///
/// # Errors
///
/// Returns [`DocError::Parse`] for malformed JSON and [`DocError::Schema`]
/// for JSON without the draft shape.
pub fn parse(text: &str) -> Result<Draft, DocError> {
    let value: Value = serde_json::from_str(text).map_err(|e| DocError::Parse(e.to_string()))?;
    Draft::from_value(value)
}

/// Normalize, order canonically, and render a document as indented JSON.
///
/// # Errors
///
/// Returns [`DocError::Serialize`] if the writer fails.
pub fn serialize(draft: &Draft, indent: usize) -> Result<String, DocError> {
    let canonical = sort_draft_data(&normalize_draft(draft));
    let value = canonical.to_value();
    let indent = vec![b' '; indent];
    let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent);
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut ser)
        .map_err(|e| DocError::Serialize(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| DocError::Serialize(e.to_string()))
}

/// Remove a surrounding markdown code fence (```` ```json ... ``` ````).
#[must_use]
pub fn strip_markdown_fences(s: &str) -> &str {
    let trimmed = s.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    let body = body.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '_');
    body.trim()
}

/// Pull the first JSON object out of free-form model output. Handles fenced
/// blocks and prose around the object.
#[must_use]
pub fn extract_first_json_object(s: &str) -> Option<Value> {
    let body = strip_markdown_fences(s);
    if body.starts_with('{') && body.ends_with('}') {
        if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(body) {
            return Some(v);
        }
    }

    let start = body.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in body[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let candidate = &body[start..=start + i];
                    return match serde_json::from_str::<Value>(candidate) {
                        Ok(v @ Value::Object(_)) => Some(v),
                        _ => None,
                    };
                }
            }
            _ => {}
        }
    }
    None
}
