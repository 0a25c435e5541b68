//! Shared constants for the annosync crate.

// ── Identifiers ─────────────────────────────────────────────────

/// Prefix for generated annotation ids (`a000001`).
pub const ANNOTATION_ID_PREFIX: char = 'a';

/// Prefix for generated group ids (`g000007`).
pub const GROUP_ID_PREFIX: char = 'g';

/// Zero-padded width of the numeric part of a generated id.
pub const ID_DIGITS: usize = 6;

// ── Document ────────────────────────────────────────────────────

/// Version tag written into documents created from the scene side.
pub const DRAFT_VERSION: &str = "draft-1";

/// Canonical key order for annotation records. Unknown keys follow in their
/// original relative order.
pub const ANNOTATION_KEY_ORDER: [&str; 7] = ["id", "kind", "children", "geom", "meta", "style", "text"];

/// Canonical order for the top-level draft keys that precede extras.
pub const DRAFT_KEY_ORDER: [&str; 3] = ["version", "image", "annotations"];

// ── Meta defaults ───────────────────────────────────────────────

/// Default horizontal alignment for label/tech/note text.
pub const DEFAULT_ALIGN: &str = "center";

/// Default vertical alignment for text layout.
pub const DEFAULT_VALIGN: &str = "top";

/// Default label size in points.
pub const DEFAULT_LABEL_SIZE: i64 = 12;

/// Default tech size in points.
pub const DEFAULT_TECH_SIZE: i64 = 10;

/// Default note size in points.
pub const DEFAULT_NOTE_SIZE: i64 = 10;

// ── Style defaults ──────────────────────────────────────────────

/// Pen color applied to hand-edited records without one.
pub const DEFAULT_PEN_COLOR: &str = "#FF0000";

/// Pen width applied to hand-edited records without one.
pub const DEFAULT_PEN_WIDTH: i64 = 2;

/// Fully transparent brush.
pub const DEFAULT_BRUSH_COLOR: &str = "#00000000";

/// Text color applied to hand-edited records without one.
pub const DEFAULT_TEXT_COLOR: &str = "#FFFF00";

/// Text size applied to hand-edited records without one.
pub const DEFAULT_TEXT_SIZE_PT: i64 = 12;

// ── Geometry ────────────────────────────────────────────────────

/// Upper bound for a value to be read as a 0..1 fraction. Deliberately
/// forgiving so extraction results that overshoot the image edge still count.
pub const NORMALIZED_MAX: f64 = 1.5;

/// Decimal places kept when exporting scene geometry.
pub const GEOMETRY_DECIMALS: i32 = 2;

// ── Sync ────────────────────────────────────────────────────────

/// Quiet period after the last keystroke before the text is re-parsed.
pub const DEFAULT_DEBOUNCE_MS: u64 = 250;

/// Indentation used when serializing documents.
pub const DEFAULT_INDENT: usize = 2;
