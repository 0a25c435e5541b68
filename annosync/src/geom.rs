//! Coordinate-space detection and rescaling of record geometry.
//!
//! Records arrive either in pixel space or as 0..1 fractions of the image
//! (typical for model-produced drafts). Detection probes the horizontal
//! position fields of a record; scaling multiplies horizontal fields by one
//! factor and vertical fields by another, which covers both converting
//! fractions to pixels and remapping from a declared image size to the
//! actual one.
//!
//! Shape parameters (`adjust1`, `adjust2`) and polygon `points` are relative
//! to the bounding box and are never scaled.

#[cfg(test)]
#[path = "geom_test.rs"]
mod geom_test;

use serde_json::Value;

use crate::consts::NORMALIZED_MAX;
use crate::doc::{AnnotationRecord, ImageSize, Kind, as_number};

/// Whether a single coordinate reads as a fraction of the image.
#[must_use]
pub fn looks_normalized(v: f64) -> bool {
    looks_normalized_within(v, NORMALIZED_MAX)
}

/// [`looks_normalized`] with an explicit upper bound.
#[must_use]
pub fn looks_normalized_within(v: f64, max: f64) -> bool {
    (0.0..=max).contains(&v)
}

/// Coordinate space of a record's geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    Normalized,
    Pixel,
}

/// Decide the coordinate space of a record.
///
/// Bounding-box kinds probe `x` and `w`, lines probe `x1` and `x2`, text
/// probes `x`. A group is normalized when it has members and every member
/// is. Missing or non-numeric probes and unknown kinds read as pixels.
#[must_use]
pub fn detect_space(rec: &AnnotationRecord, max: f64) -> Space {
    let Some(kind) = rec.kind() else {
        return Space::Pixel;
    };
    if kind == Kind::Group {
        let children = rec.children();
        let all = !children.is_empty() && children.iter().all(|c| detect_space(c, max) == Space::Normalized);
        return if all { Space::Normalized } else { Space::Pixel };
    }
    let probes: &[&str] = match kind {
        Kind::Line => &["x1", "x2"],
        Kind::Text => &["x"],
        _ => &["x", "w"],
    };
    let normalized = probes
        .iter()
        .all(|key| rec.geom_number(key).is_some_and(|v| looks_normalized_within(v, max)));
    if normalized { Space::Normalized } else { Space::Pixel }
}

/// How to rescale a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rescale {
    /// Fractions to pixels of an image this size.
    ToPixels(ImageSize),
    /// Pixel space to pixel space by independent factors.
    Ratio { sx: f64, sy: f64 },
}

impl Rescale {
    /// Remap from a declared image size to the actual one. A declared size
    /// that is missing or not strictly positive is replaced by the actual
    /// size, giving a unit ratio.
    #[must_use]
    pub fn between(actual: ImageSize, declared: Option<ImageSize>) -> Self {
        let declared = declared.filter(|d| d.is_positive()).unwrap_or(actual);
        Self::Ratio {
            sx: actual.width / declared.width,
            sy: actual.height / declared.height,
        }
    }

    fn factors(self) -> (f64, f64) {
        match self {
            Self::ToPixels(size) => (size.width, size.height),
            Self::Ratio { sx, sy } => (sx, sy),
        }
    }
}

/// Return a copy of `rec` with its geometry scaled. Groups recurse into
/// their members. Records of unknown kind are returned unchanged.
#[must_use]
pub fn scale_record(rec: &AnnotationRecord, how: Rescale) -> AnnotationRecord {
    let mut out = rec.clone();
    let Some(kind) = rec.kind() else {
        return out;
    };
    if kind == Kind::Group {
        if out.get("children").is_some_and(Value::is_array) {
            let children = rec.children().iter().map(|c| scale_record(c, how)).collect();
            out.set_children(children);
        }
        return out;
    }

    let (sx, sy) = how.factors();
    let (horizontal, vertical): (&[&str], &[&str]) = match kind {
        Kind::Line => (&["x1", "x2"], &["y1", "y2"]),
        Kind::Text => (&["x"], &["y"]),
        _ => (&["x", "w"], &["y", "h"]),
    };

    let mut geom = rec.geom().cloned().unwrap_or_default();
    for (keys, factor) in [(horizontal, sx), (vertical, sy)] {
        for key in keys {
            let v = geom.get(*key).map_or(Some(0.0), as_number);
            if let Some(v) = v {
                geom.insert((*key).to_string(), Value::from(v * factor));
            }
        }
    }
    out.insert("geom", Value::Object(geom));
    out
}

/// Bring a record into the actual image's pixel space, whichever space it
/// was written in.
#[must_use]
pub fn reconcile(rec: &AnnotationRecord, actual: ImageSize, declared: Option<ImageSize>, max: f64) -> AnnotationRecord {
    match detect_space(rec, max) {
        Space::Normalized => scale_record(rec, Rescale::ToPixels(actual)),
        Space::Pixel => scale_record(rec, Rescale::between(actual, declared)),
    }
}

/// Round to the export precision.
#[must_use]
pub fn round_to(v: f64, decimals: i32) -> f64 {
    let p = 10f64.powi(decimals);
    (v * p).round() / p
}
