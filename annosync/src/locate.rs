//! Locating annotation objects inside serialized document text.
//!
//! The editor needs two lookups: which annotation the cursor sits in, and
//! where a given annotation's object starts and ends. Both run on whatever
//! the user has typed, which is often not valid JSON mid-edit, so they work
//! from a tolerant structural scan instead of a parse. Strings and escapes
//! are honored; unclosed objects are ignored.
//!
//! Offsets are byte offsets into the text.

#[cfg(test)]
#[path = "locate_test.rs"]
mod locate_test;

/// Byte range and line range of one object in the text. `end` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub first_line: usize,
    pub last_line: usize,
}

#[derive(Debug, Clone)]
struct ObjectSpan {
    start: usize,
    end: usize,
    id: Option<String>,
}

enum Frame {
    Object {
        start: usize,
        key: Option<String>,
        id: Option<String>,
    },
    Array,
}

/// Id of the innermost object around `offset` that has a direct `"id"`
/// string field. Nested objects without an id (geometry, meta) defer to
/// their enclosing record.
#[must_use]
pub fn annotation_at(text: &str, offset: usize) -> Option<String> {
    let mut containing: Vec<ObjectSpan> = scan(text)
        .into_iter()
        .filter(|o| o.start < offset && offset <= o.end)
        .collect();
    containing.sort_by_key(|o| std::cmp::Reverse(o.start));
    containing.into_iter().find_map(|o| o.id)
}

/// Span of the first object whose direct `"id"` field equals `id`.
#[must_use]
pub fn annotation_span(text: &str, id: &str) -> Option<Span> {
    let object = scan(text)
        .into_iter()
        .filter(|o| o.id.as_deref() == Some(id))
        .min_by_key(|o| o.start)?;
    Some(Span {
        start: object.start,
        end: object.end,
        first_line: line_of(text, object.start),
        last_line: line_of(text, object.end.saturating_sub(1)),
    })
}

/// Zero-based line number of a byte offset.
#[must_use]
pub fn line_of(text: &str, offset: usize) -> usize {
    let end = offset.min(text.len());
    text.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count()
}

/// Byte offset where a zero-based line starts, clamped to the text length.
#[must_use]
pub fn line_start(text: &str, line: usize) -> usize {
    if line == 0 {
        return 0;
    }
    text.match_indices('\n')
        .nth(line - 1)
        .map_or(text.len(), |(i, _)| i + 1)
}

fn scan(text: &str) -> Vec<ObjectSpan> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                let (value, next) = read_string(text, i);
                i = next;
                if let Some(Frame::Object { key, id, .. }) = stack.last_mut() {
                    if next_significant(bytes, i) == Some(b':') {
                        *key = Some(value);
                    } else if key.as_deref() == Some("id") && id.is_none() {
                        *id = Some(value);
                    }
                }
                continue;
            }
            b'{' => stack.push(Frame::Object { start: i, key: None, id: None }),
            b'[' => stack.push(Frame::Array),
            b'}' => {
                if let Some(Frame::Object { start, id, .. }) = stack.pop() {
                    out.push(ObjectSpan { start, end: i + 1, id });
                }
            }
            b']' => {
                stack.pop();
            }
            b',' => {
                if let Some(Frame::Object { key, .. }) = stack.last_mut() {
                    *key = None;
                }
            }
            _ => {}
        }
        i += 1;
    }
    out
}

/// Read a string literal starting at the opening quote. Returns the decoded
/// value and the offset just past the closing quote (or the end of text for
/// an unterminated literal).
fn read_string(text: &str, open: usize) -> (String, usize) {
    let bytes = text.as_bytes();
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => {
                let raw = &text[open..=i];
                let value = match serde_json::from_str::<String>(raw) {
                    Ok(s) => s,
                    Err(_) => raw[1..raw.len() - 1].to_string(),
                };
                return (value, i + 1);
            }
            _ => i += 1,
        }
    }
    let end = bytes.len();
    (text.get(open + 1..end).unwrap_or("").to_string(), end)
}

fn next_significant(bytes: &[u8], from: usize) -> Option<u8> {
    bytes[from.min(bytes.len())..]
        .iter()
        .copied()
        .find(|b| !b.is_ascii_whitespace())
}
