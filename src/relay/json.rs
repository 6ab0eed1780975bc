//! JSON payload handling: nested-JSON normalization and dotted path lookup
//!
//! Paths look like `a.b[1].c`. Each `.`-separated segment is a field name,
//! optionally followed by one `[n]` index into the array stored under that
//! field. An empty field name (`[0]`) indexes the current value directly.

use serde_json::Value;

/// Recursively replace string leaves that hold JSON documents with the
/// parsed (and normalized) document.
///
/// Only strings whose trimmed text is wrapped in `{}` or `[]` are candidates;
/// anything that fails to parse is kept verbatim.
pub fn normalize(value: Value) -> Value {
    match value {
        Value::String(s) => match parse_embedded(&s) {
            Some(parsed) => normalize(parsed),
            None => Value::String(s),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, normalize(value)))
                .collect(),
        ),
        other => other,
    }
}

fn parse_embedded(s: &str) -> Option<Value> {
    let trimmed = s.trim();
    let wrapped = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if !wrapped {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// A parsed path segment
#[derive(Debug, PartialEq, Eq)]
struct Segment<'a> {
    field: &'a str,
    index: Option<usize>,
}

/// Split a segment into its field name and optional index.
///
/// A segment is indexed only when it contains both `[` and `]`; anything
/// else (`a[0` included) is a literal field name. The index is the text
/// after the first `[` up to the next bracket. Returns `None` for a
/// non-numeric index, which can never match anything.
fn parse_segment(part: &str) -> Option<Segment<'_>> {
    let open = match part.find('[') {
        Some(open) if part.contains(']') => open,
        _ => return Some(Segment { field: part, index: None }),
    };
    let index = part[open + 1..]
        .split(['[', ']'])
        .next()?
        .trim()
        .parse()
        .ok()?;
    Some(Segment {
        field: &part[..open],
        index: Some(index),
    })
}

/// Resolve `key` against `root`.
///
/// Strings come back as-is; numbers and booleans in their JSON text form;
/// arrays and objects as compact JSON. `null` and anything missing yield
/// `None`.
pub fn resolve(key: &str, root: &Value) -> Option<String> {
    let mut pointer = root;

    for part in key.split('.') {
        let segment = parse_segment(part)?;

        if segment.index.is_none() || !segment.field.is_empty() {
            pointer = match pointer {
                Value::Object(map) => map.get(segment.field)?,
                _ => return None,
            };
        }

        if let Some(index) = segment.index {
            pointer = match pointer {
                Value::Array(items) => items.get(index)?,
                _ => return None,
            };
        }
    }

    stringify(pointer)
}

fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}
