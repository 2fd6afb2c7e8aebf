//! Dot-separated paths into nested JSON mappings.
//!
//! A path addresses a leaf inside nested objects only. Sequences are not
//! addressable: a path that has to step through an array fails with
//! [`PathError::TraversesSequence`] rather than guessing at an index.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};
use thiserror::Error;

/// Separator between path segments.
pub const PATH_DELIMITER: char = '.';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("Path is empty")]
    Empty,

    #[error("Path \"{0}\" contains an empty segment")]
    EmptySegment(String),

    #[error("Path \"{path}\" traverses a sequence at segment \"{segment}\"; list indexing is unsupported")]
    TraversesSequence { path: String, segment: String },

    #[error("Cannot write path \"{0}\": container is not an object")]
    NotAnObject(String),
}

/// A validated location inside a nested mapping, e.g. `customer.ssn`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SensitivePath {
    raw: String,
    segments: Vec<String>,
}

impl SensitivePath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }
        let segments: Vec<String> = raw.split(PATH_DELIMITER).map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(PathError::EmptySegment(raw.to_string()));
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    fn traverses_sequence(&self, segment: &str) -> PathError {
        PathError::TraversesSequence {
            path: self.raw.clone(),
            segment: segment.to_string(),
        }
    }
}

impl fmt::Display for SensitivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for SensitivePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for SensitivePath {
    type Error = PathError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

/// Parse a list of raw paths, failing on the first invalid one.
///
/// Repeated paths are dropped; the first occurrence keeps its position.
pub fn parse_paths<I, S>(raw: I) -> Result<Vec<SensitivePath>, PathError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut paths: Vec<SensitivePath> = Vec::new();
    for p in raw {
        let parsed = SensitivePath::parse(p.as_ref())?;
        if !paths.contains(&parsed) {
            paths.push(parsed);
        }
    }
    Ok(paths)
}

/// Read the value at `path`.
///
/// `Ok(None)` when any segment is missing or an intermediate is null or a
/// scalar. An explicit `null` leaf is present and comes back as `Some`.
pub fn get<'a>(container: &'a Value, path: &SensitivePath) -> Result<Option<&'a Value>, PathError> {
    let mut current = container;
    for segment in &path.segments {
        current = match current {
            Value::Object(map) => match map.get(segment) {
                Some(next) => next,
                None => return Ok(None),
            },
            Value::Array(_) => return Err(path.traverses_sequence(segment)),
            _ => return Ok(None),
        };
    }
    Ok(Some(current))
}

/// Write `value` at `path`, creating empty mappings for missing, null, or
/// scalar intermediates. The root must be an object.
pub fn set(container: &mut Value, path: &SensitivePath, value: Value) -> Result<(), PathError> {
    let (leaf, parents) = path.segments.split_last().ok_or(PathError::Empty)?;

    let mut current: &mut Map<String, Value> = match container {
        Value::Object(map) => map,
        _ => return Err(PathError::NotAnObject(path.raw.clone())),
    };

    for segment in parents {
        let slot = current.entry(segment.clone()).or_insert(Value::Null);
        if slot.is_array() {
            return Err(path.traverses_sequence(segment));
        }
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = slot
            .as_object_mut()
            .ok_or_else(|| PathError::NotAnObject(path.raw.clone()))?;
    }

    current.insert(leaf.clone(), value);
    Ok(())
}
