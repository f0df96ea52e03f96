//! Navigation path expressions.
//!
//! A path strings together field accesses and array indexing the way source
//! code would: `Reference.Value`, `Values[2]`, `m_tables.m_buckets[3].m_value`.
//! A path may also start with an index when the root itself is an array
//! (`[0].Value`). The empty path denotes the root.

use std::fmt;

use crate::error::{HeapError, HeapResult};

/// One step of a navigation path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment
{
    Field(String),
    Index(u64),
}

impl fmt::Display for PathSegment
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            PathSegment::Field(name) => write!(f, ".{name}"),
            PathSegment::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// Parse a path expression into its segments.
///
/// ## Errors
///
/// `InvalidPath` for empty field names, unclosed or empty brackets, and
/// indices that are not unsigned integers.
///
/// ```rust
/// use heapnav_core::path::{parse_path, PathSegment};
///
/// let segments = parse_path("Values[2].Value").unwrap();
/// assert_eq!(
///     segments,
///     vec![
///         PathSegment::Field("Values".into()),
///         PathSegment::Index(2),
///         PathSegment::Field("Value".into()),
///     ]
/// );
/// ```
pub fn parse_path(path: &str) -> HeapResult<Vec<PathSegment>>
{
    let mut segments = Vec::new();
    if path.trim().is_empty() {
        return Ok(segments);
    }

    for (position, part) in path.split('.').enumerate() {
        let (name, mut rest) = part.split_at(part.find('[').unwrap_or(part.len()));
        let name = name.trim();
        if name.contains(']') {
            return Err(invalid(path, "unexpected ']'"));
        }
        if name.is_empty() {
            // Only a leading index may stand without a field name
            if position > 0 || rest.is_empty() {
                return Err(invalid(path, "empty field name"));
            }
        } else {
            segments.push(PathSegment::Field(name.to_string()));
        }

        while !rest.is_empty() {
            let Some(inner) = rest.strip_prefix('[') else {
                return Err(invalid(path, "expected '[' after index"));
            };
            let close = inner.find(']').ok_or_else(|| invalid(path, "unclosed '['"))?;
            let digits = inner[..close].trim();
            let index = digits
                .parse::<u64>()
                .map_err(|_| invalid(path, &format!("'{digits}' is not an array index")))?;
            segments.push(PathSegment::Index(index));
            rest = &inner[close + 1..];
        }
    }

    Ok(segments)
}

/// Render segments back into path syntax (`Values[2].Value`)
pub fn format_path(segments: &[PathSegment]) -> String
{
    let mut out = String::new();
    for segment in segments {
        match segment {
            PathSegment::Field(name) if out.is_empty() => out.push_str(name),
            other => out.push_str(&other.to_string()),
        }
    }
    out
}

fn invalid(path: &str, reason: &str) -> HeapError
{
    HeapError::InvalidPath(format!("{path}: {reason}"))
}
