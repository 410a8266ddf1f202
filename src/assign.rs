//! Path-driven assignment of raw strings into a live configuration value.
//!
//! Descending a path allocates what is missing on the way: unset optional
//! values get a default instance, growable sequences are extended to the
//! requested index, map entries are inserted. The terminal segment is parsed
//! through the [`Parsers`] registry or the leaf's own text codec. New
//! sequence elements and map entries are only attached once the leaf below
//! them has been stored, so a failing entry leaves its collection as it was.
//!
//! Entries of a batch are applied one at a time. When one fails, the ones
//! before it stay applied.

use std::any::{Any, TypeId};

use tracing::trace;

use crate::error::ConfbindError;
use crate::parsers::Parsers;
use crate::path::{Path, Segment};
use crate::schema::{Bind, Node};

/// A path paired with the unparsed string found for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub path: Path,
    pub value: String,
}

impl RawEntry {
    pub fn new(path: impl Into<Path>, value: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }
}

/// Apply `entries` in order. Stops at the first failure.
pub fn apply(
    config: &mut dyn Bind,
    entries: &[RawEntry],
    parsers: &Parsers,
) -> Result<(), ConfbindError> {
    for entry in entries {
        trace!(path = %entry.path, "assigning");
        assign(
            config.node(),
            entry.path.segments(),
            &entry.value,
            parsers,
            &entry.path,
        )?;
    }
    Ok(())
}

/// Walk `rest` down from `node` and store `raw` at the end of it.
pub(crate) fn assign(
    node: Node<'_>,
    rest: &[Segment],
    raw: &str,
    parsers: &Parsers,
    full: &Path,
) -> Result<(), ConfbindError> {
    let Some((head, tail)) = rest.split_first() else {
        return assign_leaf(node, raw, parsers, full);
    };

    match node {
        Node::Pointer(pointer) => assign(pointer.get_or_alloc(), rest, raw, parsers, full),
        Node::Struct(fields) => {
            let child = match head {
                Segment::Field(name) => fields.field(name),
                _ => None,
            };
            let child = child.ok_or_else(|| unknown_field(head, full))?;
            assign(child, tail, raw, parsers, full)
        }
        Node::Seq(seq) => {
            let index = index_of(head, full)?;
            let len = seq.len();
            let mut fill = |child: Node<'_>| assign(child, tail, raw, parsers, full);
            seq.fill_element(index, &mut fill).unwrap_or_else(|| {
                Err(ConfbindError::IndexOutOfBounds {
                    index,
                    len,
                    key: full.to_string(),
                })
            })
        }
        Node::Map(map) => {
            let key = head.to_string();
            let mut key_fill = |key_node: Node<'_>| assign_leaf(key_node, &key, parsers, full);
            let mut fill = |child: Node<'_>| assign(child, tail, raw, parsers, full);
            map.fill_entry(&mut key_fill, &mut fill)
        }
        Node::Scalar(_) | Node::Text(_) => Err(unknown_field(head, full)),
        Node::Opaque => Err(ConfbindError::NotSettable {
            path: full.to_string(),
        }),
    }
}

/// Parse `raw` into the leaf at `node`.
pub(crate) fn assign_leaf(
    node: Node<'_>,
    raw: &str,
    parsers: &Parsers,
    path: &Path,
) -> Result<(), ConfbindError> {
    match node {
        Node::Pointer(pointer) => assign_leaf(pointer.get_or_alloc(), raw, parsers, path),
        Node::Scalar(scalar) => {
            let type_id = scalar.scalar_type();
            let value: Box<dyn Any + Send> = match parsers.get(type_id) {
                Some(parser) => parser
                    .parse(raw)
                    .map_err(|reason| ConfbindError::InvalidValue {
                        path: path.to_string(),
                        reason,
                    })?,
                None if type_id == TypeId::of::<String>() => Box::new(raw.to_string()),
                None => {
                    return Err(ConfbindError::ParserNotFound {
                        type_name: scalar.type_name(),
                        path: path.to_string(),
                    });
                }
            };
            scalar.set(value).map_err(|_| ConfbindError::NotSettable {
                path: path.to_string(),
            })
        }
        Node::Text(text) => text
            .decode(raw)
            .map_err(|reason| ConfbindError::InvalidValue {
                path: path.to_string(),
                reason,
            }),
        _ => Err(ConfbindError::NotSettable {
            path: path.to_string(),
        }),
    }
}

fn index_of(segment: &Segment, full: &Path) -> Result<usize, ConfbindError> {
    match segment {
        Segment::Index(index) => Ok(*index),
        Segment::Key(key) => key.parse().map_err(|_| ConfbindError::InvalidIndex {
            segment: key.clone(),
            key: full.to_string(),
        }),
        Segment::Field(name) => Err(ConfbindError::InvalidIndex {
            segment: name.to_string(),
            key: full.to_string(),
        }),
    }
}

fn unknown_field(segment: &Segment, full: &Path) -> ConfbindError {
    ConfbindError::UnknownField {
        field: segment.to_string(),
        path: full.to_string(),
    }
}
