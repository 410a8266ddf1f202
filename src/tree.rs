//! Nested intermediate form shared by the KV and TOML sources.
//!
//! Both sources start from something hierarchical (slash-delimited keys, TOML
//! tables), fold it into a [`KvTree`] and decode that tree against the
//! configuration's [`Shape`]. Decoding runs in two passes: a check pass that
//! validates every index against the schema without touching the value, then
//! the assignment pass. A malformed index therefore fails the whole source
//! before anything is written.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::assign::assign_leaf;
use crate::error::ConfbindError;
use crate::parsers::Parsers;
use crate::path::{Path, Segment, field_matches};
use crate::schema::{Bind, FieldShape, Node, Shape};

/// One level of a folded key space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvTree {
    Leaf(Vec<u8>),
    Dir(BTreeMap<String, KvTree>),
}

impl Default for KvTree {
    fn default() -> Self {
        KvTree::Dir(BTreeMap::new())
    }
}

impl KvTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `segments`, creating directories on the way.
    ///
    /// A segment that already holds a value cannot become a directory and a
    /// directory cannot be overwritten by a value.
    pub fn insert<S: AsRef<str>>(
        &mut self,
        segments: &[S],
        value: Vec<u8>,
    ) -> Result<(), ConfbindError> {
        let Some((last, parents)) = segments.split_last() else {
            return Ok(());
        };
        let mut current = self;
        for (depth, segment) in parents.iter().enumerate() {
            let KvTree::Dir(children) = current else {
                return Err(ConfbindError::ValueAndDirectory(joined(&segments[..depth])));
            };
            current = children
                .entry(segment.as_ref().to_string())
                .or_insert_with(KvTree::new);
            if let KvTree::Leaf(_) = current {
                return Err(ConfbindError::ValueAndDirectory(joined(&segments[..=depth])));
            }
        }
        let KvTree::Dir(children) = current else {
            return Err(ConfbindError::ValueAndDirectory(joined(parents)));
        };
        match children.get(last.as_ref()) {
            Some(KvTree::Dir(_)) => Err(ConfbindError::ValueAndDirectory(joined(segments))),
            _ => {
                children.insert(last.as_ref().to_string(), KvTree::Leaf(value));
                Ok(())
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&KvTree> {
        match self {
            KvTree::Dir(children) => children.get(key),
            KvTree::Leaf(_) => None,
        }
    }
}

/// Turns a stored leaf into the bytes of a `Vec<u8>` field.
pub type BlobDecoder = fn(key: &str, raw: &[u8]) -> Result<Vec<u8>, ConfbindError>;

/// Decodes a [`KvTree`] into a live configuration value.
pub struct TreeDecoder<'a> {
    parsers: &'a Parsers,
    blob: Option<BlobDecoder>,
    unknown: Vec<String>,
    assigned: usize,
}

impl<'a> TreeDecoder<'a> {
    pub fn new(parsers: &'a Parsers) -> Self {
        Self {
            parsers,
            blob: None,
            unknown: Vec::new(),
            assigned: 0,
        }
    }

    /// Decode leaves of byte-sequence fields with `blob` instead of taking
    /// their bytes verbatim.
    pub fn with_blob(mut self, blob: BlobDecoder) -> Self {
        self.blob = Some(blob);
        self
    }

    /// Dotted external keys that matched no struct field.
    pub fn unknown_keys(&self) -> &[String] {
        &self.unknown
    }

    /// Number of leaves written.
    pub fn assigned(&self) -> usize {
        self.assigned
    }

    pub fn decode(
        &mut self,
        config: &mut dyn Bind,
        shape: &Shape,
        tree: &KvTree,
    ) -> Result<(), ConfbindError> {
        check(shape, tree, &Path::new())?;
        self.decode_node(config.node(), shape, tree, &Path::new(), "")
    }

    fn decode_node(
        &mut self,
        node: Node<'_>,
        shape: &Shape,
        tree: &KvTree,
        path: &Path,
        ext: &str,
    ) -> Result<(), ConfbindError> {
        match (node, shape) {
            (Node::Opaque, _) => Ok(()),
            (Node::Pointer(pointer), Shape::Pointer(inner)) => {
                self.decode_node(pointer.get_or_alloc(), inner, tree, path, ext)
            }
            (Node::Struct(fields_node), Shape::Struct(fields)) => {
                let KvTree::Dir(children) = tree else {
                    return Err(expected_dir(path));
                };
                for (key, child) in children {
                    let child_ext = join_ext(ext, key);
                    let Some(field) = find_field(fields, key) else {
                        debug!(key = %child_ext, "skipping key with no matching field");
                        self.unknown.push(child_ext);
                        continue;
                    };
                    let Some(node) = fields_node.field(field.name) else {
                        continue;
                    };
                    let child_path = path.child(Segment::Field(field.name));
                    self.decode_node(node, &field.shape, child, &child_path, &child_ext)?;
                }
                Ok(())
            }
            (Node::Seq(seq), Shape::Seq { elem, .. }) => match tree {
                KvTree::Leaf(raw) if shape.is_bytes() => {
                    let bytes = match self.blob {
                        Some(blob) => blob(ext, raw)?,
                        None => raw.clone(),
                    };
                    if !seq.set_bytes(bytes) {
                        return Err(ConfbindError::InvalidValue {
                            path: path.to_string(),
                            reason: "byte length does not match the array".into(),
                        });
                    }
                    self.assigned += 1;
                    Ok(())
                }
                KvTree::Leaf(_) => Err(expected_dir(path)),
                KvTree::Dir(children) => {
                    for (index, child) in sorted_indices(children, path)? {
                        let len = seq.len();
                        let child_path = path.child(Segment::Index(index));
                        let child_ext = join_ext(ext, &index.to_string());
                        let mut fill = |node: Node<'_>| {
                            self.decode_node(node, elem, child, &child_path, &child_ext)
                        };
                        seq.fill_element(index, &mut fill).unwrap_or_else(|| {
                            Err(ConfbindError::IndexOutOfBounds {
                                index,
                                len,
                                key: path.to_string(),
                            })
                        })?;
                    }
                    Ok(())
                }
            },
            (Node::Map(map), Shape::Map { elem, .. }) => {
                let KvTree::Dir(children) = tree else {
                    return Err(expected_dir(path));
                };
                let parsers = self.parsers;
                for (key, child) in children {
                    let child_path = path.child(Segment::Key(key.clone()));
                    let child_ext = join_ext(ext, key);
                    let mut key_fill =
                        |key_node: Node<'_>| assign_leaf(key_node, key, parsers, &child_path);
                    let mut fill = |node: Node<'_>| {
                        self.decode_node(node, elem, child, &child_path, &child_ext)
                    };
                    map.fill_entry(&mut key_fill, &mut fill)?;
                }
                Ok(())
            }
            (node @ (Node::Scalar(_) | Node::Text(_)), _) => {
                let KvTree::Leaf(raw) = tree else {
                    return Err(ConfbindError::InvalidValue {
                        path: path.to_string(),
                        reason: "expected a value, found a directory".into(),
                    });
                };
                let raw = std::str::from_utf8(raw).map_err(|e| ConfbindError::InvalidValue {
                    path: path.to_string(),
                    reason: e.to_string(),
                })?;
                trace!(%path, "assigning");
                assign_leaf(node, raw, self.parsers, path)?;
                self.assigned += 1;
                Ok(())
            }
            _ => Err(ConfbindError::NotSettable {
                path: path.to_string(),
            }),
        }
    }
}

/// Validate every index in `tree` against `shape` without touching a value.
fn check(shape: &Shape, tree: &KvTree, path: &Path) -> Result<(), ConfbindError> {
    let KvTree::Dir(children) = tree else {
        return Ok(());
    };
    match shape.deref() {
        Shape::Struct(fields) => {
            for (key, child) in children {
                if let Some(field) = find_field(fields, key) {
                    check(&field.shape, child, &path.child(Segment::Field(field.name)))?;
                }
            }
        }
        Shape::Seq { elem, len } => {
            for (index, child) in sorted_indices(children, path)? {
                if let Some(len) = *len
                    && index >= len
                {
                    return Err(ConfbindError::IndexOutOfBounds {
                        index,
                        len,
                        key: path.child(Segment::Index(index)).to_string(),
                    });
                }
                check(elem, child, &path.child(Segment::Index(index)))?;
            }
        }
        Shape::Map { elem, .. } => {
            for (key, child) in children {
                check(elem, child, &path.child(Segment::Key(key.clone())))?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Dotted external keys of `tree` that match no struct field of `shape`.
///
/// Computed from the shape alone, so callers can reject a tree before
/// decoding any of it.
pub fn find_unknown_keys(shape: &Shape, tree: &KvTree) -> Vec<String> {
    let mut unknown = Vec::new();
    collect_unknown(shape, tree, "", &mut unknown);
    unknown
}

fn collect_unknown(shape: &Shape, tree: &KvTree, ext: &str, out: &mut Vec<String>) {
    let KvTree::Dir(children) = tree else {
        return;
    };
    for (key, child) in children {
        let child_ext = join_ext(ext, key);
        match shape.deref() {
            Shape::Struct(fields) => match find_field(fields, key) {
                Some(field) => collect_unknown(&field.shape, child, &child_ext, out),
                None => out.push(child_ext),
            },
            Shape::Seq { elem, .. } | Shape::Map { elem, .. } => {
                collect_unknown(elem, child, &child_ext, out)
            }
            _ => {}
        }
    }
}

/// The field a tree key addresses, looking through flattened fields.
pub(crate) fn find_field<'s>(fields: &'s [FieldShape], key: &str) -> Option<&'s FieldShape> {
    fields
        .iter()
        .find(|f| !f.inline && field_matches(key, f.name))
        .or_else(|| {
            fields.iter().filter(|f| f.inline).find_map(|f| match &f.shape {
                Shape::Struct(inner) => find_field(inner, key),
                _ => None,
            })
        })
}

/// Children of a sequence directory, ordered by numeric index.
fn sorted_indices<'t>(
    children: &'t BTreeMap<String, KvTree>,
    path: &Path,
) -> Result<Vec<(usize, &'t KvTree)>, ConfbindError> {
    let mut indexed = children
        .iter()
        .map(|(key, child)| {
            key.parse::<usize>()
                .map(|index| (index, child))
                .map_err(|_| ConfbindError::InvalidIndex {
                    segment: key.clone(),
                    key: path.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed)
}

fn joined<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("/")
}

fn expected_dir(path: &Path) -> ConfbindError {
    ConfbindError::InvalidValue {
        path: path.to_string(),
        reason: "expected a directory, found a value".into(),
    }
}

fn join_ext(ext: &str, key: &str) -> String {
    if ext.is_empty() {
        key.to_string()
    } else {
        format!("{ext}.{key}")
    }
}
