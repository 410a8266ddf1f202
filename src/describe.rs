//! Key listing for operators.
//!
//! Walks a [`Shape`] and reports, for every statically reachable entry, the
//! names each source reads it under. Collections are reported once with the
//! base name their members hang off (`APP_PORTS_<index>`, `app/ports/<index>`).

use std::fmt;

use crate::env::DEFAULT_SEPARATOR;
use crate::path::{Path, Segment, env_key, flag_name, kv_key};
use crate::schema::Shape;

/// How an entry is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// A scalar or text leaf.
    Value,
    /// An optional struct. Its flag switches it on.
    Switch,
    /// A sequence of leaves, one member per index.
    List,
    /// A map from leaves to leaves.
    Pairs,
    /// A sequence or map of structs. No flag reaches its members.
    Members,
}

/// Naming conventions of the configured sources.
#[derive(Debug, Clone)]
pub struct Naming {
    pub env_prefix: String,
    pub env_separator: String,
    pub kv_prefix: String,
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            env_prefix: String::new(),
            env_separator: DEFAULT_SEPARATOR.to_string(),
            kv_prefix: String::new(),
        }
    }
}

/// One entry of a configuration's key space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub path: Path,
    pub kind: KeyKind,
    pub type_name: &'static str,
    pub env: String,
    pub kv: String,
    /// Long flag name, without `--`.
    pub flag: Option<String>,
}

impl fmt::Display for KeyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let member = match self.kind {
            KeyKind::List | KeyKind::Members => "_<index>",
            KeyKind::Pairs => "_<key>",
            KeyKind::Value | KeyKind::Switch => "",
        };
        write!(
            f,
            "{} ({}): env {}{member}, kv {}",
            self.path, self.type_name, self.env, self.kv
        )?;
        if let Some(flag) = &self.flag {
            write!(f, ", flag --{flag}")?;
        }
        Ok(())
    }
}

/// Every statically reachable entry of `shape`, in field order.
pub fn describe(shape: &Shape, naming: &Naming) -> Vec<KeyInfo> {
    walk_keys(shape)
        .into_iter()
        .map(|(path, kind, type_name)| KeyInfo {
            env: env_key(
                &naming.env_prefix,
                path.segments(),
                &naming.env_separator,
            ),
            kv: kv_key(&naming.kv_prefix, path.segments()),
            flag: (kind != KeyKind::Members).then(|| flag_name(path.segments())),
            path,
            kind,
            type_name,
        })
        .collect()
}

/// Paths reachable through structs and optional values, with their kind.
///
/// Collections end the walk: their members are only known at load time.
pub(crate) fn walk_keys(shape: &Shape) -> Vec<(Path, KeyKind, &'static str)> {
    let mut out = Vec::new();
    walk(shape, &mut Vec::new(), &mut out);
    out
}

fn walk(shape: &Shape, path: &mut Vec<Segment>, out: &mut Vec<(Path, KeyKind, &'static str)>) {
    match shape {
        Shape::Struct(fields) => {
            for field in fields {
                if field.inline {
                    walk(&field.shape, path, out);
                    continue;
                }
                path.push(Segment::Field(field.name));
                walk(&field.shape, path, out);
                path.pop();
            }
        }
        Shape::Pointer(inner) => {
            if matches!(inner.deref(), Shape::Struct(_)) && !path.is_empty() {
                out.push((Path::from(path.clone()), KeyKind::Switch, "switch"));
            }
            walk(inner, path, out);
        }
        Shape::Seq { elem, .. } => {
            let kind = if elem.is_leaf() {
                KeyKind::List
            } else {
                KeyKind::Members
            };
            out.push((Path::from(path.clone()), kind, shape.type_name()));
        }
        Shape::Map { key, elem } => {
            let kind = if key.is_leaf() && elem.is_leaf() {
                KeyKind::Pairs
            } else {
                KeyKind::Members
            };
            out.push((Path::from(path.clone()), kind, shape.type_name()));
        }
        Shape::Scalar(_) | Shape::Text(_) => {
            out.push((Path::from(path.clone()), KeyKind::Value, shape.type_name()));
        }
        Shape::Opaque => {}
    }
}
