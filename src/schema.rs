//! Explicit schema description for bindable configuration types.
//!
//! Every type that can appear in a configuration tree implements [`Bind`],
//! which has two faces:
//!
//! - [`Bind::shape`] describes the type without an instance. Sources walk the
//!   [`Shape`] to enumerate the keys they should look for.
//! - [`Bind::node`] hands out a [`Node`], a typed cursor into a live value
//!   that can descend into fields, allocate optional branches, grow
//!   sequences, insert map entries and store parsed scalars.
//!
//! Structs opt in with [`bind_struct!`](crate::bind_struct), listing the
//! fields that should be visible. Unlisted fields are never read or written.
//! A field marked `#[flatten]` hoists its own fields into the parent, so its
//! name never appears in a key:
//!
//! ```
//! use confbind::bind_struct;
//!
//! #[derive(Default, Clone)]
//! struct Common {
//!     verbose: bool,
//! }
//! bind_struct!(Common { verbose });
//!
//! #[derive(Default, Clone)]
//! struct Server {
//!     port: u16,
//!     #[allow(dead_code)]
//!     secret_cache: Vec<u8>,
//!     common: Common,
//! }
//! bind_struct!(Server { port, #[flatten] common });
//! ```
//!
//! Scalars are either parsed through the [`Parsers`](crate::Parsers) registry
//! ([`bind_scalar!`](crate::bind_scalar)) or carry their own text codec
//! ([`bind_text!`](crate::bind_text)). Trait objects are opaque and always
//! skipped ([`bind_opaque!`](crate::bind_opaque)).

use std::any::{Any, TypeId, type_name};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfbindError;

/// A type that can be bound from configuration sources.
pub trait Bind: Any {
    /// Static description of this type.
    fn shape() -> Shape
    where
        Self: Sized;

    /// Cursor into this value.
    fn node(&mut self) -> Node<'_>;
}

/// Static description of a bindable type.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// A struct and its visible fields, in declaration order.
    Struct(Vec<FieldShape>),
    /// An optional value, allocated on first write.
    Pointer(Box<Shape>),
    /// A growable sequence (`len: None`) or a fixed-size array.
    Seq { elem: Box<Shape>, len: Option<usize> },
    /// A map. Keys are always leaves.
    Map { key: Box<Shape>, elem: Box<Shape> },
    /// A leaf parsed through the parser registry.
    Scalar(ScalarShape),
    /// A leaf with its own text codec.
    Text(&'static str),
    /// A dynamic value the resolver cannot walk.
    Opaque,
}

impl Shape {
    /// Strip any number of pointer layers.
    pub fn deref(&self) -> &Shape {
        let mut shape = self;
        while let Shape::Pointer(inner) = shape {
            shape = inner;
        }
        shape
    }

    /// Scalar or text leaf, seen through pointers.
    pub fn is_leaf(&self) -> bool {
        matches!(self.deref(), Shape::Scalar(_) | Shape::Text(_))
    }

    /// A sequence of `u8`, stored as a single blob by the KV source.
    pub fn is_bytes(&self) -> bool {
        match self.deref() {
            Shape::Seq { elem, .. } => {
                matches!(elem.as_ref(), Shape::Scalar(s) if s.id == TypeId::of::<u8>())
            }
            _ => false,
        }
    }

    /// Human-readable type name for leaves, kind name otherwise.
    pub fn type_name(&self) -> &'static str {
        match self {
            Shape::Struct(_) => "struct",
            Shape::Pointer(inner) => inner.type_name(),
            Shape::Seq { len: None, .. } => "sequence",
            Shape::Seq { len: Some(_), .. } => "array",
            Shape::Map { .. } => "map",
            Shape::Scalar(s) => s.name,
            Shape::Text(name) => *name,
            Shape::Opaque => "opaque",
        }
    }
}

/// One visible struct field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldShape {
    pub name: &'static str,
    /// Children are hoisted into the parent's namespace.
    pub inline: bool,
    pub shape: Shape,
}

/// Identity of a registry-parsed scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarShape {
    pub id: TypeId,
    pub name: &'static str,
}

impl ScalarShape {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}

/// Mutable cursor into a live configuration value.
pub enum Node<'a> {
    Struct(&'a mut dyn StructNode),
    Pointer(&'a mut dyn PointerNode),
    Seq(&'a mut dyn SeqNode),
    Map(&'a mut dyn MapNode),
    Scalar(&'a mut dyn ScalarNode),
    Text(&'a mut dyn TextNode),
    Opaque,
}

impl Node<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Struct(_) => "struct",
            Node::Pointer(_) => "pointer",
            Node::Seq(_) => "sequence",
            Node::Map(_) => "map",
            Node::Scalar(_) => "scalar",
            Node::Text(_) => "text",
            Node::Opaque => "opaque",
        }
    }
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node::{}", self.kind())
    }
}

pub trait StructNode {
    /// The visible field called `name`, searching flattened fields after
    /// direct ones.
    fn field(&mut self, name: &str) -> Option<Node<'_>>;
}

pub trait PointerNode {
    fn is_set(&self) -> bool;

    /// The pointee, without allocating.
    fn get(&mut self) -> Option<Node<'_>>;

    /// The pointee, allocating a default value first when unset.
    fn get_or_alloc(&mut self) -> Node<'_>;

    fn as_any(&self) -> &dyn Any;

    /// Copy the pointee from `template`, which must be the same pointer type.
    /// Returns `false` when the template is unset or of another type.
    fn fill_from(&mut self, template: &dyn Any) -> bool;
}

pub trait SeqNode {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Some(N)` for arrays.
    fn fixed_len(&self) -> Option<usize>;

    /// Run `fill` on the element at `index`.
    ///
    /// An index past the end of a growable sequence is filled on a fresh
    /// default element, which is appended with default padding only once
    /// `fill` succeeds. `None` when `index` cannot exist: past an array's
    /// length, or more elements than can be allocated.
    fn fill_element(
        &mut self,
        index: usize,
        fill: &mut Fill<'_>,
    ) -> Option<Result<(), ConfbindError>>;

    /// Replace the whole contents with `bytes`. Returns `false` unless this is
    /// a sequence of `u8` of a compatible length.
    fn set_bytes(&mut self, bytes: Vec<u8>) -> bool;
}

/// Callback writing into a node handed out by a container.
pub type Fill<'f> = dyn FnMut(Node<'_>) -> Result<(), ConfbindError> + 'f;

pub trait MapNode {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build a key by running `key_fill` on a default key, then run `fill` on
    /// its value. An absent entry is filled on a default value and inserted
    /// only once `fill` succeeds.
    fn fill_entry(
        &mut self,
        key_fill: &mut Fill<'_>,
        fill: &mut Fill<'_>,
    ) -> Result<(), ConfbindError>;
}

pub trait ScalarNode {
    fn scalar_type(&self) -> TypeId;

    fn type_name(&self) -> &'static str;

    /// Store a parsed value. Hands the value back if it has the wrong type.
    fn set(&mut self, value: Box<dyn Any + Send>) -> Result<(), Box<dyn Any + Send>>;
}

pub trait TextNode {
    fn type_name(&self) -> &'static str;

    fn decode(&mut self, raw: &str) -> Result<(), String>;
}

#[doc(hidden)]
pub fn field_shape<S, T, F>(name: &'static str, inline: bool, _accessor: F) -> FieldShape
where
    T: Bind,
    F: Fn(&S) -> &T,
{
    FieldShape {
        name,
        inline,
        shape: T::shape(),
    }
}

/// Implement [`Bind`] for a struct, listing its visible fields.
///
/// Fields marked `#[flatten]` must themselves be `bind_struct!` types; their
/// fields are looked up as if declared on the parent.
#[macro_export]
macro_rules! bind_struct {
    (@inline flatten) => {
        true
    };
    (@inline) => {
        false
    };
    ($ty:ty { $( $(#[$attr:ident])? $field:ident ),* $(,)? }) => {
        impl $crate::schema::Bind for $ty {
            fn shape() -> $crate::schema::Shape {
                $crate::schema::Shape::Struct(vec![
                    $(
                        $crate::schema::field_shape(
                            stringify!($field),
                            $crate::bind_struct!(@inline $($attr)?),
                            |s: &Self| &s.$field,
                        ),
                    )*
                ])
            }

            fn node(&mut self) -> $crate::schema::Node<'_> {
                $crate::schema::Node::Struct(self)
            }
        }

        impl $crate::schema::StructNode for $ty {
            fn field(&mut self, name: &str) -> Option<$crate::schema::Node<'_>> {
                $(
                    if !$crate::bind_struct!(@inline $($attr)?) && name == stringify!($field) {
                        return Some($crate::schema::Bind::node(&mut self.$field));
                    }
                )*
                $(
                    if $crate::bind_struct!(@inline $($attr)?) {
                        if let $crate::schema::Node::Struct(inner) =
                            $crate::schema::Bind::node(&mut self.$field)
                        {
                            if let Some(found) = inner.field(name) {
                                return Some(found);
                            }
                        }
                    }
                )*
                None
            }
        }
    };
}

/// Implement [`Bind`] for scalar types parsed through the parser registry.
#[macro_export]
macro_rules! bind_scalar {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::schema::Bind for $ty {
                fn shape() -> $crate::schema::Shape {
                    $crate::schema::Shape::Scalar($crate::schema::ScalarShape::of::<$ty>())
                }

                fn node(&mut self) -> $crate::schema::Node<'_> {
                    $crate::schema::Node::Scalar(self)
                }
            }

            impl $crate::schema::ScalarNode for $ty {
                fn scalar_type(&self) -> ::std::any::TypeId {
                    ::std::any::TypeId::of::<$ty>()
                }

                fn type_name(&self) -> &'static str {
                    ::std::any::type_name::<$ty>()
                }

                fn set(
                    &mut self,
                    value: Box<dyn ::std::any::Any + Send>,
                ) -> Result<(), Box<dyn ::std::any::Any + Send>> {
                    *self = *value.downcast::<$ty>()?;
                    Ok(())
                }
            }
        )+
    };
}

/// Implement [`Bind`] for types that carry their own text codec
/// (`FromStr` + `Display`). They are leaves and never need a parser.
#[macro_export]
macro_rules! bind_text {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::schema::Bind for $ty {
                fn shape() -> $crate::schema::Shape {
                    $crate::schema::Shape::Text(::std::any::type_name::<$ty>())
                }

                fn node(&mut self) -> $crate::schema::Node<'_> {
                    $crate::schema::Node::Text(self)
                }
            }

            impl $crate::schema::TextNode for $ty {
                fn type_name(&self) -> &'static str {
                    ::std::any::type_name::<$ty>()
                }

                fn decode(&mut self, raw: &str) -> Result<(), String> {
                    *self = raw
                        .parse::<$ty>()
                        .map_err(|e| e.to_string())?;
                    Ok(())
                }
            }
        )+
    };
}

/// Implement [`Bind`] for dynamic types the resolver must skip.
#[macro_export]
macro_rules! bind_opaque {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::schema::Bind for $ty {
                fn shape() -> $crate::schema::Shape {
                    $crate::schema::Shape::Opaque
                }

                fn node(&mut self) -> $crate::schema::Node<'_> {
                    $crate::schema::Node::Opaque
                }
            }
        )+
    };
}

bind_scalar!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, String,
    PathBuf, IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, Duration,
);

bind_opaque!(Box<dyn Any + Send + Sync>, Box<dyn Any>);

impl<T: Bind + Default + Clone> Bind for Option<T> {
    fn shape() -> Shape {
        Shape::Pointer(Box::new(T::shape()))
    }

    fn node(&mut self) -> Node<'_> {
        Node::Pointer(self)
    }
}

impl<T: Bind + Default + Clone> PointerNode for Option<T> {
    fn is_set(&self) -> bool {
        self.is_some()
    }

    fn get(&mut self) -> Option<Node<'_>> {
        self.as_mut().map(|value| value.node())
    }

    fn get_or_alloc(&mut self) -> Node<'_> {
        self.get_or_insert_with(T::default).node()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn fill_from(&mut self, template: &dyn Any) -> bool {
        match template.downcast_ref::<Option<T>>() {
            Some(Some(value)) => {
                *self = Some(value.clone());
                true
            }
            _ => false,
        }
    }
}

impl<T: Bind + Default> Bind for Vec<T> {
    fn shape() -> Shape {
        Shape::Seq {
            elem: Box::new(T::shape()),
            len: None,
        }
    }

    fn node(&mut self) -> Node<'_> {
        Node::Seq(self)
    }
}

impl<T: Bind + Default> SeqNode for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn fixed_len(&self) -> Option<usize> {
        None
    }

    fn fill_element(
        &mut self,
        index: usize,
        fill: &mut Fill<'_>,
    ) -> Option<Result<(), ConfbindError>> {
        if let Some(elem) = self.get_mut(index) {
            return Some(fill(elem.node()));
        }
        let additional = (index - Vec::len(self)).checked_add(1)?;
        self.try_reserve(additional).ok()?;
        let mut elem = T::default();
        if let Err(err) = fill(elem.node()) {
            return Some(Err(err));
        }
        self.resize_with(index, T::default);
        self.push(elem);
        Some(Ok(()))
    }

    fn set_bytes(&mut self, bytes: Vec<u8>) -> bool {
        match (self as &mut dyn Any).downcast_mut::<Vec<u8>>() {
            Some(target) => {
                *target = bytes;
                true
            }
            None => false,
        }
    }
}

impl<T: Bind, const N: usize> Bind for [T; N] {
    fn shape() -> Shape {
        Shape::Seq {
            elem: Box::new(T::shape()),
            len: Some(N),
        }
    }

    fn node(&mut self) -> Node<'_> {
        Node::Seq(self)
    }
}

impl<T: Bind, const N: usize> SeqNode for [T; N] {
    fn len(&self) -> usize {
        N
    }

    fn fixed_len(&self) -> Option<usize> {
        Some(N)
    }

    fn fill_element(
        &mut self,
        index: usize,
        fill: &mut Fill<'_>,
    ) -> Option<Result<(), ConfbindError>> {
        self.get_mut(index).map(|elem| fill(elem.node()))
    }

    fn set_bytes(&mut self, bytes: Vec<u8>) -> bool {
        match (self as &mut dyn Any).downcast_mut::<[u8; N]>() {
            Some(target) if bytes.len() == N => {
                target.copy_from_slice(&bytes);
                true
            }
            _ => false,
        }
    }
}

impl<K, V> Bind for HashMap<K, V>
where
    K: Bind + Default + Eq + Hash,
    V: Bind + Default,
{
    fn shape() -> Shape {
        Shape::Map {
            key: Box::new(K::shape()),
            elem: Box::new(V::shape()),
        }
    }

    fn node(&mut self) -> Node<'_> {
        Node::Map(self)
    }
}

impl<K, V> MapNode for HashMap<K, V>
where
    K: Bind + Default + Eq + Hash,
    V: Bind + Default,
{
    fn len(&self) -> usize {
        HashMap::len(self)
    }

    fn fill_entry(
        &mut self,
        key_fill: &mut Fill<'_>,
        fill: &mut Fill<'_>,
    ) -> Result<(), ConfbindError> {
        let mut key = K::default();
        key_fill(key.node())?;
        if let Some(value) = self.get_mut(&key) {
            return fill(value.node());
        }
        let mut value = V::default();
        fill(value.node())?;
        self.insert(key, value);
        Ok(())
    }
}

impl<K, V> Bind for BTreeMap<K, V>
where
    K: Bind + Default + Ord,
    V: Bind + Default,
{
    fn shape() -> Shape {
        Shape::Map {
            key: Box::new(K::shape()),
            elem: Box::new(V::shape()),
        }
    }

    fn node(&mut self) -> Node<'_> {
        Node::Map(self)
    }
}

impl<K, V> MapNode for BTreeMap<K, V>
where
    K: Bind + Default + Ord,
    V: Bind + Default,
{
    fn len(&self) -> usize {
        BTreeMap::len(self)
    }

    fn fill_entry(
        &mut self,
        key_fill: &mut Fill<'_>,
        fill: &mut Fill<'_>,
    ) -> Result<(), ConfbindError> {
        let mut key = K::default();
        key_fill(key.node())?;
        if let Some(value) = self.get_mut(&key) {
            return fill(value.node());
        }
        let mut value = V::default();
        fill(value.node())?;
        self.insert(key, value);
        Ok(())
    }
}
