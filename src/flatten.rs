//! Custom serde Serializer that flattens any `Serialize` configuration into
//! KV-store pairs, mirroring the key layout the KV source reads back.
//!
//! - struct fields become one level each, named with
//!   [`normalize_field`](crate::path::normalize_field) (`ptr_struct1` →
//!   `ptrstruct1`);
//! - sequences become `key/0`, `key/1`, ...; sequences of `u8` become a
//!   single gzip+base64 blob instead;
//! - map keys are written verbatim; a key that is empty or contains `/`
//!   cannot stay one level and is rejected;
//! - `None` and unit values are skipped;
//! - `std::time::Duration` is written as a human-readable literal (`1m 30s`).
//!
//! Two leaves landing on the same key is an error.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde::ser::{self, Impossible, Serialize};

use crate::error::ConfbindError;
use crate::kv::encode_blob;
use crate::path::normalize_field;

/// Flatten `source` into `(key, value)` pairs under `prefix`, in
/// serialization order.
pub fn flatten_kv<S: Serialize + ?Sized>(
    source: &S,
    prefix: &str,
) -> Result<Vec<(String, Vec<u8>)>, ConfbindError> {
    let mut sink = Sink::default();
    source.serialize(Collator {
        key: prefix.trim_end_matches('/').to_string(),
        sink: &mut sink,
    })?;
    Ok(sink.pairs)
}

#[derive(Debug)]
pub enum FlattenError {
    Custom(String),
    DuplicateKey(String),
    InvalidMapKey(String),
    /// Raised by the scalar probe for compound values.
    NotAScalar,
}

impl fmt::Display for FlattenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlattenError::Custom(msg) => write!(f, "flatten error: {msg}"),
            FlattenError::DuplicateKey(key) => write!(f, "key already exists: {key}"),
            FlattenError::InvalidMapKey(key) => {
                write!(f, "map key '{key}' must be non-empty and contain no '/'")
            }
            FlattenError::NotAScalar => f.write_str("not a scalar"),
        }
    }
}

impl std::error::Error for FlattenError {}

impl ser::Error for FlattenError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        FlattenError::Custom(msg.to_string())
    }
}

impl From<FlattenError> for ConfbindError {
    fn from(err: FlattenError) -> Self {
        match err {
            FlattenError::DuplicateKey(key) => ConfbindError::DuplicateKey(key),
            other => ConfbindError::Collate(other.to_string()),
        }
    }
}

#[derive(Default)]
struct Sink {
    pairs: Vec<(String, Vec<u8>)>,
    seen: HashSet<String>,
}

impl Sink {
    fn emit(&mut self, key: String, value: Vec<u8>) -> Result<(), FlattenError> {
        if !self.seen.insert(key.clone()) {
            return Err(FlattenError::DuplicateKey(key));
        }
        self.pairs.push((key, value));
        Ok(())
    }
}

fn child(key: &str, segment: &str) -> String {
    if key.is_empty() {
        segment.to_string()
    } else {
        format!("{key}/{segment}")
    }
}

struct Collator<'a> {
    key: String,
    sink: &'a mut Sink,
}

impl Collator<'_> {
    fn emit(self, value: impl fmt::Display) -> Result<(), FlattenError> {
        self.sink.emit(self.key, value.to_string().into_bytes())
    }
}

impl<'a> ser::Serializer for Collator<'a> {
    type Ok = ();
    type Error = FlattenError;
    type SerializeSeq = SeqCollator<'a>;
    type SerializeTuple = SeqCollator<'a>;
    type SerializeTupleStruct = SeqCollator<'a>;
    type SerializeTupleVariant = SeqCollator<'a>;
    type SerializeMap = MapCollator<'a>;
    type SerializeStruct = StructCollator<'a>;
    type SerializeStructVariant = StructCollator<'a>;

    fn serialize_bool(self, v: bool) -> Result<(), Self::Error> {
        self.emit(v)
    }

    fn serialize_i8(self, v: i8) -> Result<(), Self::Error> {
        self.emit(v)
    }

    fn serialize_i16(self, v: i16) -> Result<(), Self::Error> {
        self.emit(v)
    }

    fn serialize_i32(self, v: i32) -> Result<(), Self::Error> {
        self.emit(v)
    }

    fn serialize_i64(self, v: i64) -> Result<(), Self::Error> {
        self.emit(v)
    }

    fn serialize_i128(self, v: i128) -> Result<(), Self::Error> {
        self.emit(v)
    }

    fn serialize_u8(self, v: u8) -> Result<(), Self::Error> {
        self.emit(v)
    }

    fn serialize_u16(self, v: u16) -> Result<(), Self::Error> {
        self.emit(v)
    }

    fn serialize_u32(self, v: u32) -> Result<(), Self::Error> {
        self.emit(v)
    }

    fn serialize_u64(self, v: u64) -> Result<(), Self::Error> {
        self.emit(v)
    }

    fn serialize_u128(self, v: u128) -> Result<(), Self::Error> {
        self.emit(v)
    }

    fn serialize_f32(self, v: f32) -> Result<(), Self::Error> {
        self.emit(v)
    }

    fn serialize_f64(self, v: f64) -> Result<(), Self::Error> {
        self.emit(v)
    }

    fn serialize_char(self, v: char) -> Result<(), Self::Error> {
        self.emit(v)
    }

    fn serialize_str(self, v: &str) -> Result<(), Self::Error> {
        self.emit(v)
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<(), Self::Error> {
        let blob = encode_blob(v).map_err(|e| FlattenError::Custom(e.to_string()))?;
        self.sink.emit(self.key, blob.into_bytes())
    }

    fn serialize_none(self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<(), Self::Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<(), Self::Error> {
        self.emit(variant)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(self)
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Ok(SeqCollator {
            key: self.key,
            sink: self.sink,
            index: 0,
            bytes: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Ok(MapCollator {
            key: self.key,
            sink: self.sink,
            current_key: None,
        })
    }

    fn serialize_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        Ok(StructCollator {
            key: self.key,
            sink: self.sink,
            duration: (name == "Duration").then(DurationParts::default),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Ok(StructCollator {
            key: self.key,
            sink: self.sink,
            duration: None,
        })
    }
}

// --- SerializeStruct ---

#[derive(Default)]
struct DurationParts {
    secs: Option<u64>,
    nanos: Option<u32>,
}

struct StructCollator<'a> {
    key: String,
    sink: &'a mut Sink,
    /// Set while serializing `std::time::Duration` (`secs` + `nanos`).
    duration: Option<DurationParts>,
}

impl ser::SerializeStruct for StructCollator<'_> {
    type Ok = ();
    type Error = FlattenError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        if let Some(parts) = self.duration.as_mut() {
            match key {
                "secs" => parts.secs = unsigned(value),
                "nanos" => parts.nanos = unsigned(value).and_then(|n| u32::try_from(n).ok()),
                _ => {}
            }
            return Ok(());
        }
        value.serialize(Collator {
            key: child(&self.key, &normalize_field(key)),
            sink: self.sink,
        })
    }

    fn end(self) -> Result<(), Self::Error> {
        if let Some(DurationParts {
            secs: Some(secs),
            nanos: Some(nanos),
        }) = self.duration
        {
            let literal = humantime::format_duration(Duration::new(secs, nanos)).to_string();
            self.sink.emit(self.key, literal.into_bytes())?;
        }
        Ok(())
    }
}

impl ser::SerializeStructVariant for StructCollator<'_> {
    type Ok = ();
    type Error = FlattenError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        ser::SerializeStruct::serialize_field(self, key, value)
    }

    fn end(self) -> Result<(), Self::Error> {
        ser::SerializeStruct::end(self)
    }
}

// --- SerializeMap ---

struct MapCollator<'a> {
    key: String,
    sink: &'a mut Sink,
    current_key: Option<String>,
}

impl ser::SerializeMap for MapCollator<'_> {
    type Ok = ();
    type Error = FlattenError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), Self::Error> {
        let raw = map_key(key)?;
        if raw.is_empty() || raw.contains('/') {
            return Err(FlattenError::InvalidMapKey(raw));
        }
        self.current_key = Some(raw);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        let key = self
            .current_key
            .take()
            .ok_or_else(|| FlattenError::Custom("map value without a key".into()))?;
        value.serialize(Collator {
            key: child(&self.key, &key),
            sink: self.sink,
        })
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

// --- SerializeSeq (one level per index, or a single blob for bytes) ---

struct SeqCollator<'a> {
    key: String,
    sink: &'a mut Sink,
    index: usize,
    bytes: Vec<u8>,
}

impl ser::SerializeSeq for SeqCollator<'_> {
    type Ok = ();
    type Error = FlattenError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        if self.index == self.bytes.len()
            && let Ok(Primitive::Byte(byte)) = value.serialize(ScalarProbe)
        {
            self.bytes.push(byte);
        } else {
            value.serialize(Collator {
                key: child(&self.key, &self.index.to_string()),
                sink: self.sink,
            })?;
        }
        self.index += 1;
        Ok(())
    }

    fn end(self) -> Result<(), Self::Error> {
        if !self.bytes.is_empty() {
            let blob = encode_blob(&self.bytes).map_err(|e| FlattenError::Custom(e.to_string()))?;
            self.sink.emit(self.key, blob.into_bytes())?;
        }
        Ok(())
    }
}

impl ser::SerializeTuple for SeqCollator<'_> {
    type Ok = ();
    type Error = FlattenError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<(), Self::Error> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqCollator<'_> {
    type Ok = ();
    type Error = FlattenError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<(), Self::Error> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleVariant for SeqCollator<'_> {
    type Ok = ();
    type Error = FlattenError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<(), Self::Error> {
        ser::SerializeSeq::end(self)
    }
}

// --- Scalar probe (map keys, byte sequences, Duration parts) ---

/// A primitive captured by [`ScalarProbe`].
enum Primitive {
    Byte(u8),
    Unsigned(u64),
    Text(String),
}

/// Serializer that only accepts primitives. Compound values fail with
/// [`FlattenError::NotAScalar`] before anything is written.
struct ScalarProbe;

fn not_scalar<T>() -> Result<T, FlattenError> {
    Err(FlattenError::NotAScalar)
}

impl ser::Serializer for ScalarProbe {
    type Ok = Primitive;
    type Error = FlattenError;
    type SerializeSeq = Impossible<Primitive, FlattenError>;
    type SerializeTuple = Impossible<Primitive, FlattenError>;
    type SerializeTupleStruct = Impossible<Primitive, FlattenError>;
    type SerializeTupleVariant = Impossible<Primitive, FlattenError>;
    type SerializeMap = Impossible<Primitive, FlattenError>;
    type SerializeStruct = Impossible<Primitive, FlattenError>;
    type SerializeStructVariant = Impossible<Primitive, FlattenError>;

    fn serialize_bool(self, v: bool) -> Result<Primitive, FlattenError> {
        Ok(Primitive::Text(v.to_string()))
    }
    fn serialize_i8(self, v: i8) -> Result<Primitive, FlattenError> {
        Ok(Primitive::Text(v.to_string()))
    }
    fn serialize_i16(self, v: i16) -> Result<Primitive, FlattenError> {
        Ok(Primitive::Text(v.to_string()))
    }
    fn serialize_i32(self, v: i32) -> Result<Primitive, FlattenError> {
        Ok(Primitive::Text(v.to_string()))
    }
    fn serialize_i64(self, v: i64) -> Result<Primitive, FlattenError> {
        Ok(Primitive::Text(v.to_string()))
    }
    fn serialize_u8(self, v: u8) -> Result<Primitive, FlattenError> {
        Ok(Primitive::Byte(v))
    }
    fn serialize_u16(self, v: u16) -> Result<Primitive, FlattenError> {
        Ok(Primitive::Unsigned(v.into()))
    }
    fn serialize_u32(self, v: u32) -> Result<Primitive, FlattenError> {
        Ok(Primitive::Unsigned(v.into()))
    }
    fn serialize_u64(self, v: u64) -> Result<Primitive, FlattenError> {
        Ok(Primitive::Unsigned(v))
    }
    fn serialize_f32(self, v: f32) -> Result<Primitive, FlattenError> {
        Ok(Primitive::Text(v.to_string()))
    }
    fn serialize_f64(self, v: f64) -> Result<Primitive, FlattenError> {
        Ok(Primitive::Text(v.to_string()))
    }
    fn serialize_char(self, v: char) -> Result<Primitive, FlattenError> {
        Ok(Primitive::Text(v.to_string()))
    }
    fn serialize_str(self, v: &str) -> Result<Primitive, FlattenError> {
        Ok(Primitive::Text(v.to_string()))
    }
    fn serialize_bytes(self, _v: &[u8]) -> Result<Primitive, FlattenError> {
        not_scalar()
    }
    fn serialize_none(self) -> Result<Primitive, FlattenError> {
        not_scalar()
    }
    fn serialize_some<T: Serialize + ?Sized>(self, _: &T) -> Result<Primitive, FlattenError> {
        not_scalar()
    }
    fn serialize_unit(self) -> Result<Primitive, FlattenError> {
        not_scalar()
    }
    fn serialize_unit_struct(self, _: &'static str) -> Result<Primitive, FlattenError> {
        not_scalar()
    }
    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
    ) -> Result<Primitive, FlattenError> {
        Ok(Primitive::Text(variant.to_string()))
    }
    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        value: &T,
    ) -> Result<Primitive, FlattenError> {
        value.serialize(self)
    }
    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &T,
    ) -> Result<Primitive, FlattenError> {
        not_scalar()
    }
    fn serialize_seq(self, _: Option<usize>) -> Result<Self::SerializeSeq, FlattenError> {
        not_scalar()
    }
    fn serialize_tuple(self, _: usize) -> Result<Self::SerializeTuple, FlattenError> {
        not_scalar()
    }
    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleStruct, FlattenError> {
        not_scalar()
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant, FlattenError> {
        not_scalar()
    }
    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap, FlattenError> {
        not_scalar()
    }
    fn serialize_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStruct, FlattenError> {
        not_scalar()
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant, FlattenError> {
        not_scalar()
    }
}

fn map_key<T: Serialize + ?Sized>(key: &T) -> Result<String, FlattenError> {
    match key.serialize(ScalarProbe) {
        Ok(Primitive::Byte(b)) => Ok(b.to_string()),
        Ok(Primitive::Unsigned(n)) => Ok(n.to_string()),
        Ok(Primitive::Text(s)) => Ok(s),
        Err(_) => Err(FlattenError::Custom("map keys must be scalars".into())),
    }
}

fn unsigned<T: Serialize + ?Sized>(value: &T) -> Option<u64> {
    match value.serialize(ScalarProbe).ok()? {
        Primitive::Byte(b) => Some(b.into()),
        Primitive::Unsigned(n) => Some(n),
        Primitive::Text(_) => None,
    }
}
