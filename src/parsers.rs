//! The parser registry: scalar type identity → string codec.
//!
//! A [`Parser`] turns a raw string into a boxed value of exactly one scalar
//! type. The parsed value is returned directly rather than staged inside the
//! parser, so parsers carry no mutable state and one [`Parsers`] instance can
//! be shared across threads and concurrent resolution runs without locking.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// A string codec for one scalar type.
pub trait Parser: Send + Sync {
    /// Parse `raw` into a value of this parser's type, or explain why not.
    fn parse(&self, raw: &str) -> Result<Box<dyn Any + Send>, String>;
}

/// Parser for any type implementing [`FromStr`].
pub struct FromStrParser<T>(PhantomData<fn() -> T>);

impl<T> FromStrParser<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for FromStrParser<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Parser for FromStrParser<T>
where
    T: FromStr + Send + 'static,
    T::Err: fmt::Display,
{
    fn parse(&self, raw: &str) -> Result<Box<dyn Any + Send>, String> {
        raw.parse::<T>()
            .map(|v| Box::new(v) as Box<dyn Any + Send>)
            .map_err(|e| e.to_string())
    }
}

/// Parser backed by a closure.
pub struct FnParser<T, F> {
    f: F,
    _phantom: PhantomData<fn() -> T>,
}

impl<T, F> FnParser<T, F>
where
    F: Fn(&str) -> Result<T, String>,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: PhantomData,
        }
    }
}

impl<T, F> Parser for FnParser<T, F>
where
    T: Send + 'static,
    F: Fn(&str) -> Result<T, String> + Send + Sync,
{
    fn parse(&self, raw: &str) -> Result<Box<dyn Any + Send>, String> {
        (self.f)(raw).map(|v| Box::new(v) as Box<dyn Any + Send>)
    }
}

/// Booleans in the classic `strconv` spellings: `1 t T TRUE true True` and
/// `0 f F FALSE false False`.
pub struct BoolParser;

impl Parser for BoolParser {
    fn parse(&self, raw: &str) -> Result<Box<dyn Any + Send>, String> {
        match raw {
            "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(Box::new(true)),
            "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(Box::new(false)),
            other => Err(format!("invalid boolean '{other}'")),
        }
    }
}

/// Durations as a bare integer of nanoseconds (`21000000000`) or a
/// human-readable literal (`21s`, `1h 30m`).
pub struct DurationParser;

impl Parser for DurationParser {
    fn parse(&self, raw: &str) -> Result<Box<dyn Any + Send>, String> {
        let raw = raw.trim();
        if let Ok(nanos) = raw.parse::<u64>() {
            return Ok(Box::new(Duration::from_nanos(nanos)));
        }
        humantime::parse_duration(raw)
            .map(|d| Box::new(d) as Box<dyn Any + Send>)
            .map_err(|e| format!("invalid duration '{raw}': {e}"))
    }
}

/// Registry mapping scalar types to their parsers.
///
/// [`Parsers::default()`] covers the built-in scalars; [`Parsers::new()`]
/// starts empty. Registering a type twice replaces the earlier parser.
#[derive(Clone)]
pub struct Parsers {
    by_type: HashMap<TypeId, Arc<dyn Parser>>,
}

impl Parsers {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            by_type: HashMap::new(),
        }
    }

    /// Register `parser` as the codec for `T`.
    pub fn register<T: Any>(&mut self, parser: impl Parser + 'static) -> &mut Self {
        self.by_type.insert(TypeId::of::<T>(), Arc::new(parser));
        self
    }

    /// Register `T`'s own [`FromStr`] implementation.
    pub fn register_from_str<T>(&mut self) -> &mut Self
    where
        T: FromStr + Send + 'static,
        T::Err: fmt::Display,
    {
        self.register::<T>(FromStrParser::<T>::new())
    }

    /// Register a closure as the codec for `T`.
    pub fn register_fn<T, F>(&mut self, f: F) -> &mut Self
    where
        T: Send + 'static,
        F: Fn(&str) -> Result<T, String> + Send + Sync + 'static,
    {
        self.register::<T>(FnParser::new(f))
    }

    pub fn get(&self, type_id: TypeId) -> Option<&dyn Parser> {
        self.by_type.get(&type_id).map(|p| p.as_ref())
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

impl Default for Parsers {
    fn default() -> Self {
        let mut parsers = Self::new();
        parsers
            .register::<bool>(BoolParser)
            .register::<Duration>(DurationParser)
            .register_from_str::<i8>()
            .register_from_str::<i16>()
            .register_from_str::<i32>()
            .register_from_str::<i64>()
            .register_from_str::<i128>()
            .register_from_str::<isize>()
            .register_from_str::<u8>()
            .register_from_str::<u16>()
            .register_from_str::<u32>()
            .register_from_str::<u64>()
            .register_from_str::<u128>()
            .register_from_str::<usize>()
            .register_from_str::<f32>()
            .register_from_str::<f64>()
            .register_from_str::<char>()
            .register_from_str::<String>()
            .register_from_str::<PathBuf>()
            .register_from_str::<IpAddr>()
            .register_from_str::<Ipv4Addr>()
            .register_from_str::<Ipv6Addr>()
            .register_from_str::<SocketAddr>();
        parsers
    }
}

impl fmt::Debug for Parsers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parsers")
            .field("types", &self.by_type.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse<T: Any>(parsers: &Parsers, raw: &str) -> Result<T, String> {
        let parser = parsers
            .get(TypeId::of::<T>())
            .ok_or_else(|| "missing parser".to_string())?;
        let boxed: Box<dyn Any> = parser.parse(raw)?;
        boxed
            .downcast::<T>()
            .map(|b| *b)
            .map_err(|_| "wrong type".to_string())
    }

    #[test]
    fn defaults_cover_integers() {
        let parsers = Parsers::default();
        assert_eq!(parse::<i32>(&parsers, "-10").unwrap(), -10);
        assert_eq!(parse::<u16>(&parsers, "8080").unwrap(), 8080);
        assert!(parse::<u8>(&parsers, "300").is_err());
    }

    #[test]
    fn bool_accepts_classic_spellings() {
        let parsers = Parsers::default();
        for raw in ["1", "t", "T", "TRUE", "true", "True"] {
            assert!(parse::<bool>(&parsers, raw).unwrap(), "{raw}");
        }
        for raw in ["0", "f", "F", "FALSE", "false", "False"] {
            assert!(!parse::<bool>(&parsers, raw).unwrap(), "{raw}");
        }
        assert!(parse::<bool>(&parsers, "yes").is_err());
    }

    #[test]
    fn duration_accepts_nanoseconds_and_literals() {
        let parsers = Parsers::default();
        assert_eq!(
            parse::<Duration>(&parsers, "21000000000").unwrap(),
            Duration::from_secs(21)
        );
        assert_eq!(
            parse::<Duration>(&parsers, "55s").unwrap(),
            Duration::from_secs(55)
        );
        assert!(parse::<Duration>(&parsers, "soon").is_err());
    }

    #[test]
    fn empty_registry_has_nothing() {
        let parsers = Parsers::new();
        assert!(parsers.is_empty());
        assert!(!parsers.contains::<String>());
    }

    #[test]
    fn register_replaces_existing_parser() {
        let mut parsers = Parsers::default();
        parsers.register_fn::<u32, _>(|raw| {
            u32::from_str_radix(raw.trim_start_matches("0x"), 16).map_err(|e| e.to_string())
        });
        assert_eq!(parse::<u32>(&parsers, "0xff").unwrap(), 255);
    }

    #[test]
    fn fn_parser_registered_directly() {
        let mut parsers = Parsers::new();
        parsers.register::<u8>(FnParser::new(|raw: &str| match raw {
            "low" => Ok(1u8),
            "high" => Ok(9u8),
            other => Err(format!("unknown level '{other}'")),
        }));
        assert_eq!(parse::<u8>(&parsers, "high").unwrap(), 9);
        assert!(parse::<u8>(&parsers, "mid").is_err());
        assert_eq!(parsers.len(), 1);
    }

    #[test]
    fn registry_is_shareable_across_threads() {
        let parsers = Arc::new(Parsers::default());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let parsers = Arc::clone(&parsers);
                std::thread::spawn(move || parse::<u64>(&parsers, &i.to_string()).unwrap())
            })
            .collect();
        let mut results: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        results.sort();
        assert_eq!(results, vec![0, 1, 2, 3]);
    }
}
