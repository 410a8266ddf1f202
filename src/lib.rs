//! Schema-driven configuration binding for Rust applications. Describe a
//! struct once, then fill it from environment variables, a key-value store,
//! TOML files and command-line flags.
//!
//! ```
//! use confbind::{Confbind, EnvSource, bind_struct};
//!
//! #[derive(Debug, Default, Clone)]
//! struct Config {
//!     host: String,
//!     port: u16,
//! }
//! bind_struct!(Config { host, port });
//!
//! let config = Confbind::builder(Config::default())
//!     .source(EnvSource::new("APP").with_vars([("APP_PORT".to_string(), "8080".to_string())]))
//!     .load()?;
//! assert_eq!(config.port, 8080);
//! # Ok::<(), confbind::ConfbindError>(())
//! ```
//!
//! # The schema
//!
//! Every bindable type implements [`Bind`]. The trait has a static face,
//! [`Bind::shape`], that lists fields, optional branches, sequences, maps and
//! leaves without needing an instance, and a live face, [`Bind::node`], that
//! walks and mutates a value. Sources use the first to work out which keys
//! to look for and the second to write what they find.
//!
//! - [`bind_struct!`] registers a struct. Only the listed fields are visible;
//!   a field marked `#[flatten]` has its own fields hoisted into the parent.
//! - `Option<T>` is an optional branch. It stays `None` until some source
//!   writes one of its leaves, then starts from `T::default()`.
//! - `Vec<T>` and `[T; N]` are indexed by position, `HashMap` and `BTreeMap`
//!   by key. Sequences grow to fit the highest index written; arrays reject
//!   an index past their length.
//! - [`bind_scalar!`] adds a leaf parsed through the [`Parsers`] registry,
//!   [`bind_text!`] a leaf that parses itself through `FromStr`, and
//!   [`bind_opaque!`] a field that is always skipped.
//!
//! # Sources
//!
//! | Source | Key for `servers[0].max_conns` |
//! |--------|--------------------------------|
//! | [`EnvSource`] (prefix `APP`) | `APP_SERVERS_0_MAX_CONNS` |
//! | [`KvSource`] (prefix `app`) | `app/servers/0/maxconns` |
//! | [`TomlSource`] | `[[servers]]` / `max_conns = ...` |
//! | `FlagSource` (feature `clap`) | not reachable; flags stop at collections |
//!
//! Environment names split field names into words (`max_conns`, `maxConns`
//! and `MaxConns` all become `MAX_CONNS`). KV keys and TOML keys match
//! fields case-insensitively with word separators ignored, so `maxconns`,
//! `max_conns` and `MaxConns` all address the same field.
//!
//! # Layer precedence
//!
//! Sources run in the order they were added to the builder. A source only
//! writes the leaves it finds and never clears anything, so:
//!
//! ```text
//! Initial value         Confbind::builder(config)
//!        ↑ overridden by
//! First source          e.g. .toml("myapp", paths)
//!        ↑ overridden by
//! ...
//!        ↑ overridden by
//! Last source           e.g. .flags(std::env::args_os())
//! ```
//!
//! The first source that fails stops the run. Discovery errors (a
//! non-numeric index, an index past an array's length) are detected before
//! a source writes anything.
//!
//! # Parsers
//!
//! Leaves are parsed through a [`Parsers`] registry keyed by type. The default
//! registry covers integers, floats, `bool` (`1`, `t`, `true`, `0`, `f`,
//! `false`, ...), `char`, `String`, paths, IP and socket addresses, and
//! `Duration` (bare nanoseconds or `1h 30m`). Register your own with
//! [`Parsers::register_fn`] or [`Parsers::register_from_str`]. A `String`
//! leaf is taken verbatim even when the registry is empty; any other leaf
//! without a parser fails with [`ConfbindError::ParserNotFound`].
//!
//! # Writing back
//!
//! [`KvSource::store_config`] serializes any `serde::Serialize`
//! configuration into the same key layout the KV source reads, so a value
//! written by one process can be loaded by another.
//!
//! # Error handling
//!
//! All fallible operations return [`ConfbindError`]. Messages carry the path
//! or key involved; strict TOML loading reports unknown keys with file path
//! and line number. Enable the `rich-errors` feature for `miette`
//! diagnostics.

pub mod error;
pub mod types;

mod assign;
mod builder;
mod describe;
mod env;
mod file;
#[cfg(feature = "clap")]
mod flags;
mod flatten;
mod kv;
mod parsers;
mod path;
pub mod schema;
mod source;
mod tree;

#[cfg(test)]
mod fixtures;

pub use assign::{RawEntry, apply};
pub use builder::{Confbind, ConfbindBuilder};
pub use describe::{KeyInfo, KeyKind, Naming, describe};
pub use env::{DEFAULT_SEPARATOR, EnvSource};
pub use error::{ConfbindError, StoreError};
pub use file::TomlSource;
#[cfg(feature = "clap")]
pub use flags::FlagSource;
pub use flatten::flatten_kv;
pub use kv::{KvPair, KvSource, KvStore, MemoryStore, decode_blob, encode_blob, list_recursive};
pub use parsers::{BoolParser, DurationParser, FnParser, FromStrParser, Parser, Parsers};
pub use path::{Path, Segment};
pub use schema::{Bind, Node, Shape};
pub use source::{LoadContext, Source};
pub use tree::{KvTree, TreeDecoder};
pub use types::SearchPath;
