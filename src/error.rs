use std::path::PathBuf;
use thiserror::Error;

/// Boxed error returned by a [`KvStore`](crate::kv::KvStore) backend.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
#[cfg_attr(feature = "rich-errors", derive(miette::Diagnostic))]
pub enum ConfbindError {
    #[error("Invalid index '{segment}' in {key}: expected a non-negative integer")]
    #[cfg_attr(
        feature = "rich-errors",
        diagnostic(
            code(confbind::invalid_index),
            help("slice and array entries must use numeric indices, e.g. SERVERS_0_HOST")
        )
    )]
    InvalidIndex { segment: String, key: String },

    #[error("Index {index} in {key} is out of bounds for an array of length {len}")]
    #[cfg_attr(
        feature = "rich-errors",
        diagnostic(code(confbind::index_out_of_bounds))
    )]
    IndexOutOfBounds {
        index: usize,
        len: usize,
        key: String,
    },

    #[error("Path '{0}' is both a value and a directory")]
    #[cfg_attr(
        feature = "rich-errors",
        diagnostic(code(confbind::value_and_directory))
    )]
    ValueAndDirectory(String),

    #[error("Parser not found for type {type_name} (at '{path}')")]
    #[cfg_attr(
        feature = "rich-errors",
        diagnostic(
            code(confbind::parser_not_found),
            help("register one with Parsers::register or Parsers::register_from_str")
        )
    )]
    ParserNotFound {
        type_name: &'static str,
        path: String,
    },

    #[error("Invalid value for '{path}': {reason}")]
    #[cfg_attr(feature = "rich-errors", diagnostic(code(confbind::invalid_value)))]
    InvalidValue { path: String, reason: String },

    #[error("Value at '{path}' cannot be set")]
    #[cfg_attr(feature = "rich-errors", diagnostic(code(confbind::not_settable)))]
    NotSettable { path: String },

    #[error("Unknown field '{field}' under '{path}'")]
    UnknownField { field: String, path: String },

    #[error("Unknown key '{key}' in {path} (line {line})")]
    UnknownKey {
        key: String,
        path: PathBuf,
        line: usize,
    },

    #[error("Unknown keys in config file")]
    UnknownKeys(Vec<ConfbindError>),

    #[error("Failed to parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to read {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("KV store error: {0}")]
    Store(#[source] StoreError),

    #[error("Cannot decode blob at '{key}': {reason}")]
    Blob { key: String, reason: String },

    #[error("Key already exists: {0}")]
    DuplicateKey(String),

    #[error("Cannot collate config: {0}")]
    Collate(String),

    #[cfg(feature = "clap")]
    #[error(transparent)]
    Cli(#[from] clap::Error),
}
