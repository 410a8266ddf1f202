//! Key-value store source.
//!
//! Keys are slash-delimited paths under a prefix, one level per segment:
//! `app/ptrstruct1/s1int`, `app/servers/0/host`, `app/labels/team`. Struct
//! field segments are lower-cased with separators removed, index segments
//! are decimal, and map-key segments are taken verbatim. A map key holding a
//! `/` cannot be represented and is refused when storing.
//!
//! Loading lists the whole subtree under the prefix, folds it into a
//! [`KvTree`] and decodes that against the schema. Byte-sequence fields are
//! stored as gzip-compressed, base64-encoded blobs; raw gzip bytes and plain
//! uncompressed values are accepted too.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::error::{ConfbindError, StoreError};
use crate::flatten::flatten_kv;
use crate::schema::Bind;
use crate::source::{LoadContext, Source};
use crate::tree::{KvTree, TreeDecoder};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One listing entry. A `None` value marks a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Option<Vec<u8>>,
}

impl KvPair {
    pub fn leaf(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn dir(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }
}

/// Blocking access to a hierarchical key-value backend.
pub trait KvStore {
    /// Entries under `prefix`. Backends may return the whole subtree or a
    /// single level with directory markers; [`list_recursive`] handles both.
    fn list(&self, prefix: &str) -> Result<Vec<KvPair>, StoreError>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
}

impl<S: KvStore + ?Sized> KvStore for &S {
    fn list(&self, prefix: &str) -> Result<Vec<KvPair>, StoreError> {
        (**self).list(prefix)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        (**self).put(key, value)
    }
}

impl<S: KvStore + ?Sized> KvStore for std::sync::Arc<S> {
    fn list(&self, prefix: &str) -> Result<Vec<KvPair>, StoreError> {
        (**self).list(prefix)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        (**self).put(key, value)
    }
}

/// Every leaf under `prefix`, expanding directory markers, sorted by key.
pub fn list_recursive<S: KvStore + ?Sized>(
    store: &S,
    prefix: &str,
) -> Result<Vec<KvPair>, StoreError> {
    let mut leaves: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    let mut visited: BTreeSet<String> = BTreeSet::new();
    let mut pending = vec![prefix.to_string()];
    while let Some(dir) = pending.pop() {
        if !visited.insert(dir.clone()) {
            continue;
        }
        for pair in store.list(&dir)? {
            match pair.value {
                Some(value) => {
                    leaves.insert(pair.key, value);
                }
                None if pair.key != dir => pending.push(pair.key),
                None => {}
            }
        }
    }
    Ok(leaves
        .into_iter()
        .map(|(key, value)| KvPair::leaf(key, value))
        .collect())
}

/// In-process store. Listing returns one level, reporting deeper keys as
/// directory markers, like most network backends do.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        let store = Self::new();
        {
            let mut entries = store.entries.write();
            for (key, value) in pairs {
                entries.insert(key.into(), value.into());
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn list(&self, prefix: &str) -> Result<Vec<KvPair>, StoreError> {
        let needle = dir_prefix(prefix);
        let entries = self.entries.read();
        let mut dirs = BTreeSet::new();
        let mut out = Vec::new();
        for (key, value) in entries.range(needle.clone()..) {
            let Some(rest) = key.strip_prefix(&needle) else {
                break;
            };
            match rest.split_once('/') {
                Some((first, _)) => {
                    if dirs.insert(first.to_string()) {
                        out.push(KvPair::dir(format!("{needle}{first}")));
                    }
                }
                None => out.push(KvPair::leaf(key.clone(), value.clone())),
            }
        }
        Ok(out)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// Gzip `bytes` and base64-encode the result.
pub fn encode_blob(bytes: &[u8]) -> Result<String, ConfbindError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| ConfbindError::Collate(format!("compress blob: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| ConfbindError::Collate(format!("compress blob: {e}")))?;
    Ok(BASE64.encode(compressed))
}

/// Inverse of [`encode_blob`]. Also accepts raw gzip bytes, and returns
/// anything that is neither form unchanged.
pub fn decode_blob(key: &str, raw: &[u8]) -> Result<Vec<u8>, ConfbindError> {
    if raw.starts_with(&GZIP_MAGIC) {
        return gunzip(key, raw);
    }
    if let Ok(decoded) = BASE64.decode(raw.trim_ascii())
        && decoded.starts_with(&GZIP_MAGIC)
    {
        return gunzip(key, &decoded);
    }
    Ok(raw.to_vec())
}

fn gunzip(key: &str, data: &[u8]) -> Result<Vec<u8>, ConfbindError> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| ConfbindError::Blob {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
    Ok(out)
}

fn dir_prefix(prefix: &str) -> String {
    if prefix.is_empty() {
        String::new()
    } else {
        format!("{prefix}/")
    }
}

/// Configuration source backed by a [`KvStore`].
pub struct KvSource<S> {
    store: S,
    prefix: String,
}

impl<S: KvStore> KvSource<S> {
    /// Read keys under `prefix` (given without the trailing `/`).
    pub fn new(store: S, prefix: &str) -> Self {
        Self {
            store,
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Fold every pair under the prefix into a tree.
    pub fn tree(&self) -> Result<KvTree, ConfbindError> {
        let pairs = list_recursive(&self.store, &self.prefix).map_err(ConfbindError::Store)?;
        let needle = dir_prefix(&self.prefix);
        let mut tree = KvTree::new();
        for pair in pairs {
            let Some(rest) = pair.key.strip_prefix(&needle) else {
                continue;
            };
            let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
            if segments.is_empty() {
                continue;
            }
            tree.insert(&segments, pair.value.unwrap_or_default())?;
        }
        Ok(tree)
    }

    /// Write `config` under the prefix, one pair per leaf.
    pub fn store_config<C: Serialize>(&self, config: &C) -> Result<(), ConfbindError> {
        let pairs = flatten_kv(config, &self.prefix)?;
        debug!(prefix = %self.prefix, pairs = pairs.len(), "storing configuration");
        for (key, value) in pairs {
            self.store
                .put(&key, &value)
                .map_err(ConfbindError::Store)?;
        }
        Ok(())
    }
}

impl<S: KvStore> Source for KvSource<S> {
    fn name(&self) -> &str {
        "kv"
    }

    fn load(
        &mut self,
        config: &mut dyn Bind,
        cx: &mut LoadContext<'_>,
    ) -> Result<(), ConfbindError> {
        let tree = self.tree()?;
        let mut decoder = TreeDecoder::new(cx.parsers).with_blob(decode_blob);
        decoder.decode(config, cx.shape, &tree)?;
        debug!(
            prefix = %self.prefix,
            assigned = decoder.assigned(),
            skipped = decoder.unknown_keys().len(),
            "kv store loaded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::fixtures::test::{CollectionsConfig, Server, Struct1, Struct3, StructPtr};
    use crate::parsers::Parsers;

    fn load<C: Bind>(source: &mut KvSource<MemoryStore>, config: &mut C) -> Result<(), ConfbindError> {
        let shape = C::shape();
        let parsers = Parsers::default();
        let mut cx = LoadContext::new(&shape, &parsers);
        source.load(config, &mut cx)
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    struct FailingStore;

    impl KvStore for FailingStore {
        fn list(&self, _prefix: &str) -> Result<Vec<KvPair>, StoreError> {
            Err("backend unreachable".into())
        }

        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            Err("backend unreachable".into())
        }

        fn put(&self, _key: &str, _value: &[u8]) -> Result<(), StoreError> {
            Err("backend unreachable".into())
        }
    }

    #[test]
    fn memory_store_lists_one_level() {
        let store = MemoryStore::with_pairs([
            ("prefix/a", "1"),
            ("prefix/b/c", "2"),
            ("prefix/b/d", "3"),
            ("prefixed/x", "4"),
        ]);
        let pairs = store.list("prefix").unwrap();
        assert_eq!(pairs, vec![KvPair::leaf("prefix/a", "1"), KvPair::dir("prefix/b")]);
    }

    #[test]
    fn list_recursive_expands_directories() {
        let store = MemoryStore::with_pairs([
            ("prefix/a", "1"),
            ("prefix/b/c", "2"),
            ("prefix/b/d/e", "3"),
        ]);
        let keys: Vec<String> = list_recursive(&store, "prefix")
            .unwrap()
            .into_iter()
            .map(|p| p.key)
            .collect();
        assert_eq!(keys, vec!["prefix/a", "prefix/b/c", "prefix/b/d/e"]);
    }

    #[test]
    fn load_allocates_pointer_and_parses_duration() {
        let store = MemoryStore::with_pairs([
            ("prefix/ptrstruct1/s1int", "1"),
            ("prefix/durationfield", "21000000000"),
        ]);
        let mut source = KvSource::new(store, "prefix");
        let mut config = StructPtr::default();
        load(&mut source, &mut config).unwrap();
        assert_eq!(
            config,
            StructPtr {
                ptr_struct1: Some(Struct1 {
                    s1_int: 1,
                    ..Default::default()
                }),
                ptr_struct2: None,
                duration_field: Duration::from_secs(21),
            }
        );
    }

    #[test]
    fn value_and_directory_collision_fails() {
        let store = MemoryStore::with_pairs([
            ("prefix/ptrstruct1", "1"),
            ("prefix/ptrstruct1/s1int", "2"),
        ]);
        let source = KvSource::new(store, "prefix");
        let err = source.tree().unwrap_err();
        assert!(matches!(err, ConfbindError::ValueAndDirectory(_)));
    }

    #[test]
    fn map_keys_load_verbatim() {
        let store = MemoryStore::with_pairs([
            ("app/labels/50%25off", "x"),
            ("app/labels/a%41", "y"),
            ("app/labels/Team", "z"),
        ]);
        let mut source = KvSource::new(store, "app");
        let mut config = CollectionsConfig::default();
        load(&mut source, &mut config).unwrap();
        assert_eq!(config.labels.len(), 3);
        assert_eq!(config.labels["50%25off"], "x");
        assert_eq!(config.labels["a%41"], "y");
        assert_eq!(config.labels["Team"], "z");
    }

    #[test]
    fn storing_a_map_key_with_a_slash_fails() {
        let mut config = CollectionsConfig::default();
        config.labels.insert("team/core".into(), "infra".into());
        let source = KvSource::new(MemoryStore::new(), "app");
        let err = source.store_config(&config).unwrap_err();
        assert!(matches!(err, ConfbindError::Collate(ref msg) if msg.contains("team/core")));
        assert!(source.store().is_empty());
    }

    #[test]
    fn backend_errors_propagate() {
        let mut source = KvSource::new(FailingStore, "prefix");
        let shape = StructPtr::shape();
        let parsers = Parsers::default();
        let mut cx = LoadContext::new(&shape, &parsers);
        let mut config = StructPtr::default();
        let err = source.load(&mut config, &mut cx).unwrap_err();
        assert!(matches!(err, ConfbindError::Store(_)));
        assert!(err.to_string().contains("backend unreachable"));
    }

    #[test]
    fn blobs_decode_from_every_representation() {
        let payload = b"binary \x00 payload";
        assert_eq!(decode_blob("k", &gzip(payload)).unwrap(), payload);
        assert_eq!(
            decode_blob("k", BASE64.encode(gzip(payload)).as_bytes()).unwrap(),
            payload
        );
        assert_eq!(decode_blob("k", b"plain").unwrap(), b"plain");
        let encoded = encode_blob(payload).unwrap();
        assert_eq!(decode_blob("k", encoded.as_bytes()).unwrap(), payload);
    }

    #[test]
    fn corrupt_gzip_is_reported() {
        let err = decode_blob("prefix/blob", &[0x1f, 0x8b, 0x00]).unwrap_err();
        assert!(matches!(err, ConfbindError::Blob { ref key, .. } if key == "prefix/blob"));
    }

    #[test]
    fn byte_fields_load_from_blobs() {
        let store = MemoryStore::with_pairs([
            ("app/blob".to_string(), gzip(b"hello")),
            ("app/ports/0".to_string(), b"80".to_vec()),
        ]);
        let mut source = KvSource::new(store, "app");
        let mut config = CollectionsConfig::default();
        load(&mut source, &mut config).unwrap();
        assert_eq!(config.blob, b"hello");
        assert_eq!(config.ports, vec![80]);
    }

    #[test]
    fn store_then_load_round_trips() {
        let original = StructPtr {
            ptr_struct1: Some(Struct1 {
                s1_int: 28,
                s1_string: "s1".into(),
                s1_bool: true,
                s1_ptr_struct3: Some(Struct3 { s3_float64: 1.5 }),
            }),
            ptr_struct2: None,
            duration_field: Duration::from_millis(1500),
        };
        let mut source = KvSource::new(MemoryStore::new(), "prefix");
        source.store_config(&original).unwrap();
        assert_eq!(
            source.store().get("prefix/ptrstruct1/s1int").unwrap(),
            Some(b"28".to_vec())
        );
        assert_eq!(source.store().get("prefix/ptrstruct2").unwrap(), None);

        let mut loaded = StructPtr::default();
        load(&mut source, &mut loaded).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn collections_round_trip_through_store() {
        let mut original = CollectionsConfig {
            ports: vec![80, 443],
            servers: vec![Server {
                host: "a".into(),
                port: 1,
                tags: vec!["x".into(), "y".into()],
            }],
            pair: [3, 4],
            blob: b"\x00\x01\x02".to_vec(),
            ..Default::default()
        };
        original.labels.insert("team%core".into(), "infra".into());
        original.backends.insert(
            "api".into(),
            Server {
                host: "h".into(),
                ..Default::default()
            },
        );
        original.weights.insert(7, 0.25);

        let mut source = KvSource::new(MemoryStore::new(), "app");
        source.store_config(&original).unwrap();
        assert!(
            source
                .store()
                .get("app/labels/team%core")
                .unwrap()
                .is_some()
        );

        let mut loaded = CollectionsConfig::default();
        load(&mut source, &mut loaded).unwrap();
        assert_eq!(loaded, original);
    }
}
