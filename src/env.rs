//! Environment variable source.
//!
//! Variable names are derived from paths: with prefix `APP` and the default
//! `_` separator, `servers[0].max_conns` is read from `APP_SERVERS_0_MAX_CONNS`.
//!
//! Leaves reachable through structs and optional values are looked up by
//! exact name. Sequences and maps cannot be enumerated from the schema, so
//! their members are discovered by scanning for variables that start with
//! the collection's own name followed by the separator. The token after it is
//! lower-cased and becomes the next segment: an index for sequences (which
//! must be a non-negative integer, and below the length for arrays) or a key
//! for maps.
//!
//! All discovery happens before anything is assigned, so a malformed index
//! fails the pass with the configuration untouched.

use std::collections::HashMap;

use tracing::debug;

use crate::assign::{RawEntry, apply};
use crate::error::ConfbindError;
use crate::path::{Path, Segment, env_key};
use crate::schema::{Bind, Shape};
use crate::source::{LoadContext, Source};

/// Default word separator.
pub const DEFAULT_SEPARATOR: &str = "_";

pub struct EnvSource {
    prefix: String,
    separator: String,
    vars: Option<Vec<(String, String)>>,
}

impl EnvSource {
    /// Read variables named `PREFIX_...`. An empty prefix reads bare names.
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            separator: DEFAULT_SEPARATOR.to_string(),
            vars: None,
        }
    }

    pub fn separator(mut self, separator: &str) -> Self {
        self.separator = separator.to_string();
        self
    }

    /// Use these variables instead of the process environment.
    ///
    /// Takes an iterator so tests can pass synthetic data instead of
    /// `std::env::vars()`.
    pub fn with_vars(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.vars = Some(vars.into_iter().collect());
        self
    }

    /// Discover every entry this source holds for a configuration of `shape`.
    pub fn collect(&self, shape: &Shape) -> Result<Vec<RawEntry>, ConfbindError> {
        let snapshot;
        let vars: &[(String, String)] = match &self.vars {
            Some(vars) => vars,
            None => {
                snapshot = process_vars();
                &snapshot
            }
        };
        let walker = Walker {
            prefix: &self.prefix,
            separator: &self.separator,
            vars,
            lookup: vars.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect(),
        };
        let mut entries = Vec::new();
        walker.walk(shape, &mut Vec::new(), &mut entries)?;
        Ok(entries)
    }
}

impl Source for EnvSource {
    fn name(&self) -> &str {
        "env"
    }

    fn load(
        &mut self,
        config: &mut dyn Bind,
        cx: &mut LoadContext<'_>,
    ) -> Result<(), ConfbindError> {
        let entries = self.collect(cx.shape)?;
        debug!(
            prefix = %self.prefix,
            entries = entries.len(),
            "environment variables discovered"
        );
        apply(config, &entries, cx.parsers)
    }
}

/// Process environment, skipping variables that are not valid Unicode.
fn process_vars() -> Vec<(String, String)> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

struct Walker<'a> {
    prefix: &'a str,
    separator: &'a str,
    vars: &'a [(String, String)],
    lookup: HashMap<&'a str, &'a str>,
}

impl Walker<'_> {
    fn walk(
        &self,
        shape: &Shape,
        path: &mut Vec<Segment>,
        out: &mut Vec<RawEntry>,
    ) -> Result<(), ConfbindError> {
        match shape {
            Shape::Struct(fields) => {
                for field in fields {
                    if field.inline {
                        self.walk(&field.shape, path, out)?;
                    } else {
                        path.push(Segment::Field(field.name));
                        self.walk(&field.shape, path, out)?;
                        path.pop();
                    }
                }
                Ok(())
            }
            Shape::Pointer(inner) => self.walk(inner, path, out),
            Shape::Seq { elem, len } => {
                let mut indices = Vec::new();
                for (segment, var) in self.next_segments(path) {
                    let index: usize =
                        segment
                            .parse()
                            .map_err(|_| ConfbindError::InvalidIndex {
                                segment: segment.clone(),
                                key: var.to_string(),
                            })?;
                    if let Some(len) = *len
                        && index >= len
                    {
                        return Err(ConfbindError::IndexOutOfBounds {
                            index,
                            len,
                            key: var.to_string(),
                        });
                    }
                    indices.push(index);
                }
                indices.sort_unstable();
                indices.dedup();
                for index in indices {
                    path.push(Segment::Index(index));
                    self.walk(elem, path, out)?;
                    path.pop();
                }
                Ok(())
            }
            Shape::Map { elem, .. } => {
                for (segment, _) in self.next_segments(path) {
                    path.push(Segment::Key(segment));
                    self.walk(elem, path, out)?;
                    path.pop();
                }
                Ok(())
            }
            Shape::Scalar(_) | Shape::Text(_) => {
                let name = env_key(self.prefix, path, self.separator);
                if let Some(value) = self.lookup.get(name.as_str()) {
                    out.push(RawEntry::new(Path::from(path.clone()), *value));
                }
                Ok(())
            }
            Shape::Opaque => Ok(()),
        }
    }

    /// Lower-cased tokens following the collection at `path`, first-seen
    /// order, each with the first variable that contributed it.
    fn next_segments(&self, path: &[Segment]) -> Vec<(String, &str)> {
        let base = env_key(self.prefix, path, self.separator);
        let needle = if base.is_empty() {
            String::new()
        } else {
            format!("{base}{}", self.separator)
        };
        let mut segments: Vec<(String, &str)> = Vec::new();
        for (name, _) in self.vars {
            let Some(rest) = name.strip_prefix(&needle) else {
                continue;
            };
            let token = rest.split(self.separator).next().unwrap_or_default();
            if token.is_empty() {
                continue;
            }
            let token = token.to_lowercase();
            if !segments.iter().any(|(seen, _)| *seen == token) {
                segments.push((token, name.as_str()));
            }
        }
        segments
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::bind_struct;
    use crate::fixtures::test::{
        AppConfig, BasicConfig, CollectionsConfig, Mode, StructPtr, Struct1,
    };
    use crate::parsers::Parsers;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn load<C: Bind + Default>(source: &mut EnvSource, config: &mut C) -> Result<(), ConfbindError> {
        let shape = C::shape();
        let parsers = Parsers::default();
        let mut cx = LoadContext::new(&shape, &parsers);
        source.load(config, &mut cx)
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct ListConfig {
        config: Vec<i64>,
    }
    bind_struct!(ListConfig { config });

    #[derive(Debug, Default, Clone, PartialEq)]
    struct MapConfig {
        config: HashMap<String, String>,
    }
    bind_struct!(MapConfig { config });

    #[test]
    fn flat_scalars() {
        let mut source = EnvSource::new("").with_vars(vars(&[
            ("STRING_VALUE", "FOOO"),
            ("INT_VALUE", "10"),
            ("BOOL_VALUE", "true"),
        ]));
        let mut config = BasicConfig::default();
        load(&mut source, &mut config).unwrap();
        assert_eq!(
            config,
            BasicConfig {
                string_value: "FOOO".into(),
                int_value: 10,
                bool_value: true,
            }
        );
    }

    #[test]
    fn prefix_is_prepended() {
        let mut source = EnvSource::new("myApp").with_vars(vars(&[
            ("MY_APP_INT_VALUE", "3"),
            ("INT_VALUE", "99"),
        ]));
        let mut config = BasicConfig::default();
        load(&mut source, &mut config).unwrap();
        assert_eq!(config.int_value, 3);
    }

    #[test]
    fn absent_variables_keep_defaults() {
        let mut source = EnvSource::new("APP").with_vars(vars(&[("APP_BOOL_VALUE", "1")]));
        let mut config = BasicConfig {
            string_value: "default".into(),
            int_value: 42,
            bool_value: false,
        };
        load(&mut source, &mut config).unwrap();
        assert_eq!(config.string_value, "default");
        assert_eq!(config.int_value, 42);
        assert!(config.bool_value);
    }

    #[test]
    fn nested_pointers_allocate_only_when_touched() {
        let mut source = EnvSource::new("").with_vars(vars(&[
            ("PTR_STRUCT1_S1_INT", "1"),
            ("PTR_STRUCT1_S1_PTR_STRUCT3_S3_FLOAT64", "2.5"),
            ("DURATION_FIELD", "21s"),
        ]));
        let mut config = StructPtr::default();
        load(&mut source, &mut config).unwrap();
        let s1 = config.ptr_struct1.as_ref().unwrap();
        assert_eq!(s1.s1_int, 1);
        assert_eq!(s1.s1_ptr_struct3.as_ref().unwrap().s3_float64, 2.5);
        assert!(config.ptr_struct2.is_none());
        assert_eq!(config.duration_field, Duration::from_secs(21));
    }

    #[test]
    fn existing_pointer_values_survive() {
        let mut source = EnvSource::new("").with_vars(vars(&[("PTR_STRUCT1_S1_BOOL", "t")]));
        let mut config = StructPtr {
            ptr_struct1: Some(Struct1 {
                s1_int: 9,
                ..Default::default()
            }),
            ..Default::default()
        };
        load(&mut source, &mut config).unwrap();
        let s1 = config.ptr_struct1.unwrap();
        assert_eq!(s1.s1_int, 9);
        assert!(s1.s1_bool);
    }

    #[test]
    fn invalid_index_applies_nothing() {
        let mut source = EnvSource::new("").with_vars(vars(&[
            ("CONFIG_0", "1"),
            ("CONFIG_1", "10"),
            ("CONFIG_PATATE", "true"),
        ]));
        let mut config = ListConfig::default();
        let err = load(&mut source, &mut config).unwrap_err();
        match err {
            ConfbindError::InvalidIndex { segment, key } => {
                assert_eq!(segment, "patate");
                assert_eq!(key, "CONFIG_PATATE");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(config.config.is_empty());
    }

    #[test]
    fn map_keys_are_lowercased() {
        let mut source =
            EnvSource::new("").with_vars(vars(&[("CONFIG_FOO", "FOO"), ("CONFIG_BAR", "MEH")]));
        let mut config = MapConfig::default();
        load(&mut source, &mut config).unwrap();
        let expected: HashMap<String, String> = [("foo", "FOO"), ("bar", "MEH")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(config.config, expected);
    }

    #[test]
    fn slice_indices_sorted_numerically() {
        let mut source = EnvSource::new("APP").with_vars(vars(&[
            ("APP_PORTS_10", "3"),
            ("APP_PORTS_2", "2"),
            ("APP_PORTS_0", "1"),
        ]));
        let entries = source.collect(&CollectionsConfig::shape()).unwrap();
        let indices: Vec<String> = entries.iter().map(|e| e.path.to_string()).collect();
        assert_eq!(indices, vec!["ports.0", "ports.2", "ports.10"]);

        let mut config = CollectionsConfig::default();
        load(&mut source, &mut config).unwrap();
        assert_eq!(config.ports.len(), 11);
        assert_eq!(config.ports[10], 3);
    }

    #[test]
    fn padded_index_tokens_collapse() {
        let mut source = EnvSource::new("APP").with_vars(vars(&[
            ("APP_PORTS_0", "1"),
            ("APP_PORTS_00", "2"),
        ]));
        let entries = source.collect(&CollectionsConfig::shape()).unwrap();
        let ports_0 = vec![Segment::Field("ports"), Segment::Index(0)];
        assert_eq!(entries, vec![RawEntry::new(ports_0, "1")]);
    }

    #[test]
    fn failed_values_leave_collections_alone() {
        let mut config = CollectionsConfig::default();
        let mut source = EnvSource::new("APP").with_vars(vars(&[("APP_WEIGHTS_3", "abc")]));
        let err = load(&mut source, &mut config).unwrap_err();
        assert!(matches!(err, ConfbindError::InvalidValue { .. }));
        assert!(config.weights.is_empty());

        let mut source = EnvSource::new("APP").with_vars(vars(&[("APP_PORTS_5", "notaport")]));
        load(&mut source, &mut config).unwrap_err();
        assert!(config.ports.is_empty());
    }

    #[test]
    fn huge_index_is_rejected_without_allocating() {
        let mut source = EnvSource::new("APP")
            .with_vars(vars(&[("APP_PORTS_18446744073709551615", "1")]));
        let mut config = CollectionsConfig::default();
        let err = load(&mut source, &mut config).unwrap_err();
        assert!(matches!(err, ConfbindError::IndexOutOfBounds { index: usize::MAX, .. }));
        assert!(config.ports.is_empty());
    }

    #[test]
    fn structs_inside_slices_and_maps() {
        let mut source = EnvSource::new("APP").with_vars(vars(&[
            ("APP_SERVERS_0_HOST", "a"),
            ("APP_SERVERS_0_PORT", "80"),
            ("APP_SERVERS_1_TAGS_0", "edge"),
            ("APP_BACKENDS_API_PORT", "9000"),
            ("APP_WEIGHTS_3", "0.5"),
        ]));
        let mut config = CollectionsConfig::default();
        load(&mut source, &mut config).unwrap();
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers[0].host, "a");
        assert_eq!(config.servers[0].port, 80);
        assert_eq!(config.servers[1].tags, vec!["edge".to_string()]);
        assert_eq!(config.backends["api"].port, 9000);
        assert_eq!(config.weights[&3], 0.5);
    }

    #[test]
    fn array_index_beyond_length_fails() {
        let mut source =
            EnvSource::new("").with_vars(vars(&[("PAIR_0", "1"), ("PAIR_2", "3")]));
        let mut config = CollectionsConfig::default();
        let err = load(&mut source, &mut config).unwrap_err();
        assert!(matches!(
            err,
            ConfbindError::IndexOutOfBounds { index: 2, len: 2, ref key } if key == "PAIR_2"
        ));
        assert_eq!(config.pair, [0, 0]);
    }

    #[test]
    fn custom_separator() {
        let mut source = EnvSource::new("APP")
            .separator("__")
            .with_vars(vars(&[("APP__INT__VALUE", "5"), ("APP__LABELS__TEAM", "x")]));
        let mut config = BasicConfig::default();
        load(&mut source, &mut config).unwrap();
        assert_eq!(config.int_value, 5);

        let mut collections = CollectionsConfig::default();
        load(&mut source, &mut collections).unwrap();
        assert_eq!(collections.labels["team"], "x");
    }

    #[test]
    fn flattened_fields_use_parent_names() {
        let mut source = EnvSource::new("").with_vars(vars(&[
            ("LOG_LEVEL", "debug"),
            ("MODE", "slow"),
            ("COMMON_MODE", "fast"),
            ("INTERNAL_COUNTER", "1"),
        ]));
        let mut config = AppConfig::default();
        load(&mut source, &mut config).unwrap();
        assert_eq!(config.common.log_level, "debug");
        assert_eq!(config.common.mode, Mode::Slow);
        assert_eq!(config.internal_counter, 7);
    }

    #[test]
    fn prefix_without_separator_is_not_a_member() {
        let source = EnvSource::new("").with_vars(vars(&[("LABELSX", "1"), ("LABELS", "2")]));
        let entries = source.collect(&CollectionsConfig::shape()).unwrap();
        assert!(entries.is_empty());
    }
}
