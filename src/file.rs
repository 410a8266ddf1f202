//! TOML file source.
//!
//! Each [`SearchPath`] is resolved to a directory and checked, in order, for
//! `{dir}/{name}.toml`. The first file found is the only one read; a missing
//! file everywhere means the source has nothing to merge. Only real I/O
//! errors (permissions, etc.) are propagated.
//!
//! The parsed table is folded into a [`KvTree`] and decoded with the same
//! rules as the KV source: keys match fields by normalized name, arrays are
//! index directories and scalars are their literal text.
//!
//! In strict mode (the default) a key that matches no field fails the pass
//! before anything is written, reporting the file and a best-effort line.

use std::path::PathBuf;

use tracing::debug;

use crate::error::ConfbindError;
use crate::schema::Bind;
use crate::source::{LoadContext, Source};
use crate::tree::{KvTree, TreeDecoder, find_unknown_keys};
use crate::types::SearchPath;

pub struct TomlSource {
    name: String,
    search_paths: Vec<SearchPath>,
    strict: bool,
}

impl TomlSource {
    /// Look for `<name>.toml` in the platform config directory, then the
    /// current directory. `name` also names the platform directory.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            search_paths: vec![SearchPath::Platform, SearchPath::Cwd],
            strict: true,
        }
    }

    /// Replace the search paths. Earlier entries are checked first.
    pub fn search_paths(mut self, paths: Vec<SearchPath>) -> Self {
        self.search_paths = paths;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn file_name(&self) -> String {
        format!("{}.toml", self.name)
    }

    /// The first existing file and its content, if any.
    pub fn find(&self) -> Result<Option<(PathBuf, String)>, ConfbindError> {
        let file_name = self.file_name();
        for dir in self
            .search_paths
            .iter()
            .filter_map(|sp| sp.resolve(&self.name))
        {
            let file_path = dir.join(&file_name);
            match std::fs::read_to_string(&file_path) {
                Ok(content) => return Ok(Some((file_path, content))),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(ConfbindError::IoError {
                        path: file_path,
                        source: e,
                    });
                }
            }
        }
        Ok(None)
    }
}

impl Source for TomlSource {
    fn name(&self) -> &str {
        "toml"
    }

    fn load(
        &mut self,
        config: &mut dyn Bind,
        cx: &mut LoadContext<'_>,
    ) -> Result<(), ConfbindError> {
        let Some((path, content)) = self.find()? else {
            debug!(file = %self.file_name(), "no config file found");
            return Ok(());
        };
        let table: toml::Table = content.parse().map_err(|e| ConfbindError::ParseError {
            path: path.clone(),
            source: e,
        })?;
        let tree = fold_table(&table)?;

        if self.strict {
            let unknown = find_unknown_keys(cx.shape, &tree);
            if !unknown.is_empty() {
                let errors = unknown
                    .into_iter()
                    .map(|key| {
                        let line = find_key_line(&content, &key);
                        ConfbindError::UnknownKey {
                            key,
                            path: path.clone(),
                            line,
                        }
                    })
                    .collect();
                return Err(ConfbindError::UnknownKeys(errors));
            }
        }

        let mut decoder = TreeDecoder::new(cx.parsers);
        decoder.decode(config, cx.shape, &tree)?;
        debug!(
            file = %path.display(),
            entries = decoder.assigned(),
            "config file loaded"
        );
        Ok(())
    }
}

/// Fold a parsed table into the nested tree form.
pub(crate) fn fold_table(table: &toml::Table) -> Result<KvTree, ConfbindError> {
    let mut tree = KvTree::new();
    let mut segments = Vec::new();
    for (key, value) in table {
        segments.push(key.clone());
        fold_value(value, &mut segments, &mut tree)?;
        segments.pop();
    }
    Ok(tree)
}

fn fold_value(
    value: &toml::Value,
    segments: &mut Vec<String>,
    tree: &mut KvTree,
) -> Result<(), ConfbindError> {
    let literal = match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Datetime(d) => d.to_string(),
        toml::Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                segments.push(index.to_string());
                fold_value(item, segments, tree)?;
                segments.pop();
            }
            return Ok(());
        }
        toml::Value::Table(table) => {
            for (key, item) in table {
                segments.push(key.clone());
                fold_value(item, segments, tree)?;
                segments.pop();
            }
            return Ok(());
        }
    };
    tree.insert(segments.as_slice(), literal.into_bytes())
}

/// Find the 1-indexed line number for a dotted key in TOML content.
///
/// Tracks `[section]` and `[[section]]` headers while scanning and only
/// matches the leaf key inside the right section. Numeric segments (array
/// indices) are ignored when comparing sections. Quoted keys and inline
/// tables are not handled. Returns 0 if the key cannot be located.
fn find_key_line(content: &str, dotted_key: &str) -> usize {
    let segments: Vec<&str> = dotted_key
        .split('.')
        .filter(|s| s.parse::<usize>().is_err())
        .collect();
    let Some((leaf, expected_section)) = segments.split_last() else {
        return 0;
    };

    let mut current_section: Vec<String> = Vec::new();

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();

        if trimmed.starts_with('[') {
            let header = trimmed.trim_start_matches('[').trim_end_matches(']').trim();
            current_section = header.split('.').map(|s| s.trim().to_string()).collect();
            if current_section.len() == segments.len()
                && current_section.iter().zip(&segments).all(|(a, b)| a == b)
            {
                return i + 1;
            }
            continue;
        }

        let in_right_section = expected_section.len() == current_section.len()
            && expected_section
                .iter()
                .zip(&current_section)
                .all(|(a, b)| a == b);

        if in_right_section
            && let Some(after_key) = trimmed.strip_prefix(leaf)
            && after_key.trim_start().starts_with('=')
        {
            return i + 1;
        }
    }
    0
}
