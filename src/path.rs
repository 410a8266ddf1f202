//! Paths into a configuration value and the external key conventions derived
//! from them.
//!
//! A [`Path`] is a list of [`Segment`]s: struct field names, collection
//! indices and map keys. Each source flattens a path into its own kind of
//! external key:
//!
//! | Source | Path `servers / 0 / max_conns` | Rule |
//! |--------|-------------------------------|------|
//! | env    | `APP_SERVERS_0_MAX_CONNS`     | words joined by separator, upper-cased |
//! | KV     | `app/servers/0/maxconns`      | one level per segment, field words concatenated and lower-cased |
//! | flags  | `--servers.max-conns`         | field words kebab-cased, segments dot-joined |
//!
//! Field names are split into words at `_`/`-` and at case boundaries
//! (`IAmBatman` → `I`, `Am`, `Batman`). Index and map-key segments are single
//! words and are never split or case-folded here.

use std::fmt;


/// One step into a configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// A struct field, named as registered with `bind_struct!`.
    Field(&'static str),
    /// A slice or array index.
    Index(usize),
    /// A map key, kept verbatim regardless of the map's key type.
    Key(String),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => f.write_str(name),
            Segment::Index(i) => write!(f, "{i}"),
            Segment::Key(key) => f.write_str(key),
        }
    }
}

/// An ordered list of segments locating one node of a configuration value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<Segment>);

impl Path {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn push(&mut self, segment: Segment) {
        self.0.push(segment);
    }

    pub fn pop(&mut self) -> Option<Segment> {
        self.0.pop()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A copy of this path with one more segment.
    pub fn child(&self, segment: Segment) -> Path {
        let mut next = self.clone();
        next.push(segment);
        next
    }
}

impl From<Vec<Segment>> for Path {
    fn from(segments: Vec<Segment>) -> Self {
        Self(segments)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// Split a field name into words.
///
/// Breaks on `_` and `-`, on a lowercase (or digit) to uppercase transition,
/// and before the last capital of an acronym run (`HTTPServer` → `HTTP`,
/// `Server`). Digits stay attached to the word they follow. Case tests use
/// Unicode case properties; characters without case never start a word.
pub fn split_words(name: &str) -> Vec<&str> {
    let mut words = Vec::new();
    for part in name.split(['_', '-']) {
        if part.is_empty() {
            continue;
        }
        let chars: Vec<(usize, char)> = part.char_indices().collect();
        let mut start = 0;
        for i in 1..chars.len() {
            let prev = chars[i - 1].1;
            let cur = chars[i].1;
            let next_is_lower = chars.get(i + 1).is_some_and(|(_, c)| c.is_lowercase());
            let boundary = ((prev.is_lowercase() || prev.is_ascii_digit()) && cur.is_uppercase())
                || (prev.is_uppercase() && cur.is_uppercase() && next_is_lower);
            if boundary {
                words.push(&part[start..chars[i].0]);
                start = chars[i].0;
            }
        }
        words.push(&part[start..]);
    }
    words
}

/// Words contributed by one segment.
fn segment_words(segment: &Segment) -> Vec<String> {
    match segment {
        Segment::Field(name) => split_words(name).into_iter().map(str::to_string).collect(),
        Segment::Index(i) => vec![i.to_string()],
        Segment::Key(key) => vec![key.clone()],
    }
}

/// Environment variable name for `path`: `[PREFIX<sep>]WORD<sep>WORD...`,
/// upper-cased.
pub fn env_key(prefix: &str, path: &[Segment], separator: &str) -> String {
    let mut words: Vec<String> = split_words(prefix)
        .into_iter()
        .map(str::to_string)
        .collect();
    for segment in path {
        words.extend(segment_words(segment));
    }
    words.join(separator).to_uppercase()
}

/// Lower-cased, separator-free form of a field name (`ptr_struct1` →
/// `ptrstruct1`). Two names that normalize equally address the same field.
pub fn normalize_field(name: &str) -> String {
    split_words(name).concat().to_lowercase()
}

/// Whether an external key segment names the struct field `field`.
pub fn field_matches(external: &str, field: &str) -> bool {
    normalize_field(external) == normalize_field(field)
}

/// KV key for `path` under `prefix`: `prefix/field/0/key/...`.
pub fn kv_key(prefix: &str, path: &[Segment]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(path.len() + 1);
    if !prefix.is_empty() {
        parts.push(prefix.to_string());
    }
    for segment in path {
        parts.push(kv_segment(segment));
    }
    parts.join("/")
}

/// One level of a KV key.
pub fn kv_segment(segment: &Segment) -> String {
    match segment {
        Segment::Field(name) => normalize_field(name),
        Segment::Index(i) => i.to_string(),
        Segment::Key(key) => key.clone(),
    }
}

/// Long flag name for `path` (without the leading `--`).
pub fn flag_name(path: &[Segment]) -> String {
    path.iter()
        .map(|segment| match segment {
            Segment::Field(name) => split_words(name).join("-").to_lowercase(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[Segment]) -> Vec<Segment> {
        segments.to_vec()
    }

    #[test]
    fn split_camel_case() {
        assert_eq!(split_words("IAmBatman"), vec!["I", "Am", "Batman"]);
        assert_eq!(split_words("StringValue"), vec!["String", "Value"]);
    }

    #[test]
    fn split_snake_case() {
        assert_eq!(split_words("max_connections"), vec!["max", "connections"]);
        assert_eq!(split_words("ptr_struct1"), vec!["ptr", "struct1"]);
    }

    #[test]
    fn split_acronym_run() {
        assert_eq!(split_words("HTTPServer"), vec!["HTTP", "Server"]);
        assert_eq!(split_words("S1Int"), vec!["S1", "Int"]);
    }

    #[test]
    fn split_ignores_empty_parts() {
        assert_eq!(split_words("__a__b"), vec!["a", "b"]);
        assert!(split_words("").is_empty());
    }

    #[test]
    fn env_key_without_prefix() {
        let key = env_key("", &path(&[Segment::Field("string_value")]), "_");
        assert_eq!(key, "STRING_VALUE");
    }

    #[test]
    fn env_key_with_prefix_and_nesting() {
        let key = env_key(
            "myApp",
            &path(&[
                Segment::Field("servers"),
                Segment::Index(0),
                Segment::Field("maxConns"),
            ]),
            "_",
        );
        assert_eq!(key, "MY_APP_SERVERS_0_MAX_CONNS");
    }

    #[test]
    fn env_key_custom_separator() {
        let key = env_key(
            "APP",
            &path(&[Segment::Field("database"), Segment::Field("pool_size")]),
            "__",
        );
        assert_eq!(key, "APP__DATABASE__POOL__SIZE");
    }

    #[test]
    fn env_key_map_key_is_one_word() {
        let key = env_key(
            "",
            &path(&[Segment::Field("labels"), Segment::Key("teamName".into())]),
            "_",
        );
        assert_eq!(key, "LABELS_TEAMNAME");
    }

    #[test]
    fn kv_key_lowercases_fields_and_keeps_map_keys() {
        let key = kv_key(
            "prefix",
            &path(&[
                Segment::Field("ptr_struct1"),
                Segment::Key("Mixed%Case".into()),
                Segment::Index(2),
            ]),
        );
        assert_eq!(key, "prefix/ptrstruct1/Mixed%Case/2");
    }

    #[test]
    fn flag_name_is_kebab_and_dotted() {
        let name = flag_name(&path(&[
            Segment::Field("ptr_struct1"),
            Segment::Field("s1_ptr_struct3"),
        ]));
        assert_eq!(name, "ptr-struct1.s1-ptr-struct3");
    }

    #[test]
    fn field_matching_ignores_case_and_separators() {
        assert!(field_matches("ptrstruct1", "ptr_struct1"));
        assert!(field_matches("PtrStruct1", "ptr_struct1"));
        assert!(!field_matches("ptrstruct2", "ptr_struct1"));
    }

    #[test]
    fn path_display_is_dotted() {
        let p = Path::from(vec![Segment::Field("servers"), Segment::Index(1)]);
        assert_eq!(p.to_string(), "servers.1");
        assert_eq!(Path::new().to_string(), "<root>");
    }
}
