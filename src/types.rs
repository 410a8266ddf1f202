use std::path::PathBuf;

/// Where to look for a configuration file.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchPath {
    /// Platform config directory (XDG on Linux, ~/Library/Application Support on macOS).
    Platform,
    /// A subdirectory under the user's home directory, e.g. `Home(".myapp".into())`.
    Home(String),
    /// Current working directory.
    Cwd,
    /// An explicit directory. `$VAR` and `${VAR}` are expanded from the
    /// process environment; unset variables expand to nothing.
    Path(PathBuf),
}

impl SearchPath {
    /// Resolve to a concrete directory. `app_name` names the platform
    /// directory. `None` when the location does not exist on this system
    /// (no home directory, unreadable cwd).
    pub fn resolve(&self, app_name: &str) -> Option<PathBuf> {
        match self {
            SearchPath::Platform => {
                let proj = directories::ProjectDirs::from("", "", app_name)?;
                Some(proj.config_dir().to_path_buf())
            }
            SearchPath::Home(subdir) => {
                let user = directories::UserDirs::new()?;
                Some(user.home_dir().join(subdir))
            }
            SearchPath::Cwd => std::env::current_dir().ok(),
            SearchPath::Path(p) => Some(PathBuf::from(expand_vars(&p.to_string_lossy(), |name| {
                std::env::var(name).ok()
            }))),
        }
    }
}

/// Replace `$NAME` and `${NAME}` in `input` using `lookup`.
///
/// A `$` not followed by a name is kept as is.
pub(crate) fn expand_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };
        if name.is_empty() {
            out.push('$');
            rest = after;
            continue;
        }
        out.push_str(&lookup(name).unwrap_or_default());
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}
