use tracing::debug;

use crate::describe::{KeyInfo, Naming, describe};
use crate::env::EnvSource;
use crate::error::ConfbindError;
use crate::file::TomlSource;
use crate::kv::{KvSource, KvStore};
use crate::parsers::Parsers;
use crate::schema::Bind;
use crate::source::{LoadContext, Source};
use crate::types::SearchPath;

/// Entry point for building a confbind resolution run.
pub struct Confbind;

impl Confbind {
    /// Start from `config`. Every source writes into it in turn.
    pub fn builder<C: Bind>(config: C) -> ConfbindBuilder<C> {
        ConfbindBuilder::new(config)
    }
}

/// Builder that collects sources and runs them, in the order they were
/// added, against one configuration value.
///
/// Each source only writes the leaves it finds, so a later source overrides
/// an earlier one leaf by leaf. The first failing source aborts the run.
pub struct ConfbindBuilder<C: Bind> {
    config: C,
    parsers: Parsers,
    default_pointers: Option<C>,
    sources: Vec<Box<dyn Source>>,
    naming: Naming,
}

impl<C: Bind> ConfbindBuilder<C> {
    fn new(config: C) -> Self {
        Self {
            config,
            parsers: Parsers::default(),
            default_pointers: None,
            sources: Vec::new(),
            naming: Naming::default(),
        }
    }

    /// Replace the parser registry (default: [`Parsers::default`]).
    pub fn parsers(mut self, parsers: Parsers) -> Self {
        self.parsers = parsers;
        self
    }

    /// Value an optional struct takes when a flag switches it on.
    pub fn default_pointers(mut self, defaults: C) -> Self {
        self.default_pointers = Some(defaults);
        self
    }

    /// Append a source. Later sources take precedence.
    pub fn source(mut self, source: impl Source + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Append an environment source reading `PREFIX_*` variables.
    pub fn env(mut self, prefix: &str) -> Self {
        self.naming.env_prefix = prefix.to_string();
        self.source(EnvSource::new(prefix))
    }

    /// Append a TOML source looking for `<name>.toml` in `paths`, in order.
    pub fn toml(self, name: &str, paths: Vec<SearchPath>) -> Self {
        self.source(TomlSource::new(name).search_paths(paths))
    }

    /// Append a KV source reading keys under `prefix/`.
    pub fn kv<S: KvStore + 'static>(mut self, store: S, prefix: &str) -> Self {
        let source = KvSource::new(store, prefix);
        self.naming.kv_prefix = source.prefix().to_string();
        self.source(source)
    }

    /// Append a command-line flag source. `args` includes the binary name.
    #[cfg(feature = "clap")]
    pub fn flags<I, T>(self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString>,
    {
        self.source(crate::flags::FlagSource::new(args))
    }

    /// Every statically reachable key, named the way the configured env and
    /// KV sources read it.
    pub fn describe(&self) -> Vec<KeyInfo> {
        describe(&C::shape(), &self.naming)
    }

    /// Run every source and return the resolved configuration.
    pub fn load(self) -> Result<C, ConfbindError> {
        let Self {
            mut config,
            parsers,
            mut default_pointers,
            mut sources,
            ..
        } = self;
        run(
            &mut sources,
            &parsers,
            default_pointers.as_mut(),
            &mut config,
        )?;
        Ok(config)
    }

    /// Run every source against `target` instead of the builder's own value.
    ///
    /// On failure, the passes that completed before the failing one stay
    /// visible in `target`.
    pub fn load_into(self, target: &mut C) -> Result<(), ConfbindError> {
        let Self {
            parsers,
            mut default_pointers,
            mut sources,
            ..
        } = self;
        run(&mut sources, &parsers, default_pointers.as_mut(), target)
    }
}

fn run<C: Bind>(
    sources: &mut [Box<dyn Source>],
    parsers: &Parsers,
    defaults: Option<&mut C>,
    config: &mut C,
) -> Result<(), ConfbindError> {
    let shape = C::shape();
    let mut cx = LoadContext::new(&shape, parsers);
    if let Some(defaults) = defaults {
        cx = cx.with_defaults(defaults);
    }
    for (pass, source) in sources.iter_mut().enumerate() {
        debug!(pass, source = source.name(), "resolution pass");
        source.load(config, &mut cx)?;
    }
    Ok(())
}
