use crate::error::ConfbindError;
use crate::parsers::Parsers;
use crate::schema::{Bind, Shape};

/// Everything a source needs besides the value it writes into.
pub struct LoadContext<'a> {
    /// Static shape of the configuration root.
    pub shape: &'a Shape,
    pub parsers: &'a Parsers,
    /// Values an optional branch takes when a source switches it on without
    /// setting any of its fields. Never written to.
    pub defaults: Option<&'a mut dyn Bind>,
}

impl<'a> LoadContext<'a> {
    pub fn new(shape: &'a Shape, parsers: &'a Parsers) -> Self {
        Self {
            shape,
            parsers,
            defaults: None,
        }
    }

    pub fn with_defaults(mut self, defaults: &'a mut dyn Bind) -> Self {
        self.defaults = Some(defaults);
        self
    }
}

/// One configuration source, applied as a single resolution pass.
///
/// A pass only writes the leaves it finds. It never clears or resets a field,
/// so running several sources against the same value gives last-writer-wins
/// precedence per leaf.
pub trait Source {
    /// Short label used in logs.
    fn name(&self) -> &str;

    fn load(&mut self, config: &mut dyn Bind, cx: &mut LoadContext<'_>)
    -> Result<(), ConfbindError>;
}

impl<S: Source + ?Sized> Source for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn load(
        &mut self,
        config: &mut dyn Bind,
        cx: &mut LoadContext<'_>,
    ) -> Result<(), ConfbindError> {
        (**self).load(config, cx)
    }
}
