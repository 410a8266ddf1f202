//! Command-line flag source (requires the `clap` feature).
//!
//! A clap [`Command`] is built from the configuration's [`Shape`]:
//!
//! - `--server.max-conns <VALUE>` for every leaf reachable through structs
//!   and optional values (kebab-case words, `.` between fields);
//! - `--server` for every optional struct, switching it on. A switched-on
//!   branch is copied from the default-pointers value when one is
//!   configured, otherwise it starts from `Default`. A branch that is already
//!   set is left alone;
//! - `--ports <VALUE>`, repeatable, for sequences of leaves. The n-th
//!   occurrence writes index n;
//! - `--labels <KEY=VALUE>`, repeatable, for maps of leaves.
//!
//! Sequences and maps of structs have no flags.

use std::any::Any;
use std::ffi::OsString;

use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::debug;

use crate::assign::{RawEntry, apply};
use crate::describe::{KeyKind, walk_keys};
use crate::error::ConfbindError;
use crate::path::{Path, Segment, flag_name};
use crate::schema::{Bind, Node, Shape};
use crate::source::{LoadContext, Source};

pub struct FlagSource {
    bin_name: String,
    args: Vec<OsString>,
}

impl FlagSource {
    /// Parse `args`. The first item is the binary name, as with
    /// `std::env::args_os()`.
    pub fn new<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self {
            bin_name: "app".to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Name shown in usage and help output.
    pub fn bin_name(mut self, name: &str) -> Self {
        self.bin_name = name.to_string();
        self
    }

    /// The clap command for a configuration of `shape`.
    pub fn command(&self, shape: &Shape) -> Command {
        build_command(&self.bin_name, &specs(shape))
    }
}

struct FlagSpec {
    id: String,
    path: Path,
    kind: KeyKind,
}

fn specs(shape: &Shape) -> Vec<FlagSpec> {
    walk_keys(shape)
        .into_iter()
        .filter(|(_, kind, _)| *kind != KeyKind::Members)
        .filter(|(path, _, _)| !path.is_empty())
        .map(|(path, kind, _)| FlagSpec {
            id: flag_name(path.segments()),
            path,
            kind,
        })
        .collect()
}

fn build_command(bin_name: &str, specs: &[FlagSpec]) -> Command {
    let mut command = Command::new(bin_name.to_string());
    for spec in specs {
        let arg = Arg::new(spec.id.clone()).long(spec.id.clone());
        let arg = match spec.kind {
            KeyKind::Switch => arg
                .action(ArgAction::SetTrue)
                .help(format!("Enable {}", spec.path)),
            KeyKind::Value => arg
                .action(ArgAction::Set)
                .value_name("VALUE")
                .value_parser(clap::value_parser!(String)),
            KeyKind::List => arg
                .action(ArgAction::Append)
                .value_name("VALUE")
                .value_parser(clap::value_parser!(String)),
            KeyKind::Pairs => arg
                .action(ArgAction::Append)
                .value_name("KEY=VALUE")
                .value_parser(clap::value_parser!(String)),
            KeyKind::Members => continue,
        };
        command = command.arg(arg);
    }
    command
}

/// Raw entries for every value flag present in `matches`, in flag order.
fn entries(specs: &[FlagSpec], matches: &ArgMatches) -> Result<Vec<RawEntry>, ConfbindError> {
    let mut entries = Vec::new();
    for spec in specs {
        match spec.kind {
            KeyKind::Value => {
                if let Some(value) = matches.get_one::<String>(&spec.id) {
                    entries.push(RawEntry::new(spec.path.clone(), value.clone()));
                }
            }
            KeyKind::List => {
                for (index, value) in matches
                    .get_many::<String>(&spec.id)
                    .into_iter()
                    .flatten()
                    .enumerate()
                {
                    let path = spec.path.child(Segment::Index(index));
                    entries.push(RawEntry::new(path, value.clone()));
                }
            }
            KeyKind::Pairs => {
                for pair in matches.get_many::<String>(&spec.id).into_iter().flatten() {
                    let (key, value) =
                        pair.split_once('=')
                            .ok_or_else(|| ConfbindError::InvalidValue {
                                path: spec.path.to_string(),
                                reason: format!("expected KEY=VALUE, got '{pair}'"),
                            })?;
                    let path = spec.path.child(Segment::Key(key.to_string()));
                    entries.push(RawEntry::new(path, value));
                }
            }
            KeyKind::Switch | KeyKind::Members => {}
        }
    }
    Ok(entries)
}

/// Switch on the optional branch at `rest`, copying `template` into it when
/// possible. Returns whether the branch was reached.
fn switch_on(node: Node<'_>, rest: &[Segment], template: Option<&dyn Any>) -> bool {
    let Some((head, tail)) = rest.split_first() else {
        let Node::Pointer(pointer) = node else {
            return false;
        };
        if !pointer.is_set() && !template.is_some_and(|t| pointer.fill_from(t)) {
            pointer.get_or_alloc();
        }
        return true;
    };
    match node {
        Node::Pointer(pointer) => switch_on(pointer.get_or_alloc(), rest, template),
        Node::Struct(fields) => match head {
            Segment::Field(name) => fields
                .field(name)
                .is_some_and(|child| switch_on(child, tail, template)),
            _ => false,
        },
        _ => false,
    }
}

/// The optional branch at `rest` in a defaults value, without allocating.
fn template_at<'a>(node: Node<'a>, rest: &[Segment]) -> Option<&'a dyn Any> {
    let Some((head, tail)) = rest.split_first() else {
        return match node {
            Node::Pointer(pointer) => Some(pointer.as_any()),
            _ => None,
        };
    };
    match node {
        Node::Pointer(pointer) => template_at(pointer.get()?, rest),
        Node::Struct(fields) => match head {
            Segment::Field(name) => template_at(fields.field(name)?, tail),
            _ => None,
        },
        _ => None,
    }
}

impl Source for FlagSource {
    fn name(&self) -> &str {
        "flags"
    }

    fn load(
        &mut self,
        config: &mut dyn Bind,
        cx: &mut LoadContext<'_>,
    ) -> Result<(), ConfbindError> {
        let specs = specs(cx.shape);
        let matches = build_command(&self.bin_name, &specs).try_get_matches_from(&self.args)?;

        let mut switched = 0;
        for spec in specs.iter().filter(|s| s.kind == KeyKind::Switch) {
            if !matches.get_flag(&spec.id) {
                continue;
            }
            let template = match cx.defaults.as_deref_mut() {
                Some(defaults) => template_at(defaults.node(), spec.path.segments()),
                None => None,
            };
            if switch_on(config.node(), spec.path.segments(), template) {
                switched += 1;
            }
        }

        let entries = entries(&specs, &matches)?;
        debug!(
            switches = switched,
            entries = entries.len(),
            "command-line flags parsed"
        );
        apply(config, &entries, cx.parsers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test::{
        AppConfig, CollectionsConfig, Mode, StructPtr, struct_ptr_pointers,
    };
    use crate::parsers::Parsers;
    use std::time::Duration;

    fn load<C: Bind + Default>(args: &[&str]) -> Result<C, ConfbindError> {
        let mut config = C::default();
        let shape = C::shape();
        let parsers = Parsers::default();
        let mut argv = vec!["app"];
        argv.extend_from_slice(args);
        FlagSource::new(argv).load(&mut config, &mut LoadContext::new(&shape, &parsers))?;
        Ok(config)
    }

    #[test]
    fn leaf_flags_through_pointers() {
        let config: StructPtr =
            load(&["--ptr-struct1.s1-int", "5", "--duration-field", "2s"]).unwrap();
        assert_eq!(config.ptr_struct1.as_ref().unwrap().s1_int, 5);
        assert_eq!(config.duration_field, Duration::from_secs(2));
        assert!(config.ptr_struct2.is_none());
    }

    #[test]
    fn switch_without_defaults_allocates_default() {
        let config: StructPtr = load(&["--ptr-struct2"]).unwrap();
        assert_eq!(config.ptr_struct2, Some(Default::default()));
        assert!(config.ptr_struct1.is_none());
    }

    #[test]
    fn switch_copies_default_pointers() {
        let mut config = StructPtr::default();
        let mut defaults = struct_ptr_pointers();
        let shape = StructPtr::shape();
        let parsers = Parsers::default();
        let mut cx = LoadContext::new(&shape, &parsers).with_defaults(&mut defaults);
        FlagSource::new(["app", "--ptr-struct1", "--ptr-struct1.s1-int", "1"])
            .load(&mut config, &mut cx)
            .unwrap();

        let s1 = config.ptr_struct1.as_ref().unwrap();
        assert_eq!(s1.s1_int, 1);
        assert_eq!(s1.s1_string, "S1StringInitWithDefaultPointers");
        assert_eq!(s1.s1_ptr_struct3.as_ref().unwrap().s3_float64, 11.11);
        assert!(config.ptr_struct2.is_none());
    }

    #[test]
    fn switch_leaves_a_set_branch_alone() {
        let mut config = StructPtr::default();
        config.ptr_struct2 = Some(crate::fixtures::test::Struct2 {
            s2_int64: 9,
            ..Default::default()
        });
        let mut defaults = struct_ptr_pointers();
        let shape = StructPtr::shape();
        let parsers = Parsers::default();
        let mut cx = LoadContext::new(&shape, &parsers).with_defaults(&mut defaults);
        FlagSource::new(["app", "--ptr-struct2"])
            .load(&mut config, &mut cx)
            .unwrap();
        assert_eq!(config.ptr_struct2.unwrap().s2_int64, 9);
    }

    #[test]
    fn repeated_flags_fill_sequences_and_maps() {
        let config: CollectionsConfig = load(&[
            "--ports",
            "80",
            "--ports",
            "443",
            "--labels",
            "team=core",
            "--weights",
            "3=0.5",
            "--pair",
            "7",
        ])
        .unwrap();
        assert_eq!(config.ports, vec![80, 443]);
        assert_eq!(config.labels["team"], "core");
        assert_eq!(config.weights[&3], 0.5);
        assert_eq!(config.pair, [7, 0]);
    }

    #[test]
    fn too_many_array_values_are_out_of_bounds() {
        let err = load::<CollectionsConfig>(&["--pair", "1", "--pair", "2", "--pair", "3"])
            .unwrap_err();
        assert!(matches!(err, ConfbindError::IndexOutOfBounds { index: 2, len: 2, .. }));
    }

    #[test]
    fn pair_without_equals_is_rejected() {
        let err = load::<CollectionsConfig>(&["--labels", "team"]).unwrap_err();
        assert!(matches!(err, ConfbindError::InvalidValue { .. }));
    }

    #[test]
    fn flattened_fields_and_text_leaves() {
        let config: AppConfig = load(&["--mode", "slow", "--log-level", "info"]).unwrap();
        assert_eq!(config.common.mode, Mode::Slow);
        assert_eq!(config.common.log_level, "info");
    }

    #[test]
    fn unknown_flag_is_a_cli_error() {
        let err = load::<AppConfig>(&["--plugin", "x"]).unwrap_err();
        assert!(matches!(err, ConfbindError::Cli(_)));
    }

    #[test]
    fn no_flags_changes_nothing() {
        let config: StructPtr = load(&[]).unwrap();
        assert_eq!(config, StructPtr::default());
    }

    #[test]
    fn command_lists_every_flag() {
        let command = FlagSource::new(["app"])
            .bin_name("confd")
            .command(&StructPtr::shape());
        assert_eq!(command.get_name(), "confd");
        let longs: Vec<&str> = command.get_arguments().filter_map(|a| a.get_long()).collect();
        assert!(longs.contains(&"ptr-struct1"));
        assert!(longs.contains(&"ptr-struct1.s1-ptr-struct3.s3-float64"));
        assert!(longs.contains(&"duration-field"));
    }
}
