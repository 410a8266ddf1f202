#[cfg(test)]
pub mod test {
    use std::any::Any;
    use std::collections::{BTreeMap, HashMap};
    use std::fmt;
    use std::str::FromStr;
    use std::time::Duration;

    use serde::Serialize;

    use crate::{bind_struct, bind_text};

    // -- Flat scalars -----------------------------------------------------------

    #[derive(Serialize, Debug, Default, Clone, PartialEq)]
    pub struct BasicConfig {
        pub string_value: String,
        pub int_value: i64,
        pub bool_value: bool,
    }
    bind_struct!(BasicConfig {
        string_value,
        int_value,
        bool_value
    });

    // -- Nested optional structs ------------------------------------------------

    #[derive(Serialize, Debug, Default, Clone, PartialEq)]
    pub struct StructPtr {
        pub ptr_struct1: Option<Struct1>,
        pub ptr_struct2: Option<Struct2>,
        pub duration_field: Duration,
    }
    bind_struct!(StructPtr {
        ptr_struct1,
        ptr_struct2,
        duration_field
    });

    #[derive(Serialize, Debug, Default, Clone, PartialEq)]
    pub struct Struct1 {
        pub s1_int: i64,
        pub s1_string: String,
        pub s1_bool: bool,
        pub s1_ptr_struct3: Option<Struct3>,
    }
    bind_struct!(Struct1 {
        s1_int,
        s1_string,
        s1_bool,
        s1_ptr_struct3
    });

    #[derive(Serialize, Debug, Default, Clone, PartialEq)]
    pub struct Struct2 {
        pub s2_int64: i64,
        pub s2_string: String,
        pub s2_bool: bool,
    }
    bind_struct!(Struct2 {
        s2_int64,
        s2_string,
        s2_bool
    });

    #[derive(Serialize, Debug, Default, Clone, PartialEq)]
    pub struct Struct3 {
        pub s3_float64: f64,
    }
    bind_struct!(Struct3 { s3_float64 });

    /// Default-pointers value for [`StructPtr`]: what an optional branch
    /// looks like once something switches it on.
    pub fn struct_ptr_pointers() -> StructPtr {
        StructPtr {
            ptr_struct1: Some(Struct1 {
                s1_int: 28,
                s1_string: "S1StringInitWithDefaultPointers".into(),
                s1_bool: false,
                s1_ptr_struct3: Some(Struct3 { s3_float64: 11.11 }),
            }),
            ptr_struct2: Some(Struct2 {
                s2_int64: 33,
                s2_string: "S2StringInitWithDefaultPointers".into(),
                s2_bool: true,
            }),
            duration_field: Duration::from_secs(1),
        }
    }

    // -- Collections -----------------------------------------------------------

    #[derive(Serialize, Debug, Default, Clone, PartialEq)]
    pub struct Server {
        pub host: String,
        pub port: u16,
        pub tags: Vec<String>,
    }
    bind_struct!(Server { host, port, tags });

    #[derive(Serialize, Debug, Default, Clone, PartialEq)]
    pub struct CollectionsConfig {
        pub ports: Vec<u16>,
        pub servers: Vec<Server>,
        pub pair: [u32; 2],
        pub labels: HashMap<String, String>,
        pub backends: BTreeMap<String, Server>,
        pub weights: BTreeMap<u8, f64>,
        pub blob: Vec<u8>,
    }
    bind_struct!(CollectionsConfig {
        ports,
        servers,
        pair,
        labels,
        backends,
        weights,
        blob
    });

    // -- Flattening, text leaves and opaque fields ------------------------------

    #[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[serde(rename_all = "lowercase")]
    pub enum Mode {
        #[default]
        Fast,
        Slow,
    }

    impl FromStr for Mode {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s.to_ascii_lowercase().as_str() {
                "fast" => Ok(Mode::Fast),
                "slow" => Ok(Mode::Slow),
                other => Err(format!("unknown mode '{other}'")),
            }
        }
    }

    impl fmt::Display for Mode {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Mode::Fast => f.write_str("fast"),
                Mode::Slow => f.write_str("slow"),
            }
        }
    }

    bind_text!(Mode);

    #[derive(Serialize, Debug, Default, Clone, PartialEq)]
    pub struct Common {
        pub log_level: String,
        pub mode: Mode,
    }
    bind_struct!(Common { log_level, mode });

    pub struct AppConfig {
        pub name: String,
        pub common: Common,
        pub plugin: Box<dyn Any + Send + Sync>,
        pub internal_counter: u64,
    }
    bind_struct!(AppConfig {
        name,
        #[flatten]
        common,
        plugin
    });

    impl fmt::Debug for AppConfig {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("AppConfig")
                .field("name", &self.name)
                .field("common", &self.common)
                .field("plugin", &"<opaque>")
                .field("internal_counter", &self.internal_counter)
                .finish()
        }
    }

    impl Default for AppConfig {
        fn default() -> Self {
            Self {
                name: "app".into(),
                common: Common::default(),
                plugin: Box::new(()),
                internal_counter: 7,
            }
        }
    }

    #[test]
    fn fixtures_default_to_zero_values() {
        let config = StructPtr::default();
        assert!(config.ptr_struct1.is_none());
        assert_eq!(config.duration_field, Duration::ZERO);

        let app = AppConfig::default();
        assert_eq!(app.common.mode, Mode::Fast);
        assert_eq!(app.internal_counter, 7);
        assert!(format!("{app:?}").contains("plugin: \"<opaque>\""));
    }
}
