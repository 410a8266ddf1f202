//! Configuration structs for the confbind demo application.
//!
//! # Env var mapping
//!
//! With the prefix `CONFBIND_DEMO`:
//!
//! | Env var                                  | Config path               |
//! |------------------------------------------|---------------------------|
//! | `CONFBIND_DEMO_NAME`                     | `name`                    |
//! | `CONFBIND_DEMO_VERBOSE`                  | `verbose`                 |
//! | `CONFBIND_DEMO_SERVER_HOST`              | `server.host`             |
//! | `CONFBIND_DEMO_SERVER_PORT`              | `server.port`             |
//! | `CONFBIND_DEMO_SERVER_TIMEOUT`           | `server.timeout`          |
//! | `CONFBIND_DEMO_TLS_CERT`                 | `tls.cert` (enables TLS)  |
//! | `CONFBIND_DEMO_UPSTREAMS_0_URL`          | `upstreams[0].url`        |
//! | `CONFBIND_DEMO_LABELS_TEAM`              | `labels["team"]`          |

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use confbind::bind_struct;
use serde::Serialize;

#[derive(Serialize, Debug, Clone)]
pub struct DemoConfig {
    pub name: String,
    pub verbose: bool,
    pub server: ServerConfig,
    /// Switched on by `--tls` or by setting any of its fields.
    pub tls: Option<TlsConfig>,
    pub upstreams: Vec<Upstream>,
    pub labels: BTreeMap<String, String>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            name: "confbind-demo".into(),
            verbose: false,
            server: ServerConfig::default(),
            tls: None,
            upstreams: Vec::new(),
            labels: BTreeMap::new(),
        }
    }
}

bind_struct!(DemoConfig {
    name,
    verbose,
    server,
    tls,
    upstreams,
    labels
});

#[derive(Serialize, Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            timeout: Duration::from_secs(30),
        }
    }
}

bind_struct!(ServerConfig {
    host,
    port,
    timeout
});

#[derive(Serialize, Debug, Clone, Default)]
pub struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

bind_struct!(TlsConfig { cert, key });

#[derive(Serialize, Debug, Clone, Default)]
pub struct Upstream {
    pub url: String,
    pub weight: u32,
}

bind_struct!(Upstream { url, weight });

/// Value `--tls` copies in when TLS is switched on from the command line.
pub fn default_pointers() -> DemoConfig {
    DemoConfig {
        tls: Some(TlsConfig {
            cert: "/etc/confbind-demo/cert.pem".into(),
            key: "/etc/confbind-demo/key.pem".into(),
        }),
        ..Default::default()
    }
}
