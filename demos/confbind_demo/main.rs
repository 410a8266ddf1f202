//! # confbind demo application
//!
//! A sample CLI tool that shows how to wire every confbind source into one
//! application. It exists purely to demonstrate and manually verify
//! confbind's features.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example confbind_demo
//! cargo run --example confbind_demo -- --server.port 9000 --tls
//! cargo run --example confbind_demo -- describe
//! cargo run --example confbind_demo -- store
//! ```
//!
//! ## Features demonstrated
//!
//! | Feature                 | How to exercise it                                                        |
//! |-------------------------|---------------------------------------------------------------------------|
//! | Initial value           | `cargo run --example confbind_demo`                                       |
//! | Config file (cwd)       | Create `confbind-demo.toml` in cwd, then run                              |
//! | KV store                | Seeded in-process under `demo/` (`server/port = 7000`)                    |
//! | Env var override        | `CONFBIND_DEMO_SERVER_HOST=0.0.0.0 cargo run --example confbind_demo`     |
//! | Slice from env          | `CONFBIND_DEMO_UPSTREAMS_0_URL=http://a cargo run --example confbind_demo`|
//! | Flag override           | `cargo run --example confbind_demo -- --server.timeout 5s`                |
//! | Optional struct switch  | `cargo run --example confbind_demo -- --tls`                              |
//! | Key listing             | `cargo run --example confbind_demo -- describe`                           |
//! | Write back to the store | `cargo run --example confbind_demo -- store`                              |

mod config;

use confbind::{
    Confbind, ConfbindBuilder, ConfbindError, EnvSource, FlagSource, KvSource, MemoryStore,
    SearchPath,
};

use config::{DemoConfig, default_pointers};

const KV_PREFIX: &str = "demo";

fn seeded_store() -> MemoryStore {
    MemoryStore::with_pairs([
        ("demo/server/port", "7000"),
        ("demo/labels/team", "platform"),
    ])
}

fn make_builder(store: MemoryStore, args: Vec<String>) -> ConfbindBuilder<DemoConfig> {
    Confbind::builder(DemoConfig::default())
        .default_pointers(default_pointers())
        .toml(
            "confbind-demo",
            vec![
                SearchPath::Platform,
                SearchPath::Home(".confbind-demo".into()),
                SearchPath::Cwd,
            ],
        )
        .kv(store, KV_PREFIX)
        .source(EnvSource::new("CONFBIND_DEMO"))
        .source(FlagSource::new(args).bin_name("confbind_demo"))
}

fn print_config(config: &DemoConfig) {
    println!("name            {}", config.name);
    println!("verbose         {}", config.verbose);
    println!("server.host     {}", config.server.host);
    println!("server.port     {}", config.server.port);
    println!(
        "server.timeout  {}",
        humantime::format_duration(config.server.timeout)
    );
    match &config.tls {
        Some(tls) => println!(
            "tls             cert={} key={}",
            tls.cert.display(),
            tls.key.display()
        ),
        None => println!("tls             off"),
    }
    for (i, upstream) in config.upstreams.iter().enumerate() {
        println!("upstreams[{i}]    {} (weight {})", upstream.url, upstream.weight);
    }
    for (key, value) in &config.labels {
        println!("labels[{key}]     {value}");
    }
}

fn store_back(config: &DemoConfig) -> Result<(), ConfbindError> {
    let store = MemoryStore::new();
    let source = KvSource::new(&store, KV_PREFIX);
    source.store_config(config)?;
    let pairs = confbind::list_recursive(&store, KV_PREFIX).map_err(ConfbindError::Store)?;
    for pair in pairs {
        let value = pair.value.unwrap_or_default();
        println!("{} = {}", pair.key, String::from_utf8_lossy(&value));
    }
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("describe") => {
            let builder = make_builder(seeded_store(), vec![args[0].clone()]);
            for key in builder.describe() {
                println!("{key}");
            }
        }
        Some("store") => {
            let config = make_builder(seeded_store(), vec![args[0].clone()])
                .load()
                .unwrap_or_else(|e| {
                    eprintln!("Failed to load config:\n{e}");
                    std::process::exit(1);
                });
            store_back(&config).unwrap_or_else(|e| {
                eprintln!("Failed to store config:\n{e}");
                std::process::exit(1);
            });
        }
        _ => {
            let config = make_builder(seeded_store(), args)
                .load()
                .unwrap_or_else(|e| {
                    eprintln!("Failed to load config:\n{e}");
                    std::process::exit(1);
                });
            print_config(&config);
        }
    }
}
