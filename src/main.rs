use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::{error, info};

use sockwatch::collector::SocketSetCollector;
use sockwatch::compile::{compile, RuleSet};
use sockwatch::config::SocketConfig;
use sockwatch::error::Result;
use sockwatch::procfs::ProcfsSource;
use sockwatch::resolver::SystemResolver;
use sockwatch::server;

#[derive(Parser, Debug)]
#[command(
    name = "sockwatch",
    version,
    about = "Prometheus exporter reporting presence and count of declared socket connections"
)]
struct Args {
    /// The address to listen on for HTTP scrape requests.
    #[arg(
        long = "web.listen-address",
        default_value = "0.0.0.0:9293",
        env = "SOCKWATCH_LISTEN"
    )]
    listen_address: String,

    /// Path under which to expose metrics.
    #[arg(long = "web.telemetry-path", default_value = "/metrics")]
    telemetry_path: String,

    /// Exporter configuration file.
    #[arg(short = 'c', long, default_value = "config/config.yml")]
    config_file: PathBuf,

    /// Only check the configuration, print one scrape to stdout and exit.
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Trace every candidate entry during matching.
    #[arg(short = 'd', long)]
    debug: bool,

    /// Root of the proc filesystem to read connection tables from.
    #[arg(long, default_value = "/proc")]
    proc_path: PathBuf,
}

fn main() {
    let args = Args::parse();
    init_tracing(args.debug);

    info!(version = env!("CARGO_PKG_VERSION"), "starting sockwatch");

    let rules = match load_rules(&args.config_file) {
        Ok(rules) => rules,
        Err(err) => {
            error!(error = %err, "error loading config");
            process::exit(1);
        }
    };
    info!(
        rules = rules.len(),
        config = %args.config_file.display(),
        "configuration OK"
    );

    let source = ProcfsSource::new(&args.proc_path);
    let collector = SocketSetCollector::new(rules, Box::new(source));
    let registry = Registry::new();
    if let Err(err) = registry.register(Box::new(collector)) {
        error!(error = %err, "failed to register collector");
        process::exit(1);
    }

    if args.dry_run {
        info!("dry run: performing one scrape to stdout");
        dry_run(&registry);
        // Reference behavior: dry-run completion exits non-zero so it is
        // never mistaken for a running exporter by a supervisor.
        process::exit(1);
    }

    let listen: SocketAddr = match args.listen_address.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(address = %args.listen_address, error = %err, "invalid listen address");
            process::exit(1);
        }
    };

    let served = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
        .block_on(server::serve(listen, args.telemetry_path, registry));

    if let Err(err) = served {
        error!(error = %err, "error starting HTTP server");
        process::exit(1);
    }
}

fn load_rules(path: &Path) -> Result<RuleSet> {
    let config = SocketConfig::load(path)?;
    compile(&config, &SystemResolver::new())
}

/// Perform exactly one gather and print the text exposition to stdout.
fn dry_run(registry: &Registry) {
    let families = registry.gather();
    let mut buffer = Vec::new();
    if let Err(err) = TextEncoder::new().encode(&families, &mut buffer) {
        error!(error = %err, "error encoding metrics");
        process::exit(1);
    }
    if let Err(err) = std::io::stdout().write_all(&buffer) {
        error!(error = %err, "error writing metrics");
        process::exit(1);
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "sockwatch=debug"
    } else {
        "sockwatch=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.parse().expect("default filter is valid")),
        )
        .init();
}
