//! Emitter CLI
//!
//! Drives an `EmitterThing` from the command line and prints every event its
//! listeners receive.
//!
//! # Usage
//!
//! ```bash
//! # Emit 100 rounds of test/test2/test3
//! emitter-cli run --count 100
//!
//! # Through the reentrant emit path, as JSON lines
//! emitter-cli run --count 10 --reentrant --json
//!
//! # Small queue that blocks the worker when full
//! emitter-cli --queue-capacity 2 --overflow-policy block run
//!
//! # Show the effective configuration
//! emitter-cli config
//!
//! # Verbose logging
//! RUST_LOG=debug emitter-cli run
//! ```
//!
//! # Environment Variables
//!
//! - `EMITTER_CONFIG`: Configuration file path
//! - `EMITTER_QUEUE_CAPACITY`: Queue capacity per run
//! - `EMITTER_OVERFLOW_POLICY`: `reject` or `block`
//! - `RUST_LOG`: Log filter (trace, debug, info, warn, error)

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use tracing::{info, warn};

use emitter_core::{
    default_config_path, load_config_with_env, ConfigOverrides, EmitterConfigFile, EmitterThing,
    EventValue, OverflowPolicy, RUN_EVENTS,
};

/// Emitter CLI - run cross-thread event emission from the terminal
#[derive(Parser, Debug)]
#[command(name = "emitter-cli")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Configuration file path
    #[arg(short = 'c', long, global = true, env = "EMITTER_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Queue capacity (non-zero power of two)
    #[arg(long, global = true, value_name = "N")]
    queue_capacity: Option<usize>,

    /// What an emit does when the queue is full (reject, block)
    #[arg(long, global = true, value_name = "POLICY")]
    overflow_policy: Option<OverflowPolicy>,

    /// Log level used when RUST_LOG is unset
    #[arg(short = 'l', long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Emit rounds of test, test2 and test3 events and print them
    Run {
        /// Number of rounds
        #[arg(short = 'n', long, default_value_t = 100)]
        count: u32,

        /// Emit through the reentrant sender path
        #[arg(long)]
        reentrant: bool,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration and where it came from
    Config,
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("emitter_cli={level},emitter_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config<E>(args: &Args, env: E) -> Result<EmitterConfigFile>
where
    E: Fn(&str) -> Option<String>,
{
    let path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_with_env(path, env).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(capacity) = args.queue_capacity {
        overrides = overrides.with_queue_capacity(capacity);
    }
    if let Some(policy) = args.overflow_policy {
        overrides = overrides.with_overflow_policy(policy);
    }
    overrides
        .apply(&mut config)
        .context("Invalid command-line override")?;

    Ok(config)
}

fn render(event: &str, value: &EventValue, json: bool) -> String {
    if json {
        serde_json::json!({ "event": event, "value": value.to_json() }).to_string()
    } else {
        format!("{event}: {value}")
    }
}

/// Emit `count` rounds, writing each event and then a summary line to `out`
async fn run<W>(
    config: &EmitterConfigFile,
    count: u32,
    reentrant: bool,
    json: bool,
    out: Arc<Mutex<W>>,
) -> Result<()>
where
    W: Write + Send + 'static,
{
    let thing = EmitterThing::with_config(config.worker);
    let printed = Arc::new(AtomicU64::new(0));

    for event in RUN_EVENTS {
        let printed = Arc::clone(&printed);
        let out = Arc::clone(&out);
        thing.on(event, move |value| {
            match writeln!(out.lock(), "{}", render(event, value, json)) {
                Ok(()) => {
                    printed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => warn!(event, error = %e, "Failed to write event"),
            }
        });
    }

    info!(count, reentrant, "Starting run");
    let handle = if reentrant {
        thing.run_reentrant(count, None)
    } else {
        thing.run(count, None)
    }
    .context("Failed to start worker")?;

    let stats = handle.join().await.context("Run failed")?;
    let printed = printed.load(Ordering::Relaxed);

    let mut out = out.lock();
    if json {
        writeln!(
            out,
            "{}",
            serde_json::json!({
                "summary": {
                    "delivered": stats.delivered,
                    "rejected": stats.rejected,
                    "printed": printed,
                }
            })
        )?;
    } else {
        writeln!(
            out,
            "delivered {} events ({} sends retried after a full queue)",
            stats.delivered, stats.rejected
        )?;
    }
    out.flush()?;

    Ok(())
}

fn show_config(config: &EmitterConfigFile) {
    println!("queue_capacity  = {}", config.worker.queue_capacity);
    println!("overflow_policy = {}", config.worker.overflow_policy);
    println!("source          = {}", config.source());
    match &config.config_file_path {
        Some(path) => println!("file            = {}", path.display()),
        None => println!("file            = (none)"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = resolve_config(&args, |key| std::env::var(key).ok())?;

    match args.command {
        Command::Run {
            count,
            reentrant,
            json,
        } => {
            let stdout = Arc::new(Mutex::new(std::io::stdout()));
            run(&config, count, reentrant, json, stdout).await
        }
        Command::Config => {
            show_config(&config);
            Ok(())
        }
    }
}
