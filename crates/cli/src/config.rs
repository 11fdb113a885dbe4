//! Top-level arguments, logging and node configuration loading.

use crate::commands::Command;
use anyhow::{Context, Result};
use clap::Parser;
use corelib::PartitionerKind;
use dht::NodeConfig;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chord", version, about = "Chord ring node and client")]
pub struct CliConfig {
    /// Default log filter; `RUST_LOG` takes precedence.
    #[arg(long, global = true, default_value = "info")]
    pub log: String,

    /// Timeout for each request the client sends, in milliseconds.
    #[arg(long, global = true, default_value_t = 2000)]
    pub timeout_ms: u64,

    /// Hash placing keys on the ring (blake3, xxh3 or sip). Must match the
    /// ring's own setting.
    #[arg(long, global = true, default_value = "blake3")]
    pub partitioner: PartitionerKind,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    /// Installs logging, starts the runtime and executes the command.
    pub fn run(self) -> Result<()> {
        init_tracing(&self.log);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start tokio runtime")?;
        let result = runtime.block_on(self.command.execute(&self))?;
        if !result.is_silent() {
            println!("{}", result);
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // A second subscriber (tests, embedding) is not an error.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Reads a JSON node configuration; missing fields take their defaults.
pub fn load_node_config(path: &Path) -> Result<NodeConfig> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: NodeConfig =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    config.validate()?;
    Ok(config)
}
