//! Subcommands: run a node, or talk to a running one.

use crate::config::{load_node_config, CliConfig};
use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use corelib::{Id, IdentifierSpace, LogicalClock, NodeAddr, NodeInfo};
use dht::transport::serve;
use dht::{Node, NodeSnapshot, RpcClient, Stabilizer, TcpTransport};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a ring node until interrupted.
    Serve(ServeArgs),
    /// Show a node's pointers, fingers and clock.
    Info {
        #[arg(long)]
        node: String,
    },
    /// Resolve the node owning an identifier.
    Find {
        #[arg(long)]
        node: String,
        id: u64,
    },
    /// Print the values bound to a key.
    Get {
        #[arg(long)]
        node: String,
        key: String,
    },
    /// Bind a value to a key.
    Add {
        #[arg(long)]
        node: String,
        key: String,
        val: String,
    },
    /// Remove one binding of a key.
    Delete {
        #[arg(long)]
        node: String,
        key: String,
        val: String,
    },
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on; also the address peers use to reach us.
    #[arg(long)]
    pub listen: SocketAddr,

    /// Ring identifier. Defaults to the hash of the listen address.
    #[arg(long)]
    pub id: Option<u64>,

    /// Address of any ring member. Without it a new ring is created.
    #[arg(long)]
    pub join: Option<String>,

    /// JSON node configuration.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Identifier width, overriding the configuration file.
    #[arg(long)]
    pub bits: Option<u8>,

    /// Stabilization period in milliseconds, overriding the configuration file.
    #[arg(long)]
    pub stabilize_ms: Option<u64>,
}

/// What a command produced, printed by the caller.
#[derive(Debug)]
pub enum CommandResult {
    Served,
    Info(NodeSnapshot),
    Owner(NodeInfo),
    Values(Vec<String>),
    Done,
}

impl CommandResult {
    /// Results with nothing worth printing.
    pub fn is_silent(&self) -> bool {
        matches!(self, CommandResult::Served)
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResult::Served | CommandResult::Done => write!(f, "ok"),
            CommandResult::Owner(node) => write!(f, "{}", node),
            CommandResult::Values(vals) => {
                for val in vals {
                    writeln!(f, "{}", val)?;
                }
                Ok(())
            }
            CommandResult::Info(snapshot) => {
                writeln!(f, "node:        {}", snapshot.node)?;
                match &snapshot.predecessor {
                    Some(pred) => writeln!(f, "predecessor: {}", pred)?,
                    None => writeln!(f, "predecessor: -")?,
                }
                writeln!(f, "successor:   {}", snapshot.successor)?;
                writeln!(f, "membership:  {:?}", snapshot.membership)?;
                writeln!(f, "bits:        {}", snapshot.bits)?;
                writeln!(f, "clock:       {}", snapshot.clock)?;
                writeln!(f, "keys:        {}", snapshot.keys)?;
                write!(f, "fingers:")?;
                for (i, finger) in snapshot.fingers.iter().enumerate() {
                    write!(f, "\n  [{:>2}] {}", i, finger)?;
                }
                Ok(())
            }
        }
    }
}

impl Command {
    pub async fn execute(&self, cli: &CliConfig) -> Result<CommandResult> {
        match self {
            Command::Serve(args) => serve_node(args, cli).await,
            Command::Info { node } => {
                let snapshot = client(cli).info(&NodeAddr::from(node.as_str())).await?;
                Ok(CommandResult::Info(snapshot))
            }
            Command::Find { node, id } => {
                let owner = client(cli).find_successor(&NodeAddr::from(node.as_str()), Id(*id)).await?;
                Ok(CommandResult::Owner(owner))
            }
            Command::Get { node, key } => {
                let client = client(cli);
                let owner = owner_of(&client, cli, node, key).await?;
                Ok(CommandResult::Values(client.get(&owner, key).await?))
            }
            Command::Add { node, key, val } => {
                let client = client(cli);
                let owner = owner_of(&client, cli, node, key).await?;
                client.add(&owner, key, val).await?;
                Ok(CommandResult::Done)
            }
            Command::Delete { node, key, val } => {
                let client = client(cli);
                let owner = owner_of(&client, cli, node, key).await?;
                client.delete(&owner, key, val).await?;
                Ok(CommandResult::Done)
            }
        }
    }
}

fn client(cli: &CliConfig) -> RpcClient {
    RpcClient::new(Arc::new(TcpTransport::new()), Arc::new(LogicalClock::new()), cli.timeout())
}

/// Hashes `key` in the contacted node's ring and resolves its owner there.
async fn owner_of(client: &RpcClient, cli: &CliConfig, node: &str, key: &str) -> Result<NodeInfo> {
    let addr = NodeAddr::from(node);
    let snapshot = client.info(&addr).await?;
    let space = IdentifierSpace::with_partitioner(snapshot.bits, cli.partitioner)?;
    let owner = client.find_successor(&addr, space.hash_key(key)).await?;
    Ok(owner)
}

async fn serve_node(args: &ServeArgs, cli: &CliConfig) -> Result<CommandResult> {
    let mut config = match &args.config {
        Some(path) => load_node_config(path)?,
        None => dht::NodeConfig {
            partitioner: cli.partitioner,
            ..Default::default()
        },
    };
    if let Some(bits) = args.bits {
        config.bits = bits;
    }
    if let Some(ms) = args.stabilize_ms {
        config.stabilize_interval = Duration::from_millis(ms);
    }
    config.validate()?;

    let space = config.space()?;
    let addr = args.listen.to_string();
    let info = match args.id {
        Some(id) => NodeInfo::checked(&space, Id(id), addr)?,
        None => NodeInfo::from_addr(&space, addr),
    };

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    let node = Node::new(info, config, Arc::new(TcpTransport::new()))?;
    let cancel = CancellationToken::new();
    let server = tokio::spawn(serve(listener, Arc::clone(&node), cancel.child_token()));

    match &args.join {
        Some(bootstrap) => {
            if let Err(e) = node.join(&NodeAddr::from(bootstrap.as_str())).await {
                cancel.cancel();
                let _ = server.await;
                bail!("could not join ring through {}: {}", bootstrap, e);
            }
        }
        None => node.create(),
    }

    let stabilizer = Stabilizer::spawn_with_token(Arc::clone(&node), cancel.child_token());
    info!(node = %node.info(), "node running, press ctrl-c to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c, shutting down");
    }
    info!(node = %node.info(), "shutting down");
    cancel.cancel();
    stabilizer.shutdown().await;
    server.await.context("server task panicked")??;
    Ok(CommandResult::Served)
}
