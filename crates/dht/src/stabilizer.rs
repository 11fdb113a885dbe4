//! Background ring maintenance task.
//!
//! Runs [`Node::run_cycle`] on a fixed interval until cancelled. It shares
//! the node's locks with the inbound request handlers and never holds them
//! across a remote call.

use crate::node::Node;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Handle to a running stabilization task.
pub struct Stabilizer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Stabilizer {
    /// Spawns the task for `node` using its configured interval.
    pub fn spawn(node: Arc<Node>) -> Self {
        Self::spawn_with_token(node, CancellationToken::new())
    }

    /// Spawns the task, stopping when `cancel` (or a parent token) fires.
    pub fn spawn_with_token(node: Arc<Node>, cancel: CancellationToken) -> Self {
        let period = node.config().stabilize_interval;
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            run_stabilize_loop(node, period, task_cancel).await;
        });
        Self { cancel, handle }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops the task and waits for the current cycle to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

async fn run_stabilize_loop(node: Arc<Node>, period: Duration, cancel: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        node = %node.info(),
        interval_ms = period.as_millis() as u64,
        "stabilization task started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(node = %node.info(), "stabilization task shutting down");
                break;
            }
            _ = ticker.tick() => {
                node.run_cycle().await;
            }
        }
    }
}
