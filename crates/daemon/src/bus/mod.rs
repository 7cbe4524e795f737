// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-protocol event-stream ingress.
//!
//! Connections deliver one event per line; events are processed in
//! order per connection and never acknowledged. Malformed or rejected
//! events are logged and dropped so a bad publisher cannot wedge the
//! stream. Validation and state-machine effects are identical to the
//! HTTP path.

mod lineproto;

use std::sync::Arc;

use jm_core::{Job, NodeStateUpdate, SystemClock};
use jm_engine::{apply_node_state, EngineError, LifecycleEngine, StopRequest, StopTarget};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use lineproto::{parse_line, BusEvent, LineError};

#[derive(Debug, Error)]
pub enum BusError {
    #[error(transparent)]
    Line(#[from] LineError),

    #[error("malformed event payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("unknown measurement: {0}")]
    UnknownMeasurement(String),

    #[error("unknown job function: {0}")]
    UnknownFunction(String),

    #[error("event field missing")]
    MissingEvent,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Shared context for all bus connections.
pub struct BusCtx {
    pub engine: Arc<LifecycleEngine>,
    pub clock: SystemClock,
}

/// Accept loop. Each connection gets its own task; a failure on one
/// connection never affects the others or the HTTP transport.
pub async fn run(listener: TcpListener, ctx: Arc<BusCtx>, shutdown: CancellationToken) {
    info!(addr = ?listener.local_addr().ok(), "bus listener ready");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "bus connection");
                    let ctx = Arc::clone(&ctx);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, ctx, shutdown).await;
                    });
                }
                Err(e) => error!(error = %e, "bus accept error"),
            },
        }
    }
    info!("bus listener stopped");
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    ctx: Arc<BusCtx>,
    shutdown: CancellationToken,
) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                // One event at a time per connection; errors are logged
                // and the event dropped, per the ingest contract.
                if let Err(e) = handle_line(&ctx, &line).await {
                    warn!(error = %e, line = %line, "bus event dropped");
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "bus connection closed");
                break;
            }
        }
    }
}

/// Decode one line and apply it to the engine.
pub async fn handle_line(ctx: &BusCtx, line: &str) -> Result<(), BusError> {
    let event = parse_line(line)?;
    match event.measurement.as_str() {
        "job" => {
            let payload = event.field("event").ok_or(BusError::MissingEvent)?;
            match event.tag("function") {
                Some("start_job") => {
                    let job: Job = serde_json::from_str(payload)?;
                    let id = ctx.engine.start_job(job)?;
                    debug!(id, "bus start_job applied");
                    Ok(())
                }
                Some("stop_job") => {
                    let req: StopRequest = serde_json::from_str(payload)?;
                    let (Some(job_id), Some(cluster)) = (req.job_id, req.cluster.clone()) else {
                        return Err(BusError::MissingEvent);
                    };
                    let target =
                        StopTarget::ByIdentity { job_id, cluster, start_time: req.start_time };
                    // Bus ingress never blocks on the archiver queue.
                    let job = ctx.engine.stop_job(target, req.stop_time, req.state, false).await?;
                    debug!(id = job.id, "bus stop_job applied");
                    Ok(())
                }
                Some(other) => Err(BusError::UnknownFunction(other.to_string())),
                None => Err(BusError::UnknownFunction("<missing>".to_string())),
            }
        }
        "nodestate" => {
            let payload = event.field("event").ok_or(BusError::MissingEvent)?;
            let update: NodeStateUpdate = serde_json::from_str(payload)?;
            apply_node_state(ctx.engine.repo(), &ctx.clock, &update)?;
            Ok(())
        }
        other => Err(BusError::UnknownMeasurement(other.to_string())),
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
