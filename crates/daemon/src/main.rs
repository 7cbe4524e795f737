// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `jmd`: the jobmon ingress daemon.

use std::sync::Arc;

use jm_core::SystemClock;
use jm_daemon::http::{self, ApiState};
use jm_daemon::{bus, logging, shutdown, startup, DaemonConfig};
use jm_metrics::MetricBackendRegistry;
use tokio::net::TcpListener;
use tracing::{error, info};

fn main() {
    let config = match DaemonConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("jmd: {e}");
            std::process::exit(2);
        }
    };
    let _log_guard = logging::init(config.log_file.as_deref());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("jmd: failed to start runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(code) = runtime.block_on(run(config)) {
        std::process::exit(code);
    }
}

async fn run(config: DaemonConfig) -> Result<(), i32> {
    // Concrete metric backends are deployment-specific; they register
    // here. Without one, metric loads fail and archiving retries until
    // a backend appears on restart.
    let backends = MetricBackendRegistry::new();

    let daemon = match startup(config, backends).await {
        Ok(daemon) => daemon,
        Err(e) => {
            error!(error = %e, "startup failed");
            return Err(1);
        }
    };

    let state = ApiState {
        engine: Arc::clone(&daemon.engine),
        dispatch: Arc::clone(&daemon.dispatch),
        archive: daemon.archive.clone(),
        clock: SystemClock,
        request_timeout: daemon.config.request_timeout,
    };
    let app = http::router(state);

    let http_listener = match TcpListener::bind(daemon.config.http_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %daemon.config.http_addr, error = %e, "cannot bind http listener");
            return Err(1);
        }
    };
    info!(addr = %daemon.config.http_addr, "http listener ready");
    let http_token = daemon.shutdown_token.clone();
    let http_task = tokio::spawn(async move {
        let graceful = async move { http_token.cancelled().await };
        if let Err(e) = axum::serve(http_listener, app).with_graceful_shutdown(graceful).await {
            error!(error = %e, "http server error");
        }
    });

    let bus_task = match daemon.config.bus_addr {
        Some(addr) => {
            let listener = match TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!(%addr, error = %e, "cannot bind bus listener");
                    return Err(1);
                }
            };
            let ctx = Arc::new(bus::BusCtx {
                engine: Arc::clone(&daemon.engine),
                clock: SystemClock,
            });
            Some(tokio::spawn(bus::run(listener, ctx, daemon.shutdown_token.clone())))
        }
        None => None,
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "signal handler failed");
    }
    info!("interrupt received");

    shutdown(daemon).await;
    let _ = http_task.await;
    if let Some(task) = bus_task {
        let _ = task.await;
    }
    Ok(())
}
