// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracing setup: env-filtered stderr output, optionally teed to a file.

use std::path::Path;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Guard that must stay alive for the file appender to flush.
pub struct LogGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Initialize the global subscriber. `JM_LOG` (falling back to
/// `RUST_LOG`, default `info`) controls the filter.
pub fn init(log_file: Option<&Path>) -> LogGuard {
    let filter = EnvFilter::try_from_env("JM_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    match log_file {
        Some(path) => {
            let appender = tracing_appender::rolling::never(
                path.parent().unwrap_or_else(|| Path::new(".")),
                path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("jmd.log")),
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
            LogGuard { _file_guard: Some(guard) }
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr_layer).init();
            LogGuard { _file_guard: None }
        }
    }
}
