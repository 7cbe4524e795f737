// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! jm-metrics: metric-data backend contract and the dispatch layer.
//!
//! Backends load raw time-series for a job; the dispatcher resolves
//! per-subcluster configuration, derives the scope list from the job
//! shape, fans out, and composes the final [`jm_core::JobData`].

mod backend;
mod cache;
mod dispatch;
pub mod stats;

#[cfg(any(test, feature = "test-support"))]
mod replay;

pub use backend::{MetricBackendRegistry, MetricDataBackend, MetricError};
pub use dispatch::{DispatchResult, MetricDispatch};

#[cfg(any(test, feature = "test-support"))]
pub use replay::ReplayBackend;
