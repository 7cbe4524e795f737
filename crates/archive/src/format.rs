// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Archive format constants and shared (de)serialization helpers.

use jm_core::{JobData, MetricScope};
use std::io::Write;

use crate::ArchiveError;

/// Format revision stated in `version.txt` at the archive root.
pub const ARCHIVE_VERSION: u32 = 3;

pub(crate) const META_FILE: &str = "meta.json";
pub(crate) const DATA_FILE: &str = "data.json";
pub(crate) const DATA_FILE_ZST: &str = "data.json.zst";

/// zstd level for payload compression; level 3 trades well for JSON.
const ZSTD_LEVEL: i32 = 3;

/// Relative record directory: `<cluster>/<jobId/1000>/<jobId%1000>/<startTime>`.
///
/// The two-level numeric bucketing bounds directory fan-out; the second
/// bucket is zero-padded to three digits.
pub(crate) fn record_path(job: &crate::JobRef) -> String {
    format!(
        "{}/{}/{:03}/{}",
        job.cluster,
        job.job_id / 1000,
        job.job_id % 1000,
        job.start_time
    )
}

pub(crate) fn parse_version(raw: &str) -> Result<u32, ArchiveError> {
    let found = raw
        .trim()
        .parse::<u32>()
        .map_err(|_| ArchiveError::Version { found: 0, expected: ARCHIVE_VERSION })?;
    if found != ARCHIVE_VERSION {
        return Err(ArchiveError::Version { found, expected: ARCHIVE_VERSION });
    }
    Ok(found)
}

pub(crate) fn compress(raw: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), ZSTD_LEVEL)?;
    encoder.write_all(raw)?;
    Ok(encoder.finish()?)
}

pub(crate) fn decompress(raw: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    Ok(zstd::decode_all(raw)?)
}

/// Drop metrics and scopes the caller did not ask for.
pub(crate) fn filter_data(
    mut data: JobData,
    metrics: Option<&[String]>,
    scopes: Option<&[MetricScope]>,
) -> JobData {
    if let Some(metrics) = metrics {
        data.retain(|name, _| metrics.iter().any(|m| m == name));
    }
    if let Some(scopes) = scopes {
        for per_scope in data.values_mut() {
            per_scope.retain(|scope, _| scopes.contains(scope));
        }
        data.retain(|_, per_scope| !per_scope.is_empty());
    }
    data
}

#[cfg(test)]
#[path = "format_tests.rs"]
mod tests;
