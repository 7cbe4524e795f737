// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Statistics derived from raw series: per-series min/avg/max, time-aligned
//! roll-ups, footprints, and job energy.

use indexmap::IndexMap;
use jm_core::{
    ClusterRegistry, EnergyKind, Float, JobData, JobMetric, JobStatistics, MetricScope,
    MetricStatistics, Series, StatsSeries,
};

/// NaN-safe min/avg/max over one sample vector. All-NaN input yields zeros.
pub fn series_statistics(data: &[Float]) -> MetricStatistics {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut n = 0usize;
    for sample in data {
        if sample.is_nan() {
            continue;
        }
        min = min.min(sample.0);
        max = max.max(sample.0);
        sum += sample.0;
        n += 1;
    }
    if n == 0 {
        return MetricStatistics::default();
    }
    MetricStatistics { min, avg: sum / n as f64, max }
}

/// Fill in each series' statistics from its samples.
pub fn fill_series_statistics(metric: &mut JobMetric) {
    for series in &mut metric.series {
        series.statistics = series_statistics(&series.data);
    }
}

/// Roll one metric up across all of its series.
///
/// Samples are uniformly spaced, so the per-series arithmetic mean is the
/// time-weighted average; series are weighted equally in the roll-up.
pub fn rollup(metric: &JobMetric) -> MetricStatistics {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut n = 0usize;
    for series in &metric.series {
        if series.data.iter().all(|f| f.is_nan()) {
            continue;
        }
        let s = series_statistics(&series.data);
        min = min.min(s.min);
        max = max.max(s.max);
        sum += s.avg;
        n += 1;
    }
    if n == 0 {
        return MetricStatistics::default();
    }
    MetricStatistics { min, avg: sum / n as f64, max }
}

/// Time-aligned min/median/max across all series of a metric.
///
/// Positions where every series is missing yield NaN in all three vectors.
pub fn statistics_series(series: &[Series]) -> StatsSeries {
    let len = series.iter().map(|s| s.data.len()).max().unwrap_or(0);
    let mut min = Vec::with_capacity(len);
    let mut median = Vec::with_capacity(len);
    let mut max = Vec::with_capacity(len);

    let mut column: Vec<f64> = Vec::with_capacity(series.len());
    for i in 0..len {
        column.clear();
        for s in series {
            if let Some(v) = s.data.get(i) {
                if !v.is_nan() {
                    column.push(v.0);
                }
            }
        }
        if column.is_empty() {
            min.push(Float::NAN);
            median.push(Float::NAN);
            max.push(Float::NAN);
            continue;
        }
        column.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        min.push(Float(column[0]));
        max.push(Float(column[column.len() - 1]));
        let mid = column.len() / 2;
        let med = if column.len() % 2 == 1 {
            column[mid]
        } else {
            (column[mid - 1] + column[mid]) / 2.0
        };
        median.push(Float(med));
    }

    StatsSeries { min, median, max }
}

/// Attach a statistics series to metrics with at least two series.
pub fn attach_statistics_series(metric: &mut JobMetric) {
    if metric.series.len() >= 2 {
        metric.statistics_series = Some(statistics_series(&metric.series));
    }
}

/// Everything the archiver derives from a job's materialized metric data.
#[derive(Debug, Default)]
pub struct JobSummary {
    /// Per-metric min/avg/max for the archived snapshot.
    pub statistics: IndexMap<String, JobStatistics>,
    /// Filter columns selected by the footprint role in the cluster config.
    pub footprint: IndexMap<String, f64>,
    /// Total consumed energy in kWh.
    pub energy: f64,
    /// Per-metric energy in kWh.
    pub energy_footprint: IndexMap<String, f64>,
}

/// Compute summary statistics, footprint, and energy for a job's data.
///
/// The roll-up per metric uses its coarsest materialized scope. Energy for
/// `power`-kind metrics assumes the series is in Watt regardless of the
/// declared unit (known config ambiguity); `energy`-kind series are treated
/// as accumulated Joules.
pub fn summarize_job(
    registry: &ClusterRegistry,
    cluster: &str,
    sub_cluster: &str,
    duration: i64,
    data: &JobData,
) -> JobSummary {
    let mut summary = JobSummary::default();

    for (name, per_scope) in data {
        let Some(metric) = coarsest(per_scope) else { continue };
        let Some(config) = registry.metric(cluster, sub_cluster, name) else { continue };
        let stats = rollup(metric);
        summary.statistics.insert(
            name.clone(),
            JobStatistics { unit: config.unit.clone(), min: stats.min, avg: stats.avg, max: stats.max },
        );

        if let Some(kind) = config.footprint {
            let value = match kind {
                jm_core::FootprintKind::Avg => stats.avg,
                jm_core::FootprintKind::Max => stats.max,
                jm_core::FootprintKind::Min => stats.min,
            };
            summary.footprint.insert(format!("{name}_{kind}"), value);
        }

        if let Some(kind) = config.energy {
            let kwh = match kind {
                EnergyKind::Power => {
                    // Sum the per-series averages: each series is one
                    // device drawing power in parallel.
                    let total_watts: f64 =
                        metric.series.iter().map(|s| series_statistics(&s.data).avg).sum();
                    total_watts * duration as f64 / 3_600_000.0
                }
                EnergyKind::Energy => {
                    let total_joules: f64 = metric
                        .series
                        .iter()
                        .map(|s| s.data.iter().rev().find(|v| !v.is_nan()).map(|v| v.0).unwrap_or(0.0))
                        .sum();
                    total_joules / 3_600_000.0
                }
            };
            let kwh = (kwh * 100.0).round() / 100.0;
            summary.energy_footprint.insert(name.clone(), kwh);
            summary.energy += kwh;
        }
    }

    summary.energy = (summary.energy * 100.0).round() / 100.0;
    summary
}

fn coarsest(per_scope: &IndexMap<MetricScope, JobMetric>) -> Option<&JobMetric> {
    per_scope.iter().max_by_key(|(scope, _)| **scope).map(|(_, m)| m)
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
