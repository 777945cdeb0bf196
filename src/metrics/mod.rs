//! Operational counters and latency tracking.
//!
//! ## Key Components
//!
//! - [`Metrics`]: the live recorder installed when `record_stats` is set.
//!   Its disabled form silently drops every recording so call sites never
//!   branch.
//! - [`MetricsSnapshot`]: point-in-time view with derived ratios and
//!   latency summaries.
//! - [`LatencySummary`]: average plus P50/P95/P99 over a bounded reservoir
//!   of the most recent samples. Averages come from running totals, not
//!   from the reservoir, so they cover the cache's whole lifetime.
//! - [`PrometheusFormatter`](exporter::PrometheusFormatter): text
//!   exposition of a snapshot.
//!
//! Counters are atomics and recording a latency sample takes a short
//! mutex, so the recorder can be shared freely across tasks.

pub mod exporter;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

/// Most recent samples retained for percentile computation.
const RESERVOIR_CAPACITY: usize = 1000;

/// Bounded ring of recent latency samples plus lifetime running totals.
#[derive(Debug, Default)]
struct LatencyReservoir {
    samples: VecDeque<Duration>,
    total: Duration,
    count: u64,
}

impl LatencyReservoir {
    fn record(&mut self, sample: Duration) {
        if self.samples.len() == RESERVOIR_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.total += sample;
        self.count += 1;
    }

    fn summary(&self) -> LatencySummary {
        if self.count == 0 {
            return LatencySummary::default();
        }
        let mut sorted: Vec<Duration> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        LatencySummary {
            average: self.total / u32::try_from(self.count).unwrap_or(u32::MAX).max(1),
            p50: percentile(&sorted, 0.50),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
            samples: self.count,
        }
    }
}

fn percentile(sorted: &[Duration], q: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// Latency digest for one operation family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencySummary {
    /// Lifetime average, from running totals.
    pub average: Duration,
    /// Median of the current reservoir.
    pub p50: Duration,
    /// 95th percentile of the current reservoir.
    pub p95: Duration,
    /// 99th percentile of the current reservoir.
    pub p99: Duration,
    /// Lifetime sample count.
    pub samples: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    removes: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

#[derive(Debug, Default)]
struct Recorder {
    counters: Counters,
    get_latency: Mutex<LatencyReservoir>,
    put_latency: Mutex<LatencyReservoir>,
}

/// Live metrics recorder.
///
/// The disabled form silently drops all recordings, so call sites never
/// branch on whether stats are being kept.
#[derive(Debug)]
pub struct Metrics {
    recorder: Option<Recorder>,
}

impl Metrics {
    /// Creates a recording collector.
    pub fn enabled() -> Self {
        Metrics {
            recorder: Some(Recorder::default()),
        }
    }

    /// Creates a collector that drops all recordings.
    pub fn disabled() -> Self {
        Metrics { recorder: None }
    }

    /// `true` when recordings are kept.
    pub fn is_enabled(&self) -> bool {
        self.recorder.is_some()
    }

    fn bump(&self, pick: impl FnOnce(&Counters) -> &AtomicU64) {
        if let Some(recorder) = &self.recorder {
            pick(&recorder.counters).fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_hit(&self) {
        self.bump(|c| &c.hits);
    }

    pub(crate) fn record_miss(&self) {
        self.bump(|c| &c.misses);
    }

    pub(crate) fn record_put(&self) {
        self.bump(|c| &c.puts);
    }

    pub(crate) fn record_remove(&self) {
        self.bump(|c| &c.removes);
    }

    pub(crate) fn record_eviction(&self) {
        self.bump(|c| &c.evictions);
    }

    pub(crate) fn record_expiration(&self) {
        self.bump(|c| &c.expirations);
    }

    pub(crate) fn record_get_latency(&self, sample: Duration) {
        if let Some(recorder) = &self.recorder {
            recorder.get_latency.lock().record(sample);
        }
    }

    pub(crate) fn record_put_latency(&self, sample: Duration) {
        if let Some(recorder) = &self.recorder {
            recorder.put_latency.lock().record(sample);
        }
    }

    /// Point-in-time view. A disabled recorder snapshots to all zeros.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let Some(recorder) = &self.recorder else {
            return MetricsSnapshot::default();
        };
        let counters = &recorder.counters;
        let hits = counters.hits.load(Ordering::Relaxed);
        let misses = counters.misses.load(Ordering::Relaxed);
        let gets = hits + misses;
        let hit_ratio = hits as f64 / gets.max(1) as f64;
        MetricsSnapshot {
            hits,
            misses,
            puts: counters.puts.load(Ordering::Relaxed),
            removes: counters.removes.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
            expirations: counters.expirations.load(Ordering::Relaxed),
            gets,
            hit_ratio,
            miss_ratio: 1.0 - hit_ratio,
            get_latency: recorder.get_latency.lock().summary(),
            put_latency: recorder.put_latency.lock().summary(),
        }
    }
}

/// Point-in-time counters with derived ratios and latency digests.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub removes: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// `hits + misses`.
    pub gets: u64,
    /// `hits / max(gets, 1)`.
    pub hit_ratio: f64,
    /// `1 - hit_ratio`.
    pub miss_ratio: f64,
    pub get_latency: LatencySummary,
    pub put_latency: LatencySummary,
}
