//! Prometheus text exposition of a [`MetricsSnapshot`].

use std::fmt::Write;

use super::MetricsSnapshot;

/// Renders snapshots in the Prometheus text format with a configurable
/// metric-name prefix.
///
/// # Example
///
/// ```
/// use stashkit::metrics::Metrics;
/// use stashkit::metrics::exporter::PrometheusFormatter;
///
/// let metrics = Metrics::enabled();
/// metrics.snapshot();
/// let text = PrometheusFormatter::new("stash").format(&metrics.snapshot());
/// assert!(text.contains("stash_hits"));
/// ```
#[derive(Debug, Clone)]
pub struct PrometheusFormatter {
    prefix: String,
}

impl PrometheusFormatter {
    /// Creates a formatter whose metric names start with `prefix` followed
    /// by an underscore. An empty prefix yields bare names.
    pub fn new(prefix: impl Into<String>) -> Self {
        PrometheusFormatter {
            prefix: prefix.into(),
        }
    }

    fn metric_name(&self, suffix: &str) -> String {
        if self.prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}_{}", self.prefix, suffix)
        }
    }

    fn write_counter(&self, out: &mut String, suffix: &str, value: u64) {
        let name = self.metric_name(suffix);
        let _ = writeln!(out, "# TYPE {name} counter");
        let _ = writeln!(out, "{name} {value}");
    }

    fn write_gauge(&self, out: &mut String, suffix: &str, value: f64) {
        let name = self.metric_name(suffix);
        let _ = writeln!(out, "# TYPE {name} gauge");
        let _ = writeln!(out, "{name} {value}");
    }

    /// Renders the snapshot to exposition text.
    pub fn format(&self, snapshot: &MetricsSnapshot) -> String {
        let mut out = String::new();
        self.write_counter(&mut out, "hits", snapshot.hits);
        self.write_counter(&mut out, "misses", snapshot.misses);
        self.write_counter(&mut out, "evictions", snapshot.evictions);
        self.write_gauge(&mut out, "hit_ratio", snapshot.hit_ratio);

        let name = self.metric_name("get_latency_seconds");
        let latency = &snapshot.get_latency;
        let _ = writeln!(out, "# TYPE {name} summary");
        let _ = writeln!(
            out,
            "{name}{{quantile=\"0.5\"}} {}",
            latency.p50.as_secs_f64()
        );
        let _ = writeln!(
            out,
            "{name}{{quantile=\"0.95\"}} {}",
            latency.p95.as_secs_f64()
        );
        let _ = writeln!(
            out,
            "{name}{{quantile=\"0.99\"}} {}",
            latency.p99.as_secs_f64()
        );
        let _ = writeln!(
            out,
            "{name}_sum {}",
            (latency.average * u32::try_from(latency.samples).unwrap_or(u32::MAX)).as_secs_f64()
        );
        let _ = writeln!(out, "{name}_count {}", latency.samples);
        out
    }
}
