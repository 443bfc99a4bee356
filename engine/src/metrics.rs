//! Prometheus-backed counters for cache and query activity.
//!
//! Grounded on the teacher's `server::metrics::Metrics`/`GLOBAL_METRICS`: a
//! `Registry` plus a handful of named collectors behind a
//! `once_cell::sync::Lazy` singleton, generalized from the teacher's
//! dynamically-registered `CounterVec` map to a fixed, known-at-compile-time
//! set of counters/histograms the engine actually emits.

use once_cell::sync::Lazy;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    reg: Registry,
    pub queries_total: IntCounterVec,
    pub plan_cache_hits: IntCounter,
    pub plan_cache_misses: IntCounter,
    pub plan_cache_evictions: IntCounter,
    pub result_cache_hits: IntCounter,
    pub result_cache_misses: IntCounter,
    pub result_cache_evictions: IntCounter,
    pub query_duration_seconds: Histogram,
}

impl Metrics {
    fn new() -> Metrics {
        let reg = Registry::new();

        let queries_total = IntCounterVec::new(
            Opts::new("dsql_queries_total", "Queries executed, by outcome"),
            &["outcome"],
        )
        .expect("static metric descriptor is well-formed");
        reg.register(Box::new(queries_total.clone())).expect("single registration");

        let plan_cache_hits = IntCounter::new("dsql_plan_cache_hits_total", "Plan cache hits")
            .expect("static metric descriptor is well-formed");
        reg.register(Box::new(plan_cache_hits.clone())).expect("single registration");

        let plan_cache_misses = IntCounter::new("dsql_plan_cache_misses_total", "Plan cache misses")
            .expect("static metric descriptor is well-formed");
        reg.register(Box::new(plan_cache_misses.clone())).expect("single registration");

        let plan_cache_evictions =
            IntCounter::new("dsql_plan_cache_evictions_total", "Plan cache evictions")
                .expect("static metric descriptor is well-formed");
        reg.register(Box::new(plan_cache_evictions.clone())).expect("single registration");

        let result_cache_hits = IntCounter::new("dsql_result_cache_hits_total", "Result cache hits")
            .expect("static metric descriptor is well-formed");
        reg.register(Box::new(result_cache_hits.clone())).expect("single registration");

        let result_cache_misses =
            IntCounter::new("dsql_result_cache_misses_total", "Result cache misses")
                .expect("static metric descriptor is well-formed");
        reg.register(Box::new(result_cache_misses.clone())).expect("single registration");

        let result_cache_evictions =
            IntCounter::new("dsql_result_cache_evictions_total", "Result cache evictions")
                .expect("static metric descriptor is well-formed");
        reg.register(Box::new(result_cache_evictions.clone())).expect("single registration");

        let query_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "dsql_query_duration_seconds",
            "End-to-end query() latency",
        ))
        .expect("static metric descriptor is well-formed");
        reg.register(Box::new(query_duration_seconds.clone())).expect("single registration");

        Self {
            reg,
            queries_total,
            plan_cache_hits,
            plan_cache_misses,
            plan_cache_evictions,
            result_cache_hits,
            result_cache_misses,
            result_cache_evictions,
            query_duration_seconds,
        }
    }

    /// Renders every registered collector in Prometheus text exposition
    /// format, for a `/metrics` endpoint a host application may expose.
    pub fn gather(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let families = self.reg.gather();
        encoder.encode(&families, &mut buffer).expect("encoding registered collectors cannot fail");
        String::from_utf8(buffer).expect("prometheus text encoder emits valid utf-8")
    }

    pub fn record_query_outcome(&self, outcome: &str) {
        self.queries_total.with_label_values(&[outcome]).inc();
    }

    pub fn observe_query_duration(&self, seconds: f64) {
        self.query_duration_seconds.observe(seconds);
    }

    pub fn record_plan_cache_evictions(&self, count: usize) {
        if count > 0 {
            self.plan_cache_evictions.inc_by(count as u64);
        }
    }

    pub fn record_result_cache_evictions(&self, count: usize) {
        if count > 0 {
            self.result_cache_evictions.inc_by(count as u64);
        }
    }
}

pub static GLOBAL_METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_includes_registered_metric_names() {
        let metrics = Metrics::new();
        metrics.record_query_outcome("success");
        metrics.plan_cache_hits.inc();
        let text = metrics.gather();
        assert!(text.contains("dsql_queries_total"));
        assert!(text.contains("dsql_plan_cache_hits_total"));
    }

    #[test]
    fn eviction_and_duration_helpers_move_their_collectors() {
        let metrics = Metrics::new();
        metrics.record_plan_cache_evictions(2);
        metrics.record_result_cache_evictions(1);
        metrics.observe_query_duration(0.05);
        assert_eq!(metrics.plan_cache_evictions.get(), 2);
        assert_eq!(metrics.result_cache_evictions.get(), 1);
        assert_eq!(metrics.query_duration_seconds.get_sample_count(), 1);
    }
}
