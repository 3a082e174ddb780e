use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use axum::{extract::State as AxumState, routing::get, Router};
use scc::hash_map::Entry;
use scc::HashMap as ConcurrentHashMap;
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::info;

const NAMESPACE: &str = "gridbot";

/// Latency buckets in milliseconds, shared by every phase histogram.
pub const LATENCY_BUCKETS_MS: [f64; 13] = [
    10.0, 25.0, 50.0, 100.0, 200.0, 300.0, 400.0, 500.0, 750.0, 1000.0, 2000.0, 5000.0, 10000.0,
];

/// Trader tick phases, in execution order. `Tick` covers the whole run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Reconcile,
    Advance,
    AddMissing,
    MarkPublish,
    Publish,
    Tick,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::Reconcile => "reconcile",
            Phase::Advance => "advance",
            Phase::AddMissing => "add_missing",
            Phase::MarkPublish => "mark_publish",
            Phase::Publish => "publish",
            Phase::Tick => "tick",
        }
    }
}

const PHASES: [Phase; 6] = [
    Phase::Reconcile,
    Phase::Advance,
    Phase::AddMissing,
    Phase::MarkPublish,
    Phase::Publish,
    Phase::Tick,
];

/// Fixed-bucket histogram; everything atomic so observers never lock.
#[derive(Default)]
pub struct Histogram {
    buckets: [AtomicU64; LATENCY_BUCKETS_MS.len()],
    count: AtomicU64,
    sum_ms_bits: AtomicU64,
}

impl Histogram {
    pub fn observe(&self, ms: f64) {
        for (idx, bound) in LATENCY_BUCKETS_MS.iter().enumerate() {
            if ms <= *bound {
                self.buckets[idx].fetch_add(1, Ordering::Relaxed);
            }
        }
        self.count.fetch_add(1, Ordering::Relaxed);
        let mut current = self.sum_ms_bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + ms).to_bits();
            match self.sum_ms_bits.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    fn cumulative_bucket(&self, idx: usize) -> u64 {
        self.buckets[idx].load(Ordering::Relaxed)
    }

    fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn sum_ms(&self) -> f64 {
        f64::from_bits(self.sum_ms_bits.load(Ordering::Relaxed))
    }
}

/// Per-app counters and phase latency histograms.
#[derive(Default)]
pub struct AppMetrics {
    ticks_total: AtomicU64,
    tick_errors_total: AtomicU64,
    reconcile: Histogram,
    advance: Histogram,
    add_missing: Histogram,
    mark_publish: Histogram,
    publish: Histogram,
    tick: Histogram,
}

impl AppMetrics {
    pub fn record_tick(&self, ok: bool) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.tick_errors_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn observe_phase(&self, phase: Phase, ms: f64) {
        self.histogram(phase).observe(ms);
    }

    fn histogram(&self, phase: Phase) -> &Histogram {
        match phase {
            Phase::Reconcile => &self.reconcile,
            Phase::Advance => &self.advance,
            Phase::AddMissing => &self.add_missing,
            Phase::MarkPublish => &self.mark_publish,
            Phase::Publish => &self.publish,
            Phase::Tick => &self.tick,
        }
    }

    pub fn ticks_total(&self) -> u64 {
        self.ticks_total.load(Ordering::Relaxed)
    }

    pub fn tick_errors_total(&self) -> u64 {
        self.tick_errors_total.load(Ordering::Relaxed)
    }
}

/// Process-wide registry, one [`AppMetrics`] per trading app.
pub struct Metrics {
    hostname: String,
    apps: ConcurrentHashMap<i32, Arc<AppMetrics>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
        Metrics {
            hostname,
            apps: ConcurrentHashMap::new(),
        }
    }

    pub fn app(&self, app_id: i32) -> Arc<AppMetrics> {
        if let Some(existing) = self.apps.read(&app_id, |_, v| Arc::clone(v)) {
            return existing;
        }
        match self.apps.entry(app_id) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let fresh = Arc::new(AppMetrics::default());
                entry.insert_entry(Arc::clone(&fresh));
                fresh
            }
        }
    }

    /// Prometheus text exposition of every registered app.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("# HELP gridbot_trader_ticks_total Trader ticks executed\n");
        out.push_str("# TYPE gridbot_trader_ticks_total counter\n");
        self.apps.scan(|app_id, metrics| {
            let _ = writeln!(
                out,
                "{NAMESPACE}_trader_ticks_total{{appid=\"{app_id}\",hostname=\"{}\"}} {}",
                self.hostname,
                metrics.ticks_total()
            );
        });

        out.push_str("# HELP gridbot_trader_tick_errors_total Trader ticks that ended degraded\n");
        out.push_str("# TYPE gridbot_trader_tick_errors_total counter\n");
        self.apps.scan(|app_id, metrics| {
            let _ = writeln!(
                out,
                "{NAMESPACE}_trader_tick_errors_total{{appid=\"{app_id}\",hostname=\"{}\"}} {}",
                self.hostname,
                metrics.tick_errors_total()
            );
        });

        out.push_str("# HELP gridbot_trader_phase_latency_ms Per-phase trader latency\n");
        out.push_str("# TYPE gridbot_trader_phase_latency_ms histogram\n");
        self.apps.scan(|app_id, metrics| {
            for phase in PHASES {
                let histogram = metrics.histogram(phase);
                let labels = format!(
                    "appid=\"{app_id}\",phase=\"{}\",hostname=\"{}\"",
                    phase.as_str(),
                    self.hostname
                );
                for (idx, bound) in LATENCY_BUCKETS_MS.iter().enumerate() {
                    let _ = writeln!(
                        out,
                        "{NAMESPACE}_trader_phase_latency_ms_bucket{{{labels},le=\"{bound}\"}} {}",
                        histogram.cumulative_bucket(idx)
                    );
                }
                let _ = writeln!(
                    out,
                    "{NAMESPACE}_trader_phase_latency_ms_bucket{{{labels},le=\"+Inf\"}} {}",
                    histogram.count()
                );
                let _ = writeln!(
                    out,
                    "{NAMESPACE}_trader_phase_latency_ms_sum{{{labels}}} {}",
                    histogram.sum_ms()
                );
                let _ = writeln!(
                    out,
                    "{NAMESPACE}_trader_phase_latency_ms_count{{{labels}}} {}",
                    histogram.count()
                );
            }
        });

        out
    }
}

#[derive(Clone)]
struct MetricsState {
    metrics: Arc<Metrics>,
}

/// Serve `/metrics` on the given port until the process exits.
pub fn spawn(metrics: Arc<Metrics>, port: u16) -> JoinHandle<Result<()>> {
    let state = MetricsState { metrics };
    tokio::spawn(async move {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(state);
        info!("metrics server listening on 0.0.0.0:{port}");
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        axum::serve(listener, app.into_make_service()).await?;
        Ok(())
    })
}

async fn metrics_handler(AxumState(state): AxumState<MetricsState>) -> String {
    state.metrics.render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_buckets_are_cumulative() {
        let histogram = Histogram::default();
        histogram.observe(5.0);
        histogram.observe(60.0);
        histogram.observe(20_000.0);

        assert_eq!(histogram.cumulative_bucket(0), 1); // le=10
        assert_eq!(histogram.cumulative_bucket(3), 2); // le=100
        assert_eq!(histogram.count(), 3);
        assert!((histogram.sum_ms() - 20_065.0).abs() < 1e-9);
    }

    #[test]
    fn render_includes_labels_and_series() {
        let metrics = Metrics::new();
        let app = metrics.app(7);
        app.record_tick(true);
        app.record_tick(false);
        app.observe_phase(Phase::Reconcile, 42.0);

        let text = metrics.render();
        assert!(text.contains("gridbot_trader_ticks_total{appid=\"7\""));
        assert!(text.contains("} 2"));
        assert!(text.contains("gridbot_trader_tick_errors_total{appid=\"7\""));
        assert!(text.contains("phase=\"reconcile\""));
        assert!(text.contains("le=\"+Inf\"} 1"));
    }

    #[test]
    fn app_handles_are_shared() {
        let metrics = Metrics::new();
        metrics.app(1).record_tick(true);
        metrics.app(1).record_tick(true);
        assert_eq!(metrics.app(1).ticks_total(), 2);
    }
}
