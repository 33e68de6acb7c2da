//! Controller metrics
//!
//! Counters are bumped from the apply context and read from anywhere.
//! Exposed in Prometheus text format; the demo binary can serve them on
//! http://localhost:<METRICS_PORT>/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

const TICK_HISTORY: usize = 1000;

/// Metrics registry for the speed controller
#[derive(Debug)]
pub struct Metrics {
    // Tick driver
    pub tick_count: AtomicU64,
    pub full_evaluations: AtomicU64,
    pub slope_only_ticks: AtomicU64,
    pub event_evaluations: AtomicU64,

    // Attribute traffic
    pub attribute_writes: AtomicU64,
    pub granular_suppressed: AtomicU64,
    pub forced_refreshes: AtomicU64,
    pub non_finite_dropped: AtomicU64,

    // Population
    pub tracked_npcs: AtomicU64,
    pub evictions: AtomicU64,
    pub skipped_unavailable: AtomicU64,

    // Persistence
    pub restores: AtomicU64,
    pub records_skipped: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,

    start_time: Instant,

    // Rolling tick times for percentile calculation
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            tick_count: AtomicU64::new(0),
            full_evaluations: AtomicU64::new(0),
            slope_only_ticks: AtomicU64::new(0),
            event_evaluations: AtomicU64::new(0),
            attribute_writes: AtomicU64::new(0),
            granular_suppressed: AtomicU64::new(0),
            forced_refreshes: AtomicU64::new(0),
            non_finite_dropped: AtomicU64::new(0),
            tracked_npcs: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            skipped_unavailable: AtomicU64::new(0),
            restores: AtomicU64::new(0),
            records_skipped: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY)),
        }
    }

    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();
            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            self.tick_time_p95_us
                .store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us
                .store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("speed_controller_ticks_total", "Heartbeat ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));
        metric!("speed_controller_full_evaluations_total", "Full per-entity evaluations", "counter",
            self.full_evaluations.load(Ordering::Relaxed));
        metric!("speed_controller_slope_only_ticks_total", "Throttled ticks that serviced slope only", "counter",
            self.slope_only_ticks.load(Ordering::Relaxed));
        metric!("speed_controller_event_evaluations_total", "Evaluations triggered by host events", "counter",
            self.event_evaluations.load(Ordering::Relaxed));

        metric!("speed_controller_attribute_writes_total", "Writes to host attributes", "counter",
            self.attribute_writes.load(Ordering::Relaxed));
        metric!("speed_controller_granular_suppressed_total", "Sub-granularity commits buffered", "counter",
            self.granular_suppressed.load(Ordering::Relaxed));
        metric!("speed_controller_forced_refreshes_total", "Forced dependent-system refreshes", "counter",
            self.forced_refreshes.load(Ordering::Relaxed));
        metric!("speed_controller_non_finite_dropped_total", "Non-finite deltas discarded", "counter",
            self.non_finite_dropped.load(Ordering::Relaxed));

        metric!("speed_controller_tracked_npcs", "NPCs with live state", "gauge",
            self.tracked_npcs.load(Ordering::Relaxed));
        metric!("speed_controller_evictions_total", "Entity states purged", "counter",
            self.evictions.load(Ordering::Relaxed));
        metric!("speed_controller_skipped_unavailable_total", "Entity ticks skipped (no attribute owner)", "counter",
            self.skipped_unavailable.load(Ordering::Relaxed));

        metric!("speed_controller_restores_total", "Post-load restores", "counter",
            self.restores.load(Ordering::Relaxed));
        metric!("speed_controller_records_skipped_total", "Persisted records ignored", "counter",
            self.records_skipped.load(Ordering::Relaxed));

        metric!("speed_controller_tick_time_microseconds", "Last tick time", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("speed_controller_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("speed_controller_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("speed_controller_uptime_seconds", "Controller uptime", "counter",
            self.uptime_seconds());

        output
    }

    /// JSON summary (alternative for direct inspection)
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "ticks": self.tick_count.load(Ordering::Relaxed),
            "evaluations": {
                "full": self.full_evaluations.load(Ordering::Relaxed),
                "slope_only": self.slope_only_ticks.load(Ordering::Relaxed),
                "event": self.event_evaluations.load(Ordering::Relaxed),
            },
            "attributes": {
                "writes": self.attribute_writes.load(Ordering::Relaxed),
                "granular_suppressed": self.granular_suppressed.load(Ordering::Relaxed),
                "forced_refreshes": self.forced_refreshes.load(Ordering::Relaxed),
            },
            "population": {
                "tracked_npcs": self.tracked_npcs.load(Ordering::Relaxed),
                "evictions": self.evictions.load(Ordering::Relaxed),
                "skipped_unavailable": self.skipped_unavailable.load(Ordering::Relaxed),
            },
            "tick_time_p95_us": self.tick_time_p95_us.load(Ordering::Relaxed),
            "uptime_seconds": self.uptime_seconds(),
        })
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serve `/metrics` (Prometheus) and `/metrics/json` over plain HTTP
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);

                    let response = if request.starts_with("GET /metrics/json") {
                        let body = metrics.to_json().to_string();
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else if request.starts_with("GET /metrics") {
                        let body = metrics.to_prometheus();
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}
