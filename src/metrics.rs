//! Prometheus-compatible metrics endpoint
//!
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::events::EventBus;
use crate::game::state::MatchPhase;

const TICK_HISTORY: usize = 1000;

/// Metrics registry for the race server
#[derive(Debug)]
pub struct Metrics {
    pub players_connected: AtomicU64,
    pub connections_total: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    // Race state
    pub phase: AtomicU64,
    pub round: AtomicU64,

    // Event bus
    pub events_published: AtomicU64,
    pub events_delivered: AtomicU64,
    pub events_dropped: AtomicU64,

    // Transport
    pub messages_received: AtomicU64,
    pub messages_sent: AtomicU64,
    pub rejected_messages: AtomicU64,

    start_time: Instant,
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            players_connected: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            phase: AtomicU64::new(MatchPhase::Starting.code()),
            round: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            events_delivered: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            rejected_messages: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY)),
        }
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
            let p95_idx = (sorted.len() as f64 * 0.95) as usize;
            self.tick_time_p95_us
                .store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us
                .store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Copy the session gauges
    pub fn record_session(&self, phase: MatchPhase, round: u64, players: usize) {
        self.phase.store(phase.code(), Ordering::Relaxed);
        self.round.store(round, Ordering::Relaxed);
        self.players_connected.store(players as u64, Ordering::Relaxed);
    }

    /// Copy the bus counters
    pub fn record_bus(&self, bus: &EventBus) {
        self.events_published
            .store(bus.published_count(), Ordering::Relaxed);
        self.events_delivered
            .store(bus.delivered_count(), Ordering::Relaxed);
        self.events_dropped.store(bus.dropped_count(), Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn phase_name(&self) -> &'static str {
        match self.phase.load(Ordering::Relaxed) {
            0 => "starting",
            1 => "countdown",
            2 => "race",
            3 => "closing",
            _ => "finished",
        }
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

        metric!("slipstream_players_connected", "Connected players", "gauge",
            self.players_connected.load(Ordering::Relaxed));
        metric!("slipstream_connections_total", "Connections accepted", "counter",
            self.connections_total.load(Ordering::Relaxed));

        metric!("slipstream_tick_time_microseconds", "Last tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("slipstream_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("slipstream_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("slipstream_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));

        metric!("slipstream_phase", "Race phase (0=starting, 4=finished)", "gauge",
            self.phase.load(Ordering::Relaxed));
        output.push_str(&format!(
            "# HELP slipstream_phase_state Human-readable race phase\n# TYPE slipstream_phase_state gauge\nslipstream_phase_state{{phase=\"{}\"}} 1\n",
            self.phase_name()
        ));
        metric!("slipstream_round", "Current round number", "counter",
            self.round.load(Ordering::Relaxed));

        metric!("slipstream_events_published_total", "Events published to the bus", "counter",
            self.events_published.load(Ordering::Relaxed));
        metric!("slipstream_events_delivered_total", "Events accepted by mailboxes", "counter",
            self.events_delivered.load(Ordering::Relaxed));
        metric!("slipstream_events_dropped_total", "Events dropped on full mailboxes", "counter",
            self.events_dropped.load(Ordering::Relaxed));

        metric!("slipstream_messages_received_total", "Client messages received", "counter",
            self.messages_received.load(Ordering::Relaxed));
        metric!("slipstream_messages_sent_total", "Messages written to clients", "counter",
            self.messages_sent.load(Ordering::Relaxed));
        metric!("slipstream_messages_rejected_total", "Client messages rejected", "counter",
            self.rejected_messages.load(Ordering::Relaxed));

        metric!("slipstream_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics
    pub fn to_json(&self) -> String {
        json!({
            "players": {
                "connected": self.players_connected.load(Ordering::Relaxed),
                "connections_total": self.connections_total.load(Ordering::Relaxed),
            },
            "performance": {
                "tick_time_us": self.tick_time_us.load(Ordering::Relaxed),
                "tick_time_p95_us": self.tick_time_p95_us.load(Ordering::Relaxed),
                "tick_time_max_us": self.tick_time_max_us.load(Ordering::Relaxed),
                "tick_count": self.tick_count.load(Ordering::Relaxed),
            },
            "race": {
                "phase": self.phase_name(),
                "round": self.round.load(Ordering::Relaxed),
            },
            "events": {
                "published": self.events_published.load(Ordering::Relaxed),
                "delivered": self.events_delivered.load(Ordering::Relaxed),
                "dropped": self.events_dropped.load(Ordering::Relaxed),
            },
            "network": {
                "messages_received": self.messages_received.load(Ordering::Relaxed),
                "messages_sent": self.messages_sent.load(Ordering::Relaxed),
                "messages_rejected": self.rejected_messages.load(Ordering::Relaxed),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    )
}

/// Build the response for a raw HTTP request
fn route(metrics: &Metrics, request: &str) -> String {
    if request.starts_with("GET /metrics/json") {
        http_response("200 OK", "application/json", &metrics.to_json())
    } else if request.starts_with("GET /metrics") {
        http_response(
            "200 OK",
            "text/plain; version=0.0.4",
            &metrics.to_prometheus(),
        )
    } else if request.starts_with("GET /health") {
        http_response("200 OK", "text/plain", "OK")
    } else {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
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
                    let response = route(&metrics, &request);
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
