//! Prometheus metrics for the rotator simulator.
//!
//! Counters cover the HTTP surface, motion commands and discovery
//! probes; gauges track the per-bank device state and are refreshed by
//! the runtime's sampler thread.

use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// HTTP Surface Metrics
// ============================================================================

/// Total HTTP requests received on the Alpaca API
pub static REQUESTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "rotator_http_requests_total",
        "Total HTTP requests received on the Alpaca API",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Requests answered with a non-zero Alpaca error number
pub static ALPACA_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "rotator_alpaca_errors_total",
        "Requests answered with a non-zero Alpaca error number",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Motion Metrics
// ============================================================================

/// Accepted Move and MoveAbsolute commands
pub static MOVES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "rotator_moves_total",
        "Accepted Move and MoveAbsolute commands",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Accepted Halt commands
pub static HALTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new("rotator_halts_total", "Accepted Halt commands").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Discovery Metrics
// ============================================================================

/// Discovery datagrams received
pub static DISCOVERY_PROBES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "rotator_discovery_probes_total",
        "Discovery datagrams received on the Alpaca discovery port",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Device State Metrics
// ============================================================================

/// Devices currently running a stepping cycle
pub static DEVICES_MOVING: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        "rotator_devices_moving",
        "Devices currently running a stepping cycle",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Devices currently connected
pub static DEVICES_CONNECTED: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new("rotator_devices_connected", "Devices currently connected").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            let path = request.url();

            match path {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let metric_families = REGISTRY.gather();
                    let mut buffer = Vec::new();

                    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        let _ = request.respond(
                            Response::from_string("Internal Server Error").with_status_code(500),
                        );
                        continue;
                    }

                    let response = Response::from_data(buffer).with_header(
                        tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/plain; version=0.0.4"[..],
                        )
                        .unwrap(),
                    );
                    let _ = request.respond(response);
                }
                "/health" => {
                    let _ = request.respond(Response::from_string("OK"));
                }
                "/ready" => {
                    // Ready once the API has answered at least one request
                    let served = REQUESTS_TOTAL.get();
                    if served > 0 {
                        let _ = request.respond(Response::from_string("Ready"));
                    } else {
                        let _ = request
                            .respond(Response::from_string("Not Ready").with_status_code(503));
                    }
                }
                _ => {
                    let _ =
                        request.respond(Response::from_string("Not Found").with_status_code(404));
                }
            }
        }
    })
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    // Touch each metric to force initialization
    let _ = REQUESTS_TOTAL.get();
    let _ = ALPACA_ERRORS_TOTAL.get();
    let _ = MOVES_TOTAL.get();
    let _ = HALTS_TOTAL.get();
    let _ = DISCOVERY_PROBES_TOTAL.get();
    let _ = DEVICES_MOVING.get();
    let _ = DEVICES_CONNECTED.get();
}
