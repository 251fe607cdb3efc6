use rotator_alpaca::metrics::{
    init_metrics, serve_metrics, DEVICES_CONNECTED, DEVICES_MOVING,
};
use rotator_core::RotatorBank;
use std::sync::{atomic::AtomicBool, Arc};
use std::thread;
use std::time::Duration;
use tracing::info;

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

/// Refresh the per-bank device gauges a few times per second.
pub fn start_device_sampler(
    bank: Arc<RotatorBank>,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !stop.load(std::sync::atomic::Ordering::Relaxed) {
            let mut moving = 0u32;
            let mut connected = 0u32;
            for rotator in bank.iter() {
                let snapshot = rotator.snapshot();
                if snapshot.is_moving {
                    moving += 1;
                }
                if snapshot.connected {
                    connected += 1;
                }
            }
            DEVICES_MOVING.set(f64::from(moving));
            DEVICES_CONNECTED.set(f64::from(connected));

            thread::sleep(Duration::from_millis(200));
        }
    })
}
