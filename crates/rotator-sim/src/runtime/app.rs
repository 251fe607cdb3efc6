use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry;
use rotator_alpaca::{
    run_discovery, run_http, DiscoveryConfig, Dispatcher, HttpConfig, ServerDescription,
};
use rotator_core::{RotatorBank, TransactionSequencer};
use std::sync::{atomic::AtomicBool, Arc};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

pub fn run_from_args() {
    let config = RuntimeConfig::from_env();
    if config.show_help {
        RuntimeConfig::print_help();
        return;
    }
    run(config);
}

pub fn run(config: RuntimeConfig) {
    // Initialize tracing
    init_tracing(config.json_logs);

    // Initialize metrics
    telemetry::init();

    // Start metrics server if enabled
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let config = config.normalized();

    info!(
        devices = config.device_count,
        step_size = config.step_size,
        steps_per_sec = config.steps_per_sec,
        "Starting rotator bank"
    );

    let bank = Arc::new(RotatorBank::new(
        config.device_count,
        config.step_size,
        config.steps_per_sec,
    ));
    let sequencer = Arc::new(TransactionSequencer::new());
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&bank), Arc::clone(&sequencer)));

    let stop = Arc::new(AtomicBool::new(false));

    let sampler_handle = telemetry::start_device_sampler(Arc::clone(&bank), Arc::clone(&stop));

    let http_config = HttpConfig {
        bind_addr: config.http_addr.clone(),
        workers: config.http_workers,
        server_info: ServerDescription::default(),
    };
    let http_handles = match run_http(dispatcher, http_config, Arc::clone(&stop)) {
        Ok(handles) => handles,
        Err(err) => {
            error!(error = %err, "Failed to start the Alpaca API");
            stop.store(true, std::sync::atomic::Ordering::Relaxed);
            let _ = sampler_handle.join();
            return;
        }
    };

    let discovery_handle = if config.discovery_enabled {
        let discovery_config = DiscoveryConfig {
            bind_addr: format!("0.0.0.0:{}", config.discovery_port),
            alpaca_port: config.http_port(),
        };
        match run_discovery(discovery_config, Arc::clone(&stop)) {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(error = %err, "Discovery responder failed to start");
                None
            }
        }
    } else {
        info!("Discovery disabled");
        None
    };

    info!("Rotator simulator running");

    if let Some(seconds) = config.run_seconds {
        info!(seconds, "Running for limited duration");
        thread::sleep(Duration::from_secs(seconds));
        stop.store(true, std::sync::atomic::Ordering::Relaxed);

        for handle in http_handles {
            let _ = handle.join();
        }
        if let Some(discovery) = discovery_handle {
            let _ = discovery.thread.join();
        }
        let _ = sampler_handle.join();

        info!("Run complete");
    } else {
        for handle in http_handles {
            let _ = handle.join();
        }
        if let Some(discovery) = discovery_handle {
            let _ = discovery.thread.join();
        }
        let _ = sampler_handle.join();
    }
}
