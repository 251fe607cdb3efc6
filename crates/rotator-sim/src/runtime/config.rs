use tracing::warn;

use rotator_alpaca::DISCOVERY_PORT;

/// Valid step size range, fractional degrees per step.
const STEP_SIZE_RANGE: (f64, f64) = (0.1, 5.0);
/// Valid stepping rate range, whole steps per second.
const STEPS_PER_SEC_RANGE: (u32, u32) = (5, 60);

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub run_seconds: Option<u64>,
    pub http_addr: String,
    pub http_workers: usize,
    pub device_count: usize,
    pub step_size: f64,
    pub steps_per_sec: u32,
    pub discovery_enabled: bool,
    pub discovery_port: u16,
    pub json_logs: bool,
    pub metrics_addr: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            run_seconds: None,
            http_addr: "0.0.0.0:5555".to_string(),
            http_workers: 4,
            device_count: 4,
            step_size: 1.0,
            steps_per_sec: 6,
            discovery_enabled: true,
            discovery_port: DISCOVERY_PORT,
            json_logs: false,
            metrics_addr: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Self {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--run-seconds" => {
                    if i + 1 < args.len() {
                        cfg.run_seconds = args[i + 1].parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--http-addr" => {
                    if i + 1 < args.len() {
                        cfg.http_addr = args[i + 1].clone();
                        i += 1;
                    }
                }
                "--workers" => {
                    if i + 1 < args.len() {
                        cfg.http_workers = args[i + 1].parse().unwrap_or(cfg.http_workers);
                        i += 1;
                    }
                }
                "--devices" => {
                    if i + 1 < args.len() {
                        cfg.device_count = args[i + 1].parse().unwrap_or(cfg.device_count);
                        i += 1;
                    }
                }
                "--step-size" => {
                    if i + 1 < args.len() {
                        cfg.step_size = args[i + 1].parse().unwrap_or(cfg.step_size);
                        i += 1;
                    }
                }
                "--steps-per-sec" => {
                    if i + 1 < args.len() {
                        cfg.steps_per_sec = args[i + 1].parse().unwrap_or(cfg.steps_per_sec);
                        i += 1;
                    }
                }
                "--no-discovery" => {
                    cfg.discovery_enabled = false;
                }
                "--discovery-port" => {
                    if i + 1 < args.len() {
                        cfg.discovery_port = args[i + 1].parse().unwrap_or(cfg.discovery_port);
                        i += 1;
                    }
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--metrics-addr" => {
                    if i + 1 < args.len() {
                        cfg.metrics_addr = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                _ => {}
            }
            i += 1;
        }
        cfg
    }

    /// Clamp the mechanism parameters into their valid ranges, warning
    /// when a flag was out of bounds.
    pub fn normalized(mut self) -> Self {
        let (min, max) = STEP_SIZE_RANGE;
        if !(min..=max).contains(&self.step_size) {
            warn!(
                step_size = self.step_size,
                min, max, "step size out of range, clamping"
            );
            self.step_size = self.step_size.clamp(min, max);
        }
        let (min, max) = STEPS_PER_SEC_RANGE;
        if !(min..=max).contains(&self.steps_per_sec) {
            warn!(
                steps_per_sec = self.steps_per_sec,
                min, max, "steps per second out of range, clamping"
            );
            self.steps_per_sec = self.steps_per_sec.clamp(min, max);
        }
        if self.device_count == 0 {
            warn!("device count must be at least 1, using 1");
            self.device_count = 1;
        }
        self
    }

    /// Port the HTTP API is served on, for the discovery payload.
    pub fn http_port(&self) -> u16 {
        self.http_addr
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok())
            .unwrap_or(5555)
    }

    pub fn print_help() {
        println!(
            r#"rotator-sim - ASCOM Alpaca rotator simulator

USAGE:
    rotator-sim [OPTIONS]

OPTIONS:
    --http-addr <ADDR>      Alpaca API bind address [default: 0.0.0.0:5555]
    --workers <N>           HTTP worker threads [default: 4]
    --devices <N>           Number of simulated rotators [default: 4]
    --step-size <DEG>       Degrees per step, 0.1 to 5.0 [default: 1.0]
    --steps-per-sec <N>     Steps per second, 5 to 60 [default: 6]
    --no-discovery          Disable the UDP discovery responder
    --discovery-port <P>    Discovery UDP port [default: 32227]
    --run-seconds <SECS>    Run for a fixed duration then exit
    --json-logs             Output logs in JSON format (for log aggregation)
    --metrics-addr <ADDR>   Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,rotator_core=trace)

EXAMPLES:
    # Four rotators on the standard port with metrics
    rotator-sim --metrics-addr 0.0.0.0:9090

    # One fast rotator for protocol experiments
    rotator-sim --devices 1 --steps-per-sec 60 --http-addr 127.0.0.1:11111

    # Short smoke run
    rotator-sim --run-seconds 10 --no-discovery
"#
        );
    }
}
