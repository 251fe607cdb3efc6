//! Alpaca management API payloads and the setup pages.

use serde::Serialize;

use rotator_core::{RotatorBank, Snapshot, TransactionSequencer};

use crate::dispatcher::{DRIVER_NAME, DRIVER_VERSION};
use crate::protocol::{Envelope, Params};

/// Alpaca API versions this server speaks.
pub const SUPPORTED_API_VERSIONS: &[u32] = &[1];

#[derive(Debug, Clone, Serialize)]
pub struct ServerDescription {
    #[serde(rename = "ServerName")]
    pub server_name: String,
    #[serde(rename = "Manufacturer")]
    pub manufacturer: String,
    #[serde(rename = "ManufacturerVersion")]
    pub manufacturer_version: String,
    #[serde(rename = "Location")]
    pub location: String,
}

impl Default for ServerDescription {
    fn default() -> Self {
        Self {
            server_name: format!("{DRIVER_NAME} (Rust)"),
            manufacturer: "rotator-sim contributors".to_string(),
            manufacturer_version: DRIVER_VERSION.to_string(),
            location: "localhost".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ConfiguredDevice {
    #[serde(rename = "DeviceName")]
    device_name: String,
    #[serde(rename = "DeviceType")]
    device_type: &'static str,
    #[serde(rename = "DeviceNumber")]
    device_number: usize,
    #[serde(rename = "UniqueID")]
    unique_id: String,
}

pub fn api_versions(params: &Params, sequencer: &TransactionSequencer) -> Envelope {
    Envelope::property(SUPPORTED_API_VERSIONS, params, sequencer)
}

pub fn description(
    info: &ServerDescription,
    params: &Params,
    sequencer: &TransactionSequencer,
) -> Envelope {
    Envelope::property(info, params, sequencer)
}

pub fn configured_devices(
    bank: &RotatorBank,
    params: &Params,
    sequencer: &TransactionSequencer,
) -> Envelope {
    let devices: Vec<ConfiguredDevice> = (0..bank.len())
        .map(|number| ConfiguredDevice {
            device_name: format!("{DRIVER_NAME} #{number}"),
            device_type: "Rotator",
            device_number: number,
            unique_id: format!("rotator-sim-{number:04}"),
        })
        .collect();
    Envelope::property(devices, params, sequencer)
}

/// Landing page linking each device's setup page.
pub fn setup_index(bank: &RotatorBank) -> String {
    let mut rows = String::new();
    for number in 0..bank.len() {
        rows.push_str(&format!(
            "<li><a href=\"/setup/v1/rotator/{number}/setup\">Rotator {number}</a></li>\n"
        ));
    }
    format!(
        "<!DOCTYPE html>\n<html><head><title>{DRIVER_NAME} Setup</title></head>\n\
         <body><h1>{DRIVER_NAME}</h1>\n\
         <p>Simulated rotators configured on this server:</p>\n\
         <ul>\n{rows}</ul>\n\
         <p>Driver version {DRIVER_VERSION}.</p>\n\
         </body></html>\n"
    )
}

/// Per-device status page. Step size and rate are fixed at
/// construction; reconfiguration is by restarting with different
/// command-line flags, so the page reports rather than edits.
pub fn device_setup_page(device_number: usize, snapshot: &Snapshot) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><title>{DRIVER_NAME} {device_number} Setup</title></head>\n\
         <body><h1>Rotator {device_number}</h1>\n\
         <table border=\"1\" cellpadding=\"4\">\n\
         <tr><td>Connected</td><td>{connected}</td></tr>\n\
         <tr><td>Position (deg)</td><td>{position:.3}</td></tr>\n\
         <tr><td>Target position (deg)</td><td>{target:.3}</td></tr>\n\
         <tr><td>Moving</td><td>{moving}</td></tr>\n\
         <tr><td>Reverse</td><td>{reverse}</td></tr>\n\
         <tr><td>Step size (deg)</td><td>{step_size}</td></tr>\n\
         <tr><td>Steps per second</td><td>{steps_per_sec}</td></tr>\n\
         </table>\n\
         <p>Step size and rate are fixed for the life of the process; restart with \
         <code>--step-size</code> / <code>--steps-per-sec</code> to change them.</p>\n\
         </body></html>\n",
        connected = snapshot.connected,
        position = snapshot.position,
        target = snapshot.target_position,
        moving = snapshot.is_moving,
        reverse = snapshot.reverse,
        step_size = snapshot.step_size,
        steps_per_sec = snapshot.steps_per_sec,
    )
}
