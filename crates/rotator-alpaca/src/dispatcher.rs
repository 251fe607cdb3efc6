//! Alpaca rotator endpoint dispatch.
//!
//! The dispatcher is the only consumer of the device core. For every
//! endpoint it resolves the device, runs the domain pre-checks the
//! engine itself does not enforce (connected-ness, moving-state
//! conflicts, value bounds), invokes the core operation and builds the
//! response envelope — stamping exactly one server transaction ID per
//! response.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use rotator_core::{DeviceError, Rotator, RotatorBank, TransactionSequencer};

use crate::errors::AlpacaError;
use crate::metrics::{ALPACA_ERRORS_TOTAL, HALTS_TOTAL, MOVES_TOTAL};
use crate::protocol::{Envelope, Params};

pub const DRIVER_NAME: &str = "Rotator Simulator";
pub const DRIVER_VERSION: &str = "1.0";
pub const INTERFACE_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
}

/// What the HTTP layer should send back.
#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 200 with a JSON envelope body.
    Ok(String),
    /// 400, device number outside the configured range.
    BadDevice,
    /// 404, endpoint unknown for the rotator device type.
    UnknownEndpoint,
    /// 405, endpoint exists but not for this HTTP method.
    MethodNotAllowed,
}

pub struct Dispatcher {
    bank: Arc<RotatorBank>,
    sequencer: Arc<TransactionSequencer>,
}

impl Dispatcher {
    pub fn new(bank: Arc<RotatorBank>, sequencer: Arc<TransactionSequencer>) -> Self {
        Self { bank, sequencer }
    }

    pub fn bank(&self) -> &RotatorBank {
        &self.bank
    }

    pub fn sequencer(&self) -> &TransactionSequencer {
        &self.sequencer
    }

    /// Dispatch one rotator-device request.
    pub fn handle(
        &self,
        device: usize,
        op: &str,
        method: Method,
        params: &Params,
    ) -> DispatchOutcome {
        let rotator = match self.bank.get(device) {
            Ok(r) => r,
            Err(DeviceError::NoSuchDevice { .. }) => return DispatchOutcome::BadDevice,
        };
        debug!(device, op, client_id = ?params.client_id(), "dispatching");

        match op {
            // --- Common device metadata, no pre-checks ---
            "name" => self.get_only(method, params, || DRIVER_NAME),
            "description" => {
                self.get_only(method, params, || "Simulated rotator implemented in Rust.")
            }
            "driverinfo" => self.get_only(method, params, || {
                format!("ASCOM Alpaca driver for a simulated rotator. V{DRIVER_VERSION} (Rust)")
            }),
            "driverversion" => self.get_only(method, params, || DRIVER_VERSION),
            "interfaceversion" => self.get_only(method, params, || INTERFACE_VERSION),
            "supportedactions" => self.get_only(method, params, Vec::<String>::new),

            // --- Unsupported command surface ---
            "action" => self.put_only(method, params, AlpacaError::ActionNotImplemented),
            "commandblind" | "commandbool" | "commandstring" => {
                self.put_only(method, params, AlpacaError::NotImplemented)
            }

            // --- Connection ---
            "connected" => match method {
                Method::Get => self.property(rotator.is_connected(), params),
                Method::Put => match params.get_bool("Connected") {
                    Some(connected) => {
                        rotator.set_connected(connected);
                        self.method_ok(params)
                    }
                    None => self.method_error(AlpacaError::InvalidValue, params),
                },
            },

            // --- Guarded state reads ---
            "canreverse" => self.guarded_get(rotator, method, params, Rotator::can_reverse),
            "ismoving" => self.guarded_get(rotator, method, params, Rotator::is_moving),
            "position" => self.guarded_get(rotator, method, params, Rotator::position),
            "targetposition" => {
                self.guarded_get(rotator, method, params, Rotator::target_position)
            }
            "stepsize" => self.guarded_get(rotator, method, params, Rotator::step_size),

            // --- Reverse flag ---
            "reverse" => match method {
                Method::Get => self.guarded_get(rotator, method, params, Rotator::reverse),
                Method::Put => {
                    if !rotator.is_connected() {
                        self.method_error(AlpacaError::NotConnected, params)
                    } else if rotator.is_moving() {
                        self.method_error(AlpacaError::InvalidOperation, params)
                    } else {
                        match params.get_bool("Reverse") {
                            Some(reverse) => {
                                rotator.set_reverse(reverse);
                                self.method_ok(params)
                            }
                            None => self.method_error(AlpacaError::InvalidValue, params),
                        }
                    }
                }
            },

            // --- Motion ---
            "halt" => match method {
                Method::Get => DispatchOutcome::MethodNotAllowed,
                Method::Put => {
                    if !rotator.is_connected() {
                        self.method_error(AlpacaError::NotConnected, params)
                    } else {
                        rotator.halt();
                        HALTS_TOTAL.inc();
                        self.method_ok(params)
                    }
                }
            },
            "move" => match method {
                Method::Get => DispatchOutcome::MethodNotAllowed,
                Method::Put => {
                    if !rotator.is_connected() {
                        self.method_error(AlpacaError::NotConnected, params)
                    } else if rotator.is_moving() {
                        self.method_error(AlpacaError::InvalidOperation, params)
                    } else {
                        match params.get_f64("Position") {
                            Some(delta) if delta > -360.0 && delta < 360.0 => {
                                rotator.move_relative(delta);
                                MOVES_TOTAL.inc();
                                self.method_ok(params)
                            }
                            _ => self.method_error(AlpacaError::InvalidValue, params),
                        }
                    }
                }
            },
            "moveabsolute" => match method {
                Method::Get => DispatchOutcome::MethodNotAllowed,
                Method::Put => {
                    if !rotator.is_connected() {
                        self.method_error(AlpacaError::NotConnected, params)
                    } else if rotator.is_moving() {
                        self.method_error(AlpacaError::InvalidOperation, params)
                    } else {
                        match params.get_f64("Position") {
                            Some(target) if (0.0..360.0).contains(&target) => {
                                rotator.move_absolute(target);
                                MOVES_TOTAL.inc();
                                self.method_ok(params)
                            }
                            _ => self.method_error(AlpacaError::InvalidValue, params),
                        }
                    }
                }
            },

            _ => DispatchOutcome::UnknownEndpoint,
        }
    }

    // ------------------
    // Envelope builders
    // ------------------

    fn property<T: Serialize>(&self, value: T, params: &Params) -> DispatchOutcome {
        DispatchOutcome::Ok(Envelope::property(value, params, &self.sequencer).to_json())
    }

    fn property_error(&self, err: AlpacaError, params: &Params) -> DispatchOutcome {
        ALPACA_ERRORS_TOTAL.inc();
        DispatchOutcome::Ok(Envelope::property_error(err, params, &self.sequencer).to_json())
    }

    fn method_ok(&self, params: &Params) -> DispatchOutcome {
        DispatchOutcome::Ok(Envelope::method(params, &self.sequencer).to_json())
    }

    fn method_error(&self, err: AlpacaError, params: &Params) -> DispatchOutcome {
        ALPACA_ERRORS_TOTAL.inc();
        DispatchOutcome::Ok(Envelope::method_error(err, params, &self.sequencer).to_json())
    }

    /// GET-only static metadata.
    fn get_only<T: Serialize>(
        &self,
        method: Method,
        params: &Params,
        read: impl FnOnce() -> T,
    ) -> DispatchOutcome {
        match method {
            Method::Get => self.property(read(), params),
            Method::Put => DispatchOutcome::MethodNotAllowed,
        }
    }

    /// PUT-only endpoint that always reports `err`.
    fn put_only(&self, method: Method, params: &Params, err: AlpacaError) -> DispatchOutcome {
        match method {
            Method::Get => DispatchOutcome::MethodNotAllowed,
            Method::Put => self.method_error(err, params),
        }
    }

    /// GET of device state that requires the device to be connected.
    fn guarded_get<T: Serialize>(
        &self,
        rotator: &Rotator,
        method: Method,
        params: &Params,
        read: impl FnOnce(&Rotator) -> T,
    ) -> DispatchOutcome {
        match method {
            Method::Get => {
                if !rotator.is_connected() {
                    self.property_error(AlpacaError::NotConnected, params)
                } else {
                    self.property(read(rotator), params)
                }
            }
            Method::Put => DispatchOutcome::MethodNotAllowed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            Arc::new(RotatorBank::new(2, 1.0, 100)),
            Arc::new(TransactionSequencer::new()),
        )
    }

    fn body(outcome: DispatchOutcome) -> serde_json::Value {
        match outcome {
            DispatchOutcome::Ok(json) => serde_json::from_str(&json).unwrap(),
            other => panic!("expected Ok outcome, got {other:?}"),
        }
    }

    #[test]
    fn bad_device_number_is_a_routing_error() {
        let d = dispatcher();
        let outcome = d.handle(2, "connected", Method::Get, &Params::default());
        assert_eq!(outcome, DispatchOutcome::BadDevice);
    }

    #[test]
    fn unknown_endpoint_and_wrong_method() {
        let d = dispatcher();
        let p = Params::default();
        assert_eq!(
            d.handle(0, "focusposition", Method::Get, &p),
            DispatchOutcome::UnknownEndpoint
        );
        assert_eq!(
            d.handle(0, "position", Method::Put, &p),
            DispatchOutcome::MethodNotAllowed
        );
        assert_eq!(
            d.handle(0, "halt", Method::Get, &p),
            DispatchOutcome::MethodNotAllowed
        );
    }

    #[test]
    fn metadata_needs_no_connection() {
        let d = dispatcher();
        let v = body(d.handle(0, "name", Method::Get, &Params::default()));
        assert_eq!(v["Value"], "Rotator Simulator");
        assert_eq!(v["ErrorNumber"], 0);
        let v = body(d.handle(0, "interfaceversion", Method::Get, &Params::default()));
        assert_eq!(v["Value"], 2);
        let v = body(d.handle(0, "supportedactions", Method::Get, &Params::default()));
        assert_eq!(v["Value"], serde_json::json!([]));
    }

    #[test]
    fn state_reads_require_connection() {
        let d = dispatcher();
        let v = body(d.handle(0, "position", Method::Get, &Params::default()));
        assert_eq!(v["ErrorNumber"], 0x407);
        assert!(v.get("Value").is_none());
    }

    #[test]
    fn connect_then_read_position() {
        let d = dispatcher();
        let put = Params::parse("Connected=true&ClientTransactionID=5");
        let v = body(d.handle(0, "connected", Method::Put, &put));
        assert_eq!(v["ErrorNumber"], 0);
        assert_eq!(v["ClientTransactionID"], 5);

        let v = body(d.handle(0, "position", Method::Get, &Params::default()));
        assert_eq!(v["ErrorNumber"], 0);
        assert_eq!(v["Value"], 0.0);
    }

    #[test]
    fn connected_put_without_parameter_is_invalid_value() {
        let d = dispatcher();
        let v = body(d.handle(0, "connected", Method::Put, &Params::default()));
        assert_eq!(v["ErrorNumber"], 0x401);
    }
}
