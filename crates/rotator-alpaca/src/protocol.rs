//! Alpaca wire protocol: request parameters and response envelopes.
//!
//! Every response is a JSON envelope with `ClientTransactionID` echoed
//! from the request (0 when the client did not send one),
//! `ServerTransactionID` stamped from the shared sequencer — exactly
//! once per envelope — and the 12-bit error number/message pair.
//! `Value` is omitted entirely, not null, when there is nothing to
//! return.
//!
//! Parameter names are matched case-insensitively, for both query
//! strings and `x-www-form-urlencoded` PUT bodies, as the Alpaca
//! protocol requires.

use serde::Serialize;
use serde_json::Value;

use rotator_core::TransactionSequencer;

use crate::errors::AlpacaError;

pub const FLD_CLIENT_ID: &str = "ClientID";
pub const FLD_CLIENT_TRANSACTION_ID: &str = "ClientTransactionID";

/// Decoded request parameters, query string or form body.
#[derive(Debug, Default)]
pub struct Params(Vec<(String, String)>);

impl Params {
    /// Parse an `application/x-www-form-urlencoded` string (also the
    /// format of a URL query string). Malformed percent escapes are
    /// kept literally rather than dropped.
    pub fn parse(encoded: &str) -> Self {
        let mut pairs = Vec::new();
        for piece in encoded.split('&') {
            if piece.is_empty() {
                continue;
            }
            let (name, value) = match piece.split_once('=') {
                Some((n, v)) => (n, v),
                None => (piece, ""),
            };
            pairs.push((percent_decode(name), percent_decode(value)));
        }
        Self(pairs)
    }

    /// Case-insensitive lookup; first match wins.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Finite float parameter, or `None` when absent or unparsable.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name)?
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    }

    /// Strict boolean parameter: `true`/`false` in any letter case.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        let raw = self.get(name)?.trim();
        if raw.eq_ignore_ascii_case("true") {
            Some(true)
        } else if raw.eq_ignore_ascii_case("false") {
            Some(false)
        } else {
            None
        }
    }

    pub fn get_u32(&self, name: &str) -> Option<u32> {
        self.get(name)?.trim().parse::<u32>().ok()
    }

    /// `ClientTransactionID` to echo back; 0 when absent, per Alpaca.
    pub fn client_transaction_id(&self) -> u32 {
        self.get_u32(FLD_CLIENT_TRANSACTION_ID).unwrap_or(0)
    }

    /// `ClientID`, when the client sent one. Only used for logging.
    pub fn client_id(&self) -> Option<u32> {
        self.get_u32(FLD_CLIENT_ID)
    }
}

fn percent_decode(encoded: &str) -> String {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => match (hex_val(bytes.get(i + 1)), hex_val(bytes.get(i + 2))) {
                (Some(hi), Some(lo)) => {
                    out.push(hi * 16 + lo);
                    i += 3;
                }
                _ => {
                    out.push(b'%');
                    i += 1;
                }
            },
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(byte: Option<&u8>) -> Option<u8> {
    byte.and_then(|b| (*b as char).to_digit(16)).map(|d| d as u8)
}

/// The standard Alpaca response envelope.
#[derive(Debug, Serialize)]
pub struct Envelope {
    #[serde(rename = "Value", skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(rename = "ClientTransactionID")]
    pub client_transaction_id: u32,
    #[serde(rename = "ServerTransactionID")]
    pub server_transaction_id: u32,
    #[serde(rename = "ErrorNumber")]
    pub error_number: u32,
    #[serde(rename = "ErrorMessage")]
    pub error_message: String,
}

impl Envelope {
    /// Successful property read.
    pub fn property<T: Serialize>(
        value: T,
        params: &Params,
        sequencer: &TransactionSequencer,
    ) -> Self {
        Self {
            value: Some(serde_json::to_value(value).expect("property value serializes")),
            client_transaction_id: params.client_transaction_id(),
            server_transaction_id: sequencer.next(),
            error_number: 0,
            error_message: String::new(),
        }
    }

    /// Failed property read; `Value` is omitted from the wire form.
    pub fn property_error(
        err: AlpacaError,
        params: &Params,
        sequencer: &TransactionSequencer,
    ) -> Self {
        Self {
            value: None,
            client_transaction_id: params.client_transaction_id(),
            server_transaction_id: sequencer.next(),
            error_number: err.code(),
            error_message: err.to_string(),
        }
    }

    /// Successful method call (no value).
    pub fn method(params: &Params, sequencer: &TransactionSequencer) -> Self {
        Self {
            value: None,
            client_transaction_id: params.client_transaction_id(),
            server_transaction_id: sequencer.next(),
            error_number: 0,
            error_message: String::new(),
        }
    }

    /// Failed method call.
    pub fn method_error(
        err: AlpacaError,
        params: &Params,
        sequencer: &TransactionSequencer,
    ) -> Self {
        Self {
            value: None,
            client_transaction_id: params.client_transaction_id(),
            server_transaction_id: sequencer.next(),
            error_number: err.code(),
            error_message: err.to_string(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("envelope serializes")
    }
}
