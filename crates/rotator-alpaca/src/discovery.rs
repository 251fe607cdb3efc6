//! Alpaca UDP discovery responder.
//!
//! Listens on the discovery port and answers any datagram containing
//! the `alpacadiscovery1` token with a one-line JSON reply naming the
//! HTTP port the Alpaca API is served on. Device state is never
//! touched here.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::metrics::DISCOVERY_PROBES_TOTAL;

/// Standard Alpaca discovery port.
pub const DISCOVERY_PORT: u16 = 32227;

const DISCOVERY_TOKEN: &[u8] = b"alpacadiscovery1";

pub struct DiscoveryConfig {
    pub bind_addr: String,
    /// Port the HTTP API is reachable on; this is the whole payload.
    pub alpaca_port: u16,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DISCOVERY_PORT}"),
            alpaca_port: 5555,
        }
    }
}

/// Reply key casing matches the Python reference responder.
#[derive(Debug, Serialize)]
struct DiscoveryReply {
    #[serde(rename = "alpacaport")]
    alpaca_port: u16,
}

pub struct DiscoveryHandle {
    /// Address the responder actually bound (useful with port 0).
    pub local_addr: SocketAddr,
    pub thread: thread::JoinHandle<()>,
}

/// Bind the discovery socket and start the responder thread. The
/// socket uses a read timeout so the thread notices the stop flag.
pub fn run_discovery(
    config: DiscoveryConfig,
    stop: Arc<AtomicBool>,
) -> io::Result<DiscoveryHandle> {
    let socket = UdpSocket::bind(&config.bind_addr)?;
    let local_addr = socket.local_addr()?;
    socket.set_read_timeout(Some(Duration::from_millis(250)))?;

    let reply = serde_json::to_string(&DiscoveryReply {
        alpaca_port: config.alpaca_port,
    })
    .expect("discovery reply serializes");

    info!(addr = %local_addr, alpaca_port = config.alpaca_port, "Discovery responder listening");

    let thread = thread::spawn(move || {
        let mut buf = [0u8; 1024];
        while !stop.load(Ordering::Relaxed) {
            match socket.recv_from(&mut buf) {
                Ok((len, peer)) => {
                    DISCOVERY_PROBES_TOTAL.inc();
                    let data = &buf[..len];
                    if data
                        .windows(DISCOVERY_TOKEN.len())
                        .any(|window| window == DISCOVERY_TOKEN)
                    {
                        debug!(%peer, "discovery probe");
                        if let Err(err) = socket.send_to(reply.as_bytes(), peer) {
                            warn!(%peer, error = %err, "discovery reply failed");
                        }
                    } else {
                        debug!(%peer, len, "ignoring non-discovery datagram");
                    }
                }
                Err(err)
                    if err.kind() == io::ErrorKind::WouldBlock
                        || err.kind() == io::ErrorKind::TimedOut => {}
                Err(err) => {
                    warn!(error = %err, "discovery receive error");
                }
            }
        }
        debug!("discovery responder stopping");
    });

    Ok(DiscoveryHandle { local_addr, thread })
}
