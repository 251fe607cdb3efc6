//! HTTP front end for the Alpaca API.
//!
//! A fixed pool of worker threads shares one `tiny_http` server;
//! accept is thread-safe, so each worker receives and answers requests
//! independently, which is what lets many clients command unrelated
//! devices concurrently. Workers poll the shared stop flag between
//! requests via a receive timeout.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tiny_http::{Header, Response, Server};
use tracing::{debug, info, warn};

use crate::dispatcher::{DispatchOutcome, Dispatcher, Method};
use crate::management::{self, ServerDescription};
use crate::metrics::REQUESTS_TOTAL;
use crate::protocol::Params;

/// PUT bodies beyond this are cut off; Alpaca forms are tiny.
const MAX_BODY_BYTES: u64 = 16 * 1024;

const RECV_TIMEOUT: Duration = Duration::from_millis(250);

pub struct HttpConfig {
    pub bind_addr: String,
    pub workers: usize,
    pub server_info: ServerDescription,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5555".to_string(),
            workers: 4,
            server_info: ServerDescription::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Start the worker pool. Returns the join handles; the caller owns
/// shutdown via the stop flag.
pub fn run_http(
    dispatcher: Arc<Dispatcher>,
    config: HttpConfig,
    stop: Arc<AtomicBool>,
) -> Result<Vec<thread::JoinHandle<()>>, ServerError> {
    let server = Arc::new(Server::http(&config.bind_addr).map_err(|source| ServerError::Bind {
        addr: config.bind_addr.clone(),
        source,
    })?);

    info!(
        addr = %config.bind_addr,
        workers = config.workers,
        devices = dispatcher.bank().len(),
        "Alpaca API listening"
    );

    let info = Arc::new(config.server_info);
    let handles = (0..config.workers.max(1))
        .map(|worker| {
            let server = Arc::clone(&server);
            let dispatcher = Arc::clone(&dispatcher);
            let info = Arc::clone(&info);
            let stop = Arc::clone(&stop);
            thread::spawn(move || worker_loop(worker, &server, &dispatcher, &info, &stop))
        })
        .collect();
    Ok(handles)
}

fn worker_loop(
    worker: usize,
    server: &Server,
    dispatcher: &Dispatcher,
    info: &ServerDescription,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::Relaxed) {
        match server.recv_timeout(RECV_TIMEOUT) {
            Ok(Some(request)) => handle_request(dispatcher, info, request),
            Ok(None) => {}
            Err(err) => {
                warn!(worker, error = %err, "HTTP receive error");
            }
        }
    }
    debug!(worker, "HTTP worker stopping");
}

enum Reply {
    Json(String),
    Html(String),
    Error(u16, &'static str),
}

fn handle_request(dispatcher: &Dispatcher, info: &ServerDescription, mut request: tiny_http::Request) {
    REQUESTS_TOTAL.inc();

    let method = match request.method() {
        tiny_http::Method::Get => Some(Method::Get),
        tiny_http::Method::Put => Some(Method::Put),
        _ => None,
    };

    let url = request.url().to_string();
    let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));

    // PUT parameters arrive urlencoded in the body; GET in the query.
    let params = if method == Some(Method::Put) {
        let mut body = String::new();
        if let Err(err) = request
            .as_reader()
            .take(MAX_BODY_BYTES)
            .read_to_string(&mut body)
        {
            warn!(error = %err, "failed to read request body");
        }
        Params::parse(&body)
    } else {
        Params::parse(query)
    };

    let reply = route(dispatcher, info, path, method, &params);

    let result = match reply {
        Reply::Json(body) => request.respond(
            Response::from_string(body).with_header(
                Header::from_bytes(&b"Content-Type"[..], &b"application/json; charset=utf-8"[..])
                    .unwrap(),
            ),
        ),
        Reply::Html(body) => request.respond(
            Response::from_string(body).with_header(
                Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..]).unwrap(),
            ),
        ),
        Reply::Error(status, message) => {
            request.respond(Response::from_string(message).with_status_code(status))
        }
    };
    if let Err(err) = result {
        warn!(error = %err, "failed to send response");
    }
}

fn route(
    dispatcher: &Dispatcher,
    info: &ServerDescription,
    path: &str,
    method: Option<Method>,
    params: &Params,
) -> Reply {
    // Device API: /api/v1/rotator/<number>/<operation>
    if let Some(rest) = path.strip_prefix("/api/v1/rotator/") {
        let Some((device, op)) = rest.split_once('/') else {
            return Reply::Error(404, "Not Found");
        };
        if op.is_empty() || op.contains('/') {
            return Reply::Error(404, "Not Found");
        }
        let Ok(device) = device.parse::<usize>() else {
            return Reply::Error(400, "No such DeviceNumber");
        };
        let Some(method) = method else {
            return Reply::Error(405, "Method Not Allowed");
        };
        let op = op.to_ascii_lowercase();
        return match dispatcher.handle(device, &op, method, params) {
            DispatchOutcome::Ok(json) => Reply::Json(json),
            DispatchOutcome::BadDevice => Reply::Error(400, "No such DeviceNumber"),
            DispatchOutcome::UnknownEndpoint => Reply::Error(404, "Not Found"),
            DispatchOutcome::MethodNotAllowed => Reply::Error(405, "Method Not Allowed"),
        };
    }

    // Setup pages: /setup and /setup/v1/rotator/<number>/setup
    if let Some(rest) = path
        .strip_prefix("/setup/v1/rotator/")
        .and_then(|rest| rest.strip_suffix("/setup"))
    {
        return match (method, rest.parse::<usize>()) {
            (Some(Method::Get), Ok(device)) => match dispatcher.bank().get(device) {
                Ok(rotator) => {
                    Reply::Html(management::device_setup_page(device, &rotator.snapshot()))
                }
                Err(_) => Reply::Error(400, "No such DeviceNumber"),
            },
            (Some(Method::Get), Err(_)) => Reply::Error(400, "No such DeviceNumber"),
            (None, _) => Reply::Error(405, "Method Not Allowed"),
            _ => Reply::Error(405, "Method Not Allowed"),
        };
    }

    match (method, path) {
        (Some(Method::Get), "/setup") => Reply::Html(management::setup_index(dispatcher.bank())),
        (Some(Method::Get), "/management/apiversions") => {
            Reply::Json(management::api_versions(params, dispatcher.sequencer()).to_json())
        }
        (Some(Method::Get), "/management/v1/description") => {
            Reply::Json(management::description(info, params, dispatcher.sequencer()).to_json())
        }
        (Some(Method::Get), "/management/v1/configureddevices") => Reply::Json(
            management::configured_devices(dispatcher.bank(), params, dispatcher.sequencer())
                .to_json(),
        ),
        (None, _) => Reply::Error(405, "Method Not Allowed"),
        (Some(_), "/setup" | "/management/apiversions" | "/management/v1/description"
            | "/management/v1/configureddevices") => Reply::Error(405, "Method Not Allowed"),
        _ => Reply::Error(404, "Not Found"),
    }
}
