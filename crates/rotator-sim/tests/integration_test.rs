use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream, UdpSocket};
use std::process::{Child, Command};
use std::thread;
use std::time::Duration;

struct SimProcess {
    child: Child,
    http_addr: String,
    discovery_port: u16,
}

impl SimProcess {
    fn start() -> Self {
        // Prefer the test-built binary when available to avoid extra cargo builds.
        let bin_path = std::env::var("CARGO_BIN_EXE_rotator-sim").unwrap_or_else(|_| {
            let candidates = [
                "../../target/release/rotator-sim",
                "target/release/rotator-sim",
                "./target/release/rotator-sim",
                "../../target/debug/rotator-sim",
                "target/debug/rotator-sim",
                "./target/debug/rotator-sim",
            ];
            for candidate in candidates {
                if std::path::Path::new(candidate).exists() {
                    return candidate.to_string();
                }
            }
            panic!(
                "Failed to locate rotator-sim binary. Expected CARGO_BIN_EXE_rotator-sim or a build in target/{{release,debug}}/rotator-sim."
            );
        });

        let http_addr = format!("127.0.0.1:{}", free_tcp_port());
        let discovery_port = free_udp_port();

        let child = Command::new(&bin_path)
            .args([
                "--http-addr",
                &http_addr,
                "--discovery-port",
                &discovery_port.to_string(),
                "--devices",
                "4",
                "--step-size",
                "1.0",
                "--steps-per-sec",
                "60",
            ])
            .spawn()
            .expect("Failed to start rotator-sim");

        // Loop until port is open (up to 5s)
        let start = std::time::Instant::now();
        while start.elapsed().as_secs() < 5 {
            if TcpStream::connect(&http_addr).is_ok() {
                break;
            }
            thread::sleep(Duration::from_millis(100));
        }

        // Give it a little more time to initialize internal state
        thread::sleep(Duration::from_millis(300));
        Self {
            child,
            http_addr,
            discovery_port,
        }
    }

    fn get(&self, path: &str) -> (u16, String) {
        self.request("GET", path, "")
    }

    fn put(&self, path: &str, form: &str) -> (u16, String) {
        self.request("PUT", path, form)
    }

    fn request(&self, method: &str, path: &str, body: &str) -> (u16, String) {
        let mut stream = TcpStream::connect(&self.http_addr).expect("connect to simulator");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        write!(
            stream,
            "{method} {path} HTTP/1.1\r\nHost: {host}\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n{body}",
            host = self.http_addr,
            len = body.len(),
        )
        .expect("send request");

        let mut raw = String::new();
        stream.read_to_string(&mut raw).expect("read response");

        let status: u16 = raw
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .expect("status line");
        let body = raw
            .split_once("\r\n\r\n")
            .map(|(_, b)| b.to_string())
            .unwrap_or_default();
        (status, body)
    }

    fn get_json(&self, path: &str) -> serde_json::Value {
        let (status, body) = self.get(path);
        assert_eq!(status, 200, "GET {path} -> {body}");
        serde_json::from_str(body.trim()).expect("JSON body")
    }

    fn put_json(&self, path: &str, form: &str) -> serde_json::Value {
        let (status, body) = self.put(path, form);
        assert_eq!(status, 200, "PUT {path} -> {body}");
        serde_json::from_str(body.trim()).expect("JSON body")
    }
}

impl Drop for SimProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}

fn free_tcp_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral TCP port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn free_udp_port() -> u16 {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind ephemeral UDP port");
    let port = socket.local_addr().unwrap().port();
    drop(socket);
    port
}

#[test]
fn test_connect_move_and_settle() {
    let sim = SimProcess::start();

    let v = sim.put_json(
        "/api/v1/rotator/0/connected",
        "Connected=true&ClientTransactionID=1",
    );
    assert_eq!(v["ErrorNumber"], 0);
    assert_eq!(v["ClientTransactionID"], 1);

    let v = sim.put_json(
        "/api/v1/rotator/0/moveabsolute",
        "Position=5.0&ClientTransactionID=2",
    );
    assert_eq!(v["ErrorNumber"], 0, "moveabsolute rejected: {v}");

    // 5 steps at 60 steps/sec settles well within the deadline.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let v = sim.get_json("/api/v1/rotator/0/ismoving");
        assert_eq!(v["ErrorNumber"], 0);
        if v["Value"] == false {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "rotator never settled");
        thread::sleep(Duration::from_millis(50));
    }

    let v = sim.get_json("/api/v1/rotator/0/position");
    let position = v["Value"].as_f64().unwrap();
    assert!((position - 5.0).abs() <= 0.5, "settled at {position}");
}

#[test]
fn test_error_paths_over_http() {
    let sim = SimProcess::start();

    // Motion without connecting first.
    let v = sim.put_json("/api/v1/rotator/0/move", "Position=10.0");
    assert_eq!(v["ErrorNumber"], 0x407);

    // Device number outside the configured range.
    let (status, _) = sim.get("/api/v1/rotator/9/position");
    assert_eq!(status, 400);

    // Unknown endpoint and wrong method.
    let (status, _) = sim.get("/api/v1/rotator/0/focusposition");
    assert_eq!(status, 404);
    let (status, _) = sim.get("/api/v1/rotator/0/halt");
    assert_eq!(status, 405);

    // Server transaction IDs keep increasing across requests.
    let a = sim.get_json("/api/v1/rotator/0/connected")["ServerTransactionID"]
        .as_u64()
        .unwrap();
    let b = sim.get_json("/api/v1/rotator/1/connected")["ServerTransactionID"]
        .as_u64()
        .unwrap();
    assert!(b > a);
}

#[test]
fn test_management_api() {
    let sim = SimProcess::start();

    let v = sim.get_json("/management/apiversions");
    assert_eq!(v["Value"], serde_json::json!([1]));

    let v = sim.get_json("/management/v1/configureddevices");
    let devices = v["Value"].as_array().unwrap();
    assert_eq!(devices.len(), 4);
    assert_eq!(devices[0]["DeviceType"], "Rotator");
    assert_eq!(devices[3]["DeviceNumber"], 3);

    let v = sim.get_json("/management/v1/description");
    assert!(v["Value"]["ServerName"]
        .as_str()
        .unwrap()
        .contains("Rotator"));

    let (status, body) = sim.get("/setup/v1/rotator/0/setup");
    assert_eq!(status, 200);
    assert!(body.contains("Step size"));
}

#[test]
fn test_discovery_responder() {
    let sim = SimProcess::start();

    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind probe socket");
    socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();

    let target = format!("127.0.0.1:{}", sim.discovery_port);
    let mut reply = None;
    // The responder starts slightly after the HTTP listener; retry a few probes.
    for _ in 0..10 {
        socket.send_to(b"alpacadiscovery1", &target).unwrap();
        let mut buf = [0u8; 256];
        if let Ok((len, _)) = socket.recv_from(&mut buf) {
            reply = Some(buf[..len].to_vec());
            break;
        }
    }

    let reply = reply.expect("no discovery reply");
    let v: serde_json::Value = serde_json::from_slice(&reply).unwrap();
    let expected_port: u16 = sim.http_addr.rsplit_once(':').unwrap().1.parse().unwrap();
    assert_eq!(v["alpacaport"], expected_port);
}
