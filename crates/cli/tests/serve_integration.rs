//! Integration tests for the `carpark serve` HTTP API.
//!
//! Each test starts the server as a child process on a unique port,
//! makes HTTP requests, and verifies the responses.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use serde_json::Value;

/// Atomic port counter to avoid port conflicts between parallel tests.
/// Base port is derived from process ID so parallel `cargo test --workspace`
/// runs don't collide on the same port range.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 20000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

/// A running `carpark serve` child, killed on drop.
struct Server {
    child: Child,
    port: u16,
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Start `carpark serve` with a seeded lot and wait until it accepts
/// connections.
fn start_server(generate: usize, zones: usize) -> Server {
    let port = next_port();
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_carpark"));
    cmd.arg("serve")
        .arg("--port")
        .arg(port.to_string())
        .arg("--generate")
        .arg(generate.to_string())
        .arg("--zones")
        .arg(zones.to_string());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let child = cmd.spawn().expect("failed to start carpark serve");
    for _ in 0..50 {
        if TcpStream::connect(format!("127.0.0.1:{port}")).is_ok() {
            return Server { child, port };
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    panic!("server did not start on port {port}");
}

/// Minimal HTTP/1.1 request; returns (status, parsed JSON body).
fn request(port: u16, method: &str, path: &str, body: Option<&str>) -> (u16, Value) {
    let mut stream =
        TcpStream::connect(format!("127.0.0.1:{port}")).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    let body = body.unwrap_or("");
    let req = format!(
        "{method} {path} HTTP/1.1\r\nHost: 127.0.0.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(req.as_bytes()).expect("write request");

    let mut response = String::new();
    stream.read_to_string(&mut response).expect("read response");

    let status: u16 = response
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("status line");
    let json_body = response
        .split("\r\n\r\n")
        .nth(1)
        .filter(|b| !b.is_empty())
        .map(|b| serde_json::from_str(b).expect("JSON body"))
        .unwrap_or(Value::Null);
    (status, json_body)
}

fn get(port: u16, path: &str) -> (u16, Value) {
    request(port, "GET", path, None)
}

fn post(port: u16, path: &str, body: &str) -> (u16, Value) {
    request(port, "POST", path, Some(body))
}

fn put(port: u16, path: &str, body: &str) -> (u16, Value) {
    request(port, "PUT", path, Some(body))
}

#[test]
fn health_and_seeded_lot() {
    let server = start_server(10, 5);

    let (status, body) = get(server.port, "/health");
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");

    let (status, body) = get(server.port, "/parking/spaces");
    assert_eq!(status, 200);
    let spaces = body.as_array().expect("space list");
    assert_eq!(spaces.len(), 10);
    assert_eq!(spaces[0]["number"], "A001");
    assert_eq!(spaces[0]["status"], "free");

    let (status, body) = get(server.port, "/parking/spaces?zone=a");
    assert_eq!(status, 200);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, _) = get(server.port, "/parking/spaces/Z999");
    assert_eq!(status, 404);
}

#[test]
fn reserve_occupy_free_lifecycle() {
    let server = start_server(4, 2);

    let (_, space) = get(server.port, "/parking/spaces/A001");
    let vehicle_type = space["vehicleType"].as_str().unwrap().to_string();

    let (status, body) = post(
        server.port,
        "/parking/reserve",
        &format!(r#"{{"spaceNumber":"A001","plate":"ab-123","vehicleType":"{vehicle_type}"}}"#),
    );
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);

    let (_, space) = get(server.port, "/parking/spaces/A001");
    assert_eq!(space["status"], "reserved");
    assert_eq!(space["reservation"]["plate"], "AB-123");

    // A second reserve on the same space is an invalid transition.
    let (status, body) = post(
        server.port,
        "/parking/reserve",
        &format!(r#"{{"spaceNumber":"A001","plate":"xx-999","vehicleType":"{vehicle_type}"}}"#),
    );
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("A001"));

    let (status, _) = post(
        server.port,
        "/parking/occupy",
        r#"{"spaceNumber":"A001","plate":"AB-123"}"#,
    );
    assert_eq!(status, 200);

    let (status, _) = post(server.port, "/parking/free", r#"{"spaceNumber":"A001"}"#);
    assert_eq!(status, 200);

    // creation, reservation, occupation, liberation -- newest first.
    let (status, body) = get(server.port, "/parking/history/A001");
    assert_eq!(status, 200);
    let actions: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert_eq!(
        actions,
        ["liberation", "occupation", "reservation", "creation"]
    );

    let (status, body) = get(server.port, "/parking/history?limit=3&page=1");
    assert_eq!(status, 200);
    assert_eq!(body["pagination"]["total"], 7);
    assert_eq!(body["pagination"]["pages"], 3);
    assert_eq!(body["history"].as_array().unwrap().len(), 3);
}

#[test]
fn session_flow_and_stats() {
    let server = start_server(2, 1);

    let (status, body) = post(
        server.port,
        "/sessions",
        r#"{"vehicle":{"plate":"xy-99","type":"car"},"spaceNumber":"A002","userId":"user-1"}"#,
    );
    assert_eq!(status, 201);
    assert_eq!(body["session"]["status"], "active");
    assert_eq!(body["session"]["vehicle"]["plate"], "XY-99");
    let id = body["session"]["id"].as_str().unwrap().to_string();

    let (_, space) = get(server.port, "/parking/spaces/A002");
    assert_eq!(space["status"], "occupied");
    assert_eq!(space["currentSessionId"].as_str(), Some(id.as_str()));

    let (status, body) = get(server.port, "/stats");
    assert_eq!(status, 200);
    assert_eq!(body["total"], 2);
    assert_eq!(body["occupied"], 1);
    assert_eq!(body["occupancyRate"], 50);
    assert_eq!(body["activeSessions"], 1);

    let (status, body) = put(server.port, &format!("/sessions/{id}/end"), r#"{"amount":9.5}"#);
    assert_eq!(status, 200);
    assert_eq!(body["session"]["status"], "ended");
    assert_eq!(body["session"]["amount"], 9.5);

    let (_, space) = get(server.port, "/parking/spaces/A002");
    assert_eq!(space["status"], "free");

    // Ending twice is a validation error.
    let (status, _) = put(server.port, &format!("/sessions/{id}/end"), "{}");
    assert_eq!(status, 400);

    let (status, body) = get(server.port, "/sessions?status=ended");
    assert_eq!(status, 200);
    assert_eq!(body["pagination"]["total"], 1);
}

#[test]
fn malformed_input_is_rejected() {
    let server = start_server(2, 1);

    let (status, body) = post(server.port, "/parking/reserve", "{not json");
    assert_eq!(status, 400);
    assert!(body["error"].is_string());

    let (status, _) = post(
        server.port,
        "/parking/reserve",
        r#"{"spaceNumber":"A001"}"#,
    );
    assert_eq!(status, 400);

    let (status, body) = get(server.port, "/parking/spaces?zone=AB");
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("zone"));

    let (status, _) = get(server.port, "/no-such-route");
    assert_eq!(status, 404);
}

#[test]
fn regenerate_and_cleanup_endpoints() {
    let server = start_server(2, 1);

    let (status, body) = post(
        server.port,
        "/parking/generate-spaces",
        r#"{"totalSpaces":6,"zoneCount":3}"#,
    );
    assert_eq!(status, 201);
    assert_eq!(body["success"], true);
    assert_eq!(body["spaces"].as_array().unwrap().len(), 6);

    // Nothing reserved, nothing to sweep.
    let (status, body) = post(server.port, "/parking/cleanup-expired", "");
    assert_eq!(status, 200);
    assert_eq!(body["freedSpaces"], 0);

    let (status, body) = get(server.port, "/alerts");
    assert_eq!(status, 200);
    assert_eq!(body["alerts"].as_array().unwrap().len(), 0);
}
