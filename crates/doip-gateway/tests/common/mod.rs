//! Shared harness for the end-to-end suites: writes a configuration tree
//! to a temp directory, loads it through the real loader, and runs a
//! server on ephemeral ports.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use doip_config::load_gateway_config;
use doip_gateway::{CycleTable, Server};
use doip_wire::{read_message, DoipMessage, DoipPayload, ReadError};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const TESTER: u16 = 0x0E00;
pub const TESTER_SECONDARY: u16 = 0x0E01;
pub const GATEWAY_ADDRESS: u16 = 0x1000;
pub const ENGINE: u16 = 0x1000;
pub const ABS: u16 = 0x1001;
pub const TCM: u16 = 0x1002;
pub const FUNCTIONAL: u16 = 0x1FFF;
pub const VIN: &str = "1HGBH41JXMN109186";

pub fn hex_of(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// The scripted `read_vin` UDS response: `62 F1 90` || VIN bytes.
pub fn vin_response() -> Vec<u8> {
    let mut out = vec![0x62, 0xF1, 0x90];
    out.extend_from_slice(VIN.as_bytes());
    out
}

pub struct TestGateway {
    pub tcp_addr: SocketAddr,
    pub udp_addr: SocketAddr,
    pub cycles: Arc<CycleTable>,
    shutdown: Option<oneshot::Sender<()>>,
    server_task: Option<JoinHandle<()>>,
    _config_dir: TempDir,
}

impl TestGateway {
    /// Start a gateway from the default three-ECU tree.
    pub async fn start() -> Self {
        Self::with_files(default_tree()).await
    }

    /// Start a gateway from an explicit set of (relative path, content)
    /// documents; `gateway.yml` must be among them.
    pub async fn with_files(files: Vec<(String, String)>) -> Self {
        let dir = TempDir::new().unwrap();
        for (rel, content) in files {
            let path = dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }

        let config = load_gateway_config(&dir.path().join("gateway.yml")).unwrap();
        let server = Server::bind(config).await.unwrap();
        let tcp_addr = server.tcp_addr().unwrap();
        let udp_addr = server.udp_addr().unwrap();
        let cycles = server.cycles();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let server_task = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            tcp_addr,
            udp_addr,
            cycles,
            shutdown: Some(shutdown_tx),
            server_task: Some(server_task),
            _config_dir: dir,
        }
    }

    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.tcp_addr).await.unwrap()
    }

    /// Shut the server down and wait for a clean exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.take().unwrap().send(());
        self.server_task.take().unwrap().await.unwrap();
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.server_task.take() {
            task.abort();
        }
    }
}

/// An 11-byte routing activation request frame for `tester`.
pub fn activation_request(tester: u16) -> Vec<u8> {
    let mut frame = vec![0x02, 0xFD, 0x00, 0x05, 0x00, 0x00, 0x00, 0x0B];
    frame.extend_from_slice(&tester.to_be_bytes());
    frame.push(0x00); // activation type: default
    frame.extend_from_slice(&[0x00; 8]); // reserved + OEM
    frame
}

/// A diagnostic message frame carrying `uds`.
pub fn diag_request(source: u16, target: u16, uds: &[u8]) -> Vec<u8> {
    let payload_len = (4 + uds.len()) as u32;
    let mut frame = vec![0x02, 0xFD, 0x80, 0x01];
    frame.extend_from_slice(&payload_len.to_be_bytes());
    frame.extend_from_slice(&source.to_be_bytes());
    frame.extend_from_slice(&target.to_be_bytes());
    frame.extend_from_slice(uds);
    frame
}

/// Perform a successful routing activation for `tester`.
pub async fn activate(stream: &mut TcpStream, tester: u16) {
    stream.write_all(&activation_request(tester)).await.unwrap();
    let response = read_frame(stream).await;
    match response.payload {
        DoipPayload::RoutingActivationResponse(resp) => {
            assert_eq!(resp.code, 0x10, "activation refused");
            assert_eq!(resp.tester_address, tester);
        }
        other => panic!("expected routing activation response, got {:?}", other),
    }
}

/// Read one structured frame from the stream.
pub async fn read_frame(stream: &mut TcpStream) -> DoipMessage {
    read_message(stream).await.unwrap()
}

/// Read exactly `n` raw bytes.
pub async fn read_exactly(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf).await.unwrap();
    buf
}

/// Assert the server closed the connection.
pub async fn expect_closed(stream: &mut TcpStream) {
    match tokio::time::timeout(std::time::Duration::from_secs(3), read_message(stream)).await {
        Ok(Err(ReadError::Closed)) => {}
        Ok(Err(ReadError::Io(_))) => {}
        Ok(other) => panic!("expected closed connection, got {:?}", other),
        Err(_) => panic!("connection not closed within 3s"),
    }
}

fn gateway_yaml(extra: &str) -> String {
    format!(
        r#"
gateway:
  name: Test Gateway
network:
  host: 127.0.0.1
  port: 0
  max_connections: 5
  timeout: 5
protocol:
  version: "0x02"
vehicle:
  vin: "{VIN}"
  eid: "123456789ABC"
  gid: "DEF012345678"
  logical_address: "0x1000"
power_mode:
  cycle_through: ["0x01", "0x02"]
{extra}
ecus:
  - ecus/engine.yml
  - ecus/abs.yml
  - ecus/transmission.yml
"#
    )
}

fn ecu_yaml(name: &str, target: u16, testers: &[u16], specific: &[&str]) -> String {
    let testers: Vec<String> = testers.iter().map(|t| format!("\"0x{:04X}\"", t)).collect();
    let specific_list: String = specific
        .iter()
        .map(|s| format!("      - {}\n", s))
        .collect();
    format!(
        r#"
ecu:
  name: {name}
  target_address: "0x{target:04X}"
  functional_address: "0x1FFF"
  tester_addresses: [{testers}]
  uds_services:
    catalog_files: [../services/catalog.yml]
    common_services:
      - read_vin
      - tester_present
      - quiet_tester_present
    specific_services:
{specific_list}"#,
        testers = testers.join(", "),
    )
}

fn catalog_yaml() -> String {
    format!(
        r#"
common_services:
  read_vin:
    request: "0x22F190"
    responses:
      - "{vin}"
    supports_functional: true
  tester_present:
    request: "3E00"
    responses:
      - "7E00"
    supports_functional: true
  quiet_tester_present:
    request: "3E80"
    no_response: true
    supports_functional: true
specific_services:
  engine_rpm_read:
    request: "22F40C"
    responses:
      - "62F40C0A20"
      - "62F40C0B40"
      - "62F40C0C80"
  coolant_temp_read:
    request: "regex:^220C[0-9A-F]{{2}}$"
    responses:
      - "620C{{request[4:6]}}7B"
  delayed_routine:
    request: "31010203"
    responses:
      - response: "7101020300"
        delay_ms: 200
  wheel_speed_read:
    request: "22F40D"
    responses:
      - "62F40D00FA"
  gear_position_read:
    request: "22F40E"
    responses:
      - "62F40E03"
      - "62F40E04"
"#,
        vin = hex_of(&vin_response()),
    )
}

/// Three ECUs: engine (testers 0E00+0E01), abs (0E01 only), transmission
/// (0E00+0E01); all share functional address 0x1FFF.
pub fn default_tree() -> Vec<(String, String)> {
    vec![
        ("gateway.yml".to_string(), gateway_yaml("")),
        (
            "ecus/engine.yml".to_string(),
            ecu_yaml(
                "Engine",
                ENGINE,
                &[TESTER, TESTER_SECONDARY],
                &["engine_rpm_read", "coolant_temp_read", "delayed_routine"],
            ),
        ),
        (
            "ecus/abs.yml".to_string(),
            ecu_yaml("Abs", ABS, &[TESTER_SECONDARY], &["wheel_speed_read"]),
        ),
        (
            "ecus/transmission.yml".to_string(),
            ecu_yaml(
                "Transmission",
                TCM,
                &[TESTER, TESTER_SECONDARY],
                &["gear_position_read"],
            ),
        ),
        ("services/catalog.yml".to_string(), catalog_yaml()),
    ]
}

/// Same three ECUs, but every tester list admits 0x0E00, so the functional
/// fanout scenario gets an answer from all of them.
pub fn open_acl_tree() -> Vec<(String, String)> {
    let mut files = default_tree();
    for (path, content) in &mut files {
        if path == "ecus/abs.yml" {
            *content = ecu_yaml("Abs", ABS, &[TESTER, TESTER_SECONDARY], &["wheel_speed_read"]);
        }
    }
    files
}

/// Single-ECU tree with a one-second idle timeout and a one-connection cap.
pub fn tight_limits_tree() -> Vec<(String, String)> {
    let gateway = gateway_yaml("")
        .replace("max_connections: 5", "max_connections: 1")
        .replace("timeout: 5", "timeout: 1")
        .replace("  - ecus/abs.yml\n", "")
        .replace("  - ecus/transmission.yml\n", "");
    vec![
        ("gateway.yml".to_string(), gateway),
        (
            "ecus/engine.yml".to_string(),
            ecu_yaml("Engine", ENGINE, &[TESTER], &["engine_rpm_read"]),
        ),
        ("services/catalog.yml".to_string(), catalog_yaml()),
    ]
}
