//! End-to-end gateway scenarios over a real localhost TCP connection.
//!
//! Each test boots the full stack (listener, framer, handler, session map,
//! dispatch queue) on an ephemeral port, speaks raw GB/T 32960 bytes like a
//! terminal would, and checks the replies and the records that reach the
//! dispatcher queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use evgate_core::auth::AuthService;
use evgate_core::dispatch::{self, RecordEnvelope};
use evgate_core::handler::ProtocolHandler;
use evgate_core::protocol::{Command, Packet, ProtocolVersion};
use evgate_core::server::GatewayServer;
use evgate_core::session::SessionManager;

const VIN: &str = "VIN12345678901234";

struct Gateway {
    addr: std::net::SocketAddr,
    sessions: Arc<SessionManager>,
    queue: mpsc::Receiver<RecordEnvelope>,
    shutdown: watch::Sender<bool>,
}

async fn start_gateway() -> Gateway {
    let sessions = Arc::new(SessionManager::new());
    let (submitter, queue) = dispatch::bounded(1024);
    let auth = Arc::new(AuthService::new(&[]));
    let handler = Arc::new(ProtocolHandler::new(Arc::clone(&sessions), submitter, auth));
    let server = GatewayServer::new(handler, 65535);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (shutdown, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move { server.run(listener, shutdown_rx).await });

    Gateway { addr, sessions, queue, shutdown }
}

fn encode(command: Command, response: u8, payload: Vec<u8>) -> Vec<u8> {
    Packet {
        version: ProtocolVersion::V2016,
        command,
        response,
        vin: VIN.into(),
        encryption: 0x01,
        payload,
    }
    .encode()
}

/// Rewrite an encoded frame's marker to `$$`. The checksum does not cover
/// the marker, so it stays valid.
fn as_v2025(mut frame: Vec<u8>) -> Vec<u8> {
    frame[0] = 0x24;
    frame[1] = 0x24;
    frame
}

fn platform_login_frame() -> Vec<u8> {
    let mut payload = vec![24, 5, 1, 12, 30, 5, 0x00, 0x01];
    payload.extend_from_slice(b"admin\0\0\0\0\0\0\0");
    payload.extend_from_slice(b"admin\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0");
    payload.push(0x01);
    assert_eq!(payload.len(), 41);
    encode(Command::PlatformLogin, 0xFE, payload)
}

fn vehicle_login_frame() -> Vec<u8> {
    let mut payload = vec![24, 5, 1, 12, 30, 5, 0x00, 0x01];
    payload.extend_from_slice(b"89860012345678901234");
    payload.push(1);
    payload.push(4);
    encode(Command::VehicleLogin, 0xFE, payload)
}

fn mixed_realtime_payload() -> Vec<u8> {
    let mut payload = vec![24, 5, 1, 12, 30, 5];
    // vehicle, 20 bytes
    payload.push(0x01);
    payload.extend_from_slice(&[
        0x01, 0x03, 0x01, 0x02, 0x58, 0x00, 0x01, 0xE2, 0x40, 0x0D, 0xAC, 0x27, 0x74, 0x58, 0x01,
        0x0F, 0x07, 0xD0, 0x0A, 0x00,
    ]);
    // location, 9 bytes
    payload.push(0x05);
    payload.push(0x00);
    payload.extend_from_slice(&116_397_128u32.to_be_bytes());
    payload.extend_from_slice(&39_916_527u32.to_be_bytes());
    // one motor, 1 + 12 bytes
    payload.push(0x02);
    payload.push(1);
    payload.extend_from_slice(&[
        0x01, 0x01, 0x3C, 0x59, 0xD8, 0x54, 0x5C, 0x4B, 0x0D, 0x48, 0x2A, 0x30,
    ]);
    payload
}

async fn read_reply(stream: &mut TcpStream) -> Packet {
    let mut header = [0u8; 24];
    timeout(Duration::from_secs(2), stream.read_exact(&mut header))
        .await
        .expect("reply header in time")
        .expect("reply header");
    let payload_len = u16::from_be_bytes([header[22], header[23]]) as usize;
    let mut rest = vec![0u8; payload_len + 1];
    timeout(Duration::from_secs(2), stream.read_exact(&mut rest))
        .await
        .expect("reply body in time")
        .expect("reply body");
    let mut frame = header.to_vec();
    frame.extend_from_slice(&rest);
    Packet::decode(&frame).expect("reply decodes")
}

async fn recv_record(queue: &mut mpsc::Receiver<RecordEnvelope>) -> RecordEnvelope {
    timeout(Duration::from_secs(2), queue.recv())
        .await
        .expect("record in time")
        .expect("queue open")
}

#[tokio::test]
async fn test_platform_login_happy_path() {
    let gw = start_gateway().await;
    let mut stream = TcpStream::connect(gw.addr).await.expect("connect");

    stream.write_all(&platform_login_frame()).await.expect("send");
    let reply = read_reply(&mut stream).await;

    assert_eq!(reply.command, Command::PlatformLogin);
    assert_eq!(reply.response, 0x01);
    assert_eq!(reply.vin, VIN);
    assert_eq!(reply.payload, vec![24, 5, 1, 12, 30, 5]);

    let _ = gw.shutdown.send(true);
}

#[tokio::test]
async fn test_vehicle_login_before_platform_rejected() {
    let gw = start_gateway().await;
    let mut stream = TcpStream::connect(gw.addr).await.expect("connect");

    stream.write_all(&vehicle_login_frame()).await.expect("send");
    let reply = read_reply(&mut stream).await;

    assert_eq!(reply.command, Command::VehicleLogin);
    assert_eq!(reply.response, 0x02);
    assert!(gw.sessions.is_empty());

    let _ = gw.shutdown.send(true);
}

#[tokio::test]
async fn test_login_flow_creates_session() {
    let gw = start_gateway().await;
    let mut stream = TcpStream::connect(gw.addr).await.expect("connect");

    stream.write_all(&platform_login_frame()).await.expect("send");
    assert_eq!(read_reply(&mut stream).await.response, 0x01);

    stream.write_all(&vehicle_login_frame()).await.expect("send");
    let reply = read_reply(&mut stream).await;
    assert_eq!(reply.response, 0x01);
    assert_eq!(reply.payload[8], 0x01);
    assert!(gw.sessions.get(VIN).is_some());

    // Logout tears the session down again.
    let logout = encode(Command::Logout, 0xFE, vec![24, 5, 1, 13, 0, 0, 0, 1]);
    stream.write_all(&logout).await.expect("send");
    let reply = read_reply(&mut stream).await;
    assert_eq!(reply.command, Command::Logout);
    assert_eq!(reply.response, 0x01);
    assert!(gw.sessions.is_empty());

    let _ = gw.shutdown.send(true);
}

#[tokio::test]
async fn test_realtime_mixed_records_in_order() {
    let mut gw = start_gateway().await;
    let mut stream = TcpStream::connect(gw.addr).await.expect("connect");

    let frame = encode(Command::Realtime, 0xFE, mixed_realtime_payload());
    stream.write_all(&frame).await.expect("send");

    let kinds = [
        recv_record(&mut gw.queue).await,
        recv_record(&mut gw.queue).await,
        recv_record(&mut gw.queue).await,
    ]
    .map(|env| {
        assert_eq!(env.vin, VIN);
        env.record.kind()
    });
    assert_eq!(kinds, ["VEHICLE", "LOCATION", "MOTOR"]);

    let reply = read_reply(&mut stream).await;
    assert_eq!(reply.command, Command::Realtime);
    assert_eq!(reply.response, 0x01);

    let _ = gw.shutdown.send(true);
}

#[tokio::test]
async fn test_corrupted_prefix_resync() {
    let mut gw = start_gateway().await;
    let mut stream = TcpStream::connect(gw.addr).await.expect("connect");

    // Ten junk bytes (no marker), one valid frame, three trailing junk bytes.
    let mut wire = vec![0x00, 0x11, 0x47, 0x99, 0xAB, 0xCD, 0x13, 0x37, 0x5A, 0x5B];
    wire.extend(encode(Command::Realtime, 0xFE, mixed_realtime_payload()));
    wire.extend_from_slice(&[0xDE, 0xAD, 0xBE]);
    stream.write_all(&wire).await.expect("send");

    // Exactly one frame worth of records and exactly one reply.
    for expected in ["VEHICLE", "LOCATION", "MOTOR"] {
        assert_eq!(recv_record(&mut gw.queue).await.record.kind(), expected);
    }
    let reply = read_reply(&mut stream).await;
    assert_eq!(reply.response, 0x01);

    assert!(
        timeout(Duration::from_millis(200), gw.queue.recv()).await.is_err(),
        "no further records from the garbage"
    );

    let _ = gw.shutdown.send(true);
}

#[tokio::test]
async fn test_truncated_battery_voltage_v2025() {
    let mut gw = start_gateway().await;
    let mut stream = TcpStream::connect(gw.addr).await.expect("connect");

    // One pack declaring 100 cells with only 40 cell bytes present.
    let mut payload = vec![24, 5, 1, 12, 30, 5];
    payload.push(0x07);
    payload.push(1); // pack count
    payload.push(1); // pack seq
    payload.extend_from_slice(&3550u16.to_be_bytes());
    payload.extend_from_slice(&30100u16.to_be_bytes());
    payload.extend_from_slice(&100u16.to_be_bytes());
    for i in 0..20u16 {
        payload.extend_from_slice(&(330 + i).to_be_bytes());
    }
    let frame = as_v2025(encode(Command::Realtime, 0xFE, payload));
    stream.write_all(&frame).await.expect("send");

    let env = recv_record(&mut gw.queue).await;
    match env.record {
        evgate_core::protocol::RealtimeRecord::BatteryVoltage(bv) => {
            assert_eq!(bv.packs[0].cell_count, 100);
            assert_eq!(bv.packs[0].cell_voltages.len(), 20);
        }
        other => panic!("expected battery voltage, got {}", other.kind()),
    }
    let reply = read_reply(&mut stream).await;
    assert_eq!(reply.response, 0x01);

    // The connection is still usable afterwards.
    stream.write_all(&platform_login_frame()).await.expect("send");
    assert_eq!(read_reply(&mut stream).await.response, 0x01);

    let _ = gw.shutdown.send(true);
}

#[tokio::test]
async fn test_version_overlap_0x06_disambiguation() {
    let mut gw = start_gateway().await;
    let mut stream = TcpStream::connect(gw.addr).await.expect("connect");

    // A 14-byte body that is an extreme block under 2016 and an alarm block
    // (with empty fault groups) under 2025.
    let mut payload = vec![24, 5, 1, 12, 30, 5];
    payload.push(0x06);
    payload.extend_from_slice(&[2, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

    let frame_2016 = encode(Command::Realtime, 0xFE, payload.clone());
    stream.write_all(&frame_2016).await.expect("send");
    assert_eq!(recv_record(&mut gw.queue).await.record.kind(), "EXTREME");
    assert_eq!(read_reply(&mut stream).await.response, 0x01);

    let frame_2025 = as_v2025(encode(Command::Realtime, 0xFE, payload));
    stream.write_all(&frame_2025).await.expect("send");
    assert_eq!(recv_record(&mut gw.queue).await.record.kind(), "ALARM");
    assert_eq!(read_reply(&mut stream).await.response, 0x01);

    let _ = gw.shutdown.send(true);
}

#[tokio::test]
async fn test_frame_split_across_writes() {
    let mut gw = start_gateway().await;
    let mut stream = TcpStream::connect(gw.addr).await.expect("connect");

    let frame = encode(Command::Realtime, 0xFE, mixed_realtime_payload());
    let (a, b) = frame.split_at(7);
    stream.write_all(a).await.expect("send first part");
    stream.flush().await.expect("flush");
    tokio::time::sleep(Duration::from_millis(50)).await;
    stream.write_all(b).await.expect("send second part");

    assert_eq!(recv_record(&mut gw.queue).await.record.kind(), "VEHICLE");
    assert_eq!(read_reply(&mut stream).await.response, 0x01);

    let _ = gw.shutdown.send(true);
}

#[tokio::test]
async fn test_spec_hex_platform_login_frame() {
    // The canonical platform-login frame, assembled field by field, must be
    // byte-identical to what the codec emits.
    let mut wire = vec![0x23, 0x23, 0x05, 0xFE];
    wire.extend_from_slice(b"VIN12345678901234");
    wire.push(0x01);
    wire.extend_from_slice(&0x0029u16.to_be_bytes());
    wire.extend_from_slice(&[24, 5, 1, 12, 30, 5, 0x00, 0x01]);
    wire.extend_from_slice(b"admin\0\0\0\0\0\0\0");
    wire.extend_from_slice(b"admin\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0");
    wire.push(0x01);
    let bcc = wire[2..].iter().fold(0u8, |acc, b| acc ^ b);
    wire.push(bcc);

    assert_eq!(wire, platform_login_frame());
}
