//! End-to-end UDP responder tests

mod common;

use std::time::Duration;

use common::*;
use doip_wire::{DoipMessage, DoipPayload};
use tokio::net::UdpSocket;

async fn client() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

async fn exchange(gw: &TestGateway, socket: &UdpSocket, request: &[u8]) -> Vec<u8> {
    socket.send_to(request, gw.udp_addr).await.unwrap();
    let mut buf = vec![0u8; 1024];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("no UDP response")
        .unwrap();
    buf.truncate(len);
    buf
}

async fn expect_silence(gw: &TestGateway, socket: &UdpSocket, request: &[u8]) {
    socket.send_to(request, gw.udp_addr).await.unwrap();
    let mut buf = vec![0u8; 1024];
    let result = tokio::time::timeout(Duration::from_millis(300), socket.recv_from(&mut buf)).await;
    assert!(result.is_err(), "expected no response, got one");
}

#[tokio::test]
async fn vehicle_identification_response_layout() {
    let gw = TestGateway::start().await;
    let socket = client().await;

    let response = exchange(&gw, &socket, &[0x02, 0xFD, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]).await;

    assert_eq!(response.len(), 41);
    assert_eq!(&response[..8], &[0x02, 0xFD, 0x00, 0x04, 0x00, 0x00, 0x00, 0x21]);
    assert_eq!(&response[8..25], VIN.as_bytes());
    assert_eq!(&response[25..27], &[0x10, 0x00]);
    assert_eq!(&response[27..33], &[0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC]);
    assert_eq!(&response[33..39], &[0xDE, 0xF0, 0x12, 0x34, 0x56, 0x78]);
    assert_eq!(&response[39..], &[0x00, 0x00]);
}

#[tokio::test]
async fn identification_by_eid_answers_only_on_match() {
    let gw = TestGateway::start().await;
    let socket = client().await;

    let mut matching = vec![0x02, 0xFD, 0x00, 0x03, 0x00, 0x00, 0x00, 0x06];
    matching.extend_from_slice(&[0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC]);
    let response = exchange(&gw, &socket, &matching).await;
    assert_eq!(&response[2..4], &[0x00, 0x04]);

    let mut wrong = vec![0x02, 0xFD, 0x00, 0x03, 0x00, 0x00, 0x00, 0x06];
    wrong.extend_from_slice(&[0xAA; 6]);
    expect_silence(&gw, &socket, &wrong).await;
}

#[tokio::test]
async fn entity_status_reports_limits_and_open_sessions() {
    let gw = TestGateway::start().await;
    let socket = client().await;

    let response = exchange(&gw, &socket, &[0x02, 0xFD, 0x40, 0x01, 0x00, 0x00, 0x00, 0x00]).await;
    let message = DoipMessage::decode(&response).unwrap();
    let DoipPayload::EntityStatusResponse(status) = message.payload else {
        panic!("expected entity status response");
    };
    assert_eq!(status.node_type, 0x00);
    assert_eq!(status.max_open_sockets, 5);
    assert_eq!(status.open_sockets, 0);
    assert_eq!(status.max_data_size, 0xFFFF);

    // Open a TCP session and the live counter follows.
    let mut stream = gw.connect().await;
    activate(&mut stream, TESTER).await;

    let response = exchange(&gw, &socket, &[0x02, 0xFD, 0x40, 0x01, 0x00, 0x00, 0x00, 0x00]).await;
    let message = DoipMessage::decode(&response).unwrap();
    let DoipPayload::EntityStatusResponse(status) = message.payload else {
        panic!("expected entity status response");
    };
    assert_eq!(status.open_sockets, 1);
}

#[tokio::test]
async fn power_mode_response_is_nine_bytes_and_cycles() {
    let gw = TestGateway::start().await;
    let socket = client().await;

    // The test tree cycles power mode through [0x01, 0x02].
    let request = [0x02, 0xFD, 0x40, 0x03, 0x00, 0x00, 0x00, 0x00];
    let first = exchange(&gw, &socket, &request).await;
    assert_eq!(first, vec![0x02, 0xFD, 0x40, 0x04, 0x00, 0x00, 0x00, 0x01, 0x01]);

    let second = exchange(&gw, &socket, &request).await;
    assert_eq!(second, vec![0x02, 0xFD, 0x40, 0x04, 0x00, 0x00, 0x00, 0x01, 0x02]);

    let third = exchange(&gw, &socket, &request).await;
    assert_eq!(third[8], 0x01);
}

#[tokio::test]
async fn tcp_only_payloads_are_dropped_on_udp() {
    let gw = TestGateway::start().await;
    let socket = client().await;

    // Routing activation over UDP makes no sense; it is dropped.
    expect_silence(&gw, &socket, &activation_request(TESTER)).await;
}

#[tokio::test]
async fn malformed_datagrams_are_dropped() {
    let gw = TestGateway::start().await;
    let socket = client().await;

    // Bad inverse byte: no NACK on UDP, just silence.
    expect_silence(&gw, &socket, &[0x02, 0xFC, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]).await;
    // Truncated header.
    expect_silence(&gw, &socket, &[0x02, 0xFD, 0x00]).await;

    // The responder still answers well-formed traffic afterwards.
    let response = exchange(&gw, &socket, &[0x02, 0xFD, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]).await;
    assert_eq!(&response[2..4], &[0x00, 0x04]);
}
