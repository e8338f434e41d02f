//! Per-connection TCP session engine
//!
//! Each accepted connection runs this state machine:
//!
//! ```text
//! UNACTIVATED --routing activation ok--> ACTIVATED --close/error/idle--> CLOSED
//!      \------anything else: header NACK 0x06----------------------------^
//! ```
//!
//! In UNACTIVATED only a Routing Activation Request is accepted. Once
//! activated, the session exchanges diagnostic messages and alive checks
//! until the peer disconnects, errs, or idles out.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use doip_config::hex;
use doip_wire::{
    activation_code, diag_ack_code, diag_nack_code, nack_code, read_message, write_message,
    AliveCheckResponse, DiagnosticAck, DiagnosticMessage, DiagnosticNack, DoipMessage, DoipPayload,
    GenericNack, ReadError, RoutingActivationResponse,
};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::matcher::{execute_service, select_service, AddressMode, ServiceReply};
use crate::routing::{partition_by_acl, resolve_targets};
use crate::server::ServerContext;
use crate::uds::{self, nrc};

#[derive(Clone, Copy)]
enum SessionState {
    Unactivated,
    Activated { tester: u16 },
}

enum Flow {
    Continue,
    Activated { tester: u16 },
    Close,
}

pub(crate) async fn run_session(mut stream: TcpStream, peer: SocketAddr, ctx: Arc<ServerContext>) {
    let idle = Duration::from_secs(ctx.config.network.timeout_secs);
    let mut state = SessionState::Unactivated;

    loop {
        let message = match tokio::time::timeout(idle, read_message(&mut stream)).await {
            Err(_) => {
                info!(%peer, "session idle timeout");
                break;
            }
            Ok(Err(ReadError::Closed)) => {
                debug!(%peer, "peer closed connection");
                break;
            }
            Ok(Err(ReadError::Io(e))) => {
                debug!(%peer, error = %e, "socket error");
                break;
            }
            Ok(Err(ReadError::Decode(e))) => {
                warn!(%peer, error = %e, "frame decode failed");
                if let Some(code) = e.nack_code() {
                    let _ = send(&mut stream, &ctx, generic_nack(code)).await;
                }
                break;
            }
            Ok(Ok(message)) => message,
        };

        if message.protocol_version != ctx.config.protocol_version {
            warn!(
                %peer,
                got = format!("0x{:02X}", message.protocol_version),
                expected = format!("0x{:02X}", ctx.config.protocol_version),
                "protocol version mismatch"
            );
            let _ = send(
                &mut stream,
                &ctx,
                generic_nack(nack_code::INCORRECT_PATTERN_FORMAT),
            )
            .await;
            break;
        }

        let result = match state {
            SessionState::Unactivated => handle_unactivated(&mut stream, &ctx, peer, message).await,
            SessionState::Activated { tester } => {
                handle_activated(&mut stream, &ctx, peer, tester, message).await
            }
        };

        match result {
            Ok(Flow::Continue) => {}
            Ok(Flow::Activated { tester }) => state = SessionState::Activated { tester },
            Ok(Flow::Close) => break,
            Err(e) => {
                debug!(%peer, error = %e, "write failed, closing session");
                break;
            }
        }
    }
}

async fn handle_unactivated(
    stream: &mut TcpStream,
    ctx: &ServerContext,
    peer: SocketAddr,
    message: DoipMessage,
) -> io::Result<Flow> {
    let payload_type = message.payload.payload_type();
    let DoipPayload::RoutingActivationRequest(request) = message.payload else {
        warn!(
            %peer,
            ?payload_type,
            "payload type not accepted before routing activation"
        );
        send(
            stream,
            ctx,
            generic_nack(nack_code::INVALID_PAYLOAD_TYPE_IN_STATE),
        )
        .await?;
        return Ok(Flow::Close);
    };

    let tester = request.source_address;
    let accepted = ctx.config.is_tester_known(tester);
    let code = if accepted {
        activation_code::SUCCESS
    } else {
        activation_code::DENIED_UNKNOWN_SOURCE
    };

    send(
        stream,
        ctx,
        DoipPayload::RoutingActivationResponse(RoutingActivationResponse::new(
            tester,
            ctx.config.vehicle.logical_address,
            code,
        )),
    )
    .await?;

    if accepted {
        info!(%peer, tester = format!("0x{:04X}", tester), "routing activation accepted");
        Ok(Flow::Activated { tester })
    } else {
        warn!(%peer, tester = format!("0x{:04X}", tester), "routing activation refused: unknown tester");
        Ok(Flow::Close)
    }
}

async fn handle_activated(
    stream: &mut TcpStream,
    ctx: &ServerContext,
    peer: SocketAddr,
    tester: u16,
    message: DoipMessage,
) -> io::Result<Flow> {
    match message.payload {
        DoipPayload::DiagnosticMessage(diag) => {
            handle_diagnostic(stream, ctx, peer, tester, diag).await?;
            Ok(Flow::Continue)
        }
        DoipPayload::AliveCheckRequest(_) => {
            send(
                stream,
                ctx,
                DoipPayload::AliveCheckResponse(AliveCheckResponse {
                    source_address: ctx.config.vehicle.logical_address,
                }),
            )
            .await?;
            Ok(Flow::Continue)
        }
        DoipPayload::AliveCheckResponse(resp) => {
            debug!(%peer, source = format!("0x{:04X}", resp.source_address), "alive check response");
            Ok(Flow::Continue)
        }
        other => {
            warn!(
                %peer,
                payload_type = ?other.payload_type(),
                "payload type not accepted on an activated session"
            );
            send(
                stream,
                ctx,
                generic_nack(nack_code::INVALID_PAYLOAD_TYPE_IN_STATE),
            )
            .await?;
            Ok(Flow::Close)
        }
    }
}

async fn handle_diagnostic(
    stream: &mut TcpStream,
    ctx: &ServerContext,
    peer: SocketAddr,
    tester: u16,
    diag: DiagnosticMessage,
) -> io::Result<()> {
    let sid = uds::request_sid(&diag.user_data);

    // The frame's source must be the address this session activated.
    if diag.source_address != tester {
        warn!(
            %peer,
            frame_source = format!("0x{:04X}", diag.source_address),
            activated = format!("0x{:04X}", tester),
            "diagnostic source does not match activated tester"
        );
        send(
            stream,
            ctx,
            DoipPayload::DiagnosticNack(DiagnosticNack {
                source_address: diag.source_address,
                target_address: diag.target_address,
                code: diag_nack_code::INVALID_SOURCE_ADDRESS,
                previous: Vec::new(),
            }),
        )
        .await?;
        return Ok(());
    }

    let targets = resolve_targets(&ctx.config, diag.target_address);
    if targets.is_empty() {
        warn!(
            %peer,
            target = format!("0x{:04X}", diag.target_address),
            "no ECU or functional group for target address"
        );
        send(
            stream,
            ctx,
            DoipPayload::DiagnosticNack(DiagnosticNack {
                source_address: diag.source_address,
                target_address: diag.target_address,
                code: diag_nack_code::UNKNOWN_TARGET_ADDRESS,
                previous: Vec::new(),
            }),
        )
        .await?;
        return Ok(());
    }

    // The transport ACK goes out before any UDS processing or delay.
    send(
        stream,
        ctx,
        DoipPayload::DiagnosticAck(DiagnosticAck {
            source_address: diag.source_address,
            target_address: diag.target_address,
            code: diag_ack_code::ACK,
            previous: Vec::new(),
        }),
    )
    .await?;

    let allowed = partition_by_acl(targets, diag.source_address);
    if allowed.is_empty() {
        warn!(
            %peer,
            tester = format!("0x{:04X}", tester),
            target = format!("0x{:04X}", diag.target_address),
            "tester not allowed by any addressed ECU"
        );
        send(
            stream,
            ctx,
            diagnostic_response(
                diag.target_address,
                tester,
                uds::negative_response(sid, nrc::SECURITY_ACCESS_DENIED),
            ),
        )
        .await?;
        return Ok(());
    }

    let request_hex = hex::to_upper_hex(&diag.user_data);
    for (ecu, mode) in allowed {
        let Some(service) = select_service(ecu, &request_hex, mode) else {
            if mode == AddressMode::Physical {
                info!(
                    ecu = %ecu.name,
                    request = %request_hex,
                    "no scripted service matches request"
                );
                send(
                    stream,
                    ctx,
                    diagnostic_response(
                        ecu.target_address,
                        tester,
                        uds::negative_response(sid, nrc::SERVICE_NOT_SUPPORTED),
                    ),
                )
                .await?;
            }
            continue;
        };

        match execute_service(ecu, service, &request_hex, &diag.user_data, &ctx.cycles) {
            ServiceReply::Silent { service } => {
                info!(
                    ecu = %ecu.name,
                    service = %service,
                    request = %request_hex,
                    "acknowledged without response body"
                );
            }
            ServiceReply::Body {
                service,
                response_index,
                delay_ms,
                bytes,
            } => {
                info!(
                    ecu = %ecu.name,
                    service = %service,
                    request = %request_hex,
                    response_index,
                    delay_ms,
                    "serving scripted response"
                );
                if delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                send(
                    stream,
                    ctx,
                    diagnostic_response(ecu.target_address, tester, bytes),
                )
                .await?;
            }
        }
    }

    Ok(())
}

fn generic_nack(code: u8) -> DoipPayload {
    DoipPayload::GenericNack(GenericNack { code })
}

fn diagnostic_response(source: u16, target: u16, user_data: Vec<u8>) -> DoipPayload {
    DoipPayload::DiagnosticMessage(DiagnosticMessage {
        source_address: source,
        target_address: target,
        user_data,
    })
}

async fn send(stream: &mut TcpStream, ctx: &ServerContext, payload: DoipPayload) -> io::Result<()> {
    let message = DoipMessage::new(ctx.config.protocol_version, payload);
    write_message(stream, &message).await
}
