//! UDP responder
//!
//! One task, one datagram per iteration, no per-peer state. Answers vehicle
//! identification, entity status, and power mode requests; every other
//! datagram is dropped silently (UDP never gets a header NACK).

use std::sync::atomic::Ordering;
use std::sync::Arc;

use doip_wire::{
    DoipMessage, DoipPayload, EntityStatusResponse, PowerModeResponse, VehicleAnnouncement,
};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::server::ServerContext;

/// Synthetic cycle key for the power mode status rotation.
const POWER_MODE_SERVICE: &str = "power_mode";

pub(crate) async fn run_udp_responder(socket: UdpSocket, ctx: Arc<ServerContext>) {
    let mut buf = vec![0u8; 4096];

    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!(error = %e, "UDP receive failed");
                continue;
            }
        };

        let message = match DoipMessage::decode(&buf[..len]) {
            Ok(message) => message,
            Err(e) => {
                debug!(%peer, error = %e, "dropping undecodable UDP datagram");
                continue;
            }
        };
        if message.protocol_version != ctx.config.protocol_version {
            debug!(
                %peer,
                got = format!("0x{:02X}", message.protocol_version),
                "dropping datagram with unexpected protocol version"
            );
            continue;
        }

        let reply = match message.payload {
            DoipPayload::VehicleIdentificationRequest(_) => {
                info!(%peer, "vehicle identification request");
                Some(vehicle_announcement(&ctx))
            }
            DoipPayload::VehicleIdentificationRequestEid(request) => {
                if request.eid == ctx.config.vehicle.eid {
                    info!(%peer, "vehicle identification request by EID");
                    Some(vehicle_announcement(&ctx))
                } else {
                    debug!(%peer, "EID mismatch, dropping identification request");
                    None
                }
            }
            DoipPayload::EntityStatusRequest(_) => {
                info!(%peer, "entity status request");
                Some(entity_status(&ctx))
            }
            DoipPayload::PowerModeRequest(_) => Some(power_mode(&ctx, peer)),
            other => {
                debug!(%peer, payload_type = ?other.payload_type(), "unsupported UDP payload type");
                None
            }
        };

        if let Some(payload) = reply {
            let response = DoipMessage::new(ctx.config.protocol_version, payload);
            if let Err(e) = socket.send_to(&response.encode(), peer).await {
                warn!(%peer, error = %e, "UDP send failed");
            }
        }
    }
}

/// The 33-byte identification response, also broadcast as the startup
/// announcement.
pub(crate) fn vehicle_announcement(ctx: &ServerContext) -> DoipPayload {
    let vehicle = &ctx.config.vehicle;
    DoipPayload::VehicleAnnouncement(VehicleAnnouncement {
        vin: vehicle.vin,
        logical_address: vehicle.logical_address,
        eid: vehicle.eid,
        gid: vehicle.gid,
        further_action: 0x00,
        sync_status: 0x00,
    })
}

fn entity_status(ctx: &ServerContext) -> DoipPayload {
    DoipPayload::EntityStatusResponse(EntityStatusResponse {
        node_type: ctx.config.entity_status.node_type,
        max_open_sockets: ctx.config.network.max_connections.min(u8::MAX as usize) as u8,
        open_sockets: ctx.open_sessions.load(Ordering::Acquire).min(u8::MAX as usize) as u8,
        max_data_size: ctx.config.entity_status.max_data_size,
    })
}

fn power_mode(ctx: &ServerContext, peer: std::net::SocketAddr) -> DoipPayload {
    let statuses = &ctx.config.power_mode.cycle_through;
    let index = ctx.cycles.advance(
        ctx.config.vehicle.logical_address,
        POWER_MODE_SERVICE,
        statuses.len(),
    );
    let status = statuses[index];
    info!(
        %peer,
        status = format!("0x{:02X}", status),
        index,
        "power mode request"
    );
    DoipPayload::PowerModeResponse(PowerModeResponse { status })
}
