//! Server orchestrator
//!
//! Owns the TCP listener and UDP socket, enforces the connection cap,
//! spawns one task per accepted session plus one for the UDP responder,
//! and handles graceful shutdown: stop accepting, give in-flight sessions
//! the configured timeout to drain, then abort.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use doip_config::GatewayConfig;
use doip_wire::DoipMessage;
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::cycle::CycleTable;
use crate::error::GatewayError;
use crate::session::run_session;
use crate::udp::{run_udp_responder, vehicle_announcement};

/// State shared by the orchestrator, every session task, and the UDP
/// responder. The configuration is immutable; the cycle table carries its
/// own lock; the session counter feeds entity status reporting.
pub(crate) struct ServerContext {
    pub config: Arc<GatewayConfig>,
    pub cycles: Arc<CycleTable>,
    pub open_sessions: AtomicUsize,
}

/// A bound but not yet running gateway server.
pub struct Server {
    ctx: Arc<ServerContext>,
    tcp: TcpListener,
    udp: UdpSocket,
}

impl Server {
    /// Bind the TCP listener and UDP socket on the configured host and
    /// port. For ISO 13400 conformance both should be port 13400; binding
    /// port 0 (tests) assigns each transport its own ephemeral port.
    pub async fn bind(config: GatewayConfig) -> Result<Self, GatewayError> {
        let addr = format!("{}:{}", config.network.host, config.network.port);

        let tcp = TcpListener::bind(&addr)
            .await
            .map_err(|source| GatewayError::Bind {
                protocol: "TCP",
                addr: addr.clone(),
                source,
            })?;
        let udp = UdpSocket::bind(&addr)
            .await
            .map_err(|source| GatewayError::Bind {
                protocol: "UDP",
                addr: addr.clone(),
                source,
            })?;

        let ctx = Arc::new(ServerContext {
            config: Arc::new(config),
            cycles: Arc::new(CycleTable::new()),
            open_sessions: AtomicUsize::new(0),
        });

        Ok(Self { ctx, tcp, udp })
    }

    /// Address of the TCP listener.
    pub fn tcp_addr(&self) -> io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    /// Address of the UDP socket.
    pub fn udp_addr(&self) -> io::Result<SocketAddr> {
        self.udp.local_addr()
    }

    /// The shared response-cycle table, for reset operations.
    pub fn cycles(&self) -> Arc<CycleTable> {
        self.ctx.cycles.clone()
    }

    /// The resolved configuration the server runs with.
    pub fn config(&self) -> Arc<GatewayConfig> {
        self.ctx.config.clone()
    }

    /// Serve until ctrl-c.
    pub async fn run(self) -> Result<(), GatewayError> {
        self.run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }

    /// Serve until `shutdown` completes, then drain in-flight sessions for
    /// up to the configured timeout.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()>,
    {
        let Server { ctx, tcp, udp } = self;

        info!(
            gateway = %ctx.config.name,
            addr = %tcp.local_addr()?,
            ecus = ctx.config.ecus.len(),
            services = ctx.config.service_count(),
            "DoIP gateway listening"
        );

        if ctx.config.announcement.enabled {
            announce(&udp, &ctx).await;
        }

        let udp_task = tokio::spawn(run_udp_responder(udp, ctx.clone()));
        let mut sessions: JoinSet<()> = JoinSet::new();

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                accepted = tcp.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let open = ctx.open_sessions.load(Ordering::Acquire);
                            if open >= ctx.config.network.max_connections {
                                warn!(%peer, open, "connection limit reached, rejecting");
                                drop(stream);
                                continue;
                            }
                            ctx.open_sessions.fetch_add(1, Ordering::AcqRel);
                            info!(%peer, open = open + 1, "TCP connection accepted");
                            let ctx = ctx.clone();
                            sessions.spawn(async move {
                                run_session(stream, peer, ctx.clone()).await;
                                ctx.open_sessions.fetch_sub(1, Ordering::AcqRel);
                                info!(%peer, "session closed");
                            });
                        }
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                }
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
            }
        }

        // Stop accepting, then give in-flight sessions the idle timeout to
        // finish before forcing them down.
        drop(tcp);
        let drain = Duration::from_secs(ctx.config.network.timeout_secs);
        let drained = tokio::time::timeout(drain, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("drain budget exhausted, aborting remaining sessions");
            sessions.abort_all();
        }
        udp_task.abort();

        info!(gateway = %ctx.config.name, "gateway stopped");
        Ok(())
    }
}

/// One gratuitous Vehicle Announcement on startup.
async fn announce(udp: &UdpSocket, ctx: &ServerContext) {
    let target = format!(
        "{}:{}",
        ctx.config.announcement.broadcast, ctx.config.network.port
    );
    let Ok(target) = target.parse::<SocketAddr>() else {
        warn!(%target, "announcement broadcast address is not parseable, skipping");
        return;
    };
    if let Err(e) = udp.set_broadcast(true) {
        warn!(error = %e, "cannot enable broadcast, skipping announcement");
        return;
    }
    let message = DoipMessage::new(ctx.config.protocol_version, vehicle_announcement(ctx));
    match udp.send_to(&message.encode(), target).await {
        Ok(_) => info!(%target, "vehicle announcement broadcast"),
        Err(e) => warn!(%target, error = %e, "vehicle announcement failed"),
    }
}
