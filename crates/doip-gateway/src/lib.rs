//! Scripted DoIP gateway server core.
//!
//! Emulates a vehicle gateway with a configurable set of virtual ECUs over
//! TCP/UDP port 13400. Diagnostic testers activate a routing session over
//! TCP and exchange UDS request/response traffic with the scripted ECUs;
//! vehicle identification, entity status, and power mode requests are
//! answered over UDP.
//!
//! The entry point is [`Server`]: bind it with a resolved
//! [`GatewayConfig`](doip_config::GatewayConfig), then drive it with
//! [`Server::run`] (serves until ctrl-c) or
//! [`Server::run_until`] (tests supply their own shutdown future).

mod cycle;
mod error;
mod matcher;
mod routing;
mod server;
mod session;
mod udp;
pub mod uds;

pub use cycle::CycleTable;
pub use error::GatewayError;
pub use matcher::{execute_service, select_service, AddressMode, ServiceReply};
pub use routing::{partition_by_acl, resolve_targets};
pub use server::Server;
