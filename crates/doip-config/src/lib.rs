//! Hierarchical configuration for the DoIP gateway simulator.
//!
//! A gateway is described by a tree of YAML documents: the gateway document
//! names the network binding, protocol bytes, and vehicle identity, and
//! references one document per ECU; each ECU document references the service
//! catalog files its UDS service set is drawn from.
//!
//! [`load_gateway_config`] resolves the whole tree into an immutable
//! [`GatewayConfig`]: request patterns normalised (regexes compiled),
//! responses turned into render-ready templates, every cross-reference
//! checked. Configuration is loaded once at startup; nothing here is
//! mutable afterwards.

mod error;
pub mod hex;
mod loader;
mod model;
mod raw;
mod template;

pub use error::ConfigError;
pub use loader::load_gateway_config;
pub use model::{
    AnnouncementConfig, Ecu, EntityStatusConfig, GatewayConfig, NetworkConfig, PowerModeConfig,
    RequestMatcher, ResponseSpec, ServiceEntry, VehicleIdentity,
};
pub use template::ResponseTemplate;
