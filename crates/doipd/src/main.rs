//! doipd - Scripted DoIP gateway daemon
//!
//! Serves a configurable set of virtual ECUs over DoIP (ISO 13400-2) so
//! diagnostic testers can exercise UDS traffic against scripted responses.
//!
//! # Usage
//!
//! ```bash
//! doipd --gateway-config config/gateway.yml
//! doipd --gateway-config config/gateway.yml --host 0.0.0.0 --port 13400
//! ```
//!
//! Exit codes: 0 clean shutdown, 1 configuration error, 2 bind error,
//! 3 internal error.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use doip_gateway::{GatewayError, Server};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "doipd")]
#[command(about = "Scripted DoIP gateway for diagnostic tooling")]
struct Args {
    /// Path to the root gateway configuration document
    #[arg(long)]
    gateway_config: PathBuf,

    /// Override the configured bind address
    #[arg(long)]
    host: Option<String>,

    /// Override the configured port
    #[arg(long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "doipd=debug,doip_gateway=debug,doip_config=debug,doip_wire=debug"
    } else {
        "doipd=info,doip_gateway=info,doip_config=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    info!(config = %args.gateway_config.display(), "starting doipd");

    let mut config = match doip_config::load_gateway_config(&args.gateway_config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration error");
            return ExitCode::from(1);
        }
    };

    if let Some(host) = args.host {
        config.network.host = host;
    }
    if let Some(port) = args.port {
        config.network.port = port;
    }

    info!(
        gateway = %config.name,
        vin = %config.vin_str(),
        ecus = config.ecus.len(),
        services = config.service_count(),
        "configuration loaded"
    );

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "bind error");
            return ExitCode::from(2);
        }
    };

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ GatewayError::Bind { .. }) => {
            error!(error = %e, "bind error");
            ExitCode::from(2)
        }
        Err(e) => {
            error!(error = %e, "internal error");
            ExitCode::from(3)
        }
    }
}
