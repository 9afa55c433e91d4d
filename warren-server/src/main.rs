//! Warren Server - public ingress for reverse tunnels.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use warren_server::config::ServerConfig;
use warren_server::extauth::ExtAuth;
use warren_server::ingress::{IngressMux, Proto};
use warren_server::listener::PublicListener;
use warren_server::registry::TunnelRegistry;
use warren_server::tls;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();

    FmtSubscriber::builder()
        .with_max_level(if config.debug {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_target(true)
        .init();

    info!("Starting warren-server v{}", env!("CARGO_PKG_VERSION"));
    info!("Domain: {}", config.domain);

    let registry = Arc::new(TunnelRegistry::new());

    // Session gate for the control plane: every session opened against it
    // is authorized once and carries its rights from then on.
    let extauth = Arc::new(ExtAuth::new(config.auth_url.clone(), config.auth_encoding));
    if extauth.is_external() {
        info!("External authorization enabled");
    } else {
        info!("No external authorization configured; sessions get full rights");
    }

    let findme_host = config.findme_host();
    if let Some(host) = &findme_host {
        info!("findme enabled at {host}");
    }

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let http_mux = Arc::new(IngressMux::new(
        registry.clone(),
        Proto::Http,
        findme_host.clone(),
    ));
    let http_listener = PublicListener::bind(http_addr, None, http_mux).await?;
    let http_handle = tokio::spawn(async move {
        if let Err(e) = http_listener.run().await {
            tracing::error!("HTTP listener error: {e}");
        }
    });

    let https_handle = match (&config.cert_path, &config.key_path) {
        (Some(cert_path), Some(key_path)) => {
            let acceptor = tls::tls_acceptor(cert_path, key_path)?;
            let https_addr: SocketAddr = format!("0.0.0.0:{}", config.https_port).parse()?;
            let https_mux = Arc::new(IngressMux::new(registry.clone(), Proto::Https, findme_host));
            let https_listener = PublicListener::bind(https_addr, Some(acceptor), https_mux).await?;
            Some(tokio::spawn(async move {
                if let Err(e) = https_listener.run().await {
                    tracing::error!("HTTPS listener error: {e}");
                }
            }))
        }
        _ => None,
    };

    info!("Server is ready to accept connections");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    http_handle.abort();
    if let Some(handle) = https_handle {
        handle.abort();
    }

    Ok(())
}
