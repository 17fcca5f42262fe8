use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use auditor_server::{app, state::AppState};
use common::AppConfig;
use common::config::{DEFAULT_CONFIG_FILE, ServerSettings};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).json().init();

    let config_path = std::env::var("AUDITOR_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from);
    let config = AppConfig::load(&config_path)?;
    let addr = build_bind_addr(&config.server)?;
    let state = AppState::from_config(&config)?;

    info!("auditor-server listening on http://{addr}");
    info!("retrieve endpoint: http://{addr}/retrieve");
    info!("ask endpoint: http://{addr}/ask");
    info!("metrics endpoint: http://{addr}/metrics");
    if state.generator.is_none() {
        warn!("no [generation] settings, /ask will only answer when nothing is found");
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("auditor-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable, waiting for ctrl-c only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn build_bind_addr(server: &ServerSettings) -> anyhow::Result<SocketAddr> {
    let ip = server.bind_addr.parse::<IpAddr>()?;
    let is_local_default = ip == IpAddr::V4(Ipv4Addr::LOCALHOST);

    if !is_local_default && !server.allow_non_local {
        anyhow::bail!(
            "non-local bind requested for {ip}, set server.allow_non_local = true to opt in"
        );
    }

    Ok(SocketAddr::new(ip, server.port))
}

#[cfg(test)]
mod tests {
    use common::config::ServerSettings;

    use super::build_bind_addr;

    #[test]
    fn defaults_to_localhost() {
        let addr = build_bind_addr(&ServerSettings::default()).expect("default bind addr");
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 38090);
    }

    #[test]
    fn rejects_non_local_without_opt_in() {
        let server = ServerSettings {
            bind_addr: "0.0.0.0".to_string(),
            ..ServerSettings::default()
        };
        let err = build_bind_addr(&server).expect_err("expected rejection");
        assert!(err.to_string().contains("allow_non_local"));

        let opted_in = ServerSettings {
            allow_non_local: true,
            ..server
        };
        assert!(build_bind_addr(&opted_in).is_ok());
    }
}
