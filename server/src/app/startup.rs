use alloc::string;
use core::{
    future::Future,
    net::{IpAddr, SocketAddr},
};
use std::path::Path;

use eyre::WrapErr as _;
use tokio::{net, signal};
use tracing::{info, warn};

use crate::{app::AppState, config, http::create_app};

/// Creates a future that resolves when a shutdown signal is received.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                warn!(%e, "Failed to install SIGTERM handler, only Ctrl-C will stop the server");
                drop(signal::ctrl_c().await);
            }
        }
    }
    #[cfg(not(unix))]
    {
        drop(signal::ctrl_c().await);
    }
}

/// Serves the gateway on an already bound listener until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the listener fails while serving.
pub async fn serve(
    listener: net::TcpListener,
    app_state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> eyre::Result<()> {
    let app = create_app(app_state);
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{}", addr);
    }
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    info!("Received shutdown, shutting down");
    Ok(())
}

/// Loads the config, builds the state and serves until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded, the state cannot be
/// built or the server cannot bind.
pub async fn start(
    config_path: &Path,
    port_override: Option<u16>,
    bind_override: Option<&str>,
) -> eyre::Result<()> {
    info!("Starting HTTP server...");

    let config = config::load(config_path).await?;
    let app_state = AppState::from_config(&config, config_path).await?;

    // Apply optional overrides from CLI/tests
    let listen_port = port_override.unwrap_or(config.server.port);
    let bind_str = bind_override.map_or_else(
        || config.server.bind.clone(),
        string::ToString::to_string,
    );
    let listen_ip: IpAddr = bind_str
        .parse()
        .wrap_err(format!("Invalid bind address: {bind_str}"))?;

    let addr = SocketAddr::from((listen_ip, listen_port));
    let listener = net::TcpListener::bind(addr)
        .await
        .wrap_err(format!("Failed to bind {addr}"))?;

    serve(listener, app_state, shutdown_signal()).await
}
