//! Server startup and lifecycle

use std::future::Future;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::net::TcpListener;
use tracing::info;

use crate::routes;
use crate::state::AppState;

/// Run the HTTP surface until the shutdown future resolves
pub async fn run_server(
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let config = state.config.clone();
    let app = routes::create_router(state);
    let addr = config.bind_addr();

    if config.tls_enabled() {
        let tls = RustlsConfig::from_pem_file(
            config.tls_cert.as_ref().expect("checked by tls_enabled"),
            config.tls_key.as_ref().expect("checked by tls_enabled"),
        )
        .await?;
        let socket_addr = resolve(&addr)?;

        let handle = Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            shutdown.await;
            shutdown_handle.graceful_shutdown(None);
        });

        info!("dservice listening on https://{addr}");
        axum_server::bind_rustls(socket_addr, tls)
            .handle(handle)
            .serve(app.into_make_service())
            .await?;
    } else {
        let listener = TcpListener::bind(&addr).await?;
        info!("dservice listening on http://{addr}");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
    }

    info!("server shutdown complete");
    Ok(())
}

fn resolve(addr: &str) -> anyhow::Result<SocketAddr> {
    addr.to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("could not resolve bind address {addr}"))
}
