//! Accept loop with connection limits.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{body::Body, http::Request, Extension, Router};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use rustls::ServerConfig;
use rustls_pki_types::CertificateDer;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;

use crate::auth::{CertificateGate, ConnectionAuth};

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("failed to bind: {0}")]
    Bind(std::io::Error),

    #[error("failed to accept: {0}")]
    Accept(std::io::Error),
}

/// Bind the service port on all interfaces.
pub async fn bind(port: u16) -> Result<TcpListener, ListenerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
    let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;
    tracing::info!(address = %local_addr, "Listener bound");
    Ok(listener)
}

/// Serve plaintext HTTP (registered mode; the orchestrator fronts TLS).
pub async fn serve_plain(
    listener: TcpListener,
    app: Router,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    tracing::info!("HTTP listener stopped");
    Ok(())
}

/// Serve TLS with per-connection client certificate capture
/// (standalone mode).
///
/// Every accepted connection gets its certificate verdict computed once
/// and injected into request extensions as [`ConnectionAuth`], which the
/// certificate gate consults per request.
pub async fn serve_tls(
    listener: TcpListener,
    tls_config: Arc<ServerConfig>,
    gate: Arc<CertificateGate>,
    app: Router,
    max_connections: usize,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ListenerError> {
    let acceptor = TlsAcceptor::from(tls_config);
    let connection_limit = Arc::new(Semaphore::new(max_connections));

    loop {
        // Acquire the permit first (backpressure), then accept.
        let permit = connection_limit
            .clone()
            .acquire_owned()
            .await
            .expect("Semaphore closed unexpectedly");

        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("TLS listener stopping");
                return Ok(());
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        let acceptor = acceptor.clone();
                        let gate = gate.clone();
                        let app = app.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, peer_addr, acceptor, gate, app, permit)
                                .await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    acceptor: TlsAcceptor,
    gate: Arc<CertificateGate>,
    app: Router,
    _permit: OwnedSemaphorePermit,
) {
    let tls_stream = match acceptor.accept(stream).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::debug!(peer_addr = %peer_addr, error = %e, "TLS handshake failed");
            return;
        }
    };

    // Chain validation happens at the gate, not in the handshake, so the
    // verdict is computed here and carried for the connection's lifetime.
    let offered: Option<Vec<CertificateDer<'static>>> = tls_stream
        .get_ref()
        .1
        .peer_certificates()
        .map(|certs| certs.iter().map(|c| c.clone().into_owned()).collect());
    let verdict = gate.inspect(offered.as_deref());

    tracing::debug!(peer_addr = %peer_addr, verdict = ?verdict, "Connection established");

    let service = app.layer(Extension(ConnectionAuth::new(verdict)));
    let service = TowerToHyperService::new(
        service.map_request(|req: Request<Incoming>| req.map(Body::new)),
    );

    if let Err(e) = auto::Builder::new(TokioExecutor::new())
        .serve_connection_with_upgrades(TokioIo::new(tls_stream), service)
        .await
    {
        tracing::debug!(peer_addr = %peer_addr, error = %e, "Connection closed with error");
    }
}
