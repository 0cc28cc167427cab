//! WebSocket server listener
//!
//! Accepts TCP connections, performs the WebSocket handshake, asks the
//! [`UpgradeHandler`] for a room and role and hands admitted connections
//! to the engine.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

use crate::engine::SyncEngine;
use crate::error::Result;
use crate::render::Render;
use crate::server::config::ServerConfig;
use crate::server::handler::{Admission, UpgradeHandler, UpgradeRequest};
use crate::session::{websocket_transport, TransportError};
use crate::store::EstimateStore;

/// WebSocket front end for a [`SyncEngine`]
pub struct SyncServer<H, S, R> {
    config: ServerConfig,
    handler: Arc<H>,
    engine: Arc<SyncEngine<S, R>>,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl<H, S, R> SyncServer<H, S, R>
where
    H: UpgradeHandler,
    S: EstimateStore,
    R: Render,
{
    /// Create a server in front of `engine`
    pub fn new(config: ServerConfig, handler: H, engine: Arc<SyncEngine<S, R>>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            handler: Arc::new(handler),
            engine,
            connection_semaphore,
        }
    }

    /// Engine this server feeds
    pub fn engine(&self) -> &Arc<SyncEngine<S, R>> {
        &self.engine
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until accepting fails to start.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Sync server listening");
        self.accept_loop(&listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Sync server listening");
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = match &self.connection_semaphore {
            Some(sem) => match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            },
            None => None,
        };

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        tracing::debug!(peer = %peer_addr, "New connection");

        let handler = Arc::clone(&self.handler);
        let engine = Arc::clone(&self.engine);
        let handshake_timeout = self.config.handshake_timeout;

        tokio::spawn(async move {
            if let Err(e) =
                serve_connection(socket, peer_addr, handler, engine, handshake_timeout, permit).await
            {
                tracing::debug!(peer = %peer_addr, error = %e, "Connection error");
            }
            tracing::debug!(peer = %peer_addr, "Connection finished");
        });
    }
}

fn capture_request(request: &Request, peer_addr: SocketAddr) -> UpgradeRequest {
    let headers: HashMap<String, String> = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();

    UpgradeRequest {
        path: request.uri().path().to_string(),
        query: request.uri().query().map(str::to_string),
        headers,
        peer_addr,
    }
}

async fn serve_connection<H, S, R>(
    socket: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
    engine: Arc<SyncEngine<S, R>>,
    handshake_timeout: Duration,
    _permit: Option<OwnedSemaphorePermit>,
) -> Result<()>
where
    H: UpgradeHandler,
    S: EstimateStore,
    R: Render,
{
    let mut captured = None;
    let callback = |request: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
        captured = Some(capture_request(request, peer_addr));
        Ok(response)
    };

    let mut ws = tokio::time::timeout(
        handshake_timeout,
        tokio_tungstenite::accept_hdr_async(socket, callback),
    )
    .await
    .map_err(|_| TransportError::Timeout)?
    .map_err(TransportError::from)?;

    let request = captured
        .ok_or_else(|| TransportError::Protocol("upgrade request not captured".to_string()))?;

    match handler.admit(&request).await {
        Admission::Accept { room_id, role } => {
            let transport = websocket_transport(ws).with_peer_addr(peer_addr);
            let session = engine.register_session(transport, room_id, role).await?;
            handler.on_registered(&request, room_id, role).await;

            let exit = session.reader.await;
            tracing::debug!(
                connection_id = %session.connection.id(),
                exit = ?exit,
                "Session ended"
            );
        }
        Admission::Reject(reason) => {
            tracing::info!(peer = %peer_addr, path = %request.path, reason = %reason, "Upgrade rejected");
            let frame = CloseFrame {
                code: CloseCode::Policy,
                reason: reason.into(),
            };
            ws.close(Some(frame)).await.map_err(TransportError::from)?;
        }
    }

    Ok(())
}
