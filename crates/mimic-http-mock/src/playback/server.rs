//! Playback listener.

use super::handler::handle_playback_request;
use crate::state::AppState;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Serves scenarios to the clients under test.
pub struct PlaybackServer {
    listener: TcpListener,
    state: Arc<AppState>,
}

impl PlaybackServer {
    pub async fn bind(addr: SocketAddr, state: Arc<AppState>) -> Result<Self, anyhow::Error> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) -> Result<(), anyhow::Error> {
        info!("Mimic playback listening on http://{}", self.local_addr()?);

        loop {
            let (stream, peer) = self.listener.accept().await?;
            let io = TokioIo::new(stream);
            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { handle_playback_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(peer = %peer, "Playback connection error: {}", e);
                }
            });
        }
    }
}
