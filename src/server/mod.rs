//! The game server: accept loop, upgrade, and routing.
//!
//! One [`Server`] owns the listening socket and a shared
//! [`Coordinator`]. Every accepted connection is upgraded by
//! [`http::upgrade`] and dispatched to a handler in
//! [`routes`] based on the request path.
//!
//! # Endpoints
//!
//! | Path | Purpose |
//! |------|---------|
//! | `/reset/` | arm the coordinator for a `size`×`size` grid |
//! | `/worker/` | one cell of the grid |
//! | `/watcher/` | read-only observer of every update |
//! | `/test/` | echo smoke test |

// ============================================================================
// Submodules
// ============================================================================

/// HTTP upgrade hook.
pub mod http;

/// Per-connection pump.
pub mod peer;

/// Endpoint handlers.
pub mod routes;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info, warn};

use crate::coordinator::Coordinator;
use crate::error::Result;

// ============================================================================
// Server
// ============================================================================

/// Listening socket plus the coordinator every handler shares.
pub struct Server {
    listener: TcpListener,
    coordinator: Arc<Coordinator>,
}

impl Server {
    /// Binds the listening socket.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            coordinator: Arc::new(Coordinator::new()),
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns a `ws://` base URL for the bound address.
    pub fn ws_url(&self) -> Result<String> {
        Ok(format!("ws://{}", self.local_addr()?))
    }

    /// Returns the shared coordinator.
    #[must_use]
    pub fn coordinator(&self) -> Arc<Coordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Accepts connections until the listener fails.
    pub async fn run(self) -> Result<()> {
        info!(addr = %self.local_addr()?, "listening");
        loop {
            let (stream, remote) = self.listener.accept().await?;
            debug!(%remote, "accepted");
            let coordinator = Arc::clone(&self.coordinator);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(coordinator, stream).await {
                    debug!(%remote, error = %e, "connection ended with error");
                }
            });
        }
    }
}

/// Upgrades one connection and hands it to the handler for its path.
async fn handle_connection(coordinator: Arc<Coordinator>, stream: TcpStream) -> Result<()> {
    let (session, path) = http::upgrade(stream).await?;

    match path.trim_matches('/') {
        "worker" => routes::worker(coordinator, session).await,
        "watcher" => routes::watcher(coordinator, session).await,
        "reset" => routes::reset(coordinator, session).await,
        "test" | "test/ws" => routes::echo(session).await,
        other => {
            warn!(path = %other, "unknown endpoint");
            let mut session = session;
            session.close(Vec::new()).await
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use crate::life::{Edges, WorkerConfig, run_worker};
    use crate::transport::connect;

    async fn start_server() -> (String, tokio::task::JoinHandle<()>) {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let url = server.ws_url().unwrap();
        let handle = tokio::spawn(async move {
            let _ = server.run().await;
        });
        (url, handle)
    }

    #[tokio::test]
    async fn test_echo_round_trip() -> anyhow::Result<()> {
        let (url, server) = start_server().await;

        let mut ws = connect(&format!("{url}/test/")).await?;
        assert_eq!(ws.recv_text().await?.as_deref(), Some("Hello!"));
        for i in 0..3 {
            ws.send_text("ping").await?;
            assert_eq!(
                ws.recv_text().await?.as_deref(),
                Some(format!("{i}. ping").as_str())
            );
        }
        assert_eq!(ws.recv_text().await?.as_deref(), Some("Goodbye!"));
        assert!(ws.recv_text().await?.is_none());

        server.abort();
        Ok(())
    }

    #[tokio::test]
    async fn test_bad_handshake_rejected_with_400() {
        let (url, server) = start_server().await;
        let addr = url.strip_prefix("ws://").unwrap();

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(
                b"GET /test/ HTTP/1.1\r\n\
                  Host: localhost\r\n\
                  Connection: keep-alive\r\n\r\n",
            )
            .await
            .unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        let head = String::from_utf8_lossy(&response);
        assert!(head.starts_with("HTTP/1.1 400"), "got: {head}");

        server.abort();
    }

    #[tokio::test]
    async fn test_reset_arms_coordinator() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let url = server.ws_url().unwrap();
        let coordinator = server.coordinator();
        let handle = tokio::spawn(async move {
            let _ = server.run().await;
        });

        let mut ws = connect(&format!("{url}/reset/")).await.unwrap();
        ws.send_text("3").await.unwrap();
        assert!(ws.recv_text().await.unwrap().is_none());

        assert_eq!(coordinator.grid_size(), 3);
        assert_eq!(coordinator.expected(), 9);

        handle.abort();
    }

    #[tokio::test]
    async fn test_small_grid_runs_and_watcher_sees_updates() -> anyhow::Result<()> {
        let (url, server) = start_server().await;

        // Arm a 2x2 grid.
        let mut ws = connect(&format!("{url}/reset/")).await?;
        ws.send_text("2").await?;
        while ws.recv_text().await?.is_some() {}

        let mut watcher = connect(&format!("{url}/watcher/")).await?;

        // Run every cell for two generations, all seeded alive.
        let mut cells = Vec::new();
        for row in 0..2 {
            for col in 0..2 {
                let config = WorkerConfig {
                    row,
                    col,
                    size: 2,
                    edges: Edges::Clip,
                    speed: 50.0,
                    steps: Some(2),
                    initial: Some(true),
                };
                let url = url.clone();
                cells.push(tokio::spawn(async move {
                    run_worker(config, &url).await
                }));
            }
        }
        for cell in cells {
            cell.await??;
        }

        // Every cell has three live neighbors in a fully live 2x2 grid,
        // so every generation stays fully live. Each worker announces
        // its seed plus one update per completed step, so the watcher
        // sees four updates each for steps 0, 1, and 2, order
        // unspecified.
        let mut seen = std::collections::HashMap::new();
        for _ in 0..12 {
            let text = watcher
                .recv_text()
                .await?
                .ok_or_else(|| anyhow::anyhow!("watcher disconnected early"))?;
            let update = crate::protocol::Update::parse(&text)?;
            assert!(update.alive);
            *seen.entry(update.step).or_insert(0u32) += 1;
        }
        assert_eq!(seen.get(&0), Some(&4));
        assert_eq!(seen.get(&1), Some(&4));
        assert_eq!(seen.get(&2), Some(&4));

        server.abort();
        Ok(())
    }
}
