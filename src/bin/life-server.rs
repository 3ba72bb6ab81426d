//! The game server binary.
//!
//! Binds a listening socket and serves the `/reset/`, `/worker/`,
//! `/watcher/`, and `/test/` endpoints until interrupted.
//!
//! ```text
//! life-server [addr]     default addr: 127.0.0.1:8000
//! ```

use tracing_subscriber::EnvFilter;

use c10k_life::Server;
use c10k_life::error::Result;

const DEFAULT_ADDR: &str = "127.0.0.1:8000";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("c10k_life=info")),
        )
        .with_target(false)
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_owned());

    let server = Server::bind(&addr).await?;
    server.run().await
}
