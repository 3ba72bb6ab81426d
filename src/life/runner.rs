//! Grid runner: resets the coordinator and spawns one worker per cell.

// ============================================================================
// Imports
// ============================================================================

use futures_util::future::join_all;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::life::grid::{Edges, Pattern};
use crate::life::worker::{WorkerConfig, run_worker};
use crate::transport::client::connect;

// ============================================================================
// GridConfig
// ============================================================================

/// Parameters for one simulation run.
#[derive(Debug, Clone)]
pub struct GridConfig {
    /// Server root, e.g. `ws://localhost:8000`.
    pub base_url: String,
    /// Grid edge length.
    pub size: u16,
    /// Edge behavior.
    pub edges: Edges,
    /// Maximum generations per second.
    pub speed: f64,
    /// Step budget; `None` runs until interrupted.
    pub steps: Option<u64>,
    /// Initial configuration; `None` seeds every cell randomly.
    pub pattern: Option<Pattern>,
}

// ============================================================================
// Reset
// ============================================================================

/// Resets the server's coordinator for a `size × size` run.
///
/// Returns once the server has applied the reset and closed the
/// session.
///
/// # Errors
///
/// Handshake or transport failures reaching the `/reset/` endpoint.
pub async fn reset(base_url: &str, size: u16) -> Result<()> {
    let mut ws = connect(&format!("{base_url}/reset/")).await?;
    ws.send_text(&size.to_string()).await?;
    // The server closes after applying the reset.
    while ws.recv().await?.is_some() {}
    Ok(())
}

// ============================================================================
// Run
// ============================================================================

/// Runs one worker for each cell of the grid and waits for all of them.
///
/// Individual worker failures are logged and counted, not propagated:
/// one bad connection must not tear down the other cells.
///
/// # Errors
///
/// Returns [`Error::Sequencing`] if the configuration is unusable
/// (zero size, non-positive speed, or a pattern sized for a different
/// grid).
pub async fn run_grid(config: GridConfig) -> Result<()> {
    if config.size == 0 {
        return Err(Error::sequencing("grid size must be positive"));
    }
    if config.speed <= 0.0 {
        return Err(Error::sequencing("speed must be positive"));
    }
    if let Some(pattern) = &config.pattern
        && pattern.size() != config.size
    {
        return Err(Error::sequencing(format!(
            "pattern is sized for a {}×{} grid, not {}×{}",
            pattern.size(),
            pattern.size(),
            config.size,
            config.size
        )));
    }

    let workers = (0..config.size)
        .flat_map(|row| (0..config.size).map(move |col| (row, col)))
        .map(|(row, col)| {
            let worker = WorkerConfig {
                row,
                col,
                size: config.size,
                edges: config.edges,
                speed: config.speed,
                steps: config.steps,
                initial: config.pattern.as_ref().map(|p| p.alive(row, col)),
            };
            let base_url = config.base_url.clone();
            async move {
                if let Err(e) = run_worker(worker, &base_url).await {
                    warn!(row, col, error = %e, "worker failed");
                    return false;
                }
                true
            }
        });

    info!(
        size = config.size,
        workers = u32::from(config.size) * u32::from(config.size),
        "starting grid"
    );
    let outcomes = join_all(workers).await;
    let failed = outcomes.iter().filter(|ok| !**ok).count();
    if failed > 0 {
        warn!(failed, "workers did not finish cleanly");
    } else {
        info!("all workers finished");
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config(size: u16) -> GridConfig {
        GridConfig {
            base_url: "ws://localhost:0".into(),
            size,
            edges: Edges::Clip,
            speed: 1.0,
            steps: Some(1),
            pattern: None,
        }
    }

    #[tokio::test]
    async fn test_zero_size_rejected() {
        let err = run_grid(config(0)).await.unwrap_err();
        assert!(matches!(err, Error::Sequencing { .. }));
    }

    #[tokio::test]
    async fn test_non_positive_speed_rejected() {
        let mut cfg = config(2);
        cfg.speed = 0.0;
        assert!(run_grid(cfg).await.is_err());
    }

    #[tokio::test]
    async fn test_mismatched_pattern_rejected() {
        let mut cfg = config(4);
        cfg.pattern = Some(Pattern::parse("#", 5, true).unwrap());
        assert!(run_grid(cfg).await.is_err());
    }
}
