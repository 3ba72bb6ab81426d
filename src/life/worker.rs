//! Worker session logic: one task per simulated cell.
//!
//! A worker owns no shared simulation state. It connects to the server,
//! rides the two barriers, subscribes to its neighbors, and then
//! advances generations purely by exchanging text messages with them:
//!
//! 1. connect (jittered) and await the connect barrier (`"sub"`)
//! 2. subscribe to its neighbor set, then await the subscribe barrier
//!    (`"run"`)
//! 3. broadcast its own generation-0 state
//! 4. loop: collect neighbor states into the double buffer; when a
//!    generation's slot is full, apply the Conway rule, broadcast, and
//!    throttle
//!
//! Any sequencing violation is fatal to this worker's connection only;
//! the coordinator's counters are untouched by worker failures.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use rand::Rng;
use rustc_hash::FxHashMap;
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::life::grid::{Edges, neighbors, next_state};
use crate::protocol::message::{TOKEN_RUN, TOKEN_SUB, Update};
use crate::transport::client::connect;

// ============================================================================
// Constants
// ============================================================================

/// Initial connects are spread over `size² / RATE` seconds, keeping the
/// connection storm near `RATE` dials per second on average.
const CONNECT_RATE_PER_SEC: f64 = 100.0;

/// A randomly seeded cell starts alive with this probability.
const SEED_ALIVE_PROBABILITY: f64 = 0.25;

// ============================================================================
// WorkerConfig
// ============================================================================

/// Parameters for one cell's worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Cell row.
    pub row: u16,
    /// Cell column.
    pub col: u16,
    /// Grid edge length.
    pub size: u16,
    /// Edge behavior for the neighborhood.
    pub edges: Edges,
    /// Maximum generations per second.
    pub speed: f64,
    /// Step budget; `None` runs until the stream ends.
    pub steps: Option<u64>,
    /// Initial state; `None` seeds randomly.
    pub initial: Option<bool>,
}

// ============================================================================
// StateBuffer
// ============================================================================

/// Double buffer of neighbor states, one slot per generation parity.
///
/// Once we know all neighbors' states at step N we announce our state
/// at step N + 1. Neighbors may then send their states at steps N + 1
/// and N + 2, but never N + 3 (which would need our state at N + 2),
/// so two slots suffice. A slot is consumed (every entry populated)
/// before it is reused two generations later; a second update from the
/// same neighbor for the same parity means the buffers have slipped.
#[derive(Debug)]
pub(crate) struct StateBuffer {
    slots: [Vec<Option<bool>>; 2],
}

impl StateBuffer {
    /// Creates a buffer for `n` neighbors.
    pub(crate) fn new(n: usize) -> Self {
        Self {
            slots: [vec![None; n], vec![None; n]],
        }
    }

    /// Stores a neighbor's state for the slot targeted by `step`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sequencing`] if that neighbor's entry for this
    /// parity is still unconsumed, i.e. an update for the wrong
    /// generation.
    pub(crate) fn store(&mut self, step: u64, index: usize, alive: bool) -> Result<()> {
        let entry = &mut self.slots[(step % 2) as usize][index];
        if entry.is_some() {
            return Err(Error::sequencing(format!(
                "duplicate neighbor state for step {step} (wrong generation parity)"
            )));
        }
        *entry = Some(alive);
        Ok(())
    }

    /// Returns `true` once every entry of `step`'s slot is populated.
    pub(crate) fn is_full(&self, step: u64) -> bool {
        self.slots[(step % 2) as usize].iter().all(Option::is_some)
    }

    /// Counts live neighbors in `step`'s slot.
    pub(crate) fn live_count(&self, step: u64) -> usize {
        self.slots[(step % 2) as usize]
            .iter()
            .filter(|state| **state == Some(true))
            .count()
    }

    /// Clears `step`'s slot for reuse two generations later.
    pub(crate) fn clear(&mut self, step: u64) {
        self.slots[(step % 2) as usize].fill(None);
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Runs one cell's worker to completion.
///
/// `base_url` is the server root, e.g. `ws://localhost:8000`.
///
/// # Errors
///
/// - [`Error::Sequencing`] if the server hands us anything but the
///   expected `"sub"`/`"run"` tokens, an update arrives from a
///   non-neighbor, or a generation's parity slips.
/// - [`Error::Protocol`] / [`Error::Io`] for transport-level failures.
pub async fn run_worker(config: WorkerConfig, base_url: &str) -> Result<()> {
    let WorkerConfig {
        row,
        col,
        size,
        edges,
        speed,
        steps,
        initial,
    } = config;

    // Stable neighbor → slot-index mapping, computed once.
    let neighbor_coords = neighbors(row, col, size, edges);
    let slot_of: FxHashMap<(u16, u16), usize> = neighbor_coords
        .iter()
        .enumerate()
        .map(|(index, &coord)| (coord, index))
        .collect();
    let n = neighbor_coords.len();

    // Jitter the dial so size² workers don't storm the listener.
    let jitter = f64::from(size) * f64::from(size) / CONNECT_RATE_PER_SEC
        * rand::thread_rng().gen_range(0.0..1.0);
    sleep(Duration::from_secs_f64(jitter)).await;

    let mut ws = connect(&format!("{base_url}/worker/")).await?;

    // Wait until all workers are connected.
    expect_token(ws.recv_text().await?, TOKEN_SUB)?;

    // Subscribe to updates sent by neighbors.
    for &(r, c) in &neighbor_coords {
        ws.send_text(&format!("{r} {c}")).await?;
    }
    ws.send_text(TOKEN_SUB).await?;

    // Wait until all workers are subscribed.
    expect_token(ws.recv_text().await?, TOKEN_RUN)?;

    let mut alive = initial
        .unwrap_or_else(|| rand::thread_rng().gen_bool(SEED_ALIVE_PROBABILITY));
    let mut step: u64 = 0;
    let mut buffer = StateBuffer::new(n);
    let throttle = Duration::from_secs_f64(1.0 / speed);

    debug!(row, col, n, alive, "worker running");
    ws.send_text(
        &Update {
            step: 0,
            row,
            col,
            alive,
        }
        .to_string(),
    )
    .await?;

    // Gather neighbor updates; announce our own as slots complete.
    while steps.is_none_or(|budget| step < budget) {
        let Some(text) = ws.recv_text().await? else {
            break;
        };
        let update = Update::parse(&text)?;

        let Some(&index) = slot_of.get(&update.coord()) else {
            return Err(Error::sequencing(format!(
                "update from ({}, {}), which is not a neighbor of ({row}, {col})",
                update.row, update.col
            )));
        };
        buffer.store(update.step, index, update.alive)?;

        if buffer.is_full(update.step) {
            if update.step != step {
                return Err(Error::sequencing(format!(
                    "completed a slot for step {}, but this worker is at step {step}",
                    update.step
                )));
            }
            let live = buffer.live_count(step);
            buffer.clear(step);
            alive = next_state(alive, live);
            step += 1;
            trace!(row, col, step, alive, live, "generation advanced");
            ws.send_text(
                &Update {
                    step,
                    row,
                    col,
                    alive,
                }
                .to_string(),
            )
            .await?;
            sleep(throttle).await;
        }
    }

    ws.close(Vec::new()).await
}

/// Requires the next server message to be a specific control token.
fn expect_token(message: Option<String>, token: &str) -> Result<()> {
    match message {
        Some(text) if text == token => Ok(()),
        Some(text) => Err(Error::unexpected_token(token, &text)),
        None => Err(Error::ConnectionClosed),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_fills_and_clears_by_parity() {
        let mut buffer = StateBuffer::new(3);

        for index in 0..3 {
            assert!(!buffer.is_full(0));
            buffer.store(0, index, index == 1).unwrap();
        }
        assert!(buffer.is_full(0));
        assert_eq!(buffer.live_count(0), 1);

        // The odd slot is independent.
        assert!(!buffer.is_full(1));
        buffer.store(1, 0, true).unwrap();

        buffer.clear(0);
        assert!(!buffer.is_full(0));
        // Step 2 reuses the even slot after the clear.
        buffer.store(2, 0, true).unwrap();
    }

    #[test]
    fn test_wrong_parity_update_rejected() {
        let mut buffer = StateBuffer::new(2);
        buffer.store(0, 0, true).unwrap();

        // Same neighbor, same parity, slot not consumed: step 2 targets
        // the slot step 0 still occupies.
        let err = buffer.store(2, 0, false).unwrap_err();
        assert!(matches!(err, Error::Sequencing { .. }));
    }

    #[test]
    fn test_expect_token() {
        assert!(expect_token(Some("sub".into()), "sub").is_ok());
        assert!(matches!(
            expect_token(Some("0 1 1 0".into()), "run").unwrap_err(),
            Error::Sequencing { .. }
        ));
        assert!(matches!(
            expect_token(None, "run").unwrap_err(),
            Error::ConnectionClosed
        ));
    }
}
