//! The distributed Game of Life: grid geometry, the per-cell worker
//! state machine, and the grid runner.
//!
//! Every cell is an independent worker connected to the server over its
//! own WebSocket. Workers never share memory; a cell learns its
//! neighbors' states only through the updates the server relays.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `grid` | neighbor sets, the Conway rule, initial patterns |
//! | `worker` | one cell's session logic and double buffer |
//! | `runner` | reset + jittered spawn of `size²` workers |

// ============================================================================
// Submodules
// ============================================================================

/// Grid geometry and the Conway rule.
pub mod grid;

/// Per-cell worker session logic.
pub mod worker;

/// Reset client and grid runner.
pub mod runner;

// ============================================================================
// Re-exports
// ============================================================================

pub use grid::{Edges, Pattern, neighbors, next_state};
pub use runner::{GridConfig, reset, run_grid};
pub use worker::{WorkerConfig, run_worker};
