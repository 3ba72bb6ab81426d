//! A from-scratch WebSocket stack driving a distributed Conway's Game
//! of Life, where every cell of the grid is its own client connection.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  reset "<size>"   ┌──────────────────────────────┐
//! │ gameoflife │──────────────────►│ life-server                  │
//! │ (client)   │                   │                              │
//! │            │  size² workers    │  Coordinator                 │
//! │ run_worker ├──────────────────►│   connect barrier ──► "sub"  │
//! │  × size²   │  subscriptions    │   subscribe barrier ─► "run" │
//! │            │◄─────────────────►│   publish to subscribers     │
//! └────────────┘  state updates    │   and watchers               │
//!                                  └──────────────┬───────────────┘
//!                 ┌────────────┐   every update   │
//!                 │ watcher    │◄─────────────────┘
//!                 └────────────┘
//! ```
//!
//! Workers exchange per-generation state through the server: each cell
//! subscribes to its neighbors' coordinates, the server relays every
//! broadcast to the matching subscriber set, and the cell advances one
//! generation once a full set of neighbor states for the current step
//! has arrived.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`protocol`] | frame codec, handshake admission, text message grammar |
//! | [`transport`] | session state machine and client dialer |
//! | [`coordinator`] | barriers, subscriber registry, watcher fan-out |
//! | [`server`] | accept loop, upgrade hook, endpoint handlers |
//! | [`life`] | Conway rule, neighborhood, worker and grid runners |
//! | [`error`] | crate-wide error taxonomy |

// ============================================================================
// Modules
// ============================================================================

/// Crate-wide error taxonomy.
pub mod error;

/// Process-unique connection identifiers.
pub mod identifiers;

/// Wire-level protocol: frames, handshake, message grammar.
pub mod protocol;

/// Message-level transport.
pub mod transport;

/// Grid lifecycle coordination.
pub mod coordinator;

/// The game server.
pub mod server;

/// The game of life itself.
pub mod life;

// ============================================================================
// Re-exports
// ============================================================================

pub use coordinator::{Coordinator, Latch, LatchWait};
pub use error::{Error, Result};
pub use identifiers::PeerId;
pub use protocol::{Frame, Opcode, Role};
pub use server::Server;
pub use transport::{Message, Session, connect};
