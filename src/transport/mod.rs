//! Message-level transport: the session state machine and the client
//! dialer.
//!
//! # Connection Lifecycle
//!
//! ```text
//! ┌──────────────┐                              ┌──────────────┐
//! │ worker/      │   GET /worker/ HTTP/1.1      │ life-server  │
//! │ watcher      │─────────────────────────────►│              │
//! │ (client)     │◄─────────────────────────────│ 101 + accept │
//! │              │                              │ token        │
//! │ Session      │◄────── frames (masked ─────► │ Session      │
//! │ Role::Client │        client → server)      │ Role::Server │
//! └──────────────┘                              └──────────────┘
//! ```
//!
//! 1. [`client::connect`] dials and validates the 101 response
//! 2. The server's upgrade hook admits the request and hands the raw
//!    stream to [`Session::new`]
//! 3. Both ends exchange text messages until the close handshake
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `session` | protocol state machine, fragmentation, close handshake |
//! | `client` | client-side dial and upgrade |

// ============================================================================
// Submodules
// ============================================================================

/// Session state machine.
pub mod session;

/// Client-side connection establishment.
pub mod client;

// ============================================================================
// Re-exports
// ============================================================================

pub use client::{ClientSession, connect};
pub use session::{Message, Session, SessionEvent, SessionReader, SessionWriter};
