//! Wire protocol: WebSocket framing, handshake admission, and the
//! application's text messages.
//!
//! # Layers
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | RFC 6455 frame codec over a raw byte stream |
//! | `handshake` | upgrade admission check and accept token |
//! | `message` | space-separated text messages of the simulation |
//!
//! The frame codec knows nothing about message semantics; reassembly and
//! control-frame handling live in [`crate::transport`].

// ============================================================================
// Submodules
// ============================================================================

/// RFC 6455 frame codec.
pub mod frame;

/// Upgrade handshake admission.
pub mod handshake;

/// Application-level text messages.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{Frame, Opcode, Role, apply_mask};
pub use handshake::{accept_token, check_request, generate_key, response_headers};
pub use message::{Subscription, TOKEN_RUN, TOKEN_SUB, Update, parse_grid_size};
