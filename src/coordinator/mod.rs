//! Cross-session synchronization: the one-shot barriers and the
//! server-wide registry.
//!
//! The two barriers are the only cross-session synchronization in the
//! system. They guarantee that no worker proceeds past the subscribe
//! phase until every expected worker has connected and subscribed, and
//! nothing more; message delivery among subscribed peers stays
//! unordered across sessions.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `latch` | broadcast-once barrier with cancellation |
//! | `registry` | counters, subscriber grid, watcher set, publish |

// ============================================================================
// Submodules
// ============================================================================

/// One-shot multi-waiter barrier.
pub mod latch;

/// Server-wide simulation registry.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use latch::{Latch, LatchWait};
pub use registry::{Coordinator, Outbox};
