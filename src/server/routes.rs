//! Endpoint handlers.
//!
//! Routing happens on the request path the upgrade hook returns:
//!
//! | Path | Handler | Role |
//! |------|---------|------|
//! | `/worker/` | [`worker`] | one cell: admission, subscriptions, relay |
//! | `/watcher/` | [`watcher`] | read-only fan-out of every update |
//! | `/reset/` | [`reset`] | arm the coordinator for a new grid |
//! | `/test/` | [`echo`] | connectivity check |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::coordinator::{Coordinator, LatchWait};
use crate::error::{Error, Result};
use crate::protocol::{Subscription, TOKEN_RUN, TOKEN_SUB, Update, parse_grid_size};
use crate::server::http::ServerSession;
use crate::server::peer::Peer;

// ============================================================================
// Worker
// ============================================================================

/// Drives one worker connection through admission, subscription, and
/// the relay loop.
///
/// The worker is unsubscribed from every cell it registered for on
/// every exit path, normal or not, so closed peers never linger in the
/// subscriber sets.
pub async fn worker(coordinator: Arc<Coordinator>, session: ServerSession) -> Result<()> {
    let mut peer = Peer::spawn(session);
    let mut coords: Vec<(u16, u16)> = Vec::new();

    let outcome = worker_inner(&coordinator, &mut peer, &mut coords).await;

    coordinator.unsubscribe_all(peer.id(), &coords);
    peer.shutdown();
    outcome
}

async fn worker_inner(
    coordinator: &Coordinator,
    peer: &mut Peer,
    coords: &mut Vec<(u16, u16)>,
) -> Result<()> {
    // Phase 1: wait for the whole grid to connect.
    let (latch, epoch) = coordinator.on_worker_connected()?;
    if latch.wait().await == LatchWait::Cancelled {
        return Err(Error::sequencing("grid was reset while connecting"));
    }
    coordinator.verify_epoch(epoch)?;
    if !peer.send(TOKEN_SUB) {
        return Err(Error::ConnectionClosed);
    }

    // Phase 2: collect subscriptions until the worker says it is done.
    loop {
        let Some(text) = peer.recv().await else {
            return Err(Error::ConnectionClosed);
        };
        match Subscription::parse(&text)? {
            Subscription::Coord { row, col } => {
                coordinator.subscribe((row, col), peer.outbox())?;
                coords.push((row, col));
            }
            Subscription::Done => break,
        }
    }

    // Phase 3: wait for every worker to finish subscribing.
    let (latch, epoch) = coordinator.on_worker_subscribed()?;
    if latch.wait().await == LatchWait::Cancelled {
        return Err(Error::sequencing("grid was reset while subscribing"));
    }
    coordinator.verify_epoch(epoch)?;
    if !peer.send(TOKEN_RUN) {
        return Err(Error::ConnectionClosed);
    }

    // Phase 4: relay every state broadcast to the cell's subscribers.
    while let Some(text) = peer.recv().await {
        let update = Update::parse(&text)?;
        coordinator.publish(update.coord(), &text);
    }

    Ok(())
}

// ============================================================================
// Watcher
// ============================================================================

/// Registers a read-only observer that receives every published update.
pub async fn watcher(coordinator: Arc<Coordinator>, session: ServerSession) -> Result<()> {
    let mut peer = Peer::spawn(session);
    coordinator.add_watcher(peer.outbox());

    // Watchers send nothing; drain until they hang up.
    while let Some(text) = peer.recv().await {
        debug!(peer = %peer.id(), %text, "ignoring message from watcher");
    }

    coordinator.remove_watcher(peer.id());
    peer.shutdown();
    Ok(())
}

// ============================================================================
// Reset
// ============================================================================

/// Arms the coordinator for a grid of the requested size.
pub async fn reset(coordinator: Arc<Coordinator>, session: ServerSession) -> Result<()> {
    let mut session = session;
    let outcome = async {
        let Some(text) = session.recv_text().await? else {
            return Err(Error::ConnectionClosed);
        };
        let size = parse_grid_size(&text)?;
        let epoch = coordinator.reset(size);
        info!(size, epoch, "grid reset");
        Ok(())
    }
    .await;

    if let Err(e) = session.close(Vec::new()).await {
        debug!(error = %e, "close after reset failed");
    }
    outcome
}

// ============================================================================
// Echo
// ============================================================================

/// Three-round echo used to smoke-test the stack end to end.
pub async fn echo(session: ServerSession) -> Result<()> {
    let mut session = session;
    session.send_text("Hello!").await?;
    for i in 0..3 {
        let Some(text) = session.recv_text().await? else {
            warn!("echo peer hung up early");
            return Ok(());
        };
        session.send_text(&format!("{i}. {text}")).await?;
    }
    session.send_text("Goodbye!").await?;
    session.close(Vec::new()).await
}
