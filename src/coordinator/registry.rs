//! Server-wide simulation registry.
//!
//! One [`Coordinator`] value holds everything shared by worker and
//! watcher sessions for a simulation run: the expected worker count,
//! the connect/subscribe progress counters with their one-shot latches,
//! the per-cell subscriber sets, and the global watcher set. It is
//! passed by reference to every task that needs it; there is no state
//! outside it.
//!
//! All mutation is serialized behind one mutex, so counter increments
//! and latch firing are exactly-once under concurrent calls. Nothing
//! here awaits while holding the lock; deliveries go through unbounded
//! outbound queues.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::coordinator::latch::Latch;
use crate::error::{Error, Result};
use crate::identifiers::PeerId;

// ============================================================================
// Outbox
// ============================================================================

/// Sending side of one peer's outbound queue.
///
/// The coordinator's subscriber and watcher sets hold these, never the
/// sessions themselves: sessions stay owned by their connection task,
/// and a disconnecting peer is pruned from every set it joined.
#[derive(Debug, Clone)]
pub struct Outbox {
    id: PeerId,
    tx: UnboundedSender<String>,
}

impl Outbox {
    /// Creates an outbox over a peer's outbound queue.
    #[must_use]
    pub fn new(id: PeerId, tx: UnboundedSender<String>) -> Self {
        Self { id, tx }
    }

    /// Returns the owning peer's ID.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> PeerId {
        self.id
    }

    /// Returns `true` once the peer's pump has shut down.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queues a message; returns `false` if the peer is gone.
    pub fn send(&self, message: &str) -> bool {
        self.tx.send(message.to_owned()).is_ok()
    }
}

// ============================================================================
// Inner state
// ============================================================================

/// Everything `reset` replaces atomically.
struct Inner {
    /// Bumped by every reset; waiters compare it to detect staleness.
    epoch: u64,
    /// Grid edge length.
    size: u16,
    /// Worker count the barriers wait for (`size²`).
    expected: u32,
    /// Workers connected so far; monotonic until reset.
    connected: u32,
    /// Workers done subscribing so far; monotonic until reset.
    subscribed: u32,
    connect_latch: Arc<Latch>,
    subscribe_latch: Arc<Latch>,
    /// Per-cell subscriber sets, row-major `size × size`.
    subscribers: Vec<FxHashMap<PeerId, Outbox>>,
}

impl Inner {
    fn empty(epoch: u64, size: u16) -> Self {
        let cells = size as usize * size as usize;
        Self {
            epoch,
            size,
            expected: size as u32 * size as u32,
            connected: 0,
            subscribed: 0,
            connect_latch: Arc::new(Latch::new()),
            subscribe_latch: Arc::new(Latch::new()),
            subscribers: (0..cells).map(|_| FxHashMap::default()).collect(),
        }
    }

    fn cell_index(&self, (row, col): (u16, u16)) -> Result<usize> {
        if row >= self.size || col >= self.size {
            return Err(Error::sequencing(format!(
                "coordinate ({row}, {col}) outside the {0}×{0} grid",
                self.size
            )));
        }
        Ok(row as usize * self.size as usize + col as usize)
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Shared state for one simulation run.
///
/// Run state machine: `idle → connecting → subscribing → running`,
/// re-entered via [`Coordinator::reset`] from any state. Global
/// watchers persist across resets.
pub struct Coordinator {
    inner: Mutex<Inner>,
    watchers: Mutex<FxHashMap<PeerId, Outbox>>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    /// Creates an idle coordinator; no workers are expected until the
    /// first [`Coordinator::reset`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::empty(0, 0)),
            watchers: Mutex::new(FxHashMap::default()),
        }
    }

    /// Replaces the whole run state for a `size × size` grid.
    ///
    /// Counters are zeroed, fresh latches installed and an empty
    /// subscriber grid built, all under one lock; there are no partial
    /// resets. Latches discarded here are cancelled so their waiters
    /// abort instead of hanging. Returns the new epoch.
    pub fn reset(&self, size: u16) -> u64 {
        let mut inner = self.inner.lock();
        let epoch = inner.epoch + 1;
        let stale = std::mem::replace(&mut *inner, Inner::empty(epoch, size));
        drop(inner);

        stale.connect_latch.cancel();
        stale.subscribe_latch.cancel();

        info!(size, expected = size as u32 * size as u32, epoch, "coordinator reset");
        epoch
    }

    /// Returns the current reset epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    /// Fails with a sequencing error if a reset happened since `epoch`.
    pub fn verify_epoch(&self, epoch: u64) -> Result<()> {
        let current = self.inner.lock().epoch;
        if current == epoch {
            Ok(())
        } else {
            Err(Error::sequencing(format!(
                "simulation was reset (epoch {current}, expected {epoch})"
            )))
        }
    }

    /// Returns the grid edge length of the current run.
    #[must_use]
    pub fn grid_size(&self) -> u16 {
        self.inner.lock().size
    }

    /// Returns the expected worker count of the current run.
    #[must_use]
    pub fn expected(&self) -> u32 {
        self.inner.lock().expected
    }

    /// Returns how many workers have connected this run.
    #[must_use]
    pub fn connected(&self) -> u32 {
        self.inner.lock().connected
    }

    /// Returns how many workers have finished subscribing this run.
    #[must_use]
    pub fn subscribed(&self) -> u32 {
        self.inner.lock().subscribed
    }

    /// Records one worker connection.
    ///
    /// Fires the connect barrier exactly once, the instant the counter
    /// reaches the expected count. Returns the barrier handle to await
    /// and the epoch to re-check after waking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sequencing`] if no run is configured.
    pub fn on_worker_connected(&self) -> Result<(Arc<Latch>, u64)> {
        let mut inner = self.inner.lock();
        if inner.expected == 0 {
            return Err(Error::sequencing("no simulation configured; reset first"));
        }
        inner.connected += 1;
        if inner.connected == inner.expected {
            debug!(connected = inner.connected, "all workers connected");
            inner.connect_latch.fire();
        } else if inner.connected % 100 == 0 {
            debug!(connected = inner.connected, expected = inner.expected, "workers connected");
        }
        Ok((Arc::clone(&inner.connect_latch), inner.epoch))
    }

    /// Records one worker having finished its subscriptions.
    ///
    /// Fires the subscribe barrier exactly once at the expected count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sequencing`] if no run is configured.
    pub fn on_worker_subscribed(&self) -> Result<(Arc<Latch>, u64)> {
        let mut inner = self.inner.lock();
        if inner.expected == 0 {
            return Err(Error::sequencing("no simulation configured; reset first"));
        }
        inner.subscribed += 1;
        if inner.subscribed == inner.expected {
            debug!(subscribed = inner.subscribed, "all workers subscribed");
            inner.subscribe_latch.fire();
        } else if inner.subscribed % 100 == 0 {
            debug!(subscribed = inner.subscribed, expected = inner.expected, "workers subscribed");
        }
        Ok((Arc::clone(&inner.subscribe_latch), inner.epoch))
    }

    /// Adds a peer to a cell's subscriber set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sequencing`] for a coordinate outside the grid.
    pub fn subscribe(&self, coord: (u16, u16), outbox: Outbox) -> Result<()> {
        let mut inner = self.inner.lock();
        let index = inner.cell_index(coord)?;
        inner.subscribers[index].insert(outbox.id(), outbox);
        Ok(())
    }

    /// Removes a peer from every listed subscriber set.
    ///
    /// Called on disconnect; a set never holds a dangling peer.
    /// Coordinates from a previous epoch that no longer fit the grid are
    /// skipped.
    pub fn unsubscribe_all(&self, peer: PeerId, coords: &[(u16, u16)]) {
        let mut inner = self.inner.lock();
        for &coord in coords {
            if let Ok(index) = inner.cell_index(coord) {
                inner.subscribers[index].remove(&peer);
            }
        }
    }

    /// Registers a global watcher; it receives every publish.
    pub fn add_watcher(&self, outbox: Outbox) {
        debug!(peer = %outbox.id(), "watcher connected");
        self.watchers.lock().insert(outbox.id(), outbox);
    }

    /// Removes a global watcher.
    pub fn remove_watcher(&self, peer: PeerId) {
        debug!(peer = %peer, "watcher disconnected");
        self.watchers.lock().remove(&peer);
    }

    /// Delivers a message to a cell's subscribers and all watchers.
    ///
    /// Peers whose pump already shut down are skipped. Returns the
    /// number of queues the message reached.
    pub fn publish(&self, coord: (u16, u16), message: &str) -> usize {
        let mut delivered = 0;

        {
            let inner = self.inner.lock();
            if let Ok(index) = inner.cell_index(coord) {
                for outbox in inner.subscribers[index].values() {
                    if !outbox.is_closed() && outbox.send(message) {
                        delivered += 1;
                    }
                }
            }
        }

        for outbox in self.watchers.lock().values() {
            if !outbox.is_closed() && outbox.send(message) {
                delivered += 1;
            }
        }

        delivered
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    use crate::coordinator::latch::LatchWait;

    fn outbox() -> (Outbox, UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Outbox::new(PeerId::next(), tx), rx)
    }

    #[test]
    fn test_reset_replaces_everything() {
        let coordinator = Coordinator::new();
        assert_eq!(coordinator.expected(), 0);

        let epoch = coordinator.reset(3);
        assert_eq!(coordinator.expected(), 9);
        assert_eq!(coordinator.grid_size(), 3);
        assert_eq!(coordinator.connected(), 0);
        assert_eq!(coordinator.epoch(), epoch);

        coordinator.on_worker_connected().unwrap();
        let epoch2 = coordinator.reset(2);
        assert_eq!(coordinator.expected(), 4);
        assert_eq!(coordinator.connected(), 0);
        assert!(epoch2 > epoch);
    }

    #[test]
    fn test_connected_before_reset_rejected() {
        let coordinator = Coordinator::new();
        assert!(coordinator.on_worker_connected().is_err());
        assert!(coordinator.on_worker_subscribed().is_err());
    }

    #[tokio::test]
    async fn test_connect_barrier_fires_exactly_at_expected() {
        let coordinator = Coordinator::new();
        coordinator.reset(2); // expected = 4

        let mut latches = Vec::new();
        for n in 1..=3u32 {
            let (latch, _) = coordinator.on_worker_connected().unwrap();
            assert!(!latch.is_fired(), "fired early at {n}");
            latches.push(latch);
        }

        let (latch, _) = coordinator.on_worker_connected().unwrap();
        assert!(latch.is_fired());
        for latch in &latches {
            assert_eq!(latch.wait().await, LatchWait::Fired);
        }

        // Calls past expected must not re-fire anything.
        let (latch, _) = coordinator.on_worker_connected().unwrap();
        assert!(latch.is_fired());
        assert_eq!(coordinator.connected(), 5);
    }

    #[tokio::test]
    async fn test_stale_waiter_cancelled_by_reset() {
        let coordinator = Arc::new(Coordinator::new());
        coordinator.reset(2);

        let (latch, epoch) = coordinator.on_worker_connected().unwrap();
        let waiter = tokio::spawn(async move { latch.wait().await });
        tokio::task::yield_now().await;

        coordinator.reset(2);

        let outcome = timeout(Duration::from_secs(5), waiter)
            .await
            .expect("stale waiter must not hang")
            .unwrap();
        assert_eq!(outcome, LatchWait::Cancelled);
        assert!(coordinator.verify_epoch(epoch).is_err());
    }

    #[test]
    fn test_publish_reaches_subscribers_and_watchers() {
        let coordinator = Coordinator::new();
        coordinator.reset(2);

        let (sub, mut sub_rx) = outbox();
        let (watcher, mut watch_rx) = outbox();
        coordinator.subscribe((1, 1), sub).unwrap();
        coordinator.add_watcher(watcher);

        let delivered = coordinator.publish((1, 1), "0 1 1 1");
        assert_eq!(delivered, 2);
        assert_eq!(sub_rx.try_recv().unwrap(), "0 1 1 1");
        assert_eq!(watch_rx.try_recv().unwrap(), "0 1 1 1");

        // Another cell: only the watcher hears it.
        let delivered = coordinator.publish((0, 0), "0 0 0 0");
        assert_eq!(delivered, 1);
        assert!(sub_rx.try_recv().is_err());
        assert_eq!(watch_rx.try_recv().unwrap(), "0 0 0 0");
    }

    #[test]
    fn test_unsubscribe_all_prunes_every_set() {
        let coordinator = Coordinator::new();
        coordinator.reset(3);

        let (sub, mut rx) = outbox();
        let peer = sub.id();
        let coords = [(0, 0), (0, 1), (1, 2)];
        for &coord in &coords {
            coordinator.subscribe(coord, sub.clone()).unwrap();
        }

        coordinator.unsubscribe_all(peer, &coords);
        for &coord in &coords {
            assert_eq!(coordinator.publish(coord, "x"), 0, "{coord:?}");
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_skips_closed_peers() {
        let coordinator = Coordinator::new();
        coordinator.reset(2);

        let (sub, rx) = outbox();
        coordinator.subscribe((0, 0), sub).unwrap();
        drop(rx);

        assert_eq!(coordinator.publish((0, 0), "x"), 0);
    }

    #[test]
    fn test_watchers_persist_across_resets() {
        let coordinator = Coordinator::new();
        coordinator.reset(2);

        let (watcher, mut rx) = outbox();
        coordinator.add_watcher(watcher);

        coordinator.reset(4);
        coordinator.publish((3, 3), "0 3 3 1");
        assert_eq!(rx.try_recv().unwrap(), "0 3 3 1");
    }

    #[test]
    fn test_subscribe_out_of_bounds_rejected() {
        let coordinator = Coordinator::new();
        coordinator.reset(2);
        let (sub, _rx) = outbox();
        assert!(coordinator.subscribe((2, 0), sub).is_err());
    }
}
