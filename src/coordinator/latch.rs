//! One-shot, multi-waiter barrier.
//!
//! A [`Latch`] releases every waiter exactly once, the instant it is
//! fired. The coordinator fires one when its counter reaches the
//! expected worker count, and cancels discarded latches on `reset` so
//! stale waiters abort instead of hanging.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::Notify;

// ============================================================================
// States
// ============================================================================

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Outcome of [`Latch::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchWait {
    /// The latch fired; proceed.
    Fired,
    /// The latch was discarded by a reset; abort cleanly.
    Cancelled,
}

// ============================================================================
// Latch
// ============================================================================

/// Broadcast-once signal.
///
/// State moves `pending → fired` or `pending → cancelled`, never back,
/// and at most one transition wins under concurrent calls.
#[derive(Debug, Default)]
pub struct Latch {
    state: AtomicU8,
    notify: Notify,
}

impl Latch {
    /// Creates a pending latch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the latch, waking every waiter.
    ///
    /// Returns `true` if this call performed the transition; repeat
    /// calls and calls on a cancelled latch return `false`.
    pub fn fire(&self) -> bool {
        self.transition(FIRED)
    }

    /// Cancels the latch, waking every waiter with [`LatchWait::Cancelled`].
    ///
    /// Returns `true` if this call performed the transition.
    pub fn cancel(&self) -> bool {
        self.transition(CANCELLED)
    }

    /// Returns `true` once fired.
    #[inline]
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.state.load(Ordering::Acquire) == FIRED
    }

    /// Suspends until the latch fires or is cancelled.
    ///
    /// Returns immediately if the transition already happened. Not
    /// individually cancellable: the only ways out are `fire` and
    /// `cancel`.
    pub async fn wait(&self) -> LatchWait {
        loop {
            // Register interest before re-checking the state, so a
            // transition between the check and the await still wakes us.
            let notified = self.notify.notified();
            match self.state.load(Ordering::Acquire) {
                FIRED => return LatchWait::Fired,
                CANCELLED => return LatchWait::Cancelled,
                _ => notified.await,
            }
        }
    }

    fn transition(&self, target: u8) -> bool {
        let won = self
            .state
            .compare_exchange(PENDING, target, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.notify.notify_waiters();
        }
        won
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::timeout;
    use tokio_test::{assert_pending, assert_ready};

    #[tokio::test]
    async fn test_wait_after_fire_returns_immediately() {
        let latch = Latch::new();
        assert!(latch.fire());
        assert_eq!(latch.wait().await, LatchWait::Fired);
    }

    #[tokio::test]
    async fn test_wait_is_pending_until_fired() {
        let latch = Latch::new();
        let mut wait = tokio_test::task::spawn(latch.wait());

        assert_pending!(wait.poll());
        latch.fire();
        assert_eq!(assert_ready!(wait.poll()), LatchWait::Fired);
    }

    #[tokio::test]
    async fn test_fire_releases_all_waiters() {
        let latch = Arc::new(Latch::new());

        let waiters: Vec<_> = (0..32)
            .map(|_| {
                let latch = Arc::clone(&latch);
                tokio::spawn(async move { latch.wait().await })
            })
            .collect();

        // Let the waiters park.
        tokio::task::yield_now().await;
        latch.fire();

        for waiter in waiters {
            let outcome = timeout(Duration::from_secs(5), waiter)
                .await
                .expect("waiter should resume")
                .unwrap();
            assert_eq!(outcome, LatchWait::Fired);
        }
    }

    #[tokio::test]
    async fn test_fire_is_exactly_once() {
        let latch = Latch::new();
        assert!(latch.fire());
        assert!(!latch.fire());
        assert!(!latch.cancel());
        assert!(latch.is_fired());
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiters_with_cancelled() {
        let latch = Arc::new(Latch::new());
        let waiter = {
            let latch = Arc::clone(&latch);
            tokio::spawn(async move { latch.wait().await })
        };

        tokio::task::yield_now().await;
        assert!(latch.cancel());

        let outcome = timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter should resume")
            .unwrap();
        assert_eq!(outcome, LatchWait::Cancelled);
        assert!(!latch.is_fired());
    }

    #[tokio::test]
    async fn test_concurrent_fire_single_winner() {
        let latch = Arc::new(Latch::new());
        let attempts: Vec<_> = (0..16)
            .map(|_| {
                let latch = Arc::clone(&latch);
                tokio::spawn(async move { latch.fire() })
            })
            .collect();

        let mut wins = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }
}
