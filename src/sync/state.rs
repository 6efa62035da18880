use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;

/// Counted latch gating the process-wide "initial sync completed" event.
///
/// `start` arms one unit per enabled stream of every registered agent (plus
/// a hold covering the enumeration itself); each stream's first report
/// releases one unit. The latch closes exactly once, when the count reaches
/// zero, and never reopens.
#[derive(Debug)]
pub(super) struct InitSyncBarrier {
    state: Mutex<BarrierState>,
    closed_tx: watch::Sender<bool>,
}

#[derive(Debug)]
struct BarrierState {
    outstanding: u64,
    closed: bool,
}

impl InitSyncBarrier {
    pub fn new() -> Self {
        let (closed_tx, _) = watch::channel(false);

        Self {
            state: Mutex::new(BarrierState {
                outstanding: 0,
                closed: false,
            }),
            closed_tx,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, BarrierState> {
        self.state
            .lock()
            .expect("`InitSyncBarrier` mutex can't be poisoned")
    }

    /// Arms `n` additional units. Returns `false` (without arming) once the
    /// latch has closed; callers must then skip their bookkeeping as well.
    pub fn arm(&self, n: u64) -> bool {
        let mut state = self.lock_state();
        if state.closed {
            return false;
        }
        state.outstanding += n;
        true
    }

    /// Releases one unit. Returns `true` iff a unit was released while the
    /// latch was still open. Closes the latch when the count reaches zero.
    pub fn done(&self) -> bool {
        let mut state = self.lock_state();
        if state.closed || state.outstanding == 0 {
            return false;
        }
        state.outstanding -= 1;
        if state.outstanding == 0 {
            state.closed = true;
            drop(state);

            // Ignore no-receivers errors
            let _ = self.closed_tx.send(true);
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    /// Waits until the latch closes. Returns immediately if it already has.
    pub async fn wait(&self) {
        let mut closed_rx = self.closed_tx.subscribe();

        // The sender lives on `self`, so the channel can't close mid-wait
        let _ = closed_rx.wait_for(|closed| *closed).await;
    }
}

#[cfg(test)]
mod tests {
    use tokio::time;

    use super::*;

    #[test]
    fn closes_when_count_reaches_zero() {
        let barrier = InitSyncBarrier::new();
        assert!(!barrier.is_closed());

        assert!(barrier.arm(2));
        assert!(barrier.done());
        assert!(!barrier.is_closed());
        assert!(barrier.done());
        assert!(barrier.is_closed());
    }

    #[test]
    fn rejects_arm_and_done_after_close() {
        let barrier = InitSyncBarrier::new();
        barrier.arm(1);
        barrier.done();
        assert!(barrier.is_closed());

        assert!(!barrier.arm(1));
        assert!(!barrier.done());
        assert!(barrier.is_closed());
    }

    #[test]
    fn unbalanced_done_is_ignored() {
        let barrier = InitSyncBarrier::new();
        assert!(!barrier.done());
        assert!(!barrier.is_closed());
    }

    #[tokio::test]
    async fn wait_returns_once_closed() {
        let barrier = std::sync::Arc::new(InitSyncBarrier::new());
        barrier.arm(1);

        let waiter = {
            let barrier = barrier.clone();
            tokio::spawn(async move { barrier.wait().await })
        };

        time::sleep(time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        barrier.done();
        time::timeout(time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter wakes up")
            .expect("waiter task joins");

        // An already-closed latch never blocks
        barrier.wait().await;
    }
}
