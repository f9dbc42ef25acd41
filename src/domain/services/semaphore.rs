#[cfg(test)]
#[path = "semaphore_test.rs"]
mod tests;

use std::collections::VecDeque;

use tokio::sync::oneshot;
use tokio::sync::Mutex;

struct SemaphoreState {
    limit: usize,
    active: usize,
    priority_waiters: VecDeque<oneshot::Sender<()>>,
    regular_waiters: VecDeque<oneshot::Sender<()>>,
}

/// Bounds concurrent background work to a fixed limit while letting
/// user-facing callers jump the queue. Priority waiters are always released
/// before regular waiters regardless of arrival order; within a class,
/// resumption is strict FIFO.
pub struct PrioritySemaphore {
    state: Mutex<SemaphoreState>,
}

impl PrioritySemaphore {
    pub fn new(limit: usize) -> PrioritySemaphore {
        return PrioritySemaphore {
            state: Mutex::new(SemaphoreState {
                limit,
                active: 0,
                priority_waiters: VecDeque::new(),
                regular_waiters: VecDeque::new(),
            }),
        };
    }

    /// Returns immediately while a slot is free, otherwise suspends until a
    /// matching [`PrioritySemaphore::release`].
    pub async fn acquire(&self, priority: bool) {
        let waiter = {
            let mut state = self.state.lock().await;
            if state.active < state.limit {
                state.active += 1;
                return;
            }

            let (tx, rx) = oneshot::channel::<()>();
            if priority {
                state.priority_waiters.push_back(tx);
            } else {
                state.regular_waiters.push_back(tx);
            }
            rx
        };

        // The releaser hands the slot over without decrementing, so the
        // active count is already correct when this resolves.
        let _ = waiter.await;
    }

    pub async fn release(&self) {
        let mut state = self.state.lock().await;
        loop {
            let waiter = state
                .priority_waiters
                .pop_front()
                .or_else(|| return state.regular_waiters.pop_front());

            match waiter {
                Some(tx) => {
                    // A failed send means the waiter gave up; pass the slot
                    // to the next in line.
                    if tx.send(()).is_ok() {
                        return;
                    }
                }
                None => {
                    state.active = state.active.saturating_sub(1);
                    return;
                }
            }
        }
    }

    #[cfg(test)]
    pub async fn active_count(&self) -> usize {
        return self.state.lock().await.active;
    }
}
