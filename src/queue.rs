//! Shutdown-aware blocking FIFO.
//!
//! The driver parks caller threads on its button queue and parks command
//! writers on its response queue. When the driver closes, every one of those
//! threads has to wake up with an error instead of blocking forever, so this
//! queue adds one operation over a plain channel:
//! [`interrupt_all_consumers`](InterruptibleQueue::interrupt_all_consumers).
//! After interruption, every pending and every subsequent
//! [`pop`](InterruptibleQueue::pop) fails with [`PopError::Interrupted`]
//! regardless of queue content.
//!
//! Producers never block: an unbounded queue always accepts, and a bounded
//! queue drops via [`push`](InterruptibleQueue::push) when full.

use core::fmt;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Why a [`InterruptibleQueue::pop`] returned without an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// The queue was interrupted; the owning driver is shutting down.
    Interrupted,
    /// The caller's deadline elapsed with the queue still empty.
    TimedOut,
}

struct State<T> {
    items: VecDeque<T>,
    capacity: Option<usize>,
    interrupted: bool,
}

/// A FIFO whose consumers can all be kicked out at shutdown.
pub struct InterruptibleQueue<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

/// Recovers a lock or condvar result, absorbing poison: a panicked holder
/// leaves the protected state consistent enough for shutdown paths.
pub(crate) fn relock<T>(guard: Result<T, PoisonError<T>>) -> T {
    guard.unwrap_or_else(PoisonError::into_inner)
}

impl<T> InterruptibleQueue<T> {
    /// Creates a queue that holds at most `capacity` items.
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity))
    }

    /// Creates a queue with no capacity limit.
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        InterruptibleQueue {
            state: Mutex::new(State {
                items: VecDeque::new(),
                capacity,
                interrupted: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        relock(self.state.lock())
    }

    /// Appends an item unless the queue is full or interrupted.
    ///
    /// Never blocks; a `false` return means the item was dropped.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.lock();
        if state.interrupted {
            return false;
        }
        if let Some(cap) = state.capacity
            && state.items.len() >= cap
        {
            return false;
        }
        state.items.push_back(item);
        self.ready.notify_one();
        true
    }

    /// Removes the oldest item, blocking until one is available.
    ///
    /// With `timeout == None` this waits indefinitely. Interruption wins
    /// over content: once
    /// [`interrupt_all_consumers`](InterruptibleQueue::interrupt_all_consumers)
    /// has run, `pop` fails even if items remain queued.
    pub fn pop(&self, timeout: Option<Duration>) -> Result<T, PopError> {
        let mut state = self.lock();
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if state.interrupted {
                return Err(PopError::Interrupted);
            }
            if let Some(item) = state.items.pop_front() {
                return Ok(item);
            }
            state = match deadline {
                None => relock(self.ready.wait(state)),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(PopError::TimedOut);
                    }
                    relock(self.ready.wait_timeout(state, deadline - now)).0
                }
            };
        }
    }

    /// Wakes every blocked consumer and fails all future pops.
    ///
    /// Any thread currently waiting for an item, and any thread that calls
    /// [`pop`](InterruptibleQueue::pop) afterwards, receives
    /// [`PopError::Interrupted`].
    pub fn interrupt_all_consumers(&self) {
        let mut state = self.lock();
        state.interrupted = true;
        self.ready.notify_all();
    }

    /// Discards all queued items without waking anyone.
    pub fn drain(&self) {
        self.lock().items.clear();
    }
}

impl<T> fmt::Debug for InterruptibleQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("InterruptibleQueue")
            .field("len", &state.items.len())
            .field("capacity", &state.capacity)
            .field("interrupted", &state.interrupted)
            .finish()
    }
}
