//! Cancellable single-shot timers for Doodlewire rooms.
//!
//! A [`TimerManager`] schedules a future to run once after a delay and
//! hands back a [`TimerHandle`]. It has no idea what the future does;
//! rooms use it to push a synthetic "timer fired" event into their own
//! event queue.
//!
//! # Cancellation
//!
//! Each handle carries an atomic state that moves from `Pending` to
//! either `Fired` or `Cancelled`, exactly once. The timer task only runs
//! the callback if it wins `Pending → Fired`; [`TimerHandle::cancel`]
//! only succeeds if it wins `Pending → Cancelled`. So once `cancel`
//! returns `true` the callback can never run, and `cancel` is safe to
//! call any number of times on a fired or cancelled handle.
//!
//! A callback that already fired may have left an event in flight. The
//! owner compares [`TimerHandle::id`] against the event's id to discard
//! it.
//!
//! ```ignore
//! let handle = timers.schedule(room_id, Duration::from_secs(60), move |timer_id| async move {
//!     let _ = events.send(RoomEvent::TimerFired { timer_id }).await;
//! });
//! // later, from the same room task:
//! handle.cancel();
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::{debug, trace};

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Process-unique identifier of a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Where a timer is in its one-way lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Waiting for its delay to elapse.
    Pending,
    /// The delay elapsed and the callback was started.
    Fired,
    /// Cancelled before it fired. The callback will never run.
    Cancelled,
}

/// Schedules single-shot delayed callbacks.
///
/// Cheap to clone; clones share the id counter.
#[derive(Debug, Clone, Default)]
pub struct TimerManager {
    next_id: Arc<AtomicU64>,
}

impl TimerManager {
    /// Creates a new manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `callback` once after `delay`, unless the returned handle is
    /// cancelled (or dropped) first. The callback receives the id of the
    /// timer that fired.
    ///
    /// `room_id` is only used to label log lines.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F, Fut>(
        &self,
        room_id: &str,
        delay: Duration,
        callback: F,
    ) -> TimerHandle
    where
        F: FnOnce(TimerId) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let state = Arc::new(AtomicU8::new(PENDING));

        let task_state = Arc::clone(&state);
        let room = room_id.to_string();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if task_state
                .compare_exchange(
                    PENDING,
                    FIRED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                trace!(timer = %id, room_id = %room, "timer fired");
                callback(id).await;
            }
        });

        debug!(
            timer = %id,
            room_id,
            delay_ms = delay.as_millis() as u64,
            "timer scheduled"
        );

        TimerHandle {
            id,
            delay,
            state,
            abort: task.abort_handle(),
        }
    }
}

/// Owner's handle to a scheduled timer.
///
/// Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct TimerHandle {
    id: TimerId,
    delay: Duration,
    state: Arc<AtomicU8>,
    abort: AbortHandle,
}

impl TimerHandle {
    /// The timer's id.
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// The delay the timer was scheduled with.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Cancels the timer.
    ///
    /// Returns `true` if this call stopped the callback from running,
    /// `false` if the timer had already fired or been cancelled.
    pub fn cancel(&self) -> bool {
        let won = self
            .state
            .compare_exchange(
                PENDING,
                CANCELLED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if won {
            self.abort.abort();
            trace!(timer = %self.id, "timer cancelled");
        }
        won
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TimerState {
        match self.state.load(Ordering::Acquire) {
            PENDING => TimerState::Pending,
            FIRED => TimerState::Fired,
            _ => TimerState::Cancelled,
        }
    }

    /// `true` while the timer has neither fired nor been cancelled.
    pub fn is_pending(&self) -> bool {
        self.state() == TimerState::Pending
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
