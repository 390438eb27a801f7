//! Cancellable one-shot timers.
//!
//! Every delayed action in Lintel is armed through a [`TimerQueue`], which
//! hands back a [`TimerHandle`]. The handle is the only way to cancel the
//! timer, and a handle that already fired or was cancelled is inert: using
//! it again can never touch a newer timer.

use std::time::{Duration, Instant};

/// Identity of one armed timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug)]
struct Armed<T> {
    handle: TimerHandle,
    deadline: Instant,
    payload: T,
}

/// Small deadline queue driven by the owning event loop
#[derive(Debug)]
pub struct TimerQueue<T> {
    next_id: u64,
    armed: Vec<Armed<T>>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            armed: Vec::new(),
        }
    }

    /// Arm a timer firing at `deadline`
    pub fn arm(&mut self, deadline: Instant, payload: T) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        self.armed.push(Armed {
            handle,
            deadline,
            payload,
        });
        handle
    }

    /// Arm a timer firing `delay` after `now`
    pub fn arm_after(&mut self, now: Instant, delay: Duration, payload: T) -> TimerHandle {
        self.arm(now + delay, payload)
    }

    /// Cancel a timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.armed.len();
        self.armed.retain(|armed| armed.handle != handle);
        self.armed.len() != before
    }

    pub fn is_armed(&self, handle: TimerHandle) -> bool {
        self.armed.iter().any(|armed| armed.handle == handle)
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.armed.iter().map(|armed| armed.deadline).min()
    }

    /// Time left until the earliest deadline, zero if already due
    pub fn time_until_next(&self, now: Instant) -> Option<Duration> {
        self.next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Remove and return every timer due at `now`, earliest first
    pub fn expire(&mut self, now: Instant) -> Vec<(TimerHandle, T)> {
        let mut due = Vec::new();
        let mut index = 0;
        while index < self.armed.len() {
            if self.armed[index].deadline <= now {
                due.push(self.armed.remove(index));
            } else {
                index += 1;
            }
        }
        due.sort_by_key(|armed| armed.deadline);
        due.into_iter()
            .map(|armed| (armed.handle, armed.payload))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    /// Drop every pending timer
    pub fn clear(&mut self) {
        self.armed.clear();
    }
}
