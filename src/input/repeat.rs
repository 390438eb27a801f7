//! Key repeat state machine
//!
//! Pressing a repeatable key arms a one-shot timer at the repeat delay.
//! Each time it fires the caller synthesizes a key event and the timer is
//! re-armed at the repeat interval. Any key release, loss of keyboard
//! focus or a repeat rate of zero cancels it.

use crate::timer::{TimerHandle, TimerQueue};
use std::time::{Duration, Instant};

/// Repeat timing, as configured or advertised by the compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatSettings {
    /// Repeats per second; zero disables repeat
    pub rate: u32,
    pub delay: Duration,
}

impl RepeatSettings {
    pub fn new(rate: u32, delay: Duration) -> Self {
        Self { rate, delay }
    }

    /// Time between synthetic events, None when repeat is off
    pub fn interval(&self) -> Option<Duration> {
        (self.rate > 0).then(|| Duration::from_millis(1000 / u64::from(self.rate)).max(Duration::from_millis(1)))
    }
}

/// The key currently auto-repeating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatingKey {
    pub keycode: u32,
    pub device: u32,
}

#[derive(Debug)]
pub struct KeyRepeat {
    settings: RepeatSettings,
    timers: TimerQueue<RepeatingKey>,
    current: Option<(RepeatingKey, TimerHandle)>,
}

impl KeyRepeat {
    pub fn new(settings: RepeatSettings) -> Self {
        Self {
            settings,
            timers: TimerQueue::new(),
            current: None,
        }
    }

    pub fn settings(&self) -> RepeatSettings {
        self.settings
    }

    /// Replace the timing. A zero rate stops a running repeat.
    pub fn set_settings(&mut self, settings: RepeatSettings) {
        self.settings = settings;
        if settings.interval().is_none() {
            self.cancel();
        }
    }

    /// A key went down. A repeatable key takes over the repeat; other keys
    /// (modifiers) leave a running repeat alone.
    pub fn press(&mut self, key: RepeatingKey, repeatable: bool, now: Instant) {
        if !repeatable || self.settings.interval().is_none() {
            return;
        }
        self.cancel();
        let handle = self.timers.arm_after(now, self.settings.delay, key);
        self.current = Some((key, handle));
    }

    /// Stop any repeat. Returns true if one was running.
    pub fn cancel(&mut self) -> bool {
        match self.current.take() {
            Some((_, handle)) => {
                self.timers.cancel(handle);
                true
            }
            None => false,
        }
    }

    pub fn current(&self) -> Option<RepeatingKey> {
        self.current.map(|(key, _)| key)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Fire the timer if due, re-arming it one interval from `now`
    pub fn fire(&mut self, now: Instant) -> Option<RepeatingKey> {
        let (handle, key) = self.timers.expire(now).into_iter().next()?;
        match (self.current, self.settings.interval()) {
            (Some((current, armed)), Some(interval)) if armed == handle => {
                let next = self.timers.arm_after(now, interval, current);
                self.current = Some((current, next));
                Some(key)
            }
            _ => None,
        }
    }
}
