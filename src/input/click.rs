//! Multi-click detection

use crate::surface::SurfaceHandle;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct LastPress {
    surface: SurfaceHandle,
    button: u32,
    x: f64,
    y: f64,
    time: u32,
    count: u32,
}

/// Derives click counts from button presses.
///
/// A press continues the previous click run when it hits the same button on
/// the same surface within `window_ms` and `radius` pixels of the previous
/// press. Timestamps are the compositor's wrapping millisecond clock.
#[derive(Debug)]
pub struct ClickDetector {
    window_ms: u32,
    radius: f64,
    last: Option<LastPress>,
    held: HashMap<u32, u32>,
}

impl ClickDetector {
    pub fn new(window_ms: u32, radius: f64) -> Self {
        Self {
            window_ms,
            radius,
            last: None,
            held: HashMap::new(),
        }
    }

    /// Register a press and return its click count
    pub fn press(&mut self, surface: SurfaceHandle, button: u32, x: f64, y: f64, time: u32) -> u32 {
        let count = match self.last {
            Some(last)
                if last.surface == surface
                    && last.button == button
                    && time.wrapping_sub(last.time) <= self.window_ms
                    && (x - last.x).hypot(y - last.y) <= self.radius =>
            {
                last.count.saturating_add(1)
            }
            _ => 1,
        };

        self.last = Some(LastPress {
            surface,
            button,
            x,
            y,
            time,
            count,
        });
        self.held.insert(button, count);
        count
    }

    /// A release reports the count of the press it ends
    pub fn release(&mut self, button: u32) -> u32 {
        self.held.remove(&button).unwrap_or(1)
    }

    /// Forget the run, e.g. when the surface goes away
    pub fn reset(&mut self) {
        self.last = None;
        self.held.clear();
    }

    pub fn forget_surface(&mut self, surface: SurfaceHandle) {
        if self.last.is_some_and(|last| last.surface == surface) {
            self.reset();
        }
    }
}
