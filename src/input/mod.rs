//! Input translation
//!
//! Turns raw seat events from the compositor connection into uniform
//! [`InputEvent`]s. The translator tracks pointer and keyboard focus,
//! modifier state, click counts, and key repeat, so the application sees a
//! flat stream of events with that derived state already attached.
//!
//! Focus is expressed in local [`SurfaceHandle`]s; mapping compositor ids to
//! handles is the caller's job.

pub mod click;
pub mod keymap;
pub mod repeat;

use crate::config::InputConfig;
use crate::surface::SurfaceHandle;
use click::ClickDetector;
use keymap::{Keymap, Keysym};
use log::debug;
use repeat::{KeyRepeat, RepeatSettings, RepeatingKey};
use std::time::{Duration, Instant};

pub use keymap::UsKeymap;

/// Input device identifier as reported by the compositor
pub type DeviceId = u32;

/// Surface-local position
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Modifier state derived from the compositor's xkb masks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub caps_lock: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub num_lock: bool,
    pub logo: bool,
}

impl Modifiers {
    const SHIFT: u32 = 1 << 0;
    const LOCK: u32 = 1 << 1;
    const CONTROL: u32 = 1 << 2;
    const MOD1: u32 = 1 << 3;
    const MOD2: u32 = 1 << 4;
    const MOD4: u32 = 1 << 6;

    /// Decode the standard xkb modifier layout
    pub fn from_masks(depressed: u32, latched: u32, locked: u32) -> Self {
        let active = depressed | latched | locked;
        Self {
            shift: active & Self::SHIFT != 0,
            caps_lock: locked & Self::LOCK != 0,
            ctrl: active & Self::CONTROL != 0,
            alt: active & Self::MOD1 != 0,
            num_lock: locked & Self::MOD2 != 0,
            logo: active & Self::MOD4 != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    Pressed,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Pressed,
    Released,
}

/// Device events as they come off the seat
#[derive(Debug, Clone, PartialEq)]
pub enum RawInput {
    Motion {
        time: u32,
        device: DeviceId,
        position: Point,
    },
    Button {
        time: u32,
        device: DeviceId,
        button: u32,
        state: ButtonState,
    },
    Axis {
        time: u32,
        device: DeviceId,
        horizontal: f64,
        vertical: f64,
    },
    Key {
        time: u32,
        device: DeviceId,
        keycode: u32,
        state: KeyState,
    },
    GestureBegin {
        time: u32,
        device: DeviceId,
        fingers: u32,
    },
    GestureUpdate {
        time: u32,
        device: DeviceId,
        dx: f64,
        dy: f64,
        scale: f64,
        rotation: f64,
    },
    GestureEnd {
        time: u32,
        device: DeviceId,
        cancelled: bool,
    },
}

impl RawInput {
    fn time(&self) -> u32 {
        match *self {
            RawInput::Motion { time, .. }
            | RawInput::Button { time, .. }
            | RawInput::Axis { time, .. }
            | RawInput::Key { time, .. }
            | RawInput::GestureBegin { time, .. }
            | RawInput::GestureUpdate { time, .. }
            | RawInput::GestureEnd { time, .. } => time,
        }
    }
}

/// What happened
#[derive(Debug, Clone, PartialEq)]
pub enum InputKind {
    PointerMotion,
    PointerButton {
        button: u32,
        state: ButtonState,
        click_count: u32,
    },
    Axis {
        horizontal: f64,
        vertical: f64,
    },
    Key {
        keycode: u32,
        keysym: Keysym,
        text: Option<char>,
        state: KeyState,
        /// Synthesized by key repeat
        repeat: bool,
    },
    GestureBegin {
        fingers: u32,
    },
    GestureUpdate {
        dx: f64,
        dy: f64,
        scale: f64,
        rotation: f64,
    },
    GestureEnd {
        cancelled: bool,
    },
}

/// A normalized input event addressed to one surface
#[derive(Debug, Clone, PartialEq)]
pub struct InputEvent {
    /// Milliseconds on the compositor's monotonic clock
    pub time: u32,
    pub device: DeviceId,
    pub surface: SurfaceHandle,
    /// Surface-local pointer position for pointer and gesture events
    pub position: Option<Point>,
    pub modifiers: Modifiers,
    pub kind: InputKind,
}

/// Seat-level input state machine
#[derive(Debug)]
pub struct InputTranslator<K: Keymap = UsKeymap> {
    keymap: K,
    clicks: ClickDetector,
    repeat: KeyRepeat,
    modifiers: Modifiers,
    pointer_focus: Option<SurfaceHandle>,
    keyboard_focus: Option<SurfaceHandle>,
    pointer: Point,
    /// Last compositor timestamp and when it was seen, for synthetic events
    clock: Option<(u32, Instant)>,
}

impl<K: Keymap> InputTranslator<K> {
    pub fn new(keymap: K, config: &InputConfig) -> Self {
        let window_ms = u32::try_from(config.double_click_ms).unwrap_or(u32::MAX);
        Self {
            keymap,
            clicks: ClickDetector::new(window_ms, config.double_click_radius),
            repeat: KeyRepeat::new(RepeatSettings::new(
                config.keyboard_repeat_rate,
                config.repeat_delay(),
            )),
            modifiers: Modifiers::default(),
            pointer_focus: None,
            keyboard_focus: None,
            pointer: Point::default(),
            clock: None,
        }
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn pointer_focus(&self) -> Option<SurfaceHandle> {
        self.pointer_focus
    }

    pub fn keyboard_focus(&self) -> Option<SurfaceHandle> {
        self.keyboard_focus
    }

    pub fn repeat_settings(&self) -> RepeatSettings {
        self.repeat.settings()
    }

    pub fn pointer_enter(&mut self, surface: SurfaceHandle, position: Point) {
        self.pointer_focus = Some(surface);
        self.pointer = position;
    }

    pub fn pointer_leave(&mut self, surface: SurfaceHandle) {
        if self.pointer_focus == Some(surface) {
            self.pointer_focus = None;
        }
    }

    pub fn keyboard_enter(&mut self, surface: SurfaceHandle) {
        if self.keyboard_focus != Some(surface) {
            self.repeat.cancel();
        }
        self.keyboard_focus = Some(surface);
    }

    /// Losing keyboard focus always stops key repeat
    pub fn keyboard_leave(&mut self, surface: SurfaceHandle) {
        if self.keyboard_focus == Some(surface) {
            self.keyboard_focus = None;
            if self.repeat.cancel() {
                debug!("Key repeat cancelled: {} lost keyboard focus", surface);
            }
        }
    }

    pub fn set_modifiers(&mut self, depressed: u32, latched: u32, locked: u32) {
        self.modifiers = Modifiers::from_masks(depressed, latched, locked);
    }

    /// Compositor-advertised repeat timing; overrides the configured values
    pub fn set_repeat_info(&mut self, rate: u32, delay_ms: u32) {
        self.repeat.set_settings(RepeatSettings::new(
            rate,
            Duration::from_millis(u64::from(delay_ms)),
        ));
    }

    /// Drop all state that refers to a destroyed surface
    pub fn surface_destroyed(&mut self, surface: SurfaceHandle) {
        if self.pointer_focus == Some(surface) {
            self.pointer_focus = None;
        }
        self.keyboard_leave(surface);
        self.clicks.forget_surface(surface);
    }

    /// Translate one device event. Events with no focused target are dropped.
    pub fn translate(&mut self, raw: RawInput, now: Instant) -> Option<InputEvent> {
        self.clock = Some((raw.time(), now));

        match raw {
            RawInput::Motion {
                time,
                device,
                position,
            } => {
                self.pointer = position;
                self.pointer_event(time, device, InputKind::PointerMotion)
            }
            RawInput::Button {
                time,
                device,
                button,
                state,
            } => {
                let surface = self.pointer_focus?;
                let click_count = match state {
                    ButtonState::Pressed => {
                        self.clicks
                            .press(surface, button, self.pointer.x, self.pointer.y, time)
                    }
                    ButtonState::Released => self.clicks.release(button),
                };
                self.pointer_event(
                    time,
                    device,
                    InputKind::PointerButton {
                        button,
                        state,
                        click_count,
                    },
                )
            }
            RawInput::Axis {
                time,
                device,
                horizontal,
                vertical,
            } => self.pointer_event(time, device, InputKind::Axis { horizontal, vertical }),
            RawInput::Key {
                time,
                device,
                keycode,
                state,
            } => {
                let surface = self.keyboard_focus?;
                match state {
                    KeyState::Pressed => {
                        let repeatable = self.keymap.is_repeatable(keycode);
                        self.repeat
                            .press(RepeatingKey { keycode, device }, repeatable, now);
                    }
                    KeyState::Released => {
                        // Any key-up ends the repeat, not only the repeating key's
                        self.repeat.cancel();
                    }
                }
                Some(self.key_event(surface, time, device, keycode, state, false))
            }
            RawInput::GestureBegin {
                time,
                device,
                fingers,
            } => self.pointer_event(time, device, InputKind::GestureBegin { fingers }),
            RawInput::GestureUpdate {
                time,
                device,
                dx,
                dy,
                scale,
                rotation,
            } => self.pointer_event(
                time,
                device,
                InputKind::GestureUpdate {
                    dx,
                    dy,
                    scale,
                    rotation,
                },
            ),
            RawInput::GestureEnd {
                time,
                device,
                cancelled,
            } => self.pointer_event(time, device, InputKind::GestureEnd { cancelled }),
        }
    }

    fn pointer_event(&self, time: u32, device: DeviceId, kind: InputKind) -> Option<InputEvent> {
        Some(InputEvent {
            time,
            device,
            surface: self.pointer_focus?,
            position: Some(self.pointer),
            modifiers: self.modifiers,
            kind,
        })
    }

    fn key_event(
        &self,
        surface: SurfaceHandle,
        time: u32,
        device: DeviceId,
        keycode: u32,
        state: KeyState,
        repeat: bool,
    ) -> InputEvent {
        let (text, keysym) = self.keymap.translate(keycode, self.modifiers);
        InputEvent {
            time,
            device,
            surface,
            position: None,
            modifiers: self.modifiers,
            kind: InputKind::Key {
                keycode,
                keysym,
                text: if state == KeyState::Pressed { text } else { None },
                state,
                repeat,
            },
        }
    }

    /// When the repeat timer wants the next wake-up
    pub fn next_repeat_deadline(&self) -> Option<Instant> {
        self.repeat.next_deadline()
    }

    /// Synthesize a repeated key press if the timer is due
    pub fn fire_repeat(&mut self, now: Instant) -> Option<InputEvent> {
        let key = self.repeat.fire(now)?;
        let Some(surface) = self.keyboard_focus else {
            self.repeat.cancel();
            return None;
        };
        let time = match self.clock {
            Some((time, seen)) => {
                let elapsed = now.saturating_duration_since(seen).as_millis() as u32;
                time.wrapping_add(elapsed)
            }
            None => 0,
        };
        Some(self.key_event(surface, time, key.device, key.keycode, KeyState::Pressed, true))
    }
}
