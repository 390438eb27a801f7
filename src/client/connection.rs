//! Compositor connection seam
//!
//! [`CompositorConnection`] is the narrow interface the display client
//! consumes: a blocking `dispatch` that yields raw events, and a handful of
//! surface requests. The compositor's own wire protocol stays behind it.
//!
//! [`HeadlessCompositor`] is an in-process implementation. A driver (test,
//! demo, or another thread) injects [`RawEvent`]s and inspects the requests
//! the client made.

use crate::input::{Point, RawInput};
use crate::surface::{Size, SurfaceId};
use log::debug;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputId(pub u32);

/// A monitor as advertised by the compositor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputInfo {
    pub id: OutputId,
    pub name: String,
    pub size: Size,
    pub refresh_mhz: u32,
    pub scale: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeatCapabilities {
    pub pointer: bool,
    pub keyboard: bool,
    pub touch: bool,
}

/// Events coming off the compositor connection
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    Seat {
        name: String,
        capabilities: SeatCapabilities,
    },
    PointerEnter {
        surface: SurfaceId,
        position: Point,
    },
    PointerLeave {
        surface: SurfaceId,
    },
    KeyboardEnter {
        surface: SurfaceId,
    },
    KeyboardLeave {
        surface: SurfaceId,
    },
    Modifiers {
        depressed: u32,
        latched: u32,
        locked: u32,
    },
    RepeatInfo {
        rate: u32,
        delay_ms: u32,
    },
    Input(RawInput),
    Configure {
        surface: SurfaceId,
        size: Size,
        serial: u32,
    },
    Close {
        surface: SurfaceId,
    },
    OutputAdded(OutputInfo),
    OutputRemoved(OutputId),
    OutputChanged(OutputInfo),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Compositor connection lost: {0}")]
pub struct ConnectionLost(pub String);

/// What the display client needs from a compositor
pub trait CompositorConnection {
    /// Wait up to `timeout` for events. An empty batch means the wait timed out.
    fn dispatch(&mut self, timeout: Duration) -> Result<Vec<RawEvent>, ConnectionLost>;

    fn create_surface(&mut self, size: Size) -> Result<SurfaceId, ConnectionLost>;

    fn resize_surface(&mut self, surface: SurfaceId, size: Size) -> Result<(), ConnectionLost>;

    fn ack_configure(&mut self, surface: SurfaceId, serial: u32) -> Result<(), ConnectionLost>;

    fn attach_buffer(&mut self, surface: SurfaceId) -> Result<(), ConnectionLost>;

    fn destroy_surface(&mut self, surface: SurfaceId) -> Result<(), ConnectionLost>;

    /// Round-trip liveness check
    fn ping(&mut self) -> Result<(), ConnectionLost>;
}

/// A request the client sent to the headless compositor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    CreateSurface { surface: SurfaceId, size: Size },
    ResizeSurface { surface: SurfaceId, size: Size },
    AckConfigure { surface: SurfaceId, serial: u32 },
    AttachBuffer { surface: SurfaceId },
    DestroySurface { surface: SurfaceId },
    Ping,
}

#[derive(Debug)]
struct Shared {
    alive: AtomicBool,
    auto_configure: AtomicBool,
    next_surface: AtomicU32,
    next_serial: AtomicU32,
    requests: Mutex<Vec<Request>>,
    surfaces: Mutex<HashSet<SurfaceId>>,
    receiver: Mutex<Option<Receiver<RawEvent>>>,
}

/// In-process compositor driven from the outside
#[derive(Debug, Clone)]
pub struct HeadlessCompositor {
    events: Sender<RawEvent>,
    shared: Arc<Shared>,
}

impl Default for HeadlessCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessCompositor {
    pub fn new() -> Self {
        let (events, receiver) = mpsc::channel();
        Self {
            events,
            shared: Arc::new(Shared {
                alive: AtomicBool::new(true),
                auto_configure: AtomicBool::new(false),
                next_surface: AtomicU32::new(1),
                next_serial: AtomicU32::new(1),
                requests: Mutex::new(Vec::new()),
                surfaces: Mutex::new(HashSet::new()),
                receiver: Mutex::new(Some(receiver)),
            }),
        }
    }

    /// Open the single client connection this compositor accepts
    pub fn connect(&self) -> io::Result<HeadlessConnection> {
        if !self.shared.alive.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "headless compositor is shut down",
            ));
        }
        let events = self.shared.receiver.lock().take().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrInUse,
                "headless compositor already has a client",
            )
        })?;
        Ok(HeadlessConnection {
            events,
            pending: VecDeque::new(),
            shared: Arc::clone(&self.shared),
        })
    }

    /// Queue an event for the client; false once the client is gone
    pub fn send(&self, event: RawEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Advertise a seat with a pointer and a keyboard
    pub fn advertise_seat(&self) -> bool {
        self.send(RawEvent::Seat {
            name: "seat0".to_string(),
            capabilities: SeatCapabilities {
                pointer: true,
                keyboard: true,
                touch: false,
            },
        })
    }

    /// Send a configure with a fresh serial, returning the serial
    pub fn configure(&self, surface: SurfaceId, size: Size) -> u32 {
        let serial = self.shared.next_serial.fetch_add(1, Ordering::SeqCst);
        self.send(RawEvent::Configure {
            surface,
            size,
            serial,
        });
        serial
    }

    /// Configure every new surface at its requested size right away
    pub fn set_auto_configure(&self, enabled: bool) {
        self.shared.auto_configure.store(enabled, Ordering::SeqCst);
    }

    /// Make every further call on the connection fail
    pub fn shutdown(&self) {
        self.shared.alive.store(false, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.shared.requests.lock().clone()
    }

    pub fn take_requests(&self) -> Vec<Request> {
        std::mem::take(&mut *self.shared.requests.lock())
    }

    /// Surfaces created and not yet destroyed
    pub fn live_surfaces(&self) -> usize {
        self.shared.surfaces.lock().len()
    }
}

/// Client end of a [`HeadlessCompositor`]
#[derive(Debug)]
pub struct HeadlessConnection {
    events: Receiver<RawEvent>,
    pending: VecDeque<RawEvent>,
    shared: Arc<Shared>,
}

impl HeadlessConnection {
    fn check_alive(&self) -> Result<(), ConnectionLost> {
        if self.shared.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ConnectionLost("compositor shut down".to_string()))
        }
    }

    fn record(&self, request: Request) -> Result<(), ConnectionLost> {
        self.check_alive()?;
        debug!("headless request: {:?}", request);
        self.shared.requests.lock().push(request);
        Ok(())
    }
}

impl CompositorConnection for HeadlessConnection {
    fn dispatch(&mut self, timeout: Duration) -> Result<Vec<RawEvent>, ConnectionLost> {
        self.check_alive()?;

        let mut batch: Vec<RawEvent> = self.pending.drain(..).collect();
        if batch.is_empty() {
            match self.events.recv_timeout(timeout) {
                Ok(event) => batch.push(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ConnectionLost("compositor went away".to_string()));
                }
            }
        }
        batch.extend(self.events.try_iter());

        self.check_alive()?;
        Ok(batch)
    }

    fn create_surface(&mut self, size: Size) -> Result<SurfaceId, ConnectionLost> {
        let surface = SurfaceId(self.shared.next_surface.fetch_add(1, Ordering::SeqCst));
        self.record(Request::CreateSurface { surface, size })?;
        self.shared.surfaces.lock().insert(surface);

        if self.shared.auto_configure.load(Ordering::SeqCst) {
            let serial = self.shared.next_serial.fetch_add(1, Ordering::SeqCst);
            self.pending.push_back(RawEvent::Configure {
                surface,
                size,
                serial,
            });
        }
        Ok(surface)
    }

    fn resize_surface(&mut self, surface: SurfaceId, size: Size) -> Result<(), ConnectionLost> {
        self.record(Request::ResizeSurface { surface, size })?;
        if self.shared.auto_configure.load(Ordering::SeqCst) {
            let serial = self.shared.next_serial.fetch_add(1, Ordering::SeqCst);
            self.pending.push_back(RawEvent::Configure {
                surface,
                size,
                serial,
            });
        }
        Ok(())
    }

    fn ack_configure(&mut self, surface: SurfaceId, serial: u32) -> Result<(), ConnectionLost> {
        self.record(Request::AckConfigure { surface, serial })
    }

    fn attach_buffer(&mut self, surface: SurfaceId) -> Result<(), ConnectionLost> {
        self.record(Request::AttachBuffer { surface })
    }

    fn destroy_surface(&mut self, surface: SurfaceId) -> Result<(), ConnectionLost> {
        self.record(Request::DestroySurface { surface })?;
        self.shared.surfaces.lock().remove(&surface);
        Ok(())
    }

    fn ping(&mut self) -> Result<(), ConnectionLost> {
        self.record(Request::Ping)
    }
}
