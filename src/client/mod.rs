//! Display client
//!
//! The library half linked into every application. A [`DisplayClient`]
//! owns one compositor connection, the input seat, the
//! [`SurfaceRegistry`] and the [`InputTranslator`], and turns everything
//! the compositor says into a pull-based queue of [`ClientEvent`]s.
//!
//! The client is single-threaded. [`DisplayClient::poll_events`] is its
//! only blocking point; it waits on the compositor connection while also
//! honouring the key-repeat timer, the heartbeat timer, and (when attached)
//! the shell channel.

pub mod connection;
pub mod shell;

use crate::channel::Message;
use crate::config::LintelConfig;
use crate::input::keymap::Keymap;
use crate::input::{InputEvent, InputTranslator, UsKeymap};
use crate::surface::{Size, Surface, SurfaceError, SurfaceHandle, SurfaceId, SurfaceRegistry};
use crate::timer::TimerQueue;
use log::{debug, info, warn};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::time::{Duration, Instant};
use thiserror::Error;

pub use connection::{
    CompositorConnection, ConnectionLost, HeadlessCompositor, HeadlessConnection, OutputId,
    OutputInfo, RawEvent, Request, SeatCapabilities,
};
pub use shell::ShellClient;

/// Longest the client sleeps without checking the shell channel
const SHELL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("No compositor available: {0}")]
    NoCompositor(#[source] io::Error),

    #[error("No input seat advertised within {0:?}")]
    NoSeat(Duration),
}

/// Events handed to the application
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    SurfaceConfigured { surface: SurfaceHandle, size: Size },
    /// The compositor asks for the surface to close; the application decides
    SurfaceClosed(SurfaceHandle),
    Input(InputEvent),
    OutputAdded(OutputInfo),
    OutputRemoved(OutputId),
    OutputChanged(OutputInfo),
    /// The shell made this application active (true) or inactive (false)
    Activated(bool),
    /// The attached shell channel is gone; reconnect and register again
    ShellDisconnected,
    /// Terminal: the compositor connection is gone
    Disconnected,
}

/// One batch from [`DisplayClient::poll_events`]
#[derive(Debug)]
pub struct ClientEvents(std::vec::IntoIter<ClientEvent>);

impl Iterator for ClientEvents {
    type Item = ClientEvent;

    fn next(&mut self) -> Option<ClientEvent> {
        self.0.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl ExactSizeIterator for ClientEvents {}

/// The input seat bound to this client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub name: String,
    pub capabilities: SeatCapabilities,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Connected,
    Disconnected { reported: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientTimer {
    Heartbeat,
}

pub struct DisplayClient<C: CompositorConnection, K: Keymap = UsKeymap> {
    connection: C,
    seat: Seat,
    surfaces: SurfaceRegistry,
    input: InputTranslator<K>,
    outputs: HashMap<OutputId, OutputInfo>,
    shell: Option<ShellClient>,
    timers: TimerQueue<ClientTimer>,
    heartbeat: Duration,
    shell_send_timeout: Duration,
    /// Events that arrived while waiting for the seat
    backlog: VecDeque<RawEvent>,
    link: Link,
}

impl<C: CompositorConnection> DisplayClient<C> {
    /// Open the compositor connection and wait for the input seat
    pub fn connect<F>(open: F, config: &LintelConfig) -> Result<Self, ConnectError>
    where
        F: FnOnce() -> io::Result<C>,
    {
        Self::connect_with_keymap(open, UsKeymap, config)
    }
}

impl<C: CompositorConnection, K: Keymap> DisplayClient<C, K> {
    pub fn connect_with_keymap<F>(open: F, keymap: K, config: &LintelConfig) -> Result<Self, ConnectError>
    where
        F: FnOnce() -> io::Result<C>,
    {
        let mut connection = open().map_err(ConnectError::NoCompositor)?;

        let window = config.client.seat_discovery_timeout();
        let deadline = Instant::now() + window;
        let mut backlog = VecDeque::new();
        let mut seat = None;

        while seat.is_none() {
            let now = Instant::now();
            if now >= deadline {
                warn!("❌ No input seat advertised within {:?}", window);
                return Err(ConnectError::NoSeat(window));
            }

            let batch = connection
                .dispatch(deadline - now)
                .map_err(|e| ConnectError::NoCompositor(io::Error::new(io::ErrorKind::ConnectionAborted, e)))?;
            for event in batch {
                match event {
                    RawEvent::Seat { name, capabilities } if seat.is_none() => {
                        seat = Some(Seat { name, capabilities });
                    }
                    other => backlog.push_back(other),
                }
            }
        }
        let Some(seat) = seat else {
            return Err(ConnectError::NoSeat(window));
        };
        info!(
            "🖥️ Connected to compositor, seat {} (pointer: {}, keyboard: {}, touch: {})",
            seat.name, seat.capabilities.pointer, seat.capabilities.keyboard, seat.capabilities.touch
        );

        let heartbeat = config.client.heartbeat();
        let mut timers = TimerQueue::new();
        timers.arm_after(Instant::now(), heartbeat, ClientTimer::Heartbeat);

        Ok(Self {
            connection,
            seat,
            surfaces: SurfaceRegistry::new(config.client.max_surfaces),
            input: InputTranslator::new(keymap, &config.input),
            outputs: HashMap::new(),
            shell: None,
            timers,
            heartbeat,
            shell_send_timeout: config.client.shell_send_timeout(),
            backlog,
            link: Link::Connected,
        })
    }

    pub fn seat(&self) -> &Seat {
        &self.seat
    }

    pub fn is_disconnected(&self) -> bool {
        self.link != Link::Connected
    }

    pub fn surface(&self, handle: SurfaceHandle) -> Option<&Surface> {
        self.surfaces.get(handle)
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &OutputInfo> + '_ {
        self.outputs.values()
    }

    pub fn input(&self) -> &InputTranslator<K> {
        &self.input
    }

    /// Route `Activate` notices from the shell into the event queue
    pub fn attach_shell(&mut self, mut shell: ShellClient) {
        if let Err(e) = shell.set_send_timeout(self.shell_send_timeout) {
            warn!("⚠️ Could not bound shell send time: {}", e);
        }
        self.shell = Some(shell);
    }

    pub fn shell_mut(&mut self) -> Option<&mut ShellClient> {
        self.shell.as_mut()
    }

    pub fn detach_shell(&mut self) -> Option<ShellClient> {
        self.shell.take()
    }

    /// Allocate an unconfigured surface. Never blocks.
    pub fn create_surface(&mut self, initial_size: Size) -> Result<SurfaceHandle, SurfaceError> {
        if self.is_disconnected() {
            return Err(SurfaceError::Disconnected);
        }
        self.surfaces.check_capacity()?;

        let id = match self.connection.create_surface(initial_size) {
            Ok(id) => id,
            Err(e) => {
                self.lost(e);
                return Err(SurfaceError::Disconnected);
            }
        };
        let handle = self.surfaces.insert(id, initial_size)?;
        debug!("Created {} ({}x{})", handle, initial_size.width, initial_size.height);
        Ok(handle)
    }

    /// Ask for a new size. Resizing to the current size, or resizing a
    /// destroyed surface, does nothing.
    pub fn resize_surface(&mut self, handle: SurfaceHandle, size: Size) -> Result<(), SurfaceError> {
        if self.is_disconnected() {
            return Err(SurfaceError::Disconnected);
        }
        let Some(id) = self.surfaces.get(handle).map(|surface| surface.id) else {
            debug!("Ignoring resize of destroyed {}", handle);
            return Ok(());
        };
        if !self.surfaces.resize(handle, size) {
            return Ok(());
        }
        if let Err(e) = self.connection.resize_surface(id, size) {
            self.lost(e);
            return Err(SurfaceError::Disconnected);
        }
        Ok(())
    }

    /// Attach a buffer to a configured surface
    pub fn attach_buffer(&mut self, handle: SurfaceHandle) -> Result<(), SurfaceError> {
        if self.is_disconnected() {
            return Err(SurfaceError::Disconnected);
        }
        let id = self
            .surfaces
            .get(handle)
            .map(|surface| surface.id)
            .ok_or(SurfaceError::NotConfigured(handle))?;
        self.surfaces.mark_buffer_attached(handle)?;
        if let Err(e) = self.connection.attach_buffer(id) {
            self.lost(e);
            return Err(SurfaceError::Disconnected);
        }
        Ok(())
    }

    /// Destroy a surface. Destroying it again is a no-op.
    pub fn destroy_surface(&mut self, handle: SurfaceHandle) {
        let Some(surface) = self.surfaces.remove(handle) else {
            return;
        };
        self.input.surface_destroyed(handle);
        debug!("Destroyed {}", handle);

        if !self.is_disconnected() {
            if let Err(e) = self.connection.destroy_surface(surface.id) {
                self.lost(e);
            }
        }
    }

    /// Wait up to `timeout` for events.
    ///
    /// Returns as soon as at least one event is ready, or with an empty
    /// batch on timeout. After the connection is lost the next batch holds
    /// a single `Disconnected` and every later batch is empty.
    pub fn poll_events(&mut self, timeout: Duration) -> ClientEvents {
        let mut out = Vec::new();

        if let Link::Disconnected { reported } = self.link {
            if !reported {
                self.link = Link::Disconnected { reported: true };
                out.push(ClientEvent::Disconnected);
            }
            return ClientEvents(out.into_iter());
        }

        let start = Instant::now();
        let deadline = start + timeout;
        while let Some(event) = self.backlog.pop_front() {
            self.process(event, start, &mut out);
        }

        let mut dispatched = false;
        loop {
            let now = Instant::now();
            self.fire_timers(now, &mut out);
            self.drain_shell(&mut out);
            if self.is_disconnected() || !out.is_empty() {
                break;
            }
            if dispatched && now >= deadline {
                break;
            }

            let wait = self.next_wake(now, deadline);
            match self.connection.dispatch(wait) {
                Ok(batch) => {
                    let now = Instant::now();
                    for event in batch {
                        self.process(event, now, &mut out);
                    }
                }
                Err(e) => self.lost(e),
            }
            dispatched = true;
        }

        if self.link == (Link::Disconnected { reported: false }) {
            self.link = Link::Disconnected { reported: true };
            out.push(ClientEvent::Disconnected);
        }
        ClientEvents(out.into_iter())
    }

    fn next_wake(&self, now: Instant, deadline: Instant) -> Duration {
        let mut wake = deadline;
        if let Some(repeat) = self.input.next_repeat_deadline() {
            wake = wake.min(repeat);
        }
        if let Some(timer) = self.timers.next_deadline() {
            wake = wake.min(timer);
        }
        let wait = wake.saturating_duration_since(now);
        if self.shell.is_some() {
            wait.min(SHELL_POLL_INTERVAL)
        } else {
            wait
        }
    }

    fn fire_timers(&mut self, now: Instant, out: &mut Vec<ClientEvent>) {
        for (_, timer) in self.timers.expire(now) {
            match timer {
                ClientTimer::Heartbeat => match self.connection.ping() {
                    Ok(()) => {
                        self.timers
                            .arm_after(now, self.heartbeat, ClientTimer::Heartbeat);
                    }
                    Err(e) => {
                        self.lost(e);
                        return;
                    }
                },
            }
        }

        if let Some(event) = self.input.fire_repeat(now) {
            self.deliver(event, out);
        }
    }

    fn drain_shell(&mut self, out: &mut Vec<ClientEvent>) {
        let Some(shell) = self.shell.as_mut() else {
            return;
        };

        let mut lost = false;
        loop {
            match shell.try_recv() {
                Ok(Some(Message::Activate(active))) => out.push(ClientEvent::Activated(active)),
                Ok(Some(other)) => debug!("Ignoring {:?} from the shell", other.kind()),
                Ok(None) => break,
                Err(e) if e.is_fatal() => {
                    warn!("⚠️ Shell channel lost: {}", e);
                    lost = true;
                    break;
                }
                Err(e) => warn!("⚠️ Dropped malformed message from the shell: {}", e),
            }
        }
        if lost {
            self.shell = None;
            out.push(ClientEvent::ShellDisconnected);
        }
    }

    fn resolve(&self, id: SurfaceId, what: &str) -> Option<SurfaceHandle> {
        let handle = self.surfaces.lookup(id);
        if handle.is_none() {
            warn!("⚠️ Dropping {} for unknown surface {:?}", what, id);
        }
        handle
    }

    /// Input reaches a surface only once it is configured
    fn deliver(&self, event: InputEvent, out: &mut Vec<ClientEvent>) {
        if self.surfaces.is_configured(event.surface) {
            out.push(ClientEvent::Input(event));
        } else {
            debug!("Dropping input for unconfigured {}", event.surface);
        }
    }

    fn process(&mut self, event: RawEvent, now: Instant, out: &mut Vec<ClientEvent>) {
        match event {
            RawEvent::Seat { name, capabilities } => {
                debug!("Seat {} capabilities changed: {:?}", name, capabilities);
                self.seat = Seat { name, capabilities };
            }
            RawEvent::PointerEnter { surface, position } => {
                if let Some(handle) = self.resolve(surface, "pointer enter") {
                    self.input.pointer_enter(handle, position);
                }
            }
            RawEvent::PointerLeave { surface } => {
                if let Some(handle) = self.resolve(surface, "pointer leave") {
                    self.input.pointer_leave(handle);
                }
            }
            RawEvent::KeyboardEnter { surface } => {
                if let Some(handle) = self.resolve(surface, "keyboard enter") {
                    self.input.keyboard_enter(handle);
                }
            }
            RawEvent::KeyboardLeave { surface } => {
                if let Some(handle) = self.resolve(surface, "keyboard leave") {
                    self.input.keyboard_leave(handle);
                }
            }
            RawEvent::Modifiers {
                depressed,
                latched,
                locked,
            } => self.input.set_modifiers(depressed, latched, locked),
            RawEvent::RepeatInfo { rate, delay_ms } => {
                debug!("Compositor repeat info: {}/s after {}ms", rate, delay_ms);
                self.input.set_repeat_info(rate, delay_ms);
            }
            RawEvent::Input(raw) => {
                if let Some(event) = self.input.translate(raw, now) {
                    self.deliver(event, out);
                }
            }
            RawEvent::Configure {
                surface,
                size,
                serial,
            } => {
                let Some(handle) = self.resolve(surface, "configure") else {
                    return;
                };
                let Some(size) = self.surfaces.configure(handle, size) else {
                    return;
                };
                if let Err(e) = self.connection.ack_configure(surface, serial) {
                    self.lost(e);
                    return;
                }
                out.push(ClientEvent::SurfaceConfigured {
                    surface: handle,
                    size,
                });
            }
            RawEvent::Close { surface } => {
                if let Some(handle) = self.resolve(surface, "close") {
                    out.push(ClientEvent::SurfaceClosed(handle));
                }
            }
            RawEvent::OutputAdded(output) => {
                info!("🖥️ Output {} added ({}x{})", output.name, output.size.width, output.size.height);
                self.outputs.insert(output.id, output.clone());
                out.push(ClientEvent::OutputAdded(output));
            }
            RawEvent::OutputRemoved(id) => {
                if self.outputs.remove(&id).is_some() {
                    out.push(ClientEvent::OutputRemoved(id));
                } else {
                    debug!("Ignoring removal of unknown output {:?}", id);
                }
            }
            RawEvent::OutputChanged(output) => {
                self.outputs.insert(output.id, output.clone());
                out.push(ClientEvent::OutputChanged(output));
            }
        }
    }

    fn lost(&mut self, error: ConnectionLost) {
        if self.link == Link::Connected {
            warn!("💔 {}", error);
            self.link = Link::Disconnected { reported: false };
            self.timers.clear();
        }
    }
}
