//! The shell's event loop
//!
//! [`ShellService`] owns the [`ShellServer`] state and drives it from four
//! sources on a single task: new socket connections, frames read from
//! connected applications, process deaths reported by the
//! [`LivenessMonitor`], and timers (redraw coalescing and the clock).
//! Every session gets a reader task and a writer task; neither touches the
//! shared state, they only move frames between the socket and the loop.
//!
//! Redraws are coalesced: any change arms a single short timer, and one
//! frame is presented when it fires regardless of how many changes landed
//! in between.

use super::liveness::LivenessMonitor;
use super::present::BarPresenter;
use super::{FrameDescription, SessionEndpoint, ShellServer};
use crate::channel::transport::{peer_process, read_frame, write_message, InboundFrame};
use crate::channel::{decode_body, Message, ProcessId, StatusHandle};
use crate::config::ShellConfig;
use anyhow::{Context, Result};
use chrono::{Local, Timelike};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Identifies one accepted connection. Events from a connection that has
/// since been replaced or reaped are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ConnectionId(u64);

/// Frames read ahead of the event loop across all connections. A full
/// queue parks the readers, which leaves further data in the sockets.
const INBOUND_QUEUE_FRAMES: usize = 64;

#[derive(Debug)]
enum Inbound {
    Frame {
        conn: ConnectionId,
        pid: ProcessId,
        frame: InboundFrame,
    },
    Closed {
        conn: ConnectionId,
        pid: ProcessId,
    },
}

struct Connection {
    id: ConnectionId,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    fn abort(self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Requests from outside the loop, e.g. the bar's own input handling
#[derive(Debug)]
pub enum ShellCommand {
    /// A tray icon was clicked
    StatusItemClicked { owner: ProcessId, handle: StatusHandle },
    /// The bar was clicked at a position; resolved through the presenter's layout
    ClickAt { x: f32, y: f32 },
    /// Make a session the active application
    Activate(ProcessId),
    /// Reply with the current frame description
    Frame(oneshot::Sender<FrameDescription>),
}

/// Cloneable handle for sending [`ShellCommand`]s to a running service
#[derive(Debug, Clone)]
pub struct ShellHandle {
    commands: mpsc::UnboundedSender<ShellCommand>,
}

impl ShellHandle {
    /// Returns false once the service has stopped
    pub fn send(&self, command: ShellCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn click_status_item(&self, owner: ProcessId, handle: StatusHandle) -> bool {
        self.send(ShellCommand::StatusItemClicked { owner, handle })
    }

    pub fn click_at(&self, x: f32, y: f32) -> bool {
        self.send(ShellCommand::ClickAt { x, y })
    }

    pub fn activate(&self, pid: ProcessId) -> bool {
        self.send(ShellCommand::Activate(pid))
    }

    /// The frame the bar would show right now
    pub async fn frame(&self) -> Option<FrameDescription> {
        let (tx, rx) = oneshot::channel();
        if !self.send(ShellCommand::Frame(tx)) {
            return None;
        }
        rx.await.ok()
    }
}

/// Bind the shell socket, replacing a stale socket file left by a previous run
pub fn bind(path: &Path) -> Result<UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove existing socket: {:?}", path))?;
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {:?}", parent))?;
        }
    }

    let listener = UnixListener::bind(path)
        .with_context(|| format!("Failed to bind Unix socket: {:?}", path))?;
    info!("🔗 Shell listening on: {:?}", path);
    Ok(listener)
}

/// Format the clock label, falling back to a placeholder on a bad format
pub fn clock_label(format: &str) -> String {
    let mut label = String::new();
    if write!(label, "{}", Local::now().format(format)).is_err() {
        return "--:--".to_string();
    }
    label
}

/// Time left until the next wall-clock minute starts
fn until_next_minute() -> Duration {
    let now = Local::now();
    let into_minute = Duration::from_secs(u64::from(now.second()))
        + Duration::from_nanos(u64::from(now.nanosecond() % 1_000_000_000));
    Duration::from_secs(60).saturating_sub(into_minute) + Duration::from_millis(5)
}

/// The shell server's event loop
pub struct ShellService<P: BarPresenter> {
    config: ShellConfig,
    server: ShellServer,
    monitor: LivenessMonitor,
    presenter: P,
    connections: HashMap<ProcessId, Connection>,
    next_connection: u64,
    inbound_tx: mpsc::Sender<Inbound>,
    inbound_rx: mpsc::Receiver<Inbound>,
    commands_tx: mpsc::UnboundedSender<ShellCommand>,
    commands_rx: mpsc::UnboundedReceiver<ShellCommand>,
    redraw_at: Option<Instant>,
    clock_at: Instant,
}

impl<P: BarPresenter> ShellService<P> {
    pub fn new(config: &ShellConfig, presenter: P) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_FRAMES);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        Self {
            config: config.clone(),
            server: ShellServer::new(config),
            monitor: LivenessMonitor::new(config.liveness_poll()),
            presenter,
            connections: HashMap::new(),
            next_connection: 0,
            inbound_tx,
            inbound_rx,
            commands_tx,
            commands_rx,
            redraw_at: None,
            clock_at: Instant::now(),
        }
    }

    pub fn handle(&self) -> ShellHandle {
        ShellHandle {
            commands: self.commands_tx.clone(),
        }
    }

    pub fn server(&self) -> &ShellServer {
        &self.server
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(mut self, listener: UnixListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("🚀 Shell service running");

        // First frame goes out right away
        self.server.set_clock(clock_label(&self.config.clock_format));
        self.redraw_at = Some(Instant::now());
        self.clock_at = Instant::now() + until_next_minute();

        loop {
            let redraw_at = self.redraw_at;
            tokio::select! {
                _ = &mut shutdown => {
                    info!("🛑 Shell service shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => self.accept(stream),
                    Err(e) => error!("❌ Error accepting shell connection: {}", e),
                },
                Some(event) = self.inbound_rx.recv() => self.on_inbound(event),
                pid = self.monitor.next_death() => self.on_death(pid),
                Some(command) = self.commands_rx.recv() => self.on_command(command),
                _ = sleep_until(self.clock_at) => {
                    if self.server.set_clock(clock_label(&self.config.clock_format)) {
                        self.schedule_redraw();
                    }
                    self.clock_at = Instant::now() + until_next_minute();
                }
                _ = sleep_until(redraw_at.unwrap_or(self.clock_at)), if redraw_at.is_some() => {
                    self.redraw();
                }
            }
        }

        for (_, connection) in self.connections.drain() {
            connection.abort();
        }
        Ok(())
    }

    fn accept(&mut self, stream: UnixStream) {
        let pid = match peer_process(&stream) {
            Ok(pid) => pid,
            Err(e) => {
                warn!("⚠️ Rejecting shell connection without peer credentials: {}", e);
                return;
            }
        };

        let (endpoint, outbox) = SessionEndpoint::channel();
        if let Err(e) = self.server.open_session(pid, endpoint) {
            warn!("⚠️ Rejecting shell connection from {}: {}", pid, e);
            return;
        }
        self.monitor.watch(pid);

        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        let max = self.config.max_message_bytes;
        let (read_half, write_half) = stream.into_split();

        let reader = tokio::spawn(read_loop(id, pid, read_half, max, self.inbound_tx.clone()));
        let writer = tokio::spawn(write_loop(pid, write_half, outbox, max));
        if let Some(old) = self.connections.insert(pid, Connection { id, reader, writer }) {
            old.abort();
        }
    }

    fn is_current(&self, pid: ProcessId, conn: ConnectionId) -> bool {
        self.connections.get(&pid).map(|c| c.id) == Some(conn)
    }

    fn on_inbound(&mut self, event: Inbound) {
        match event {
            Inbound::Frame { conn, pid, frame } => {
                if !self.is_current(pid, conn) {
                    debug!("Ignoring frame from stale connection of {}", pid);
                    return;
                }
                match frame {
                    InboundFrame::Oversized(len) => {
                        warn!("⚠️ Dropped {} byte frame from {}: over the size limit", len, pid);
                    }
                    InboundFrame::Body(body) => match decode_body(&body) {
                        Ok(message) => {
                            if let Err(e) = self.server.handle_message(pid, message) {
                                ShellServer::log_rejected(pid, &e);
                            }
                        }
                        Err(e) => warn!("⚠️ Dropped malformed frame from {}: {}", pid, e),
                    },
                }
                self.after_change();
            }
            Inbound::Closed { conn, pid } => {
                if self.is_current(pid, conn) {
                    debug!("Shell channel of {} closed", pid);
                    self.on_death(pid);
                }
            }
        }
    }

    fn on_death(&mut self, pid: ProcessId) {
        self.monitor.unwatch(pid);
        if let Some(connection) = self.connections.remove(&pid) {
            connection.abort();
        }
        self.server.reap(pid);
        self.after_change();
    }

    fn on_command(&mut self, command: ShellCommand) {
        let result = match command {
            ShellCommand::StatusItemClicked { owner, handle } => {
                self.server.status_item_clicked(owner, handle)
            }
            ShellCommand::ClickAt { x, y } => match self.presenter.tray_item_at(x, y) {
                Some((owner, handle)) => self.server.status_item_clicked(owner, handle),
                None => Ok(()),
            },
            ShellCommand::Activate(pid) => self.server.set_active(pid),
            ShellCommand::Frame(reply) => {
                let _ = reply.send(self.server.render());
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!("⚠️ Shell command failed: {}", e);
        }
        self.after_change();
    }

    fn after_change(&mut self) {
        if self.server.take_dirty() {
            self.schedule_redraw();
        }
    }

    /// Arm the coalescing timer unless it is already armed
    fn schedule_redraw(&mut self) {
        if self.redraw_at.is_none() {
            self.redraw_at = Some(Instant::now() + self.config.redraw_coalesce());
        }
    }

    fn redraw(&mut self) {
        self.redraw_at = None;
        // Changes made while drawing are picked up by the next redraw
        self.server.take_dirty();
        let frame = self.server.render();
        if let Err(e) = self.presenter.present(&frame) {
            error!("❌ Failed to present bar frame: {}", e);
        }
    }
}

async fn read_loop(
    conn: ConnectionId,
    pid: ProcessId,
    mut reader: OwnedReadHalf,
    max: u32,
    events: mpsc::Sender<Inbound>,
) {
    loop {
        match read_frame(&mut reader, max).await {
            Ok(Some(frame)) => {
                if events.send(Inbound::Frame { conn, pid, frame }).await.is_err() {
                    return;
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Read from {} failed: {}", pid, e);
                break;
            }
        }
    }
    let _ = events.send(Inbound::Closed { conn, pid }).await;
}

async fn write_loop(
    pid: ProcessId,
    mut writer: OwnedWriteHalf,
    mut outbox: mpsc::UnboundedReceiver<Message>,
    max: u32,
) {
    while let Some(message) = outbox.recv().await {
        if let Err(e) = write_message(&mut writer, &message, max).await {
            debug!("Write to {} failed: {}", pid, e);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_label_formats() {
        let label = clock_label("%H:%M");
        assert_eq!(label.len(), 5);
        assert_eq!(label.as_bytes()[2], b':');
    }

    #[test]
    fn test_clock_label_bad_format_falls_back() {
        assert_eq!(clock_label("%Q%"), "--:--");
    }

    #[test]
    fn test_until_next_minute_is_bounded() {
        let wait = until_next_minute();
        assert!(wait <= Duration::from_secs(61));
        assert!(wait > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_reader_waits_for_queue_space() {
        use crate::channel::{encode_frame, MenuNode};
        use tokio::io::AsyncWriteExt;

        let (server_end, mut app_end) = UnixStream::pair().unwrap();
        let (read_half, _write_half) = server_end.into_split();
        let (tx, mut rx) = mpsc::channel(1);
        let pid = ProcessId(7);
        let reader = tokio::spawn(read_loop(ConnectionId(0), pid, read_half, 1024, tx));

        let frame = encode_frame(&Message::RegisterMenu(MenuNode::new("App")), 1024).unwrap();
        for _ in 0..3 {
            app_end.write_all(&frame).await.unwrap();
        }
        drop(app_end);

        // One frame queued, the reader parked on the next
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!reader.is_finished());

        let mut frames = 0;
        while let Some(event) = rx.recv().await {
            match event {
                Inbound::Frame { .. } => frames += 1,
                Inbound::Closed { pid: closed, .. } => {
                    assert_eq!(closed, pid);
                    break;
                }
            }
        }
        assert_eq!(frames, 3);
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("shell.sock");

        let first = bind(&path).unwrap();
        drop(first);
        assert!(path.exists());
        let _second = bind(&path).unwrap();
    }
}
