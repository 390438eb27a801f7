//! Shell server: the owner of the global top bar
//!
//! The server keeps one [`AppSession`] per connected application together
//! with the menu trees ([`MenuRegistry`]) and status items ([`StatusTray`])
//! those applications registered. Everything here is synchronous and owned
//! by a single value; the socket plumbing and timers that drive it live in
//! [`service`].
//!
//! The bar is a pure function of the live sessions, the active session, and
//! the clock label: see [`ShellServer::render`].

pub mod frame;
pub mod liveness;
pub mod menu;
pub mod present;
pub mod service;
pub mod tray;

use crate::channel::{ChannelError, Message, MessageKind, ProcessId, StatusHandle};
use crate::config::ShellConfig;
use log::{debug, info, warn};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;

pub use frame::{AppMenuFrame, FrameDescription, MenuTitle, TrayIconFrame};
pub use liveness::LivenessMonitor;
pub use menu::MenuRegistry;
pub use present::{BarLayout, BarPresenter, LogPresenter, PixmapPresenter, RecordingPresenter};
pub use service::{ShellCommand, ShellHandle, ShellService};
pub use tray::{StatusItem, StatusTray};

/// Shell server errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShellError {
    #[error("No session for process {0}")]
    UnknownSession(ProcessId),

    #[error("Process {0} already has a live session")]
    DuplicateSession(ProcessId),

    #[error("Session limit of {limit} reached")]
    TooManySessions { limit: usize },

    #[error("Process {owner} already owns {limit} status items")]
    TooManyStatusItems { owner: ProcessId, limit: usize },

    #[error("Process {owner} has no status item {handle}")]
    UnknownStatusItem { owner: ProcessId, handle: StatusHandle },

    #[error("Process {0} sent a {1:?} message, which only the server may send")]
    UnexpectedMessage(ProcessId, MessageKind),
}

/// Server end of one application's shell channel
#[derive(Debug, Clone)]
pub struct SessionEndpoint {
    outbox: mpsc::UnboundedSender<Message>,
}

impl SessionEndpoint {
    /// Endpoint plus the receiver its writer task drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (outbox, rx) = mpsc::unbounded_channel();
        (Self { outbox }, rx)
    }

    /// Queue a message for the application without waiting
    pub fn send(&self, message: Message) -> Result<(), ChannelError> {
        self.outbox.send(message).map_err(|_| ChannelError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }
}

/// Lifecycle of a session. Reaped sessions are removed outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Channel accepted, nothing parsed yet
    Connecting,
    /// At least one message parsed
    Active,
}

/// Server-side record of one connected application
#[derive(Debug)]
pub struct AppSession {
    pub pid: ProcessId,
    pub state: SessionState,
    endpoint: SessionEndpoint,
}

impl AppSession {
    pub fn endpoint(&self) -> &SessionEndpoint {
        &self.endpoint
    }
}

/// The shell's registration state
#[derive(Debug)]
pub struct ShellServer {
    max_sessions: usize,
    max_status_items: usize,
    sessions: HashMap<ProcessId, AppSession>,
    menus: MenuRegistry,
    tray: StatusTray,
    active: Option<ProcessId>,
    clock: String,
    dirty: bool,
}

impl ShellServer {
    pub fn new(config: &ShellConfig) -> Self {
        Self {
            max_sessions: config.max_sessions,
            max_status_items: config.max_status_items_per_app,
            sessions: HashMap::new(),
            menus: MenuRegistry::new(),
            tray: StatusTray::new(),
            active: None,
            clock: String::new(),
            dirty: false,
        }
    }

    /// Accept a newly connected application.
    ///
    /// The session starts out `Connecting`; its place in the bar is fixed
    /// now, by connection order.
    pub fn open_session(&mut self, pid: ProcessId, endpoint: SessionEndpoint) -> Result<(), ShellError> {
        if self.sessions.contains_key(&pid) {
            return Err(ShellError::DuplicateSession(pid));
        }
        if self.sessions.len() >= self.max_sessions {
            return Err(ShellError::TooManySessions {
                limit: self.max_sessions,
            });
        }

        self.sessions.insert(
            pid,
            AppSession {
                pid,
                state: SessionState::Connecting,
                endpoint,
            },
        );
        self.menus.attach(pid);
        self.tray.attach(pid);
        info!("🤝 Application {} connected to the shell", pid);
        Ok(())
    }

    /// Apply one message from `pid` to that session only.
    ///
    /// A `Connecting` session is promoted by its first accepted message;
    /// a rejected message leaves the session, and the active marker, as they were.
    pub fn handle_message(&mut self, pid: ProcessId, message: Message) -> Result<(), ShellError> {
        if !self.sessions.contains_key(&pid) {
            return Err(ShellError::UnknownSession(pid));
        }
        if !message.is_client_request() {
            return Err(ShellError::UnexpectedMessage(pid, message.kind()));
        }

        self.apply(pid, message)?;
        self.dirty = true;

        let promoted = match self.sessions.get_mut(&pid) {
            Some(session) if session.state == SessionState::Connecting => {
                session.state = SessionState::Active;
                true
            }
            _ => false,
        };
        if promoted {
            debug!("Session {} is now active", pid);
            if self.active.is_none() {
                self.set_active(pid)?;
            }
        }
        Ok(())
    }

    fn apply(&mut self, pid: ProcessId, message: Message) -> Result<(), ShellError> {
        match message {
            Message::RegisterMenu(tree) => {
                debug!(
                    "📋 Process {} registered a menu with {} nodes",
                    pid,
                    tree.node_count()
                );
                self.menus.replace(pid, tree);
            }
            Message::RegisterStatusItem { handle, payload } => {
                let added = self
                    .tray
                    .register(pid, handle, payload, self.max_status_items)?;
                debug!(
                    "📌 Process {} {} status item {}",
                    pid,
                    if added { "added" } else { "updated" },
                    handle
                );
            }
            Message::UnregisterStatusItem(handle) => {
                if !self.tray.unregister(pid, handle) {
                    return Err(ShellError::UnknownStatusItem { owner: pid, handle });
                }
                debug!("Process {} removed status item {}", pid, handle);
            }
            Message::Activate(_) => {
                return Err(ShellError::UnexpectedMessage(pid, MessageKind::Activate));
            }
        }
        Ok(())
    }

    /// Make `pid` the one active session and tell both sides of the switch
    pub fn set_active(&mut self, pid: ProcessId) -> Result<(), ShellError> {
        if !self.sessions.contains_key(&pid) {
            return Err(ShellError::UnknownSession(pid));
        }
        if self.active == Some(pid) {
            return Ok(());
        }

        if let Some(previous) = self.active.replace(pid) {
            self.notify(previous, Message::Activate(false));
        }
        self.notify(pid, Message::Activate(true));
        info!("🎯 Process {} is now the active application", pid);
        self.dirty = true;
        Ok(())
    }

    /// Activate the owner of a clicked tray icon
    pub fn status_item_clicked(&mut self, owner: ProcessId, handle: StatusHandle) -> Result<(), ShellError> {
        if self.tray.get(owner, handle).is_none() {
            return Err(ShellError::UnknownStatusItem { owner, handle });
        }
        self.set_active(owner)
    }

    fn notify(&self, pid: ProcessId, message: Message) {
        if let Some(session) = self.sessions.get(&pid) {
            if let Err(e) = session.endpoint.send(message) {
                debug!("Could not notify process {}: {}", pid, e);
            }
        }
    }

    /// Remove a dead application and everything it registered.
    ///
    /// Returns false when `pid` had no session, which makes duplicate death
    /// notifications harmless.
    pub fn reap(&mut self, pid: ProcessId) -> bool {
        let Some(session) = self.sessions.remove(&pid) else {
            return false;
        };

        self.menus.remove(pid);
        let items = self.tray.detach(pid);
        if self.active == Some(pid) {
            self.active = None;
        }
        self.dirty = true;

        info!(
            "🧹 Reaped process {} ({:?}, {} status items)",
            session.pid, session.state, items
        );
        true
    }

    /// Update the clock label; returns true if it changed
    pub fn set_clock(&mut self, label: impl Into<String>) -> bool {
        let label = label.into();
        if label == self.clock {
            return false;
        }
        self.clock = label;
        self.dirty = true;
        true
    }

    /// Whether anything changed since the last call
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Describe the bar for the current state
    pub fn render(&self) -> FrameDescription {
        let app_menu = self.active.and_then(|pid| {
            self.menus
                .get(pid)
                .map(|tree| AppMenuFrame::from_tree(pid, tree))
        });

        FrameDescription {
            app_menu,
            clock: self.clock.clone(),
            tray: self.tray.items().map(TrayIconFrame::from).collect(),
        }
    }

    pub fn active(&self) -> Option<ProcessId> {
        self.active
    }

    pub fn session(&self, pid: ProcessId) -> Option<&AppSession> {
        self.sessions.get(&pid)
    }

    pub fn session_state(&self, pid: ProcessId) -> Option<SessionState> {
        self.sessions.get(&pid).map(|session| session.state)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// The stored menu tree of `pid`
    pub fn menu_of(&self, pid: ProcessId) -> Option<&crate::channel::MenuNode> {
        self.menus.get(pid)
    }

    /// The status items of `pid` in registration order
    pub fn status_items_of(&self, pid: ProcessId) -> &[StatusItem] {
        self.tray.items_of(pid)
    }

    /// Log and drop a message that could not be applied
    pub fn log_rejected(pid: ProcessId, error: &ShellError) {
        warn!("⚠️ Dropped message from process {}: {}", pid, error);
    }
}

#[cfg(test)]
mod tests;
