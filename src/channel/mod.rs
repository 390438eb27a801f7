//! Shell channel: the registration link between applications and the shell
//!
//! Applications describe their menu and their status items to the shell
//! server over a Unix socket. Every message is self-contained, so a message
//! that is dropped or delivered twice never leaves the server with a partial
//! tree: `RegisterMenu` always carries the whole menu.
//!
//! The wire framing lives in [`codec`]; the async socket helpers used by the
//! server live in [`transport`]. The blocking client end is
//! [`crate::client::ShellClient`].

pub mod codec;
pub mod transport;

use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub use codec::{decode_body, encode_frame, FrameDecoder, MAX_MENU_DEPTH};

/// OS process identity of a connected application.
///
/// Always taken from the socket's peer credentials, never from a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProcessId(pub u32);

impl ProcessId {
    /// The calling process
    pub fn current() -> Self {
        Self(std::process::id())
    }

    pub fn as_raw(self) -> libc::pid_t {
        self.0 as libc::pid_t
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status item handle chosen by the owning application.
///
/// Only meaningful together with the owner's [`ProcessId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StatusHandle(pub u64);

impl fmt::Display for StatusHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One node of an application menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuNode {
    pub title: String,
    /// Keyboard shortcut shown next to the title, e.g. "Ctrl+Q"
    pub key_equivalent: Option<String>,
    pub enabled: bool,
    pub children: Vec<MenuNode>,
}

impl MenuNode {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            key_equivalent: None,
            enabled: true,
            children: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key_equivalent = Some(key.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_child(mut self, child: MenuNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = MenuNode>) -> Self {
        self.children.extend(children);
        self
    }

    /// Number of nodes in the tree, root included
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(MenuNode::node_count).sum::<usize>()
    }

    /// Depth of the tree; a lone root has depth 1
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(MenuNode::depth).max().unwrap_or(0)
    }
}

/// Icon shown for a status item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IconRef {
    None,
    /// Themed icon name, e.g. "network-wireless"
    Named(String),
}

/// Everything the shell needs to draw one status item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusItemPayload {
    pub icon: IconRef,
    pub title: String,
}

impl StatusItemPayload {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            icon: IconRef::None,
            title: title.into(),
        }
    }

    pub fn with_icon(mut self, name: impl Into<String>) -> Self {
        self.icon = IconRef::Named(name.into());
        self
    }
}

/// Wire discriminant of a [`Message`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    RegisterMenu = 0,
    RegisterStatusItem = 1,
    UnregisterStatusItem = 2,
    Activate = 3,
}

impl TryFrom<u8> for MessageKind {
    type Error = ChannelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageKind::RegisterMenu),
            1 => Ok(MessageKind::RegisterStatusItem),
            2 => Ok(MessageKind::UnregisterStatusItem),
            3 => Ok(MessageKind::Activate),
            other => Err(ChannelError::UnknownKind(other)),
        }
    }
}

/// Messages exchanged over the shell channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Replace the sender's whole menu tree
    RegisterMenu(MenuNode),
    /// Add or update one of the sender's status items
    RegisterStatusItem {
        handle: StatusHandle,
        payload: StatusItemPayload,
    },
    /// Remove one of the sender's status items
    UnregisterStatusItem(StatusHandle),
    /// Server to client: the application gained (true) or lost (false) the bar
    Activate(bool),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::RegisterMenu(_) => MessageKind::RegisterMenu,
            Message::RegisterStatusItem { .. } => MessageKind::RegisterStatusItem,
            Message::UnregisterStatusItem(_) => MessageKind::UnregisterStatusItem,
            Message::Activate(_) => MessageKind::Activate,
        }
    }

    /// True for the messages a client may send to the server
    pub fn is_client_request(&self) -> bool {
        !matches!(self, Message::Activate(_))
    }
}

/// Shell channel errors
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("I/O error on shell channel: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shell channel closed by peer")]
    Closed,

    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: u64, max: u32 },

    #[error("Empty frame")]
    EmptyFrame,

    #[error("Payload truncated while reading {0}")]
    Truncated(&'static str),

    #[error("Unknown message kind: {0}")]
    UnknownKind(u8),

    #[error("Invalid {0} tag: {1}")]
    InvalidTag(&'static str, u8),

    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("Menu nesting deeper than {0} levels")]
    TooDeep(usize),

    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),

    #[error("Unexpected {0:?} message for this direction")]
    UnexpectedMessage(MessageKind),

    #[error("Peer did not accept the frame within {0:?}")]
    SendTimedOut(std::time::Duration),
}

impl ChannelError {
    /// Whether the connection itself is gone, as opposed to one bad message
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChannelError::Io(_) | ChannelError::Closed | ChannelError::SendTimedOut(_)
        )
    }
}
