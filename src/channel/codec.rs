//! Wire codec for shell channel frames.
//!
//! ```text
//! frame      = length:u32 kind:u8 payload
//! menu-node  = title-len:u32 title key-len:u32 key enabled:u8 child-count:u32 menu-node*
//! status     = handle:u64 icon-ref title-len:u32 title
//! icon-ref   = 0 | 1 name-len:u32 name
//! ```
//!
//! Integers are big-endian. `length` covers the kind byte and the payload.
//! Decoding validates every length against the bytes actually received
//! before allocating, so a hostile count cannot force a large allocation.

use super::{ChannelError, IconRef, MenuNode, Message, MessageKind, StatusHandle, StatusItemPayload};

/// Size of the length prefix
pub const HEADER_LEN: usize = 4;

/// Deepest menu nesting accepted from the wire
pub const MAX_MENU_DEPTH: usize = 16;

/// Smallest possible encoding of a menu node (empty strings, no children)
const MIN_MENU_NODE_LEN: usize = 4 + 4 + 1 + 4;

/// Encode a message as a complete frame, length prefix included.
///
/// Fails with `FrameTooLarge` when the frame would exceed `max_body`.
pub fn encode_frame(message: &Message, max_body: u32) -> Result<Vec<u8>, ChannelError> {
    let body = encode_body(message);
    let len = body.len() as u64;
    if len > u64::from(max_body) {
        return Err(ChannelError::FrameTooLarge { len, max: max_body });
    }
    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Encode the kind byte and payload of a message
pub fn encode_body(message: &Message) -> Vec<u8> {
    let mut out = vec![message.kind() as u8];
    match message {
        Message::RegisterMenu(tree) => put_menu(&mut out, tree),
        Message::RegisterStatusItem { handle, payload } => {
            out.extend_from_slice(&handle.0.to_be_bytes());
            match &payload.icon {
                IconRef::None => out.push(0),
                IconRef::Named(name) => {
                    out.push(1);
                    put_str(&mut out, name);
                }
            }
            put_str(&mut out, &payload.title);
        }
        Message::UnregisterStatusItem(handle) => out.extend_from_slice(&handle.0.to_be_bytes()),
        Message::Activate(active) => out.push(u8::from(*active)),
    }
    out
}

fn put_str(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u32).to_be_bytes());
    out.extend_from_slice(value.as_bytes());
}

fn put_menu(out: &mut Vec<u8>, node: &MenuNode) {
    put_str(out, &node.title);
    put_str(out, node.key_equivalent.as_deref().unwrap_or(""));
    out.push(u8::from(node.enabled));
    out.extend_from_slice(&(node.children.len() as u32).to_be_bytes());
    for child in &node.children {
        put_menu(out, child);
    }
}

/// Decode the kind byte and payload of one frame
pub fn decode_body(body: &[u8]) -> Result<Message, ChannelError> {
    let (&kind, payload) = body.split_first().ok_or(ChannelError::EmptyFrame)?;
    let mut reader = Reader::new(payload);

    let message = match MessageKind::try_from(kind)? {
        MessageKind::RegisterMenu => Message::RegisterMenu(reader.menu(1)?),
        MessageKind::RegisterStatusItem => {
            let handle = StatusHandle(reader.u64("status handle")?);
            let icon = match reader.u8("icon tag")? {
                0 => IconRef::None,
                1 => IconRef::Named(reader.string("icon name")?),
                tag => return Err(ChannelError::InvalidTag("icon", tag)),
            };
            let title = reader.string("status title")?;
            Message::RegisterStatusItem {
                handle,
                payload: StatusItemPayload { icon, title },
            }
        }
        MessageKind::UnregisterStatusItem => {
            Message::UnregisterStatusItem(StatusHandle(reader.u64("status handle")?))
        }
        MessageKind::Activate => Message::Activate(reader.u8("activate flag")? != 0),
    };

    match reader.remaining() {
        0 => Ok(message),
        extra => Err(ChannelError::TrailingBytes(extra)),
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], ChannelError> {
        if len > self.remaining() {
            return Err(ChannelError::Truncated(what));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, ChannelError> {
        Ok(self.take(1, what)?[0])
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, ChannelError> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u64(&mut self, what: &'static str) -> Result<u64, ChannelError> {
        let bytes = self.take(8, what)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(raw))
    }

    fn string(&mut self, what: &'static str) -> Result<String, ChannelError> {
        let len = self.u32(what)? as usize;
        let bytes = self.take(len, what)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| ChannelError::InvalidUtf8(what))
    }

    fn menu(&mut self, depth: usize) -> Result<MenuNode, ChannelError> {
        if depth > MAX_MENU_DEPTH {
            return Err(ChannelError::TooDeep(MAX_MENU_DEPTH));
        }

        let title = self.string("menu title")?;
        let key = self.string("menu key equivalent")?;
        let enabled = self.u8("menu enabled flag")? != 0;
        let child_count = self.u32("menu child count")? as usize;

        // Every child needs at least MIN_MENU_NODE_LEN bytes
        let needed = child_count
            .checked_mul(MIN_MENU_NODE_LEN)
            .ok_or(ChannelError::Truncated("menu children"))?;
        if needed > self.remaining() {
            return Err(ChannelError::Truncated("menu children"));
        }

        let mut children = Vec::with_capacity(child_count);
        for _ in 0..child_count {
            children.push(self.menu(depth + 1)?);
        }

        Ok(MenuNode {
            title,
            key_equivalent: if key.is_empty() { None } else { Some(key) },
            enabled,
            children,
        })
    }
}

/// Incremental frame splitter for byte streams read in arbitrary chunks
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_body: u32,
}

impl FrameDecoder {
    pub fn new(max_body: u32) -> Self {
        Self {
            buf: Vec::new(),
            max_body,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes received but not yet consumed as a frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete frame body, if one has fully arrived.
    ///
    /// An oversized length prefix is unrecoverable for a byte stream whose
    /// peer is not expected to send it, so the buffer is discarded.
    pub fn next_body(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        if len > self.max_body {
            self.buf.clear();
            return Err(ChannelError::FrameTooLarge {
                len: u64::from(len),
                max: self.max_body,
            });
        }
        let total = HEADER_LEN + len as usize;
        if self.buf.len() < total {
            return Ok(None);
        }
        let body = self.buf[HEADER_LEN..total].to_vec();
        self.buf.drain(..total);
        Ok(Some(body))
    }

    /// Pop and decode the next complete message
    pub fn next_message(&mut self) -> Result<Option<Message>, ChannelError> {
        match self.next_body()? {
            Some(body) => decode_body(&body).map(Some),
            None => Ok(None),
        }
    }
}
