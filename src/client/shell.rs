//! Application end of the shell channel
//!
//! A plain blocking Unix socket: the display client is single-threaded and
//! polls for `Activate` notices from its own event loop, so nothing here
//! needs a runtime. Writes carry a timeout so a shell that stops reading
//! cannot stall the application.

use crate::channel::{
    encode_frame, ChannelError, FrameDecoder, MenuNode, Message, StatusHandle, StatusItemPayload,
};
use log::{debug, warn};
use std::io::{ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

const READ_CHUNK: usize = 4096;

/// Longest a single `send` may wait for the shell to drain its socket
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct ShellClient {
    stream: UnixStream,
    decoder: FrameDecoder,
    max_body: u32,
    send_timeout: Duration,
}

impl ShellClient {
    pub fn connect(path: impl AsRef<Path>, max_body: u32) -> Result<Self, ChannelError> {
        let stream = UnixStream::connect(path.as_ref())?;
        debug!("Connected to shell at {:?}", path.as_ref());
        Self::from_stream(stream, max_body)
    }

    pub fn from_stream(stream: UnixStream, max_body: u32) -> Result<Self, ChannelError> {
        let mut client = Self {
            stream,
            decoder: FrameDecoder::new(max_body),
            max_body,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        };
        client.set_send_timeout(DEFAULT_SEND_TIMEOUT)?;
        Ok(client)
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Bound how long `send` may block. Zero is rounded up to one millisecond.
    pub fn set_send_timeout(&mut self, timeout: Duration) -> Result<(), ChannelError> {
        let timeout = timeout.max(Duration::from_millis(1));
        self.stream.set_write_timeout(Some(timeout))?;
        self.send_timeout = timeout;
        Ok(())
    }

    /// Send without waiting for any acknowledgement.
    ///
    /// Oversized messages are refused here, before anything is written.
    /// If the shell does not take the frame within the send timeout the
    /// channel is shut down, since a partly written frame cannot be resumed.
    pub fn send(&mut self, message: &Message) -> Result<(), ChannelError> {
        if !message.is_client_request() {
            return Err(ChannelError::UnexpectedMessage(message.kind()));
        }
        let frame = encode_frame(message, self.max_body)?;
        match self.stream.write_all(&frame) {
            Ok(()) => Ok(()),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                warn!("⚠️ Shell did not accept a {:?} frame within {:?}", message.kind(), self.send_timeout);
                let _ = self.stream.shutdown(Shutdown::Both);
                Err(ChannelError::SendTimedOut(self.send_timeout))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn register_menu(&mut self, tree: MenuNode) -> Result<(), ChannelError> {
        self.send(&Message::RegisterMenu(tree))
    }

    pub fn register_status_item(
        &mut self,
        handle: StatusHandle,
        payload: StatusItemPayload,
    ) -> Result<(), ChannelError> {
        self.send(&Message::RegisterStatusItem { handle, payload })
    }

    pub fn unregister_status_item(&mut self, handle: StatusHandle) -> Result<(), ChannelError> {
        self.send(&Message::UnregisterStatusItem(handle))
    }

    /// Next message from the shell, without blocking.
    ///
    /// `Ok(None)` means nothing complete has arrived yet;
    /// `Err(ChannelError::Closed)` means the shell hung up.
    pub fn try_recv(&mut self) -> Result<Option<Message>, ChannelError> {
        if let Some(message) = self.next_buffered()? {
            return Ok(Some(message));
        }

        self.stream.set_nonblocking(true)?;
        let filled = self.fill();
        self.stream.set_nonblocking(false)?;

        // Frames that arrived just before a hang-up are still delivered
        match self.next_buffered()? {
            Some(message) => Ok(Some(message)),
            None => filled.map(|_| None),
        }
    }

    fn fill(&mut self) -> Result<(), ChannelError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(ChannelError::Closed),
                Ok(n) => self.decoder.push(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn next_buffered(&mut self) -> Result<Option<Message>, ChannelError> {
        match self.decoder.next_message()? {
            Some(message) if message.is_client_request() => {
                Err(ChannelError::UnexpectedMessage(message.kind()))
            }
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::decode_body;

    const LIMIT: u32 = 64 * 1024;

    fn pair() -> (ShellClient, UnixStream) {
        let (client, server) = UnixStream::pair().unwrap();
        (ShellClient::from_stream(client, LIMIT).unwrap(), server)
    }

    #[test]
    fn test_send_writes_one_frame() {
        let (mut client, mut server) = pair();
        client.register_menu(MenuNode::new("App")).unwrap();

        let mut header = [0u8; 4];
        server.read_exact(&mut header).unwrap();
        let mut body = vec![0u8; u32::from_be_bytes(header) as usize];
        server.read_exact(&mut body).unwrap();
        assert_eq!(decode_body(&body).unwrap(), Message::RegisterMenu(MenuNode::new("App")));
    }

    #[test]
    fn test_oversized_message_rejected_synchronously() {
        let (client, _server) = UnixStream::pair().unwrap();
        let mut client = ShellClient::from_stream(client, 32).unwrap();
        let result = client.register_menu(MenuNode::new("x".repeat(100)));
        assert!(matches!(result, Err(ChannelError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_client_cannot_send_activate() {
        let (mut client, _server) = pair();
        assert!(matches!(
            client.send(&Message::Activate(true)),
            Err(ChannelError::UnexpectedMessage(_))
        ));
    }

    #[test]
    fn test_try_recv_is_non_blocking() {
        let (mut client, mut server) = pair();
        assert!(client.try_recv().unwrap().is_none());

        let frame = encode_frame(&Message::Activate(true), LIMIT).unwrap();
        // Deliver in two pieces to exercise reassembly
        server.write_all(&frame[..3]).unwrap();
        assert!(client.try_recv().unwrap().is_none());
        server.write_all(&frame[3..]).unwrap();
        assert_eq!(client.try_recv().unwrap(), Some(Message::Activate(true)));
    }

    #[test]
    fn test_send_to_stalled_shell_times_out() {
        let (mut client, _server) = pair();
        client.set_send_timeout(Duration::from_millis(50)).unwrap();

        // The peer never reads, so the socket buffer eventually fills up
        let big = MenuNode::new("x".repeat(60 * 1024));
        let started = std::time::Instant::now();
        let mut outcome = Ok(());
        for _ in 0..256 {
            outcome = client.register_menu(big.clone());
            if outcome.is_err() {
                break;
            }
        }
        assert!(matches!(outcome, Err(ChannelError::SendTimedOut(t)) if t == Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_secs(5));

        // The half-written frame poisons the stream, so the channel is gone
        assert!(matches!(client.try_recv(), Err(ChannelError::Closed)));
    }

    #[test]
    fn test_try_recv_reports_close() {
        let (mut client, server) = pair();
        drop(server);
        assert!(matches!(client.try_recv(), Err(ChannelError::Closed)));
    }
}
