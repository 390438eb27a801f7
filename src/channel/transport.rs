//! Async frame I/O for the server side of the shell channel

use super::codec::{encode_frame, HEADER_LEN};
use super::{ChannelError, Message, ProcessId};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;

/// One frame pulled off the socket
#[derive(Debug, PartialEq, Eq)]
pub enum InboundFrame {
    /// Kind byte plus payload, ready for [`super::decode_body`]
    Body(Vec<u8>),
    /// A frame above the size limit; its bytes were consumed and discarded
    Oversized(u32),
}

/// Read the next frame.
///
/// Returns `Ok(None)` when the peer closed the stream on a frame boundary.
/// An oversized frame is skipped without being buffered so the stream stays
/// in sync and the session survives.
pub async fn read_frame<R>(reader: &mut R, max_body: u32) -> Result<Option<InboundFrame>, ChannelError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            return if filled == 0 {
                Ok(None)
            } else {
                Err(ChannelError::Closed)
            };
        }
        filled += n;
    }

    let len = u32::from_be_bytes(header);
    if len > max_body {
        let mut limited = (&mut *reader).take(u64::from(len));
        let skipped = tokio::io::copy(&mut limited, &mut tokio::io::sink()).await?;
        if skipped < u64::from(len) {
            return Err(ChannelError::Closed);
        }
        return Ok(Some(InboundFrame::Oversized(len)));
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ChannelError::Closed
        } else {
            ChannelError::Io(e)
        }
    })?;
    Ok(Some(InboundFrame::Body(body)))
}

/// Encode and write one message
pub async fn write_message<W>(writer: &mut W, message: &Message, max_body: u32) -> Result<(), ChannelError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(message, max_body)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Identity of the process on the other end of a Unix socket
pub fn peer_process(stream: &UnixStream) -> Result<ProcessId, ChannelError> {
    let cred = stream.peer_cred()?;
    cred.pid()
        .and_then(|pid| u32::try_from(pid).ok())
        .map(ProcessId)
        .ok_or_else(|| {
            ChannelError::Io(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "peer credentials carry no process id",
            ))
        })
}
