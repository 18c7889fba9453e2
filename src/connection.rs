// ABOUTME: Async wrapper around a control socket: buffered frame reads/writes plus a timed receive
// ABOUTME: Retries short reads and writes, distinguishes clean disconnect from a truncated frame

use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::{self, Command, Frame, DEFAULT_TIMEOUT_MS, FRAME_HDR_LEN, MAX_FRAME};
use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

/// One control socket plus its read-side scratch buffer.
///
/// The scratch buffer is the one piece of per-session state that outlives
/// a single frame; every parsed [`Frame`] is otherwise ephemeral.
pub struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Connection {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(MAX_FRAME),
        }
    }

    /// Read one frame, retrying on short reads until the full frame is
    /// buffered.
    ///
    /// A peer that closes cleanly at a frame boundary (no bytes of a new
    /// frame pending) yields [`ProtocolError::Disconnected`] — distinct
    /// from a well-formed CLOSE frame, which callers see as an ordinary
    /// decoded [`Frame`] and interpret themselves. A peer that disappears
    /// mid-frame yields [`ProtocolError::Truncated`], never a hang.
    #[tracing::instrument(skip(self))]
    pub async fn read_frame(&mut self) -> ProtocolResult<Frame> {
        loop {
            if let Some(frame) = self.try_parse_frame()? {
                return Ok(frame);
            }

            let had_pending = !self.buffer.is_empty();
            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                if had_pending {
                    return Err(ProtocolError::Truncated);
                }
                return Err(ProtocolError::Disconnected);
            }
        }
    }

    /// Like [`Connection::read_frame`], but fails with
    /// [`ProtocolError::Timeout`] if no frame arrives within `deadline`.
    /// Passing `None` suspends the deadline indefinitely (debug mode).
    pub async fn read_frame_timeout(&mut self, deadline: Option<Duration>) -> ProtocolResult<Frame> {
        match deadline {
            None => self.read_frame().await,
            Some(d) => match tokio::time::timeout(d, self.read_frame()).await {
                Ok(result) => result,
                Err(_) => Err(ProtocolError::Timeout),
            },
        }
    }

    /// Convenience wrapper using the protocol's [`DEFAULT_TIMEOUT_MS`].
    pub async fn read_frame_default_timeout(&mut self) -> ProtocolResult<Frame> {
        self.read_frame_timeout(Some(Duration::from_millis(DEFAULT_TIMEOUT_MS)))
            .await
    }

    fn try_parse_frame(&mut self) -> ProtocolResult<Option<Frame>> {
        if self.buffer.len() < FRAME_HDR_LEN {
            return Ok(None);
        }
        let header = frame::decode_header(&self.buffer[..FRAME_HDR_LEN])?;
        let total = header.size as usize;
        if self.buffer.len() < total {
            return Ok(None);
        }

        let cmd = frame::resolve_command(header.cmd_raw)?;
        let mut framed = self.buffer.split_to(total);
        framed.advance(FRAME_HDR_LEN);
        Ok(Some(Frame::new(cmd, framed)))
    }

    /// Encode and write one frame, flushing the socket. Short writes are
    /// retried from the offset by `write_all`; any I/O error aborts the
    /// frame as a transport failure.
    #[tracing::instrument(skip(self, body), fields(cmd = %cmd))]
    pub async fn write_frame(&mut self, cmd: Command, body: &[u8]) -> ProtocolResult<()> {
        let encoded = frame::encode_frame(cmd, body)?;
        self.stream.write_all(&encoded).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Split off the underlying stream, e.g. to hand a data connection to
    /// an external helper. Consumes the connection.
    pub fn into_inner(self) -> TcpStream {
        self.stream.into_inner()
    }
}
