// ABOUTME: Server control state machine: LISTEN -> TINIT_RECEIVED -> RINIT_SENT -> META_INGEST -> DONE
// ABOUTME: Metadata bytes are delivered to the caller's sink in strict send order, never partially

use crate::connection::Connection;
use crate::error::{SessionError, SessionResult};
use crate::frame::{Command, DEFAULT_TIMEOUT_MS};
use crate::message::{Meta, Rinit, Tinit};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Server-side session states, per the control state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Listen,
    TinitReceived,
    RinitSent,
    MetaIngest,
    Done,
    Failed,
}

/// Drives one server control session over an accepted socket.
pub struct ServerSession {
    conn: Connection,
    state: ServerState,
    receive_timeout: Option<Duration>,
}

impl ServerSession {
    pub fn new(conn: Connection) -> Self {
        ServerSession {
            conn,
            state: ServerState::Listen,
            receive_timeout: Some(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
        }
    }

    /// Suspend the receive deadline indefinitely, matching the reference's
    /// debug-mode behavior.
    pub fn with_debug(mut self, debug: bool) -> Self {
        if debug {
            self.receive_timeout = None;
        }
        self
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    fn require_state(&mut self, expected: ServerState) -> SessionResult<()> {
        if self.state != expected {
            self.state = ServerState::Failed;
            return Err(SessionError::InvalidState(format!(
                "expected {expected:?}, session is in {:?}",
                self.state
            )));
        }
        Ok(())
    }

    /// LISTEN: receive a frame within the deadline; require `cmd = TINIT`.
    /// Option iteration and bounds (MAX_OPTION_SIZE, known option set) are
    /// enforced by [`Tinit::decode`]. Moves to TINIT_RECEIVED.
    pub async fn accept_tinit(&mut self) -> SessionResult<Tinit> {
        self.require_state(ServerState::Listen)?;
        let frame = self
            .conn
            .read_frame_timeout(self.receive_timeout)
            .await
            .map_err(SessionError::from)?;

        if frame.cmd != Command::Tinit {
            self.state = ServerState::Failed;
            tracing::warn!(cmd = %frame.cmd, "expected TINIT, failing session");
            return Err(SessionError::UnexpectedCommand {
                expected: "TINIT".into(),
                actual: frame.cmd.to_string(),
            });
        }

        let tinit = Tinit::decode(&frame.body)?;
        if tinit.page_size == 0 {
            self.state = ServerState::Failed;
            return Err(SessionError::InvalidState("page_size must be > 0".into()));
        }
        self.state = ServerState::TinitReceived;
        Ok(tinit)
    }

    /// TINIT_RECEIVED: build and send RINIT carrying `ports`. Moves to
    /// RINIT_SENT.
    pub async fn send_rinit(&mut self, ports: Vec<u32>) -> SessionResult<()> {
        self.require_state(ServerState::TinitReceived)?;
        let rinit = Rinit::new(ports)?;
        self.conn
            .write_frame(Command::Rinit, &rinit.encode())
            .await
            .map_err(SessionError::from)?;
        self.state = ServerState::RinitSent;
        Ok(())
    }

    /// RINIT_SENT -> META_INGEST: repeatedly receive frames. SENDMETA
    /// writes its payload to `sink` (a short write is retried to
    /// completion before the next frame is read); FINMETA ends the loop.
    /// Any other command is a protocol violation. After the loop, await
    /// exactly one more frame and require CLOSE before moving to DONE.
    pub async fn ingest_metadata<W>(&mut self, sink: &mut W) -> SessionResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        self.require_state(ServerState::RinitSent)?;
        self.state = ServerState::MetaIngest;

        loop {
            let frame = self
                .conn
                .read_frame_timeout(self.receive_timeout)
                .await
                .map_err(SessionError::from)?;

            match frame.cmd {
                Command::SendMeta => {
                    let meta = Meta::decode(&frame.body)?;
                    sink.write_all(&meta.data).await?;
                }
                Command::FinMeta => break,
                other => {
                    self.state = ServerState::Failed;
                    return Err(SessionError::UnexpectedCommand {
                        expected: "SENDMETA or FINMETA".into(),
                        actual: other.to_string(),
                    });
                }
            }
        }

        self.await_close().await
    }

    /// Await exactly one more frame after metadata ingest; require
    /// `cmd = CLOSE`, then move to DONE.
    pub async fn await_close(&mut self) -> SessionResult<()> {
        let frame = self
            .conn
            .read_frame_timeout(self.receive_timeout)
            .await
            .map_err(SessionError::from)?;

        if frame.cmd != Command::Close {
            self.state = ServerState::Failed;
            return Err(SessionError::UnexpectedCommand {
                expected: "CLOSE".into(),
                actual: frame.cmd.to_string(),
            });
        }
        self.state = ServerState::Done;
        Ok(())
    }
}
