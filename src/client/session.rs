// ABOUTME: Client control state machine: INIT -> TINIT_SENT -> RINIT_RECEIVED -> META_STREAMING -> META_FIN_SENT -> CLOSED
// ABOUTME: Each transition is a straight-line sequence of codec calls; failures move the session to FAILED

use crate::config::SessionConfig;
use crate::connection::Connection;
use crate::error::{SessionError, SessionResult};
use crate::frame::Command;
use crate::message::{Meta, Rinit, Tinit};

/// Client-side session states, per the control state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Init,
    TinitSent,
    RinitReceived,
    MetaStreaming,
    MetaFinSent,
    Closed,
    Failed,
}

/// Drives one client control session over an already-connected socket.
///
/// The caller is responsible for establishing the socket (host/port
/// resolution and connection are a network-helper concern, out of scope
/// here) and for obtaining the metadata bytes to stream.
pub struct ClientSession {
    conn: Connection,
    config: SessionConfig,
    state: ClientState,
    ports: Vec<u32>,
}

impl ClientSession {
    pub fn new(conn: Connection, config: SessionConfig) -> Self {
        ClientSession {
            conn,
            config,
            state: ClientState::Init,
            ports: Vec::new(),
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Ports published by the server's RINIT, valid once
    /// [`ClientState::RinitReceived`] has been reached.
    pub fn ports(&self) -> &[u32] {
        &self.ports
    }

    pub fn use_tcp(&self) -> bool {
        self.config.use_tcp
    }

    fn require_state(&mut self, expected: ClientState) -> SessionResult<()> {
        if self.state != expected {
            self.state = ClientState::Failed;
            return Err(SessionError::InvalidState(format!(
                "expected {expected:?}, session is in {:?}",
                self.state
            )));
        }
        Ok(())
    }

    /// INIT: build and send TINIT advertising `cpu_count`/`page_size`
    /// (auto-negotiating TCP at large page sizes), then move to
    /// TINIT_SENT.
    pub async fn send_tinit(&mut self) -> SessionResult<()> {
        self.require_state(ClientState::Init)?;
        let tinit = Tinit::new(self.config.cpu_count, self.config.page_size);
        self.config.use_tcp = tinit.uses_tcp();
        self.conn
            .write_frame(Command::Tinit, &tinit.encode())
            .await
            .map_err(SessionError::from)?;
        self.state = ClientState::TinitSent;
        Ok(())
    }

    /// TINIT_SENT: await a frame within the session's receive deadline.
    /// CLOSE aborts as [`SessionError::PeerClosed`]; anything but RINIT
    /// fails the session. On RINIT, publish the ports and move to
    /// RINIT_RECEIVED.
    pub async fn receive_rinit(&mut self) -> SessionResult<&[u32]> {
        self.require_state(ClientState::TinitSent)?;
        let frame = self
            .conn
            .read_frame_timeout(self.config.receive_timeout)
            .await?;

        match frame.cmd {
            Command::Close => {
                self.state = ClientState::Failed;
                Err(SessionError::PeerClosed)
            }
            Command::Rinit => {
                let rinit = Rinit::decode(&frame.body)?;
                self.ports = rinit.ports;
                self.state = ClientState::RinitReceived;
                Ok(&self.ports)
            }
            other => {
                self.state = ClientState::Failed;
                Err(SessionError::UnexpectedCommand {
                    expected: "RINIT".into(),
                    actual: other.to_string(),
                })
            }
        }
    }

    /// RINIT_RECEIVED: stream `blob` as a sequence of SENDMETA frames of
    /// at most `MAX_FRAME - 12` bytes each, then send FINMETA. Moves to
    /// META_FIN_SENT.
    pub async fn send_metadata(&mut self, blob: &[u8]) -> SessionResult<()> {
        self.require_state(ClientState::RinitReceived)?;
        self.state = ClientState::MetaStreaming;

        for chunk in Meta::chunks(blob) {
            self.conn
                .write_frame(Command::SendMeta, &chunk.encode())
                .await
                .map_err(SessionError::from)?;
        }
        self.conn
            .write_frame(Command::FinMeta, &[])
            .await
            .map_err(SessionError::from)?;
        self.state = ClientState::MetaFinSent;
        Ok(())
    }

    /// META_FIN_SENT: emit CLOSE and move to CLOSED. The connection is
    /// retained by the caller (it was cached at FINMETA time in the
    /// reference so an asynchronous exit path could still close
    /// gracefully); here ownership already lives with the caller since
    /// `ClientSession` owns the connection for its whole lifetime.
    pub async fn close(&mut self) -> SessionResult<()> {
        self.require_state(ClientState::MetaFinSent)?;
        self.conn
            .write_frame(Command::Close, &[])
            .await
            .map_err(SessionError::from)?;
        self.state = ClientState::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerSession;
    use tokio::net::{TcpListener, TcpStream};

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr);
        let (accepted, client) = tokio::join!(listener.accept(), client);
        (accepted.unwrap().0, client.unwrap())
    }

    #[tokio::test]
    async fn minimal_handshake_two_cpus_no_options() {
        let (server_stream, client_stream) = connected_pair().await;

        let server_task = tokio::spawn(async move {
            let mut server = ServerSession::new(Connection::new(server_stream));
            let tinit = server.accept_tinit().await.unwrap();
            assert_eq!(tinit.cpus, 2);
            assert!(!tinit.uses_tcp());
            server.send_rinit(vec![40001, 40002]).await.unwrap();
            let mut sink = Vec::new();
            server.ingest_metadata(&mut sink).await.unwrap();
            server.await_close().await.unwrap();
        });

        let config = SessionConfig::new(2, 4096);
        let mut client = ClientSession::new(Connection::new(client_stream), config);
        client.send_tinit().await.unwrap();
        let ports = client.receive_rinit().await.unwrap().to_vec();
        assert_eq!(ports, vec![40001, 40002]);
        assert!(!client.use_tcp());
        client.send_metadata(&[]).await.unwrap();
        client.close().await.unwrap();

        server_task.await.unwrap();
    }
}
