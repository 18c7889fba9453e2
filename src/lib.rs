//! A Rust implementation of the remote trace-recording control protocol:
//! the framed control channel a trace-collecting client and a recording
//! peer use to negotiate parameters, exchange per-CPU data ports, stream
//! captured metadata, and terminate cleanly.
//!
//! # Quick start
//!
//! ```no_run
//! use tracecmd_link::client::ClientSession;
//! use tracecmd_link::config::SessionConfig;
//! use tracecmd_link::connection::Connection;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = tokio::net::TcpStream::connect("127.0.0.1:7685").await?;
//! let mut session = ClientSession::new(Connection::new(stream), SessionConfig::new(2, 4096));
//! session.send_tinit().await?;
//! let ports = session.receive_rinit().await?.to_vec();
//! println!("data ports: {ports:?}");
//! session.send_metadata(b"trace metadata bytes").await?;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`frame`] — the wire envelope (`Frame`/`Command`) and protocol constants.
//! - [`message`] — in-memory bodies for each command and their codecs.
//! - [`connection`] — buffered async reads/writes over a control socket.
//! - [`config`] — per-session configuration, replacing process-wide globals.
//! - [`client`] / [`server`] — the two control state machines.
//! - [`svr_record`] — the server-record sub-protocol (C5).
//! - [`fanout`] — `--connect` argv parsing and connection fan-out (C6).
//! - [`hooks`] — the event-hook descriptor parser (C7).

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod fanout;
pub mod frame;
pub mod hooks;
pub mod message;
pub mod server;
pub mod svr_record;

pub use client::ClientSession;
pub use config::SessionConfig;
pub use connection::Connection;
pub use error::{ProtocolError, ProtocolResult, SessionError, SessionResult};
pub use frame::{Command, Frame};
pub use server::ServerSession;
