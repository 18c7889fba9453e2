// ABOUTME: Wire-level and session-level error types for the trace-recording control protocol
// ABOUTME: Mirrors the codec/session error split: ProtocolError for framing, SessionError for the control API

use std::io;
use thiserror::Error;

/// Errors arising from frame-level decode, encode or option validation.
///
/// These are the "wire" errors: anything that can go wrong interpreting or
/// producing bytes on a control socket, independent of the state machine
/// that's driving it.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// I/O error on the underlying socket, excluding EOF mid-frame.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Peer closed the byte stream cleanly before a frame completed.
    #[error("peer disconnected")]
    Disconnected,

    /// A frame started but the stream ended before the body was complete.
    #[error("truncated frame")]
    Truncated,

    /// No frame observed within the receive deadline.
    #[error("receive timed out")]
    Timeout,

    /// Frame size outside `8..=MAX_FRAME`, unknown command, unexpected
    /// command for the current state, oversized option, or unknown option
    /// command.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Buffer allocation failure or parameter overflow while parsing
    /// fan-out arguments.
    #[error("resource exhausted: {0}")]
    ResourceExhaustion(String),

    /// Malformed hook descriptor or `--connect` argument list.
    #[error("parse error: {0}")]
    ParseError(String),
}

/// Session-facing error type wrapping [`ProtocolError`] plus the
/// higher-level failures a client or server session can hit.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Wire-level failure; fatal to the session.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A well-formed CLOSE frame arrived out of the expected sequence.
    #[error("peer closed session early")]
    PeerClosed,

    /// Remote endpoint sent a frame the current state didn't expect.
    #[error("unexpected command: expected {expected}, got {actual}")]
    UnexpectedCommand { expected: String, actual: String },

    /// State machine invoked out of order (e.g. sending metadata before RINIT).
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// Writing ingested metadata to the caller-supplied sink failed.
    #[error("metadata sink error: {0}")]
    Sink(#[from] io::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
pub type SessionResult<T> = Result<T, SessionError>;
