// ABOUTME: Server-record sub-protocol: the TCP initiator asks its peer to perform the recording
// ABOUTME: Orthogonal to and precedes the client/server state machines, which take over after the ACK

use crate::connection::Connection;
use crate::error::{SessionError, SessionResult};
use crate::frame::Command;
use crate::message::ServerRecordReq;
use std::time::Duration;

/// Send SVR_RECORD_REQ carrying `param` (the whitespace-joined argv of the
/// downstream record command).
pub async fn send_record_request(conn: &mut Connection, param: &str) -> SessionResult<()> {
    let req = ServerRecordReq::new(param);
    conn.write_frame(Command::SvrRecordReq, &req.encode())
        .await?;
    Ok(())
}

/// Responder side: receive SVR_RECORD_REQ, decode and return its
/// parameter string. [`ServerRecordReq::decode`] already enforces the
/// `size > HDR + sizeof(u32)` and NUL-termination invariants.
pub async fn receive_record_request(
    conn: &mut Connection,
    timeout: Option<Duration>,
) -> SessionResult<ServerRecordReq> {
    let frame = conn.read_frame_timeout(timeout).await?;
    if frame.cmd != Command::SvrRecordReq {
        return Err(SessionError::UnexpectedCommand {
            expected: "SVR_RECORD_REQ".into(),
            actual: frame.cmd.to_string(),
        });
    }
    Ok(ServerRecordReq::decode(&frame.body)?)
}

/// Responder side: acknowledge with an empty-body SVR_RECORD_ACK.
pub async fn send_record_ack(conn: &mut Connection) -> SessionResult<()> {
    conn.write_frame(Command::SvrRecordAck, &[]).await?;
    Ok(())
}

/// Initiator side: wait for SVR_RECORD_ACK within `timeout`. Any other
/// command is fatal.
pub async fn await_record_ack(conn: &mut Connection, timeout: Option<Duration>) -> SessionResult<()> {
    let frame = conn.read_frame_timeout(timeout).await?;
    if frame.cmd != Command::SvrRecordAck {
        return Err(SessionError::UnexpectedCommand {
            expected: "SVR_RECORD_ACK".into(),
            actual: frame.cmd.to_string(),
        });
    }
    Ok(())
}
