// ABOUTME: Frame wire codec: the length-prefixed, big-endian envelope every control message travels in
// ABOUTME: Encode/decode of the Frame header plus the fixed protocol constants (MAX_FRAME, CPU_MAX, ...)

use crate::error::{ProtocolError, ProtocolResult};
use bytes::{Buf, BufMut, BytesMut};
use num_enum::TryFromPrimitive;

/// Hard cap on a single frame's total length, header included.
///
/// The reference implementation sizes this to `BUFSIZ` (8192 on Linux
/// glibc); we hardcode it rather than reading libc's notion of BUFSIZ.
pub const MAX_FRAME: usize = 8192;

/// Frame header length: `size(4) || cmd(4)`.
pub const FRAME_HDR_LEN: usize = 8;

/// Upper bound on per-CPU port entries carried by an RINIT frame.
pub const CPU_MAX: usize = 256;

/// Largest single TINIT option body accepted by the server.
pub const MAX_OPTION_SIZE: usize = 4096;

/// Threshold above which per-CPU data streams auto-negotiate TCP instead of UDP.
pub const UDP_MAX_PACKET: usize = 65507;

/// Default receive deadline for a timed frame read.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Largest metadata fragment a single SENDMETA frame can carry:
/// `MAX_FRAME - (frame header + Str header)`.
pub const META_FRAGMENT_MAX: usize = MAX_FRAME - FRAME_HDR_LEN - 4;

/// The closed set of command tags that may appear on the wire.
///
/// 2, 3 and anything `>= 10` are reserved and rejected as protocol
/// violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u32)]
pub enum Command {
    Close = 1,
    Tinit = 4,
    Rinit = 5,
    SendMeta = 6,
    FinMeta = 7,
    SvrRecordReq = 8,
    SvrRecordAck = 9,
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Close => "CLOSE",
            Command::Tinit => "TINIT",
            Command::Rinit => "RINIT",
            Command::SendMeta => "SENDMETA",
            Command::FinMeta => "FINMETA",
            Command::SvrRecordReq => "SVR_RECORD_REQ",
            Command::SvrRecordAck => "SVR_RECORD_ACK",
        };
        f.write_str(name)
    }
}

/// A decoded frame: its command tag plus the raw, still-unparsed body.
///
/// Frames are ephemeral by design: produced by [`decode_frame`], consumed
/// by a message-specific parser in [`crate::message`], then dropped.
#[derive(Debug, Clone)]
pub struct Frame {
    pub cmd: Command,
    pub body: BytesMut,
}

impl Frame {
    pub fn new(cmd: Command, body: BytesMut) -> Self {
        Frame { cmd, body }
    }

    /// Total on-wire length of this frame, header included.
    pub fn wire_len(&self) -> usize {
        FRAME_HDR_LEN + self.body.len()
    }
}

/// Encode `cmd` and `body` into a single contiguous frame buffer, ready for
/// one write.
///
/// Refuses to build a frame whose total length would exceed [`MAX_FRAME`].
#[tracing::instrument(skip(body), fields(cmd = %cmd))]
pub fn encode_frame(cmd: Command, body: &[u8]) -> ProtocolResult<BytesMut> {
    let total = FRAME_HDR_LEN + body.len();
    if total > MAX_FRAME {
        return Err(ProtocolError::ProtocolViolation(format!(
            "encoded frame length {total} exceeds MAX_FRAME ({MAX_FRAME})"
        )));
    }
    let mut buf = BytesMut::with_capacity(total);
    buf.put_u32(total as u32);
    buf.put_u32(cmd as u32);
    buf.extend_from_slice(body);
    Ok(buf)
}

/// Parsed frame header: total frame size and raw command tag, prior to
/// command validation.
pub struct FrameHeader {
    pub size: u32,
    pub cmd_raw: u32,
}

/// Decode the 8-byte frame header already read into `hdr`, validating the
/// `8 <= size <= MAX_FRAME` bound. Does not yet resolve `cmd_raw` to a
/// [`Command`] — callers do that so unknown commands can be reported with
/// the offending numeric value.
pub fn decode_header(mut hdr: &[u8]) -> ProtocolResult<FrameHeader> {
    debug_assert_eq!(hdr.len(), FRAME_HDR_LEN);
    let size = hdr.get_u32();
    let cmd_raw = hdr.get_u32();
    if !(FRAME_HDR_LEN as u32..=MAX_FRAME as u32).contains(&size) {
        return Err(ProtocolError::ProtocolViolation(format!(
            "frame size {size} out of bounds [{FRAME_HDR_LEN}, {MAX_FRAME}]"
        )));
    }
    Ok(FrameHeader { size, cmd_raw })
}

/// Resolve a raw command tag, rejecting reserved/unknown values.
#[tracing::instrument]
pub fn resolve_command(cmd_raw: u32) -> ProtocolResult<Command> {
    Command::try_from(cmd_raw)
        .map_err(|_| ProtocolError::ProtocolViolation(format!("unknown command {cmd_raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_frame_header_matches_wire_len() {
        let body = [1u8, 2, 3, 4];
        let buf = encode_frame(Command::FinMeta, &body).unwrap();
        assert_eq!(buf.len(), FRAME_HDR_LEN + body.len());
        let mut slice = &buf[..];
        assert_eq!(slice.get_u32(), (FRAME_HDR_LEN + body.len()) as u32);
        assert_eq!(slice.get_u32(), Command::FinMeta as u32);
    }

    #[test]
    fn encode_frame_rejects_oversized_body() {
        let body = vec![0u8; MAX_FRAME];
        let err = encode_frame(Command::SendMeta, &body).unwrap_err();
        assert!(matches!(err, ProtocolError::ProtocolViolation(_)));
    }

    #[test]
    fn decode_header_rejects_undersized() {
        let mut hdr = BytesMut::with_capacity(8);
        hdr.put_u32(4);
        hdr.put_u32(Command::Close as u32);
        let err = decode_header(&hdr).unwrap_err();
        assert!(matches!(err, ProtocolError::ProtocolViolation(_)));
    }

    #[test]
    fn decode_header_rejects_oversized() {
        let mut hdr = BytesMut::with_capacity(8);
        hdr.put_u32(MAX_FRAME as u32 + 1);
        hdr.put_u32(Command::Close as u32);
        let err = decode_header(&hdr).unwrap_err();
        assert!(matches!(err, ProtocolError::ProtocolViolation(_)));
    }

    #[test]
    fn resolve_command_rejects_reserved_values() {
        assert!(resolve_command(2).is_err());
        assert!(resolve_command(3).is_err());
        assert!(resolve_command(10).is_err());
    }

    #[test]
    fn resolve_command_accepts_known_values() {
        assert!(matches!(resolve_command(1), Ok(Command::Close)));
        assert!(matches!(resolve_command(9), Ok(Command::SvrRecordAck)));
    }
}
