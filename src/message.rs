// ABOUTME: In-memory message bodies and their wire encode/decode, one type per Command variant
// ABOUTME: Builders compute exact body lengths up front rather than aliasing in-memory structs onto wire bytes

use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::{CPU_MAX, MAX_OPTION_SIZE, META_FRAGMENT_MAX, UDP_MAX_PACKET};
use bytes::{Buf, BufMut, BytesMut};

/// The only option command currently defined on the wire.
pub const OPT_USETCP: u32 = 1;

/// An in-memory TINIT option. Only `USETCP` (empty string payload) is
/// understood; any other `opt_cmd` observed while decoding is a protocol
/// violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TinitOption {
    pub opt_cmd: u32,
    pub data: Vec<u8>,
}

impl TinitOption {
    pub fn use_tcp() -> Self {
        TinitOption {
            opt_cmd: OPT_USETCP,
            data: Vec::new(),
        }
    }

    /// On-wire length of this option, including its own `size` field.
    fn encoded_len(&self) -> usize {
        // opt_size(4) + opt_cmd(4) + str_size(4) + bytes
        12 + self.data.len()
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u32(self.encoded_len() as u32);
        buf.put_u32(self.opt_cmd);
        buf.put_u32(self.data.len() as u32);
        buf.extend_from_slice(&self.data);
    }
}

/// In-memory TINIT body: advertised CPU count, page size, and options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tinit {
    pub cpus: u32,
    pub page_size: u32,
    pub options: Vec<TinitOption>,
}

impl Tinit {
    /// Build a TINIT, auto-inserting the USETCP option when `page_size`
    /// is large enough that per-CPU UDP datagrams would overflow.
    pub fn new(cpus: u32, page_size: u32) -> Self {
        let mut options = Vec::new();
        if page_size as usize >= UDP_MAX_PACKET {
            tracing::warn!(
                page_size,
                "page size exceeds UDP_MAX_PACKET, auto-negotiating TCP"
            );
            options.push(TinitOption::use_tcp());
        }
        Tinit {
            cpus,
            page_size,
            options,
        }
    }

    pub fn uses_tcp(&self) -> bool {
        self.options.iter().any(|o| o.opt_cmd == OPT_USETCP)
    }

    /// Exact body length: `12 + sum(option lengths)`.
    pub fn encoded_len(&self) -> usize {
        12 + self.options.iter().map(TinitOption::encoded_len).sum::<usize>()
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u32(self.cpus);
        buf.put_u32(self.page_size);
        buf.put_u32(self.options.len() as u32);
        for opt in &self.options {
            opt.encode_into(&mut buf);
        }
        buf
    }

    /// Decode a TINIT body, iterating exactly `opt_num` options and
    /// advancing by each option's self-declared size. Rejects oversized
    /// options and unknown option commands.
    pub fn decode(mut body: &[u8]) -> ProtocolResult<Self> {
        if body.len() < 12 {
            return Err(ProtocolError::ProtocolViolation(
                "TINIT body shorter than fixed header".into(),
            ));
        }
        let cpus = body.get_u32();
        let page_size = body.get_u32();
        let opt_num = body.get_u32();

        let mut options = Vec::with_capacity(opt_num as usize);
        for _ in 0..opt_num {
            if body.len() < 12 {
                return Err(ProtocolError::ProtocolViolation(
                    "truncated TINIT option".into(),
                ));
            }
            let opt_size = body.get_u32() as usize;
            if opt_size > MAX_OPTION_SIZE {
                return Err(ProtocolError::ProtocolViolation(format!(
                    "TINIT option size {opt_size} exceeds MAX_OPTION_SIZE"
                )));
            }
            if opt_size < 12 {
                return Err(ProtocolError::ProtocolViolation(format!(
                    "TINIT option size {opt_size} smaller than option header"
                )));
            }
            let opt_cmd = body.get_u32();
            let str_size = body.get_u32() as usize;
            if str_size != opt_size - 12 || body.len() < str_size {
                return Err(ProtocolError::ProtocolViolation(
                    "TINIT option string length mismatch".into(),
                ));
            }
            if opt_cmd != OPT_USETCP {
                return Err(ProtocolError::ProtocolViolation(format!(
                    "unknown TINIT option command {opt_cmd}"
                )));
            }
            let data = body[..str_size].to_vec();
            body.advance(str_size);
            options.push(TinitOption { opt_cmd, data });
        }

        Ok(Tinit {
            cpus,
            page_size,
            options,
        })
    }
}

/// In-memory RINIT body. The wire array is always `CPU_MAX` wide; only the
/// first `cpus` entries are meaningful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rinit {
    pub cpus: u32,
    pub ports: Vec<u32>,
}

impl Rinit {
    /// Build an RINIT from a live port list. Refuses to build when
    /// `ports.len() > CPU_MAX`.
    pub fn new(ports: Vec<u32>) -> ProtocolResult<Self> {
        if ports.len() > CPU_MAX {
            return Err(ProtocolError::ResourceExhaustion(format!(
                "cpu count {} exceeds CPU_MAX ({CPU_MAX})",
                ports.len()
            )));
        }
        Ok(Rinit {
            cpus: ports.len() as u32,
            ports,
        })
    }

    /// Body length is fixed regardless of the live CPU count:
    /// `4 + 4 * CPU_MAX`.
    pub fn encoded_len() -> usize {
        4 + 4 * CPU_MAX
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(Self::encoded_len());
        buf.put_u32(self.cpus);
        // Copy exactly one port per iteration onto the fixed-width wire
        // array; the reference copies `sizeof(be32) * cpu_count` bytes
        // inside this loop, an over-copy the fixed-size buffer happens to
        // absorb. We do not reproduce that.
        for i in 0..CPU_MAX {
            let port = self.ports.get(i).copied().unwrap_or(0);
            buf.put_u32(port);
        }
        buf
    }

    pub fn decode(mut body: &[u8]) -> ProtocolResult<Self> {
        if body.len() != Self::encoded_len() {
            return Err(ProtocolError::ProtocolViolation(format!(
                "RINIT body length {} != expected {}",
                body.len(),
                Self::encoded_len()
            )));
        }
        let cpus = body.get_u32();
        if cpus as usize > CPU_MAX {
            return Err(ProtocolError::ProtocolViolation(format!(
                "RINIT advertises {cpus} cpus, exceeding CPU_MAX"
            )));
        }
        let mut ports = Vec::with_capacity(cpus as usize);
        for i in 0..CPU_MAX {
            let port = body.get_u32();
            if i < cpus as usize {
                ports.push(port);
            }
        }
        Ok(Rinit { cpus, ports })
    }
}

/// A single metadata fragment carried by one SENDMETA frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    pub data: Vec<u8>,
}

impl Meta {
    pub fn encoded_len(&self) -> usize {
        4 + self.data.len()
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u32(self.data.len() as u32);
        buf.extend_from_slice(&self.data);
        buf
    }

    pub fn decode(mut body: &[u8]) -> ProtocolResult<Self> {
        if body.len() < 4 {
            return Err(ProtocolError::ProtocolViolation(
                "SENDMETA body shorter than Str header".into(),
            ));
        }
        let str_size = body.get_u32() as usize;
        if body.len() != str_size {
            return Err(ProtocolError::ProtocolViolation(format!(
                "SENDMETA str_size {str_size} does not match body length {}",
                body.len()
            )));
        }
        Ok(Meta {
            data: body.to_vec(),
        })
    }

    /// Split `blob` into fragments of at most [`META_FRAGMENT_MAX`] bytes
    /// each, in send order. A zero-length blob yields a single empty
    /// fragment so the caller still emits one SENDMETA before FINMETA —
    /// callers that want to skip empty bodies entirely may filter it out.
    pub fn chunks(blob: &[u8]) -> Vec<Meta> {
        if blob.is_empty() {
            return Vec::new();
        }
        blob.chunks(META_FRAGMENT_MAX)
            .map(|c| Meta { data: c.to_vec() })
            .collect()
    }
}

/// In-memory SVR_RECORD_REQ body: a C-terminated parameter string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRecordReq {
    pub param: String,
}

impl ServerRecordReq {
    pub fn new(param: impl Into<String>) -> Self {
        ServerRecordReq { param: param.into() }
    }

    /// `4 + len(param) + 1` (the trailing NUL).
    pub fn encoded_len(&self) -> usize {
        4 + self.param.len() + 1
    }

    pub fn encode(&self) -> BytesMut {
        let mut bytes = self.param.as_bytes().to_vec();
        bytes.push(0);
        let mut buf = BytesMut::with_capacity(4 + bytes.len());
        buf.put_u32(bytes.len() as u32);
        buf.extend_from_slice(&bytes);
        buf
    }

    pub fn decode(mut body: &[u8]) -> ProtocolResult<Self> {
        if body.len() < 4 + 4 {
            return Err(ProtocolError::ProtocolViolation(
                "SVR_RECORD_REQ body too short".into(),
            ));
        }
        let param_size = body.get_u32() as usize;
        if body.len() != param_size {
            return Err(ProtocolError::ProtocolViolation(
                "SVR_RECORD_REQ param_size mismatch".into(),
            ));
        }
        if param_size == 0 || body[param_size - 1] != 0 {
            return Err(ProtocolError::ProtocolViolation(
                "SVR_RECORD_REQ param not NUL-terminated".into(),
            ));
        }
        let param = String::from_utf8_lossy(&body[..param_size - 1]).into_owned();
        Ok(ServerRecordReq { param })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tinit_roundtrip_no_options() {
        let t = Tinit {
            cpus: 2,
            page_size: 4096,
            options: vec![],
        };
        let encoded = t.encode();
        assert_eq!(encoded.len(), t.encoded_len());
        let decoded = Tinit::decode(&encoded).unwrap();
        assert_eq!(decoded, t);
    }

    #[test]
    fn tinit_auto_inserts_usetcp_at_large_page_size() {
        let t = Tinit::new(2, 65536);
        assert!(t.uses_tcp());
    }

    #[test]
    fn tinit_small_page_size_has_no_options() {
        let t = Tinit::new(2, 4096);
        assert!(!t.uses_tcp());
        assert!(t.options.is_empty());
    }

    #[test]
    fn tinit_roundtrip_with_usetcp_option() {
        let t = Tinit {
            cpus: 4,
            page_size: 65536,
            options: vec![TinitOption::use_tcp()],
        };
        let encoded = t.encode();
        let decoded = Tinit::decode(&encoded).unwrap();
        assert_eq!(decoded, t);
        assert!(decoded.uses_tcp());
    }

    #[test]
    fn tinit_decode_rejects_unknown_option() {
        let mut buf = BytesMut::new();
        buf.put_u32(2);
        buf.put_u32(4096);
        buf.put_u32(1);
        buf.put_u32(12); // opt_size
        buf.put_u32(42); // unknown opt_cmd
        buf.put_u32(0); // str_size
        let err = Tinit::decode(&buf).unwrap_err();
        assert!(matches!(err, ProtocolError::ProtocolViolation(_)));
    }

    #[test]
    fn tinit_decode_rejects_oversized_option() {
        let mut buf = BytesMut::new();
        buf.put_u32(2);
        buf.put_u32(4096);
        buf.put_u32(1);
        buf.put_u32((MAX_OPTION_SIZE + 13) as u32);
        buf.put_u32(OPT_USETCP);
        buf.put_u32((MAX_OPTION_SIZE + 1) as u32);
        buf.extend_from_slice(&vec![0u8; MAX_OPTION_SIZE + 1]);
        let err = Tinit::decode(&buf).unwrap_err();
        assert!(matches!(err, ProtocolError::ProtocolViolation(_)));
    }

    #[test]
    fn rinit_fixed_width_regardless_of_cpu_count() {
        for n in [0usize, 1, 2, 200, CPU_MAX] {
            let ports: Vec<u32> = (0..n as u32).map(|i| 40000 + i).collect();
            let r = Rinit::new(ports).unwrap();
            let encoded = r.encode();
            assert_eq!(encoded.len(), 4 + 4 * CPU_MAX);
        }
    }

    #[test]
    fn rinit_refuses_over_cpu_max() {
        let ports = vec![1u32; CPU_MAX + 1];
        assert!(Rinit::new(ports).is_err());
    }

    #[test]
    fn rinit_roundtrip() {
        let r = Rinit::new(vec![40001, 40002]).unwrap();
        let encoded = r.encode();
        let decoded = Rinit::decode(&encoded).unwrap();
        assert_eq!(decoded.cpus, 2);
        assert_eq!(decoded.ports, vec![40001, 40002]);
    }

    #[test]
    fn meta_chunking_splits_on_fragment_boundary() {
        let blob = vec![7u8; 3 * META_FRAGMENT_MAX + 17];
        let chunks = Meta::chunks(&blob);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].data.len(), META_FRAGMENT_MAX);
        assert_eq!(chunks[1].data.len(), META_FRAGMENT_MAX);
        assert_eq!(chunks[2].data.len(), META_FRAGMENT_MAX);
        assert_eq!(chunks[3].data.len(), 17);

        let mut reassembled = Vec::new();
        for c in &chunks {
            reassembled.extend_from_slice(&c.data);
        }
        assert_eq!(reassembled, blob);
    }

    #[test]
    fn meta_roundtrip() {
        let m = Meta {
            data: b"hello metadata".to_vec(),
        };
        let encoded = m.encode();
        let decoded = Meta::decode(&encoded).unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn server_record_req_roundtrip() {
        let r = ServerRecordReq::new("record --connect host -e sched_switch");
        let encoded = r.encode();
        assert_eq!(encoded.len(), r.encoded_len());
        let decoded = ServerRecordReq::decode(&encoded).unwrap();
        assert_eq!(decoded, r);
    }

    #[test]
    fn server_record_req_rejects_missing_terminator() {
        let mut buf = BytesMut::new();
        buf.put_u32(4);
        buf.extend_from_slice(b"abcd");
        let err = ServerRecordReq::decode(&buf).unwrap_err();
        assert!(matches!(err, ProtocolError::ProtocolViolation(_)));
    }
}
