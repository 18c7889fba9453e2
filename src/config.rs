// ABOUTME: Per-session configuration, replacing the reference implementation's process-wide globals
// ABOUTME: Everything a session needs (cpu count, page size, tcp flag, timeouts) lives here instead of ambient state

use std::time::Duration;

/// Configuration captured once per control session.
///
/// The reference keeps `use_tcp`, `cpu_count`, `page_size`, and a debug
/// flag as process globals shared across every session in the address
/// space. A Rust process that runs more than one session concurrently
/// (this crate's fan-out, §4.6) cannot do that: each session owns its own
/// copy, built before any sub-task split and never mutated afterward.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Number of CPUs this session advertises (client) or expects (server).
    pub cpu_count: u32,
    /// Page size of the tracing ring buffer, advertised in TINIT.
    pub page_size: u32,
    /// Whether per-CPU data streams should use TCP. Set explicitly by the
    /// caller, or implied by `page_size >= UDP_MAX_PACKET` when building a
    /// TINIT via [`crate::message::Tinit::new`].
    pub use_tcp: bool,
    /// Receive deadline for timed frame reads. `None` suspends the
    /// deadline indefinitely, mirroring `tracecmd_msg_set_debug`.
    pub receive_timeout: Option<Duration>,
}

impl SessionConfig {
    pub fn new(cpu_count: u32, page_size: u32) -> Self {
        SessionConfig {
            cpu_count,
            page_size,
            use_tcp: false,
            receive_timeout: Some(Duration::from_millis(crate::frame::DEFAULT_TIMEOUT_MS)),
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

    pub fn with_use_tcp(mut self, use_tcp: bool) -> Self {
        self.use_tcp = use_tcp;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig::new(1, 4096)
    }
}
