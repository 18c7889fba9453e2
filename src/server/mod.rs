// ABOUTME: Server-side control session: accepts TINIT, replies RINIT, ingests metadata, observes CLOSE
// ABOUTME: See session.rs for the state machine; this module just re-exports its public surface

mod session;

pub use session::{ServerSession, ServerState};
