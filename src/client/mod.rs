// ABOUTME: Client-side control session: drives TINIT -> RINIT -> metadata stream -> FINMETA -> CLOSE
// ABOUTME: See session.rs for the state machine; this module just re-exports its public surface

mod session;

pub use session::{ClientSession, ClientState};
