//! WebSocket Session Transport
//!
//! Maps the browser's WebSocket to a `tutor_core::SessionController`:
//!
//! - `protocol`: The JSON envelopes exchanged with the client.
//! - `session`: The connection lifecycle, from upgrade to teardown.

pub mod protocol;
pub mod session;

pub use session::ws_handler;
