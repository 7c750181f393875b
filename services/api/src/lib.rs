//! Tutor API Library Crate
//!
//! This library contains the web-facing side of the German tutor: the
//! application state, configuration, REST handlers, WebSocket transport, and
//! routing. The binaries in `bin/` are thin wrappers around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
