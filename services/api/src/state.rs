//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources: the tutoring services handed to every session, the
//! stores read by the REST endpoints, and the bookkeeping that lets open
//! sessions finish their teardown on shutdown.

use std::sync::Arc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tutor_core::{ProfileStore, SessionStore, TutorServices};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub tutor: TutorServices,
    /// Every WebSocket session task.
    pub tasks: TaskTracker,
    /// Cancelled when the server shuts down; sessions stop reading input.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(tutor: TutorServices) -> Self {
        Self {
            tutor,
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn profiles(&self) -> &Arc<dyn ProfileStore> {
        &self.tutor.profiles
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.tutor.sessions
    }

    /// Ends every open session and waits until each has persisted its record
    /// and profile update.
    pub async fn drain_sessions(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }
}
