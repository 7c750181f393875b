//! Defines the WebSocket message protocol between the browser client and the API server.

use serde::{Deserialize, Serialize};
use tutor_core::session::{Inbound, SessionEvent, TurnFeedback};

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// One complete recorded utterance.
    Audio {
        /// Base64-encoded audio bytes.
        #[serde(default)]
        audio: String,
    },
    /// The learner is done; persist the session.
    EndSession,
}

impl From<ClientMessage> for Inbound {
    fn from(msg: ClientMessage) -> Self {
        match msg {
            ClientMessage::Audio { audio } => Inbound::Audio { payload: audio },
            ClientMessage::EndSession => Inbound::EndSession,
        }
    }
}

/// Decodes a text frame. Anything that is not a known envelope is `Malformed`.
pub fn decode(text: &str) -> Inbound {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg.into(),
        Err(e) => Inbound::Malformed {
            reason: e.to_string(),
        },
    }
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Progress or welcome text.
    Status {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        level: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_number: Option<u32>,
    },
    /// The result of one turn.
    Correction {
        #[serde(flatten)]
        feedback: Box<TurnFeedback>,
    },
    /// A recoverable failure; the session stays open.
    Error { message: String },
}

impl From<SessionEvent> for ServerMessage {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::Status {
                message,
                level,
                session_number,
            } => ServerMessage::Status {
                message,
                level,
                session_number,
            },
            SessionEvent::Correction(feedback) => ServerMessage::Correction { feedback },
            SessionEvent::Error { message } => ServerMessage::Error { message },
        }
    }
}
