//! Tutor Core
//!
//! The real-time tutoring pipeline, independent of any transport: learner
//! profile and session-record storage, prompt composition, reply parsing, the
//! per-turn processor, and the per-connection session controller.

mod atomic;
pub mod engines;
pub mod error;
pub mod profile;
pub mod prompt;
pub mod records;
pub mod reply;
pub mod session;
pub mod turn;

pub use error::{StorageError, TurnError};
pub use profile::{FileProfileStore, LearnerProfile, ProfileStore};
pub use records::{ConversationTurn, FileSessionStore, SessionRecord, SessionStore};
pub use reply::StructuredReply;
pub use session::{
    Flow, Inbound, SessionController, SessionEvent, SessionPolicy, SessionState, TutorServices,
};
pub use turn::{TurnProcessor, TurnTimeouts};
