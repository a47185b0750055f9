//! crates/cognify_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{DocumentArtifact, Session, SessionSummary, Turn, TurnRole};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// The failure taxonomy shared by all port operations.
///
/// Only `Storage` is treated as fatal by the conversation engine; every other
/// variant degrades to a user-visible status or an apologetic turn.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// The platform offers no speech capability (e.g. no STT credentials).
    /// Reported to the user as guidance, never retried automatically.
    #[error("Speech capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// Document text extraction failed; the session stays usable without a document.
    #[error("Document extraction failed: {0}")]
    ExtractionFailed(String),

    /// The generative model service could not be reached or errored.
    #[error("Model service unavailable: {0}")]
    ModelUnavailable(String),

    /// The session store could not complete the operation. Fatal for the caller.
    #[error("Storage unavailable: {0}")]
    Storage(String),

    /// A referenced entity does not exist.
    #[error("Item not found: {0}")]
    NotFound(String),

    /// Catch-all for failures outside the taxonomy above.
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Durable record of sessions, their turns, their document artifacts, and
/// mastery counters. Single-writer per session; every mutation bumps the
/// owning session's `updated_at`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Allocates a new session with zeroed counters and the default title.
    async fn create_session(&self) -> PortResult<Uuid>;

    /// Reads a session. `Ok(None)` is the normal "start fresh" outcome, not an error.
    async fn load_session(&self, session_id: Uuid) -> PortResult<Option<Session>>;

    /// Appends a turn. Turns are append-only.
    async fn append_turn(&self, session_id: Uuid, role: TurnRole, text: &str) -> PortResult<()>;

    /// All turns for a session, ascending by creation order.
    async fn list_turns(&self, session_id: Uuid) -> PortResult<Vec<Turn>>;

    /// Inserts a new document artifact for the session.
    async fn add_artifact(
        &self,
        session_id: Uuid,
        file_name: &str,
        extracted_text: &str,
        chapter_index: &[String],
    ) -> PortResult<()>;

    /// All artifacts for a session, ascending by upload order. The caller
    /// derives the active artifact as the last element.
    async fn list_artifacts(&self, session_id: Uuid) -> PortResult<Vec<DocumentArtifact>>;

    /// Atomically increments `total_evaluated`, and `correct_count` iff `correct`.
    /// Must be applied exactly once per evaluated answer.
    async fn record_evaluation(&self, session_id: Uuid, correct: bool) -> PortResult<()>;

    /// Replaces the session title. Idempotent.
    async fn rename_session(&self, session_id: Uuid, title: &str) -> PortResult<()>;

    /// Deletes the session and cascades to all its turns and artifacts.
    async fn delete_session(&self, session_id: Uuid) -> PortResult<()>;

    /// All sessions with their turn/artifact counts, most recently active first.
    async fn list_sessions_summary(&self) -> PortResult<Vec<SessionSummary>>;
}

/// The generative language-model service: one free-text channel that both the
/// index protocol and the dialogue protocol are layered on.
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Sends a single prompt and returns the raw completion text.
    async fn complete(&self, prompt: &str) -> PortResult<String>;
}

#[async_trait]
pub trait SpeechToTextService: Send + Sync {
    /// Transcribes a slice of audio data into text.
    async fn transcribe_audio(&self, audio_data: &[u8]) -> PortResult<String>;
}

#[async_trait]
pub trait TextToSpeechService: Send + Sync {
    /// Generates audio data from a string of text.
    async fn generate_audio(&self, text: &str) -> PortResult<Vec<u8>>;
}

/// Black-box document text extraction: file bytes in, plain text out.
#[async_trait]
pub trait DocumentExtractionService: Send + Sync {
    async fn extract(&self, file_name: &str, file_bytes: &[u8]) -> PortResult<String>;
}
