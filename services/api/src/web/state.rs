//! services/api/src/web/state.rs
//!
//! Defines the application's shared and connection-specific states.

use crate::config::Config;
use cognify_core::engine::{ConversationEngine, EngineState};
use cognify_core::indexer::DocumentIndexer;
use cognify_core::ports::{
    DocumentExtractionService, SessionStore, SpeechToTextService, TextToSpeechService,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub engine: Arc<ConversationEngine>,
    pub indexer: Arc<DocumentIndexer>,
    pub extractor: Arc<dyn DocumentExtractionService>,
    pub stt: Arc<dyn SpeechToTextService>,
    pub tts: Arc<dyn TextToSpeechService>,
    pub config: Arc<Config>,
}

//=========================================================================================
// ConnectionState (Specific to One WebSocket Connection)
//=========================================================================================

/// The live state for a single WebSocket connection: one open session.
///
/// One explicit state value instead of scattered flags; the turn pipeline is
/// serialized per connection by only leaving `Idle`/`Responding` through the
/// transitions in `ws_handler`.
pub struct ConnectionState {
    pub session_id: Uuid,
    pub mode: EngineState,
    /// Raw PCM frames buffered while `mode == Capturing`.
    pub audio_buffer: Vec<u8>,
    /// Cancels the in-flight playback on barge-in. Replaced per utterance.
    pub playback_token: CancellationToken,
    /// Bumped each time a turn worker is spawned. A finishing worker may only
    /// touch `mode` while its generation is still the current one, so a
    /// pre-empted turn's cleanup cannot clobber its successor's state.
    pub turn_generation: u64,
}

impl ConnectionState {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            mode: EngineState::Idle,
            audio_buffer: Vec::new(),
            playback_token: CancellationToken::new(),
            turn_generation: 0,
        }
    }
}
