pub mod dialogue;
pub mod domain;
pub mod engine;
pub mod indexer;
pub mod ports;
pub mod progress;

pub use dialogue::{decompose_reply, DecomposedReply, Evaluation};
pub use domain::{DocumentArtifact, Session, SessionSummary, Turn, TurnRole};
pub use engine::{ConversationEngine, EngineState, TurnOutcome, UtteranceSource};
pub use indexer::DocumentIndexer;
pub use ports::{
    DocumentExtractionService, ModelService, PortError, PortResult, SessionStore,
    SpeechToTextService, TextToSpeechService,
};
