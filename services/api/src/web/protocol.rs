//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API
//! server for the voice tutoring loop.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================
// NOTE: The learner's utterance audio is sent as raw Binary frames between
// UtteranceStarted and UtteranceEnded, not as part of this enum.
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Initializes the connection. Must be the first message sent. An unknown
    /// or absent session id means "start fresh": the server creates a new
    /// session and reports its id back.
    Init { session_id: Option<Uuid> },

    /// The learner started speaking. Pre-empts any ongoing playback (barge-in)
    /// and opens the capture window for Binary audio frames.
    UtteranceStarted,

    /// The learner finished speaking. The buffered audio is transcribed and
    /// fed through the turn pipeline.
    UtteranceEnded,

    /// A pre-supplied utterance from a suggested-reply chip. Converges on the
    /// same turn pipeline as voice capture.
    QuickReply { text: String },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================
// NOTE: The tutor's voice is sent as raw Binary frames; these messages provide
// the lifecycle context for that audio.
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms initialization and names the session this connection drives.
    SessionInitialized { session_id: Uuid, title: String },

    /// The capture window opened; the UI can show a "listening" state.
    CaptureStarted,

    /// The capture window closed; the utterance is being processed.
    CaptureEnded,

    /// Tutor audio frames are about to stream; the UI can show "speaking".
    SpeakingStarted,

    /// Playback of the current tutor reply finished. Never sent for a reply
    /// whose playback was pre-empted by barge-in.
    SpeakingEnded,

    /// Echo of the learner turn as persisted, for rendering.
    LearnerTurn { text: String },

    /// The tutor's marker-stripped reply. `evaluation` is "correct" or
    /// "incorrect" when this turn judged the learner's answer.
    TutorTurn {
        text: String,
        evaluation: Option<String>,
    },

    /// The current suggested next replies. An empty list clears any chips the
    /// UI is showing; stale suggestions are never actionable twice.
    Suggestions { options: Vec<String> },

    /// The session title changed (derived from the first learner utterance).
    SessionRenamed { title: String },

    /// Updated mastery counters after an evaluated answer.
    Progress {
        correct_count: u32,
        total_evaluated: u32,
        mastery_percent: Option<u32>,
    },

    /// A non-fatal, user-facing status line (e.g. speech capability guidance).
    Status { message: String },

    /// Reports a fatal error to the client, which should display an error message.
    Error { message: String },
}
