//! services/api/src/web/turn_task.rs
//!
//! This module contains the asynchronous "worker" function responsible for
//! handling a single learner utterance end to end: capture → engine → playback.
//!
//! One worker runs per spawned turn. Each worker captures the connection's
//! `turn_generation` at entry and may only write `mode` while that generation
//! is still current: a pre-empted turn that finishes late must not clobber the
//! state of the turn that displaced it.

use crate::web::{
    protocol::ServerMessage,
    state::{AppState, ConnectionState},
    voice::VoiceLink,
};
use cognify_core::engine::{EngineState, UtteranceSource, CAPTURE_PREFIX};
use cognify_core::ports::{PortError, PortResult};
use cognify_core::progress;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// How the utterance entered this turn.
pub enum TurnInput {
    /// A finalized capture buffer awaiting transcription.
    CapturedAudio(Vec<u8>),
    /// A suggested-reply chip's text; skips the speech capability entirely.
    QuickReply(String),
}

/// The main asynchronous task for one learner turn.
///
/// Expects `mode == Reasoning` and a freshly bumped `turn_generation` on entry
/// (both set by the connection loop before spawning). Leaves the connection
/// `Idle` on every exit path, unless a newer turn or a barge-in capture has
/// taken over the mode in the meantime.
pub async fn turn_process(
    app_state: Arc<AppState>,
    conn_state_lock: Arc<Mutex<ConnectionState>>,
    voice: Arc<VoiceLink>,
    input: TurnInput,
) -> PortResult<()> {
    let (session_id, generation) = {
        let conn = conn_state_lock.lock().await;
        (conn.session_id, conn.turn_generation)
    };

    let (transcript, source) = match input {
        TurnInput::CapturedAudio(audio) => {
            if audio.is_empty() {
                info!("Empty capture; returning to idle.");
                settle_to_idle(&conn_state_lock, generation).await;
                return Ok(());
            }
            match voice.capture(&audio).await {
                Ok(transcript) => (transcript, UtteranceSource::Voice),
                Err(PortError::CapabilityUnavailable(reason)) => {
                    info!("Speech capture unavailable: {reason}");
                    voice
                        .send(&ServerMessage::Status {
                            message: "Speech recognition isn't available here. You can still answer with the suggested replies.".to_string(),
                        })
                        .await;
                    settle_to_idle(&conn_state_lock, generation).await;
                    return Ok(());
                }
                Err(e) => {
                    error!("Transcription failed: {e:?}");
                    settle_to_idle(&conn_state_lock, generation).await;
                    return Err(e);
                }
            }
        }
        TurnInput::QuickReply(text) => (text, UtteranceSource::QuickReply),
    };

    if transcript.trim().is_empty() {
        // Aborted/empty capture: Capturing -> Idle, no turn.
        settle_to_idle(&conn_state_lock, generation).await;
        return Ok(());
    }

    // New utterance submitted: stale suggestions stop being actionable now.
    voice
        .send(&ServerMessage::Suggestions { options: vec![] })
        .await;

    let echoed = match source {
        UtteranceSource::Voice => format!("{CAPTURE_PREFIX}{}", transcript.trim()),
        UtteranceSource::QuickReply => transcript.trim().to_string(),
    };
    voice.send(&ServerMessage::LearnerTurn { text: echoed }).await;

    let outcome = match app_state
        .engine
        .process_utterance(session_id, &transcript, source)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            // Only storage failures escape the engine; they are fatal for this
            // operation and surface as a blocking error.
            error!("Turn pipeline failed: {e:?}");
            voice
                .send(&ServerMessage::Error {
                    message: "Failed to save this exchange. Please try again.".to_string(),
                })
                .await;
            settle_to_idle(&conn_state_lock, generation).await;
            return Err(e);
        }
    };

    voice
        .send(&ServerMessage::TutorTurn {
            text: outcome.reply_text.clone(),
            evaluation: outcome.evaluation.map(|e| {
                match e {
                    cognify_core::dialogue::Evaluation::Correct => "correct",
                    cognify_core::dialogue::Evaluation::Incorrect => "incorrect",
                }
                .to_string()
            }),
        })
        .await;

    if let Some(title) = &outcome.derived_title {
        voice
            .send(&ServerMessage::SessionRenamed {
                title: title.clone(),
            })
            .await;
    }

    voice
        .send(&ServerMessage::Suggestions {
            options: outcome
                .suggestions
                .map(|pair| pair.to_vec())
                .unwrap_or_default(),
        })
        .await;

    if outcome.evaluation.is_some() {
        set_mode_if_current(&conn_state_lock, generation, EngineState::Evaluating).await;
        if let Ok(Some(session)) = app_state.store.load_session(session_id).await {
            voice
                .send(&ServerMessage::Progress {
                    correct_count: session.correct_count,
                    total_evaluated: session.total_evaluated,
                    mastery_percent: progress::mastery_percent(
                        session.correct_count,
                        session.total_evaluated,
                    ),
                })
                .await;
        }
    }

    // Playback under a fresh token; barge-in cancels it between chunks. A
    // stale turn skips playback entirely: the latest utterance wins.
    let playback_token = {
        let mut conn = conn_state_lock.lock().await;
        if conn.turn_generation != generation {
            info!("Turn pre-empted before playback; skipping.");
            return Ok(());
        }
        conn.mode = EngineState::Responding;
        conn.playback_token = CancellationToken::new();
        conn.playback_token.clone()
    };

    voice.speak(&outcome.reply_text, playback_token).await?;

    settle_to_idle(&conn_state_lock, generation).await;
    Ok(())
}

/// Writes `mode` only while `generation` is still the connection's current
/// turn generation.
async fn set_mode_if_current(
    conn_state_lock: &Arc<Mutex<ConnectionState>>,
    generation: u64,
    mode: EngineState,
) {
    let mut conn = conn_state_lock.lock().await;
    if conn.turn_generation == generation {
        conn.mode = mode;
    }
}

/// Returns the connection to `Idle`, unless this turn no longer owns the mode:
/// a barge-in already moved it to `Capturing`, or a newer turn (a later
/// generation) is in flight and its state must be left alone.
async fn settle_to_idle(conn_state_lock: &Arc<Mutex<ConnectionState>>, generation: u64) {
    let mut conn = conn_state_lock.lock().await;
    if conn.turn_generation == generation && conn.mode != EngineState::Capturing {
        conn.mode = EngineState::Idle;
    }
}
