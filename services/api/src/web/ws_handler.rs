//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! It manages the connection's state machine and delegates the turn pipeline.

use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    state::{AppState, ConnectionState},
    turn_task::{turn_process, TurnInput},
    voice::{VoiceLink, WsSink},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use cognify_core::engine::EngineState;
use futures::stream::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!("New WebSocket connection established.");

    let (sender, mut receiver) = socket.split();
    let voice = Arc::new(VoiceLink::new(
        app_state.stt.clone(),
        app_state.tts.clone(),
        Arc::new(WsSink::new(sender)),
    ));

    // --- 1. Initialization Phase ---
    let conn_state_lock: Arc<Mutex<ConnectionState>>;
    if let Some(Ok(Message::Text(init_json))) = receiver.next().await {
        match serde_json::from_str::<ClientMessage>(&init_json) {
            Ok(ClientMessage::Init { session_id }) => {
                let (session_id, title) = match resolve_session(&app_state, session_id).await {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        error!("Failed to initialize session: {e:?}");
                        voice
                            .send(&ServerMessage::Error {
                                message: "Failed to load session data.".to_string(),
                            })
                            .await;
                        return;
                    }
                };

                conn_state_lock = Arc::new(Mutex::new(ConnectionState::new(session_id)));
                if !voice
                    .send(&ServerMessage::SessionInitialized { session_id, title })
                    .await
                {
                    error!("Failed to send session initialized message.");
                    return;
                }
            }
            _ => {
                error!("First message was not a valid Init message.");
                return;
            }
        }
    } else {
        error!("Client disconnected before sending Init message.");
        return;
    }

    // --- 2. Main Message Loop ---
    loop {
        if let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_text_message(
                        text.to_string(),
                        &app_state,
                        &conn_state_lock,
                        &voice,
                    )
                    .await;
                }
                Message::Binary(data) => {
                    let mut conn = conn_state_lock.lock().await;
                    if conn.mode == EngineState::Capturing {
                        conn.audio_buffer.extend_from_slice(&data);
                    }
                }
                Message::Close(_) => {
                    info!("Client sent close message.");
                    break;
                }
                _ => {}
            }
        } else {
            info!("Client disconnected.");
            break;
        }
    }

    // --- 3. Cleanup ---
    conn_state_lock.lock().await.playback_token.cancel();
    info!("WebSocket connection closed.");
}

/// Loads the named session, or creates a fresh one when the id is absent or
/// unknown ("start fresh" is a normal outcome, not an error).
async fn resolve_session(
    app_state: &Arc<AppState>,
    session_id: Option<Uuid>,
) -> cognify_core::ports::PortResult<(Uuid, String)> {
    if let Some(id) = session_id {
        if let Some(session) = app_state.store.load_session(id).await? {
            return Ok((session.id, session.title));
        }
        info!("Session {id} not found; starting fresh.");
    }
    let id = app_state.store.create_session().await?;
    let title = app_state
        .store
        .load_session(id)
        .await?
        .map(|s| s.title)
        .unwrap_or_default();
    Ok((id, title))
}

/// Helper function to handle the logic for different `ClientMessage` variants.
async fn handle_text_message(
    text: String,
    app_state: &Arc<AppState>,
    conn_state_lock: &Arc<Mutex<ConnectionState>>,
    voice: &Arc<VoiceLink>,
) {
    match serde_json::from_str::<ClientMessage>(&text) {
        Ok(client_msg) => match client_msg {
            ClientMessage::UtteranceStarted => {
                let mut conn = conn_state_lock.lock().await;
                match conn.mode {
                    EngineState::Idle | EngineState::Responding => {
                        // Barge-in: pre-empt any in-flight playback first.
                        conn.playback_token.cancel();
                        conn.playback_token = CancellationToken::new();
                        conn.mode = EngineState::Capturing;
                        conn.audio_buffer.clear();
                        drop(conn);
                        voice.send(&ServerMessage::CaptureStarted).await;
                    }
                    EngineState::Capturing => {
                        conn.audio_buffer.clear();
                    }
                    // One in-flight turn at a time: ignore while reasoning.
                    EngineState::Reasoning | EngineState::Evaluating => {
                        info!("Ignoring UtteranceStarted while a turn is in flight.");
                    }
                }
            }
            ClientMessage::UtteranceEnded => {
                let audio = {
                    let mut conn = conn_state_lock.lock().await;
                    if conn.mode != EngineState::Capturing {
                        info!("Ignoring UtteranceEnded outside a capture window.");
                        return;
                    }
                    conn.mode = EngineState::Reasoning;
                    conn.turn_generation += 1;
                    std::mem::take(&mut conn.audio_buffer)
                };
                voice.send(&ServerMessage::CaptureEnded).await;
                spawn_turn(app_state, conn_state_lock, voice, TurnInput::CapturedAudio(audio));
            }
            ClientMessage::QuickReply { text } => {
                {
                    let mut conn = conn_state_lock.lock().await;
                    match conn.mode {
                        EngineState::Idle | EngineState::Responding => {
                            conn.playback_token.cancel();
                            conn.playback_token = CancellationToken::new();
                            conn.mode = EngineState::Reasoning;
                            conn.turn_generation += 1;
                        }
                        _ => {
                            info!("Ignoring QuickReply while busy.");
                            return;
                        }
                    }
                }
                spawn_turn(app_state, conn_state_lock, voice, TurnInput::QuickReply(text));
            }
            ClientMessage::Init { .. } => {
                warn!("Received subsequent Init message, which is ignored.");
            }
        },
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
        }
    }
}

/// Spawns the turn worker so the connection loop stays responsive to barge-in.
fn spawn_turn(
    app_state: &Arc<AppState>,
    conn_state_lock: &Arc<Mutex<ConnectionState>>,
    voice: &Arc<VoiceLink>,
    input: TurnInput,
) {
    let app_state = app_state.clone();
    let conn_state_lock = conn_state_lock.clone();
    let voice = voice.clone();
    tokio::spawn(async move {
        if let Err(e) = turn_process(app_state, conn_state_lock, voice, input).await {
            error!("Turn process failed: {e:?}");
        }
    });
}
