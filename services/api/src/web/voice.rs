//! services/api/src/web/voice.rs
//!
//! The Voice I/O Adapter: wraps the speech ports and the outbound socket
//! behind the minimal capture/playback contract the turn pipeline consumes.
//! Playback follows latest-utterance-wins: a pre-empted reply is cancelled
//! between audio chunks and never emits its `SpeakingEnded` notification.

use crate::web::protocol::ServerMessage;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use cognify_core::ports::{PortResult, SpeechToTextService, TextToSpeechService};
use futures::{stream::SplitSink, SinkExt};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Outbound half of one connection. A send reports whether the client is
/// still there; delivery failures are terminal for the connection, not errors.
#[async_trait]
pub trait OutboundSink: Send + Sync {
    async fn send_text(&self, text: String) -> bool;
    async fn send_binary(&self, data: Vec<u8>) -> bool;
}

/// The production sink: the write half of the WebSocket behind a mutex, so
/// the connection loop and a spawned turn worker can interleave sends.
pub struct WsSink {
    inner: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsSink {
    pub fn new(sender: SplitSink<WebSocket, Message>) -> Self {
        Self {
            inner: Mutex::new(sender),
        }
    }
}

#[async_trait]
impl OutboundSink for WsSink {
    async fn send_text(&self, text: String) -> bool {
        self.inner
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .is_ok()
    }

    async fn send_binary(&self, data: Vec<u8>) -> bool {
        self.inner
            .lock()
            .await
            .send(Message::Binary(data.into()))
            .await
            .is_ok()
    }
}

/// One connection's voice channel: transcription in, synthesized audio out.
pub struct VoiceLink {
    stt: Arc<dyn SpeechToTextService>,
    tts: Arc<dyn TextToSpeechService>,
    sink: Arc<dyn OutboundSink>,
}

impl VoiceLink {
    pub fn new(
        stt: Arc<dyn SpeechToTextService>,
        tts: Arc<dyn TextToSpeechService>,
        sink: Arc<dyn OutboundSink>,
    ) -> Self {
        Self { stt, tts, sink }
    }

    /// Sends a protocol message, reporting whether the client is still there.
    pub async fn send(&self, msg: &ServerMessage) -> bool {
        let json = serde_json::to_string(msg).unwrap();
        self.sink.send_text(json).await
    }

    /// Turns a finalized capture buffer into a transcript.
    pub async fn capture(&self, audio: &[u8]) -> PortResult<String> {
        let transcript = self.stt.transcribe_audio(audio).await?;
        info!("Transcribed utterance: '{}'", transcript);
        Ok(transcript)
    }

    /// Speaks `text` to the client, chunked by sentence so barge-in can cancel
    /// between chunks. A cancelled playback sends no `SpeakingEnded`.
    pub async fn speak(&self, text: &str, token: CancellationToken) -> PortResult<()> {
        if !self.send(&ServerMessage::SpeakingStarted).await {
            return Ok(());
        }

        for sentence in split_into_sentences(text) {
            if token.is_cancelled() {
                info!("Playback pre-empted by barge-in.");
                return Ok(());
            }

            let audio = match self.tts.generate_audio(&sentence).await {
                Ok(audio) => audio,
                Err(e) => {
                    // Playback degradation is guidance, not a crash: the turn
                    // text has already been delivered.
                    warn!("TTS generation failed: {e}");
                    self.send(&ServerMessage::Status {
                        message: "Voice playback is unavailable right now; the reply is shown as text.".to_string(),
                    })
                    .await;
                    return Ok(());
                }
            };

            if token.is_cancelled() {
                info!("Playback pre-empted by barge-in.");
                return Ok(());
            }

            if !self.sink.send_binary(audio).await {
                warn!("Failed to send audio chunk; client likely disconnected.");
                return Ok(());
            }
        }

        if !token.is_cancelled() {
            self.send(&ServerMessage::SpeakingEnded).await;
        }
        Ok(())
    }
}

/// Splits a reply into sentence-sized TTS chunks.
fn split_into_sentences(text: &str) -> Vec<String> {
    text.split(". ")
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            let trimmed = s.trim();
            if trimmed.ends_with('.') || trimmed.ends_with('?') || trimmed.ends_with('!') {
                trimmed.to_string()
            } else {
                format!("{}.", trimmed)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cognify_core::ports::PortError;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn splits_on_sentence_boundaries() {
        let sentences = split_into_sentences("First one. Second one? Third");
        assert_eq!(sentences, vec!["First one.", "Second one? Third."]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_into_sentences("").is_empty());
        assert!(split_into_sentences("   ").is_empty());
    }

    /// Records everything sent, in order, without a real socket.
    #[derive(Default)]
    struct RecordingSink {
        texts: StdMutex<Vec<String>>,
        binary_count: StdMutex<usize>,
    }

    #[async_trait]
    impl OutboundSink for RecordingSink {
        async fn send_text(&self, text: String) -> bool {
            self.texts.lock().unwrap().push(text);
            true
        }

        async fn send_binary(&self, _data: Vec<u8>) -> bool {
            *self.binary_count.lock().unwrap() += 1;
            true
        }
    }

    struct NoSpeech;

    #[async_trait]
    impl SpeechToTextService for NoSpeech {
        async fn transcribe_audio(&self, _audio_data: &[u8]) -> PortResult<String> {
            Err(PortError::CapabilityUnavailable("unused".to_string()))
        }
    }

    struct FixedTts;

    #[async_trait]
    impl TextToSpeechService for FixedTts {
        async fn generate_audio(&self, _text: &str) -> PortResult<Vec<u8>> {
            Ok(vec![0u8; 4])
        }
    }

    /// Cancels the supplied token from inside synthesis, like a barge-in that
    /// lands while a chunk is being generated.
    struct BargeInTts {
        token: CancellationToken,
    }

    #[async_trait]
    impl TextToSpeechService for BargeInTts {
        async fn generate_audio(&self, _text: &str) -> PortResult<Vec<u8>> {
            self.token.cancel();
            Ok(vec![0u8; 4])
        }
    }

    fn sent_types(sink: &RecordingSink) -> Vec<String> {
        sink.texts
            .lock()
            .unwrap()
            .iter()
            .map(|json| {
                serde_json::from_str::<serde_json::Value>(json).unwrap()["type"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect()
    }

    #[tokio::test]
    async fn uninterrupted_playback_ends_with_speaking_ended() {
        let sink = Arc::new(RecordingSink::default());
        let voice = VoiceLink::new(Arc::new(NoSpeech), Arc::new(FixedTts), sink.clone());

        voice
            .speak("One thing. Another thing.", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(sent_types(&sink), vec!["speaking_started", "speaking_ended"]);
        assert_eq!(*sink.binary_count.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn cancelled_playback_never_sends_speaking_ended() {
        let sink = Arc::new(RecordingSink::default());
        let token = CancellationToken::new();
        let voice = VoiceLink::new(
            Arc::new(NoSpeech),
            Arc::new(BargeInTts {
                token: token.clone(),
            }),
            sink.clone(),
        );

        voice
            .speak("One thing. Another thing.", token)
            .await
            .unwrap();

        // The cancellation landed mid-synthesis: no audio for that chunk, and
        // no ended notification for a pre-empted reply.
        assert_eq!(sent_types(&sink), vec!["speaking_started"]);
        assert_eq!(*sink.binary_count.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn pre_cancelled_token_suppresses_all_audio() {
        let sink = Arc::new(RecordingSink::default());
        let token = CancellationToken::new();
        token.cancel();
        let voice = VoiceLink::new(Arc::new(NoSpeech), Arc::new(FixedTts), sink.clone());

        voice.speak("Anything at all.", token).await.unwrap();

        assert_eq!(sent_types(&sink), vec!["speaking_started"]);
        assert_eq!(*sink.binary_count.lock().unwrap(), 0);
    }
}
