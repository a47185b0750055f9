//! crates/cognify_core/src/engine.rs
//!
//! The Conversation Engine: the turn-taking state machine at the heart of a
//! tutoring session. One learner utterance flows through capture → context
//! assembly → model invocation → response decomposition → ordered side
//! effects, and the engine owns the ordering invariant: the learner turn is
//! persisted before the evaluation, the evaluation before the tutor turn, so a
//! reader reconstructing history never sees a reply without its question.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::dialogue::{decompose_reply, Evaluation};
use crate::domain::TurnRole;
use crate::ports::{ModelService, PortError, PortResult, SessionStore};

/// How many prior turns are included in the model prompt.
pub const CONTEXT_TURN_WINDOW: usize = 6;

/// Maximum length of a derived session title, in characters.
pub const TITLE_MAX_CHARS: usize = 48;

/// Cosmetic prefix on learner turns that arrived by voice. Presentation only,
/// stripped when the turn is fed back into a prompt.
pub const CAPTURE_PREFIX: &str = "\u{1F3A4} ";

/// Stands in for the document section of the prompt when no upload exists.
pub const NO_DOCUMENT_PLACEHOLDER: &str = "(no document uploaded yet)";

/// Persisted as the tutor turn when the model service fails mid-dialogue.
pub const APOLOGY_TEXT: &str = "I'm sorry, I couldn't reach the tutoring service just now. \
Could you say that again in a moment?";

const DIALOGUE_INSTRUCTIONS: &str = "You are a friendly voice tutor helping a learner study \
the document below. Your reply will be spoken aloud, so converse naturally and use NO \
formatting markup of any kind: no lists, no headers, no asterisks.\n\
\n\
Ask one comprehension question at a time and keep replies short enough for speech.\n\
\n\
If your previous turn asked a comprehension question, judge the learner's reply and append \
exactly one of the literal markers [EVAL:correct] or [EVAL:incorrect] after your prose. If \
you asked no question, append no evaluation marker.\n\
\n\
Always end your reply with exactly two short suggested next replies for the learner, in the \
literal form [REC: first suggestion | second suggestion].";

/// The engine's externally visible state, mirrored to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    /// Waiting on the speech capability for a finalized transcript.
    Capturing,
    /// A model round-trip is in flight.
    Reasoning,
    /// An evaluation marker was found and is being recorded.
    Evaluating,
    /// The tutor reply is being played back.
    Responding,
}

/// How the learner's utterance reached the engine. Both paths converge on the
/// same turn pipeline; the source only affects the persisted presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceSource {
    Voice,
    QuickReply,
}

/// What one processed turn produced, for the caller to render and speak.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The marker-stripped tutor reply to display and play back.
    pub reply_text: String,
    pub evaluation: Option<Evaluation>,
    /// Exactly two suggested next replies, or `None` — stale suggestions never
    /// survive a turn that carried none.
    pub suggestions: Option<[String; 2]>,
    /// Set when this turn was the session's first learner turn and a title was
    /// derived from it.
    pub derived_title: Option<String>,
}

/// Drives the turn pipeline against the session store and the model service.
pub struct ConversationEngine {
    store: Arc<dyn SessionStore>,
    model: Arc<dyn ModelService>,
}

impl ConversationEngine {
    pub fn new(store: Arc<dyn SessionStore>, model: Arc<dyn ModelService>) -> Self {
        Self { store, model }
    }

    /// Processes one learner utterance end to end.
    ///
    /// Model failures are converted into an apologetic tutor turn so the
    /// session history stays consistent; only storage failures propagate.
    pub async fn process_utterance(
        &self,
        session_id: Uuid,
        transcript: &str,
        source: UtteranceSource,
    ) -> PortResult<TurnOutcome> {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Err(PortError::Unexpected(
                "Empty transcript reached the engine".to_string(),
            ));
        }

        let history = self.store.list_turns(session_id).await?;
        let artifacts = self.store.list_artifacts(session_id).await?;
        let is_first_learner_turn = !history.iter().any(|t| t.role == TurnRole::Learner);

        let document_text = artifacts
            .last()
            .map(|a| a.extracted_text.as_str())
            .unwrap_or(NO_DOCUMENT_PLACEHOLDER);
        let prompt = build_prompt(document_text, &history, transcript);

        let decomposed = match self.model.complete(&prompt).await {
            Ok(raw) => decompose_reply(&raw),
            Err(e) => {
                warn!("Model call failed during dialogue turn: {e}");
                self.apply_apology_turn(session_id, transcript, source)
                    .await?;
                return Ok(TurnOutcome {
                    reply_text: APOLOGY_TEXT.to_string(),
                    evaluation: None,
                    suggestions: None,
                    derived_title: None,
                });
            }
        };

        // Side effects, in this order: learner turn, evaluation, tutor turn.
        self.store
            .append_turn(session_id, TurnRole::Learner, &presented(transcript, source))
            .await?;

        if let Some(evaluation) = decomposed.evaluation {
            info!(%session_id, ?evaluation, "Recording evaluation outcome");
            self.store
                .record_evaluation(session_id, evaluation == Evaluation::Correct)
                .await?;
        }

        self.store
            .append_turn(session_id, TurnRole::Tutor, &decomposed.display_text)
            .await?;

        let derived_title = if is_first_learner_turn {
            let title = derive_title(transcript);
            self.store.rename_session(session_id, &title).await?;
            Some(title)
        } else {
            None
        };

        Ok(TurnOutcome {
            reply_text: decomposed.display_text,
            evaluation: decomposed.evaluation,
            suggestions: decomposed.suggestions,
            derived_title,
        })
    }

    /// Persists the learner turn plus a fixed apology turn. No evaluation is
    /// recorded on this path.
    async fn apply_apology_turn(
        &self,
        session_id: Uuid,
        transcript: &str,
        source: UtteranceSource,
    ) -> PortResult<()> {
        self.store
            .append_turn(session_id, TurnRole::Learner, &presented(transcript, source))
            .await?;
        self.store
            .append_turn(session_id, TurnRole::Tutor, APOLOGY_TEXT)
            .await?;
        Ok(())
    }
}

fn presented(transcript: &str, source: UtteranceSource) -> String {
    match source {
        UtteranceSource::Voice => format!("{CAPTURE_PREFIX}{transcript}"),
        UtteranceSource::QuickReply => transcript.to_string(),
    }
}

fn build_prompt(document_text: &str, history: &[crate::domain::Turn], transcript: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(DIALOGUE_INSTRUCTIONS);
    prompt.push_str("\n\nDOCUMENT:\n");
    prompt.push_str(document_text);
    prompt.push_str("\n\nCONVERSATION SO FAR:\n");

    let window_start = history.len().saturating_sub(CONTEXT_TURN_WINDOW);
    for turn in &history[window_start..] {
        let speaker = match turn.role {
            TurnRole::Learner => "LEARNER",
            TurnRole::Tutor => "TUTOR",
        };
        let text = turn.text.strip_prefix(CAPTURE_PREFIX).unwrap_or(&turn.text);
        prompt.push_str(speaker);
        prompt.push_str(": ");
        prompt.push_str(text);
        prompt.push('\n');
    }

    prompt.push_str("\nLEARNER: ");
    prompt.push_str(transcript);
    prompt.push_str("\nTUTOR:");
    prompt
}

/// Derives a short session title from the first learner utterance, truncating
/// on a character boundary with a trailing ellipsis when needed.
pub fn derive_title(transcript: &str) -> String {
    let mut chars = transcript.chars();
    let title: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{title}\u{2026}")
    } else {
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DocumentArtifact, Session, SessionSummary, Turn};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    /// In-memory `SessionStore` that records calls, for engine tests.
    #[derive(Default)]
    struct MemoryStore {
        turns: Mutex<Vec<Turn>>,
        artifacts: Mutex<Vec<DocumentArtifact>>,
        evaluations: Mutex<Vec<bool>>,
        title: Mutex<Option<String>>,
    }

    #[async_trait]
    impl SessionStore for MemoryStore {
        async fn create_session(&self) -> PortResult<Uuid> {
            Ok(Uuid::new_v4())
        }

        async fn load_session(&self, _session_id: Uuid) -> PortResult<Option<Session>> {
            Ok(None)
        }

        async fn append_turn(
            &self,
            session_id: Uuid,
            role: TurnRole,
            text: &str,
        ) -> PortResult<()> {
            self.turns.lock().unwrap().push(Turn {
                id: Uuid::new_v4(),
                session_id,
                role,
                text: text.to_string(),
                created_at: Utc::now(),
            });
            Ok(())
        }

        async fn list_turns(&self, _session_id: Uuid) -> PortResult<Vec<Turn>> {
            Ok(self.turns.lock().unwrap().clone())
        }

        async fn add_artifact(
            &self,
            session_id: Uuid,
            file_name: &str,
            extracted_text: &str,
            chapter_index: &[String],
        ) -> PortResult<()> {
            self.artifacts.lock().unwrap().push(DocumentArtifact {
                id: Uuid::new_v4(),
                session_id,
                file_name: file_name.to_string(),
                extracted_text: extracted_text.to_string(),
                chapter_index: chapter_index.to_vec(),
                uploaded_at: Utc::now(),
            });
            Ok(())
        }

        async fn list_artifacts(&self, _session_id: Uuid) -> PortResult<Vec<DocumentArtifact>> {
            Ok(self.artifacts.lock().unwrap().clone())
        }

        async fn record_evaluation(&self, _session_id: Uuid, correct: bool) -> PortResult<()> {
            self.evaluations.lock().unwrap().push(correct);
            Ok(())
        }

        async fn rename_session(&self, _session_id: Uuid, title: &str) -> PortResult<()> {
            *self.title.lock().unwrap() = Some(title.to_string());
            Ok(())
        }

        async fn delete_session(&self, _session_id: Uuid) -> PortResult<()> {
            Ok(())
        }

        async fn list_sessions_summary(&self) -> PortResult<Vec<SessionSummary>> {
            Ok(Vec::new())
        }
    }

    struct FixedModel {
        reply: PortResult<String>,
        last_prompt: Mutex<Option<String>>,
    }

    impl FixedModel {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                last_prompt: Mutex::new(None),
            }
        }

        fn unavailable() -> Self {
            Self {
                reply: Err(PortError::ModelUnavailable("connection refused".to_string())),
                last_prompt: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ModelService for FixedModel {
        async fn complete(&self, prompt: &str) -> PortResult<String> {
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(PortError::ModelUnavailable("connection refused".to_string())),
            }
        }
    }

    fn engine_with(
        store: Arc<MemoryStore>,
        model: Arc<FixedModel>,
    ) -> ConversationEngine {
        ConversationEngine::new(store, model)
    }

    #[tokio::test]
    async fn first_turn_without_document_uses_placeholder_and_derives_title() {
        let store = Arc::new(MemoryStore::default());
        let model = Arc::new(FixedModel::ok(
            "Great, let's begin. What is a cell? [REC: I don't know | Tell me more]",
        ));
        let engine = engine_with(store.clone(), model.clone());

        let outcome = engine
            .process_utterance(Uuid::new_v4(), "Yes I'm ready", UtteranceSource::Voice)
            .await
            .unwrap();

        let prompt = model.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains(NO_DOCUMENT_PLACEHOLDER));
        assert!(prompt.contains("LEARNER: Yes I'm ready"));

        assert_eq!(outcome.derived_title.as_deref(), Some("Yes I'm ready"));
        assert_eq!(outcome.evaluation, None);
        assert!(store.evaluations.lock().unwrap().is_empty());

        let turns = store.turns.lock().unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, TurnRole::Learner);
        assert_eq!(turns[0].text, format!("{CAPTURE_PREFIX}Yes I'm ready"));
        assert_eq!(turns[1].role, TurnRole::Tutor);
        assert_eq!(turns[1].text, "Great, let's begin. What is a cell?");
    }

    #[tokio::test]
    async fn evaluated_answer_records_exactly_one_outcome() {
        let store = Arc::new(MemoryStore::default());
        let model = Arc::new(FixedModel::ok(
            "Great job! [EVAL:correct][REC: Ask another question | I'd like a summary]",
        ));
        let engine = engine_with(store.clone(), model);

        let outcome = engine
            .process_utterance(Uuid::new_v4(), "The mitochondria", UtteranceSource::QuickReply)
            .await
            .unwrap();

        assert_eq!(outcome.reply_text, "Great job!");
        assert_eq!(outcome.evaluation, Some(Evaluation::Correct));
        assert_eq!(
            outcome.suggestions,
            Some([
                "Ask another question".to_string(),
                "I'd like a summary".to_string()
            ])
        );
        assert_eq!(store.evaluations.lock().unwrap().as_slice(), &[true]);

        // Quick-reply turns carry no capture prefix.
        assert_eq!(store.turns.lock().unwrap()[0].text, "The mitochondria");
    }

    #[tokio::test]
    async fn model_failure_persists_apology_turn_without_evaluation() {
        let store = Arc::new(MemoryStore::default());
        let model = Arc::new(FixedModel::unavailable());
        let engine = engine_with(store.clone(), model);

        let outcome = engine
            .process_utterance(Uuid::new_v4(), "Hello?", UtteranceSource::Voice)
            .await
            .unwrap();

        assert_eq!(outcome.reply_text, APOLOGY_TEXT);
        assert_eq!(outcome.evaluation, None);
        assert_eq!(outcome.suggestions, None);

        let turns = store.turns.lock().unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].text, APOLOGY_TEXT);
        assert!(store.evaluations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn later_turns_do_not_rederive_the_title() {
        let store = Arc::new(MemoryStore::default());
        store
            .append_turn(Uuid::new_v4(), TurnRole::Learner, "earlier question")
            .await
            .unwrap();
        let model = Arc::new(FixedModel::ok("Sure. [REC: Go on | Quiz me]"));
        let engine = engine_with(store.clone(), model);

        let outcome = engine
            .process_utterance(Uuid::new_v4(), "Another question", UtteranceSource::Voice)
            .await
            .unwrap();
        assert_eq!(outcome.derived_title, None);
        assert!(store.title.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn prompt_window_is_bounded_and_strips_capture_prefix() {
        let store = Arc::new(MemoryStore::default());
        let session_id = Uuid::new_v4();
        for i in 0..10 {
            store
                .append_turn(
                    session_id,
                    TurnRole::Learner,
                    &format!("{CAPTURE_PREFIX}utterance {i}"),
                )
                .await
                .unwrap();
        }
        let model = Arc::new(FixedModel::ok("Noted. [REC: Next | Recap]"));
        let engine = engine_with(store.clone(), model.clone());

        engine
            .process_utterance(session_id, "latest", UtteranceSource::Voice)
            .await
            .unwrap();

        let prompt = model.last_prompt.lock().unwrap().clone().unwrap();
        // Only the last six history turns make it into the prompt.
        assert!(!prompt.contains("utterance 3"));
        assert!(prompt.contains("utterance 4"));
        assert!(prompt.contains("utterance 9"));
        assert!(!prompt.contains(CAPTURE_PREFIX));
    }

    #[test]
    fn title_is_truncated_with_ellipsis() {
        let long = "a".repeat(60);
        let title = derive_title(&long);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 1);
        assert!(title.ends_with('\u{2026}'));

        assert_eq!(derive_title("Yes I'm ready"), "Yes I'm ready");
    }
}
