//! crates/cognify_core/src/indexer.rs
//!
//! The Document Indexer: turns extracted document text into an ordered list of
//! topic/chapter labels with a single model call. Index generation is
//! best-effort and must never block the ability to chat, so every failure path
//! degrades to a single sentinel label instead of propagating.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::ports::ModelService;

/// Character budget for the document prefix sent to the model. A table of
/// contents does not need the whole document, and a bounded prefix keeps
/// latency and cost bounded.
pub const INDEX_PROMPT_BUDGET: usize = 12_000;

/// The single label stored when index generation was attempted and failed.
/// Distinguishes "attempted and failed" from the empty "not attempted" state.
pub const INDEX_SENTINEL: &str = "Index unavailable";

const INDEX_INSTRUCTIONS: &str = "You are indexing a study document. \
Read the document excerpt below and list its main topics or chapters in order. \
Respond with ONLY a JSON array of short strings, one per topic, like \
[\"Topic one\", \"Topic two\"]. No prose, no markdown, no code fences.";

/// The sentinel index sequence.
pub fn sentinel_index() -> Vec<String> {
    vec![INDEX_SENTINEL.to_string()]
}

/// Generates chapter indexes, memoizing results by content so re-uploading an
/// unchanged document never pays for a second model call.
pub struct DocumentIndexer {
    model: Arc<dyn ModelService>,
    memo: Mutex<HashMap<u64, Vec<String>>>,
}

impl DocumentIndexer {
    pub fn new(model: Arc<dyn ModelService>) -> Self {
        Self {
            model,
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Returns an ordered sequence of topic labels for the document.
    ///
    /// Never fails: a model error or an unparseable reply yields the sentinel
    /// sequence. Only successful generations are memoized, so a failed attempt
    /// is retried the next time the same text is uploaded.
    pub async fn generate_index(&self, document_text: &str) -> Vec<String> {
        let key = content_key(document_text);
        if let Some(labels) = self.memo.lock().ok().and_then(|m| m.get(&key).cloned()) {
            return labels;
        }

        let excerpt: String = document_text.chars().take(INDEX_PROMPT_BUDGET).collect();
        let prompt = format!("{INDEX_INSTRUCTIONS}\n\nDOCUMENT EXCERPT:\n{excerpt}");

        let raw = match self.model.complete(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Index generation call failed: {e}");
                return sentinel_index();
            }
        };

        match parse_index_labels(&raw) {
            Some(labels) => {
                if let Ok(mut memo) = self.memo.lock() {
                    memo.insert(key, labels.clone());
                }
                labels
            }
            None => {
                warn!("Index generation returned an unparseable reply");
                sentinel_index()
            }
        }
    }
}

fn content_key(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

/// Parses the model's reply as a literal JSON array of strings.
///
/// The model is told not to wrap its output, but a fenced code block is
/// stripped anyway before parsing. `None` means the reply did not contain a
/// non-empty array of non-empty labels.
pub fn parse_index_labels(raw: &str) -> Option<Vec<String>> {
    let body = strip_code_fence(raw.trim());

    let labels: Vec<String> = serde_json::from_str(body).ok()?;
    let labels: Vec<String> = labels
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();

    if labels.is_empty() { None } else { Some(labels) }
}

/// Strips a surrounding ```-fence (with or without a language tag) if present.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop the language tag line, e.g. "json".
    match rest.find('\n') {
        Some(newline) => rest[newline + 1..].trim(),
        None => rest.trim(),
    }
}
