//! crates/cognify_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One persisted tutoring conversation with its own history and mastery counters.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub correct_count: u32,
    pub total_evaluated: u32,
}

impl Session {
    /// Fraction of evaluated learner answers marked correct.
    ///
    /// `None` when nothing has been evaluated yet, so callers can render a
    /// distinct "no data" state instead of a misleading 0%.
    pub fn mastery(&self) -> Option<f64> {
        crate::progress::mastery_ratio(self.correct_count, self.total_evaluated)
    }
}

/// Who produced a given turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    Learner,
    Tutor,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::Learner => "learner",
            TurnRole::Tutor => "tutor",
        }
    }

    /// Parses the persisted role string. Unknown values map to `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "learner" => Some(TurnRole::Learner),
            "tutor" => Some(TurnRole::Tutor),
            _ => None,
        }
    }
}

/// One atomic message exchanged within a session.
///
/// Turns are append-only: never mutated or reordered after creation. Insertion
/// order (via `created_at`) is the ordering key.
#[derive(Debug, Clone)]
pub struct Turn {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: TurnRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// One uploaded source document's extracted text plus its generated topic index.
///
/// `chapter_index` is empty until generation has been attempted; a failed
/// generation stores the single sentinel label so "not attempted" and
/// "attempted and failed" stay distinguishable.
#[derive(Debug, Clone)]
pub struct DocumentArtifact {
    pub id: Uuid,
    pub session_id: Uuid,
    pub file_name: String,
    pub extracted_text: String,
    pub chapter_index: Vec<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// A session plus the per-session counts the history view renders.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session: Session,
    pub turn_count: u32,
    pub artifact_count: u32,
}
