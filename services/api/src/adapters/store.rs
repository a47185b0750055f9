//! services/api/src/adapters/store.rs
//!
//! This module contains the session store adapter, the concrete implementation
//! of the `SessionStore` port from the `core` crate. It persists sessions,
//! turns, and document artifacts in a local SQLite database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cognify_core::domain::{DocumentArtifact, Session, SessionSummary, Turn, TurnRole};
use cognify_core::ports::{PortError, PortResult, SessionStore};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

const DEFAULT_TITLE: &str = "New Session";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A session store adapter backed by SQLite.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and applies the schema.
    pub async fn new(path: &Path) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.apply_schema().await?;
        Ok(store)
    }

    /// Opens an in-memory database. Used by tests.
    pub async fn new_in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.apply_schema().await?;
        Ok(store)
    }

    async fn apply_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                correct_count INTEGER NOT NULL DEFAULT 0,
                total_evaluated INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS artifacts (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                file_name TEXT NOT NULL,
                extracted_text TEXT NOT NULL,
                chapter_index TEXT NOT NULL,
                uploaded_at TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_turns_session_created ON turns(session_id, created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_artifacts_session ON artifacts(session_id, uploaded_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Bumps the owning session's `updated_at`, confirming the session exists.
    async fn touch_session<'e, E>(executor: E, session_id: Uuid) -> PortResult<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let result = sqlx::query("UPDATE sessions SET updated_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(session_id.to_string())
            .execute(executor)
            .await
            .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Session {session_id}")));
        }
        Ok(())
    }
}

fn storage_err(e: sqlx::Error) -> PortError {
    PortError::Storage(e.to_string())
}

fn parse_id(raw: &str) -> PortResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| PortError::Storage(format!("Corrupt id '{raw}': {e}")))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct SessionRecord {
    id: String,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    correct_count: i64,
    total_evaluated: i64,
}

impl SessionRecord {
    fn to_domain(self) -> PortResult<Session> {
        Ok(Session {
            id: parse_id(&self.id)?,
            title: self.title,
            created_at: self.created_at,
            updated_at: self.updated_at,
            correct_count: self.correct_count as u32,
            total_evaluated: self.total_evaluated as u32,
        })
    }
}

#[derive(FromRow)]
struct TurnRecord {
    id: String,
    session_id: String,
    role: String,
    text: String,
    created_at: DateTime<Utc>,
}

impl TurnRecord {
    fn to_domain(self) -> PortResult<Turn> {
        let role = TurnRole::parse(&self.role)
            .ok_or_else(|| PortError::Storage(format!("Corrupt turn role '{}'", self.role)))?;
        Ok(Turn {
            id: parse_id(&self.id)?,
            session_id: parse_id(&self.session_id)?,
            role,
            text: self.text,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ArtifactRecord {
    id: String,
    session_id: String,
    file_name: String,
    extracted_text: String,
    chapter_index: String,
    uploaded_at: DateTime<Utc>,
}

impl ArtifactRecord {
    fn to_domain(self) -> PortResult<DocumentArtifact> {
        Ok(DocumentArtifact {
            id: parse_id(&self.id)?,
            session_id: parse_id(&self.session_id)?,
            file_name: self.file_name,
            extracted_text: self.extracted_text,
            // A corrupt index degrades to "not attempted" rather than failing the read.
            chapter_index: serde_json::from_str(&self.chapter_index).unwrap_or_default(),
            uploaded_at: self.uploaded_at,
        })
    }
}

#[derive(FromRow)]
struct SummaryRecord {
    id: String,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    correct_count: i64,
    total_evaluated: i64,
    turn_count: i64,
    artifact_count: i64,
}

impl SummaryRecord {
    fn to_domain(self) -> PortResult<SessionSummary> {
        Ok(SessionSummary {
            session: Session {
                id: parse_id(&self.id)?,
                title: self.title,
                created_at: self.created_at,
                updated_at: self.updated_at,
                correct_count: self.correct_count as u32,
                total_evaluated: self.total_evaluated as u32,
            },
            turn_count: self.turn_count as u32,
            artifact_count: self.artifact_count as u32,
        })
    }
}

//=========================================================================================
// `SessionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl SessionStore for SqliteStore {
    async fn create_session(&self) -> PortResult<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO sessions (id, title, created_at, updated_at, correct_count, total_evaluated) \
             VALUES (?1, ?2, ?3, ?4, 0, 0)",
        )
        .bind(id.to_string())
        .bind(DEFAULT_TITLE)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(id)
    }

    async fn load_session(&self, session_id: Uuid) -> PortResult<Option<Session>> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT id, title, created_at, updated_at, correct_count, total_evaluated \
             FROM sessions WHERE id = ?1",
        )
        .bind(session_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        record.map(SessionRecord::to_domain).transpose()
    }

    async fn append_turn(&self, session_id: Uuid, role: TurnRole, text: &str) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        Self::touch_session(&mut *tx, session_id).await?;

        sqlx::query(
            "INSERT INTO turns (id, session_id, role, text, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(session_id.to_string())
        .bind(role.as_str())
        .bind(text)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)
    }

    async fn list_turns(&self, session_id: Uuid) -> PortResult<Vec<Turn>> {
        let records = sqlx::query_as::<_, TurnRecord>(
            "SELECT id, session_id, role, text, created_at FROM turns \
             WHERE session_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        records.into_iter().map(TurnRecord::to_domain).collect()
    }

    async fn add_artifact(
        &self,
        session_id: Uuid,
        file_name: &str,
        extracted_text: &str,
        chapter_index: &[String],
    ) -> PortResult<()> {
        let chapter_json =
            serde_json::to_string(chapter_index).map_err(|e| PortError::Storage(e.to_string()))?;

        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        Self::touch_session(&mut *tx, session_id).await?;

        sqlx::query(
            "INSERT INTO artifacts (id, session_id, file_name, extracted_text, chapter_index, uploaded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(session_id.to_string())
        .bind(file_name)
        .bind(extracted_text)
        .bind(chapter_json)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)
    }

    async fn list_artifacts(&self, session_id: Uuid) -> PortResult<Vec<DocumentArtifact>> {
        let records = sqlx::query_as::<_, ArtifactRecord>(
            "SELECT id, session_id, file_name, extracted_text, chapter_index, uploaded_at \
             FROM artifacts WHERE session_id = ?1 ORDER BY uploaded_at ASC, rowid ASC",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        records.into_iter().map(ArtifactRecord::to_domain).collect()
    }

    async fn record_evaluation(&self, session_id: Uuid, correct: bool) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE sessions SET total_evaluated = total_evaluated + 1, \
             correct_count = correct_count + ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(i64::from(correct))
        .bind(Utc::now())
        .bind(session_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Session {session_id}")));
        }
        Ok(())
    }

    async fn rename_session(&self, session_id: Uuid, title: &str) -> PortResult<()> {
        let result = sqlx::query("UPDATE sessions SET title = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(title)
            .bind(Utc::now())
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Session {session_id}")));
        }
        Ok(())
    }

    async fn delete_session(&self, session_id: Uuid) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        let id = session_id.to_string();

        sqlx::query("DELETE FROM turns WHERE session_id = ?1")
            .bind(&id)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        sqlx::query("DELETE FROM artifacts WHERE session_id = ?1")
            .bind(&id)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(&id)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)
    }

    async fn list_sessions_summary(&self) -> PortResult<Vec<SessionSummary>> {
        let records = sqlx::query_as::<_, SummaryRecord>(
            "SELECT s.id, s.title, s.created_at, s.updated_at, s.correct_count, s.total_evaluated, \
             (SELECT COUNT(*) FROM turns t WHERE t.session_id = s.id) AS turn_count, \
             (SELECT COUNT(*) FROM artifacts a WHERE a.session_id = s.id) AS artifact_count \
             FROM sessions s ORDER BY s.updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        records.into_iter().map(SummaryRecord::to_domain).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteStore {
        SqliteStore::new_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn created_session_starts_zeroed_with_default_title() {
        let store = store().await;
        let id = store.create_session().await.unwrap();

        let session = store.load_session(id).await.unwrap().unwrap();
        assert_eq!(session.title, DEFAULT_TITLE);
        assert_eq!(session.correct_count, 0);
        assert_eq!(session.total_evaluated, 0);
        assert_eq!(session.mastery(), None);
    }

    #[tokio::test]
    async fn unknown_session_loads_as_none() {
        let store = store().await;
        assert!(store.load_session(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn turns_come_back_in_insertion_order() {
        let store = store().await;
        let id = store.create_session().await.unwrap();

        store.append_turn(id, TurnRole::Learner, "first").await.unwrap();
        store.append_turn(id, TurnRole::Tutor, "second").await.unwrap();
        store.append_turn(id, TurnRole::Learner, "third").await.unwrap();

        let turns = store.list_turns(id).await.unwrap();
        let texts: Vec<&str> = turns.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(turns[0].role, TurnRole::Learner);
        assert_eq!(turns[1].role, TurnRole::Tutor);
        assert!(turns.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn appending_to_unknown_session_is_not_found() {
        let store = store().await;
        let err = store
            .append_turn(Uuid::new_v4(), TurnRole::Learner, "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn evaluation_counters_hold_their_invariant() {
        let store = store().await;
        let id = store.create_session().await.unwrap();

        for correct in [true, false, true, true] {
            store.record_evaluation(id, correct).await.unwrap();
            let session = store.load_session(id).await.unwrap().unwrap();
            assert!(session.correct_count <= session.total_evaluated);
        }

        let session = store.load_session(id).await.unwrap().unwrap();
        assert_eq!(session.total_evaluated, 4);
        assert_eq!(session.correct_count, 3);
        assert_eq!(session.mastery(), Some(0.75));
    }

    #[tokio::test]
    async fn artifacts_round_trip_with_chapter_index() {
        let store = store().await;
        let id = store.create_session().await.unwrap();

        let chapters = vec!["Cells".to_string(), "Osmosis".to_string()];
        store
            .add_artifact(id, "bio.pdf", "cell text", &chapters)
            .await
            .unwrap();
        store.add_artifact(id, "later.pdf", "newer text", &[]).await.unwrap();

        let artifacts = store.list_artifacts(id).await.unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].file_name, "bio.pdf");
        assert_eq!(artifacts[0].chapter_index, chapters);
        // The active artifact is the most recently uploaded one.
        assert_eq!(artifacts.last().unwrap().file_name, "later.pdf");
        assert!(artifacts.last().unwrap().chapter_index.is_empty());
    }

    #[tokio::test]
    async fn delete_cascades_to_turns_and_artifacts() {
        let store = store().await;
        let id = store.create_session().await.unwrap();
        for i in 0..5 {
            store
                .append_turn(id, TurnRole::Learner, &format!("turn {i}"))
                .await
                .unwrap();
        }
        store.add_artifact(id, "a.pdf", "text a", &[]).await.unwrap();
        store.add_artifact(id, "b.pdf", "text b", &[]).await.unwrap();

        store.delete_session(id).await.unwrap();

        assert!(store.load_session(id).await.unwrap().is_none());
        assert!(store.list_turns(id).await.unwrap().is_empty());
        assert!(store.list_artifacts(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn summaries_order_most_recently_active_first() {
        let store = store().await;
        let older = store.create_session().await.unwrap();
        let newer = store.create_session().await.unwrap();

        // Activity on the older session bumps it to the front.
        store.append_turn(older, TurnRole::Learner, "hi").await.unwrap();

        let summaries = store.list_sessions_summary().await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].session.id, older);
        assert_eq!(summaries[0].turn_count, 1);
        assert_eq!(summaries[0].artifact_count, 0);
        assert_eq!(summaries[1].session.id, newer);
    }

    #[tokio::test]
    async fn rename_is_idempotent() {
        let store = store().await;
        let id = store.create_session().await.unwrap();

        store.rename_session(id, "Photosynthesis basics").await.unwrap();
        store.rename_session(id, "Photosynthesis basics").await.unwrap();

        let session = store.load_session(id).await.unwrap().unwrap();
        assert_eq!(session.title, "Photosynthesis basics");
    }
}
