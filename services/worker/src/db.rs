//! Data Access Layer
//!
//! The Postgres implementation of [`SessionStore`]. Queries are bound at
//! runtime so the crate builds without a live database; row mapping goes
//! through the `FromRow` types in [`crate::models`].

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oralexam_core::{
    feedback::{FeedbackRecord, PipelineState},
    lifecycle::{SessionLifecycle, SessionPhase},
    transcript::{ImageContext, Transcript, Turn},
};
use sqlx::{PgPool, types::Json};
use uuid::Uuid;

use crate::models::{SessionRecord, SessionRow, TurnRow};
use crate::store::{SessionStore, StoreError};

const SESSION_COLUMNS: &str = "id, phase, prep_started_at, present_started_at, \
    converse_started_at, completed_at, image_context, pipeline_state, feedback, \
    created_at, updated_at";

/// A wrapper around the `PgPool` implementing the session store.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Fails with `NotFound` when an UPDATE touched no row.
    async fn ensure_exists(&self, id: Uuid, rows_affected: u64) -> Result<(), StoreError> {
        if rows_affected > 0 {
            return Ok(());
        }
        self.get_session(id).await.map(|_| ())
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create_session(
        &self,
        image: ImageContext,
        now: DateTime<Utc>,
    ) -> Result<SessionRecord, StoreError> {
        let record = SessionRecord::new(image, now);
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "INSERT INTO practice_sessions (id, phase, prep_started_at, image_context, \
             pipeline_state, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $6) RETURNING {SESSION_COLUMNS}"
        ))
        .bind(record.id)
        .bind(record.phase().as_str())
        .bind(record.lifecycle.timestamps.prep_started_at)
        .bind(Json(&record.image))
        .bind(record.pipeline_state.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        SessionRecord::try_from(row)
    }

    async fn get_session(&self, id: Uuid) -> Result<SessionRecord, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM practice_sessions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(id))?;
        SessionRecord::try_from(row)
    }

    async fn update_lifecycle(
        &self,
        id: Uuid,
        expected: SessionPhase,
        lifecycle: &SessionLifecycle,
    ) -> Result<(), StoreError> {
        let ts = &lifecycle.timestamps;
        let result = sqlx::query(
            "UPDATE practice_sessions \
             SET phase = $3, prep_started_at = $4, present_started_at = $5, \
                 converse_started_at = $6, completed_at = $7, updated_at = now() \
             WHERE id = $1 AND phase = $2",
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(lifecycle.phase.as_str())
        .bind(ts.prep_started_at)
        .bind(ts.present_started_at)
        .bind(ts.converse_started_at)
        .bind(ts.completed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a missing session from a concurrent phase change.
            self.get_session(id).await?;
            return Err(StoreError::Conflict { id, expected });
        }
        Ok(())
    }

    async fn set_pipeline_state(&self, id: Uuid, state: PipelineState) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE practice_sessions SET pipeline_state = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(state.as_str())
        .execute(&self.pool)
        .await?;
        self.ensure_exists(id, result.rows_affected()).await
    }

    async fn claim_pipeline(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE practice_sessions SET pipeline_state = $2, updated_at = now() \
             WHERE id = $1 AND pipeline_state IN ($3, $4)",
        )
        .bind(id)
        .bind(PipelineState::Running.as_str())
        .bind(PipelineState::NotStarted.as_str())
        .bind(PipelineState::Failed.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            self.get_session(id).await?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn save_feedback(&self, id: Uuid, record: &FeedbackRecord) -> Result<(), StoreError> {
        let summary = record.summary();
        let result = sqlx::query(
            "UPDATE practice_sessions \
             SET feedback = $2, pipeline_state = $3, total_mark = $4, estimated_level = $5, \
                 overall_wpm = $6, depth_score = $7, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(Json(record))
        .bind(record.pipeline_state().as_str())
        .bind(summary.as_ref().map(|s| s.total_mark))
        .bind(summary.as_ref().map(|s| s.estimated_level.to_string()))
        .bind(summary.as_ref().map(|s| i32::try_from(s.overall_wpm).unwrap_or(i32::MAX)))
        .bind(summary.as_ref().map(|s| s.depth_score))
        .execute(&self.pool)
        .await?;
        self.ensure_exists(id, result.rows_affected()).await
    }

    async fn fail_stale_runs(
        &self,
        cutoff: DateTime<Utc>,
        marker: &FeedbackRecord,
    ) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "UPDATE practice_sessions \
             SET feedback = $3, pipeline_state = $4, total_mark = NULL, estimated_level = NULL, \
                 overall_wpm = NULL, depth_score = NULL, updated_at = now() \
             WHERE pipeline_state = $1 AND updated_at <= $2 \
             RETURNING id",
        )
        .bind(PipelineState::Running.as_str())
        .bind(cutoff)
        .bind(Json(marker))
        .bind(marker.pipeline_state().as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn add_turn(&self, id: Uuid, turn: &Turn) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO transcript_turns (session_id, role, content, word_count, spoken_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(turn.role.to_string())
        .bind(&turn.content)
        .bind(turn.word_count.map(|n| i32::try_from(n).unwrap_or(i32::MAX)))
        .bind(turn.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let missing_session = e
                .as_database_error()
                .is_some_and(|db| db.is_foreign_key_violation());
            if missing_session {
                StoreError::NotFound(id)
            } else {
                StoreError::Database(e)
            }
        })?;
        Ok(())
    }

    async fn get_transcript(&self, id: Uuid) -> Result<Transcript, StoreError> {
        let rows = sqlx::query_as::<_, TurnRow>(
            "SELECT role, content, word_count, spoken_at FROM transcript_turns \
             WHERE session_id = $1 ORDER BY id ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            self.get_session(id).await?;
        }
        Ok(Transcript::new(rows.into_iter().map(Turn::from).collect()))
    }

    async fn get_image_context(&self, id: Uuid) -> Result<ImageContext, StoreError> {
        let image: Option<(Json<ImageContext>,)> =
            sqlx::query_as("SELECT image_context FROM practice_sessions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        image
            .map(|(json,)| json.0)
            .ok_or(StoreError::NotFound(id))
    }
}
