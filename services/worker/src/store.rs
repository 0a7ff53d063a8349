//! Session Persistence
//!
//! The `SessionStore` trait is the worker's only view of storage. Postgres
//! backs it in production (see [`crate::db`]); [`InMemorySessionStore`] keeps
//! everything in a map for tests and database-less runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oralexam_core::{
    feedback::{FeedbackRecord, PipelineState},
    lifecycle::{SessionLifecycle, SessionPhase},
    transcript::{ImageContext, Transcript, Turn},
};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::SessionRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session {0} not found")]
    NotFound(Uuid),
    #[error("session {id} is no longer '{expected}'")]
    Conflict { id: Uuid, expected: SessionPhase },
    #[error("session {0} has corrupt data: {1}")]
    Corrupt(Uuid, String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(
        &self,
        image: ImageContext,
        now: DateTime<Utc>,
    ) -> Result<SessionRecord, StoreError>;

    async fn get_session(&self, id: Uuid) -> Result<SessionRecord, StoreError>;

    /// Writes phase and timestamps, provided the stored phase is still
    /// `expected`. Otherwise fails with [`StoreError::Conflict`].
    async fn update_lifecycle(
        &self,
        id: Uuid,
        expected: SessionPhase,
        lifecycle: &SessionLifecycle,
    ) -> Result<(), StoreError>;

    async fn set_pipeline_state(&self, id: Uuid, state: PipelineState) -> Result<(), StoreError>;

    /// Moves a `NotStarted` or `Failed` pipeline to `Running`. Returns `false`
    /// when the pipeline was in any other state.
    async fn claim_pipeline(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Stores the report or error marker and the pipeline state it implies.
    async fn save_feedback(&self, id: Uuid, record: &FeedbackRecord) -> Result<(), StoreError>;

    /// Stores `marker` on every `Running` pipeline last touched at or before
    /// `cutoff`, moving it to `Failed`. Returns the sessions it reset.
    async fn fail_stale_runs(
        &self,
        cutoff: DateTime<Utc>,
        marker: &FeedbackRecord,
    ) -> Result<Vec<Uuid>, StoreError>;

    async fn add_turn(&self, id: Uuid, turn: &Turn) -> Result<(), StoreError>;

    async fn get_transcript(&self, id: Uuid) -> Result<Transcript, StoreError>;

    async fn get_image_context(&self, id: Uuid) -> Result<ImageContext, StoreError>;
}

struct StoredSession {
    record: SessionRecord,
    turns: Vec<Turn>,
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<Uuid, StoredSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn entry(
    sessions: &mut HashMap<Uuid, StoredSession>,
    id: Uuid,
) -> Result<&mut StoredSession, StoreError> {
    sessions.get_mut(&id).ok_or(StoreError::NotFound(id))
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(
        &self,
        image: ImageContext,
        now: DateTime<Utc>,
    ) -> Result<SessionRecord, StoreError> {
        let record = SessionRecord::new(image, now);
        self.sessions.lock().await.insert(
            record.id,
            StoredSession {
                record: record.clone(),
                turns: Vec::new(),
            },
        );
        Ok(record)
    }

    async fn get_session(&self, id: Uuid) -> Result<SessionRecord, StoreError> {
        let mut sessions = self.sessions.lock().await;
        Ok(entry(&mut sessions, id)?.record.clone())
    }

    async fn update_lifecycle(
        &self,
        id: Uuid,
        expected: SessionPhase,
        lifecycle: &SessionLifecycle,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().await;
        let stored = entry(&mut sessions, id)?;
        if stored.record.lifecycle.phase != expected {
            return Err(StoreError::Conflict { id, expected });
        }
        stored.record.lifecycle = *lifecycle;
        stored.record.updated_at = Utc::now();
        Ok(())
    }

    async fn set_pipeline_state(&self, id: Uuid, state: PipelineState) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().await;
        let stored = entry(&mut sessions, id)?;
        stored.record.pipeline_state = state;
        stored.record.updated_at = Utc::now();
        Ok(())
    }

    async fn claim_pipeline(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.lock().await;
        let stored = entry(&mut sessions, id)?;
        if !stored.record.pipeline_state.is_retryable() {
            return Ok(false);
        }
        stored.record.pipeline_state = PipelineState::Running;
        stored.record.updated_at = Utc::now();
        Ok(true)
    }

    async fn save_feedback(&self, id: Uuid, record: &FeedbackRecord) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().await;
        let stored = entry(&mut sessions, id)?;
        stored.record.pipeline_state = record.pipeline_state();
        stored.record.feedback = Some(record.clone());
        stored.record.updated_at = Utc::now();
        Ok(())
    }

    async fn fail_stale_runs(
        &self,
        cutoff: DateTime<Utc>,
        marker: &FeedbackRecord,
    ) -> Result<Vec<Uuid>, StoreError> {
        let mut sessions = self.sessions.lock().await;
        let now = Utc::now();
        let mut reset = Vec::new();
        for stored in sessions.values_mut() {
            let record = &mut stored.record;
            if record.pipeline_state == PipelineState::Running && record.updated_at <= cutoff {
                record.pipeline_state = marker.pipeline_state();
                record.feedback = Some(marker.clone());
                record.updated_at = now;
                reset.push(record.id);
            }
        }
        Ok(reset)
    }

    async fn add_turn(&self, id: Uuid, turn: &Turn) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().await;
        entry(&mut sessions, id)?.turns.push(turn.clone());
        Ok(())
    }

    async fn get_transcript(&self, id: Uuid) -> Result<Transcript, StoreError> {
        let mut sessions = self.sessions.lock().await;
        Ok(Transcript::new(entry(&mut sessions, id)?.turns.clone()))
    }

    async fn get_image_context(&self, id: Uuid) -> Result<ImageContext, StoreError> {
        let mut sessions = self.sessions.lock().await;
        Ok(entry(&mut sessions, id)?.record.image.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oralexam_core::feedback::FeedbackErrorMarker;
    use oralexam_core::transcript::TurnRole;

    #[tokio::test]
    async fn test_create_and_get_session() {
        let store = InMemorySessionStore::new();
        let image = ImageContext {
            theme: "Medio ambiente".to_string(),
            ..Default::default()
        };
        let created = store.create_session(image.clone(), Utc::now()).await.unwrap();

        let fetched = store.get_session(created.id).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(store.get_image_context(created.id).await.unwrap(), image);
        assert!(store.get_transcript(created.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let store = InMemorySessionStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(
            store.get_session(id).await,
            Err(StoreError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn test_update_lifecycle_checks_expected_phase() {
        let store = InMemorySessionStore::new();
        let session = store.create_session(ImageContext::default(), Utc::now()).await.unwrap();

        let mut lifecycle = session.lifecycle;
        lifecycle.advance(SessionPhase::Presenting, Utc::now()).unwrap();
        store
            .update_lifecycle(session.id, SessionPhase::Preparing, &lifecycle)
            .await
            .unwrap();

        let err = store
            .update_lifecycle(session.id, SessionPhase::Preparing, &lifecycle)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict { expected: SessionPhase::Preparing, .. }
        ));
        assert_eq!(
            store.get_session(session.id).await.unwrap().phase(),
            SessionPhase::Presenting
        );
    }

    #[tokio::test]
    async fn test_claim_pipeline_only_once() {
        let store = InMemorySessionStore::new();
        let session = store.create_session(ImageContext::default(), Utc::now()).await.unwrap();

        assert!(store.claim_pipeline(session.id).await.unwrap());
        assert!(!store.claim_pipeline(session.id).await.unwrap());

        store
            .save_feedback(
                session.id,
                &FeedbackRecord::Failed(FeedbackErrorMarker::new("grader down")),
            )
            .await
            .unwrap();
        let failed = store.get_session(session.id).await.unwrap();
        assert_eq!(failed.pipeline_state, PipelineState::Failed);
        assert!(store.claim_pipeline(session.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_fail_stale_runs_only_touches_old_running_pipelines() {
        let store = InMemorySessionStore::new();
        let running = store.create_session(ImageContext::default(), Utc::now()).await.unwrap();
        let idle = store.create_session(ImageContext::default(), Utc::now()).await.unwrap();
        assert!(store.claim_pipeline(running.id).await.unwrap());
        let marker = FeedbackRecord::Failed(FeedbackErrorMarker::new("interrupted"));

        let before_claim = running.updated_at - chrono::Duration::seconds(1);
        assert!(store.fail_stale_runs(before_claim, &marker).await.unwrap().is_empty());
        assert_eq!(
            store.get_session(running.id).await.unwrap().pipeline_state,
            PipelineState::Running
        );

        let reset = store.fail_stale_runs(Utc::now(), &marker).await.unwrap();
        assert_eq!(reset, vec![running.id]);
        let failed = store.get_session(running.id).await.unwrap();
        assert_eq!(failed.pipeline_state, PipelineState::Failed);
        assert_eq!(failed.feedback, Some(marker));
        assert_eq!(
            store.get_session(idle.id).await.unwrap().pipeline_state,
            PipelineState::NotStarted
        );
    }

    #[tokio::test]
    async fn test_turns_keep_insertion_order() {
        let store = InMemorySessionStore::new();
        let session = store.create_session(ImageContext::default(), Utc::now()).await.unwrap();
        for (role, text) in [
            (TurnRole::Presentation, "Hola"),
            (TurnRole::Examiner, "¿Qué ves?"),
            (TurnRole::Student, "Veo una playa"),
        ] {
            store
                .add_turn(session.id, &Turn::new(role, text, Utc::now()))
                .await
                .unwrap();
        }

        let transcript = store.get_transcript(session.id).await.unwrap();
        let roles: Vec<TurnRole> = transcript.turns().iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![TurnRole::Presentation, TurnRole::Examiner, TurnRole::Student]
        );
    }
}
