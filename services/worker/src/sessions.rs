//! Session Service
//!
//! Caller-facing operations on practice sessions: recording turns, driving
//! the phase state machine and (re)starting feedback. Reaching `Completed`
//! queues the feedback pipeline exactly once; later runs only happen through
//! an explicit [`SessionService::retry`].

use chrono::Utc;
use oralexam_core::{
    feedback::{FeedbackErrorMarker, FeedbackRecord, PipelineState},
    lifecycle::{SessionPhase, TransitionError},
    transcript::{ImageContext, Turn, TurnRole},
};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::jobs::{FeedbackQueue, FeedbackTicket, QueueError};
use crate::models::SessionRecord;
use crate::store::{SessionStore, StoreError};

const INTERRUPTED_MESSAGE: &str = "feedback run was interrupted before it finished";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("session {0} is '{1}' and no longer accepts turns")]
    Closed(Uuid, SessionPhase),
    #[error("session {0} already has a presentation turn")]
    DuplicatePresentation(Uuid),
    #[error("session {0} is '{1}'; feedback needs a completed session")]
    NotCompleted(Uuid, SessionPhase),
    #[error("feedback for session {0} is '{1}' and cannot be restarted")]
    FeedbackNotRetryable(Uuid, PipelineState),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Result of a successful phase change.
#[derive(Debug)]
pub struct AdvanceOutcome {
    pub session: SessionRecord,
    /// Present when this transition completed the session and its feedback
    /// job was queued.
    pub feedback: Option<FeedbackTicket>,
}

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    queue: FeedbackQueue,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>, queue: FeedbackQueue) -> Self {
        Self { store, queue }
    }

    pub async fn create_session(&self, image: ImageContext) -> Result<SessionRecord, SessionError> {
        let session = self.store.create_session(image, Utc::now()).await?;
        info!(session_id = %session.id, "Practice session created");
        Ok(session)
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<SessionRecord, SessionError> {
        Ok(self.store.get_session(session_id).await?)
    }

    /// Appends a turn. Terminal sessions keep their transcript frozen, and a
    /// session holds at most one presentation turn.
    pub async fn record_turn(&self, session_id: Uuid, turn: &Turn) -> Result<(), SessionError> {
        let session = self.store.get_session(session_id).await?;
        if session.phase().is_terminal() {
            return Err(SessionError::Closed(session_id, session.phase()));
        }
        if turn.role == TurnRole::Presentation
            && self
                .store
                .get_transcript(session_id)
                .await?
                .presentation()
                .is_some()
        {
            warn!(%session_id, "Rejected second presentation turn");
            return Err(SessionError::DuplicatePresentation(session_id));
        }
        self.store.add_turn(session_id, turn).await?;
        Ok(())
    }

    /// Moves the session to `target`. Invalid transitions leave it untouched.
    #[instrument(skip_all, fields(session_id = %session_id, target = %target))]
    pub async fn advance(
        &self,
        session_id: Uuid,
        target: SessionPhase,
    ) -> Result<AdvanceOutcome, SessionError> {
        let session = self.store.get_session(session_id).await?;
        let previous = session.phase();
        let mut lifecycle = session.lifecycle;
        lifecycle.advance(target, Utc::now()).inspect_err(|e| {
            warn!(error = %e, "Rejected phase transition");
        })?;
        self.store
            .update_lifecycle(session_id, previous, &lifecycle)
            .await?;
        info!(from = %previous, "Session phase advanced");

        let feedback = if lifecycle.is_completed() {
            match self.start_feedback(session_id).await {
                Ok(ticket) => Some(ticket),
                Err(e) => {
                    error!(error = %e, "Could not start feedback for completed session");
                    None
                }
            }
        } else {
            None
        };

        Ok(AdvanceOutcome {
            session: self.store.get_session(session_id).await?,
            feedback,
        })
    }

    /// Re-runs feedback for a completed session whose last run failed or
    /// never started.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn retry(&self, session_id: Uuid) -> Result<FeedbackTicket, SessionError> {
        let session = self.store.get_session(session_id).await?;
        if !session.lifecycle.is_completed() {
            return Err(SessionError::NotCompleted(session_id, session.phase()));
        }
        if !session.pipeline_state.is_retryable() {
            return Err(SessionError::FeedbackNotRetryable(
                session_id,
                session.pipeline_state,
            ));
        }
        info!(previous = %session.pipeline_state, "Retrying feedback");
        self.start_feedback(session_id).await
    }

    /// Fails feedback runs left `Running` for longer than `timeout`. A live
    /// run never outlasts its timeout, so such a row belongs to a process
    /// that died mid-run; once failed it can be retried.
    pub async fn recover_interrupted(&self, timeout: Duration) -> Result<usize, SessionError> {
        let Some(cutoff) = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Ok(0);
        };
        let marker = FeedbackRecord::Failed(FeedbackErrorMarker::new(INTERRUPTED_MESSAGE));
        let reset = self.store.fail_stale_runs(cutoff, &marker).await?;
        for session_id in &reset {
            warn!(%session_id, "Feedback run was interrupted; marked as failed");
        }
        Ok(reset.len())
    }

    async fn start_feedback(&self, session_id: Uuid) -> Result<FeedbackTicket, SessionError> {
        if !self.store.claim_pipeline(session_id).await? {
            let session = self.store.get_session(session_id).await?;
            return Err(SessionError::FeedbackNotRetryable(
                session_id,
                session.pipeline_state,
            ));
        }

        match self.queue.enqueue(session_id).await {
            Ok(ticket) => Ok(ticket),
            Err(e) => {
                let marker = FeedbackRecord::Failed(FeedbackErrorMarker::new(e.to_string()));
                self.store.save_feedback(session_id, &marker).await?;
                Err(e.into())
            }
        }
    }
}
