//! Session Records and Database Rows
//!
//! `SessionRecord` is what the rest of the worker sees. The `*Row` types map
//! one-to-one onto the Postgres tables and are converted at the store boundary.

use chrono::{DateTime, Utc};
use oralexam_core::{
    feedback::{FeedbackRecord, FeedbackSummary, PipelineState},
    lifecycle::{SessionLifecycle, SessionPhase},
    transcript::{ImageContext, PhaseTimestamps, Turn, TurnRole},
};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use uuid::Uuid;

use crate::store::StoreError;

/// One practice session as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: Uuid,
    pub lifecycle: SessionLifecycle,
    pub image: ImageContext,
    pub pipeline_state: PipelineState,
    pub feedback: Option<FeedbackRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// A fresh session in the preparing phase.
    pub fn new(image: ImageContext, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            lifecycle: SessionLifecycle::start(now),
            image,
            pipeline_state: PipelineState::NotStarted,
            feedback: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.lifecycle.phase
    }

    pub fn summary(&self) -> Option<FeedbackSummary> {
        self.feedback.as_ref().and_then(FeedbackRecord::summary)
    }
}

#[derive(Debug, FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub phase: String,
    pub prep_started_at: Option<DateTime<Utc>>,
    pub present_started_at: Option<DateTime<Utc>>,
    pub converse_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub image_context: Json<ImageContext>,
    pub pipeline_state: String,
    pub feedback: Option<Json<FeedbackRecord>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for SessionRecord {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let phase = row
            .phase
            .parse::<SessionPhase>()
            .map_err(|e| StoreError::Corrupt(row.id, e.to_string()))?;
        let pipeline_state = row
            .pipeline_state
            .parse::<PipelineState>()
            .map_err(|e| StoreError::Corrupt(row.id, e))?;

        Ok(Self {
            id: row.id,
            lifecycle: SessionLifecycle {
                phase,
                timestamps: PhaseTimestamps {
                    prep_started_at: row.prep_started_at,
                    present_started_at: row.present_started_at,
                    converse_started_at: row.converse_started_at,
                    completed_at: row.completed_at,
                },
            },
            image: row.image_context.0,
            pipeline_state,
            feedback: row.feedback.map(|json| json.0),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct TurnRow {
    pub role: String,
    pub content: String,
    pub word_count: Option<i32>,
    pub spoken_at: Option<DateTime<Utc>>,
}

pub(crate) fn role_from_db(role: &str) -> TurnRole {
    match role {
        "presentation" => TurnRole::Presentation,
        "student" => TurnRole::Student,
        "examiner" => TurnRole::Examiner,
        _ => TurnRole::Other,
    }
}

impl From<TurnRow> for Turn {
    fn from(row: TurnRow) -> Self {
        Turn {
            role: role_from_db(&row.role),
            content: row.content,
            timestamp: row.spoken_at,
            word_count: row.word_count.and_then(|n| u32::try_from(n).ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(phase: &str, pipeline_state: &str) -> SessionRow {
        let now = Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap();
        SessionRow {
            id: Uuid::nil(),
            phase: phase.to_string(),
            prep_started_at: Some(now),
            present_started_at: None,
            converse_started_at: None,
            completed_at: None,
            image_context: Json(ImageContext {
                theme: "Fiestas".to_string(),
                ..Default::default()
            }),
            pipeline_state: pipeline_state.to_string(),
            feedback: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_session_row_converts() {
        let record = SessionRecord::try_from(row("conversing", "not_started")).unwrap();
        assert_eq!(record.phase(), SessionPhase::Conversing);
        assert_eq!(record.pipeline_state, PipelineState::NotStarted);
        assert_eq!(record.image.theme, "Fiestas");
        assert!(record.lifecycle.timestamps.prep_started_at.is_some());
        assert!(record.summary().is_none());
    }

    #[test]
    fn test_session_row_with_unknown_phase_is_corrupt() {
        let err = SessionRecord::try_from(row("paused", "not_started")).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_, _)));
        let err = SessionRecord::try_from(row("completed", "queued")).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_, _)));
    }

    #[test]
    fn test_turn_row_converts() {
        let turn = Turn::from(TurnRow {
            role: "examiner".to_string(),
            content: "¿Por qué?".to_string(),
            word_count: Some(-3),
            spoken_at: None,
        });
        assert_eq!(turn.role, TurnRole::Examiner);
        assert_eq!(turn.word_count, None);
        assert_eq!(role_from_db("narrator"), TurnRole::Other);
    }

    #[test]
    fn test_new_record_starts_preparing() {
        let now = Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap();
        let record = SessionRecord::new(ImageContext::default(), now);
        assert_eq!(record.phase(), SessionPhase::Preparing);
        assert_eq!(record.lifecycle.timestamps.prep_started_at, Some(now));
        assert_eq!(record.pipeline_state, PipelineState::NotStarted);
    }
}
