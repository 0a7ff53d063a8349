//! Shared fixtures for the worker's unit tests.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use oralexam_core::{
    grader::{GradingRequest, RubricGrader},
    lifecycle::SessionPhase,
    rubric::{GradingError, RubricResult},
    transcript::{ImageContext, Turn, TurnRole},
};
use serde_json::json;
use uuid::Uuid;

use crate::store::SessionStore;

fn grade(mark: f64) -> serde_json::Value {
    json!({
        "mark": mark,
        "band": "3-4",
        "justification": "Adequate.",
        "strengths": ["Relevant"],
        "improvements": ["More detail"]
    })
}

/// A valid rubric worth 20 marks.
pub fn sample_rubric() -> RubricResult {
    let raw = json!({
        "criteria": { "A": grade(8.0), "B1": grade(4.0), "B2": grade(4.0), "C": grade(4.0) },
        "totalMark": 20,
        "overallSummary": "Good effort.",
        "topStrengths": ["Confident"],
        "priorityImprovements": ["Vary tenses"]
    });
    RubricResult::from_model_output(&raw.to_string()).unwrap()
}

pub struct FixedGrader;

#[async_trait]
impl RubricGrader for FixedGrader {
    async fn grade(&self, _request: &GradingRequest) -> Result<RubricResult, GradingError> {
        Ok(sample_rubric())
    }
}

/// Never answers within any sensible test timeout.
pub struct SlowGrader;

#[async_trait]
impl RubricGrader for SlowGrader {
    async fn grade(&self, _request: &GradingRequest) -> Result<RubricResult, GradingError> {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        Err(GradingError::EmptyResponse)
    }
}

pub struct PanickingGrader;

#[async_trait]
impl RubricGrader for PanickingGrader {
    async fn grade(&self, _request: &GradingRequest) -> Result<RubricResult, GradingError> {
        panic!("grader exploded");
    }
}

/// Adds a short transcript to a new session and walks it to `Completed`.
pub async fn completed_session(store: &dyn SessionStore) -> Uuid {
    let start = Utc::now() - Duration::minutes(20);
    let image = ImageContext {
        theme: "Tradiciones".to_string(),
        cultural_context: "La Tomatina en Buñol".to_string(),
        ..Default::default()
    };
    let session = store.create_session(image, start).await.unwrap();

    let turns = [
        (TurnRole::Presentation, "En la foto hay mucha gente. Creo que es una fiesta.", 10),
        (TurnRole::Examiner, "¿Has ido a una fiesta así?", 13),
        (TurnRole::Student, "Sí, fui el año pasado porque mi familia vive allí.", 14),
    ];
    for (role, text, minute) in turns {
        store
            .add_turn(session.id, &Turn::new(role, text, start + Duration::minutes(minute)))
            .await
            .unwrap();
    }

    let mut lifecycle = session.lifecycle;
    for (phase, minute) in [
        (SessionPhase::Presenting, 10),
        (SessionPhase::Conversing, 13),
        (SessionPhase::Completed, 18),
    ] {
        let previous = lifecycle.phase;
        lifecycle
            .advance(phase, start + Duration::minutes(minute))
            .unwrap();
        store
            .update_lifecycle(session.id, previous, &lifecycle)
            .await
            .unwrap();
    }
    session.id
}
