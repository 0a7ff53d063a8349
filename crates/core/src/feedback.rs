//! Feedback Orchestrator
//!
//! Runs the four quantitative analyzers and the rubric grader over one
//! completed session and merges their results into a single report. All five
//! units see the same immutable snapshot and run concurrently; if any of them
//! fails the whole run fails and nothing partial is returned.

use crate::{
    analysis::{
        CefrLevel, DepthAnalysis, PaceAnalysis, TenseAnalysis, VocabularyAnalysis, analyze_depth,
        analyze_pace, analyze_tenses, analyze_vocabulary,
    },
    grader::{GradingRequest, RubricGrader},
    lifecycle::{SessionLifecycle, SessionPhase},
    rubric::{GradingError, RubricResult},
    transcript::{ImageContext, PhaseTimestamps, Transcript},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{error, info, instrument};

/// Where a session's feedback run stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::NotStarted => "not_started",
            PipelineState::Running => "running",
            PipelineState::Succeeded => "succeeded",
            PipelineState::Failed => "failed",
        }
    }

    /// Whether a caller may (re)start a run from this state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineState::NotStarted | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(PipelineState::NotStarted),
            "running" => Ok(PipelineState::Running),
            "succeeded" => Ok(PipelineState::Succeeded),
            "failed" => Ok(PipelineState::Failed),
            other => Err(format!("unknown pipeline state '{other}'")),
        }
    }
}

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("rubric grading failed: {0}")]
    Grading(#[from] GradingError),
    #[error("{analyzer} analysis failed: {message}")]
    Analyzer {
        analyzer: &'static str,
        message: String,
    },
    #[error("feedback requires a completed session, but it is '{0}'")]
    SessionNotCompleted(SessionPhase),
}

/// The snapshot one pipeline run works on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackInput {
    pub transcript: Transcript,
    #[serde(default)]
    pub timestamps: PhaseTimestamps,
    #[serde(default)]
    pub image: ImageContext,
}

impl FeedbackInput {
    /// Builds the input for a session, refusing any session that has not
    /// reached `Completed`.
    pub fn from_completed(
        lifecycle: &SessionLifecycle,
        transcript: Transcript,
        image: ImageContext,
    ) -> Result<Self, FeedbackError> {
        if !lifecycle.is_completed() {
            return Err(FeedbackError::SessionNotCompleted(lifecycle.phase));
        }
        Ok(Self {
            transcript,
            timestamps: lifecycle.timestamps,
            image,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantitativeAnalysis {
    pub tenses: TenseAnalysis,
    pub depth: DepthAnalysis,
    pub vocabulary: VocabularyAnalysis,
    pub pace: PaceAnalysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackReport {
    pub rubric: RubricResult,
    pub quantitative: QuantitativeAnalysis,
}

/// Headline numbers stored next to a report for listing views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSummary {
    pub total_mark: f64,
    pub estimated_level: CefrLevel,
    #[serde(rename = "overallWPM")]
    pub overall_wpm: u32,
    pub depth_score: f64,
}

impl FeedbackReport {
    pub fn summary(&self) -> FeedbackSummary {
        FeedbackSummary {
            total_mark: self.rubric.total_mark,
            estimated_level: self.quantitative.vocabulary.estimated_level,
            overall_wpm: self.quantitative.pace.overall_wpm,
            depth_score: self.quantitative.depth.overall_score,
        }
    }
}

/// What is persisted in place of a report when a run fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackErrorMarker {
    pub error: bool,
    pub message: String,
}

impl FeedbackErrorMarker {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: true,
            message: message.into(),
        }
    }
}

/// The persisted outcome of a run: a full report or an error marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeedbackRecord {
    Report(Box<FeedbackReport>),
    Failed(FeedbackErrorMarker),
}

impl FeedbackRecord {
    pub fn from_result(result: Result<FeedbackReport, FeedbackError>) -> Self {
        match result {
            Ok(report) => FeedbackRecord::Report(Box::new(report)),
            Err(e) => FeedbackRecord::Failed(FeedbackErrorMarker::new(e.to_string())),
        }
    }

    pub fn pipeline_state(&self) -> PipelineState {
        match self {
            FeedbackRecord::Report(_) => PipelineState::Succeeded,
            FeedbackRecord::Failed(_) => PipelineState::Failed,
        }
    }

    pub fn summary(&self) -> Option<FeedbackSummary> {
        match self {
            FeedbackRecord::Report(report) => Some(report.summary()),
            FeedbackRecord::Failed(_) => None,
        }
    }
}

fn analyzer_failed(analyzer: &'static str) -> impl FnOnce(JoinError) -> FeedbackError {
    move |e| FeedbackError::Analyzer {
        analyzer,
        message: e.to_string(),
    }
}

/// Coordinates one feedback run.
#[derive(Clone)]
pub struct FeedbackOrchestrator {
    grader: Arc<dyn RubricGrader>,
}

impl FeedbackOrchestrator {
    pub fn new(grader: Arc<dyn RubricGrader>) -> Self {
        Self { grader }
    }

    /// Runs every analyzer and the grader concurrently and merges the results.
    ///
    /// The analyzers are CPU-bound and run on the blocking pool; the grader
    /// runs on the calling task. The first failure aborts the join.
    #[instrument(skip_all, fields(turns = input.transcript.turns().len()))]
    pub async fn run(&self, input: &FeedbackInput) -> Result<FeedbackReport, FeedbackError> {
        let transcript = &input.transcript;
        let learner_text = transcript.learner_text();
        let student_messages = transcript.student_messages();
        let presentation_text = transcript
            .presentation()
            .map(|t| t.content.clone())
            .unwrap_or_default();

        let tenses_text = learner_text.clone();
        let tenses = async {
            tokio::task::spawn_blocking(move || analyze_tenses(&tenses_text))
                .await
                .map_err(analyzer_failed("tense"))
        };
        let vocabulary = async {
            tokio::task::spawn_blocking(move || analyze_vocabulary(&learner_text))
                .await
                .map_err(analyzer_failed("vocabulary"))
        };
        let depth = async {
            tokio::task::spawn_blocking(move || analyze_depth(&student_messages))
                .await
                .map_err(analyzer_failed("depth"))
        };
        let pace_transcript = transcript.clone();
        let timestamps = input.timestamps;
        let pace = async {
            tokio::task::spawn_blocking(move || {
                analyze_pace(&pace_transcript, &timestamps, Utc::now())
            })
            .await
            .map_err(analyzer_failed("pace"))
        };

        let request = GradingRequest {
            transcript: transcript.clone(),
            presentation_text,
            image: input.image.clone(),
            timestamps: input.timestamps,
        };
        let rubric = async {
            self.grader
                .grade(&request)
                .await
                .map_err(FeedbackError::from)
        };

        let (tenses, vocabulary, depth, pace, rubric) =
            tokio::try_join!(tenses, vocabulary, depth, pace, rubric).inspect_err(|e| {
                error!(error = %e, "Feedback pipeline failed");
            })?;

        info!(
            total_mark = rubric.total_mark,
            level = %vocabulary.estimated_level,
            "Feedback pipeline succeeded"
        );

        Ok(FeedbackReport {
            rubric,
            quantitative: QuantitativeAnalysis {
                tenses,
                depth,
                vocabulary,
                pace,
            },
        })
    }

    /// Like [`run`](Self::run), but folds a failure into the error marker.
    pub async fn run_to_record(&self, input: &FeedbackInput) -> FeedbackRecord {
        FeedbackRecord::from_result(self.run(input).await)
    }
}
