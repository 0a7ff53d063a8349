//! Post-session feedback for oral-exam practice.
//!
//! A finished practice session (image presentation followed by a conversation
//! with an AI examiner) is turned into a feedback report: an LLM-graded rubric
//! plus four deterministic analyses of the learner's Spanish (tenses,
//! vocabulary, response depth and speaking pace). The [`lifecycle`] module
//! guards the phase state machine that decides when a session is ready.

pub mod analysis;
pub mod feedback;
pub mod grader;
pub mod lifecycle;
pub mod llm_client;
pub mod rubric;
pub mod transcript;

pub use feedback::{
    FeedbackError, FeedbackErrorMarker, FeedbackInput, FeedbackOrchestrator, FeedbackRecord,
    FeedbackReport, FeedbackSummary, PipelineState,
};
pub use lifecycle::{SessionLifecycle, SessionPhase, TransitionError};
