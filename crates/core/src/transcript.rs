//! Transcript and Session Timing Model
//!
//! These are the plain-data inputs of the feedback pipeline: the ordered turns
//! of a practice session, the phase-boundary timestamps stamped by the
//! lifecycle guard, and the context of the image the learner talked about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// The learner's uninterrupted presentation about the image.
    Presentation,
    /// A learner reply during the conversation phase.
    Student,
    /// A question or remark from the AI examiner.
    Examiner,
    /// Anything else the live session may have stored (system notes etc.).
    /// Ignored by every analyzer.
    #[serde(other)]
    Other,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::Presentation => write!(f, "presentation"),
            TurnRole::Student => write!(f, "student"),
            TurnRole::Examiner => write!(f, "examiner"),
            TurnRole::Other => write!(f, "other"),
        }
    }
}

/// A single utterance in the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Word count precomputed by the live session, if it recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<u32>,
}

impl Turn {
    pub fn new(role: TurnRole, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Some(timestamp),
            word_count: None,
        }
    }

    pub fn with_word_count(mut self, word_count: u32) -> Self {
        self.word_count = Some(word_count);
        self
    }

    /// The stored word count, or a whitespace count of the content when absent.
    pub fn words(&self) -> u32 {
        self.word_count
            .unwrap_or_else(|| count_words(&self.content))
    }
}

/// Counts whitespace-separated words.
pub fn count_words(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

/// The ordered list of turns of one session.
///
/// Storage order is not guaranteed to put the presentation first, so it is
/// always located by role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The single presentation turn, if the learner gave one.
    pub fn presentation(&self) -> Option<&Turn> {
        self.turns.iter().find(|t| t.role == TurnRole::Presentation)
    }

    /// Student and examiner turns in transcript order.
    pub fn conversation(&self) -> impl Iterator<Item = &Turn> {
        self.turns
            .iter()
            .filter(|t| matches!(t.role, TurnRole::Student | TurnRole::Examiner))
    }

    pub fn student_turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter().filter(|t| t.role == TurnRole::Student)
    }

    /// Contents of every student turn, one entry per turn.
    pub fn student_messages(&self) -> Vec<String> {
        self.student_turns().map(|t| t.content.clone()).collect()
    }

    /// Presentation text followed by every student turn, joined with spaces.
    pub fn learner_text(&self) -> String {
        self.presentation()
            .map(|t| t.content.as_str())
            .into_iter()
            .chain(self.student_turns().map(|t| t.content.as_str()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn presentation_words(&self) -> u64 {
        self.presentation().map_or(0, |t| u64::from(t.words()))
    }

    /// Summed as `u64`: caller-supplied counts may be arbitrarily large.
    pub fn student_words(&self) -> u64 {
        self.student_turns().map(|t| u64::from(t.words())).sum()
    }
}

impl From<Vec<Turn>> for Transcript {
    fn from(turns: Vec<Turn>) -> Self {
        Self::new(turns)
    }
}

/// Phase-boundary instants recorded by the lifecycle guard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTimestamps {
    #[serde(default)]
    pub prep_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub present_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub converse_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PhaseTimestamps {
    pub fn preparation_minutes(&self) -> Option<f64> {
        minutes_between(self.prep_started_at, self.present_started_at)
    }

    pub fn presentation_minutes(&self) -> Option<f64> {
        minutes_between(self.present_started_at, self.converse_started_at)
    }

    pub fn conversation_minutes(&self) -> Option<f64> {
        minutes_between(self.converse_started_at, self.completed_at)
    }
}

/// Positive number of minutes from `start` to `end`; `None` when either is
/// missing or the interval is empty or negative.
pub fn minutes_between(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Option<f64> {
    let (start, end) = (start?, end?);
    let minutes = (end - start).num_milliseconds() as f64 / 60_000.0;
    (minutes > 0.0).then_some(minutes)
}

/// The image the learner described, as curated in the image library.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContext {
    #[serde(default)]
    pub cultural_context: String,
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub talking_points: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<ImageAnalysis>,
}

/// Optional machine-generated description of the image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysis {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cultural_context: String,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub talking_points: Vec<String>,
    #[serde(default)]
    pub deeper_questions: Vec<String>,
    #[serde(default)]
    pub vocabulary_hints: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn sample() -> Transcript {
        Transcript::new(vec![
            Turn::new(TurnRole::Examiner, "¿Qué ves?", at(5)),
            Turn::new(TurnRole::Presentation, "Hola a todos", at(1)),
            Turn::new(TurnRole::Student, "Veo una fiesta", at(6)),
            Turn::new(TurnRole::Other, "note", at(6)),
            Turn::new(TurnRole::Student, "Me gusta", at(7)).with_word_count(5),
        ])
    }

    #[test]
    fn test_presentation_is_located_by_role() {
        let transcript = sample();
        assert_eq!(transcript.presentation().unwrap().content, "Hola a todos");
    }

    #[test]
    fn test_learner_text_puts_presentation_first() {
        assert_eq!(
            sample().learner_text(),
            "Hola a todos Veo una fiesta Me gusta"
        );
    }

    #[test]
    fn test_conversation_skips_other_roles() {
        let roles: Vec<TurnRole> = sample().conversation().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![TurnRole::Examiner, TurnRole::Student, TurnRole::Student]
        );
    }

    #[test]
    fn test_word_count_prefers_stored_value() {
        let transcript = sample();
        assert_eq!(transcript.presentation_words(), 3);
        assert_eq!(transcript.student_words(), 3 + 5);
    }

    #[test]
    fn test_minutes_between_guards() {
        assert_eq!(minutes_between(Some(at(0)), Some(at(3))), Some(3.0));
        assert_eq!(minutes_between(Some(at(3)), Some(at(3))), None);
        assert_eq!(minutes_between(Some(at(3)), Some(at(0))), None);
        assert_eq!(minutes_between(None, Some(at(3))), None);
    }

    #[test]
    fn test_transcript_deserializes_from_wire_shape() {
        let json = r#"[
            {"role": "presentation", "content": "Hola", "timestamp": "2025-03-10T09:01:00Z", "wordCount": 1},
            {"role": "student", "content": "Sí", "timestamp": "2025-03-10T09:05:00Z"},
            {"role": "system", "content": "ignored", "timestamp": "2025-03-10T09:05:30Z"}
        ]"#;
        let transcript: Transcript = serde_json::from_str(json).unwrap();
        assert_eq!(transcript.turns().len(), 3);
        assert_eq!(transcript.turns()[0].word_count, Some(1));
        assert_eq!(transcript.turns()[2].role, TurnRole::Other);
    }

    #[test]
    fn test_phase_timestamps_use_camel_case() {
        let json = r#"{"presentStartedAt": "2025-03-10T09:00:00Z", "converseStartedAt": "2025-03-10T09:03:00Z"}"#;
        let ts: PhaseTimestamps = serde_json::from_str(json).unwrap();
        assert_eq!(ts.presentation_minutes(), Some(3.0));
        assert_eq!(ts.conversation_minutes(), None);
    }
}
