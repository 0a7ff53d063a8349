//! Rubric Grading Service
//!
//! This module asks a language model to grade a finished practice session
//! against the four-criterion oral rubric. The model sees the whole formatted
//! conversation, how long each phase took and what the image was about, and
//! must answer with one JSON object that parses into a [`RubricResult`].

use crate::{
    llm_client::LLMClient,
    rubric::{GradingError, RubricResult, rubric_json_schema},
    transcript::{ImageContext, PhaseTimestamps, Transcript, TurnRole},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, instrument};

/// Key of the grading template in the prompt map.
pub const GRADE_RUBRIC_PROMPT: &str = "grade_rubric";

const DEFAULT_GRADE_RUBRIC_TEMPLATE: &str = include_str!("../prompts/grade_rubric.md");

const GRADER_SYSTEM_PROMPT: &str = "You are a strict, experienced examiner for the Spanish \
individual oral. You grade transcripts against a fixed rubric, cite evidence for every \
mark, and always answer with a single JSON object.";

/// The built-in prompt templates, keyed by name.
pub fn default_prompts() -> HashMap<String, String> {
    HashMap::from([(
        GRADE_RUBRIC_PROMPT.to_string(),
        DEFAULT_GRADE_RUBRIC_TEMPLATE.to_string(),
    )])
}

/// Everything the grader is shown about one session.
#[derive(Debug, Clone)]
pub struct GradingRequest {
    pub transcript: Transcript,
    pub presentation_text: String,
    pub image: ImageContext,
    pub timestamps: PhaseTimestamps,
}

/// Defines the contract for any service that can grade a session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RubricGrader: Send + Sync {
    /// Grades the session. Fails instead of returning a partial rubric.
    async fn grade(&self, request: &GradingRequest) -> Result<RubricResult, GradingError>;
}

/// A `RubricGrader` backed by an LLM.
pub struct LLMRubricGrader {
    client: Arc<dyn LLMClient>,
    prompts: HashMap<String, String>,
}

impl LLMRubricGrader {
    /// Creates a new grader.
    ///
    /// # Arguments
    ///
    /// * `client` - The model transport.
    /// * `prompts` - A map of template strings, which must include a key for
    ///   `"grade_rubric"` (see [`default_prompts`]).
    pub fn new(client: Arc<dyn LLMClient>, prompts: HashMap<String, String>) -> Self {
        Self { client, prompts }
    }

    /// Renders the grading prompt for `request`.
    pub fn build_prompt(&self, request: &GradingRequest) -> Result<String, GradingError> {
        let template = self
            .prompts
            .get(GRADE_RUBRIC_PROMPT)
            .ok_or_else(|| GradingError::MissingPrompt(GRADE_RUBRIC_PROMPT.to_string()))?;

        let image_context = format_image_context(&request.image);
        let session_context = format_session_context(request);
        let conversation = format_conversation(request);
        let output_schema = rubric_json_schema();
        Ok(render_template(
            template,
            &[
                ("image_context", image_context.as_str()),
                ("session_context", session_context.as_str()),
                ("conversation", conversation.as_str()),
                ("output_schema", output_schema.as_str()),
            ],
        ))
    }
}

/// Replaces `{name}` placeholders in one left-to-right pass. Substituted text
/// is never scanned again, so learner text that happens to contain a
/// placeholder stays literal. Unknown braces are kept as they are.
fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        let matched = values.iter().find_map(|(name, value)| {
            let after = tail.strip_prefix(name)?.strip_prefix('}')?;
            Some((*value, after))
        });
        match matched {
            Some((value, after)) => {
                out.push_str(value);
                rest = after;
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

#[async_trait]
impl RubricGrader for LLMRubricGrader {
    #[instrument(skip_all, fields(turns = request.transcript.turns().len()))]
    async fn grade(&self, request: &GradingRequest) -> Result<RubricResult, GradingError> {
        let prompt = self.build_prompt(request)?;
        let raw = self
            .client
            .complete_json(GRADER_SYSTEM_PROMPT, &prompt)
            .await
            .map_err(GradingError::Request)?;
        if raw.trim().is_empty() {
            return Err(GradingError::EmptyResponse);
        }

        let rubric = RubricResult::from_model_output(&raw)?;
        info!(total_mark = rubric.total_mark, "Rubric grading complete");
        Ok(rubric)
    }
}

fn format_minutes(minutes: Option<f64>) -> String {
    match minutes {
        Some(minutes) => format!("{minutes:.1} minutes"),
        None => "not recorded".to_string(),
    }
}

fn format_session_context(request: &GradingRequest) -> String {
    let ts = &request.timestamps;
    let transcript = &request.transcript;
    let student_turns = transcript.student_turns().count();
    let examiner_turns = transcript
        .conversation()
        .filter(|t| t.role == TurnRole::Examiner)
        .count();
    let total = crate::transcript::minutes_between(
        ts.present_started_at.or(ts.converse_started_at),
        ts.completed_at,
    );

    let mut out = String::new();
    let _ = writeln!(out, "- Preparation: {}", format_minutes(ts.preparation_minutes()));
    let _ = writeln!(
        out,
        "- Presentation: {} ({} words)",
        format_minutes(ts.presentation_minutes()),
        transcript.presentation_words()
    );
    let _ = writeln!(
        out,
        "- Conversation: {} ({} words over {} student turns, {} examiner turns)",
        format_minutes(ts.conversation_minutes()),
        transcript.student_words(),
        student_turns,
        examiner_turns
    );
    let _ = write!(out, "- Total speaking time: {}", format_minutes(total));
    out
}

fn format_conversation(request: &GradingRequest) -> String {
    let mut out = String::new();
    if request.presentation_text.trim().is_empty() {
        out.push_str("PRESENTATION: (the student gave no presentation)\n");
    } else {
        let _ = writeln!(out, "PRESENTATION:\n{}\n", request.presentation_text.trim());
    }

    let mut any_turn = false;
    for turn in request.transcript.conversation() {
        any_turn = true;
        let speaker = match turn.role {
            TurnRole::Examiner => "EXAMINER",
            _ => "STUDENT",
        };
        let _ = writeln!(out, "{speaker}: {}", turn.content.trim());
    }
    if !any_turn {
        out.push_str("(no conversation took place)\n");
    }
    out
}

fn format_list(out: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "{heading}:");
    for item in items {
        let _ = writeln!(out, "- {item}");
    }
}

fn format_image_context(image: &ImageContext) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Theme: {}", image.theme);
    let _ = writeln!(out, "Cultural context: {}", image.cultural_context);
    format_list(&mut out, "Talking points", &image.talking_points);

    if let Some(analysis) = &image.ai_analysis {
        let _ = writeln!(out, "Image description: {}", analysis.description);
        if !analysis.cultural_context.is_empty() {
            let _ = writeln!(out, "Detailed cultural context: {}", analysis.cultural_context);
        }
        format_list(&mut out, "Themes", &analysis.themes);
        format_list(&mut out, "Suggested talking points", &analysis.talking_points);
        format_list(&mut out, "Deeper questions", &analysis.deeper_questions);
        format_list(&mut out, "Useful vocabulary", &analysis.vocabulary_hints);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::MockLLMClient;
    use crate::rubric::tests::rubric_json;
    use crate::transcript::{ImageAnalysis, Turn};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 2, 14, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn request() -> GradingRequest {
        let transcript = Transcript::new(vec![
            Turn::new(TurnRole::Presentation, "En la foto veo una fiesta.", at(10)),
            Turn::new(TurnRole::Examiner, "¿Por qué es importante?", at(14)),
            Turn::new(TurnRole::Student, "Porque une a la familia.", at(15)),
        ]);
        GradingRequest {
            presentation_text: "En la foto veo una fiesta.".to_string(),
            transcript,
            image: ImageContext {
                cultural_context: "Fiestas patronales en Andalucía".to_string(),
                theme: "Identidades".to_string(),
                talking_points: vec!["Tradición".to_string()],
                ai_analysis: Some(ImageAnalysis {
                    description: "Una procesión en un pueblo".to_string(),
                    vocabulary_hints: vec!["la procesión".to_string()],
                    ..Default::default()
                }),
            },
            timestamps: PhaseTimestamps {
                prep_started_at: Some(at(0)),
                present_started_at: Some(at(10)),
                converse_started_at: Some(at(14)),
                completed_at: Some(at(22)),
            },
        }
    }

    #[test]
    fn test_prompt_includes_every_section() {
        let grader = LLMRubricGrader::new(Arc::new(MockLLMClient::new()), default_prompts());
        let prompt = grader.build_prompt(&request()).unwrap();

        assert!(prompt.contains("written transcript"));
        assert!(prompt.contains("Do not penalise the student for missing evidence of pronunciation"));
        assert!(prompt.contains("Theme: Identidades"));
        assert!(prompt.contains("- la procesión"));
        assert!(prompt.contains("- Preparation: 10.0 minutes"));
        assert!(prompt.contains("- Presentation: 4.0 minutes (6 words)"));
        assert!(prompt.contains("(5 words over 1 student turns, 1 examiner turns)"));
        assert!(prompt.contains("- Total speaking time: 12.0 minutes"));
        assert!(prompt.contains("EXAMINER: ¿Por qué es importante?"));
        assert!(prompt.contains("STUDENT: Porque une a la familia."));
        assert!(prompt.contains("priorityImprovements"));
        assert!(!prompt.contains("{conversation}"));
    }

    #[test]
    fn test_prompt_marks_missing_phases() {
        let grader = LLMRubricGrader::new(Arc::new(MockLLMClient::new()), default_prompts());
        let request = GradingRequest {
            transcript: Transcript::default(),
            presentation_text: String::new(),
            image: ImageContext::default(),
            timestamps: PhaseTimestamps::default(),
        };
        let prompt = grader.build_prompt(&request).unwrap();
        assert!(prompt.contains("the student gave no presentation"));
        assert!(prompt.contains("(no conversation took place)"));
        assert!(prompt.contains("- Conversation: not recorded"));
    }

    #[test]
    fn test_placeholders_in_learner_text_stay_literal() {
        let grader = LLMRubricGrader::new(Arc::new(MockLLMClient::new()), default_prompts());
        let mut request = request();
        request.transcript = Transcript::new(vec![Turn::new(
            TurnRole::Student,
            "Escribo {output_schema} y {image_context} en la pizarra.",
            at(15),
        )]);
        let prompt = grader.build_prompt(&request).unwrap();

        assert!(prompt.contains("STUDENT: Escribo {output_schema} y {image_context} en la pizarra."));
        assert_eq!(prompt.matches("Theme: Identidades").count(), 1);
    }

    #[test]
    fn test_render_template_keeps_unknown_braces() {
        let rendered = render_template(
            "{\"a\": {x}} {y} {",
            &[("x", "1"), ("y", "{x}")],
        );
        assert_eq!(rendered, "{\"a\": 1} {x} {");
    }

    #[test]
    fn test_missing_template_is_an_error() {
        let grader = LLMRubricGrader::new(Arc::new(MockLLMClient::new()), HashMap::new());
        let err = grader.build_prompt(&request()).unwrap_err();
        assert!(matches!(err, GradingError::MissingPrompt(key) if key == "grade_rubric"));
    }

    #[tokio::test]
    async fn test_grade_parses_model_output() {
        let mut client = MockLLMClient::new();
        let body = rubric_json(8.0, 5.0, 4.0, 4.0, 21.0);
        client
            .expect_complete_json()
            .withf(|system, user| system.contains("examiner") && user.contains("STUDENT:"))
            .times(1)
            .returning(move |_, _| Ok(body.clone()));

        let grader = LLMRubricGrader::new(Arc::new(client), default_prompts());
        let rubric = grader.grade(&request()).await.unwrap();
        assert_eq!(rubric.total_mark, 21.0);
    }

    #[tokio::test]
    async fn test_grade_propagates_transport_errors() {
        let mut client = MockLLMClient::new();
        client
            .expect_complete_json()
            .returning(|_, _| Err(anyhow::anyhow!("request timed out")));

        let grader = LLMRubricGrader::new(Arc::new(client), default_prompts());
        let err = grader.grade(&request()).await.unwrap_err();
        assert!(matches!(err, GradingError::Request(_)));
        assert!(err.to_string().contains("request timed out"));
    }

    #[tokio::test]
    async fn test_grade_rejects_empty_and_invalid_output() {
        let mut client = MockLLMClient::new();
        client
            .expect_complete_json()
            .times(1)
            .returning(|_, _| Ok("   ".to_string()));
        let grader = LLMRubricGrader::new(Arc::new(client), default_prompts());
        assert!(matches!(
            grader.grade(&request()).await,
            Err(GradingError::EmptyResponse)
        ));

        let mut client = MockLLMClient::new();
        let body = rubric_json(12.0, 7.0, 4.0, 4.0, 27.0);
        client
            .expect_complete_json()
            .returning(move |_, _| Ok(body.clone()));
        let grader = LLMRubricGrader::new(Arc::new(client), default_prompts());
        assert!(matches!(
            grader.grade(&request()).await,
            Err(GradingError::MarkOutOfBounds { .. })
        ));
    }
}
