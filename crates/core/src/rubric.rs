//! Rubric Result Schema
//!
//! The typed shape of the examiner's grade. Model output is parsed strictly
//! into these types and then bounds-checked, so a partially valid grade never
//! leaves this module.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// The four scored dimensions of the individual oral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Criterion {
    /// Language: vocabulary range, grammatical accuracy and register.
    A,
    /// Message: engagement with the visual stimulus during the presentation.
    B1,
    /// Message: development of ideas during the conversation.
    B2,
    /// Interactive skills: sustaining and advancing the communication.
    C,
}

impl Criterion {
    pub const ALL: [Criterion; 4] = [Criterion::A, Criterion::B1, Criterion::B2, Criterion::C];

    /// Highest mark the criterion can award.
    pub fn max_mark(&self) -> f64 {
        match self {
            Criterion::A => 12.0,
            Criterion::B1 | Criterion::B2 | Criterion::C => 6.0,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Criterion::A => "Language",
            Criterion::B1 => "Message: visual stimulus",
            Criterion::B2 => "Message: conversation",
            Criterion::C => "Interactive skills: communication",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Criterion::A => "A",
            Criterion::B1 => "B1",
            Criterion::B2 => "B2",
            Criterion::C => "C",
        };
        f.write_str(code)
    }
}

/// Total marks available across all criteria.
pub const MAX_TOTAL_MARK: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CriterionGrade {
    pub mark: f64,
    /// Markband descriptor the mark falls in, e.g. "7-9".
    pub band: String,
    pub justification: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RubricCriteria {
    #[serde(rename = "A")]
    pub a: CriterionGrade,
    #[serde(rename = "B1")]
    pub b1: CriterionGrade,
    #[serde(rename = "B2")]
    pub b2: CriterionGrade,
    #[serde(rename = "C")]
    pub c: CriterionGrade,
}

impl RubricCriteria {
    pub fn get(&self, criterion: Criterion) -> &CriterionGrade {
        match criterion {
            Criterion::A => &self.a,
            Criterion::B1 => &self.b1,
            Criterion::B2 => &self.b2,
            Criterion::C => &self.c,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Criterion, &CriterionGrade)> {
        Criterion::ALL.into_iter().map(|c| (c, self.get(c)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RubricResult {
    pub criteria: RubricCriteria,
    pub total_mark: f64,
    pub overall_summary: String,
    pub top_strengths: Vec<String>,
    pub priority_improvements: Vec<String>,
}

/// Why a grading attempt produced no rubric.
#[derive(Debug, Error)]
pub enum GradingError {
    #[error("language model request failed: {0}")]
    Request(#[source] anyhow::Error),
    #[error("language model returned no content")]
    EmptyResponse,
    #[error("model output contains no JSON object")]
    NoJsonObject,
    #[error("model output does not match the rubric schema: {0}")]
    Unparsable(#[from] serde_json::Error),
    #[error("criterion {criterion} mark {mark} is outside 0..={max}")]
    MarkOutOfBounds {
        criterion: Criterion,
        mark: f64,
        max: f64,
    },
    #[error("missing prompt template: '{0}'")]
    MissingPrompt(String),
}

impl RubricResult {
    pub fn criterion(&self, criterion: Criterion) -> &CriterionGrade {
        self.criteria.get(criterion)
    }

    /// Sum of the four criterion marks.
    pub fn sum_of_marks(&self) -> f64 {
        self.criteria.iter().map(|(_, grade)| grade.mark).sum()
    }

    /// Parses raw model output into a validated rubric.
    ///
    /// Code fences or prose around the JSON are ignored: everything from the
    /// first `{` to the last `}` is parsed. The model's own `totalMark` is
    /// replaced by the sum of the criterion marks.
    pub fn from_model_output(raw: &str) -> Result<Self, GradingError> {
        let json = extract_json_object(raw).ok_or(GradingError::NoJsonObject)?;
        let mut rubric: RubricResult = serde_json::from_str(json)?;
        rubric.validate()?;

        let sum = rubric.sum_of_marks();
        if (rubric.total_mark - sum).abs() > f64::EPSILON {
            warn!(
                reported = rubric.total_mark,
                computed = sum,
                "Model total mark disagrees with criterion marks; using the sum."
            );
            rubric.total_mark = sum;
        }
        Ok(rubric)
    }

    /// Checks every mark against its criterion maximum.
    pub fn validate(&self) -> Result<(), GradingError> {
        for (criterion, grade) in self.criteria.iter() {
            let max = criterion.max_mark();
            if !(0.0..=max).contains(&grade.mark) {
                return Err(GradingError::MarkOutOfBounds {
                    criterion,
                    mark: grade.mark,
                    max,
                });
            }
        }
        Ok(())
    }
}

fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Pretty-printed JSON schema of [`RubricResult`], embedded in grading prompts.
pub fn rubric_json_schema() -> String {
    let schema = schemars::schema_for!(RubricResult);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn grade_json(mark: f64) -> serde_json::Value {
        json!({
            "mark": mark,
            "band": "5-6",
            "justification": "Uses the image well.",
            "strengths": ["Clear description"],
            "improvements": ["Link to culture"]
        })
    }

    pub(crate) fn rubric_json(a: f64, b1: f64, b2: f64, c: f64, total: f64) -> String {
        json!({
            "criteria": {
                "A": grade_json(a),
                "B1": grade_json(b1),
                "B2": grade_json(b2),
                "C": grade_json(c)
            },
            "totalMark": total,
            "overallSummary": "Solid performance.",
            "topStrengths": ["Fluent presentation"],
            "priorityImprovements": ["Use more past tenses"]
        })
        .to_string()
    }

    #[test]
    fn test_parses_valid_output() {
        let rubric = RubricResult::from_model_output(&rubric_json(9.0, 5.0, 4.0, 5.0, 23.0)).unwrap();
        assert_eq!(rubric.criterion(Criterion::A).mark, 9.0);
        assert_eq!(rubric.total_mark, 23.0);
        assert_eq!(rubric.top_strengths, vec!["Fluent presentation"]);
    }

    #[test]
    fn test_strips_code_fences() {
        let raw = format!(
            "Here is the grade:\n```json\n{}\n```",
            rubric_json(6.0, 3.0, 3.0, 3.0, 15.0)
        );
        let rubric = RubricResult::from_model_output(&raw).unwrap();
        assert_eq!(rubric.total_mark, 15.0);
    }

    #[test]
    fn test_total_is_recomputed_from_marks() {
        let rubric = RubricResult::from_model_output(&rubric_json(10.0, 6.0, 5.0, 4.0, 30.0)).unwrap();
        assert_eq!(rubric.total_mark, 25.0);
        assert_eq!(rubric.total_mark, rubric.sum_of_marks());
    }

    #[test]
    fn test_rejects_mark_above_criterion_max() {
        let err = RubricResult::from_model_output(&rubric_json(13.0, 5.0, 5.0, 5.0, 28.0)).unwrap_err();
        match err {
            GradingError::MarkOutOfBounds { criterion, mark, max } => {
                assert_eq!(criterion, Criterion::A);
                assert_eq!(mark, 13.0);
                assert_eq!(max, 12.0);
            }
            other => panic!("Expected MarkOutOfBounds, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_negative_mark() {
        let err = RubricResult::from_model_output(&rubric_json(5.0, 5.0, -1.0, 5.0, 14.0)).unwrap_err();
        assert!(matches!(
            err,
            GradingError::MarkOutOfBounds { criterion: Criterion::B2, .. }
        ));
    }

    #[test]
    fn test_rejects_missing_field() {
        let raw = json!({
            "criteria": { "A": grade_json(5.0), "B1": grade_json(5.0), "B2": grade_json(5.0) },
            "totalMark": 15,
            "overallSummary": "x",
            "topStrengths": [],
            "priorityImprovements": []
        })
        .to_string();
        let err = RubricResult::from_model_output(&raw).unwrap_err();
        assert!(matches!(err, GradingError::Unparsable(_)));
    }

    #[test]
    fn test_rejects_non_json() {
        let err = RubricResult::from_model_output("I cannot grade this.").unwrap_err();
        assert!(matches!(err, GradingError::NoJsonObject));
    }

    #[test]
    fn test_max_marks_sum_to_total() {
        let sum: f64 = Criterion::ALL.iter().map(Criterion::max_mark).sum();
        assert_eq!(sum, MAX_TOTAL_MARK);
    }

    #[test]
    fn test_schema_names_every_criterion() {
        let schema = rubric_json_schema();
        for code in ["\"A\"", "\"B1\"", "\"B2\"", "\"C\"", "totalMark", "priorityImprovements"] {
            assert!(schema.contains(code), "schema is missing {code}");
        }
    }

    #[test]
    fn test_grading_error_display() {
        let err = GradingError::MarkOutOfBounds {
            criterion: Criterion::C,
            mark: 7.0,
            max: 6.0,
        };
        assert_eq!(err.to_string(), "criterion C mark 7 is outside 0..=6");
    }
}
