//! Response-depth scoring of the learner's conversation turns.
//!
//! Every utterance is measured on its own (words, sentences, discourse
//! markers); the metrics are averaged over all utterances and mapped onto
//! 0–10 factor scores, which are then combined with fixed weights.

use super::{NONE_LABEL, round1};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorScore {
    pub name: String,
    pub score: f64,
    /// Raw total across all utterances (words, sentences or marker hits).
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthAnalysis {
    pub overall_score: f64,
    pub factor_scores: Vec<FactorScore>,
    pub average_response_length: u32,
    pub strongest_factor: String,
    pub weakest_factor: String,
}

/// Linear 0–10 mapping bounds and weight of one factor.
struct Factor {
    name: &'static str,
    low: f64,
    high: f64,
    weight: f64,
}

const FACTORS: [Factor; 6] = [
    Factor { name: "Response Length", low: 5.0, high: 60.0, weight: 0.15 },
    Factor { name: "Sentence Count", low: 1.0, high: 5.0, weight: 0.10 },
    Factor { name: "Elaboration", low: 0.0, high: 2.0, weight: 0.20 },
    Factor { name: "Examples", low: 0.0, high: 1.5, weight: 0.20 },
    Factor { name: "Opinions", low: 0.0, high: 1.0, weight: 0.15 },
    Factor { name: "Justifications", low: 0.0, high: 1.5, weight: 0.20 },
];

#[rustfmt::skip]
const ELABORATION_MARKERS: &[&str] = &[
    "además", "también", "asimismo", "por otro lado", "es decir", "en otras palabras",
    "incluso", "no solo", "sino también", "de hecho", "in addition", "moreover", "furthermore",
];

#[rustfmt::skip]
const EXAMPLE_MARKERS: &[&str] = &[
    "por ejemplo", "un ejemplo", "tal como", "en el caso de", "se puede ver",
    "for example", "for instance", "such as",
];

#[rustfmt::skip]
const OPINION_MARKERS: &[&str] = &[
    "creo que", "pienso que", "en mi opinión", "me parece", "opino que", "considero que",
    "para mí", "a mi parecer", "desde mi punto de vista", "i think", "in my opinion", "i believe",
];

#[rustfmt::skip]
const JUSTIFICATION_MARKERS: &[&str] = &[
    "porque", "ya que", "puesto que", "dado que", "debido a", "por eso", "por lo tanto",
    "así que", "por esta razón", "because", "therefore", "since",
];

const SENTENCE_BREAKS: [char; 5] = ['.', '!', '?', '¿', '¡'];

/// Counts occurrences of `needle` in `haystack`, overlaps included. The scan
/// restarts one character after the start of each hit.
pub fn count_occurrences(haystack: &str, needle: &str) -> u32 {
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut from = 0;
    while let Some(found) = haystack[from..].find(needle) {
        count += 1;
        let start = from + found;
        let step = haystack[start..].chars().next().map_or(1, char::len_utf8);
        from = start + step;
    }
    count
}

fn count_markers(lowered: &str, markers: &[&str]) -> u32 {
    markers
        .iter()
        .map(|marker| count_occurrences(lowered, marker))
        .sum()
}

fn count_sentences(utterance: &str) -> u32 {
    utterance
        .split(SENTENCE_BREAKS)
        .filter(|segment| !segment.trim().is_empty())
        .count() as u32
}

/// Maps `value` linearly from `[low, high]` onto `[0, 10]`, clamping outside.
fn scale(value: f64, low: f64, high: f64) -> f64 {
    if value <= low {
        0.0
    } else if value >= high {
        10.0
    } else {
        (value - low) / (high - low) * 10.0
    }
}

/// Scores the depth of the learner's answers.
///
/// `strongest_factor` is the first factor in a stable descending sort by
/// score and `weakest_factor` the last, so on ties the strongest is the
/// earliest factor in declaration order and the weakest the latest.
pub fn analyze_depth<S: AsRef<str>>(utterances: &[S]) -> DepthAnalysis {
    if utterances.is_empty() {
        return DepthAnalysis {
            overall_score: 0.0,
            factor_scores: FACTORS
                .iter()
                .map(|f| FactorScore {
                    name: f.name.to_string(),
                    score: 0.0,
                    count: 0,
                })
                .collect(),
            average_response_length: 0,
            strongest_factor: NONE_LABEL.to_string(),
            weakest_factor: NONE_LABEL.to_string(),
        };
    }

    // words, sentences, elaboration, examples, opinions, justifications
    let mut totals = [0u32; 6];
    for utterance in utterances {
        let utterance = utterance.as_ref();
        let lowered = utterance.to_lowercase();
        let metrics = [
            utterance.split_whitespace().count() as u32,
            count_sentences(utterance),
            count_markers(&lowered, ELABORATION_MARKERS),
            count_markers(&lowered, EXAMPLE_MARKERS),
            count_markers(&lowered, OPINION_MARKERS),
            count_markers(&lowered, JUSTIFICATION_MARKERS),
        ];
        for (total, metric) in totals.iter_mut().zip(metrics) {
            *total = total.saturating_add(metric);
        }
    }

    let n = utterances.len() as f64;
    let factor_scores: Vec<FactorScore> = FACTORS
        .iter()
        .zip(totals)
        .map(|(factor, total)| FactorScore {
            name: factor.name.to_string(),
            score: round1(scale(total as f64 / n, factor.low, factor.high)),
            count: total,
        })
        .collect();

    let overall_score = round1(
        FACTORS
            .iter()
            .zip(&factor_scores)
            .map(|(factor, scored)| factor.weight * scored.score)
            .sum(),
    );

    let mut ranked: Vec<&FactorScore> = factor_scores.iter().collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    let strongest_factor = ranked.first().map(|f| f.name.clone());
    let weakest_factor = ranked.last().map(|f| f.name.clone());

    DepthAnalysis {
        overall_score,
        average_response_length: (totals[0] as f64 / n).round() as u32,
        strongest_factor: strongest_factor.unwrap_or_else(|| NONE_LABEL.to_string()),
        weakest_factor: weakest_factor.unwrap_or_else(|| NONE_LABEL.to_string()),
        factor_scores,
    }
}
