//! Quantitative Transcript Analyzers
//!
//! Four independent, pure analyzers over learner text. Each one degrades to
//! an explicit zero/neutral result on empty input instead of failing, so the
//! feedback pipeline always completes for minimal sessions.

pub mod depth;
pub mod pace;
pub mod tenses;
pub mod vocabulary;

pub use depth::{DepthAnalysis, FactorScore, analyze_depth};
pub use pace::{FluencyRating, PaceAnalysis, analyze_pace};
pub use tenses::{Tense, TenseAnalysis, TenseUsage, analyze_tenses};
pub use vocabulary::{BucketShare, CefrLevel, VocabularyAnalysis, WordBucket, analyze_vocabulary};

/// Placeholder used wherever a "most/least/dominant" label has nothing to name.
pub const NONE_LABEL: &str = "none";

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Lowercases `text`, drops every character `keep` rejects (whitespace is
/// always kept) and splits the remainder on whitespace.
pub(crate) fn tokenize(text: &str, keep: impl Fn(char) -> bool) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_whitespace() || keep(*c))
        .collect();
    cleaned.split_whitespace().map(str::to_owned).collect()
}
