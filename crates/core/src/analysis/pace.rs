//! Speaking-pace estimation from turn word counts and phase timestamps.
//!
//! Only text timing is available, so "pace" here is words per minute of
//! transcribed speech, not an acoustic measure.

use super::round1;
use crate::transcript::{PhaseTimestamps, Transcript, TurnRole, minutes_between};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FluencyRating {
    Slow,
    Natural,
    Fast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaceAnalysis {
    #[serde(rename = "overallWPM")]
    pub overall_wpm: u32,
    #[serde(rename = "presentationWPM")]
    pub presentation_wpm: u32,
    #[serde(rename = "conversationWPM")]
    pub conversation_wpm: u32,
    pub pace_variability: f64,
    pub fluency_rating: FluencyRating,
    pub fluency_score: u32,
}

/// Reply intervals longer than this are pauses, not speech.
const MAX_SAMPLE_MINUTES: f64 = 10.0;

const NATURAL_MIN_WPM: u32 = 80;
const NATURAL_MAX_WPM: u32 = 150;
const IDEAL_WPM: i64 = 115;

/// Distance from the ideal pace → fluency score, checked in order.
const FLUENCY_BANDS: [(i64, u32); 4] = [(20, 10), (40, 8), (60, 6), (80, 4)];
const FLUENCY_FLOOR: u32 = 2;

/// Float-to-int `as` saturates, so absurd rates clamp to `u32::MAX`.
fn words_per_minute(words: u64, minutes: Option<f64>) -> u32 {
    match minutes {
        Some(minutes) => (words as f64 / minutes).round() as u32,
        None => 0,
    }
}

pub fn fluency_rating(wpm: u32) -> FluencyRating {
    if wpm < NATURAL_MIN_WPM {
        FluencyRating::Slow
    } else if wpm <= NATURAL_MAX_WPM {
        FluencyRating::Natural
    } else {
        FluencyRating::Fast
    }
}

pub fn fluency_score(wpm: u32) -> u32 {
    if wpm == 0 {
        return 0;
    }
    let distance = (wpm as i64 - IDEAL_WPM).abs();
    FLUENCY_BANDS
        .iter()
        .find(|(max_distance, _)| distance <= *max_distance)
        .map_or(FLUENCY_FLOOR, |(_, score)| *score)
}

/// Words-per-minute samples, one per student turn whose preceding timed turn
/// lies between zero and ten minutes before it.
fn reply_rates(transcript: &Transcript) -> Vec<f64> {
    let turns = transcript.turns();
    let mut rates = Vec::new();
    for (index, turn) in turns.iter().enumerate() {
        if turn.role != TurnRole::Student {
            continue;
        }
        let previous = turns[..index].iter().rev().find_map(|t| t.timestamp);
        let Some(minutes) = minutes_between(previous, turn.timestamp) else {
            continue;
        };
        if minutes <= MAX_SAMPLE_MINUTES {
            rates.push(turn.words() as f64 / minutes);
        }
    }
    rates
}

/// Population standard deviation; zero for fewer than two samples.
fn std_dev(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Computes pace figures for a session. `now` closes the overall window when
/// the session has no `completed_at` yet.
pub fn analyze_pace(
    transcript: &Transcript,
    timestamps: &PhaseTimestamps,
    now: DateTime<Utc>,
) -> PaceAnalysis {
    let presentation_words = transcript.presentation_words();
    let conversation_words = transcript.student_words();

    let presentation_wpm = words_per_minute(presentation_words, timestamps.presentation_minutes());
    let conversation_wpm = words_per_minute(conversation_words, timestamps.conversation_minutes());

    let start = [timestamps.present_started_at, timestamps.converse_started_at]
        .into_iter()
        .flatten()
        .min();
    let end = timestamps.completed_at.unwrap_or(now);
    let overall_wpm = words_per_minute(
        presentation_words.saturating_add(conversation_words),
        minutes_between(start, Some(end)),
    );

    let pace_variability = round1(std_dev(&reply_rates(transcript)));

    let reference_wpm = if overall_wpm > 0 {
        overall_wpm
    } else {
        conversation_wpm
    };

    PaceAnalysis {
        overall_wpm,
        presentation_wpm,
        conversation_wpm,
        pace_variability,
        fluency_rating: fluency_rating(reference_wpm),
        fluency_score: fluency_score(reference_wpm),
    }
}
