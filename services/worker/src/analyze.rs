use anyhow::{Context, Result};
use oralexam_core::feedback::{FeedbackInput, FeedbackOrchestrator, FeedbackRecord};
use std::{fs, path::Path, time::Duration};
use tracing::info;

use crate::jobs::run_with_timeout;

/// Reads a `{transcript, timestamps, image}` bundle from a JSON file.
pub fn read_bundle(path: &Path) -> Result<FeedbackInput> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Could not read input file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Input file {} is not a valid session bundle", path.display()))
}

/// Runs the pipeline once over a bundle file, outside any session store.
pub async fn analyze_file(
    orchestrator: FeedbackOrchestrator,
    path: &Path,
    timeout: Duration,
) -> Result<FeedbackRecord> {
    let input = read_bundle(path)?;
    info!(
        input = %path.display(),
        turns = input.transcript.turns().len(),
        "Analyzing session bundle"
    );
    Ok(run_with_timeout(orchestrator, input, timeout).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FixedGrader;
    use oralexam_core::transcript::TurnRole;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    const BUNDLE: &str = r#"{
        "transcript": [
            {"role": "presentation", "content": "Hablo de una playa. Fui allí en verano.",
             "timestamp": "2025-06-01T10:00:00Z", "wordCount": 8},
            {"role": "examiner", "content": "¿Te gustó?", "timestamp": "2025-06-01T10:03:00Z"},
            {"role": "student", "content": "Sí, porque el agua estaba muy limpia.",
             "timestamp": "2025-06-01T10:04:00Z"}
        ],
        "timestamps": {
            "presentStartedAt": "2025-06-01T10:00:00Z",
            "converseStartedAt": "2025-06-01T10:02:00Z",
            "completedAt": "2025-06-01T10:06:00Z"
        },
        "image": {"culturalContext": "Costa", "theme": "Turismo", "talkingPoints": ["playas"]}
    }"#;

    #[test]
    fn test_read_bundle() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), BUNDLE).unwrap();

        let input = read_bundle(file.path()).unwrap();
        assert_eq!(input.transcript.turns().len(), 3);
        assert_eq!(input.transcript.turns()[0].role, TurnRole::Presentation);
        assert_eq!(input.transcript.presentation_words(), 8);
        assert_eq!(input.image.theme, "Turismo");
        assert!(input.timestamps.prep_started_at.is_none());
    }

    #[test]
    fn test_read_bundle_rejects_garbage() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "[1, 2, 3]").unwrap();
        let err = read_bundle(file.path()).unwrap_err();
        assert!(err.to_string().contains("not a valid session bundle"));
    }

    #[tokio::test]
    async fn test_analyze_file_produces_report() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), BUNDLE).unwrap();

        let record = analyze_file(
            FeedbackOrchestrator::new(Arc::new(FixedGrader)),
            file.path(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        match record {
            FeedbackRecord::Report(report) => {
                assert_eq!(report.rubric.total_mark, 20.0);
                // 8 presentation words over two minutes.
                assert_eq!(report.quantitative.pace.presentation_wpm, 4);
            }
            other => panic!("Expected a report, got {other:?}"),
        }
    }
}
