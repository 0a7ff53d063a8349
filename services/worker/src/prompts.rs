use anyhow::{Context, Result};
use oralexam_core::grader::default_prompts;
use std::{collections::HashMap, fs, path::Path};
use tracing::{debug, info};

/// Built-in prompt templates, overridden by any `*.md` file in `prompts_path`.
///
/// Each file's stem is its key, so `grade_rubric.md` replaces the grading
/// template.
pub fn load_prompts(prompts_path: Option<&Path>) -> Result<HashMap<String, String>> {
    let mut prompts = default_prompts();
    let Some(dir) = prompts_path else {
        return Ok(prompts);
    };

    let entries = fs::read_dir(dir)
        .with_context(|| format!("Could not read prompts directory {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Could not read prompt {}", path.display()))?;
            debug!(prompt = %prompt_key, "Loaded prompt override");
            prompts.insert(prompt_key, content);
        }
    }
    info!(dir = %dir.display(), count = prompts.len(), "Prompt templates loaded");
    Ok(prompts)
}
