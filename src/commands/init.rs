use crate::config::CONFIG_FILE;
use crate::controller::PipelineState;
use crate::error::{StudioError, StudioResult};
use crate::session::{save_session, OUTPUT_DIR, SESSION_FILE};
use colored::*;
use serde::Serialize;
use std::path::Path;

const CONFIG_TEMPLATE: &str = r#"# Doodlemagic run configuration. Every key is optional.

[story]
# Scenes per story (1-8).
scene_count = 3
script_model = "gemini-2.5-flash"
image_model = "gemini-2.5-flash-image-preview"

[pipeline]
# Ask for a voice sample after the scenes and lipsync its narration into the video.
narration = false

[video]
# "job" (fal queue) or "operation" (Veo long-running operation).
provider = "job"
# "scenes" animates the rendered scene images, "prompt" uses the story prompt alone.
source = "scenes"
job_model = "fal-ai/kling-video/v1.6/standard/elements"
prompt_job_model = "fal-ai/kling-video/v1.6/standard/text-to-video"
operation_model = "veo-3.0-generate-preview"
aspect_ratio = "16:9"
stub_delay_secs = 5

[narration]
voice_name = "Storyteller"
voice_description = "Narrator voice cloned from a family recording"
model_id = "eleven_multilingual_v2"
stability = 0.5
similarity_boost = 0.75
stub_delay_secs = 3

[lipsync]
model = "fal-ai/sync-lipsync"

[polling]
job_interval_secs = 3
transient_backoff_secs = 10
operation_interval_secs = 10
# Give up on a single provider job after this many seconds. Unset waits indefinitely.
# max_wait_secs = 900
"#;

const ENV_TEMPLATE: &str = "# Copy to .env and fill in.\n\
# Required: story script and scene images.\n\
GEMINI_API_KEY=\n\
# Optional: video jobs and lipsync. Without it a placeholder video is used.\n\
FAL_KEY=\n\
# Optional: voice cloning and narration. Without it a placeholder track is used.\n\
ELEVEN_API_KEY=\n";

/// Structured result from run directory creation.
#[derive(Debug, Serialize)]
pub struct InitResult {
    pub run_path: String,
    pub files: Vec<String>,
}

/// Create a run directory with a default config, an env template, and a fresh session.
pub fn create_run(path: &Path) -> StudioResult<InitResult> {
    if path.join(CONFIG_FILE).exists() {
        return Err(StudioError::AlreadyInitialized(path.join(CONFIG_FILE)));
    }
    std::fs::create_dir_all(path.join(OUTPUT_DIR))?;
    std::fs::write(path.join(CONFIG_FILE), CONFIG_TEMPLATE)?;
    std::fs::write(path.join(".env.example"), ENV_TEMPLATE)?;
    save_session(path, &PipelineState::default())?;

    Ok(InitResult {
        run_path: path.display().to_string(),
        files: vec![
            CONFIG_FILE.to_string(),
            ".env.example".to_string(),
            SESSION_FILE.to_string(),
            format!("{OUTPUT_DIR}/"),
        ],
    })
}

/// CLI entry point, delegates to `create_run()`.
pub fn run(path: &Path) -> StudioResult<()> {
    let result = create_run(path)?;

    eprintln!(
        "{} Created run at {}",
        "done:".green().bold(),
        result.run_path
    );
    for file in &result.files {
        eprintln!("  {file}");
    }
    eprintln!();
    eprintln!("Next: copy {} to {} and add your keys, then run:", ".env.example".cyan(), ".env".cyan());
    eprintln!("  doodlemagic story {} --drawing <image>", path.display());

    Ok(())
}
