use crate::error::{StudioError, StudioResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE: &str = "doodlemagic.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StudioConfig {
    #[serde(default)]
    pub story: StoryConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub narration: NarrationConfig,
    #[serde(default)]
    pub lipsync: LipsyncConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoryConfig {
    #[serde(default = "default_scene_count")]
    pub scene_count: usize,
    #[serde(default = "default_script_model")]
    pub script_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Insert the voice step: clone a voice sample, narrate, and lipsync the video.
    #[serde(default)]
    pub narration: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoProvider {
    /// REST job submission with a status URL to poll.
    #[default]
    Job,
    /// Long-running operation polled via its `done` flag.
    Operation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoSource {
    /// Animate the rendered scene images.
    #[default]
    Scenes,
    /// Generate from the narrative prompt alone.
    Prompt,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VideoConfig {
    #[serde(default)]
    pub provider: VideoProvider,
    #[serde(default)]
    pub source: VideoSource,
    #[serde(default = "default_job_model")]
    pub job_model: String,
    #[serde(default = "default_prompt_job_model")]
    pub prompt_job_model: String,
    #[serde(default = "default_operation_model")]
    pub operation_model: String,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    /// Delay of the placeholder synthesizer used when no video credential is set.
    #[serde(default = "default_video_stub_delay")]
    pub stub_delay_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NarrationConfig {
    #[serde(default = "default_voice_name")]
    pub voice_name: String,
    #[serde(default = "default_voice_description")]
    pub voice_description: String,
    #[serde(default = "default_tts_model")]
    pub model_id: String,
    #[serde(default = "default_stability")]
    pub stability: f32,
    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f32,
    #[serde(default = "default_stub_delay")]
    pub stub_delay_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LipsyncConfig {
    #[serde(default = "default_lipsync_model")]
    pub model: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
    #[serde(default = "default_job_interval")]
    pub job_interval_secs: u64,
    #[serde(default = "default_transient_backoff")]
    pub transient_backoff_secs: u64,
    #[serde(default = "default_operation_interval")]
    pub operation_interval_secs: u64,
    /// Overall bound on a single provider job. Unset waits indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wait_secs: Option<u64>,
}

// Defaults
fn default_scene_count() -> usize {
    3
}
fn default_script_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_image_model() -> String {
    "gemini-2.5-flash-image-preview".into()
}
fn default_job_model() -> String {
    "fal-ai/kling-video/v1.6/standard/elements".into()
}
fn default_prompt_job_model() -> String {
    "fal-ai/kling-video/v1.6/standard/text-to-video".into()
}
fn default_operation_model() -> String {
    "veo-3.0-generate-preview".into()
}
fn default_aspect_ratio() -> String {
    "16:9".into()
}
fn default_voice_name() -> String {
    "Storyteller".into()
}
fn default_voice_description() -> String {
    "Narrator voice cloned from a family recording".into()
}
fn default_tts_model() -> String {
    "eleven_multilingual_v2".into()
}
fn default_stability() -> f32 {
    0.5
}
fn default_similarity_boost() -> f32 {
    0.75
}
fn default_stub_delay() -> u64 {
    3
}
fn default_video_stub_delay() -> u64 {
    5
}
fn default_lipsync_model() -> String {
    "fal-ai/sync-lipsync".into()
}
fn default_job_interval() -> u64 {
    3
}
fn default_transient_backoff() -> u64 {
    10
}
fn default_operation_interval() -> u64 {
    10
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            scene_count: default_scene_count(),
            script_model: default_script_model(),
            image_model: default_image_model(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            provider: VideoProvider::default(),
            source: VideoSource::default(),
            job_model: default_job_model(),
            prompt_job_model: default_prompt_job_model(),
            operation_model: default_operation_model(),
            aspect_ratio: default_aspect_ratio(),
            stub_delay_secs: default_video_stub_delay(),
        }
    }
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            voice_name: default_voice_name(),
            voice_description: default_voice_description(),
            model_id: default_tts_model(),
            stability: default_stability(),
            similarity_boost: default_similarity_boost(),
            stub_delay_secs: default_stub_delay(),
        }
    }
}

impl Default for LipsyncConfig {
    fn default() -> Self {
        Self {
            model: default_lipsync_model(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            job_interval_secs: default_job_interval(),
            transient_backoff_secs: default_transient_backoff(),
            operation_interval_secs: default_operation_interval(),
            max_wait_secs: None,
        }
    }
}

/// Timing for a poll loop, resolved from `[polling]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub transient_backoff: Duration,
    pub max_wait: Option<Duration>,
}

impl PollingConfig {
    pub fn job_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.job_interval_secs),
            transient_backoff: Duration::from_secs(self.transient_backoff_secs),
            max_wait: self.max_wait_secs.map(Duration::from_secs),
        }
    }

    pub fn operation_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.operation_interval_secs),
            transient_backoff: Duration::from_secs(self.transient_backoff_secs),
            max_wait: self.max_wait_secs.map(Duration::from_secs),
        }
    }
}

impl StudioConfig {
    pub fn validate(&self) -> StudioResult<()> {
        if !(1..=crate::story::MAX_SCENES).contains(&self.story.scene_count) {
            return Err(StudioError::ConfigInvalid(format!(
                "story.scene_count must be between 1 and {}, got {}",
                crate::story::MAX_SCENES,
                self.story.scene_count
            )));
        }
        if self.polling.job_interval_secs == 0 || self.polling.operation_interval_secs == 0 {
            return Err(StudioError::ConfigInvalid(
                "polling intervals must be at least 1 second".into(),
            ));
        }
        for (name, value) in [
            ("narration.stability", self.narration.stability),
            ("narration.similarity_boost", self.narration.similarity_boost),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(StudioError::ConfigInvalid(format!(
                    "{name} must be between 0.0 and 1.0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// API keys, read from the environment (after `.env` has been loaded).
#[derive(Clone, Default)]
pub struct Credentials {
    pub gemini: Option<String>,
    pub fal: Option<String>,
    pub eleven: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("gemini", &self.gemini.is_some())
            .field("fal", &self.fal.is_some())
            .field("eleven", &self.eleven.is_some())
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            gemini: non_empty_env("GEMINI_API_KEY"),
            fal: non_empty_env("FAL_KEY"),
            eleven: non_empty_env("ELEVEN_API_KEY"),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Save a `StudioConfig` to `dir/doodlemagic.toml`.
pub fn save_config(dir: &Path, config: &StudioConfig) -> StudioResult<()> {
    let toml_str =
        toml::to_string_pretty(config).map_err(|e| StudioError::ConfigParse(e.to_string()))?;
    std::fs::write(dir.join(CONFIG_FILE), toml_str)?;
    Ok(())
}

/// Load `dir/doodlemagic.toml`, falling back to defaults when the file is absent.
pub fn load_config(dir: &Path) -> StudioResult<StudioConfig> {
    let config_path = dir.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(StudioConfig::default());
    }
    let content = std::fs::read_to_string(&config_path)?;
    toml::from_str(&content).map_err(|e| StudioError::ConfigParse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[story]
scene_count = 4
script_model = "gemini-2.5-pro"

[pipeline]
narration = true

[video]
provider = "operation"
source = "prompt"
aspect_ratio = "9:16"

[narration]
voice_name = "Grandma"
stability = 0.4

[polling]
job_interval_secs = 5
max_wait_secs = 900
"#;
        let config: StudioConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.story.scene_count, 4);
        assert_eq!(config.story.script_model, "gemini-2.5-pro");
        assert_eq!(config.story.image_model, "gemini-2.5-flash-image-preview");
        assert!(config.pipeline.narration);
        assert_eq!(config.video.provider, VideoProvider::Operation);
        assert_eq!(config.video.source, VideoSource::Prompt);
        assert_eq!(config.narration.voice_name, "Grandma");
        assert!((config.narration.similarity_boost - 0.75).abs() < f32::EPSILON);
        assert_eq!(config.polling.job_interval_secs, 5);
        assert_eq!(config.polling.max_wait_secs, Some(900));
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config: StudioConfig = toml::from_str("").unwrap();
        assert_eq!(config.story.scene_count, 3);
        assert!(!config.pipeline.narration);
        assert_eq!(config.video.provider, VideoProvider::Job);
        assert_eq!(config.video.source, VideoSource::Scenes);
        assert_eq!(config.lipsync.model, "fal-ai/sync-lipsync");
        assert_eq!(config.polling.job_interval_secs, 3);
        assert_eq!(config.polling.operation_interval_secs, 10);
        assert!(config.polling.max_wait_secs.is_none());
    }

    #[test]
    fn test_unknown_provider_is_parse_error() {
        let toml = r#"
[video]
provider = "carrier-pigeon"
"#;
        assert!(toml::from_str::<StudioConfig>(toml).is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = StudioConfig::default();
        config.story.scene_count = 0;
        assert!(config.validate().is_err());

        let mut config = StudioConfig::default();
        config.narration.stability = 1.5;
        assert!(config.validate().is_err());

        let mut config = StudioConfig::default();
        config.polling.job_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_roundtrip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config(dir.path()).unwrap();
        assert_eq!(loaded.story.scene_count, 3);

        let mut config = StudioConfig::default();
        config.pipeline.narration = true;
        config.video.provider = VideoProvider::Operation;
        save_config(dir.path(), &config).unwrap();

        let loaded = load_config(dir.path()).unwrap();
        assert!(loaded.pipeline.narration);
        assert_eq!(loaded.video.provider, VideoProvider::Operation);
    }

    #[test]
    fn test_poll_settings_resolution() {
        let polling = PollingConfig {
            max_wait_secs: Some(60),
            ..Default::default()
        };
        let job = polling.job_settings();
        assert_eq!(job.interval, Duration::from_secs(3));
        assert_eq!(job.transient_backoff, Duration::from_secs(10));
        assert_eq!(job.max_wait, Some(Duration::from_secs(60)));
        assert_eq!(
            polling.operation_settings().interval,
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_credentials_debug_hides_values() {
        let creds = Credentials {
            gemini: Some("secret-key".into()),
            fal: None,
            eleven: None,
        };
        let debug = format!("{creds:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("gemini: true"));
    }
}
