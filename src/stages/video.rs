use crate::config::{PollSettings, VideoSource};
use crate::error::{StudioError, StudioResult};
use crate::media::{materialize, MediaHandle};
use crate::progress::Progress;
use crate::stages::jobs::{bounded, output_url, poll_job, JobClient};
use crate::stages::operation::{extract_video_uri, wait_for_operation, OperationClient};
use crate::story::GeneratedScene;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// File stem of the silent story video under the output directory.
pub const STORY_VIDEO_STEM: &str = "story";
pub const PLACEHOLDER_VIDEO_URL: &str =
    "https://storage.googleapis.com/gtv-videos-bucket/sample/ForBiggerFun.mp4";

/// Turns a story into one video file.
#[async_trait]
pub trait VideoSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        prompt: &str,
        scenes: &[GeneratedScene],
        output_dir: &Path,
        progress: &Progress,
    ) -> StudioResult<MediaHandle>;

    fn name(&self) -> &'static str;
}

/// Queue-job provider (fal). Animates the scene images, or the prompt alone.
pub struct JobVideoSynthesizer {
    client: Arc<dyn JobClient>,
    source: VideoSource,
    scenes_model: String,
    prompt_model: String,
    settings: PollSettings,
}

impl JobVideoSynthesizer {
    pub fn new(
        client: Arc<dyn JobClient>,
        source: VideoSource,
        scenes_model: impl Into<String>,
        prompt_model: impl Into<String>,
        settings: PollSettings,
    ) -> Self {
        Self {
            client,
            source,
            scenes_model: scenes_model.into(),
            prompt_model: prompt_model.into(),
            settings,
        }
    }

    fn request(&self, prompt: &str, scenes: &[GeneratedScene]) -> StudioResult<(&str, Value)> {
        match self.source {
            VideoSource::Scenes => {
                if scenes.is_empty() {
                    return Err(StudioError::VideoGeneration("there are no scenes to animate".into()));
                }
                let images: Vec<String> = scenes.iter().map(|s| s.image.to_data_url()).collect();
                Ok((
                    self.scenes_model.as_str(),
                    json!({ "prompt": prompt, "input_image_urls": images }),
                ))
            }
            VideoSource::Prompt => Ok((self.prompt_model.as_str(), json!({ "prompt": prompt }))),
        }
    }
}

#[async_trait]
impl VideoSynthesizer for JobVideoSynthesizer {
    async fn synthesize(
        &self,
        prompt: &str,
        scenes: &[GeneratedScene],
        output_dir: &Path,
        progress: &Progress,
    ) -> StudioResult<MediaHandle> {
        let (model, body) = self.request(prompt, scenes)?;
        progress.report(0.0, 2.0, "Submitting video job...").await;
        let handle = self.client.submit(model, &body).await?;

        let result = bounded(
            &self.settings,
            "video job",
            poll_job(self.client.as_ref(), &handle, &self.settings, "video job"),
        )
        .await?;
        let url = output_url(&result, "video")?;

        progress.report(1.0, 2.0, "Downloading video...").await;
        let bytes = self.client.fetch_asset(&url).await?;
        let video = materialize(output_dir, STORY_VIDEO_STEM, &bytes, "video/mp4")?;
        info!(path = %video.describe(), "Story video saved");
        Ok(video)
    }

    fn name(&self) -> &'static str {
        "fal job"
    }
}

/// Long-running-operation provider (Veo).
pub struct OperationVideoSynthesizer {
    client: Arc<dyn OperationClient>,
    source: VideoSource,
    model: String,
    aspect_ratio: String,
    settings: PollSettings,
}

impl OperationVideoSynthesizer {
    pub fn new(
        client: Arc<dyn OperationClient>,
        source: VideoSource,
        model: impl Into<String>,
        aspect_ratio: impl Into<String>,
        settings: PollSettings,
    ) -> Self {
        Self {
            client,
            source,
            model: model.into(),
            aspect_ratio: aspect_ratio.into(),
            settings,
        }
    }

    /// The operation accepts one conditioning image, so scene mode uses the first scene.
    fn request(&self, prompt: &str, scenes: &[GeneratedScene]) -> Value {
        let mut instance = json!({ "prompt": prompt });
        if self.source == VideoSource::Scenes {
            if let Some(first) = scenes.first() {
                instance["image"] = json!({
                    "bytesBase64Encoded": first.image.data,
                    "mimeType": first.image.content_type,
                });
            }
        }
        json!({
            "instances": [instance],
            "parameters": { "aspectRatio": self.aspect_ratio },
        })
    }
}

#[async_trait]
impl VideoSynthesizer for OperationVideoSynthesizer {
    async fn synthesize(
        &self,
        prompt: &str,
        scenes: &[GeneratedScene],
        output_dir: &Path,
        progress: &Progress,
    ) -> StudioResult<MediaHandle> {
        progress.report(0.0, 2.0, "Starting video generation...").await;
        let name = self
            .client
            .start(&self.model, &self.request(prompt, scenes))
            .await?;
        info!(operation = %name, model = %self.model, "Video operation started");

        let op = bounded(
            &self.settings,
            "video operation",
            wait_for_operation(self.client.as_ref(), &name, &self.settings),
        )
        .await?;
        let uri = extract_video_uri(&op)?;

        progress.report(1.0, 2.0, "Downloading video...").await;
        let bytes = self.client.fetch_asset(&uri).await?;
        let video = materialize(output_dir, STORY_VIDEO_STEM, &bytes, "video/mp4")?;
        info!(path = %video.describe(), "Story video saved");
        Ok(video)
    }

    fn name(&self) -> &'static str {
        "veo operation"
    }
}

/// Placeholder used when no video credential is configured.
pub struct StubVideoSynthesizer {
    delay: Duration,
}

impl StubVideoSynthesizer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl VideoSynthesizer for StubVideoSynthesizer {
    async fn synthesize(
        &self,
        _prompt: &str,
        scenes: &[GeneratedScene],
        _output_dir: &Path,
        _progress: &Progress,
    ) -> StudioResult<MediaHandle> {
        warn!(
            scenes = scenes.len(),
            "No video provider configured, returning the placeholder video"
        );
        tokio::time::sleep(self.delay).await;
        Ok(MediaHandle::Url {
            url: PLACEHOLDER_VIDEO_URL.to_string(),
            content_type: "video/mp4".into(),
        })
    }

    fn name(&self) -> &'static str {
        "placeholder"
    }
}
