use crate::config::PollSettings;
use crate::error::StudioResult;
use crate::media::{materialize, MediaHandle};
use crate::progress::Progress;
use crate::stages::jobs::{bounded, output_url, poll_job, JobClient};
use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub const NARRATED_VIDEO_STEM: &str = "story-narrated";

/// Merges a narration track into the silent story video.
#[async_trait]
pub trait LipsyncMerger: Send + Sync {
    async fn merge(
        &self,
        video: &MediaHandle,
        narration: &MediaHandle,
        output_dir: &Path,
        progress: &Progress,
    ) -> StudioResult<MediaHandle>;

    fn name(&self) -> &'static str;
}

pub struct JobLipsync {
    client: Arc<dyn JobClient>,
    model: String,
    settings: PollSettings,
}

impl JobLipsync {
    pub fn new(client: Arc<dyn JobClient>, model: impl Into<String>, settings: PollSettings) -> Self {
        Self {
            client,
            model: model.into(),
            settings,
        }
    }
}

#[async_trait]
impl LipsyncMerger for JobLipsync {
    async fn merge(
        &self,
        video: &MediaHandle,
        narration: &MediaHandle,
        output_dir: &Path,
        progress: &Progress,
    ) -> StudioResult<MediaHandle> {
        let body = json!({
            "video_url": video.to_reference()?,
            "audio_url": narration.to_reference()?,
        });
        progress.report(0.0, 2.0, "Submitting lipsync job...").await;
        let handle = self.client.submit(&self.model, &body).await?;
        let result = bounded(
            &self.settings,
            "lipsync job",
            poll_job(self.client.as_ref(), &handle, &self.settings, "lipsync job"),
        )
        .await?;
        let url = output_url(&result, "video")?;

        progress.report(1.0, 2.0, "Downloading narrated video...").await;
        let bytes = self.client.fetch_asset(&url).await?;
        let merged = materialize(output_dir, NARRATED_VIDEO_STEM, &bytes, "video/mp4")?;
        info!(path = %merged.describe(), "Narrated video saved");
        Ok(merged)
    }

    fn name(&self) -> &'static str {
        "fal lipsync"
    }
}

/// Used when no lipsync provider is configured: the silent video is returned as is.
pub struct PassthroughLipsync;

#[async_trait]
impl LipsyncMerger for PassthroughLipsync {
    async fn merge(
        &self,
        video: &MediaHandle,
        narration: &MediaHandle,
        _output_dir: &Path,
        _progress: &Progress,
    ) -> StudioResult<MediaHandle> {
        warn!(
            narration = %narration.describe(),
            "No lipsync provider configured, keeping the silent video"
        );
        Ok(video.clone())
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }
}
