use crate::config::{Credentials, StudioConfig, VideoProvider};
use crate::controller::PipelineVariant;
use crate::error::{StudioError, StudioResult};
use crate::gemini::GeminiClient;
use crate::stages::jobs::FalQueueClient;
use crate::stages::lipsync::{JobLipsync, LipsyncMerger, PassthroughLipsync};
use crate::stages::narration::{ElevenLabsNarrator, Narrator, StubNarrator};
use crate::stages::scenes::SceneChainStage;
use crate::stages::script::ScriptStage;
use crate::stages::video::{
    JobVideoSynthesizer, OperationVideoSynthesizer, StubVideoSynthesizer, VideoSynthesizer,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// One implementation per pipeline capability, chosen once when the run is opened.
pub struct Services {
    pub script: ScriptStage,
    pub scenes: SceneChainStage,
    pub video: Box<dyn VideoSynthesizer>,
    pub narrator: Box<dyn Narrator>,
    pub lipsync: Box<dyn LipsyncMerger>,
}

impl Services {
    pub fn from_config(config: &StudioConfig, credentials: &Credentials) -> StudioResult<Self> {
        let gemini_key = credentials
            .gemini
            .as_deref()
            .ok_or(StudioError::MissingCredential("GEMINI_API_KEY"))?;
        let gemini = Arc::new(GeminiClient::new(gemini_key));
        let fal = credentials
            .fal
            .as_deref()
            .map(|key| Arc::new(FalQueueClient::new(key)));
        let job_settings = config.polling.job_settings();

        let video: Box<dyn VideoSynthesizer> = match (config.video.provider, &fal) {
            (VideoProvider::Operation, _) => Box::new(OperationVideoSynthesizer::new(
                gemini.clone(),
                config.video.source,
                &config.video.operation_model,
                &config.video.aspect_ratio,
                config.polling.operation_settings(),
            )),
            (VideoProvider::Job, Some(fal)) => Box::new(JobVideoSynthesizer::new(
                fal.clone(),
                config.video.source,
                &config.video.job_model,
                &config.video.prompt_job_model,
                job_settings,
            )),
            (VideoProvider::Job, None) => {
                warn!("FAL_KEY is not set, video synthesis will return a placeholder video");
                Box::new(StubVideoSynthesizer::new(Duration::from_secs(
                    config.video.stub_delay_secs,
                )))
            }
        };

        let lipsync: Box<dyn LipsyncMerger> = match &fal {
            Some(fal) => Box::new(JobLipsync::new(fal.clone(), &config.lipsync.model, job_settings)),
            None => {
                warn!(
                    narration = config.pipeline.narration,
                    "FAL_KEY is not set, narration will not be lipsynced into the video"
                );
                Box::new(PassthroughLipsync)
            }
        };

        let narrator: Box<dyn Narrator> = match credentials.eleven.as_deref() {
            Some(key) => Box::new(ElevenLabsNarrator::new(key, config.narration.clone())),
            None => {
                warn!(
                    narration = config.pipeline.narration,
                    "ELEVEN_API_KEY is not set, narration will use a placeholder track"
                );
                Box::new(StubNarrator::new(Duration::from_secs(
                    config.narration.stub_delay_secs,
                )))
            }
        };

        info!(
            video = video.name(),
            narrator = narrator.name(),
            lipsync = lipsync.name(),
            "Services ready"
        );
        Ok(Self {
            script: ScriptStage::new(
                gemini.clone(),
                &config.story.script_model,
                config.story.scene_count,
            ),
            scenes: SceneChainStage::new(gemini, &config.story.image_model),
            video,
            narrator,
            lipsync,
        })
    }
}

impl StudioConfig {
    pub fn variant(&self) -> PipelineVariant {
        if self.pipeline.narration {
            PipelineVariant::Narrated
        } else {
            PipelineVariant::Silent
        }
    }
}
