use crate::config::NarrationConfig;
use crate::error::{StudioError, StudioResult};
use crate::http::{ensure_success, network_error, read_json};
use crate::media::{extension_for, materialize, MediaHandle, MediaPayload};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

const ELEVENLABS_API_BASE: &str = "https://api.elevenlabs.io";
const SERVICE: &str = "ElevenLabs";
/// File stem of the narration track under the output directory.
pub const NARRATION_STEM: &str = "narration";
pub const PLACEHOLDER_NARRATION_URL: &str =
    "https://actions.google.com/sounds/v1/alarms/digital_watch_alarm_long.ogg";

/// Clones a voice from a recorded sample and reads the story text with it.
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(
        &self,
        sample: &MediaPayload,
        text: &str,
        output_dir: &Path,
    ) -> StudioResult<MediaHandle>;

    fn name(&self) -> &'static str;
}

pub struct ElevenLabsNarrator {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    settings: NarrationConfig,
}

#[derive(Deserialize)]
struct AddVoiceResponse {
    #[serde(default)]
    voice_id: Option<String>,
}

impl AddVoiceResponse {
    fn into_voice_id(self) -> StudioResult<String> {
        self.voice_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StudioError::VoiceClone("service returned no voice_id".into()))
    }
}

impl ElevenLabsNarrator {
    pub fn new(api_key: impl Into<String>, settings: NarrationConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: ELEVENLABS_API_BASE.to_string(),
            settings,
        }
    }

    async fn clone_voice(&self, sample: &MediaPayload) -> StudioResult<String> {
        let bytes = sample.decode()?;
        let file_name = format!("sample.{}", extension_for(&sample.content_type));
        let file = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(&sample.content_type)
            .map_err(|e| StudioError::VoiceClone(format!("bad sample content type: {e}")))?;
        let form = Form::new()
            .text("name", self.settings.voice_name.clone())
            .text("description", self.settings.voice_description.clone())
            .part("files", file);

        let response = self
            .http
            .post(format!("{}/v1/voices/add", self.base_url))
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| network_error(SERVICE, e))?;
        let added: AddVoiceResponse = read_json(SERVICE, response)
            .await
            .map_err(|e| StudioError::VoiceClone(e.to_string()))?;
        added.into_voice_id()
    }

    async fn speak(&self, voice_id: &str, text: &str) -> StudioResult<Vec<u8>> {
        let body = json!({
            "text": text,
            "model_id": self.settings.model_id,
            "voice_settings": {
                "stability": self.settings.stability,
                "similarity_boost": self.settings.similarity_boost,
            }
        });
        let response = self
            .http
            .post(format!("{}/v1/text-to-speech/{voice_id}", self.base_url))
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(SERVICE, e))?;
        let response = ensure_success(SERVICE, response)
            .await
            .map_err(|e| StudioError::NarrationSynthesis(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| network_error(SERVICE, e))?;
        if bytes.is_empty() {
            return Err(StudioError::NarrationSynthesis("service returned no audio".into()));
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Narrator for ElevenLabsNarrator {
    async fn narrate(
        &self,
        sample: &MediaPayload,
        text: &str,
        output_dir: &Path,
    ) -> StudioResult<MediaHandle> {
        if text.trim().is_empty() {
            return Err(StudioError::NarrationSynthesis("story has no narration text".into()));
        }
        info!(sample_bytes = sample.approx_len(), "Cloning voice");
        let voice_id = self.clone_voice(sample).await?;
        info!(voice_id = %voice_id, chars = text.len(), "Synthesizing narration");
        let audio = self.speak(&voice_id, text).await?;
        materialize(output_dir, NARRATION_STEM, &audio, "audio/mpeg")
    }

    fn name(&self) -> &'static str {
        "elevenlabs"
    }
}

/// Placeholder used when no voice credential is configured.
pub struct StubNarrator {
    delay: Duration,
}

impl StubNarrator {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Narrator for StubNarrator {
    async fn narrate(
        &self,
        sample: &MediaPayload,
        text: &str,
        _output_dir: &Path,
    ) -> StudioResult<MediaHandle> {
        warn!(
            sample_bytes = sample.approx_len(),
            chars = text.len(),
            "No voice provider configured, returning the placeholder narration"
        );
        tokio::time::sleep(self.delay).await;
        Ok(MediaHandle::Url {
            url: PLACEHOLDER_NARRATION_URL.to_string(),
            content_type: "audio/ogg".into(),
        })
    }

    fn name(&self) -> &'static str {
        "placeholder"
    }
}
