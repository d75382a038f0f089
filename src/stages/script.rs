use crate::error::{StudioError, StudioResult};
use crate::gemini::{ContentGenerator, GenerateContentRequest, GenerationConfig};
use crate::media::MediaPayload;
use crate::story::{StoryDraft, StoryScene, StoryScript};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Sends the drawing to the multimodal service and turns its reply into a validated
/// `StoryDraft`. One request, no retries.
pub struct ScriptStage {
    generator: Arc<dyn ContentGenerator>,
    model: String,
    scene_count: usize,
}

impl ScriptStage {
    pub fn new(generator: Arc<dyn ContentGenerator>, model: impl Into<String>, scene_count: usize) -> Self {
        Self {
            generator,
            model: model.into(),
            scene_count,
        }
    }

    pub async fn generate(&self, drawing: &MediaPayload) -> StudioResult<StoryDraft> {
        let request = GenerateContentRequest::media_and_text(drawing, story_instruction(self.scene_count))
            .with_config(GenerationConfig {
                response_mime_type: Some("application/json".into()),
                response_schema: Some(story_schema()),
                ..Default::default()
            });

        info!(
            model = %self.model,
            drawing_bytes = drawing.approx_len(),
            "Requesting story script"
        );
        let response = self.generator.generate_content(&self.model, &request).await?;

        let text = response.text().ok_or_else(|| {
            let reason = response
                .block_reason()
                .unwrap_or_else(|| "empty response".into());
            StudioError::ScriptGeneration(format!("service returned no text ({reason})"))
        })?;

        let draft = parse_script_response(&text)?;
        if draft.script.len() != self.scene_count {
            warn!(
                requested = self.scene_count,
                received = draft.script.len(),
                "Story has a different scene count than requested"
            );
        }
        info!(title = %draft.title, scenes = draft.script.len(), "Story script ready");
        Ok(draft)
    }
}

pub fn story_instruction(scene_count: usize) -> String {
    format!(
        "Analyze this child's drawing and write a short, magical, adventurous story for a young child, \
         based on the main elements in the drawing, to be told as a 30-second animated video.\n\
         Return:\n\
         - title: a short story title.\n\
         - video_prompt: one cinematic, narration-oriented prompt for a video model describing the whole story. \
         Keep it safe for content filters and never state or imply the character's age.\n\
         - scenes: exactly {scene_count} scenes with continuity from one scene to the next, numbered from 1. Each scene has \
         a one-sentence description of the action and setting, a simple camera_shot instruction (e.g. 'Wide shot', \
         'Close-up on character'), apparels describing the main character's clothing in words that can be repeated \
         verbatim in every scene, a conversation line the narrator reads aloud, and a two-line rhyming_stanza."
    )
}

/// Structured-output schema declared to the service.
pub fn story_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": { "type": "STRING", "description": "Short story title." },
            "video_prompt": {
                "type": "STRING",
                "description": "Cinematic narration-oriented prompt for the whole video."
            },
            "scenes": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "scene_number": { "type": "INTEGER", "description": "The sequence number of the scene." },
                        "description": { "type": "STRING", "description": "One sentence describing the action and setting." },
                        "camera_shot": { "type": "STRING", "description": "A simple camera instruction." },
                        "apparels": { "type": "STRING", "description": "Clothing of the main character, identical in every scene." },
                        "conversation": { "type": "STRING", "description": "Narration line for this scene." },
                        "rhyming_stanza": { "type": "STRING", "description": "A short rhyming couplet for this scene." }
                    },
                    "required": ["scene_number", "description", "camera_shot", "apparels", "conversation", "rhyming_stanza"]
                }
            }
        },
        "required": ["title", "video_prompt", "scenes"]
    })
}

#[derive(Deserialize)]
struct ScriptEnvelope {
    title: String,
    video_prompt: String,
    scenes: Vec<StoryScene>,
}

/// Scene of the older bare-array reply, whose schema never asked for a narration line.
#[derive(Deserialize)]
struct LegacyScene {
    scene_number: u32,
    description: String,
    camera_shot: String,
    #[serde(rename = "apparels", alias = "apparel_descriptor")]
    apparel_descriptor: String,
    #[serde(default)]
    conversation: String,
    #[serde(default)]
    rhyming_stanza: Option<String>,
}

impl From<LegacyScene> for StoryScene {
    fn from(scene: LegacyScene) -> Self {
        StoryScene {
            scene_number: scene.scene_number,
            description: scene.description,
            camera_shot: scene.camera_shot,
            apparel_descriptor: scene.apparel_descriptor,
            conversation: scene.conversation,
            rhyming_stanza: scene.rhyming_stanza,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptPayload {
    Envelope(ScriptEnvelope),
    /// Older reply shape: the scene array alone.
    Scenes(Vec<LegacyScene>),
}

/// Parse untrusted service output into a `StoryDraft`. Accepts raw JSON or JSON
/// wrapped in a markdown code fence; anything else fails closed.
pub fn parse_script_response(text: &str) -> StudioResult<StoryDraft> {
    let json = extract_json(text).ok_or_else(|| {
        StudioError::ScriptGeneration("response contains no JSON payload".into())
    })?;
    let payload: ScriptPayload = serde_json::from_str(json)
        .map_err(|e| StudioError::ScriptGeneration(format!("response does not match the story schema: {e}")))?;

    let (title, video_prompt, scenes) = match payload {
        ScriptPayload::Envelope(env) => (env.title, env.video_prompt, env.scenes),
        ScriptPayload::Scenes(scenes) => {
            let scenes: Vec<StoryScene> = scenes.into_iter().map(StoryScene::from).collect();
            let title = scenes
                .first()
                .map(|s| headline(&s.description))
                .unwrap_or_default();
            let prompt = scenes
                .iter()
                .map(|s| s.description.trim())
                .collect::<Vec<_>>()
                .join(" ");
            (title, prompt, scenes)
        }
    };

    let title = title.trim().to_string();
    let video_prompt = video_prompt.trim().to_string();
    if title.is_empty() {
        return Err(StudioError::ScriptGeneration("story has no title".into()));
    }
    if video_prompt.is_empty() {
        return Err(StudioError::ScriptGeneration("story has no video prompt".into()));
    }

    Ok(StoryDraft {
        title,
        script: StoryScript::new(scenes)?,
        video_prompt,
    })
}

fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    let start = unfenced.find(['{', '['])?;
    let close = if unfenced[start..].starts_with('{') { '}' } else { ']' };
    let end = unfenced.rfind(close)?;
    (end > start).then(|| &unfenced[start..=end])
}

fn headline(description: &str) -> String {
    let words: Vec<&str> = description.split_whitespace().take(6).collect();
    words.join(" ").trim_end_matches(['.', ',', '!']).to_string()
}
