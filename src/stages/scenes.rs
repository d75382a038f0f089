use crate::error::{StudioError, StudioResult};
use crate::gemini::{ContentGenerator, GenerateContentRequest, GenerationConfig};
use crate::media::MediaPayload;
use crate::progress::Progress;
use crate::story::{GeneratedScene, StoryScene, StoryScript};
use std::sync::Arc;
use tracing::info;

/// Renders scene images as a chain: scene 1 is drawn from the subject photo, every
/// later scene from the image produced for the scene before it.
pub struct SceneChainStage {
    generator: Arc<dyn ContentGenerator>,
    model: String,
}

impl SceneChainStage {
    pub fn new(generator: Arc<dyn ContentGenerator>, model: impl Into<String>) -> Self {
        Self {
            generator,
            model: model.into(),
        }
    }

    pub async fn render_scene(
        &self,
        scene: &StoryScene,
        reference: &MediaPayload,
    ) -> StudioResult<MediaPayload> {
        let request = GenerateContentRequest::media_and_text(reference, build_scene_prompt(scene))
            .with_config(GenerationConfig {
                response_modalities: Some(vec!["IMAGE".into(), "TEXT".into()]),
                ..Default::default()
            });
        let response = self.generator.generate_content(&self.model, &request).await?;
        response
            .first_inline_image()
            .cloned()
            .map(MediaPayload::from)
            .ok_or(StudioError::NoImageProduced {
                scene_number: scene.scene_number,
            })
    }

    /// Render every scene in order. Each completed scene is handed to `on_scene`
    /// before the next request starts, so callers can surface partial results.
    /// On failure the scenes already delivered stay delivered.
    pub async fn render_chain(
        &self,
        script: &StoryScript,
        subject_photo: &MediaPayload,
        progress: &Progress,
        mut on_scene: impl FnMut(GeneratedScene) + Send,
    ) -> StudioResult<Vec<GeneratedScene>> {
        let total = script.len() as f64;
        let mut rendered = Vec::with_capacity(script.len());
        let mut reference = subject_photo.clone();

        for scene in script.scenes() {
            progress
                .report(
                    f64::from(scene.scene_number - 1),
                    total,
                    &format!("Creating character for scene {}...", scene.scene_number),
                )
                .await;

            let image = self.render_scene(scene, &reference).await?;
            info!(
                scene = scene.scene_number,
                bytes = image.approx_len(),
                "Scene rendered"
            );

            let generated = GeneratedScene::new(scene, image.clone());
            on_scene(generated.clone());
            rendered.push(generated);
            reference = image;
        }
        Ok(rendered)
    }
}

/// Image prompt for one scene. The reference image carries the character's
/// appearance; the apparel text is repeated verbatim so clothing stays stable.
pub fn build_scene_prompt(scene: &StoryScene) -> String {
    format!(
        "Using the person in the provided image as the main character, create a vibrant, \
         whimsical, storybook-style illustration for this scene.\n\
         Scene: {description}\n\
         The character is wearing: {apparels}\n\
         Camera: {camera}\n\
         Keep the character's facial features, hair, skin tone and clothing exactly as in the \
         reference image. Do not add any text to the image.",
        description = scene.description.trim(),
        apparels = scene.apparel_descriptor.trim(),
        camera = scene.camera_shot.trim(),
    )
}
