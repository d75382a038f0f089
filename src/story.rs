use crate::error::{StudioError, StudioResult};
use crate::media::MediaPayload;
use serde::{Deserialize, Serialize};

/// Upper bound on scenes a script may carry.
pub const MAX_SCENES: usize = 8;

/// One scene of the story script, as produced by the script generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryScene {
    pub scene_number: u32,
    pub description: String,
    pub camera_shot: String,
    /// Worded so it can be reused verbatim in every scene prompt.
    #[serde(rename = "apparels", alias = "apparel_descriptor")]
    pub apparel_descriptor: String,
    pub conversation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rhyming_stanza: Option<String>,
}

/// Ordered, validated scene list. Scene numbers run 1..=N with no gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<StoryScene>", into = "Vec<StoryScene>")]
pub struct StoryScript(Vec<StoryScene>);

impl StoryScript {
    pub fn new(scenes: Vec<StoryScene>) -> StudioResult<Self> {
        if scenes.is_empty() {
            return Err(StudioError::ScriptGeneration(
                "script contains no scenes".into(),
            ));
        }
        if scenes.len() > MAX_SCENES {
            return Err(StudioError::ScriptGeneration(format!(
                "script has {} scenes (max {MAX_SCENES})",
                scenes.len()
            )));
        }
        for (i, scene) in scenes.iter().enumerate() {
            let expected = i as u32 + 1;
            if scene.scene_number != expected {
                return Err(StudioError::ScriptGeneration(format!(
                    "scene at position {} is numbered {} (expected {expected})",
                    i + 1,
                    scene.scene_number
                )));
            }
            for (field, value) in [
                ("description", &scene.description),
                ("camera_shot", &scene.camera_shot),
                ("apparels", &scene.apparel_descriptor),
            ] {
                if value.trim().is_empty() {
                    return Err(StudioError::ScriptGeneration(format!(
                        "scene {expected} has an empty {field}"
                    )));
                }
            }
        }
        Ok(Self(scenes))
    }

    pub fn scenes(&self) -> &[StoryScene] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Full narration: every scene's conversation, in scene order.
    pub fn narration_text(&self) -> String {
        self.0
            .iter()
            .map(|s| s.conversation.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl TryFrom<Vec<StoryScene>> for StoryScript {
    type Error = StudioError;

    fn try_from(scenes: Vec<StoryScene>) -> Result<Self, Self::Error> {
        Self::new(scenes)
    }
}

impl From<StoryScript> for Vec<StoryScene> {
    fn from(script: StoryScript) -> Self {
        script.0
    }
}

/// Output of script generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoryDraft {
    pub title: String,
    pub script: StoryScript,
    pub video_prompt: String,
}

/// A rendered scene: the chain stage's output for one `StoryScene`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedScene {
    pub scene_number: u32,
    pub image: MediaPayload,
    pub description: String,
    pub conversation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rhyming_stanza: Option<String>,
}

impl GeneratedScene {
    pub fn new(scene: &StoryScene, image: MediaPayload) -> Self {
        Self {
            scene_number: scene.scene_number,
            image,
            description: scene.description.clone(),
            conversation: scene.conversation.clone(),
            rhyming_stanza: scene.rhyming_stanza.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(n: u32) -> StoryScene {
        StoryScene {
            scene_number: n,
            description: format!("Scene {n} happens"),
            camera_shot: "Wide shot".into(),
            apparel_descriptor: "red raincoat and yellow boots".into(),
            conversation: format!("Line {n}."),
            rhyming_stanza: None,
        }
    }

    #[test]
    fn test_script_accepts_contiguous_scenes() {
        let script = StoryScript::new(vec![scene(1), scene(2), scene(3)]).unwrap();
        assert_eq!(script.len(), 3);
        assert_eq!(script.narration_text(), "Line 1. Line 2. Line 3.");
    }

    #[test]
    fn test_script_rejects_gaps_and_reordering() {
        assert!(StoryScript::new(vec![scene(1), scene(3)]).is_err());
        assert!(StoryScript::new(vec![scene(2), scene(1)]).is_err());
        assert!(StoryScript::new(vec![scene(0)]).is_err());
        assert!(StoryScript::new(vec![]).is_err());
    }

    #[test]
    fn test_script_rejects_blank_apparel() {
        let mut s = scene(1);
        s.apparel_descriptor = "  ".into();
        let err = StoryScript::new(vec![s]).unwrap_err();
        assert!(err.to_string().contains("apparels"));
    }

    #[test]
    fn test_scene_wire_name_and_alias() {
        let wire = r#"{"scene_number":1,"description":"d","camera_shot":"c","apparels":"a","conversation":"x"}"#;
        let parsed: StoryScene = serde_json::from_str(wire).unwrap();
        assert_eq!(parsed.apparel_descriptor, "a");
        assert!(parsed.rhyming_stanza.is_none());

        let alias = r#"{"scene_number":1,"description":"d","camera_shot":"c","apparel_descriptor":"b","conversation":"x"}"#;
        let parsed: StoryScene = serde_json::from_str(alias).unwrap();
        assert_eq!(parsed.apparel_descriptor, "b");
    }

    #[test]
    fn test_script_deserialize_validates() {
        let json = serde_json::to_string(&vec![scene(2)]).unwrap();
        assert!(serde_json::from_str::<StoryScript>(&json).is_err());
    }
}
