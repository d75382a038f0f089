use crate::config::{self, Credentials, StudioConfig};
use crate::controller::{PipelineController, PipelineState};
use crate::error::{StudioError, StudioResult};
use crate::media::extension_for;
use crate::services::Services;
use crate::story::GeneratedScene;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const SESSION_FILE: &str = "session.json";
pub const OUTPUT_DIR: &str = "output";

/// Load the persisted run state. A missing file is a fresh run.
pub fn load_session(dir: &Path) -> StudioResult<PipelineState> {
    let path = dir.join(SESSION_FILE);
    if !path.exists() {
        return Ok(PipelineState::default());
    }
    let content = std::fs::read_to_string(&path)?;
    serde_json::from_str(&content).map_err(|e| StudioError::SessionParse {
        path,
        message: e.to_string(),
    })
}

pub fn save_session(dir: &Path, state: &PipelineState) -> StudioResult<()> {
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| StudioError::Other(format!("failed to serialize session: {e}")))?;
    // Write beside the target and rename so an interrupted write keeps the old session.
    let tmp = dir.join(format!("{SESSION_FILE}.tmp"));
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, dir.join(SESSION_FILE))?;
    debug!(step = %state.step, "Session saved");
    Ok(())
}

/// Write each scene image as `scene-NN.<ext>` and return the paths.
pub fn write_scene_images(dir: &Path, scenes: &[GeneratedScene]) -> StudioResult<Vec<PathBuf>> {
    scenes
        .iter()
        .map(|scene| -> StudioResult<PathBuf> {
            let ext = extension_for(&scene.image.content_type);
            let path = dir.join(format!("scene-{:02}.{ext}", scene.scene_number));
            std::fs::write(&path, scene.image.decode()?)?;
            Ok(path)
        })
        .collect()
}

/// An opened run directory: its config, its services, and a controller resumed
/// from the saved session.
pub struct RunSession {
    pub dir: PathBuf,
    pub config: StudioConfig,
    pub controller: PipelineController,
}

impl RunSession {
    pub fn open(dir: &Path) -> StudioResult<Self> {
        if !dir.is_dir() {
            return Err(StudioError::RunNotFound(dir.to_path_buf()));
        }
        let env_file = dir.join(".env");
        if env_file.exists() {
            if let Err(e) = dotenvy::from_path(&env_file) {
                warn!(path = %env_file.display(), error = %e, "Could not load .env");
            }
        }

        let config = config::load_config(dir)?;
        config.validate()?;
        let services = Services::from_config(&config, &Credentials::from_env())?;
        let state = load_session(dir)?;
        let controller =
            PipelineController::resume(services, config.variant(), dir.join(OUTPUT_DIR), state);
        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            controller,
        })
    }

    pub fn save(&self) -> StudioResult<()> {
        save_session(&self.dir, &self.controller.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::PipelineStep;
    use crate::testing::fixture_scenes;

    #[test]
    fn test_missing_session_is_fresh_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = load_session(dir.path()).unwrap();
        assert_eq!(state.step, PipelineStep::DrawingInput);
        assert!(state.scenes.is_empty());
    }

    #[test]
    fn test_session_roundtrip_keeps_scenes() {
        let dir = tempfile::tempdir().unwrap();
        let state = PipelineState {
            step: PipelineStep::ScenesReview,
            title: Some("The Puddle Explorer".into()),
            scenes: fixture_scenes(2),
            ..Default::default()
        };
        save_session(dir.path(), &state).unwrap();
        assert!(!dir.path().join("session.json.tmp").exists());

        let loaded = load_session(dir.path()).unwrap();
        assert_eq!(loaded.step, PipelineStep::ScenesReview);
        assert_eq!(loaded.scenes, state.scenes);
        assert_eq!(loaded.title, state.title);
    }

    #[test]
    fn test_corrupt_session_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SESSION_FILE), "{ not json").unwrap();
        let err = load_session(dir.path()).unwrap_err();
        assert!(matches!(err, StudioError::SessionParse { .. }));
        assert!(err.hint().is_some());
    }

    #[test]
    fn test_write_scene_images() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_scene_images(dir.path(), &fixture_scenes(2)).unwrap();
        assert_eq!(paths[0], dir.path().join("scene-01.png"));
        assert_eq!(std::fs::read(&paths[1]).unwrap(), b"scene-2");
    }

    #[test]
    fn test_open_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = RunSession::open(&dir.path().join("nope")).err().unwrap();
        assert!(matches!(err, StudioError::RunNotFound(_)));
    }
}
