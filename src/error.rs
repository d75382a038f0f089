use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StudioError {
    #[error("Could not decode media input: {0}")]
    InputDecode(String),

    #[error("Could not generate story: {0}")]
    ScriptGeneration(String),

    #[error("No image was generated for scene {scene_number}")]
    NoImageProduced { scene_number: u32 },

    #[error("Video generation failed: {0}")]
    VideoGeneration(String),

    #[error("Generated video was blocked by the provider: {0}")]
    ContentBlocked(String),

    #[error("Video generation finished without an output or a reason")]
    UnknownFailure,

    #[error("Job submission returned no status handle: {0}")]
    MissingPollTarget(String),

    #[error("Download of {url} failed with HTTP {status}")]
    Download { url: String, status: u16 },

    #[error("Voice cloning failed: {0}")]
    VoiceClone(String),

    #[error("Narration synthesis failed: {0}")]
    NarrationSynthesis(String),

    #[error("{service} returned HTTP {status}: {body}")]
    Http {
        service: String,
        status: u16,
        body: String,
    },

    #[error("Network error talking to {service}: {message}")]
    Network { service: String, message: String },

    #[error("{service} returned an unexpected response: {message}")]
    UnexpectedResponse { service: String, message: String },

    #[error("{0} env var not set")]
    MissingCredential(&'static str),

    #[error("Failed to parse config: {0}")]
    ConfigParse(String),

    #[error("Invalid config: {0}")]
    ConfigInvalid(String),

    #[error("Failed to read session file {path}: {message}")]
    SessionParse { path: PathBuf, message: String },

    #[error("Run directory not found: {0}")]
    RunNotFound(PathBuf),

    #[error("Already initialized: {0} already exists")]
    AlreadyInitialized(PathBuf),

    #[error("Pipeline is busy: {0}")]
    Busy(String),

    #[error("Cannot {action} while the pipeline is at {step}")]
    InvalidStep { action: &'static str, step: String },

    #[error("Pipeline run was abandoned")]
    Cancelled,

    #[error("Gave up waiting for {label} after {secs}s")]
    PollTimeout { label: String, secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl StudioError {
    /// Connectivity failures that a poll loop may retry after backing off.
    /// Explicit job failures are never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            StudioError::Network { .. } => true,
            StudioError::Http { status, .. } => {
                matches!(status, 408 | 429) || (500..=599).contains(status)
            }
            _ => false,
        }
    }

    /// Return an actionable hint for the user, if applicable.
    pub fn hint(&self) -> Option<String> {
        match self {
            StudioError::MissingCredential(var) => Some(format!(
                "Export {var} or add it to the .env file in the run directory. See .env.example."
            )),
            StudioError::RunNotFound(_) => Some(
                "Run 'doodlemagic init <dir>' to create a run directory, or check the path.".into(),
            ),
            StudioError::ConfigParse(_) | StudioError::ConfigInvalid(_) => Some(
                "Check doodlemagic.toml. Delete it to fall back to defaults, or run 'doodlemagic init' in a new directory for a commented example.".into(),
            ),
            StudioError::SessionParse { .. } => Some(
                "The saved pipeline session is unreadable. Run 'doodlemagic restart <dir>' to start a fresh run.".into(),
            ),
            StudioError::InvalidStep { .. } => Some(
                "Run 'doodlemagic status <dir>' to see the current step. Steps go: story -> scenes -> (narrate) -> video.".into(),
            ),
            StudioError::InputDecode(_) => Some(
                "Supported inputs: png, jpg, webp, gif images and webm, mp3, wav, ogg, m4a audio.".into(),
            ),
            StudioError::ContentBlocked(_) => Some(
                "The provider's safety filter rejected the video. Try a different drawing or regenerate the story.".into(),
            ),
            StudioError::Http { status: 401 | 403, .. } => {
                Some("The provider rejected the API key. Check the credentials in .env.".into())
            }
            StudioError::PollTimeout { .. } => Some(
                "Raise [polling] max_wait_secs in doodlemagic.toml, or remove it to wait indefinitely.".into(),
            ),
            _ => None,
        }
    }
}

pub type StudioResult<T> = Result<T, StudioError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> StudioError {
        StudioError::Http {
            service: "fal".into(),
            status,
            body: String::new(),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(StudioError::Network {
            service: "fal".into(),
            message: "connection reset".into()
        }
        .is_transient());
        assert!(http(503).is_transient());
        assert!(http(429).is_transient());
        assert!(!http(401).is_transient());
        assert!(!http(404).is_transient());
        assert!(!StudioError::VideoGeneration("FAILED".into()).is_transient());
    }

    #[test]
    fn test_hint_for_missing_credential_names_variable() {
        let hint = StudioError::MissingCredential("GEMINI_API_KEY")
            .hint()
            .unwrap();
        assert!(hint.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_no_image_message_names_scene() {
        let err = StudioError::NoImageProduced { scene_number: 2 };
        assert_eq!(err.to_string(), "No image was generated for scene 2");
    }
}
