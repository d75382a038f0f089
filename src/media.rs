use crate::error::{StudioError, StudioResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Binary media in transportable form: a base64 payload plus its declared content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPayload {
    pub data: String,
    pub content_type: String,
}

impl MediaPayload {
    pub fn from_bytes(bytes: &[u8], content_type: impl Into<String>) -> Self {
        Self {
            data: STANDARD.encode(bytes),
            content_type: content_type.into(),
        }
    }

    /// Read a file and encode it. The content type is inferred from the extension.
    pub fn encode_file(path: &Path) -> StudioResult<Self> {
        let content_type = content_type_for_path(path).ok_or_else(|| {
            StudioError::InputDecode(format!(
                "unsupported file type for {} (no known media extension)",
                path.display()
            ))
        })?;
        let bytes = std::fs::read(path).map_err(|e| {
            StudioError::InputDecode(format!("failed to read {}: {e}", path.display()))
        })?;
        if bytes.is_empty() {
            return Err(StudioError::InputDecode(format!(
                "{} is empty",
                path.display()
            )));
        }
        Ok(Self::from_bytes(&bytes, content_type))
    }

    /// Parse a `data:<mime>;base64,<payload>` URL into a `(mime, payload)` pair.
    pub fn from_data_url(url: &str) -> StudioResult<Self> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| StudioError::InputDecode("not a data URL".into()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| StudioError::InputDecode("data URL has no payload".into()))?;
        let content_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| StudioError::InputDecode("data URL is not base64-encoded".into()))?;
        if content_type.is_empty() || payload.is_empty() {
            return Err(StudioError::InputDecode(
                "data URL is missing its mime type or payload".into(),
            ));
        }
        STANDARD
            .decode(payload)
            .map_err(|e| StudioError::InputDecode(format!("invalid base64 payload: {e}")))?;
        Ok(Self {
            data: payload.to_string(),
            content_type: content_type.to_string(),
        })
    }

    /// Accept either a `data:` URL or a path to a media file.
    pub fn from_input(input: &str) -> StudioResult<Self> {
        if input.starts_with("data:") {
            Self::from_data_url(input)
        } else {
            Self::encode_file(Path::new(input))
        }
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.content_type, self.data)
    }

    pub fn decode(&self) -> StudioResult<Vec<u8>> {
        STANDARD
            .decode(&self.data)
            .map_err(|e| StudioError::InputDecode(format!("invalid base64 payload: {e}")))
    }

    /// Approximate decoded size, for logging.
    pub fn approx_len(&self) -> usize {
        self.data.len() / 4 * 3
    }
}

/// A produced asset the caller can play back or hand to the next stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MediaHandle {
    File { path: PathBuf, content_type: String },
    Url { url: String, content_type: String },
}

impl MediaHandle {
    pub fn content_type(&self) -> &str {
        match self {
            MediaHandle::File { content_type, .. } | MediaHandle::Url { content_type, .. } => {
                content_type
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            MediaHandle::File { path, .. } => path.display().to_string(),
            MediaHandle::Url { url, .. } => url.clone(),
        }
    }

    /// A self-contained reference another service can fetch: remote URLs pass through,
    /// local files are inlined as data URLs.
    pub fn to_reference(&self) -> StudioResult<String> {
        match self {
            MediaHandle::Url { url, .. } => Ok(url.clone()),
            MediaHandle::File { path, content_type } => {
                let bytes = std::fs::read(path).map_err(|e| {
                    StudioError::InputDecode(format!("failed to read {}: {e}", path.display()))
                })?;
                Ok(MediaPayload::from_bytes(&bytes, content_type.as_str()).to_data_url())
            }
        }
    }
}

/// Write downloaded bytes into `dir/<stem>.<ext>` and return a local handle.
pub fn materialize(
    dir: &Path,
    stem: &str,
    bytes: &[u8],
    content_type: &str,
) -> StudioResult<MediaHandle> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{stem}.{}", extension_for(content_type)));
    std::fs::write(&path, bytes)?;
    Ok(MediaHandle::File {
        path,
        content_type: content_type.to_string(),
    })
}

pub fn content_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "webm" => "audio/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "mp4" => "video/mp4",
        _ => return None,
    })
}

pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "audio/webm" => "webm",
        "audio/mpeg" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/ogg" => "ogg",
        "audio/mp4" => "m4a",
        "video/mp4" => "mp4",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1x1 transparent PNG
    const PNG_BYTES: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    #[test]
    fn test_encode_file_then_decode_restores_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drawing.png");
        std::fs::write(&path, PNG_BYTES).unwrap();

        let payload = MediaPayload::encode_file(&path).unwrap();
        assert_eq!(payload.content_type, "image/png");
        assert_eq!(payload.decode().unwrap(), PNG_BYTES);
    }

    #[test]
    fn test_data_url_parses_mime_and_payload() {
        let payload = MediaPayload::from_bytes(PNG_BYTES, "image/png");
        let url = payload.to_data_url();
        assert!(url.starts_with("data:image/png;base64,"));

        let parsed = MediaPayload::from_data_url(&url).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn test_data_url_rejects_malformed_input() {
        for bad in [
            "image/png;base64,AAAA",
            "data:image/png;base64",
            "data:image/png,AAAA",
            "data:;base64,AAAA",
            "data:image/png;base64,!!!not-base64!!!",
        ] {
            let err = MediaPayload::from_data_url(bad).unwrap_err();
            assert!(
                matches!(err, StudioError::InputDecode(_)),
                "expected InputDecode for {bad}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_encode_file_missing_or_unknown_type() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.png");
        assert!(matches!(
            MediaPayload::encode_file(&missing),
            Err(StudioError::InputDecode(_))
        ));

        let unknown = dir.path().join("notes.txt");
        std::fs::write(&unknown, "hello").unwrap();
        assert!(matches!(
            MediaPayload::encode_file(&unknown),
            Err(StudioError::InputDecode(_))
        ));
    }

    #[test]
    fn test_materialize_and_reference_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let handle = materialize(dir.path(), "narration", b"ID3audio", "audio/mpeg").unwrap();
        match &handle {
            MediaHandle::File { path, .. } => {
                assert_eq!(path.file_name().unwrap(), "narration.mp3");
            }
            other => panic!("expected file handle, got {other:?}"),
        }

        let reference = handle.to_reference().unwrap();
        let inlined = MediaPayload::from_data_url(&reference).unwrap();
        assert_eq!(inlined.decode().unwrap(), b"ID3audio");
    }

    #[test]
    fn test_from_input_accepts_path_or_data_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.webm");
        std::fs::write(&path, b"webm").unwrap();

        let from_path = MediaPayload::from_input(path.to_str().unwrap()).unwrap();
        assert_eq!(from_path.content_type, "audio/webm");
        let from_url = MediaPayload::from_input(&from_path.to_data_url()).unwrap();
        assert_eq!(from_url, from_path);
    }

    #[test]
    fn test_url_reference_passes_through() {
        let handle = MediaHandle::Url {
            url: "https://cdn.example.com/v.mp4".into(),
            content_type: "video/mp4".into(),
        };
        assert_eq!(handle.to_reference().unwrap(), "https://cdn.example.com/v.mp4");
    }
}
