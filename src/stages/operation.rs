use crate::config::PollSettings;
use crate::error::{StudioError, StudioResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// A long-running operation as reported by the provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<OperationError>,
    #[serde(default)]
    pub response: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
}

/// Provider that runs generation as a named operation with a `done` flag.
#[async_trait]
pub trait OperationClient: Send + Sync {
    /// Start an operation and return its name.
    async fn start(&self, model: &str, body: &Value) -> StudioResult<String>;
    async fn poll(&self, name: &str) -> StudioResult<Operation>;
    async fn fetch_asset(&self, uri: &str) -> StudioResult<Vec<u8>>;
}

/// Re-poll until the operation reports done. Connectivity errors back off and retry;
/// anything else propagates. The returned operation carries `name` even when the
/// provider's final poll omitted it.
pub async fn wait_for_operation(
    client: &dyn OperationClient,
    name: &str,
    settings: &PollSettings,
) -> StudioResult<Operation> {
    let mut polls = 0u32;
    loop {
        match client.poll(name).await {
            Ok(mut op) if op.done => {
                if op.name.is_empty() {
                    op.name = name.to_string();
                }
                info!(operation = %op.name, polls = polls + 1, "Operation finished");
                return Ok(op);
            }
            Ok(_) => {
                polls += 1;
                debug!(operation = name, polls, "Operation still running");
                tokio::time::sleep(settings.interval).await;
            }
            Err(e) if e.is_transient() => {
                warn!(operation = name, error = %e, "Poll failed, backing off");
                tokio::time::sleep(settings.transient_backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Pull the produced video URI out of a finished operation.
///
/// An explicit error wins. With no error and no video, a non-empty
/// `raiMediaFilteredReasons` means the provider's filter removed the output;
/// otherwise the failure is reported as unknown.
pub fn extract_video_uri(op: &Operation) -> StudioResult<String> {
    if let Some(err) = &op.error {
        let code = err.code.map(|c| format!(" (code {c})")).unwrap_or_default();
        return Err(StudioError::VideoGeneration(format!("{}{code}", err.message)));
    }

    let video_response = op
        .response
        .as_ref()
        .and_then(|r| r.get("generateVideoResponse"));

    let uri = video_response
        .and_then(|r| r.get("generatedSamples"))
        .and_then(|s| s.get(0))
        .and_then(|s| s.get("video"))
        .and_then(|v| v.get("uri"))
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty());
    if let Some(uri) = uri {
        return Ok(uri.to_string());
    }

    let reasons: Vec<&str> = video_response
        .and_then(|r| r.get("raiMediaFilteredReasons"))
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if !reasons.is_empty() {
        return Err(StudioError::ContentBlocked(reasons.join("; ")));
    }
    Err(StudioError::UnknownFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fast_poll, StubOperationClient};
    use serde_json::json;

    fn finished(response: Value) -> Operation {
        Operation {
            name: "operations/abc".into(),
            done: true,
            error: None,
            response: Some(response),
        }
    }

    #[tokio::test]
    async fn test_finished_operation_keeps_its_name() {
        let unnamed = Operation {
            done: true,
            ..Operation::default()
        };
        let client = StubOperationClient::new(vec![Ok(Operation::default()), Ok(unnamed)]);
        let op = wait_for_operation(&client, "operations/xyz", &fast_poll())
            .await
            .unwrap();
        assert_eq!(op.name, "operations/xyz");
        assert_eq!(client.poll_count(), 2);

        let client = StubOperationClient::new(vec![Ok(finished(json!({})))]);
        let op = wait_for_operation(&client, "operations/xyz", &fast_poll())
            .await
            .unwrap();
        assert_eq!(op.name, "operations/abc");
    }

    #[test]
    fn test_extract_video_uri() {
        let op = finished(json!({
            "generateVideoResponse": {
                "generatedSamples": [{"video": {"uri": "https://files.example/v.mp4"}}]
            }
        }));
        assert_eq!(extract_video_uri(&op).unwrap(), "https://files.example/v.mp4");
    }

    #[test]
    fn test_filtered_reasons_are_content_blocked() {
        let op = finished(json!({
            "generateVideoResponse": {
                "raiMediaFilteredReasons": ["Video contains a child."]
            }
        }));
        match extract_video_uri(&op).unwrap_err() {
            StudioError::ContentBlocked(reason) => assert!(reason.contains("child")),
            other => panic!("expected ContentBlocked, got {other:?}"),
        }
    }

    #[test]
    fn test_no_uri_and_no_reason_is_unknown_failure() {
        let op = finished(json!({"generateVideoResponse": {"generatedSamples": []}}));
        assert!(matches!(
            extract_video_uri(&op).unwrap_err(),
            StudioError::UnknownFailure
        ));

        let empty_reasons = finished(json!({"generateVideoResponse": {"raiMediaFilteredReasons": []}}));
        assert!(matches!(
            extract_video_uri(&empty_reasons).unwrap_err(),
            StudioError::UnknownFailure
        ));
    }

    #[test]
    fn test_operation_error_is_video_generation() {
        let op: Operation = serde_json::from_value(json!({
            "name": "operations/abc",
            "done": true,
            "error": {"code": 3, "message": "invalid prompt"}
        }))
        .unwrap();
        match extract_video_uri(&op).unwrap_err() {
            StudioError::VideoGeneration(msg) => {
                assert!(msg.contains("invalid prompt"));
                assert!(msg.contains("code 3"));
            }
            other => panic!("expected VideoGeneration, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wait_polls_until_done_and_retries_transient() {
        let client = StubOperationClient::new(vec![
            Ok(Operation::default()),
            Err(StudioError::Network {
                service: "Gemini".into(),
                message: "reset".into(),
            }),
            Ok(finished(json!({}))),
        ]);
        let op = wait_for_operation(&client, "operations/abc", &fast_poll())
            .await
            .unwrap();
        assert!(op.done);
        assert_eq!(client.poll_count(), 3);
    }

    #[tokio::test]
    async fn test_wait_propagates_permanent_error() {
        let client = StubOperationClient::new(vec![Err(StudioError::Http {
            service: "Gemini".into(),
            status: 404,
            body: "not found".into(),
        })]);
        let err = wait_for_operation(&client, "operations/abc", &fast_poll())
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::Http { status: 404, .. }));
    }
}
