//! Queue-style job providers: submit a request, poll its status URL, fetch the result.

use crate::config::PollSettings;
use crate::error::{StudioError, StudioResult};
use crate::http::{network_error, read_asset, read_json};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use tracing::{debug, info, warn};

const FAL_QUEUE_BASE: &str = "https://queue.fal.run";
const SERVICE: &str = "fal";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    /// Map a provider status string. Unknown strings count as still pending.
    pub fn from_status_str(status: &str) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "COMPLETED" | "SUCCEEDED" | "OK" => JobState::Completed,
            "FAILED" | "ERROR" | "CANCELLED" => JobState::Failed,
            "IN_PROGRESS" | "RUNNING" => JobState::Running,
            _ => JobState::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: String,
    pub status_url: String,
    pub response_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JobStatus {
    pub state: JobState,
    pub reason: Option<String>,
    /// Some providers inline the result in the final status payload.
    pub output: Option<Value>,
}

#[async_trait]
pub trait JobClient: Send + Sync {
    async fn submit(&self, model: &str, input: &Value) -> StudioResult<JobHandle>;
    async fn status(&self, handle: &JobHandle) -> StudioResult<JobStatus>;
    async fn result(&self, handle: &JobHandle) -> StudioResult<Value>;
    async fn fetch_asset(&self, url: &str) -> StudioResult<Vec<u8>>;
}

/// Poll a submitted job until it completes or fails.
///
/// Each iteration performs exactly one status check. Pending and running states
/// wait `interval`; transient errors wait `transient_backoff` and retry without limit.
/// An explicit failure is never retried.
pub async fn poll_job(
    client: &dyn JobClient,
    handle: &JobHandle,
    settings: &PollSettings,
    label: &str,
) -> StudioResult<Value> {
    let mut checks = 0u32;
    loop {
        checks += 1;
        match client.status(handle).await {
            Ok(status) => match status.state {
                JobState::Completed => {
                    info!(job = %handle.job_id, checks, "{label} finished");
                    return match status.output {
                        Some(output) => Ok(output),
                        None => client.result(handle).await,
                    };
                }
                JobState::Failed => {
                    let reason = status.reason.unwrap_or_else(|| "no reason given".into());
                    return Err(StudioError::VideoGeneration(format!("{label} failed: {reason}")));
                }
                state => {
                    debug!(job = %handle.job_id, ?state, checks, "{label} not ready");
                    tokio::time::sleep(settings.interval).await;
                }
            },
            Err(e) if e.is_transient() => {
                warn!(job = %handle.job_id, error = %e, "Status check failed, backing off");
                tokio::time::sleep(settings.transient_backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Apply the optional overall bound from `[polling] max_wait_secs`.
pub async fn bounded<T>(
    settings: &PollSettings,
    label: &str,
    fut: impl Future<Output = StudioResult<T>>,
) -> StudioResult<T> {
    match settings.max_wait {
        None => fut.await,
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| StudioError::PollTimeout {
                label: label.to_string(),
                secs: limit.as_secs(),
            })?,
    }
}

/// The first `url` found under `key` in a job result, e.g. `{"video": {"url": ...}}`.
pub fn output_url(result: &Value, key: &str) -> StudioResult<String> {
    result
        .get(key)
        .and_then(|v| v.get("url"))
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StudioError::UnexpectedResponse {
            service: SERVICE.into(),
            message: format!("result has no {key}.url"),
        })
}

pub struct FalQueueClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl FalQueueClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: FAL_QUEUE_BASE.to_string(),
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("Authorization", format!("Key {}", self.api_key))
    }
}

#[derive(Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    status_url: Option<String>,
    #[serde(default)]
    response_url: Option<String>,
}

impl SubmitResponse {
    fn into_handle(self, model: &str) -> StudioResult<JobHandle> {
        let status_url = self
            .status_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| StudioError::MissingPollTarget(format!("{model} returned no status_url")))?;
        Ok(JobHandle {
            job_id: self.request_id.unwrap_or_default(),
            status_url,
            response_url: self.response_url,
        })
    }
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<Value>,
}

#[async_trait]
impl JobClient for FalQueueClient {
    async fn submit(&self, model: &str, input: &Value) -> StudioResult<JobHandle> {
        let url = format!("{}/{model}", self.base_url);
        let response = self
            .authorized(self.http.post(&url))
            .json(input)
            .send()
            .await
            .map_err(|e| network_error(SERVICE, e))?;
        let submitted: SubmitResponse = read_json(SERVICE, response).await?;
        let handle = submitted.into_handle(model)?;
        info!(model, job = %handle.job_id, "Job submitted");
        Ok(handle)
    }

    async fn status(&self, handle: &JobHandle) -> StudioResult<JobStatus> {
        let response = self
            .authorized(self.http.get(&handle.status_url))
            .send()
            .await
            .map_err(|e| network_error(SERVICE, e))?;
        let status: StatusResponse = read_json(SERVICE, response).await?;
        let mut state = JobState::from_status_str(&status.status);
        if state == JobState::Completed && status.error.as_ref().is_some_and(|e| !e.is_null()) {
            state = JobState::Failed;
        }
        Ok(JobStatus {
            state,
            reason: status.error.map(|e| match e {
                Value::String(s) => s,
                other => other.to_string(),
            }),
            output: None,
        })
    }

    async fn result(&self, handle: &JobHandle) -> StudioResult<Value> {
        let url = handle.response_url.as_deref().ok_or_else(|| {
            StudioError::MissingPollTarget(format!("job {} has no response_url", handle.job_id))
        })?;
        let response = self
            .authorized(self.http.get(url))
            .send()
            .await
            .map_err(|e| network_error(SERVICE, e))?;
        read_json(SERVICE, response).await
    }

    async fn fetch_asset(&self, url: &str) -> StudioResult<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| network_error(SERVICE, e))?;
        read_asset(url, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fast_poll, ScriptedJobClient};
    use serde_json::json;
    use std::time::Duration;

    fn status(state: JobState) -> StudioResult<JobStatus> {
        Ok(JobStatus {
            state,
            reason: None,
            output: None,
        })
    }

    #[test]
    fn test_submit_reply_without_status_url() {
        let model = "fal-ai/sync-lipsync";
        for reply in [
            json!({"request_id": "req-1", "status_url": ""}),
            json!({"request_id": "req-1", "response_url": "https://queue.example/req-1"}),
        ] {
            let submitted: SubmitResponse = serde_json::from_value(reply).unwrap();
            let err = submitted.into_handle(model).unwrap_err();
            assert!(matches!(err, StudioError::MissingPollTarget(ref m) if m.contains(model)));
        }

        let submitted: SubmitResponse = serde_json::from_value(json!({
            "request_id": "req-2",
            "status_url": "https://queue.example/req-2/status",
        }))
        .unwrap();
        let handle = submitted.into_handle(model).unwrap();
        assert_eq!(handle.job_id, "req-2");
        assert_eq!(handle.status_url, "https://queue.example/req-2/status");
        assert!(handle.response_url.is_none());
    }

    #[test]
    fn test_status_string_mapping() {
        assert_eq!(JobState::from_status_str("IN_QUEUE"), JobState::Pending);
        assert_eq!(JobState::from_status_str("PENDING"), JobState::Pending);
        assert_eq!(JobState::from_status_str("IN_PROGRESS"), JobState::Running);
        assert_eq!(JobState::from_status_str("completed"), JobState::Completed);
        assert_eq!(JobState::from_status_str("FAILED"), JobState::Failed);
    }

    #[tokio::test]
    async fn test_pending_twice_then_completed_checks_three_times() {
        let client = ScriptedJobClient::new(
            vec![
                status(JobState::Pending),
                status(JobState::Pending),
                status(JobState::Completed),
            ],
            json!({"video": {"url": "https://cdn.example/out.mp4"}}),
        );
        let handle = client.handle();
        let result = poll_job(&client, &handle, &fast_poll(), "video").await.unwrap();
        assert_eq!(client.status_calls(), 3);
        assert_eq!(output_url(&result, "video").unwrap(), "https://cdn.example/out.mp4");
    }

    #[tokio::test]
    async fn test_failed_job_is_not_retried() {
        let client = ScriptedJobClient::new(
            vec![
                status(JobState::Running),
                Ok(JobStatus {
                    state: JobState::Failed,
                    reason: Some("GPU exploded".into()),
                    output: None,
                }),
                status(JobState::Completed),
            ],
            json!({}),
        );
        let handle = client.handle();
        let err = poll_job(&client, &handle, &fast_poll(), "video").await.unwrap_err();
        assert_eq!(client.status_calls(), 2);
        match err {
            StudioError::VideoGeneration(msg) => assert!(msg.contains("GPU exploded")),
            other => panic!("expected VideoGeneration, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transient_status_errors_back_off_and_retry() {
        let client = ScriptedJobClient::new(
            vec![
                Err(StudioError::Http {
                    service: "fal".into(),
                    status: 503,
                    body: String::new(),
                }),
                status(JobState::Completed),
            ],
            json!({"video": {"url": "https://cdn.example/out.mp4"}}),
        );
        let handle = client.handle();
        assert!(poll_job(&client, &handle, &fast_poll(), "video").await.is_ok());
        assert_eq!(client.status_calls(), 2);
    }

    #[tokio::test]
    async fn test_inline_output_skips_result_fetch() {
        let client = ScriptedJobClient::new(
            vec![Ok(JobStatus {
                state: JobState::Completed,
                reason: None,
                output: Some(json!({"video": {"url": "inline"}})),
            })],
            json!({"video": {"url": "fetched"}}),
        );
        let handle = client.handle();
        let result = poll_job(&client, &handle, &fast_poll(), "video").await.unwrap();
        assert_eq!(output_url(&result, "video").unwrap(), "inline");
        assert_eq!(client.result_calls(), 0);
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let settings = PollSettings {
            max_wait: Some(Duration::from_millis(5)),
            ..fast_poll()
        };
        let err = bounded(&settings, "video", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, StudioError::PollTimeout { .. }));
    }

    #[test]
    fn test_output_url_missing() {
        assert!(output_url(&json!({"video": {}}), "video").is_err());
    }
}
