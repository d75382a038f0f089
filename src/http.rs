use crate::error::{StudioError, StudioResult};
use serde::de::DeserializeOwned;

pub fn network_error(service: &str, e: reqwest::Error) -> StudioError {
    StudioError::Network {
        service: service.to_string(),
        message: e.to_string(),
    }
}

/// Turn a non-2xx response into `StudioError::Http`, keeping the body for diagnostics.
pub async fn ensure_success(
    service: &str,
    response: reqwest::Response,
) -> StudioResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(StudioError::Http {
        service: service.to_string(),
        status: status.as_u16(),
        body: truncate(&body, 500),
    })
}

pub async fn read_json<T: DeserializeOwned>(
    service: &str,
    response: reqwest::Response,
) -> StudioResult<T> {
    let response = ensure_success(service, response).await?;
    let text = response
        .text()
        .await
        .map_err(|e| network_error(service, e))?;
    serde_json::from_str(&text).map_err(|e| StudioError::UnexpectedResponse {
        service: service.to_string(),
        message: format!("{e} in {}", truncate(&text, 200)),
    })
}

/// Fetch a produced asset. Failure statuses become `StudioError::Download`.
pub async fn read_asset(url: &str, response: reqwest::Response) -> StudioResult<Vec<u8>> {
    check_asset_status(url, response.status())?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| network_error("asset download", e))?;
    Ok(bytes.to_vec())
}

fn check_asset_status(url: &str, status: reqwest::StatusCode) -> StudioResult<()> {
    if status.is_success() {
        return Ok(());
    }
    Err(StudioError::Download {
        url: url.to_string(),
        status: status.as_u16(),
    })
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}
