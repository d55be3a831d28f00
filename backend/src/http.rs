//! Shared HTTP plumbing for the hosted adapters.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::config::Timeouts;
use crate::error::BackendError;

pub(crate) fn build_client(timeouts: Timeouts) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeouts.request_secs))
        .connect_timeout(Duration::from_secs(timeouts.connect_secs))
        .build()
        .map_err(|e| BackendError::HttpClientBuild(e.to_string()))
}

/// Send `request` and return the body of a 2xx response.
pub(crate) async fn send(request: reqwest::RequestBuilder) -> Result<String, BackendError> {
    let response = request.send().await?;
    let status = response.status().as_u16();
    let text = response.text().await?;

    if !(200..300).contains(&status) {
        return Err(BackendError::Response { status, body: text });
    }
    Ok(text)
}

pub(crate) fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, BackendError> {
    serde_json::from_str(text).map_err(|e| BackendError::Parse(e.to_string()))
}
