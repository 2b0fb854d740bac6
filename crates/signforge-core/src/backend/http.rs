//! OpenAI-style images API client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::BackendConfig;
use crate::credentials::ApiKey;
use crate::model::ResolvedRequest;

use super::{BackendError, GeneratedImage, GenerationBackend};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_SUMMARY_LEN: usize = 200;

/// Client for an OpenAI-style `POST /v1/images/generations` endpoint.
///
/// Generation is two-step: the API responds with a short-lived image URL,
/// which the client fetches with a second request. The credential lives only
/// here and is read only while building the Authorization header.
pub struct HttpGenerationBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: ApiKey,
}

#[derive(Debug, Deserialize)]
struct GenerationsResponse {
    data: Vec<GenerationDatum>,
}

#[derive(Debug, Deserialize)]
struct GenerationDatum {
    url: Option<String>,
    revised_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

impl HttpGenerationBackend {
    pub fn new(config: &BackendConfig, api_key: ApiKey) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(config.timeout_seconds))
            .build()
            .map_err(|err| BackendError::Unavailable(format!("http client init failed: {err}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, BackendError> {
        let response = self
            .client
            .get(url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
            .map_err(classify_transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Unavailable(format!(
                "image download returned HTTP {status}"
            )));
        }
        let bytes = response.bytes().await.map_err(classify_transport)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationBackend {
    async fn generate(&self, request: &ResolvedRequest) -> Result<GeneratedImage, BackendError> {
        let body = json!({
            "model": self.model,
            "prompt": request.engineered_prompt(),
            "n": 1,
            "size": request.size.as_str(),
            "quality": request.quality.as_str(),
        });
        let endpoint = format!("{}/v1/images/generations", self.base_url);

        tracing::debug!(
            model = %self.model,
            size = %request.size.as_str(),
            quality = %request.quality.as_str(),
            "dispatching generation request"
        );

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, response).await);
        }

        let parsed: GenerationsResponse = response.json().await.map_err(|err| {
            BackendError::Unavailable(format!(
                "malformed generation response: {}",
                err.without_url()
            ))
        })?;
        let datum = parsed.data.into_iter().next().ok_or_else(|| {
            BackendError::Unavailable("generation response carried no image".into())
        })?;
        let image_url = datum.url.ok_or_else(|| {
            BackendError::Unavailable("generation response carried no image url".into())
        })?;

        let bytes = self.download(&image_url).await?;
        tracing::debug!(bytes = bytes.len(), "image downloaded");

        Ok(GeneratedImage {
            bytes,
            model: self.model.clone(),
            revised_prompt: datum.revised_prompt,
        })
    }
}

/// Map an HTTP error status onto the failure taxonomy.
///
/// Auth failures carry a fixed message; other statuses carry a truncated
/// summary of the upstream `error.message`, never the raw body.
async fn classify_status(status: reqwest::StatusCode, response: reqwest::Response) -> BackendError {
    let message = response
        .json::<ErrorResponse>()
        .await
        .ok()
        .and_then(|body| body.error)
        .and_then(|detail| detail.message)
        .map(|text| summarize(&text))
        .unwrap_or_else(|| "no detail provided".to_string());

    match status.as_u16() {
        400 => BackendError::InvalidRequest(message),
        401 | 403 => BackendError::Auth,
        429 => BackendError::RateLimited(message),
        _ => BackendError::Unavailable(format!("backend returned HTTP {status}")),
    }
}

/// Signed download URLs and request bodies may ride on a reqwest error's
/// display form; strip the URL before echoing it anywhere.
fn classify_transport(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        return BackendError::Unavailable("request timed out".into());
    }
    let scrubbed = err.without_url();
    if scrubbed.is_connect() {
        BackendError::Unavailable(format!("connection failed: {scrubbed}"))
    } else {
        BackendError::Unavailable(format!("transport error: {scrubbed}"))
    }
}

fn summarize(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= ERROR_SUMMARY_LEN {
        return trimmed.to_string();
    }
    let mut cut = ERROR_SUMMARY_LEN;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &trimmed[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;

    #[test]
    fn trailing_slash_is_stripped_from_base_url() {
        let config = BackendConfig {
            base_url: "https://api.example.com/".into(),
            ..BackendConfig::default()
        };
        let backend = HttpGenerationBackend::new(&config, ApiKey::from("k".to_string())).unwrap();
        assert_eq!(backend.base_url, "https://api.example.com");
    }

    #[test]
    fn summaries_truncate_long_messages() {
        let long = "x".repeat(500);
        let summary = summarize(&long);
        assert_eq!(summary.len(), ERROR_SUMMARY_LEN + 3);
        assert!(summary.ends_with("..."));

        assert_eq!(summarize("  short  "), "short");
    }
}
