use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use crate::error::AgentError;

/// Client for an OpenAI-compatible image generation API, used for
/// character avatars. Returns the image as base64 so the boundary can hand
/// it straight to the frontend.
#[derive(Clone)]
pub struct ImageClient {
    api_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImagePayload>,
}

#[derive(Debug, Deserialize)]
struct ImagePayload {
    b64_json: String,
}

impl ImageClient {
    pub fn new(api_url: impl Into<String>, model: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, AgentError> {
        let url = format!("{}/images/generations", self.api_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "n": 1,
                "response_format": "b64_json",
            }))
            .send()
            .await
            .map_err(|err| AgentError::UpstreamError(format!("request to {} failed: {}", url, err)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read body".to_string());
            return Err(AgentError::UpstreamError(format!(
                "image API returned {}: {}",
                status, body
            )));
        }

        let parsed: ImageResponse = response
            .json()
            .await
            .map_err(|err| AgentError::UpstreamError(format!("invalid image response: {}", err)))?;
        let image = parsed
            .data
            .into_iter()
            .next()
            .map(|payload| payload.b64_json)
            .ok_or_else(|| AgentError::UpstreamError("image response had no data".to_string()))?;

        // Validate before handing the payload to the frontend.
        base64::engine::general_purpose::STANDARD
            .decode(image.as_bytes())
            .map_err(|err| AgentError::UpstreamError(format!("image was not valid base64: {}", err)))?;

        Ok(image)
    }
}
