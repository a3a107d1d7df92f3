// src/services/inpainting_client.rs
use crate::config::ReplicateConfig;
use crate::errors::EditorError;
use crate::models::GenerationParams;
use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

/// Everything the external model needs for one edit. `image` and `mask` are
/// data URIs (or a URL for `image`).
#[derive(Debug, Clone)]
pub struct InpaintInput {
    pub image: String,
    pub mask: String,
    pub prompt: Option<String>,
    pub params: GenerationParams,
}

/// Where the edited image lives once the model has finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditedImageRef {
    Url(String),
    Inline(String),
}

impl EditedImageRef {
    fn from_text(text: &str) -> Option<Self> {
        if text.is_empty() {
            None
        } else if text.starts_with("http://") || text.starts_with("https://") {
            Some(EditedImageRef::Url(text.to_string()))
        } else {
            Some(EditedImageRef::Inline(text.to_string()))
        }
    }

    /// Accepts a bare string, a list (first element wins), or an object with
    /// an `output`, `image` or `result` field.
    pub fn from_output(output: &Value) -> Option<Self> {
        match output {
            Value::String(s) => Self::from_text(s),
            Value::Array(items) => items.first().and_then(Self::from_output),
            Value::Object(map) => ["output", "image", "result"]
                .iter()
                .find_map(|key| map.get(*key).filter(|v| !v.is_null()))
                .and_then(Self::from_output),
            _ => None,
        }
    }
}

#[async_trait]
pub trait InpaintingClient: Send + Sync {
    async fn inpaint(&self, input: InpaintInput) -> Result<EditedImageRef, EditorError>;

    fn model(&self) -> &str;

    fn is_configured(&self) -> bool {
        true
    }
}

/// Inpainting through Replicate's predictions API.
pub struct ReplicateClient {
    api_key: Option<String>,
    model: String,
    api_base: String,
    poll_interval: Duration,
    client: Client,
}

impl ReplicateClient {
    pub fn new(config: &ReplicateConfig, client: Client) -> Self {
        Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            poll_interval: config.poll_interval,
            client,
        }
    }

    fn request_body(&self, input: &InpaintInput) -> (String, Value) {
        let input_data = json!({
            "image": input.image,
            "mask": input.mask,
            "prompt": input.prompt,
            "num_inference_steps": input.params.num_inference_steps,
            "guidance_scale": input.params.guidance_scale,
            "seed": input.params.seed,
        });

        // `owner/name:version` pins a version; `owner/name` runs the latest one.
        match self.model.split_once(':') {
            Some((_, version)) => (
                format!("{}/predictions", self.api_base),
                json!({ "version": version, "input": input_data }),
            ),
            None => (
                format!("{}/models/{}/predictions", self.api_base, self.model),
                json!({ "input": input_data }),
            ),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, EditorError> {
        let response = request
            .send()
            .await
            .map_err(|e| EditorError::ExternalService(format!("Replicate request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EditorError::ExternalService(format!(
                "Replicate API error ({}): {}",
                status, error_text
            )));
        }

        response.json().await.map_err(|e| {
            EditorError::ExternalService(format!("Failed to parse Replicate response: {}", e))
        })
    }

    async fn wait_for_completion(
        &self,
        api_key: &str,
        mut prediction: Value,
    ) -> Result<Value, EditorError> {
        loop {
            let status = prediction["status"].as_str().unwrap_or("unknown").to_string();
            match status.as_str() {
                "succeeded" => return Ok(prediction),
                "failed" | "canceled" => {
                    let reason = prediction["error"].as_str().unwrap_or("no error reported");
                    return Err(EditorError::ExternalService(format!(
                        "Prediction {}: {}",
                        status, reason
                    )));
                }
                _ => {}
            }

            let poll_url = prediction["urls"]["get"].as_str().ok_or_else(|| {
                EditorError::ExternalService(format!(
                    "Prediction in state '{}' has no status URL",
                    status
                ))
            })?;

            debug!("Prediction {} is {}, polling again", prediction["id"], status);
            tokio::time::sleep(self.poll_interval).await;

            prediction = self
                .send(self.client.get(poll_url).bearer_auth(api_key))
                .await?;
        }
    }
}

#[async_trait]
impl InpaintingClient for ReplicateClient {
    async fn inpaint(&self, input: InpaintInput) -> Result<EditedImageRef, EditorError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            EditorError::ExternalService(
                "AI service not configured. Please set REPLICATE_API_KEY.".to_string(),
            )
        })?;

        let (url, body) = self.request_body(&input);
        info!("Submitting inpainting prediction to {}", self.model);

        let prediction = self
            .send(
                self.client
                    .post(url)
                    .bearer_auth(api_key)
                    .header("Prefer", "wait")
                    .json(&body),
            )
            .await?;

        let prediction = self.wait_for_completion(api_key, prediction).await?;

        if prediction["output"].is_null() {
            return Err(EditorError::ExternalService(
                "No output received from Replicate API".to_string(),
            ));
        }

        EditedImageRef::from_output(&prediction["output"]).ok_or_else(|| {
            EditorError::ExternalService("Invalid output format from Replicate API".to_string())
        })
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(model: &str, api_key: Option<&str>) -> ReplicateClient {
        let config = ReplicateConfig {
            api_key: api_key.map(str::to_string),
            model: model.to_string(),
            ..ReplicateConfig::default()
        };
        ReplicateClient::new(&config, Client::new())
    }

    fn input() -> InpaintInput {
        InpaintInput {
            image: "data:image/png;base64,AAAA".to_string(),
            mask: "data:image/png;base64,BBBB".to_string(),
            prompt: None,
            params: GenerationParams {
                seed: Some(3),
                ..GenerationParams::default()
            },
        }
    }

    #[test]
    fn output_shapes_are_recognized() {
        assert_eq!(
            EditedImageRef::from_output(&json!("https://cdn.example/out.png")),
            Some(EditedImageRef::Url("https://cdn.example/out.png".to_string()))
        );
        assert_eq!(
            EditedImageRef::from_output(&json!(["data:image/png;base64,QUJD", "other"])),
            Some(EditedImageRef::Inline("data:image/png;base64,QUJD".to_string()))
        );
        assert_eq!(
            EditedImageRef::from_output(&json!({ "image": "http://x/y.png" })),
            Some(EditedImageRef::Url("http://x/y.png".to_string()))
        );
        assert_eq!(
            EditedImageRef::from_output(&json!({ "output": null, "result": "QUJD" })),
            Some(EditedImageRef::Inline("QUJD".to_string()))
        );
    }

    #[test]
    fn unrecognized_output_is_rejected() {
        assert_eq!(EditedImageRef::from_output(&json!(42)), None);
        assert_eq!(EditedImageRef::from_output(&json!([])), None);
        assert_eq!(EditedImageRef::from_output(&json!({ "foo": "bar" })), None);
        assert_eq!(EditedImageRef::from_output(&json!("")), None);
    }

    #[test]
    fn model_name_selects_endpoint() {
        let (url, body) = client("bria/eraser", Some("k")).request_body(&input());
        assert_eq!(url, "https://api.replicate.com/v1/models/bria/eraser/predictions");
        assert_eq!(body["input"]["num_inference_steps"], 50);
        assert_eq!(body["input"]["seed"], 3);
        assert!(body.get("version").is_none());

        let (url, body) = client("bria/eraser:abc123", Some("k")).request_body(&input());
        assert_eq!(url, "https://api.replicate.com/v1/predictions");
        assert_eq!(body["version"], "abc123");
    }

    #[tokio::test]
    async fn unconfigured_client_fails_without_network() {
        let client = client("bria/eraser", None);
        assert!(!client.is_configured());

        let err = client.inpaint(input()).await.unwrap_err();
        assert!(matches!(err, EditorError::ExternalService(ref m) if m.contains("REPLICATE_API_KEY")));
    }
}
