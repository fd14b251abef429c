//! Client for a local Ollama server's `/api/generate` endpoint

use super::{ModelError, ModelLoader, ModelResponse, MultimodalModel};
use crate::config::ModelConfig;
use crate::ingest::EncodedImage;
use crate::question::Query;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::*;

/// Sampling options. Unset fields are left to the model's defaults
#[derive(Debug, Default, Serialize, PartialEq)]
struct Options {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
}

impl Options {
    fn is_empty(&self) -> bool {
        *self == Options::default()
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<&'a str>,
    #[serde(skip_serializing_if = "Options::is_empty")]
    options: Options,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// A multimodal model served by Ollama
#[derive(Debug)]
pub struct OllamaModel {
    config: ModelConfig,
    endpoint: String,
    client: reqwest::Client,
}

impl OllamaModel {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("failed to build the HTTP client")?;
        let endpoint = format!("{}/api/generate", config.base_url.trim_end_matches('/'));
        Ok(OllamaModel {
            config,
            endpoint,
            client,
        })
    }

    fn request<'a>(&'a self, query: &'a Query, images: &'a [EncodedImage]) -> GenerateRequest<'a> {
        let c = &self.config;
        GenerateRequest {
            model: &c.model,
            prompt: query.as_str(),
            images: images.iter().map(|i| i.as_base64()).collect(),
            stream: false,
            system: c.system.as_deref(),
            keep_alive: c.keep_alive.as_deref(),
            options: Options {
                temperature: c.temperature,
                top_p: c.top_p,
                top_k: c.top_k,
                num_ctx: c.num_ctx,
                num_predict: c.num_predict,
                seed: c.seed,
            },
        }
    }
}

#[async_trait]
impl MultimodalModel for OllamaModel {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn generate(
        &self,
        query: &Query,
        images: &[EncodedImage],
    ) -> Result<ModelResponse, ModelError> {
        debug!("POST {} with {} images", self.endpoint, images.len());

        let res = self
            .client
            .post(&self.endpoint)
            .json(&self.request(query, images))
            .send()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        let status = res.status();
        let body = res
            .bytes()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        if !status.is_success() {
            let message = match serde_json::from_slice::<ErrorResponse>(&body) {
                Ok(err) => err.error,
                Err(_) => String::from_utf8_lossy(&body).into_owned(),
            };
            return Err(ModelError::Status {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_slice::<GenerateResponse>(&body)
            .map(|r| ModelResponse(r.response))
            .map_err(|e| ModelError::Decode(e.to_string()))
    }
}

/// Loads an `OllamaModel` from a JSON model config file
#[derive(Debug, Clone)]
pub struct OllamaLoader {
    config: ModelConfig,
}

impl OllamaLoader {
    pub fn new(config: ModelConfig) -> Self {
        OllamaLoader { config }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(OllamaLoader::new(ModelConfig::from_file(path)?))
    }
}

impl ModelLoader for OllamaLoader {
    fn load(&self) -> Result<Arc<dyn MultimodalModel>> {
        info!(
            "loading ollama model {} from {}",
            self.config.model, self.config.base_url
        );
        Ok(Arc::new(OllamaModel::new(self.config.clone())?))
    }

    fn timeout(&self) -> Option<Duration> {
        self.config.timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::test::encoded;
    use crate::question::resolve;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> ModelConfig {
        ModelConfig {
            model: "llava".into(),
            base_url: base_url.into(),
            temperature: None,
            top_p: None,
            top_k: None,
            num_ctx: None,
            num_predict: None,
            seed: None,
            system: None,
            keep_alive: None,
            timeout_secs: None,
        }
    }

    #[test]
    fn test_request_body() {
        let mut c = config("http://localhost:11434/");
        c.temperature = Some(0.5);
        c.keep_alive = Some("5m".into());
        let model = OllamaModel::new(c).unwrap();
        assert_eq!(model.endpoint, "http://localhost:11434/api/generate");

        let images = encoded(&[1, 2]);
        let query = resolve(None, 2);
        let body = serde_json::to_value(model.request(&query, &images)).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "llava",
                "prompt": "Describe the 2 images:",
                "images": [images[0].as_base64(), images[1].as_base64()],
                "stream": false,
                "keep_alive": "5m",
                "options": { "temperature": 0.5 }
            })
        );
    }

    #[test]
    fn test_request_body_without_options() {
        let model = OllamaModel::new(config("http://localhost:11434")).unwrap();
        let images = encoded(&[1]);
        let query = resolve(Some("What color are the walls?"), 1);
        let body = serde_json::to_value(model.request(&query, &images)).unwrap();
        assert!(body.get("options").is_none());
        assert!(body.get("system").is_none());
    }

    #[tokio::test]
    async fn test_generate() {
        let server = MockServer::start().await;
        let images = encoded(&[3]);
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "model": "llava",
                "prompt": "Describe the image:",
                "images": [images[0].as_base64()],
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "llava",
                "response": "A bright living room with a green sofa.",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let model = OllamaModel::new(config(&server.uri())).unwrap();
        let res = model.generate(&resolve(None, 1), &images).await.unwrap();
        assert_eq!(res.as_str(), "A bright living room with a green sofa.");
    }

    #[tokio::test]
    async fn test_generate_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "error": "model 'llava' not found" })),
            )
            .mount(&server)
            .await;

        let model = OllamaModel::new(config(&server.uri())).unwrap();
        let err = model.generate(&resolve(None, 1), &encoded(&[1])).await.unwrap_err();
        match err {
            ModelError::Status { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "model 'llava' not found");
            }
            e => panic!("unexpected error {e:?}"),
        }
    }

    #[tokio::test]
    async fn test_generate_bad_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let model = OllamaModel::new(config(&server.uri())).unwrap();
        let err = model.generate(&resolve(None, 1), &encoded(&[1])).await.unwrap_err();
        assert!(matches!(err, ModelError::Decode(_)));
    }

    #[tokio::test]
    async fn test_unreachable() {
        // Nothing listens on the discard port
        let model = OllamaModel::new(config("http://127.0.0.1:9")).unwrap();
        let err = model.generate(&resolve(None, 1), &encoded(&[1])).await.unwrap_err();
        assert!(matches!(err, ModelError::Request(_)));
    }

    #[test]
    fn test_loader() {
        let mut c = config("http://localhost:11434");
        c.timeout_secs = Some(30);
        let loader = OllamaLoader::new(c);
        assert_eq!(loader.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(loader.load().unwrap().name(), "llava");
    }
}
