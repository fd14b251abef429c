use super::{ModelError, ModelResponse, MultimodalModel};
use crate::ingest::EncodedImage;
use crate::question::Query;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// A recorded call to a `MockModel`
#[derive(Debug, Clone)]
pub struct Call {
    pub query: String,
    pub images: Vec<EncodedImage>,
}

/// A scripted model for tests and offline demos. Without a scripted response
/// it echoes the question and the number of images
pub struct MockModel {
    name: String,
    response: Option<String>,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<Call>>,
}

impl MockModel {
    pub fn new(name: impl Into<String>) -> Self {
        MockModel {
            name: name.into(),
            response: None,
            failure: None,
            delay: None,
            calls: Mutex::new(vec![]),
        }
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MultimodalModel for MockModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        query: &Query,
        images: &[EncodedImage],
    ) -> Result<ModelResponse, ModelError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(Call {
                query: query.to_string(),
                images: images.to_vec(),
            });
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = &self.failure {
            return Err(ModelError::Backend(message.clone()));
        }

        Ok(ModelResponse(match &self.response {
            Some(res) => res.clone(),
            None => format!("{} ({} images)", query, images.len()),
        }))
    }
}
