//! The multimodal model behind the assistant. A model is loaded once at
//! startup through a `ModelLoader` and invoked through a `ModelClient`, which
//! owns the timeout and cancellation policy of every generation

use crate::ingest::EncodedImage;
use crate::question::Query;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::*;

mod mock;
mod ollama;

pub use mock::{Call, MockModel};
pub use ollama::{OllamaLoader, OllamaModel};

/// The text the model produced for a question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResponse(pub String);

impl ModelResponse {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a generation did not produce a response
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("could not reach the model server: {0}")]
    Request(String),

    #[error("model server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("could not decode the model server response: {0}")]
    Decode(String),

    #[error("the model did not answer within {0:?}")]
    Timeout(Duration),

    #[error("the request was cancelled")]
    Cancelled,

    #[error("{0}")]
    Backend(String),
}

/// A model that answers a text question about a set of images
#[async_trait]
pub trait MultimodalModel: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        query: &Query,
        images: &[EncodedImage],
    ) -> Result<ModelResponse, ModelError>;
}

/// One-time startup step that produces the model handle
pub trait ModelLoader {
    fn load(&self) -> anyhow::Result<Arc<dyn MultimodalModel>>;

    /// How long a single generation may take. No limit by default
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// Invokes the loaded model with the images bound to the question
#[derive(Clone)]
pub struct ModelClient {
    model: Arc<dyn MultimodalModel>,
    timeout: Option<Duration>,
}

impl fmt::Debug for ModelClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelClient")
            .field("model", &self.model.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ModelClient {
    pub fn new(model: Arc<dyn MultimodalModel>) -> Self {
        ModelClient {
            model,
            timeout: None,
        }
    }

    /// Load the model through `loader`. An error here should abort startup
    pub fn load(loader: &dyn ModelLoader) -> anyhow::Result<Self> {
        let model = loader.load()?;
        info!("loaded model {}", model.name());
        Ok(ModelClient::new(model).with_timeout(loader.timeout()))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Run one generation. Ends early with `ModelError::Timeout` when the
    /// timeout elapses, or `ModelError::Cancelled` when `cancel` fires
    #[tracing::instrument(skip(self, images, cancel), fields(model = self.model.name(), images = images.len()))]
    pub async fn invoke(
        &self,
        query: &Query,
        images: &[EncodedImage],
        cancel: &CancellationToken,
    ) -> Result<ModelResponse, ModelError> {
        let generation = self.model.generate(query, images);
        let limited = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, generation)
                    .await
                    .unwrap_or(Err(ModelError::Timeout(limit))),
                None => generation.await,
            }
        };

        let result = tokio::select! {
            res = limited => res,
            _ = cancel.cancelled() => Err(ModelError::Cancelled),
        };

        match &result {
            Ok(res) => debug!("model answered with {} chars", res.0.len()),
            Err(e) => warn!("model invocation failed: {e}"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::test::encoded;
    use crate::question::resolve;

    struct FixedLoader(Option<Duration>);

    impl ModelLoader for FixedLoader {
        fn load(&self) -> anyhow::Result<Arc<dyn MultimodalModel>> {
            Ok(Arc::new(MockModel::new("fixed").with_response("a cozy room")))
        }

        fn timeout(&self) -> Option<Duration> {
            self.0
        }
    }

    struct BrokenLoader;

    impl ModelLoader for BrokenLoader {
        fn load(&self) -> anyhow::Result<Arc<dyn MultimodalModel>> {
            Err(anyhow::anyhow!("no such model"))
        }
    }

    #[tokio::test]
    async fn test_invoke() {
        let mock = Arc::new(MockModel::new("mock").with_response("a cozy room"));
        let client = ModelClient::new(mock.clone());
        let images = encoded(&[1, 2]);
        let query = resolve(None, images.len());

        let res = client
            .invoke(&query, &images, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(res.as_str(), "a cozy room");

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].query, "Describe the 2 images:");
        assert_eq!(calls[0].images, images);
    }

    #[tokio::test]
    async fn test_load() {
        let client = ModelClient::load(&FixedLoader(Some(Duration::from_secs(3)))).unwrap();
        assert_eq!(client.model_name(), "fixed");
        assert_eq!(client.timeout, Some(Duration::from_secs(3)));

        assert!(ModelClient::load(&BrokenLoader).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let mock = MockModel::new("slow")
            .with_response("too late")
            .with_delay(Duration::from_secs(60));
        let client = ModelClient::new(Arc::new(mock)).with_timeout(Some(Duration::from_secs(5)));
        let images = encoded(&[1]);

        let err = client
            .invoke(&resolve(None, 1), &images, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Timeout(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let mock = MockModel::new("slow")
            .with_response("never")
            .with_delay(Duration::from_secs(3600));
        let client = ModelClient::new(Arc::new(mock));
        let images = encoded(&[1]);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = client
            .invoke(&resolve(None, 1), &images, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Cancelled));
    }

    #[tokio::test]
    async fn test_backend_failure() {
        let mock = MockModel::new("down").with_failure("connection refused");
        let client = ModelClient::new(Arc::new(mock));
        let err = client
            .invoke(&resolve(None, 1), &encoded(&[1]), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "connection refused");
    }
}
