//! The assistant pipeline: ingest the uploads, resolve the question, and
//! answer it through the response cache

use crate::cache::{CacheKey, ResponseCache};
use crate::ingest::{self, EncodedImage, UploadedImage, ValidationError};
use crate::model::{ModelClient, ModelError, ModelResponse};
use crate::question::{self, Query};
use tokio_util::sync::CancellationToken;
use tracing::*;

/// A validated interaction, ready to be answered
#[derive(Debug, Clone)]
pub struct Prepared {
    pub images: Vec<EncodedImage>,
    pub query: Query,
    pub key: CacheKey,
}

/// The model's answer and whether it came from the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub response: ModelResponse,
    pub cached: bool,
}

#[derive(Debug)]
pub struct Assistant {
    client: ModelClient,
    cache: ResponseCache,
}

impl Assistant {
    pub fn new(client: ModelClient) -> Self {
        Assistant {
            client,
            cache: ResponseCache::new(),
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Ingest the uploads and resolve the question. `Ok(None)` means there is
    /// nothing to ask about yet
    pub fn prepare(
        &self,
        uploads: Vec<UploadedImage>,
        typed: Option<&str>,
    ) -> Result<Option<Prepared>, ValidationError> {
        let images = match ingest::ingest(uploads)? {
            Some(images) => images,
            None => return Ok(None),
        };
        let query = question::resolve(typed, images.len());
        let key = CacheKey::new(&query, &images);
        Ok(Some(Prepared { images, query, key }))
    }

    pub fn is_cached(&self, prepared: &Prepared) -> bool {
        self.cache.contains(&prepared.key)
    }

    /// Answer from the cache, or invoke the model and remember its response.
    /// Failures are not cached
    #[tracing::instrument(skip_all, fields(key = ?prepared.key))]
    pub async fn answer(
        &self,
        prepared: &Prepared,
        cancel: &CancellationToken,
    ) -> Result<Answer, ModelError> {
        if let Some(response) = self.cache.get(&prepared.key) {
            return Ok(Answer {
                response,
                cached: true,
            });
        }

        let response = self
            .client
            .invoke(&prepared.query, &prepared.images, cancel)
            .await?;
        self.cache.insert(prepared.key, response.clone());
        info!("cached a new response ({} entries)", self.cache.len());

        Ok(Answer {
            response,
            cached: false,
        })
    }
}
