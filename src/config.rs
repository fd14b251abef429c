//! Decor configuration. Server-side knobs are constants; the model parameters
//! are parsed from a JSON file once at startup

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default tracing filter, overridden by the `RUST_LOG` environment variable
pub const RUST_LOG: &str = "info,actix_web=info";

/// Interface the HTTP server binds to
pub const BIND_HOST: &str = "0.0.0.0";

/// Maximum number of images accepted in one interaction
pub const MAX_IMAGES: usize = 4;

/// Maximum size of a single uploaded image
pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// Decoration drawn behind the title banner
pub const BACKGROUND_IMAGE: &str = "background.png";

/// Gaussian blur applied to the background decoration
pub const BACKGROUND_BLUR_SIGMA: f32 = 3.0;

/// Prefix of the environment variables that override the model config file
pub const MODEL_ENV_PREFIX: &str = "DECOR";

fn default_base_url() -> String {
    "http://localhost:11434".into()
}

/// Parameters for the Ollama model, read from the JSON model config file
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Name of the multimodal model, e.g. `llava`
    pub model: String,

    /// Root URL of the Ollama server
    #[serde(default = "default_base_url")]
    pub base_url: String,

    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub num_ctx: Option<u32>,
    pub num_predict: Option<i32>,
    pub seed: Option<i64>,

    /// System prompt sent with every generation
    pub system: Option<String>,

    /// How long Ollama keeps the model in memory, e.g. `"5m"`
    pub keep_alive: Option<String>,

    /// Give up on a generation after this many seconds. No limit when unset
    pub timeout_secs: Option<u64>,
}

impl ModelConfig {
    /// Parse the model config file, letting `DECOR_*` variables override it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .to_str()
            .with_context(|| format!("model config path {path:?} is not valid UTF-8"))?;

        Config::builder()
            .add_source(File::new(name, FileFormat::Json))
            .add_source(Environment::with_prefix(MODEL_ENV_PREFIX))
            .build()
            .and_then(|c| c.try_deserialize::<ModelConfig>())
            .with_context(|| format!("failed to load model config from {name}"))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
