use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use anyhow::Context;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "granite3.3";
pub const STABILITY_JSON_URL: &str =
    "https://api.stability.ai/v1/generation/stable-diffusion-xl-1024-v1-0/text-to-image";
pub const STABILITY_MULTIPART_URL: &str =
    "https://api.stability.ai/v2beta/stable-image/generate/core";
pub const DEFAULT_IMAGE_SEARCH_URL: &str =
    "https://images.unsplash.com/photo-1488751045188-3c55bbf9a3fa";

#[derive(Debug, Clone)]
pub struct TextBackendConfig {
    pub base_url: String,
    pub model: String,
    pub probe_timeout: Duration,
    /// Upper bound on one `/api/generate` call
    pub generate_timeout: Duration,
}

impl TextBackendConfig {
    pub fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }

    pub fn health_url(&self) -> String {
        format!("{}/api/tags", self.base_url.trim_end_matches('/'))
    }
}

impl Default for TextBackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            probe_timeout: Duration::from_secs(2),
            generate_timeout: Duration::from_secs(120),
        }
    }
}

/// Request shape of the primary image API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageApiVariant {
    /// JSON body with weighted text prompts, JSON artifacts back
    JsonArtifacts,
    /// Multipart form fields, raw image bytes back
    Multipart,
}

impl ImageApiVariant {
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::JsonArtifacts => STABILITY_JSON_URL,
            Self::Multipart => STABILITY_MULTIPART_URL,
        }
    }
}

impl FromStr for ImageApiVariant {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "artifacts" => Ok(Self::JsonArtifacts),
            "multipart" | "form" => Ok(Self::Multipart),
            other => anyhow::bail!("unknown image API variant '{}'", other),
        }
    }
}

#[derive(Clone)]
pub struct ImageBackendConfig {
    pub api_key: Option<String>,
    pub variant: ImageApiVariant,
    pub endpoint: String,
    pub search_url: String,
    pub request_timeout: Duration,
}

impl ImageBackendConfig {
    /// The configured secret, if it is actually usable
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }
}

impl Default for ImageBackendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            variant: ImageApiVariant::JsonArtifacts,
            endpoint: STABILITY_JSON_URL.to_string(),
            search_url: DEFAULT_IMAGE_SEARCH_URL.to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

// Keep the secret out of logs.
impl fmt::Debug for ImageBackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBackendConfig")
            .field("api_key", &self.api_key().map(|k| format!("<{} chars>", k.len())))
            .field("variant", &self.variant)
            .field("endpoint", &self.endpoint)
            .field("search_url", &self.search_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenConfig {
    pub text: TextBackendConfig,
    pub image: ImageBackendConfig,
}

impl GenConfig {
    /// Read `.env` if there is one, then the process environment
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let text = TextBackendConfig {
            base_url: env::var("OLLAMA_URL").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string()),
            model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_OLLAMA_MODEL.to_string()),
            ..TextBackendConfig::default()
        };

        let variant: ImageApiVariant = env::var("STABILITY_API_VARIANT")
            .unwrap_or_else(|_| "json".to_string())
            .parse()
            .context("STABILITY_API_VARIANT must be 'json' or 'multipart'")?;

        let image = ImageBackendConfig {
            api_key: env::var("STABILITY_API_KEY").ok(),
            variant,
            endpoint: env::var("STABILITY_API_URL")
                .unwrap_or_else(|_| variant.default_endpoint().to_string()),
            search_url: env::var("IMAGE_SEARCH_URL")
                .unwrap_or_else(|_| DEFAULT_IMAGE_SEARCH_URL.to_string()),
            ..ImageBackendConfig::default()
        };

        Ok(Self { text, image })
    }
}
