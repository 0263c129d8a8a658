use log::{debug, info, warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use sst_core::{data_uri, ImageSource, Theme, DEFAULT_FALLBACK_IMAGE};
use crate::config::{ImageApiVariant, ImageBackendConfig};
use crate::error::GenError;

pub const NEGATIVE_PROMPT: &str =
    "scary, dark, violent, inappropriate for children, realistic, photorealistic, 3D render, CGI";

/// Character budget for the story excerpt embedded in the image prompt
const SCENE_BUDGET: usize = 240;
const MAX_CHARACTERS: usize = 3;
const MAX_KEYWORDS: usize = 5;

const CFG_SCALE: u32 = 7;
const RESOLUTION: u32 = 1024;
const STEPS: u32 = 30;
const SAMPLES: u32 = 1;

/// Capitalized words that start sentences rather than name characters
const NOT_NAMES: &[&str] = &[
    "A", "An", "And", "But", "Everyone", "He", "Her", "His", "I", "In", "It", "My", "Oh",
    "On", "Once", "One", "She", "So", "Suddenly", "The", "Their", "Then", "There", "They",
    "This", "That", "We", "What", "When", "You", "End",
];

#[derive(Serialize)]
struct WeightedPrompt<'a> {
    text: &'a str,
    weight: f32,
}

#[derive(Serialize)]
struct TextToImageRequest<'a> {
    text_prompts: Vec<WeightedPrompt<'a>>,
    cfg_scale: u32,
    height: u32,
    width: u32,
    steps: u32,
    samples: u32,
}

#[derive(Deserialize)]
struct TextToImageResponse {
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

#[derive(Deserialize)]
struct Artifact {
    #[serde(default)]
    base64: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub url: String,
    pub source: ImageSource,
}

/// Three-tier illustration client: image generation API, then photo
/// search, then a fixed photo per theme. Always yields a usable URL.
#[derive(Debug, Clone)]
pub struct ImageClient {
    http: reqwest::Client,
    config: ImageBackendConfig,
}

impl ImageClient {
    pub fn new(config: ImageBackendConfig) -> Self {
        info!(
            "Image client configured (variant {:?}, api key present: {})",
            config.variant,
            config.has_api_key()
        );

        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub async fn generate_image(&self, story: &str, theme: &str) -> GeneratedImage {
        let prompt = build_image_prompt(story, theme);
        debug!("Image prompt: {}", prompt);

        match self.primary(&prompt).await {
            Ok(url) => {
                info!("Illustration generated by image API");
                return GeneratedImage {
                    url,
                    source: ImageSource::PrimaryRemote,
                };
            }
            Err(e) => warn!("Image generation failed, trying photo search: {}", e),
        }

        match self.secondary(&prompt).await {
            Ok(url) => {
                info!("Using photo search image: {}", url);
                return GeneratedImage {
                    url,
                    source: ImageSource::SecondaryRemote,
                };
            }
            Err(e) => warn!("Photo search failed, using static theme image: {}", e),
        }

        GeneratedImage {
            url: static_fallback(theme).to_string(),
            source: ImageSource::StaticFallback,
        }
    }

    /// Tier 1. A missing key fails before any request is made.
    async fn primary(&self, prompt: &str) -> Result<String, GenError> {
        let api_key = self.config.api_key().ok_or(GenError::MissingApiKey)?;

        match self.config.variant {
            ImageApiVariant::JsonArtifacts => self.primary_json(prompt, api_key).await,
            ImageApiVariant::Multipart => self.primary_multipart(prompt, api_key).await,
        }
    }

    async fn primary_json(&self, prompt: &str, api_key: &str) -> Result<String, GenError> {
        let body = TextToImageRequest {
            text_prompts: vec![
                WeightedPrompt { text: prompt, weight: 1.0 },
                WeightedPrompt { text: NEGATIVE_PROMPT, weight: -1.0 },
            ],
            cfg_scale: CFG_SCALE,
            height: RESOLUTION,
            width: RESOLUTION,
            steps: STEPS,
            samples: SAMPLES,
        };

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .header(ACCEPT, "application/json")
            .timeout(self.config.request_timeout)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GenError::from_response(response).await);
        }

        let payload: TextToImageResponse = response.json().await?;
        let artifact = payload
            .artifacts
            .into_iter()
            .next()
            .and_then(|a| a.base64)
            .filter(|b| !b.trim().is_empty())
            .ok_or(GenError::MissingArtifact)?;

        debug!("Received inline artifact ({} base64 chars)", artifact.len());
        Ok(data_uri::wrap_base64("image/png", &artifact))
    }

    async fn primary_multipart(&self, prompt: &str, api_key: &str) -> Result<String, GenError> {
        let form = reqwest::multipart::Form::new()
            .text("prompt", prompt.to_string())
            .text("negative_prompt", NEGATIVE_PROMPT)
            .text("output_format", "png");

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .header(ACCEPT, "image/*")
            .timeout(self.config.request_timeout)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GenError::from_response(response).await);
        }

        let mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or("image/png")
            .to_string();

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(GenError::MissingArtifact);
        }

        debug!("Received {} bytes of {}", bytes.len(), mime);
        Ok(data_uri::encode(&mime, &bytes))
    }

    /// Tier 2. Builds a keyword search URL and confirms the endpoint answers.
    async fn secondary(&self, prompt: &str) -> Result<String, GenError> {
        let url = search_url(&self.config.search_url, prompt)?;

        let response = self
            .http
            .head(url.clone())
            .timeout(self.config.request_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GenError::from_response(response).await);
        }

        Ok(url.to_string())
    }
}

/// Tier 3. Cannot fail; unknown themes get the default photo.
pub fn static_fallback(theme: &str) -> &'static str {
    Theme::from_id(theme)
        .map(|t| t.fallback_image_url())
        .unwrap_or(DEFAULT_FALLBACK_IMAGE)
}

/// Child-safe illustration prompt from the opening of the story
pub fn build_image_prompt(story: &str, theme: &str) -> String {
    let subject = match Theme::from_id(theme) {
        Some(t) => t.id().to_string(),
        None if !theme.trim().is_empty() => theme.trim().to_string(),
        None => "a fun day".to_string(),
    };

    let characters = extract_characters(story);
    let cast = if characters.is_empty() {
        "a cheerful group of friends".to_string()
    } else {
        characters.join(", ")
    };

    format!(
        "A colorful, child-friendly illustration for a children's story about {}. \
         Characters: {}. \
         The scene should be bright, cheerful, and suitable for children under 10. \
         Style: cartoon, vibrant colors, simple shapes, no scary elements. \
         Scene: {}",
        subject,
        cast,
        story_excerpt(story, SCENE_BUDGET),
    )
}

/// First one or two non-empty paragraphs, cut to `budget` characters
pub fn story_excerpt(story: &str, budget: usize) -> String {
    let opening = story
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(2)
        .collect::<Vec<_>>()
        .join(" ");

    if opening.chars().count() <= budget {
        return opening;
    }

    let cut: String = opening.chars().take(budget).collect();
    format!("{}...", cut.trim_end())
}

/// Naive proper-noun scan. An empty result is fine; callers use a generic phrase.
pub fn extract_characters(story: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();

    for raw in story.split_whitespace() {
        let word = raw.trim_matches(|c: char| !c.is_alphanumeric());
        let word = word.strip_suffix("'s").unwrap_or(word);

        let mut chars = word.chars();
        let starts_upper = chars.next().is_some_and(char::is_uppercase);
        if !starts_upper || word.chars().count() < 2 || !word.chars().all(char::is_alphabetic) {
            continue;
        }
        if NOT_NAMES.contains(&word) || names.iter().any(|n| n == word) {
            continue;
        }

        names.push(word.to_string());
        if names.len() == MAX_CHARACTERS {
            break;
        }
    }

    names
}

/// Lower-cased, punctuation-free words longer than three characters
pub fn extract_keywords(prompt: &str) -> Vec<String> {
    prompt
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .filter(|w| w.chars().count() > 3)
        .take(MAX_KEYWORDS)
        .map(str::to_string)
        .collect()
}

fn search_url(base: &str, prompt: &str) -> Result<reqwest::Url, GenError> {
    let mut url = reqwest::Url::parse(base).map_err(|e| GenError::InvalidUrl {
        url: base.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(GenError::InvalidUrl {
            url: base.to_string(),
            reason: "search endpoint must be http(s)".into(),
        });
    }

    // Keeps whatever query the configured endpoint already carries
    url.query_pairs_mut()
        .append_pair("w", "800")
        .append_pair("h", "600")
        .append_pair("fit", "crop")
        .append_pair("q", &extract_keywords(prompt).join(","));

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use axum::Router;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::Json;
    use serde_json::{json, Value};
    use crate::test_support::{dead_url, serve};

    const STORY: &str = "Once upon a time, Mia and Leo built a treehouse.\n\n\
                         \"Look!\" said Mia. The treehouse wobbled.\n\nThe end.";

    fn config(endpoint: String, search_url: String, api_key: Option<&str>) -> ImageBackendConfig {
        ImageBackendConfig {
            api_key: api_key.map(str::to_string),
            variant: ImageApiVariant::JsonArtifacts,
            endpoint,
            search_url,
            request_timeout: Duration::from_secs(5),
        }
    }

    fn counting_artifact_server(hits: Arc<AtomicUsize>) -> Router {
        Router::new().route(
            "/generate",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(headers["authorization"], "Bearer test-key");
                    assert_eq!(body["text_prompts"][1]["weight"], json!(-1.0));
                    assert_eq!(body["samples"], json!(1));
                    Json(json!({ "artifacts": [{ "base64": "iVBORw0KGgo=", "finishReason": "SUCCESS" }] }))
                }
            }),
        )
    }

    fn search_server() -> Router {
        Router::new().route("/photo", get(|| async { StatusCode::OK }))
    }

    #[test]
    fn test_prompt_shape() {
        let prompt = build_image_prompt(STORY, "adventure");
        assert!(prompt.contains("children's story about adventure"));
        assert!(prompt.contains("Characters: Mia, Leo"));
        assert!(prompt.contains("cartoon, vibrant colors"));
        assert!(prompt.contains("Scene: Once upon a time, Mia and Leo built a treehouse."));
        assert!(!prompt.contains("The end."));
    }

    #[test]
    fn test_prompt_without_characters() {
        let prompt = build_image_prompt("once upon a time the sun smiled.", "");
        assert!(prompt.contains("a cheerful group of friends"));
        assert!(prompt.contains("about a fun day"));
    }

    #[test]
    fn test_excerpt_budget() {
        let long = "word ".repeat(200);
        let excerpt = story_excerpt(&long, 40);
        assert!(excerpt.ends_with("..."));
        assert!(excerpt.chars().count() <= 43);
        assert_eq!(story_excerpt("\n\n  first  \n\nsecond\nthird", 100), "first second");
    }

    #[test]
    fn test_keywords() {
        let words = extract_keywords("A colorful, child-friendly illustration for a children's story!");
        assert_eq!(words, vec!["colorful", "childfriendly", "illustration", "childrens", "story"]);
        assert!(extract_keywords("a b c").is_empty());
    }

    #[test]
    fn test_static_fallback_per_theme() {
        for theme in Theme::all() {
            assert_eq!(static_fallback(theme.id()), theme.fallback_image_url());
            assert_eq!(static_fallback(theme.id()), static_fallback(theme.id()));
        }
        assert_eq!(static_fallback("volcanoes"), DEFAULT_FALLBACK_IMAGE);
    }

    #[tokio::test]
    async fn test_json_artifact_becomes_data_uri() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve(counting_artifact_server(hits.clone())).await;
        let client = ImageClient::new(config(format!("{base}/generate"), dead_url().await, Some("test-key")));

        let image = client.generate_image(STORY, "adventure").await;
        assert_eq!(image.source, ImageSource::PrimaryRemote);
        assert_eq!(image.url, "data:image/png;base64,iVBORw0KGgo=");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_multipart_binary_becomes_data_uri() {
        let router = Router::new().route(
            "/core",
            post(|headers: HeaderMap, body: Bytes| async move {
                let content_type = headers["content-type"].to_str().unwrap_or_default().to_string();
                assert!(content_type.starts_with("multipart/form-data"));
                assert!(String::from_utf8_lossy(&body).contains("name=\"output_format\""));
                ([("content-type", "image/png")], vec![137u8, 80, 78, 71])
            }),
        );
        let base = serve(router).await;
        let mut conf = config(format!("{base}/core"), dead_url().await, Some("test-key"));
        conf.variant = ImageApiVariant::Multipart;

        let image = ImageClient::new(conf).generate_image(STORY, "magic").await;
        assert_eq!(image.source, ImageSource::PrimaryRemote);
        assert_eq!(image.url, data_uri::encode("image/png", &[137, 80, 78, 71]));
    }

    #[tokio::test]
    async fn test_missing_key_skips_primary() {
        let hits = Arc::new(AtomicUsize::new(0));
        let primary = serve(counting_artifact_server(hits.clone())).await;
        let search = serve(search_server()).await;
        let client = ImageClient::new(config(format!("{primary}/generate"), format!("{search}/photo"), None));

        let image = client.generate_image(STORY, "ocean").await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(image.source, ImageSource::SecondaryRemote);
        assert!(image.url.starts_with(&format!("{search}/photo?w=800&h=600&fit=crop&q=")));
        assert!(image.url.contains("colorful%2Cchildfriendly"));
    }

    #[test]
    fn test_search_url_keeps_existing_query() {
        let url = search_url("https://photos.test/random?client_id=abc", "A dragon flying").unwrap();
        assert_eq!(url.as_str(), "https://photos.test/random?client_id=abc&w=800&h=600&fit=crop&q=dragon%2Cflying");

        let url = search_url("https://photos.test/random", "A dragon").unwrap();
        assert_eq!(url.query(), Some("w=800&h=600&fit=crop&q=dragon"));
    }

    #[tokio::test]
    async fn test_primary_error_falls_to_search() {
        let primary = serve(Router::new().route(
            "/generate",
            post(|| async { (StatusCode::PAYMENT_REQUIRED, "out of credits") }),
        )).await;
        let search = serve(search_server()).await;
        let client = ImageClient::new(config(format!("{primary}/generate"), format!("{search}/photo"), Some("test-key")));

        let image = client.generate_image(STORY, "space").await;
        assert_eq!(image.source, ImageSource::SecondaryRemote);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_failure() {
        let primary = serve(Router::new().route(
            "/generate",
            post(|| async { Json(json!({ "artifacts": [] })) }),
        )).await;
        let client = ImageClient::new(config(format!("{primary}/generate"), dead_url().await, Some("test-key")));

        let image = client.generate_image(STORY, "forest").await;
        assert_eq!(image.source, ImageSource::StaticFallback);
        assert_eq!(image.url, Theme::Forest.fallback_image_url());
    }

    #[tokio::test]
    async fn test_everything_down_uses_static_image() {
        let client = ImageClient::new(config(dead_url().await, dead_url().await, Some("test-key")));
        for theme in Theme::all() {
            let image = client.generate_image(STORY, theme.id()).await;
            assert_eq!(image.source, ImageSource::StaticFallback);
            assert_eq!(image.url, theme.fallback_image_url());
        }

        let image = client.generate_image(STORY, "pirates").await;
        assert_eq!(image.url, DEFAULT_FALLBACK_IMAGE);
    }

    #[tokio::test]
    async fn test_invalid_search_url_uses_static_image() {
        let client = ImageClient::new(config(dead_url().await, "not a url".into(), None));
        let image = client.generate_image(STORY, "school").await;
        assert_eq!(image.source, ImageSource::StaticFallback);
        assert_eq!(image.url, Theme::School.fallback_image_url());
    }
}
