use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sst_core::{StoryRequest, TextSource};
use crate::config::TextBackendConfig;
use crate::error::GenError;

const DEFAULT_MORAL: &str = "being kind and brave makes every day more fun";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedText {
    pub text: String,
    pub source: TextSource,
}

/// Client for the local text backend. Never fails: every error becomes
/// the templated story built from the same request.
#[derive(Debug, Clone)]
pub struct TextClient {
    http: reqwest::Client,
    config: TextBackendConfig,
}

impl TextClient {
    pub fn new(config: TextBackendConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Generate the story text. With `backend_available == false` the remote
    /// call is skipped entirely.
    pub async fn generate_text(&self, req: &StoryRequest, backend_available: bool) -> GeneratedText {
        if !backend_available {
            info!("Text backend marked unavailable, using templated story");
            return Self::local(req);
        }

        match self.request_story(req).await {
            Ok(text) => {
                info!("Story received from text backend ({} chars)", text.len());
                GeneratedText {
                    text,
                    source: TextSource::Remote,
                }
            }
            Err(e) => {
                warn!("Text generation failed, using templated story: {}", e);
                Self::local(req)
            }
        }
    }

    fn local(req: &StoryRequest) -> GeneratedText {
        GeneratedText {
            text: template_story(req),
            source: TextSource::LocalFallback,
        }
    }

    async fn request_story(&self, req: &StoryRequest) -> Result<String, GenError> {
        let prompt = build_prompt(req);
        let url = self.config.generate_url();
        debug!("Sending story prompt to {} with model {}", url, self.config.model);

        let response = self
            .http
            .post(&url)
            .timeout(self.config.generate_timeout)
            .json(&GenerateRequest {
                model: &self.config.model,
                prompt: &prompt,
                stream: false,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GenError::from_response(response).await);
        }

        let body: GenerateResponse = response.json().await?;
        match body.response {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(GenError::EmptyPayload),
        }
    }
}

/// Natural-language prompt for the text backend
pub fn build_prompt(req: &StoryRequest) -> String {
    let length = req.length();
    let companions = req.companions();

    let mut prompt = format!(
        "Create a short, funny children's story (max {} words) that is easy to read and understand \
         for children under 10 years old. Use simple words and short sentences.\n\n\
         - Main character: {}\n",
        length.max_words(),
        req.main_character.trim(),
    );
    if !companions.is_empty() {
        prompt.push_str(&format!("- Friends in the story: {}\n", companions.join(", ")));
    }
    prompt.push_str(&format!("- Setting: {}\n", req.setting.trim()));
    prompt.push_str(&format!("- Theme: {}\n", req.theme.trim()));
    if let Some(moral) = req.moral() {
        prompt.push_str(&format!("- Moral: {}\n", moral));
    }

    prompt.push_str(&format!(
        "\nThe story should:\n\
         - Use simple words that a child under 10 can understand\n\
         - Have short, clear sentences\n\
         - Include lots of fun and silly moments\n\
         - Be about {} paragraphs long\n\
         - Have a clear beginning, middle, and end\n\
         - Include some dialogue to make it more engaging\n\
         - Use repetition and simple patterns that children enjoy\n\
         - Avoid scary or complex themes\n\n\
         Make it extra silly and fun!",
        length.paragraphs(),
    ));

    prompt
}

/// Deterministic story built only from the request
pub fn template_story(req: &StoryRequest) -> String {
    let main = req.main_character.trim();
    let setting = req.setting.trim();
    let moral = req.moral().unwrap_or(DEFAULT_MORAL);
    let adventure = match req.catalog_theme() {
        Some(theme) => theme.story_phrase().to_string(),
        None => format!("a funny adventure all about {}", req.theme.trim()),
    };

    let companions = req.companions();
    match companions.split_first() {
        None => format!(
            "Once upon a time, there was a {main} who lived in {setting}.\n\n\
             One sunny morning, {main} set off on {adventure}. \"This is going to be the silliest day ever!\" {main} giggled.\n\n\
             Things got wobbly and wiggly, but {main} kept smiling and tried again, and again, and again!\n\n\
             In the end, {main} learned that {moral}. Everyone laughed and had a great time! The end."
        ),
        Some((helper, _)) => {
            let group = join_names(main, &companions);
            format!(
                "Once upon a time, {group} lived in {setting}.\n\n\
                 One sunny morning, the friends set off on {adventure}. \"This is going to be the silliest day ever!\" {main} giggled.\n\n\
                 When everything got wobbly and wiggly, {helper} had a wonderful idea and showed everyone how to try again, and again, and again!\n\n\
                 In the end, {group} learned that {moral}. Everyone laughed and had a great time! The end."
            )
        }
    }
}

fn join_names(main: &str, companions: &[&str]) -> String {
    let mut names = Vec::with_capacity(companions.len() + 1);
    names.push(main);
    names.extend_from_slice(companions);

    match names.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{} and {}", rest.join(", "), last),
        _ => main.to_string(),
    }
}
