use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TextSource {
    Remote,
    LocalFallback,
}

/// Which tier of the image chain produced the illustration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ImageSource {
    PrimaryRemote,
    SecondaryRemote,
    StaticFallback,
}

impl ImageSource {
    pub fn is_fallback(&self) -> bool {
        !matches!(self, Self::PrimaryRemote)
    }
}

/// Output of one generation request. Superseded, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationResult {
    text: String,
    image_url: String,
    source_of_text: TextSource,
    source_of_image: ImageSource,
}

impl GenerationResult {
    pub fn new(
        text: impl Into<String>,
        image_url: impl Into<String>,
        source_of_text: TextSource,
        source_of_image: ImageSource,
    ) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::EmptyStory);
        }

        Ok(Self {
            text,
            image_url: image_url.into(),
            source_of_text,
            source_of_image,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn image_url(&self) -> &str {
        &self.image_url
    }

    pub fn source_of_text(&self) -> TextSource {
        self.source_of_text
    }

    pub fn source_of_image(&self) -> ImageSource {
        self.source_of_image
    }

    pub fn has_inline_image(&self) -> bool {
        self.image_url.starts_with("data:")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_rejected() {
        let res = GenerationResult::new("  \n", "https://x", TextSource::Remote, ImageSource::PrimaryRemote);
        assert_eq!(res, Err(Error::EmptyStory));
    }

    #[test]
    fn test_fallback_flags() {
        let res = GenerationResult::new(
            "Once upon a time...",
            "data:image/png;base64,AAAA",
            TextSource::Remote,
            ImageSource::PrimaryRemote,
        ).unwrap();
        assert!(res.has_inline_image());
        assert!(!res.source_of_image().is_fallback());
        assert!(ImageSource::StaticFallback.is_fallback());
    }
}
