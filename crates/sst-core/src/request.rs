use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::theme::Theme;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryLength {
    Short,
    #[default]
    Medium,
    Long,
}

impl StoryLength {
    /// Upper bound on story words given to the text backend
    pub fn max_words(&self) -> u32 {
        match self {
            Self::Short => 120,
            Self::Medium => 200,
            Self::Long => 350,
        }
    }

    pub fn paragraphs(&self) -> &'static str {
        match self {
            Self::Short => "2-3",
            Self::Medium => "3-4",
            Self::Long => "5-6",
        }
    }
}

impl std::str::FromStr for StoryLength {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(Self::Short),
            "medium" => Ok(Self::Medium),
            "long" => Ok(Self::Long),
            other => Err(format!("unknown story length '{other}'")),
        }
    }
}

/// Everything the form collects for one story.
///
/// `participants` holds extra named characters next to the main one; the
/// multi-participant form variant fills it and synthesizes `setting`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryRequest {
    pub main_character: String,
    #[serde(default)]
    pub participants: Vec<String>,
    pub setting: String,
    pub theme: String,
    pub moral: Option<String>,
    pub length: Option<StoryLength>,
}

impl StoryRequest {
    pub fn new(
        main_character: impl Into<String>,
        setting: impl Into<String>,
        theme: impl Into<String>,
    ) -> Self {
        Self {
            main_character: main_character.into(),
            participants: Vec::new(),
            setting: setting.into(),
            theme: theme.into(),
            moral: None,
            length: None,
        }
    }

    pub fn with_moral(mut self, moral: impl Into<String>) -> Self {
        self.moral = Some(moral.into());
        self
    }

    pub fn with_length(mut self, length: StoryLength) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_participants<I, S>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.participants = participants.into_iter().map(Into::into).collect();
        self
    }

    /// Check the required fields before any generation is attempted
    pub fn validate(&self) -> Result<()> {
        if self.main_character.trim().is_empty() {
            return Err(Error::MissingField("main character"));
        }
        if self.setting.trim().is_empty() {
            return Err(Error::MissingField("setting"));
        }
        if self.theme.trim().is_empty() {
            return Err(Error::MissingField("theme"));
        }
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn catalog_theme(&self) -> Option<Theme> {
        Theme::from_id(&self.theme)
    }

    pub fn length(&self) -> StoryLength {
        self.length.unwrap_or_default()
    }

    /// Moral text, ignoring blank input
    pub fn moral(&self) -> Option<&str> {
        self.moral.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }

    /// Named participants other than the main character, blanks removed
    pub fn companions(&self) -> Vec<&str> {
        self.participants
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty() && !p.eq_ignore_ascii_case(self.main_character.trim()))
            .collect()
    }

    /// Download file stem derived from the main character's name
    pub fn file_stem(&self) -> String {
        let slug: String = self
            .main_character
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        let slug = slug
            .split('-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-");

        if slug.is_empty() {
            "my-story".to_string()
        } else {
            format!("{slug}-story")
        }
    }
}
