use quick_xml::escape::escape;
use sst_core::{GenerationResult, StoryRequest};

/// Element id of the story container that export captures
pub const STORY_CONTENT_ID: &str = "story-content";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageElement {
    pub src: String,
    pub alt: String,
}

/// Box constraints of the story container as laid out on screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageStyle {
    pub width: u32,
    pub max_width: Option<u32>,
    pub margin: u32,
    pub padding: u32,
}

impl Default for PageStyle {
    fn default() -> Self {
        Self {
            width: 800,
            max_width: Some(640),
            margin: 24,
            padding: 20,
        }
    }
}

/// The rendered story: what the user sees and what export captures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryPage {
    pub id: String,
    pub title: String,
    pub images: Vec<ImageElement>,
    pub paragraphs: Vec<String>,
    pub footer: Option<String>,
    pub style: PageStyle,
    file_stem: String,
}

impl StoryPage {
    pub fn from_generation(request: &StoryRequest, result: &GenerationResult) -> Self {
        let main = request.main_character.trim();

        Self {
            id: STORY_CONTENT_ID.to_string(),
            title: format!("{}'s Silly Story", main),
            images: vec![ImageElement {
                src: result.image_url().to_string(),
                alt: format!("Illustration of {} in {}", main, request.setting.trim()),
            }],
            paragraphs: split_paragraphs(result.text()),
            footer: request.moral().map(|m| format!("Moral: {}", m)),
            style: PageStyle::default(),
            file_stem: request.file_stem(),
        }
    }

    pub fn images(&self) -> &[ImageElement] {
        &self.images
    }

    pub fn file_stem(&self) -> &str {
        &self.file_stem
    }

    /// Width of the container after `max_width` is applied
    pub fn content_width(&self) -> u32 {
        match self.style.max_width {
            Some(max) => self.style.width.min(max),
            None => self.style.width,
        }
    }

    /// Copy with the container's on-screen constraints removed, so a capture
    /// is not clipped to the layout width
    pub fn without_constraints(&self) -> StoryPage {
        let mut clone = self.clone();
        clone.style.max_width = None;
        clone.style.margin = 0;
        clone.style.padding = 0;
        clone
    }

    /// XHTML rendition of the container, used by the vector export fallback
    pub fn to_markup(&self) -> String {
        let mut out = format!("<div id=\"{}\">", escape(&self.id));
        out.push_str(&format!("<h1>{}</h1>", escape(&self.title)));
        for image in &self.images {
            out.push_str(&format!(
                "<img src=\"{}\" alt=\"{}\"/>",
                escape(&image.src),
                escape(&image.alt)
            ));
        }
        for paragraph in &self.paragraphs {
            out.push_str(&format!("<p>{}</p>", escape(paragraph)));
        }
        if let Some(footer) = &self.footer {
            out.push_str(&format!("<p class=\"moral\">{}</p>", escape(footer)));
        }
        out.push_str("</div>");
        out
    }
}

fn split_paragraphs(text: &str) -> Vec<String> {
    let blocks: Vec<String> = text
        .split("\n\n")
        .map(|b| b.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|b| !b.is_empty())
        .collect();

    if blocks.len() > 1 {
        return blocks;
    }

    // Single newlines only: treat every line as its own paragraph.
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
