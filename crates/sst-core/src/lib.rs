pub mod error;
pub mod data_uri;
mod request;
mod result;
mod theme;

pub use request::{StoryLength, StoryRequest};
pub use result::{GenerationResult, ImageSource, TextSource};
pub use theme::{Theme, DEFAULT_FALLBACK_IMAGE};
