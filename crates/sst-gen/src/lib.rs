pub mod config;
pub mod error;
pub mod image;
pub mod probe;
pub mod text;

#[cfg(test)]
mod test_support;

pub use config::{GenConfig, ImageApiVariant, ImageBackendConfig, TextBackendConfig};
pub use error::GenError;
pub use image::{GeneratedImage, ImageClient};
pub use probe::AvailabilityProber;
pub use text::{GeneratedText, TextClient};
