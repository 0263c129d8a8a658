//! Rendering capabilities: page to bitmap, bitmap to document.

mod canvas;
mod degraded;
mod pdf;
mod raster;

use std::collections::HashMap;
use image::{DynamicImage, RgbaImage};
use thiserror::Error;
use crate::page::StoryPage;

pub use degraded::{rasterize_degraded, vector_wrapper};
pub use pdf::PdfAssembler;
pub use raster::PageRasterizer;

/// Decoded `<img>` sources, keyed by `src`. Missing keys failed to load.
pub type LoadedImages = HashMap<String, DynamicImage>;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Nothing to draw: {0}")]
    Empty(String),

    #[error("Invalid vector wrapper: {0}")]
    Vector(String),
}

/// Capture settings handed to a [`Rasterizer`]
#[derive(Debug, Clone, PartialEq)]
pub struct RasterOptions {
    /// Device pixel ratio of the capture
    pub scale: u32,
    /// Fetch images from other origins
    pub use_cors: bool,
    /// Keep images whose response does not declare an image type
    pub allow_taint: bool,
    pub background: [u8; 3],
    /// Overrides of the capture viewport; `None` uses the default viewport
    pub window_width: Option<u32>,
    pub window_height: Option<u32>,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            scale: 2,
            use_cors: true,
            allow_taint: true,
            background: [255, 255, 255],
            window_width: None,
            window_height: None,
        }
    }
}

/// Page geometry for assembled documents
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocumentLayout {
    /// Page width in points; height follows the bitmap's aspect ratio
    pub page_width_pt: f32,
    pub jpeg_quality: u8,
}

impl Default for DocumentLayout {
    fn default() -> Self {
        // US letter width
        Self {
            page_width_pt: 612.0,
            jpeg_quality: 95,
        }
    }
}

pub trait Rasterizer: Send + Sync {
    fn name(&self) -> &str;

    /// Full scroll size of the page at scale 1
    fn measure(&self, page: &StoryPage, images: &LoadedImages) -> (u32, u32);

    fn rasterize(
        &self,
        page: &StoryPage,
        images: &LoadedImages,
        options: &RasterOptions,
    ) -> Result<RgbaImage, RenderError>;
}

pub trait DocumentAssembler: Send + Sync {
    fn name(&self) -> &str;

    /// Encode `bitmap` as a single-page document
    fn assemble(&self, bitmap: &RgbaImage, layout: &DocumentLayout) -> Result<Vec<u8>, RenderError>;
}
