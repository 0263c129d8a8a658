//! PNG and PDF export of the rendered story page.

use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use anyhow::{bail, Context};
use futures::future::join_all;
use image::{DynamicImage, ImageFormat, RgbaImage};
use log::{debug, info, warn};
use reqwest::header::CONTENT_TYPE;
use sst_core::data_uri;
use crate::error::AppError;
use crate::loader::{Capability, LibraryLoader, Readiness};
use crate::page::StoryPage;
use crate::render::{
    rasterize_degraded, DocumentAssembler, DocumentLayout, LoadedImages, RasterOptions, Rasterizer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Pdf,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Pdf => "pdf",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Pdf => "application/pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Png => "PNG",
            Self::Pdf => "PDF",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Download target
    pub out_dir: PathBuf,
    /// Pause between image loading and capture
    pub settle_delay: Duration,
    /// Fetch attempts per remote image
    pub image_attempts: u32,
    pub image_backoff: Duration,
    pub image_timeout: Duration,
    pub raster: RasterOptions,
    pub document: DocumentLayout,
    /// Paint a text-only capture when the rasterizer failed every tier
    pub degraded_fallback: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("outputs"),
            settle_delay: Duration::from_millis(1000),
            image_attempts: 2,
            image_backoff: Duration::from_millis(500),
            image_timeout: Duration::from_secs(15),
            raster: RasterOptions::default(),
            document: DocumentLayout::default(),
            degraded_fallback: true,
        }
    }
}

pub struct ExportPipeline {
    loader: Arc<LibraryLoader>,
    http: reqwest::Client,
    config: ExportConfig,
}

impl ExportPipeline {
    pub fn new(loader: Arc<LibraryLoader>, config: ExportConfig) -> Self {
        Self {
            loader,
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub async fn export(&self, page: &StoryPage, format: ExportFormat) -> Result<PathBuf, AppError> {
        match format {
            ExportFormat::Png => self.export_image(page).await,
            ExportFormat::Pdf => self.export_pdf(page).await,
        }
    }

    /// Capture the page and write it as a full quality PNG
    pub async fn export_image(&self, page: &StoryPage) -> Result<PathBuf, AppError> {
        let bitmap = self.capture(page).await?;

        let mut png = Cursor::new(Vec::new());
        bitmap.write_to(&mut png, ImageFormat::Png)?;

        self.write(page, ExportFormat::Png, &png.into_inner()).await
    }

    /// Capture the page and write it as a one-page PDF
    pub async fn export_pdf(&self, page: &StoryPage) -> Result<PathBuf, AppError> {
        let assembler = self.assembler()?;
        let bitmap = self.capture(page).await?;

        let pdf = assembler.assemble(&bitmap, &self.config.document)?;
        self.write(page, ExportFormat::Pdf, &pdf).await
    }

    async fn capture(&self, page: &StoryPage) -> Result<RgbaImage, AppError> {
        let rasterizer = match self.rasterizer() {
            Ok(rasterizer) => rasterizer,
            Err(AppError::CapabilityUnavailable { reason, .. }) if self.config.degraded_fallback => {
                warn!("Rasterizer unavailable ({}), falling back to vector capture", reason);
                return Ok(rasterize_degraded(page)?);
            }
            Err(e) => return Err(e),
        };

        let target = page.without_constraints();
        let images = self.wait_for_images(&target).await;

        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }

        // Capture the full scroll size, not the default viewport
        let (width, height) = rasterizer.measure(&target, &images);
        let options = RasterOptions {
            window_width: Some(width),
            window_height: Some(height),
            ..self.config.raster.clone()
        };
        debug!("Capturing {} at {}x{} with {}", target.id, width, height, rasterizer.name());

        Ok(rasterizer.rasterize(&target, &images, &options)?)
    }

    fn rasterizer(&self) -> Result<Arc<dyn Rasterizer>, AppError> {
        self.loader
            .rasterizer()
            .ok_or_else(|| self.unavailable(Capability::Rasterizer))
    }

    fn assembler(&self) -> Result<Arc<dyn DocumentAssembler>, AppError> {
        self.loader
            .assembler()
            .ok_or_else(|| self.unavailable(Capability::DocumentAssembler))
    }

    fn unavailable(&self, capability: Capability) -> AppError {
        let state = self.loader.state(capability);
        match state.readiness {
            Readiness::Failed => AppError::CapabilityUnavailable {
                capability,
                reason: state.last_error.unwrap_or_else(|| "every load tier failed".into()),
            },
            readiness => AppError::NotReady { capability, readiness },
        }
    }

    /// Resolve every picture on the page. Load and error both count as done;
    /// failed sources are simply missing from the result.
    pub async fn wait_for_images(&self, page: &StoryPage) -> LoadedImages {
        let mut sources: Vec<&str> = page.images().iter().map(|i| i.src.as_str()).collect();
        sources.sort_unstable();
        sources.dedup();

        let loads = sources.iter().map(|src| async move { (*src, self.load_image(src).await) });

        join_all(loads)
            .await
            .into_iter()
            .filter_map(|(src, img)| img.map(|img| (src.to_string(), img)))
            .collect()
    }

    async fn load_image(&self, src: &str) -> Option<DynamicImage> {
        if data_uri::is_data_uri(src) {
            let decoded = data_uri::decode(src)
                .map_err(anyhow::Error::from)
                .and_then(|(_, bytes)| image::load_from_memory(&bytes).context("undecodable inline image"));
            return match decoded {
                Ok(img) => Some(img),
                Err(e) => {
                    warn!("Inline image skipped: {:#}", e);
                    None
                }
            };
        }

        if !self.config.raster.use_cors {
            warn!("Skipping cross-origin image {}", src);
            return None;
        }

        let attempts = self.config.image_attempts.max(1);
        for attempt in 1..=attempts {
            match self.fetch_image(src).await {
                Ok(img) => return Some(img),
                Err(e) => warn!("Image {} attempt {}/{} failed: {:#}", src, attempt, attempts, e),
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.image_backoff * attempt).await;
            }
        }
        None
    }

    async fn fetch_image(&self, url: &str) -> anyhow::Result<DynamicImage> {
        let resp = self
            .http
            .get(url)
            .timeout(self.config.image_timeout)
            .send()
            .await
            .context("request failed")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("server answered {}", status);
        }

        let is_image = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("image/"));
        if !is_image && !self.config.raster.allow_taint {
            bail!("response is not declared as an image");
        }

        let bytes = resp.bytes().await.context("body could not be read")?;
        image::load_from_memory(&bytes).context("undecodable image")
    }

    async fn write(&self, page: &StoryPage, format: ExportFormat, bytes: &[u8]) -> Result<PathBuf, AppError> {
        let path = export_path(&self.config.out_dir, page.file_stem(), format);
        tokio::fs::create_dir_all(&self.config.out_dir).await?;
        tokio::fs::write(&path, bytes).await?;

        info!("Exported {} ({}, {} bytes) to {}", format, format.mime(), bytes.len(), path.display());
        Ok(path)
    }
}

pub fn export_path(out_dir: &Path, file_stem: &str, format: ExportFormat) -> PathBuf {
    out_dir.join(format!("{}.{}", file_stem, format.extension()))
}
