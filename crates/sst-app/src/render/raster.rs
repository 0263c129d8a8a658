use embedded_graphics::mono_font::ascii::{FONT_10X20, FONT_7X14, FONT_7X13_ITALIC};
use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Baseline, Text};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use log::debug;
use crate::page::StoryPage;
use super::canvas::{normalize_for_mono, wrap_text, Canvas};
use super::{LoadedImages, RasterOptions, RenderError, Rasterizer};

/// Viewport used when the caller gives no size override
pub const DEFAULT_VIEWPORT: (u32, u32) = (1024, 768);

const TITLE_LINE: u32 = 26;
const BODY_LINE: u32 = 18;
const BLOCK_GAP: u32 = 14;
const MAX_PICTURE_HEIGHT: u32 = 480;
const PLACEHOLDER_HEIGHT: u32 = 200;

/// Built-in page rasterizer drawing with embedded-graphics mono fonts
#[derive(Debug, Default, Clone)]
pub struct PageRasterizer;

enum Block {
    Text {
        y: u32,
        lines: Vec<String>,
        font: &'static MonoFont<'static>,
        line_height: u32,
    },
    Picture {
        y: u32,
        bitmap: RgbaImage,
    },
    Placeholder {
        y: u32,
        height: u32,
        alt: String,
    },
}

struct Plan {
    left: u32,
    inner_width: u32,
    width: u32,
    height: u32,
    blocks: Vec<Block>,
}

impl PageRasterizer {
    fn plan(&self, page: &StoryPage, images: &LoadedImages) -> Plan {
        let style = &page.style;
        let inner_width = page.content_width().saturating_sub(style.padding * 2).max(1);
        let left = style.margin + style.padding;
        let mut y = style.margin + style.padding;
        let mut blocks = Vec::new();

        let mut push_text = |y: &mut u32, text: &str, font: &'static MonoFont<'static>, line_height: u32| {
            let chars = (inner_width / font.character_size.width).max(1) as usize;
            let lines = wrap_text(&normalize_for_mono(text), chars);
            if lines.is_empty() {
                return;
            }
            let height = lines.len() as u32 * line_height;
            blocks.push(Block::Text { y: *y, lines, font, line_height });
            *y += height + BLOCK_GAP;
        };

        push_text(&mut y, &page.title, &FONT_10X20, TITLE_LINE);

        let mut pictures = Vec::new();
        for element in page.images() {
            match images.get(&element.src) {
                Some(img) => {
                    let fitted = img.resize(inner_width, MAX_PICTURE_HEIGHT, FilterType::Triangle).to_rgba8();
                    let height = fitted.height();
                    pictures.push(Block::Picture { y, bitmap: fitted });
                    y += height + BLOCK_GAP;
                }
                None => {
                    pictures.push(Block::Placeholder { y, height: PLACEHOLDER_HEIGHT, alt: element.alt.clone() });
                    y += PLACEHOLDER_HEIGHT + BLOCK_GAP;
                }
            }
        }

        for paragraph in &page.paragraphs {
            push_text(&mut y, paragraph, &FONT_7X14, BODY_LINE);
        }
        if let Some(footer) = &page.footer {
            push_text(&mut y, footer, &FONT_7X13_ITALIC, BODY_LINE);
        }
        blocks.extend(pictures);

        let height = y.saturating_sub(BLOCK_GAP) + style.padding + style.margin;
        let width = page.content_width() + style.margin * 2;

        Plan { left, inner_width, width, height, blocks }
    }
}

impl Rasterizer for PageRasterizer {
    fn name(&self) -> &str {
        "page-rasterizer"
    }

    fn measure(&self, page: &StoryPage, images: &LoadedImages) -> (u32, u32) {
        let plan = self.plan(page, images);
        (plan.width, plan.height)
    }

    fn rasterize(
        &self,
        page: &StoryPage,
        images: &LoadedImages,
        options: &RasterOptions,
    ) -> Result<RgbaImage, RenderError> {
        let plan = self.plan(page, images);
        let width = options.window_width.unwrap_or(DEFAULT_VIEWPORT.0);
        let height = options.window_height.unwrap_or(DEFAULT_VIEWPORT.1);
        if width == 0 || height == 0 {
            return Err(RenderError::Empty(format!("capture area is {}x{}", width, height)));
        }

        let [r, g, b] = options.background;
        let mut buf = RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255]));

        for block in &plan.blocks {
            match block {
                Block::Picture { y, bitmap } => {
                    let x = plan.left + (plan.inner_width.saturating_sub(bitmap.width())) / 2;
                    imageops::overlay(&mut buf, bitmap, x as i64, *y as i64);
                }
                Block::Placeholder { y, height, alt } => {
                    let mut canvas = Canvas::new(&mut buf);
                    let Ok(_) = Rectangle::new(
                        Point::new(plan.left as i32, *y as i32),
                        Size::new(plan.inner_width, *height),
                    )
                    .into_styled(PrimitiveStyle::with_fill(Rgb888::new(230, 230, 235)))
                    .draw(&mut canvas);

                    let style = MonoTextStyle::new(&FONT_7X14, Rgb888::new(110, 110, 120));
                    let origin = Point::new(plan.left as i32 + 8, (*y + height / 2) as i32);
                    let Ok(_) = Text::with_baseline(&normalize_for_mono(alt), origin, style, Baseline::Middle)
                        .draw(&mut canvas);
                }
                Block::Text { y, lines, font, line_height } => {
                    let mut canvas = Canvas::new(&mut buf);
                    let style = MonoTextStyle::new(*font, Rgb888::BLACK);
                    for (i, line) in lines.iter().enumerate() {
                        let origin = Point::new(plan.left as i32, (*y + i as u32 * line_height) as i32);
                        let Ok(_) = Text::with_baseline(line, origin, style, Baseline::Top).draw(&mut canvas);
                    }
                }
            }
        }

        debug!(
            "Rasterized page {}x{} (content {}x{}) at scale {}",
            width, height, plan.width, plan.height, options.scale
        );

        if options.scale > 1 {
            buf = imageops::resize(&buf, width * options.scale, height * options.scale, FilterType::Nearest);
        }

        Ok(buf)
    }
}
