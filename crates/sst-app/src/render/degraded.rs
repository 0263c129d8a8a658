//! Last-resort export path: wrap the page markup in an SVG `foreignObject`,
//! load it back through a data URI and paint only its text. Pictures are lost.

use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};
use image::{Rgba, RgbaImage};
use log::warn;
use quick_xml::escape::unescape;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use sst_core::data_uri;
use crate::page::StoryPage;
use super::canvas::{normalize_for_mono, wrap_text, Canvas};
use super::RenderError;

const LINE_HEIGHT: u32 = 12;
const INSET: u32 = 10;

/// SVG document embedding the page as XHTML
pub fn vector_wrapper(page: &StoryPage, width: u32, height: u32) -> String {
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\">\
         <foreignObject width=\"100%\" height=\"100%\">\
         <div xmlns=\"http://www.w3.org/1999/xhtml\" style=\"background:white;width:{w}px\">{body}</div>\
         </foreignObject></svg>",
        w = width,
        h = height,
        body = page.to_markup(),
    )
}

/// Paint the page text at scale 1 on white
pub fn rasterize_degraded(page: &StoryPage) -> Result<RgbaImage, RenderError> {
    let width = page.content_width().max(1);
    let chars = (width.saturating_sub(INSET * 2) / FONT_6X10.character_size.width).max(1) as usize;

    // Height is only known after wrapping, so size the wrapper from the first pass
    let lines = wrapped_lines(&markup_text(&page.to_markup())?, chars);
    let height = lines.len() as u32 * LINE_HEIGHT + INSET * 2;

    let uri = data_uri::encode("image/svg+xml", vector_wrapper(page, width, height).as_bytes());
    let (mime, bytes) = data_uri::decode(&uri).map_err(|e| RenderError::Vector(e.to_string()))?;
    if mime != "image/svg+xml" {
        return Err(RenderError::Vector(format!("unexpected mime type {}", mime)));
    }
    let svg = String::from_utf8(bytes).map_err(|e| RenderError::Vector(e.to_string()))?;
    if !svg.contains("<foreignObject") {
        return Err(RenderError::Vector("wrapper lost its foreignObject".into()));
    }

    let lines = wrapped_lines(&markup_text(&svg)?, chars);
    if lines.is_empty() {
        return Err(RenderError::Empty("page has no text".into()));
    }
    warn!("Using degraded vector export: {} lines of text, no pictures", lines.len());

    let mut buf = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    let mut canvas = Canvas::new(&mut buf);
    let style = MonoTextStyle::new(&FONT_6X10, Rgb888::BLACK);
    for (i, line) in lines.iter().enumerate() {
        let origin = Point::new(INSET as i32, (INSET + i as u32 * LINE_HEIGHT) as i32);
        let Ok(_) = Text::with_baseline(line, origin, style, Baseline::Top).draw(&mut canvas);
    }

    Ok(buf)
}

fn wrapped_lines(text: &str, chars: usize) -> Vec<String> {
    text.lines()
        .flat_map(|block| wrap_text(&normalize_for_mono(block), chars))
        .collect()
}

/// Text content of XHTML markup; block-level tags become line breaks
fn markup_text(markup: &str) -> Result<String, RenderError> {
    let mut reader = Reader::from_str(markup);
    reader.config_mut().trim_text(false);
    let mut out = String::new();
    let mut entity_buf = String::with_capacity(16);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => block_break(&mut out, e.local_name().as_ref()),
            Ok(Event::End(e)) => block_break(&mut out, e.local_name().as_ref()),
            Ok(Event::Text(e)) => {
                let text = e.decode().map_err(|err| RenderError::Vector(format!("text decode: {:?}", err)))?;
                out.push_str(&text);
            }
            Ok(Event::GeneralRef(e)) => {
                let name = e.decode().map_err(|err| RenderError::Vector(format!("entity decode: {:?}", err)))?;
                entity_buf.clear();
                entity_buf.push('&');
                entity_buf.push_str(&name);
                entity_buf.push(';');
                let resolved = unescape(&entity_buf).map_err(|err| RenderError::Vector(format!("entity unescape: {:?}", err)))?;
                out.push_str(&resolved);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(RenderError::Vector(format!(
                    "markup error at {}: {:?}",
                    reader.buffer_position(),
                    err
                )));
            }
        }
    }
    Ok(out)
}

fn block_break(out: &mut String, tag: &[u8]) {
    if matches!(tag, b"p" | b"h1" | b"div" | b"br") && !out.ends_with('\n') {
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sst_core::{GenerationResult, ImageSource, StoryRequest, TextSource};

    fn page(text: &str) -> StoryPage {
        let req = StoryRequest::new("Mia", "a treehouse", "adventure");
        let res = GenerationResult::new(text, "https://img/x.png", TextSource::Remote, ImageSource::StaticFallback).unwrap();
        StoryPage::from_generation(&req, &res)
    }

    #[test]
    fn test_wrapper_embeds_markup() {
        let page = page("Hello there.");
        let svg = vector_wrapper(&page, 640, 300);
        assert!(svg.starts_with("<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"640\" height=\"300\">"));
        assert!(svg.contains("<foreignObject"));
        assert!(svg.contains("<div id=\"story-content\">"));
        assert!(svg.contains("<p>Hello there.</p>"));
    }

    #[test]
    fn test_markup_text() {
        let text = markup_text("<div><h1>Title</h1><img src=\"a\" alt=\"b\"/><p>Tom &amp; Jerry</p><p>Two</p></div>").unwrap();
        let lines: Vec<&str> = text.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(lines, vec!["Title", "Tom & Jerry", "Two"]);
    }

    #[test]
    fn test_markup_text_resolves_character_references() {
        let text = markup_text("<p>caf&#233; &lt;3 &quot;hi&quot;</p>").unwrap();
        assert_eq!(text.trim(), "caf\u{e9} <3 \"hi\"");
    }

    #[test]
    fn test_markup_text_rejects_broken_markup() {
        assert!(matches!(markup_text("<div><p>open</div>"), Err(RenderError::Vector(_))));
    }

    #[test]
    fn test_escaped_page_text_survives_degraded_path() {
        let page = page("Tom & \"Jerry\" <3");
        let text = markup_text(&page.to_markup()).unwrap();
        assert!(text.lines().any(|l| l == "Tom & \"Jerry\" <3"));
    }

    #[test]
    fn test_degraded_draws_text_only() {
        let page = page("Once upon a time.\n\nThe end.");
        let bitmap = rasterize_degraded(&page).unwrap();
        assert_eq!(bitmap.width(), page.content_width());
        assert!(bitmap.pixels().any(|p| p.0 == [0, 0, 0, 255]));
        assert!(bitmap.pixels().all(|p| p[0] == p[1] && p[1] == p[2]));
    }
}
