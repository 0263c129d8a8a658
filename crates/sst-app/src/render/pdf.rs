use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};
use log::debug;
use super::{DocumentAssembler, DocumentLayout, RenderError};

/// Built-in assembler: one page, the bitmap embedded as a JPEG image XObject
/// and scaled to the page width.
#[derive(Debug, Default, Clone)]
pub struct PdfAssembler;

impl DocumentAssembler for PdfAssembler {
    fn name(&self) -> &str {
        "pdf-assembler"
    }

    fn assemble(&self, bitmap: &RgbaImage, layout: &DocumentLayout) -> Result<Vec<u8>, RenderError> {
        let (px_w, px_h) = bitmap.dimensions();
        if px_w == 0 || px_h == 0 {
            return Err(RenderError::Empty("bitmap has no pixels".into()));
        }

        let rgb = DynamicImage::ImageRgba8(bitmap.clone()).to_rgb8();
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, layout.jpeg_quality).encode_image(&rgb)?;

        let page_w = layout.page_width_pt;
        let page_h = page_w * px_h as f32 / px_w as f32;
        debug!(
            "Assembling PDF page {:.2}x{:.2}pt from {}x{} bitmap ({} byte JPEG)",
            page_w, page_h, px_w, px_h, jpeg.len()
        );

        Ok(write_pdf(&jpeg, px_w, px_h, page_w, page_h))
    }
}

struct PdfWriter {
    buf: Vec<u8>,
    offsets: Vec<usize>,
}

impl PdfWriter {
    fn new() -> Self {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
        Self { buf, offsets: Vec::new() }
    }

    /// Start the next object; ids are handed out in call order starting at 1
    fn begin(&mut self) -> usize {
        self.offsets.push(self.buf.len());
        let id = self.offsets.len();
        self.raw(&format!("{} 0 obj\n", id));
        id
    }

    fn end(&mut self) {
        self.raw("endobj\n");
    }

    fn object(&mut self, body: &str) {
        self.begin();
        self.raw(body);
        self.raw("\n");
        self.end();
    }

    fn stream(&mut self, dict: &str, data: &[u8]) {
        self.begin();
        self.raw(&format!("<< {} /Length {} >>\nstream\n", dict, data.len()));
        self.buf.extend_from_slice(data);
        self.raw("\nendstream\n");
        self.end();
    }

    fn raw(&mut self, text: &str) {
        self.buf.extend_from_slice(text.as_bytes());
    }

    fn finish(mut self, root: usize) -> Vec<u8> {
        let xref_at = self.buf.len();
        let count = self.offsets.len() + 1;

        let mut table = format!("xref\n0 {}\n0000000000 65535 f \n", count);
        for offset in &self.offsets {
            // Each entry is exactly 20 bytes including the line break
            table.push_str(&format!("{:010} 00000 n \n", offset));
        }
        self.raw(&table);
        self.raw(&format!(
            "trailer\n<< /Size {} /Root {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            count, root, xref_at
        ));
        self.buf
    }
}

fn write_pdf(jpeg: &[u8], px_w: u32, px_h: u32, page_w: f32, page_h: f32) -> Vec<u8> {
    let mut pdf = PdfWriter::new();

    pdf.object("<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object("<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    pdf.object(&format!(
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] \
         /Resources << /XObject << /Im0 4 0 R >> >> /Contents 5 0 R >>",
        page_w, page_h
    ));
    pdf.stream(
        &format!(
            "/Type /XObject /Subtype /Image /Width {} /Height {} \
             /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /DCTDecode",
            px_w, px_h
        ),
        jpeg,
    );
    let content = format!("q {:.2} 0 0 {:.2} 0 0 cm /Im0 Do Q", page_w, page_h);
    pdf.stream("", content.as_bytes());

    pdf.finish(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn bitmap(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([200, 120, 40, 255]))
    }

    fn text(pdf: &[u8]) -> String {
        String::from_utf8_lossy(pdf).into_owned()
    }

    #[test]
    fn test_pdf_structure() {
        let pdf = PdfAssembler.assemble(&bitmap(200, 100), &DocumentLayout::default()).unwrap();
        assert!(pdf.starts_with(b"%PDF-"));

        let text = text(&pdf);
        assert!(text.contains("/Filter /DCTDecode"));
        assert!(text.contains("/Width 200 /Height 100"));
        assert!(text.contains("/Im0 Do"));
        assert!(text.trim_end().ends_with("%%EOF"));
    }

    #[test]
    fn test_page_height_follows_aspect_ratio() {
        let pdf = PdfAssembler.assemble(&bitmap(400, 600), &DocumentLayout::default()).unwrap();
        assert!(text(&pdf).contains("/MediaBox [0 0 612.00 918.00]"));
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).rposition(|w| w == needle)
    }

    #[test]
    fn test_xref_points_at_objects() {
        let pdf = PdfAssembler.assemble(&bitmap(10, 10), &DocumentLayout::default()).unwrap();

        // The tail after the JPEG payload is plain ASCII
        let start = find(&pdf, b"startxref\n").unwrap();
        let tail = std::str::from_utf8(&pdf[start..]).unwrap();
        let xref_at: usize = tail.lines().nth(1).unwrap().parse().unwrap();
        assert!(pdf[xref_at..].starts_with(b"xref\n0 6\n"));

        let table = std::str::from_utf8(&pdf[xref_at..start]).unwrap();
        let first_entry = table.lines().nth(3).unwrap();
        let offset: usize = first_entry[..10].parse().unwrap();
        assert!(pdf[offset..].starts_with(b"1 0 obj"));
    }

    #[test]
    fn test_empty_bitmap_rejected() {
        let result = PdfAssembler.assemble(&RgbaImage::new(0, 0), &DocumentLayout::default());
        assert!(matches!(result, Err(RenderError::Empty(_))));
    }
}
