//! Custom `genpdf` elements used by the report renderer.
//!
//! `genpdf` ships paragraphs, tables and plain images; the report additionally
//! needs chart images with a caption underneath, fixed vertical gaps measured
//! in millimetres and invisible markers that remember on which page a section
//! started.

use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use image::GenericImageView;

use genpdf::elements::{Image, Paragraph};
use genpdf::error::{Context as _, Error};
use genpdf::style::Style;
use genpdf::{render, Alignment, Element, Mm, Position, RenderResult, Scale, Size};

const DEFAULT_IMAGE_DPI: f64 = 300.0;
const MM_PER_INCH: f64 = 25.4;
const CAPTION_SPACING_MM: f64 = 2.0;

pub(crate) fn mm_from_f64(value: f64) -> Mm {
    Mm::from(printpdf::Mm(value))
}

fn mm_to_f64(value: Mm) -> f64 {
    let mm: printpdf::Mm = value.into();
    mm.0
}

fn estimated_image_size(image: &image::DynamicImage, dpi: f64) -> Size {
    let (px_width, px_height) = image.dimensions();
    let width_mm = MM_PER_INCH * (px_width as f64) / dpi;
    let height_mm = MM_PER_INCH * (px_height as f64) / dpi;
    Size::new(mm_from_f64(width_mm), mm_from_f64(height_mm))
}

/// Loads an image file, dropping any alpha channel `genpdf` cannot embed.
pub fn decode_image_from_path(path: impl AsRef<Path>) -> Result<image::DynamicImage, Error> {
    let path = path.as_ref();
    let reader = image::io::Reader::open(path)
        .with_context(|| format!("Failed to open image file {}", path.display()))?;
    let decoded = reader
        .with_guessed_format()
        .context("Unable to determine image format")?
        .decode()
        .with_context(|| format!("Failed to decode image file {}", path.display()))?;

    Ok(image::DynamicImage::ImageRgb8(decoded.to_rgb8()))
}

/// An image with an optional caption stacked underneath.
///
/// Both parts share one alignment. When a width is requested the image is
/// scaled uniformly to it. If the image does not fit into the remaining page
/// area it is moved to the next page once; a second miss renders it anyway.
pub struct CaptionedImage {
    image: Image,
    caption: Option<Paragraph>,
    alignment: Alignment,
    natural_size: Size,
    requested_width: Option<Mm>,
    image_done: bool,
    deferred: bool,
}

impl CaptionedImage {
    /// Creates a captioned image from the file located at `path`.
    pub fn from_path(path: impl AsRef<Path>, caption: Option<Paragraph>) -> Result<Self, Error> {
        let dynamic = decode_image_from_path(path)?;
        let natural_size = estimated_image_size(&dynamic, DEFAULT_IMAGE_DPI);
        let image = Image::from_dynamic_image(dynamic)?;

        let mut element = Self {
            image,
            caption,
            alignment: Alignment::Center,
            natural_size,
            requested_width: None,
            image_done: false,
            deferred: false,
        };
        element.apply_alignment();
        Ok(element)
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self.apply_alignment();
        self
    }

    /// Constrains the rendered width while preserving the aspect ratio.
    pub fn with_width(mut self, width: impl Into<Option<Mm>>) -> Self {
        self.requested_width = width.into();
        self
    }

    fn apply_alignment(&mut self) {
        self.image.set_alignment(self.alignment);
        if let Some(caption) = self.caption.as_mut() {
            caption.set_alignment(self.alignment);
        }
    }

    fn scale(&self) -> f64 {
        let natural = mm_to_f64(self.natural_size.width);
        match self.requested_width {
            Some(width) if natural > f64::EPSILON => mm_to_f64(width) / natural,
            _ => 1.0,
        }
    }
}

impl Element for CaptionedImage {
    fn render(
        &mut self,
        context: &genpdf::Context,
        mut area: render::Area<'_>,
        style: Style,
    ) -> Result<RenderResult, Error> {
        let mut result = RenderResult::default();

        if !self.image_done {
            let scale = self.scale();
            let height = mm_to_f64(self.natural_size.height) * scale;
            if height > mm_to_f64(area.size().height) && !self.deferred {
                self.deferred = true;
                // A non-zero size keeps genpdf from treating the page as overflowed.
                result.size = Size::new(1, 0);
                result.has_more = true;
                return Ok(result);
            }

            self.image.set_scale(Scale::new(scale, scale));
            let image_result = self.image.render(context, area.clone(), style)?;
            self.image_done = true;
            result.size = result.size.stack_vertical(image_result.size);

            let spacing = mm_from_f64(CAPTION_SPACING_MM);
            area.add_offset(Position::new(0, image_result.size.height + spacing));
            result.size = result.size.stack_vertical(Size::new(0, spacing));
        }

        if let Some(caption) = self.caption.as_mut() {
            let caption_result = caption.render(context, area, style)?;
            result.size = result.size.stack_vertical(caption_result.size);
            result.has_more |= caption_result.has_more;
        }

        Ok(result)
    }
}

/// Fixed vertical gap. Consumes at most the remaining page height and never
/// spills onto the next page.
pub struct VerticalSpace {
    height_mm: f64,
}

impl VerticalSpace {
    pub fn new(height_mm: f64) -> Self {
        Self {
            height_mm: height_mm.max(0.0),
        }
    }
}

impl Element for VerticalSpace {
    fn render(
        &mut self,
        _context: &genpdf::Context,
        area: render::Area<'_>,
        _style: Style,
    ) -> Result<RenderResult, Error> {
        let mut result = RenderResult::default();
        let available = mm_to_f64(area.size().height);
        result.size = Size::new(0, mm_from_f64(self.height_mm.min(available)));
        Ok(result)
    }
}

/// Invisible element that stores the page it was first laid out on.
///
/// `current_page` is the counter maintained by the page decorator; `slot`
/// is read back once the document has been rendered.
pub struct PageMarker {
    current_page: Rc<Cell<usize>>,
    slot: Rc<Cell<Option<usize>>>,
}

impl PageMarker {
    pub fn new(current_page: Rc<Cell<usize>>, slot: Rc<Cell<Option<usize>>>) -> Self {
        Self { current_page, slot }
    }
}

impl Element for PageMarker {
    fn render(
        &mut self,
        _context: &genpdf::Context,
        _area: render::Area<'_>,
        _style: Style,
    ) -> Result<RenderResult, Error> {
        if self.slot.get().is_none() {
            self.slot.set(Some(self.current_page.get()));
        }
        Ok(RenderResult::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_size_follows_dpi() {
        let image = image::DynamicImage::new_rgb8(300, 600);
        let size = estimated_image_size(&image, 300.0);
        assert!((mm_to_f64(size.width) - 25.4).abs() < 1e-6);
        assert!((mm_to_f64(size.height) - 50.8).abs() < 1e-6);
    }

    #[test]
    fn decoding_strips_alpha_channel() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rgba.png");
        image::DynamicImage::new_rgba8(4, 4)
            .save(&path)
            .expect("write png");

        let decoded = decode_image_from_path(&path).expect("decode png");
        assert!(matches!(decoded, image::DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn missing_image_reports_path() {
        let err = decode_image_from_path("/definitely/not/here.png")
            .err()
            .expect("missing file should fail");
        assert!(err.to_string().contains("/definitely/not/here.png"));
    }
}
