//! Renders a [`ReportDocument`] to PDF bytes with `genpdf`.

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use genpdf::elements::{FrameCellDecorator, PageBreak, Paragraph, TableLayout};
use genpdf::error::{Error, ErrorKind};
use genpdf::style::{self, Color, Style, StyledString};
use genpdf::{Alignment, Element, Margins, Mm, PageDecorator, Position, Size};
use thiserror::Error;

use crate::elements::{mm_from_f64, CaptionedImage, PageMarker, VerticalSpace};
use crate::fonts;
use crate::model::{
    Block, Heading, HeadingLevel, HorizontalAlignment, ImageBlock, ReportDocument, RichParagraph,
    TableBlock,
};

const HEADER_FOOTER_FONT_SIZE: u8 = 9;
const BODY_FONT_SIZE: u8 = 11;
const CAPTION_FONT_SIZE: u8 = 10;
const FOOTER_HEIGHT_MM: f64 = 10.0;
const HEADER_COLOR: Color = Color::Rgb(0x2c, 0x3e, 0x50);
const MUTED_COLOR: Color = Color::Rgb(0x7f, 0x8c, 0x8d);

/// Errors raised while turning the document model into PDF bytes.
#[derive(Debug, Error)]
pub enum PdfBuildError {
    #[error("failed to load report fonts")]
    FontLoad(#[source] Error),

    #[error("failed to embed image {}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: Error,
    },

    #[error("failed to lay out the document")]
    Render(#[source] Error),

    #[cfg(feature = "bookmarks")]
    #[error("failed to add section bookmarks")]
    Bookmarks(#[from] crate::bookmarks::BookmarkError),
}

/// Output of a successful render.
#[derive(Debug)]
pub struct RenderedPdf {
    pub bytes: Vec<u8>,
    /// First page (1-based) of every section, in document order.
    pub section_pages: Vec<Option<usize>>,
}

type PageElementFactory = dyn Fn(usize) -> Box<dyn Element>;
type HeaderFactory = dyn Fn(usize) -> Result<Box<dyn Element>, Error>;

/// Builds PDF files from [`ReportDocument`] values.
pub struct PdfBuilder {
    paper_size: Size,
    margins: Margins,
    header: Option<Box<HeaderFactory>>,
    footer: Option<FooterSpec>,
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self {
            paper_size: genpdf::PaperSize::A4.into(),
            margins: Margins::trbl(15, 20, 15, 20),
            header: None,
            footer: None,
        }
    }
}

impl PdfBuilder {
    /// A4 builder without header or footer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder with the report's running header and page-number footer.
    pub fn for_report(document: &ReportDocument) -> Self {
        let title = document.title().to_string();
        let date = document.generated_on().to_string();

        Self::new()
            .with_header(move |_page| running_header(&title, &date))
            .with_footer(FOOTER_HEIGHT_MM, |page| {
                Paragraph::new(StyledString::new(
                    format!("Page {}", page),
                    Style::new()
                        .with_font_size(HEADER_FOOTER_FONT_SIZE)
                        .with_color(MUTED_COLOR),
                ))
                .aligned(Alignment::Center)
            })
    }

    /// Header rendered at the top of every page; a factory error aborts rendering.
    pub fn with_header<F, E>(mut self, header: F) -> Self
    where
        F: Fn(usize) -> Result<E, Error> + 'static,
        E: Element + 'static,
    {
        self.header = Some(Box::new(move |page| {
            header(page).map(|element| Box::new(element) as Box<dyn Element>)
        }));
        self
    }

    /// Footer with a fixed height rendered at the bottom of every page.
    pub fn with_footer<F, E>(mut self, height_mm: f64, footer: F) -> Self
    where
        F: Fn(usize) -> E + 'static,
        E: Element + 'static,
    {
        self.footer = Some(FooterSpec::new(mm_from_f64(height_mm), footer));
        self
    }

    /// Lays out `document` and returns the PDF bytes.
    pub fn render(self, document: &ReportDocument) -> Result<RenderedPdf, PdfBuildError> {
        let font_family = fonts::default_font_family().map_err(PdfBuildError::FontLoad)?;
        let mut pdf = genpdf::Document::new(font_family);
        pdf.set_title(document.title());
        pdf.set_paper_size(self.paper_size);
        pdf.set_font_size(BODY_FONT_SIZE);
        pdf.set_line_spacing(1.25);

        let current_page = Rc::new(Cell::new(0));
        pdf.set_page_decorator(ConfiguredPageDecorator {
            page: Rc::clone(&current_page),
            margins: self.margins,
            header: self.header,
            footer: self.footer,
        });

        push_heading(
            &mut pdf,
            &Heading::new(document.title(), HeadingLevel::Title),
            Alignment::Center,
        );
        if let Some(subtitle) = document.subtitle() {
            push_heading(
                &mut pdf,
                &Heading::new(subtitle, HeadingLevel::Subtitle),
                Alignment::Center,
            );
        }
        for block in document.front_matter() {
            push_block(&mut pdf, block)?;
        }

        let mut slots = Vec::with_capacity(document.sections().len());
        for section in document.sections() {
            let slot = Rc::new(Cell::new(None));
            let mut blocks = section.blocks();
            if let Some((Block::PageBreak, rest)) = blocks.split_first() {
                pdf.push(PageBreak::new());
                blocks = rest;
            }
            pdf.push(PageMarker::new(Rc::clone(&current_page), Rc::clone(&slot)));
            push_heading(
                &mut pdf,
                &Heading::new(section.title(), HeadingLevel::Section),
                Alignment::Left,
            );
            for block in blocks {
                push_block(&mut pdf, block)?;
            }
            slots.push(slot);
        }

        for block in document.closing() {
            push_block(&mut pdf, block)?;
        }

        let mut bytes = Vec::new();
        pdf.render(&mut bytes).map_err(PdfBuildError::Render)?;
        log::debug!("Rendered PDF with {} bytes", bytes.len());

        let section_pages: Vec<Option<usize>> = slots.iter().map(|slot| slot.get()).collect();

        #[cfg(feature = "bookmarks")]
        let bytes =
            crate::bookmarks::apply_section_bookmarks(&bytes, document.sections(), &section_pages)?;

        Ok(RenderedPdf {
            bytes,
            section_pages,
        })
    }
}

fn running_header(title: &str, date: &str) -> Result<impl Element, Error> {
    let style = Style::new()
        .with_font_size(HEADER_FOOTER_FONT_SIZE)
        .with_color(MUTED_COLOR);
    let mut table = TableLayout::new(vec![1, 1]);
    table
        .row()
        .element(Paragraph::new(StyledString::new(title.to_string(), style)))
        .element(
            Paragraph::new(StyledString::new(date.to_string(), style)).aligned(Alignment::Right),
        )
        .push()?;
    Ok(table.padded(Margins::trbl(0, 0, 4, 0)))
}

fn alignment(value: HorizontalAlignment) -> Alignment {
    match value {
        HorizontalAlignment::Left => Alignment::Left,
        HorizontalAlignment::Center => Alignment::Center,
        HorizontalAlignment::Right => Alignment::Right,
    }
}

fn heading_paragraph(heading: &Heading, align: Alignment) -> Paragraph {
    let style = Style::new()
        .bold()
        .with_font_size(heading.level().font_size())
        .with_color(HEADER_COLOR);
    Paragraph::new(StyledString::new(heading.text().to_string(), style)).aligned(align)
}

fn push_heading(pdf: &mut genpdf::Document, heading: &Heading, align: Alignment) {
    let (before, after) = match heading.level() {
        HeadingLevel::Title => (0.0, 2.0),
        HeadingLevel::Subtitle => (0.0, 6.0),
        HeadingLevel::Section => (2.0, 4.0),
        HeadingLevel::Subsection => (3.0, 2.0),
    };
    if before > 0.0 {
        pdf.push(VerticalSpace::new(before));
    }
    pdf.push(heading_paragraph(heading, align));
    pdf.push(VerticalSpace::new(after));
}

fn rich_paragraph(paragraph: &RichParagraph) -> Paragraph {
    let mut element = Paragraph::default();
    for span in paragraph.spans() {
        element.push(span.to_styled_string());
    }
    element.aligned(alignment(paragraph.alignment()))
}

fn push_block(pdf: &mut genpdf::Document, block: &Block) -> Result<(), PdfBuildError> {
    match block {
        Block::Heading(heading) => push_heading(pdf, heading, Alignment::Left),
        Block::Paragraph(paragraph) => pdf.push(rich_paragraph(paragraph)),
        Block::Table(table) => pdf.push(table_layout(table).map_err(PdfBuildError::Render)?),
        Block::Image(image) => pdf.push(captioned_image(image)?),
        Block::Spacer(height) => pdf.push(VerticalSpace::new(*height)),
        Block::PageBreak => pdf.push(PageBreak::new()),
    }
    Ok(())
}

fn table_layout(table: &TableBlock) -> Result<TableLayout, Error> {
    let mut layout = TableLayout::new(table.column_weights().to_vec());
    layout.set_cell_decorator(FrameCellDecorator::new(true, true, false));

    let header_style = Style::new().bold().with_color(table.accent());
    let mut header = layout.row();
    for cell in table.header() {
        header.push_element(
            Paragraph::new(StyledString::new(cell.clone(), header_style)).padded(1),
        );
    }
    header.push()?;

    for cells in table.rows() {
        let mut row = layout.row();
        for cell in cells {
            row.push_element(Paragraph::new(cell.clone()).padded(1));
        }
        row.push()?;
    }

    Ok(layout)
}

fn captioned_image(block: &ImageBlock) -> Result<CaptionedImage, PdfBuildError> {
    let caption = block.caption().map(|caption| {
        let mut paragraph = Paragraph::default();
        for span in caption.spans() {
            let mut styled = span.to_styled_string();
            styled.style = styled.style.with_font_size(CAPTION_FONT_SIZE);
            paragraph.push(styled);
        }
        paragraph.aligned(alignment(caption.alignment()))
    });

    CaptionedImage::from_path(block.path(), caption)
        .map(|image| {
            image
                .with_alignment(alignment(block.alignment()))
                .with_width(block.width_mm().map(mm_from_f64))
        })
        .map_err(|source| PdfBuildError::Image {
            path: block.path().to_path_buf(),
            source,
        })
}

struct FooterSpec {
    height: Mm,
    factory: Box<PageElementFactory>,
}

impl FooterSpec {
    fn new<F, E>(height: Mm, factory: F) -> Self
    where
        F: Fn(usize) -> E + 'static,
        E: Element + 'static,
    {
        Self {
            height,
            factory: Box::new(move |page| Box::new(factory(page)) as Box<dyn Element>),
        }
    }
}

struct ConfiguredPageDecorator {
    page: Rc<Cell<usize>>,
    margins: Margins,
    header: Option<Box<HeaderFactory>>,
    footer: Option<FooterSpec>,
}

impl PageDecorator for ConfiguredPageDecorator {
    fn decorate_page<'a>(
        &mut self,
        context: &genpdf::Context,
        mut area: genpdf::render::Area<'a>,
        style: style::Style,
    ) -> Result<genpdf::render::Area<'a>, Error> {
        let page = self.page.get() + 1;
        self.page.set(page);

        area.add_margins(self.margins);

        if let Some(header_cb) = &self.header {
            let mut element = header_cb(page)?;
            let result = element.render(context, area.clone(), style)?;
            area.add_offset(Position::new(0, result.size.height));
        }

        if let Some(footer) = &self.footer {
            let available = area.size().height;
            if footer.height > available {
                return Err(Error::new(
                    "Footer height exceeds available space",
                    ErrorKind::InvalidData,
                ));
            }

            let mut footer_area = area.clone();
            footer_area.add_offset(Position::new(0, available - footer.height));
            let mut element = (footer.factory)(page);
            let result = element.render(context, footer_area, style)?;
            if result.has_more {
                return Err(Error::new(
                    "Footer element does not fit into the reserved space",
                    ErrorKind::PageSizeExceeded,
                ));
            }

            area.set_height(available - footer.height);
        }

        Ok(area)
    }
}
