//! Renderer-neutral description of the report document.
//!
//! The layout stage produces a [`ReportDocument`] from the statistics and the
//! chart files; the PDF and LaTeX renderers both consume it. Keeping the model
//! free of rendering state means the structure can be compared in tests
//! without producing any output.

use std::path::{Path, PathBuf};

use genpdf::style::Color;

use crate::richtext::Span;

/// Horizontal placement of paragraphs and images.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HorizontalAlignment {
    #[default]
    Left,
    Center,
    Right,
}

/// Rich text paragraph carrying inline styling and alignment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RichParagraph {
    spans: Vec<Span>,
    alignment: HorizontalAlignment,
}

impl RichParagraph {
    /// Creates a left-aligned paragraph from the provided spans.
    pub fn new(spans: impl Into<Vec<Span>>) -> Self {
        Self {
            spans: spans.into(),
            ..Self::default()
        }
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn alignment(&self) -> HorizontalAlignment {
        self.alignment
    }

    pub fn with_alignment(mut self, alignment: HorizontalAlignment) -> Self {
        self.alignment = alignment;
        self
    }
}

/// Heading levels, from the document title down to subsection captions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeadingLevel {
    Title,
    Subtitle,
    Section,
    Subsection,
}

impl HeadingLevel {
    /// Font size in points used by the PDF renderer.
    pub fn font_size(self) -> u8 {
        match self {
            HeadingLevel::Title => 24,
            HeadingLevel::Subtitle => 18,
            HeadingLevel::Section => 16,
            HeadingLevel::Subsection => 13,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Heading {
    text: String,
    level: HeadingLevel,
}

impl Heading {
    pub fn new(text: impl Into<String>, level: HeadingLevel) -> Self {
        Self {
            text: text.into(),
            level,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn level(&self) -> HeadingLevel {
        self.level
    }
}

/// A grid of text cells with a highlighted header row.
///
/// Column weights are relative widths; every row has exactly one cell per
/// weight.
#[derive(Clone, Debug, PartialEq)]
pub struct TableBlock {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    column_weights: Vec<usize>,
    accent: Color,
}

impl TableBlock {
    pub fn new(header: Vec<String>, column_weights: Vec<usize>, accent: Color) -> Self {
        Self {
            header,
            rows: Vec::new(),
            column_weights,
            accent,
        }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Data rows, excluding the header.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn column_weights(&self) -> &[usize] {
        &self.column_weights
    }

    /// Color of the header row.
    pub fn accent(&self) -> Color {
        self.accent
    }

    /// Appends a row, padding or cutting it to the column count.
    pub fn push_row(&mut self, mut cells: Vec<String>) {
        cells.resize(self.column_weights.len(), String::new());
        self.rows.push(cells);
    }

    pub fn with_row(mut self, cells: Vec<String>) -> Self {
        self.push_row(cells);
        self
    }
}

/// An image file embedded in the document.
///
/// The width is stored in millimetres for the PDF renderer; the LaTeX renderer
/// converts it to a fraction of the text width.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageBlock {
    path: PathBuf,
    caption: Option<RichParagraph>,
    alignment: HorizontalAlignment,
    width_mm: Option<f64>,
}

impl ImageBlock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            caption: None,
            alignment: HorizontalAlignment::Center,
            width_mm: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Figure caption rendered under the image, if any.
    pub fn caption(&self) -> Option<&RichParagraph> {
        self.caption.as_ref()
    }

    pub fn alignment(&self) -> HorizontalAlignment {
        self.alignment
    }

    pub fn width_mm(&self) -> Option<f64> {
        self.width_mm
    }

    pub fn with_caption(mut self, caption: impl Into<Option<RichParagraph>>) -> Self {
        self.caption = caption.into();
        self
    }

    pub fn with_alignment(mut self, alignment: HorizontalAlignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_width_mm(mut self, width_mm: impl Into<Option<f64>>) -> Self {
        self.width_mm = width_mm.into();
        self
    }
}

/// Individual content blocks that make up sections.
#[derive(Clone, Debug, PartialEq)]
pub enum Block {
    Heading(Heading),
    Paragraph(RichParagraph),
    Table(TableBlock),
    Image(ImageBlock),
    /// Vertical gap in millimetres.
    Spacer(f64),
    PageBreak,
}

impl Block {
    pub fn heading(text: impl Into<String>, level: HeadingLevel) -> Self {
        Self::Heading(Heading::new(text, level))
    }

    pub fn paragraph(spans: impl Into<Vec<Span>>) -> Self {
        Self::Paragraph(RichParagraph::new(spans))
    }
}

/// Logical section of the report; its title is rendered as a section heading
/// and doubles as the bookmark label.
#[derive(Clone, Debug, PartialEq)]
pub struct Section {
    identifier: Option<String>,
    title: String,
    blocks: Vec<Block>,
}

impl Section {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            identifier: None,
            title: title.into(),
            blocks: Vec::new(),
        }
    }

    /// Identifier used for bookmarks and LaTeX labels.
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Whether the section opens with a page break.
    pub fn starts_on_new_page(&self) -> bool {
        matches!(self.blocks.first(), Some(Block::PageBreak))
    }

    pub fn with_block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn builder(title: impl Into<String>) -> SectionBuilder {
        SectionBuilder::new(title)
    }
}

/// Builder for [`Section`] values that can inject a leading page break.
#[derive(Clone, Debug, Default)]
pub struct SectionBuilder {
    identifier: Option<String>,
    title: String,
    blocks: Vec<Block>,
    start_on_new_page: bool,
}

impl SectionBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn start_on_new_page(mut self, start_on_new_page: bool) -> Self {
        self.start_on_new_page = start_on_new_page;
        self
    }

    pub fn identifier(mut self, identifier: impl Into<Option<String>>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn push_block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn extend_blocks<I>(mut self, blocks: I) -> Self
    where
        I: IntoIterator<Item = Block>,
    {
        self.blocks.extend(blocks);
        self
    }

    /// Builds the section, inserting a leading page break when requested.
    pub fn build(mut self) -> Section {
        if self.start_on_new_page && !matches!(self.blocks.first(), Some(Block::PageBreak)) {
            self.blocks.insert(0, Block::PageBreak);
        }

        Section {
            identifier: self.identifier,
            title: self.title,
            blocks: self.blocks,
        }
    }
}

/// The complete report: a title block followed by sections.
#[derive(Clone, Debug, PartialEq)]
pub struct ReportDocument {
    title: String,
    subtitle: Option<String>,
    /// Human readable generation date, e.g. `October 19, 2026`.
    generated_on: String,
    front_matter: Vec<Block>,
    sections: Vec<Section>,
    closing: Vec<Block>,
}

impl ReportDocument {
    pub fn new(title: impl Into<String>, generated_on: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subtitle: None,
            generated_on: generated_on.into(),
            front_matter: Vec::new(),
            sections: Vec::new(),
            closing: Vec::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn subtitle(&self) -> Option<&str> {
        self.subtitle.as_deref()
    }

    pub fn generated_on(&self) -> &str {
        &self.generated_on
    }

    /// Blocks rendered between the title and the first section.
    pub fn front_matter(&self) -> &[Block] {
        &self.front_matter
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Blocks rendered after the last section.
    pub fn closing(&self) -> &[Block] {
        &self.closing
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<Option<String>>) -> Self {
        self.subtitle = subtitle.into();
        self
    }

    pub fn with_front_matter(mut self, block: Block) -> Self {
        self.front_matter.push(block);
        self
    }

    pub fn add_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    pub fn with_closing(mut self, block: Block) -> Self {
        self.closing.push(block);
        self
    }

    /// Finds the first section with the given identifier.
    pub fn section(&self, identifier: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|section| section.identifier() == Some(identifier))
    }
}
