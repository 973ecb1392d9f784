//! Arranges statistics and chart files into a [`ReportDocument`].

use std::path::PathBuf;

use chrono::{DateTime, TimeZone};
use genpdf::style::Color;
use rust_decimal::RoundingStrategy;

use crate::charts::ChartKind;
use crate::model::{
    Block, HeadingLevel, HorizontalAlignment, ImageBlock, ReportDocument, RichParagraph, Section,
    TableBlock,
};
use crate::richtext::Span;
use crate::stats::ReportStatistics;

/// Currency the fine amounts are recorded in.
pub const CURRENCY_LABEL: &str = "EGP";

pub const REPORT_TITLE: &str = "Library Management System";
pub const REPORT_SUBTITLE: &str = "Statistical Report";

const EXECUTIVE_SUMMARY: &str = "This report provides a comprehensive overview of the library \
     management system's statistics and performance metrics.";

const DETAIL_TITLE_CHARS: usize = 50;
const DETAIL_AUTHOR_CHARS: usize = 30;

const CHART_WIDTH_MM: f64 = 150.0;
const PIE_WIDTH_MM: f64 = 110.0;

const SUMMARY_ACCENT: Color = Color::Rgb(0x34, 0x98, 0xdb);
const BORROWED_ACCENT: Color = Color::Rgb(0x2e, 0xcc, 0x71);
const CATEGORY_ACCENT: Color = Color::Rgb(0xe7, 0x4c, 0x3c);

/// Section identifiers, stable across renderers.
pub const SUMMARY_SECTION: &str = "summary";
pub const ANALYTICS_SECTION: &str = "analytics";
pub const DETAILS_SECTION: &str = "details";

/// Keeps the first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Like [`truncate_chars`], appending `ellipsis` when anything was cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize, ellipsis: &str) -> String {
    if text.chars().count() > max_chars {
        let mut shortened = truncate_chars(text, max_chars);
        shortened.push_str(ellipsis);
        shortened
    } else {
        text.to_string()
    }
}

/// Formats the pending-fines total with two decimals and the currency label.
pub fn format_fines(stats: &ReportStatistics) -> String {
    let rounded = stats
        .total_fines()
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.2} {}", rounded, CURRENCY_LABEL)
}

/// The key-statistics table: a `Metric | Value` header and ten fixed rows.
pub fn key_statistics_table(stats: &ReportStatistics) -> TableBlock {
    let rows = [
        ("Total Books", stats.total_books().to_string()),
        ("Total Copies", stats.total_copies().to_string()),
        ("Available Copies", stats.available_copies().to_string()),
        ("Total Users", stats.total_users().to_string()),
        ("Total Loans", stats.total_loans().to_string()),
        ("Active Loans", stats.active_loans().to_string()),
        ("Returned Loans", stats.returned_loans().to_string()),
        ("Overdue Loans", stats.overdue_loans().to_string()),
        ("Active Reservations", stats.active_holds().to_string()),
        ("Total Pending Fines", format_fines(stats)),
    ];

    rows.into_iter().fold(
        TableBlock::new(
            vec!["Metric".to_string(), "Value".to_string()],
            vec![2, 1],
            SUMMARY_ACCENT,
        ),
        |table, (metric, value)| table.with_row(vec![metric.to_string(), value]),
    )
}

/// Most-borrowed detail table; titles and authors are cut silently.
pub fn most_borrowed_table(stats: &ReportStatistics) -> TableBlock {
    stats.most_borrowed().iter().fold(
        TableBlock::new(
            vec![
                "Book Title".to_string(),
                "Author".to_string(),
                "Borrow Count".to_string(),
            ],
            vec![3, 2, 1],
            BORROWED_ACCENT,
        ),
        |table, book| {
            table.with_row(vec![
                truncate_chars(&book.title, DETAIL_TITLE_CHARS),
                truncate_chars(&book.author, DETAIL_AUTHOR_CHARS),
                book.borrow_count.to_string(),
            ])
        },
    )
}

pub fn books_by_category_table(stats: &ReportStatistics) -> TableBlock {
    stats.books_by_category().iter().fold(
        TableBlock::new(
            vec!["Category".to_string(), "Count".to_string()],
            vec![2, 1],
            CATEGORY_ACCENT,
        ),
        |table, entry| table.with_row(vec![entry.category.clone(), entry.count.to_string()]),
    )
}

/// Builds the report document for one run.
pub struct ReportLayout<'a> {
    stats: &'a ReportStatistics,
    charts: &'a [PathBuf],
    generated_on: String,
}

impl<'a> ReportLayout<'a> {
    /// `generated_at` only feeds the printed date, so fixed timestamps give
    /// identical documents.
    pub fn new<Tz>(
        stats: &'a ReportStatistics,
        charts: &'a [PathBuf],
        generated_at: &DateTime<Tz>,
    ) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        Self {
            stats,
            charts,
            generated_on: generated_at.format("%B %d, %Y").to_string(),
        }
    }

    pub fn build(&self) -> ReportDocument {
        ReportDocument::new(REPORT_TITLE, self.generated_on.clone())
            .with_subtitle(Some(REPORT_SUBTITLE.to_string()))
            .with_front_matter(Block::Paragraph(
                RichParagraph::new(vec![Span::new(format!(
                    "Generated on {}",
                    self.generated_on
                ))])
                .with_alignment(HorizontalAlignment::Center),
            ))
            .add_section(self.summary_section())
            .add_section(self.analytics_section())
            .add_section(self.details_section())
            .with_closing(Block::Spacer(12.0))
            .with_closing(Block::Paragraph(
                RichParagraph::new(vec![Span::new(format!(
                    "Report generated on {}",
                    self.generated_on
                ))
                .italic()])
                .with_alignment(HorizontalAlignment::Center),
            ))
    }

    fn summary_section(&self) -> Section {
        Section::builder("Executive Summary")
            .identifier(Some(SUMMARY_SECTION.to_string()))
            .push_block(Block::paragraph(vec![Span::new(EXECUTIVE_SUMMARY)]))
            .push_block(Block::Spacer(5.0))
            .push_block(Block::heading("Key Statistics", HeadingLevel::Subsection))
            .push_block(Block::Table(key_statistics_table(self.stats)))
            .build()
    }

    fn analytics_section(&self) -> Section {
        let figures = self.charts.iter().flat_map(|path| {
            let kind = ChartKind::from_path(path);
            let heading =
                kind.map(|kind| Block::heading(kind.heading(), HeadingLevel::Subsection));
            let width = match kind {
                Some(ChartKind::LoanStatus) => PIE_WIDTH_MM,
                _ => CHART_WIDTH_MM,
            };
            let caption = kind.map(|kind| {
                RichParagraph::new(vec![Span::new(kind.caption()).italic()])
                    .with_alignment(HorizontalAlignment::Center)
            });
            let image = ImageBlock::new(path.clone())
                .with_caption(caption)
                .with_alignment(HorizontalAlignment::Center)
                .with_width_mm(Some(width));

            heading
                .into_iter()
                .chain([Block::Image(image), Block::Spacer(8.0)])
        });

        Section::builder("Visual Analytics")
            .identifier(Some(ANALYTICS_SECTION.to_string()))
            .start_on_new_page(true)
            .extend_blocks(figures)
            .build()
    }

    fn details_section(&self) -> Section {
        Section::builder("Detailed Statistics")
            .identifier(Some(DETAILS_SECTION.to_string()))
            .start_on_new_page(true)
            .push_block(Block::heading("Most Borrowed Books", HeadingLevel::Subsection))
            .push_block(Block::Table(most_borrowed_table(self.stats)))
            .push_block(Block::Spacer(8.0))
            .push_block(Block::heading("Books by Category", HeadingLevel::Subsection))
            .push_block(Block::Table(books_by_category_table(self.stats)))
            .build()
    }
}
