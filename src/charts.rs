//! PNG charts drawn from the report statistics with `plotters`.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::error::ReportError;
use crate::fonts;
use crate::layout::truncate_with_ellipsis;
use crate::stats::ReportStatistics;

const LINE_CHART_SIZE: (u32, u32) = (800, 480);
const PIE_CHART_SIZE: (u32, u32) = (600, 600);

const CATEGORY_LABEL_CHARS: usize = 20;
const TITLE_LABEL_CHARS: usize = 30;

const LINE_COLOR: RGBColor = RGBColor(0x1f, 0x77, 0xb4);
const CATEGORY_COLOR: RGBColor = RGBColor(0x46, 0x82, 0xb4);
const BORROWED_COLOR: RGBColor = RGBColor(0x00, 0x64, 0x00);
const PLACEHOLDER_COLOR: RGBColor = RGBColor(0x7f, 0x8c, 0x8d);
const STATUS_COLORS: [RGBColor; 3] = [
    RGBColor(0x34, 0x98, 0xdb),
    RGBColor(0x2e, 0xcc, 0x71),
    RGBColor(0xe7, 0x4c, 0x3c),
];

type DrawResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// The fixed set of charts a report may contain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChartKind {
    LoansByMonth,
    BooksByCategory,
    MostBorrowed,
    LoanStatus,
}

impl ChartKind {
    /// All charts in rendering order.
    pub const ALL: [ChartKind; 4] = [
        ChartKind::LoansByMonth,
        ChartKind::BooksByCategory,
        ChartKind::MostBorrowed,
        ChartKind::LoanStatus,
    ];

    /// File stem; also the keyword used to recognise a chart by its file name.
    pub fn stem(self) -> &'static str {
        match self {
            ChartKind::LoansByMonth => "loans_by_month",
            ChartKind::BooksByCategory => "books_by_category",
            ChartKind::MostBorrowed => "most_borrowed",
            ChartKind::LoanStatus => "loan_status",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.png", self.stem())
    }

    /// Title drawn inside the chart image.
    pub fn title(self) -> &'static str {
        match self {
            ChartKind::LoansByMonth => "Loans by Month (Last 12 Months)",
            ChartKind::BooksByCategory => "Books by Category (Top 10)",
            ChartKind::MostBorrowed => "Most Borrowed Books (Top 10)",
            ChartKind::LoanStatus => "Loan Status Distribution",
        }
    }

    /// Heading placed above the chart in the document.
    pub fn heading(self) -> &'static str {
        match self {
            ChartKind::LoansByMonth => "Loans Trend (Last 12 Months)",
            ChartKind::BooksByCategory => "Books by Category (Top 10)",
            ChartKind::MostBorrowed => "Most Borrowed Books (Top 10)",
            ChartKind::LoanStatus => "Loan Status Distribution",
        }
    }

    /// Figure caption placed below the chart in the document.
    pub fn caption(self) -> &'static str {
        match self {
            ChartKind::LoansByMonth => "Monthly loan activity over the past 12 months",
            ChartKind::BooksByCategory => "Book distribution across categories",
            ChartKind::MostBorrowed => "Top 10 most frequently borrowed books",
            ChartKind::LoanStatus => "Distribution of loan statuses",
        }
    }

    /// Recognises a chart from a file name by keyword match.
    pub fn from_file_name(name: &str) -> Option<ChartKind> {
        Self::ALL
            .into_iter()
            .find(|kind| name.contains(kind.stem()))
    }

    /// Recognises a chart from the final component of `path`.
    pub fn from_path(path: &Path) -> Option<ChartKind> {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(Self::from_file_name)
    }
}

/// Draws the report charts into an output directory.
pub struct ChartRenderer {
    output_dir: PathBuf,
}

impl ChartRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Charts that `stats` yields: series charts only when their data is
    /// non-empty, the status pie always, and always last.
    pub fn plan(stats: &ReportStatistics) -> Vec<ChartKind> {
        ChartKind::ALL
            .into_iter()
            .filter(|kind| match kind {
                ChartKind::LoansByMonth => !stats.loans_by_month().is_empty(),
                ChartKind::BooksByCategory => !stats.books_by_category().is_empty(),
                ChartKind::MostBorrowed => !stats.most_borrowed().is_empty(),
                ChartKind::LoanStatus => true,
            })
            .collect()
    }

    /// Renders every planned chart and returns the written paths.
    ///
    /// If any chart fails, the images already written by this call are
    /// removed before the error is returned.
    pub fn render_all(&self, stats: &ReportStatistics) -> Result<Vec<PathBuf>, ReportError> {
        fonts::register_chart_fonts().map_err(|message| ReportError::Chart {
            chart: "fonts",
            message,
        })?;

        let mut written = Vec::new();
        for kind in Self::plan(stats) {
            match self.render(kind, stats) {
                Ok(path) => written.push(path),
                Err(err) => {
                    for path in &written {
                        if let Err(remove_err) = fs::remove_file(path) {
                            warn!("Could not remove {}: {}", path.display(), remove_err);
                        }
                    }
                    return Err(err);
                }
            }
        }

        info!(
            "Rendered {} charts into {}",
            written.len(),
            self.output_dir.display()
        );
        Ok(written)
    }

    /// Renders a single chart to `<output_dir>/<stem>.png`.
    pub fn render(
        &self,
        kind: ChartKind,
        stats: &ReportStatistics,
    ) -> Result<PathBuf, ReportError> {
        let path = self.output_dir.join(kind.file_name());
        let result = match kind {
            ChartKind::LoansByMonth => draw_loans_by_month(&path, stats),
            ChartKind::BooksByCategory => {
                let bars: Vec<_> = stats
                    .books_by_category()
                    .iter()
                    .map(|entry| {
                        (
                            truncate_with_ellipsis(&entry.category, CATEGORY_LABEL_CHARS, ""),
                            entry.count,
                        )
                    })
                    .collect();
                draw_horizontal_bars(
                    &path,
                    kind,
                    &bars,
                    "Number of Books",
                    "Category",
                    CATEGORY_COLOR,
                )
            }
            ChartKind::MostBorrowed => {
                let bars: Vec<_> = stats
                    .most_borrowed()
                    .iter()
                    .map(|book| (chart_title_label(&book.title), book.borrow_count))
                    .collect();
                draw_horizontal_bars(
                    &path,
                    kind,
                    &bars,
                    "Number of Borrows",
                    "Book Title",
                    BORROWED_COLOR,
                )
            }
            ChartKind::LoanStatus => draw_loan_status(&path, stats),
        };

        result.map_err(|source| ReportError::Chart {
            chart: kind.stem(),
            message: source.to_string(),
        })?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }
}

/// Label used for a book title on the most-borrowed chart.
pub fn chart_title_label(title: &str) -> String {
    truncate_with_ellipsis(title, TITLE_LABEL_CHARS, "...")
}

fn bold_font(size: u32) -> TextStyle<'static> {
    ("sans-serif", size).into_font().style(FontStyle::Bold).into()
}

fn segment_label(value: &SegmentValue<usize>, labels: &[String]) -> String {
    match value {
        SegmentValue::CenterOf(index) => labels.get(*index).cloned().unwrap_or_default(),
        _ => String::new(),
    }
}

fn axis_max(values: impl Iterator<Item = u64>) -> u64 {
    let max = values.max().unwrap_or(0).max(1);
    max + max / 10 + 1
}

fn draw_loans_by_month(path: &Path, stats: &ReportStatistics) -> DrawResult {
    let months: Vec<String> = stats
        .loans_by_month()
        .iter()
        .map(|entry| entry.month.clone())
        .collect();
    let y_max = axis_max(stats.loans_by_month().iter().map(|entry| entry.count));

    let root = BitMapBackend::new(path, LINE_CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(ChartKind::LoansByMonth.title(), bold_font(20))
        .margin(15)
        .x_label_area_size(70)
        .y_label_area_size(45)
        .build_cartesian_2d((0..months.len()).into_segmented(), 0u64..y_max)?;

    chart
        .configure_mesh()
        .x_labels(months.len())
        .x_label_formatter(&|value| segment_label(value, &months))
        .x_label_style(
            ("sans-serif", 11)
                .into_font()
                .transform(FontTransform::Rotate90),
        )
        .y_label_style(("sans-serif", 11))
        .x_desc("Month")
        .y_desc("Number of Loans")
        .axis_desc_style(("sans-serif", 13))
        .light_line_style(BLACK.mix(0.08))
        .bold_line_style(BLACK.mix(0.2))
        .draw()?;

    chart.draw_series(
        LineSeries::new(
            stats
                .loans_by_month()
                .iter()
                .enumerate()
                .map(|(index, entry)| (SegmentValue::CenterOf(index), entry.count)),
            LINE_COLOR.stroke_width(2),
        )
        .point_size(4),
    )?;

    root.present()?;
    Ok(())
}

/// Draws a horizontal bar chart with the first bar at the top.
fn draw_horizontal_bars(
    path: &Path,
    kind: ChartKind,
    bars: &[(String, u64)],
    x_desc: &str,
    y_desc: &str,
    color: RGBColor,
) -> DrawResult {
    let rows = bars.len();
    // Segment 0 sits at the bottom, so the bars are laid out in reverse.
    let labels: Vec<String> = bars.iter().rev().map(|(label, _)| label.clone()).collect();
    let x_max = axis_max(bars.iter().map(|(_, count)| *count));

    let root = BitMapBackend::new(path, LINE_CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(kind.title(), bold_font(20))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(230)
        .build_cartesian_2d(0u64..x_max, (0..rows).into_segmented())?;

    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(rows)
        .y_label_formatter(&|value| segment_label(value, &labels))
        .y_label_style(("sans-serif", 11))
        .x_label_style(("sans-serif", 11))
        .x_desc(x_desc)
        .y_desc(y_desc)
        .axis_desc_style(("sans-serif", 13))
        .light_line_style(BLACK.mix(0.08))
        .draw()?;

    chart.draw_series(bars.iter().enumerate().map(|(index, (_, count))| {
        let row = rows - 1 - index;
        let mut bar = Rectangle::new(
            [
                (0, SegmentValue::Exact(row)),
                (*count, SegmentValue::Exact(row + 1)),
            ],
            color.filled(),
        );
        bar.set_margin(3, 3, 0, 0);
        bar
    }))?;

    root.present()?;
    Ok(())
}

fn draw_loan_status(path: &Path, stats: &ReportStatistics) -> DrawResult {
    let root = BitMapBackend::new(path, PIE_CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let body = root.titled(ChartKind::LoanStatus.title(), bold_font(22))?;

    let sizes = [
        stats.active_loans() as f64,
        stats.returned_loans() as f64,
        stats.overdue_loans() as f64,
    ];
    if sizes.iter().sum::<f64>() <= 0.0 {
        draw_placeholder(&body, "No loans recorded")?;
        root.present()?;
        return Ok(());
    }

    let (width, height) = body.dim_in_pixel();
    let center = (width as i32 / 2, height as i32 / 2);
    let radius = f64::from(width.min(height)) * 0.36;
    let labels = ["Active", "Returned", "Overdue"];

    let mut pie = Pie::new(&center, &radius, &sizes, &STATUS_COLORS, &labels);
    pie.start_angle(-90.0);
    pie.label_style(("sans-serif", 17).into_font().color(&BLACK));
    pie.percentages(("sans-serif", 15).into_font().color(&WHITE));
    body.draw(&pie)?;

    root.present()?;
    Ok(())
}

fn draw_placeholder(area: &DrawingArea<BitMapBackend<'_>, Shift>, message: &str) -> DrawResult {
    let (width, height) = area.dim_in_pixel();
    let style = TextStyle::from(("sans-serif", 18).into_font())
        .color(&PLACEHOLDER_COLOR)
        .pos(Pos::new(HPos::Center, VPos::Center));
    area.draw(&Text::new(
        message.to_string(),
        (width as i32 / 2, height as i32 / 2),
        style,
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_with(months: bool, categories: bool, borrowed: bool) -> ReportStatistics {
        let mut builder = ReportStatistics::builder()
            .active_loans(3)
            .returned_loans(5)
            .overdue_loans(1);
        if months {
            builder = builder.month("2024-01", 4);
        }
        if categories {
            builder = builder.category("Fiction", 12);
        }
        if borrowed {
            builder = builder.borrowed_book("Dune", "Frank Herbert", 9);
        }
        builder.build().expect("valid stats")
    }

    #[test]
    fn plan_includes_everything_when_series_are_present() {
        assert_eq!(
            ChartRenderer::plan(&stats_with(true, true, true)),
            ChartKind::ALL.to_vec()
        );
    }

    #[test]
    fn plan_skips_empty_series_but_keeps_pie() {
        assert_eq!(
            ChartRenderer::plan(&stats_with(false, false, false)),
            vec![ChartKind::LoanStatus]
        );
        assert_eq!(
            ChartRenderer::plan(&stats_with(true, false, true)),
            vec![
                ChartKind::LoansByMonth,
                ChartKind::MostBorrowed,
                ChartKind::LoanStatus
            ]
        );
        assert_eq!(
            ChartRenderer::plan(&stats_with(false, true, false)),
            vec![ChartKind::BooksByCategory, ChartKind::LoanStatus]
        );
    }

    fn written_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .expect("read output dir")
            .map(|entry| {
                entry
                    .expect("dir entry")
                    .file_name()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        names.sort();
        names
    }

    #[test]
    fn empty_series_write_only_the_status_chart() {
        if !fonts::default_fonts_available() {
            eprintln!("Skipping chart rendering test: bundled fonts missing.");
            return;
        }
        let dir = tempfile::tempdir().expect("tempdir");

        let written = ChartRenderer::new(dir.path())
            .render_all(&stats_with(false, false, false))
            .expect("render charts");

        assert_eq!(written, vec![dir.path().join("loan_status.png")]);
        assert_eq!(written_files(dir.path()), ["loan_status.png"]);
    }

    #[test]
    fn failed_chart_removes_images_written_earlier() {
        if !fonts::default_fonts_available() {
            eprintln!("Skipping chart rendering test: bundled fonts missing.");
            return;
        }
        let dir = tempfile::tempdir().expect("tempdir");
        // A directory in place of the image makes the bitmap save fail.
        fs::create_dir(dir.path().join(ChartKind::MostBorrowed.file_name()))
            .expect("create blocking dir");

        let err = ChartRenderer::new(dir.path())
            .render_all(&stats_with(true, true, true))
            .unwrap_err();

        assert_eq!(err.kind(), "chart");
        assert!(err.to_string().contains("most_borrowed"), "{err}");
        assert_eq!(written_files(dir.path()), ["most_borrowed.png"]);
    }

    #[test]
    fn chart_kinds_are_recognised_by_file_name() {
        for kind in ChartKind::ALL {
            assert_eq!(ChartKind::from_file_name(&kind.file_name()), Some(kind));
        }
        assert_eq!(
            ChartKind::from_path(Path::new("/tmp/out/loan_status.png")),
            Some(ChartKind::LoanStatus)
        );
        assert_eq!(ChartKind::from_file_name("logo.png"), None);
    }

    #[test]
    fn long_titles_are_shortened_for_chart_labels() {
        let title = "A Very Long Book Title That Keeps Going On And On";
        let label = chart_title_label(title);
        assert_eq!(label.chars().count(), 33);
        assert!(label.ends_with("..."));
        assert_eq!(&label[..30], &title[..30]);
    }

    #[test]
    fn short_titles_are_kept() {
        assert_eq!(chart_title_label("Dune"), "Dune");
        let exactly_thirty = "x".repeat(30);
        assert_eq!(chart_title_label(&exactly_thirty), exactly_thirty);
    }
}
