use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use library_report::builder::PdfBuilder;
use library_report::charts::{ChartKind, ChartRenderer};
use library_report::fonts;
use library_report::layout::ReportLayout;
use library_report::model::ReportDocument;
use library_report::stats::ReportStatistics;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

const SKIP_HINT: &str =
    "bundled fonts missing. Set LIBRARY_REPORT_FONTS_DIR or copy assets/fonts next to the binary.";

fn sample_statistics() -> ReportStatistics {
    ReportStatistics::builder()
        .total_books(100)
        .total_copies(250)
        .available_copies(180)
        .total_users(40)
        .total_loans(300)
        .active_loans(20)
        .returned_loans(270)
        .overdue_loans(10)
        .active_holds(5)
        .total_fines(Decimal::new(3750, 2))
        .month("2024-03", 12)
        .month("2024-04", 30)
        .month("2024-05", 21)
        .category("Fiction", 40)
        .category("Science & Technology", 25)
        .borrowed_book("A Tale of Two Cities", "Charles Dickens", 18)
        .borrowed_book("The Pragmatic Programmer", "Andrew Hunt", 11)
        .build()
        .expect("valid statistics")
}

fn sample_document(stats: &ReportStatistics, charts: &[PathBuf]) -> ReportDocument {
    let generated_at = Utc
        .with_ymd_and_hms(2024, 5, 17, 9, 30, 0)
        .single()
        .expect("valid timestamp");
    ReportLayout::new(stats, charts, &generated_at).build()
}

fn render_sample_pdf() -> Option<Vec<u8>> {
    if !fonts::default_fonts_available() {
        return None;
    }

    let document = sample_document(&sample_statistics(), &[]);
    let bytes = PdfBuilder::for_report(&document)
        .render(&document)
        .expect("render sample pdf")
        .bytes;

    Some(bytes)
}

fn scrub_pdf(bytes: &[u8]) -> Vec<u8> {
    fn scrub_segment(data: &mut [u8], tag: &[u8], terminator: u8) {
        let mut index = 0;
        while index + tag.len() < data.len() {
            if data[index..].starts_with(tag) {
                let mut cursor = index + tag.len();
                while cursor < data.len() {
                    let byte = data[cursor];
                    if byte == terminator {
                        break;
                    }
                    if terminator == b')' {
                        data[cursor] = b'0';
                    } else if !matches!(byte, b'<' | b'>' | b' ' | b'\n' | b'\r' | b'\t') {
                        data[cursor] = b'0';
                    }
                    cursor += 1;
                }
                index = cursor;
            } else {
                index += 1;
            }
        }
    }

    fn scrub_xml(data: &mut [u8], start: &[u8], end: &[u8]) {
        let mut offset = 0;
        while offset + start.len() < data.len() {
            if let Some(start_pos) = data[offset..]
                .windows(start.len())
                .position(|window| window == start)
            {
                let start_index = offset + start_pos + start.len();
                if let Some(end_pos) = data[start_index..]
                    .windows(end.len())
                    .position(|window| window == end)
                {
                    for byte in &mut data[start_index..start_index + end_pos] {
                        if !matches!(*byte, b'<' | b'>' | b'/' | b' ' | b'\n' | b'\r' | b'\t') {
                            *byte = b'0';
                        }
                    }
                    offset = start_index + end_pos + end.len();
                } else {
                    break;
                }
            } else {
                break;
            }
        }
    }

    let mut normalized = bytes.to_vec();
    scrub_segment(&mut normalized, b"/CreationDate(", b')');
    scrub_segment(&mut normalized, b"/ModDate(", b')');
    scrub_segment(&mut normalized, b"/ID[", b']');
    scrub_segment(&mut normalized, b"/Producer(", b')');
    scrub_xml(&mut normalized, b"<xmp:CreateDate>", b"</xmp:CreateDate>");
    scrub_xml(&mut normalized, b"<xmp:ModifyDate>", b"</xmp:ModifyDate>");
    scrub_xml(
        &mut normalized,
        b"<xmp:MetadataDate>",
        b"</xmp:MetadataDate>",
    );
    scrub_xml(
        &mut normalized,
        b"<xmpMM:DocumentID>",
        b"</xmpMM:DocumentID>",
    );
    scrub_xml(
        &mut normalized,
        b"<xmpMM:InstanceID>",
        b"</xmpMM:InstanceID>",
    );
    scrub_xml(&mut normalized, b"<xmpMM:VersionID>", b"</xmpMM:VersionID>");
    normalized
}

fn normalized_hash(bytes: &[u8]) -> [u8; 32] {
    let normalized = scrub_pdf(bytes);
    let digest = Sha256::digest(&normalized);
    digest.into()
}

#[test]
fn renders_non_empty_output() {
    let Some(bytes) = render_sample_pdf() else {
        eprintln!("Skipping renders_non_empty_output: {}", SKIP_HINT);
        return;
    };
    assert!(bytes.starts_with(b"%PDF"), "output should be a PDF file");
}

#[test]
fn rendering_is_deterministic() {
    let (Some(bytes_a), Some(bytes_b)) = (render_sample_pdf(), render_sample_pdf()) else {
        eprintln!("Skipping rendering_is_deterministic: {}", SKIP_HINT);
        return;
    };

    assert_eq!(bytes_a.len(), bytes_b.len(), "PDF sizes should match");
    assert_eq!(
        normalized_hash(&bytes_a),
        normalized_hash(&bytes_b),
        "PDF renders must be deterministic after metadata normalization"
    );
}

#[test]
fn sections_start_on_separate_pages() {
    if !fonts::default_fonts_available() {
        eprintln!("Skipping sections_start_on_separate_pages: {}", SKIP_HINT);
        return;
    }

    let document = sample_document(&sample_statistics(), &[]);
    let rendered = PdfBuilder::for_report(&document)
        .render(&document)
        .expect("render report");

    assert_eq!(rendered.section_pages, vec![Some(1), Some(2), Some(3)]);
}

#[test]
fn charts_are_embedded_in_the_report() {
    if !fonts::default_fonts_available() {
        eprintln!("Skipping charts_are_embedded_in_the_report: {}", SKIP_HINT);
        return;
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let stats = sample_statistics();
    let charts = ChartRenderer::new(dir.path())
        .render_all(&stats)
        .expect("render charts");
    let names: Vec<ChartKind> = charts
        .iter()
        .filter_map(|path| ChartKind::from_path(path))
        .collect();
    assert_eq!(names, ChartKind::ALL);
    assert!(charts.iter().all(|path| path.is_file()));

    let with_charts = sample_document(&stats, &charts);
    let without_charts = sample_document(&stats, &[]);
    let bytes_with = PdfBuilder::for_report(&with_charts)
        .render(&with_charts)
        .expect("render report with charts")
        .bytes;
    let bytes_without = PdfBuilder::for_report(&without_charts)
        .render(&without_charts)
        .expect("render report without charts")
        .bytes;

    assert!(bytes_with.len() > bytes_without.len());
    // Four uncompressed RGB rasters at chart resolution stay well under 6 MB.
    assert!(
        bytes_with.len() < 6_000_000,
        "report with charts is {} bytes",
        bytes_with.len()
    );
}

#[test]
fn chart_images_use_the_report_resolution() {
    if !fonts::default_fonts_available() {
        eprintln!("Skipping chart_images_use_the_report_resolution: {}", SKIP_HINT);
        return;
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let charts = ChartRenderer::new(dir.path())
        .render_all(&sample_statistics())
        .expect("render charts");

    for path in &charts {
        let (width, height) = image::image_dimensions(path).expect("read chart dimensions");
        let expected = match ChartKind::from_path(path) {
            Some(ChartKind::LoanStatus) => (600, 600),
            _ => (800, 480),
        };
        assert_eq!((width, height), expected, "{}", path.display());
    }
}
