//! LaTeX rendition of the report and the external compiler driver.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use log::{debug, info};
use tokio::process::Command;

use crate::error::ReportError;
use crate::model::{
    Block, Heading, HeadingLevel, HorizontalAlignment, ImageBlock, ReportDocument, RichParagraph,
    TableBlock,
};
use crate::richtext::Span;

/// File name of the generated LaTeX source.
pub const LATEX_SOURCE_FILE: &str = "report_latex.tex";

/// Text width of an A4 page with the margins used below.
const TEXT_WIDTH_MM: f64 = 170.0;

/// Lines of compiler output kept in error messages.
const LOG_TAIL_LINES: usize = 15;

/// Escapes characters with special meaning in LaTeX text mode.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => escaped.push_str(r"\textbackslash{}"),
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            '~' => escaped.push_str(r"\textasciitilde{}"),
            '^' => escaped.push_str(r"\textasciicircum{}"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn span(span: &Span) -> String {
    let mut text = escape(span.text());
    if span.is_italic() {
        text = format!(r"\textit{{{}}}", text);
    }
    text
}

fn spans(paragraph: &RichParagraph) -> String {
    paragraph.spans().iter().map(span).collect()
}

/// Builds the LaTeX source for `document`.
///
/// Image paths inside `base_dir` are written relative to it, since the
/// compiler runs there.
pub fn render_source(document: &ReportDocument, base_dir: &Path) -> String {
    let mut out = String::new();
    let title = escape(document.title());
    let date = escape(document.generated_on());

    out.push_str(
        r"\documentclass[11pt,a4paper]{article}
\usepackage[utf8]{inputenc}
\usepackage[T1]{fontenc}
\usepackage{graphicx}
\usepackage[margin=20mm]{geometry}
\usepackage{fancyhdr}
\usepackage{booktabs}
\usepackage{caption}
\usepackage{xcolor}
\usepackage{hyperref}

\pagestyle{fancy}
\fancyhf{}
",
    );
    let _ = writeln!(out, r"\fancyhead[L]{{\textbf{{{}}}}}", title);
    let _ = writeln!(out, r"\fancyhead[R]{{{}}}", date);
    out.push_str("\\fancyfoot[C]{\\thepage}\n\n");

    match document.subtitle() {
        Some(subtitle) => {
            let _ = writeln!(out, r"\title{{\textbf{{{}\\{}}}}}", title, escape(subtitle));
        }
        None => {
            let _ = writeln!(out, r"\title{{\textbf{{{}}}}}", title);
        }
    }
    let _ = writeln!(out, r"\date{{{}}}", date);
    out.push_str("\\author{}\n\n\\begin{document}\n\\maketitle\n\\thispagestyle{fancy}\n\n");

    for block in document.front_matter() {
        // The title block already carries the date.
        if matches!(block, Block::Paragraph(_)) {
            continue;
        }
        write_block(&mut out, block, base_dir);
    }

    for section in document.sections() {
        let mut blocks = section.blocks();
        if let Some((Block::PageBreak, rest)) = blocks.split_first() {
            out.push_str("\\newpage\n");
            blocks = rest;
        }
        let heading = escape(section.title());
        let _ = writeln!(out, r"\section*{{{}}}", heading);
        if let Some(identifier) = section.identifier() {
            let _ = writeln!(out, r"\pdfbookmark[1]{{{}}}{{sec:{}}}", heading, identifier);
            let _ = writeln!(out, r"\label{{sec:{}}}", identifier);
        }
        out.push('\n');
        for block in blocks {
            write_block(&mut out, block, base_dir);
        }
    }

    for block in document.closing() {
        write_block(&mut out, block, base_dir);
    }

    out.push_str("\\end{document}\n");
    out
}

fn write_block(out: &mut String, block: &Block, base_dir: &Path) {
    match block {
        Block::Heading(heading) => write_heading(out, heading),
        Block::Paragraph(paragraph) => write_paragraph(out, paragraph),
        Block::Table(table) => write_table(out, table),
        Block::Image(image) => write_image(out, image, base_dir),
        Block::Spacer(height) => {
            let _ = writeln!(out, "\\vspace{{{:.1}mm}}\n", height);
        }
        Block::PageBreak => out.push_str("\\newpage\n"),
    }
}

fn write_heading(out: &mut String, heading: &Heading) {
    let command = match heading.level() {
        HeadingLevel::Title | HeadingLevel::Subtitle | HeadingLevel::Section => "section*",
        HeadingLevel::Subsection => "subsection*",
    };
    let _ = writeln!(out, "\\{}{{{}}}\n", command, escape(heading.text()));
}

fn write_paragraph(out: &mut String, paragraph: &RichParagraph) {
    let text = spans(paragraph);
    match paragraph.alignment() {
        HorizontalAlignment::Left => {
            let _ = writeln!(out, "{}\n", text);
        }
        HorizontalAlignment::Center => {
            let _ = writeln!(out, "\\begin{{center}}\n{}\n\\end{{center}}\n", text);
        }
        HorizontalAlignment::Right => {
            let _ = writeln!(out, "\\begin{{flushright}}\n{}\n\\end{{flushright}}\n", text);
        }
    }
}

fn write_table(out: &mut String, table: &TableBlock) {
    let columns = table.header().len();
    let alignments: String = (0..columns)
        .map(|index| if index + 1 == columns { 'r' } else { 'l' })
        .collect();

    let _ = writeln!(
        out,
        "\\begin{{center}}\n\\begin{{tabular}}{{{}}}\n\\toprule",
        alignments
    );
    let header: Vec<String> = table
        .header()
        .iter()
        .map(|cell| format!(r"\textbf{{{}}}", escape(cell)))
        .collect();
    let _ = writeln!(out, "{} \\\\\n\\midrule", header.join(" & "));
    for row in table.rows() {
        let cells: Vec<String> = row.iter().map(|cell| escape(cell)).collect();
        let _ = writeln!(out, "{} \\\\", cells.join(" & "));
    }
    out.push_str("\\bottomrule\n\\end{tabular}\n\\end{center}\n\n");
}

fn write_image(out: &mut String, image: &ImageBlock, base_dir: &Path) {
    let fraction = image
        .width_mm()
        .map(|width| (width / TEXT_WIDTH_MM).clamp(0.1, 1.0))
        .unwrap_or(0.8);
    let path = image.path().strip_prefix(base_dir).unwrap_or(image.path());

    let _ = writeln!(out, "\\begin{{figure}}[h]\n\\centering");
    let _ = writeln!(
        out,
        "\\includegraphics[width={:.2}\\textwidth]{{{}}}",
        fraction,
        path.display()
    );
    if let Some(caption) = image.caption() {
        let _ = writeln!(out, "\\caption*{{{}}}", spans(caption));
    }
    out.push_str("\\end{figure}\n\n");
}

/// Runs an external LaTeX compiler over a source file.
#[derive(Clone, Debug)]
pub struct LatexCompiler {
    program: String,
    timeout: Duration,
}

impl LatexCompiler {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Compiles `tex_path` twice inside its directory and returns the PDF path.
    pub async fn compile(&self, tex_path: &Path) -> Result<PathBuf, ReportError> {
        let output_dir = tex_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        for pass in 1..=2 {
            self.run_pass(tex_path, output_dir, pass).await?;
        }

        let pdf_path = tex_path.with_extension("pdf");
        if !pdf_path.is_file() {
            return Err(ReportError::Typesetting(format!(
                "{} finished but {} was not produced",
                self.program,
                pdf_path.display()
            )));
        }

        info!("LaTeX report written to {}", pdf_path.display());
        Ok(pdf_path)
    }

    async fn run_pass(
        &self,
        tex_path: &Path,
        output_dir: &Path,
        pass: u8,
    ) -> Result<(), ReportError> {
        debug!("Running {} pass {} on {}", self.program, pass, tex_path.display());

        let mut command = Command::new(&self.program);
        command
            .arg("-interaction=nonstopmode")
            .arg("-output-directory")
            .arg(output_dir)
            .arg(tex_path)
            .current_dir(output_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => {
                return Err(ReportError::Typesetting(format!(
                    "{} pass {} timed out after {}s",
                    self.program,
                    pass,
                    self.timeout.as_secs()
                )))
            }
            Ok(Err(err)) => {
                return Err(ReportError::Typesetting(format!(
                    "failed to run {}: {}",
                    self.program, err
                )))
            }
            Ok(Ok(output)) => output,
        };

        if output.status.success() {
            return Ok(());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let lines: Vec<&str> = stdout.lines().collect();
        let tail = lines[lines.len().saturating_sub(LOG_TAIL_LINES)..].join("\n");
        Err(ReportError::Typesetting(format!(
            "{} pass {} exited with {}:\n{}",
            self.program, pass, output.status, tail
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Section;

    fn sample_document() -> ReportDocument {
        ReportDocument::new("Library & Co", "May 17, 2024")
            .with_subtitle(Some("Statistical Report".to_string()))
            .add_section(
                Section::builder("Detailed Statistics")
                    .identifier(Some("details".to_string()))
                    .start_on_new_page(true)
                    .push_block(Block::Table(
                        TableBlock::new(
                            vec!["Category".into(), "Count".into()],
                            vec![2, 1],
                            genpdf::style::Color::Rgb(0, 0, 0),
                        )
                        .with_row(vec!["Science_Fiction & 100% Fun".into(), "3".into()]),
                    ))
                    .push_block(Block::Image(
                        ImageBlock::new("/out/loan_status.png")
                            .with_caption(RichParagraph::new(vec![Span::new("Statuses")]))
                            .with_width_mm(Some(85.0)),
                    ))
                    .build(),
            )
    }

    #[test]
    fn escapes_special_characters() {
        assert_eq!(escape("50% of $5 & #1_x"), r"50\% of \$5 \& \#1\_x");
        assert_eq!(escape(r"a\b{c}"), r"a\textbackslash{}b\{c\}");
        assert_eq!(escape("~^"), r"\textasciitilde{}\textasciicircum{}");
    }

    #[test]
    fn source_escapes_data_and_relativizes_images() {
        let source = render_source(&sample_document(), Path::new("/out"));

        assert!(source.starts_with(r"\documentclass[11pt,a4paper]{article}"));
        assert!(source.contains(r"\fancyhead[L]{\textbf{Library \& Co}}"));
        assert!(source.contains(r"Science\_Fiction \& 100\% Fun & 3 \\"));
        assert!(source.contains(r"\includegraphics[width=0.50\textwidth]{loan_status.png}"));
        assert!(source.contains(r"\caption*{Statuses}"));
        assert!(source.contains("\\newpage\n\\section*{Detailed Statistics}"));
        assert!(source.trim_end().ends_with(r"\end{document}"));
    }

    #[test]
    fn styled_spans_map_to_commands() {
        assert_eq!(span(&Span::new("x_y").italic()), r"\textit{x\_y}");
        assert_eq!(span(&Span::new("plain")), "plain");
    }

    #[tokio::test]
    async fn missing_compiler_is_a_typesetting_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tex = dir.path().join(LATEX_SOURCE_FILE);
        std::fs::write(&tex, "\\documentclass{article}").expect("write tex");

        let compiler =
            LatexCompiler::new("definitely-not-a-latex-compiler", Duration::from_secs(5));
        let err = compiler.compile(&tex).await.err().expect("compile should fail");

        assert_eq!(err.kind(), "typesetting");
    }
}
