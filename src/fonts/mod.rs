//! Font discovery shared by the PDF renderer and the chart renderer.
//!
//! Both outputs use the Roboto family. The directory holding the TTF files is
//! looked up in this order:
//!
//! 1. `LIBRARY_REPORT_FONTS_DIR`
//! 2. `assets/fonts` next to the running executable
//! 3. `assets/fonts` inside this crate

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use genpdf::error::Error;
use genpdf::fonts::{self, FontData, FontFamily};
use log::debug;
use plotters::style::FontStyle;

/// Name of the bundled font family.
pub const DEFAULT_FONT_FAMILY_NAME: &str = "Roboto";

/// Environment variable overriding the font directory.
pub const FONTS_DIR_ENV: &str = "LIBRARY_REPORT_FONTS_DIR";

const FONT_FILES: &[&str] = &[
    "Roboto-Regular.ttf",
    "Roboto-Bold.ttf",
    "Roboto-Italic.ttf",
    "Roboto-BoldItalic.ttf",
];

/// Family name the charts request; plotters resolves it through the registry.
const CHART_FONT_FAMILY: &str = "sans-serif";

/// Location of the fonts shipped with the crate sources.
pub fn bundled_fonts_source_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/fonts")
}

fn font_directory_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(path) = env::var_os(FONTS_DIR_ENV).filter(|value| !value.is_empty()) {
        candidates.push(PathBuf::from(path));
    }

    if let Some(bin_dir) = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(bin_dir.join("assets/fonts"));
    }

    candidates.push(bundled_fonts_source_dir());
    candidates.dedup();
    candidates
}

fn missing_font_files(path: &Path) -> Vec<&'static str> {
    FONT_FILES
        .iter()
        .copied()
        .filter(|name| !path.join(name).is_file())
        .collect()
}

/// Returns the first candidate directory that holds every Roboto variant.
pub fn resolve_font_directory() -> Result<PathBuf, Error> {
    let mut attempts = Vec::new();

    for candidate in font_directory_candidates() {
        if !candidate.is_dir() {
            attempts.push(format!("{} (directory missing)", candidate.display()));
            continue;
        }

        let missing = missing_font_files(&candidate);
        if missing.is_empty() {
            debug!("Using fonts from {}", candidate.display());
            return Ok(candidate);
        }
        attempts.push(format!(
            "{} (missing files [{}])",
            candidate.display(),
            missing.join(", ")
        ));
    }

    Err(Error::new(
        format!(
            "Unable to locate the Roboto fonts. Checked: {}. See assets/fonts/README.md or set {}.",
            attempts.join(", "),
            FONTS_DIR_ENV
        ),
        io::Error::new(io::ErrorKind::NotFound, "report fonts not found"),
    ))
}

/// Loads the Roboto family for `genpdf`.
pub fn default_font_family() -> Result<FontFamily<FontData>, Error> {
    let directory = resolve_font_directory()?;

    fonts::from_files(&directory, DEFAULT_FONT_FAMILY_NAME, None).map_err(|err| {
        Error::new(
            format!(
                "Failed to load font family '{}' from {}: {}",
                DEFAULT_FONT_FAMILY_NAME,
                directory.display(),
                err
            ),
            io::Error::new(io::ErrorKind::Other, err.to_string()),
        )
    })
}

/// Indicates whether the fonts required by both renderers are present on disk.
pub fn default_fonts_available() -> bool {
    resolve_font_directory().is_ok()
}

static CHART_FONTS: OnceLock<Result<(), String>> = OnceLock::new();

/// Registers the Roboto regular and bold faces as the chart `sans-serif` family.
///
/// plotters keeps registered fonts for the lifetime of the process, so the
/// font bytes are leaked once and the outcome is cached for later calls.
pub fn register_chart_fonts() -> Result<(), String> {
    CHART_FONTS.get_or_init(load_chart_fonts).clone()
}

fn load_chart_fonts() -> Result<(), String> {
    let directory = resolve_font_directory().map_err(|err| err.to_string())?;

    for (file, style) in [
        ("Roboto-Regular.ttf", FontStyle::Normal),
        ("Roboto-Bold.ttf", FontStyle::Bold),
    ] {
        let path = directory.join(file);
        let bytes = fs::read(&path)
            .map_err(|err| format!("Failed to read chart font {}: {}", path.display(), err))?;
        let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
        plotters::style::register_font(CHART_FONT_FAMILY, style, bytes)
            .map_err(|_| format!("Invalid chart font {}", path.display()))?;
    }

    Ok(())
}
