use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use library_report::{ReportError, ReportOutcome, ReportPipeline, Settings};
use tracing_subscriber::EnvFilter;

/// Generates the statistical PDF report of the library database.
///
/// Connection settings come from `DB_HOST`, `DB_PORT`, `DB_USER`,
/// `DB_PASSWORD` (required) and `DB_NAME`; renderer settings from `REPORT_*`.
/// The result is printed to standard output as a single JSON object, logs go
/// to standard error.
#[derive(Parser)]
#[command(name = "library-report", version, about)]
struct Cli {
    /// Directory receiving the chart images and `report.pdf`; created if absent.
    output_dir: PathBuf,

    /// Also build `report_latex.pdf` with pdflatex (same as `REPORT_LATEX=true`).
    #[arg(long)]
    latex: bool,

    /// Log filter such as `debug` or `library_report=trace`; overrides `RUST_LOG`.
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if !err.use_stderr() => {
            let _ = err.print();
            std::process::exit(0);
        }
        Err(err) => {
            print_outcome(&ReportOutcome::usage_error(&err.to_string()));
            let _ = err.print();
            std::process::exit(1);
        }
    };

    init_tracing(cli.log_level.as_deref());

    let result = run(&cli).await;

    print_outcome(&ReportOutcome::from(&result));

    match result {
        Ok(path) => tracing::info!("Report ready at {}", path.display()),
        Err(err) => {
            eprintln!("Error: {}", err);
            print_error_sources(&err);
            std::process::exit(1);
        }
    }
}

async fn run(cli: &Cli) -> Result<PathBuf, ReportError> {
    let mut settings = Settings::from_env()?;
    if cli.latex {
        settings.render.latex = true;
    }

    ReportPipeline::new(settings).run(&cli.output_dir).await
}

fn print_outcome(outcome: &ReportOutcome) {
    match outcome.to_json() {
        Ok(json) => println!("{}", json),
        Err(err) => eprintln!("Error: failed to encode the result payload: {}", err),
    }
}

fn init_tracing(filter: Option<&str>) {
    let filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_error_sources(mut error: &(dyn Error + 'static)) {
    while let Some(source) = error.source() {
        eprintln!("  caused by: {}", source);
        error = source;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_output_dir_is_a_usage_failure() {
        let err = match Cli::try_parse_from(["library-report"]) {
            Ok(_) => panic!("output_dir is required"),
            Err(err) => err,
        };
        assert!(err.use_stderr());

        let outcome = ReportOutcome::usage_error(&err.to_string());
        assert!(!outcome.success);
        assert_eq!(outcome.kind, Some("usage"));
        assert!(outcome.error.is_some_and(|message| message.contains("OUTPUT_DIR")));
    }

    #[test]
    fn help_is_not_a_failure() {
        let err = match Cli::try_parse_from(["library-report", "--help"]) {
            Ok(_) => panic!("--help stops parsing"),
            Err(err) => err,
        };
        assert!(!err.use_stderr());
    }
}
