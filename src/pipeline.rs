//! The end-to-end report run: aggregate, chart, lay out, assemble.

use std::error::Error as _;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{info, warn};
use serde::Serialize;
use sqlx::mysql::MySqlConnection;
use sqlx::{ConnectOptions, Connection};
use tokio::time::timeout;

use crate::aggregator::StatisticsAggregator;
use crate::assembler::{self, DocumentAssembler};
use crate::charts::ChartRenderer;
use crate::config::Settings;
use crate::error::ReportError;
use crate::layout::ReportLayout;
use crate::stats::ReportStatistics;

/// Runs the report stages in order against one database.
pub struct ReportPipeline {
    settings: Settings,
}

impl ReportPipeline {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Generates the report under `output_dir`, creating it when absent, and
    /// returns the absolute path of `report.pdf`.
    ///
    /// On failure no `report.pdf` remains in `output_dir`, including one left
    /// by an earlier run.
    pub async fn run(&self, output_dir: &Path) -> Result<PathBuf, ReportError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|err| ReportError::io(output_dir, err))?;
        let output_dir = tokio::fs::canonicalize(output_dir)
            .await
            .map_err(|err| ReportError::io(output_dir, err))?;

        let result = self.generate(&output_dir).await;
        if result.is_err() {
            assembler::remove_stale_report(&output_dir);
        }
        result
    }

    async fn generate(&self, output_dir: &Path) -> Result<PathBuf, ReportError> {
        info!("Collecting library statistics");
        let stats = self.collect_statistics().await?;

        info!("Rendering charts into {}", output_dir.display());
        let charts = ChartRenderer::new(output_dir).render_all(&stats)?;

        info!("Assembling report document");
        let document = ReportLayout::new(&stats, &charts, &Local::now()).build();
        DocumentAssembler::from_settings(&self.settings.render)
            .assemble(&document, output_dir)
            .await
    }

    /// Opens a connection, aggregates, and closes the connection again before
    /// returning, whatever the aggregation outcome.
    async fn collect_statistics(&self) -> Result<ReportStatistics, ReportError> {
        let mut connection = self.connect().await?;

        let budget = self.settings.render.query_timeout();
        let outcome = timeout(budget, StatisticsAggregator::new(&mut connection).collect())
            .await
            .unwrap_or_else(|_| {
                Err(ReportError::Timeout {
                    operation: "statistics aggregation",
                    after: budget,
                })
            });

        match timeout(self.settings.render.connect_timeout(), connection.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("Closing the database connection failed: {}", err),
            Err(_) => warn!("Closing the database connection timed out"),
        }

        outcome
    }

    async fn connect(&self) -> Result<MySqlConnection, ReportError> {
        let database = &self.settings.database;
        let budget = self.settings.render.connect_timeout();
        let connect_error = |source| ReportError::Connect {
            host: database.host.clone(),
            port: database.port,
            source,
        };

        info!(
            "Connecting to {}:{}/{}",
            database.host, database.port, database.name
        );
        match timeout(budget, database.connect_options().connect()).await {
            Ok(Ok(connection)) => Ok(connection),
            Ok(Err(source)) => Err(connect_error(source)),
            Err(_) => Err(connect_error(sqlx::Error::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no connection after {}s", budget.as_secs()),
            )))),
        }
    }
}

/// Machine-readable result of a run, printed as one JSON object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReportOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReportOutcome {
    pub fn succeeded(pdf_path: &Path) -> Self {
        Self {
            success: true,
            pdf_path: Some(pdf_path.display().to_string()),
            kind: None,
            error: None,
        }
    }

    /// Failure payload; `error` holds the message and every cause, joined by `: `.
    pub fn failed(error: &ReportError) -> Self {
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        Self {
            success: false,
            pdf_path: None,
            kind: Some(error.kind()),
            error: Some(message),
        }
    }

    /// Failure payload for an invalid command line, before any stage ran.
    pub fn usage_error(message: &str) -> Self {
        Self {
            success: false,
            pdf_path: None,
            kind: Some("usage"),
            error: Some(message.trim().to_string()),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&Result<PathBuf, ReportError>> for ReportOutcome {
    fn from(result: &Result<PathBuf, ReportError>) -> Self {
        match result {
            Ok(path) => Self::succeeded(path),
            Err(err) => Self::failed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::Secret;

    use super::*;
    use crate::config::{DatabaseSettings, RenderSettings};

    #[test]
    fn success_payload_has_path_only() {
        let outcome = ReportOutcome::succeeded(Path::new("/srv/reports/report.pdf"));
        assert_eq!(
            outcome.to_json().expect("serialize"),
            r#"{"success":true,"pdf_path":"/srv/reports/report.pdf"}"#
        );
    }

    #[test]
    fn failure_payload_carries_kind_and_causes() {
        let err = ReportError::io(
            "/srv/reports/report.pdf",
            io::Error::new(io::ErrorKind::PermissionDenied, "read-only file system"),
        );
        let json = ReportOutcome::failed(&err).to_json().expect("serialize");
        assert_eq!(
            json,
            r#"{"success":false,"kind":"io","error":"failed to write /srv/reports/report.pdf: read-only file system"}"#
        );
    }

    #[test]
    fn usage_payload_has_usage_kind() {
        let json = ReportOutcome::usage_error("error: unexpected argument '--colour' found\n")
            .to_json()
            .expect("serialize");
        assert_eq!(
            json,
            r#"{"success":false,"kind":"usage","error":"error: unexpected argument '--colour' found"}"#
        );
    }

    #[tokio::test]
    async fn failed_run_leaves_no_report_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output_dir = dir.path().join("nested/out");
        std::fs::create_dir_all(&output_dir).expect("create output dir");
        std::fs::write(output_dir.join("report.pdf"), b"%PDF-1.3 earlier run")
            .expect("write earlier report");
        let settings = Settings {
            database: DatabaseSettings {
                host: "127.0.0.1".to_string(),
                port: 1,
                user: "report".to_string(),
                password: Secret::new("secret".to_string()),
                name: "library_system".to_string(),
            },
            render: RenderSettings {
                connect_timeout_secs: 2,
                ..RenderSettings::default()
            },
        };

        let err = ReportPipeline::new(settings)
            .run(&output_dir)
            .await
            .err()
            .expect("no database listens on port 1");

        assert_eq!(err.kind(), "connection");
        assert!(output_dir.is_dir());
        assert!(!output_dir.join("report.pdf").exists());
    }
}
