//! Error taxonomy for the report pipeline.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::builder::PdfBuildError;

/// Errors produced while generating a report.
///
/// Every variant except [`ReportError::Typesetting`] is fatal to a run. The
/// typesetting variant belongs to the optional LaTeX renderer and is only ever
/// logged by the assembler.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("invalid configuration")]
    Config(#[from] config::ConfigError),

    #[error("failed to connect to the library database at {host}:{port}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: sqlx::Error,
    },

    #[error("statistics query `{query}` failed")]
    Query {
        query: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("statistics query `{query}` returned an unexpected shape: {detail}")]
    QueryShape { query: &'static str, detail: String },

    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("failed to render chart {chart}: {message}")]
    Chart { chart: &'static str, message: String },

    #[error("failed to render the report document")]
    Document(#[from] PdfBuildError),

    #[error("failed to write {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("LaTeX typesetting failed: {0}")]
    Typesetting(String),
}

impl ReportError {
    /// Stable identifier of the error class, used in the machine-readable failure payload.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "configuration",
            Self::Connect { .. } => "connection",
            Self::Query { .. } => "query",
            Self::QueryShape { .. } => "query_shape",
            Self::Timeout { .. } => "timeout",
            Self::Chart { .. } => "chart",
            Self::Document(_) => "document",
            Self::Io { .. } => "io",
            Self::Typesetting(_) => "typesetting",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn shape(query: &'static str, detail: impl Into<String>) -> Self {
        Self::QueryShape {
            query,
            detail: detail.into(),
        }
    }

    /// Classifies a driver error raised by `query`.
    ///
    /// Decode and column failures mean the statement ran but produced rows the
    /// report cannot trust, so they are reported as shape errors.
    pub(crate) fn from_query(query: &'static str, source: sqlx::Error) -> Self {
        match source {
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::RowNotFound
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::Decode(_) => Self::QueryShape {
                query,
                detail: source.to_string(),
            },
            other => Self::Query {
                query,
                source: other,
            },
        }
    }
}
