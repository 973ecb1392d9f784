//! Statistical PDF reports for the library management database.
//!
//! A run flows through fixed stages: [`aggregator`] reads one consistent
//! snapshot of the database into [`stats::ReportStatistics`], [`charts`]
//! draws PNG charts from it, [`layout`] arranges everything into a
//! [`model::ReportDocument`], and [`assembler`] renders that document to
//! `report.pdf` (plus an optional LaTeX build). [`pipeline`] ties the stages
//! together.

pub mod aggregator;
pub mod assembler;
pub mod builder;
pub mod charts;
pub mod config;
pub mod elements;
pub mod error;
pub mod fonts;
pub mod latex;
pub mod layout;
pub mod model;
pub mod pipeline;
pub mod richtext;
pub mod stats;

#[cfg(feature = "bookmarks")]
pub mod bookmarks;

pub use config::Settings;
pub use error::ReportError;
pub use pipeline::{ReportOutcome, ReportPipeline};
