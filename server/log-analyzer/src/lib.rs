//! Log Sentinel analyzer: unsupervised incident extraction from raw log text.
//!
//! Lines are parsed for a timestamp and keyword severity, clustered into
//! structural templates, turned into a standardised feature matrix and scored
//! with an isolation forest. Outliers and high-severity lines are grouped per
//! template into ranked incidents.
//!
//! No DB, no network; pure computation scoped to a single input.

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod forest;
pub mod severity;
pub mod stats;
pub mod template;
pub mod timestamp;
pub mod types;

pub use config::{AnalysisConfig, ForestConfig};
pub use engine::{AnalysisReport, Analyzer};
pub use error::AnalysisError;
pub use timestamp::TimestampExtractor;
pub use types::Incident;
