//! Core types for the analyzer (line model, verdicts, incident output contract).

use serde::{Deserialize, Serialize};

/// Stable per-job identifier of a structural template.
pub type TemplateId = u32;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One raw line with its 1-based position in the job's input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
  pub position: usize,
  pub raw: String,
}

impl LogLine {
  pub fn new(position: usize, raw: impl Into<String>) -> Self {
    Self {
      position,
      raw: raw.into(),
    }
  }
}

/// Result of feeding one line to a template miner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMatch {
  pub id: TemplateId,
  pub template: String,
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Per-line outcome of scoring + flagging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyVerdict {
  pub score: f64,
  /// Score fell below the adaptive threshold.
  pub model_flag: bool,
  /// Severity at or above the high-severity override.
  pub severity_flag: bool,
}

impl AnomalyVerdict {
  pub fn is_flagged(&self) -> bool {
    self.model_flag || self.severity_flag
  }
}

/// A line that survived flagging, with everything the aggregator needs.
#[derive(Debug, Clone, PartialEq)]
pub struct FlaggedLine {
  pub position: usize,
  pub score: f64,
  pub model_flag: bool,
  pub severity: f64,
  pub template_id: TemplateId,
  pub template: String,
  pub example: String,
}

// ---------------------------------------------------------------------------
// Output (JSON contract, mirrors the persisted Incident row)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
  pub template_id: TemplateId,
  /// blake3 fingerprint of the template text, stable across jobs.
  pub fingerprint: String,
  pub incident_template: String,
  pub occurrences: u64,
  pub avg_score: f64,
  pub severity: f64,
  pub example_log: String,
}
