//! Analyzer configuration with sane defaults.

use crate::error::AnalysisError;

/// Isolation forest parameters. One fresh forest is fitted per analysis.
#[derive(Debug, Clone)]
pub struct ForestConfig {
  pub trees: usize,
  /// Upper bound on rows drawn per tree; clamped to the row count.
  pub sample_size: usize,
  pub seed: u64,
}

impl Default for ForestConfig {
  fn default() -> Self {
    Self {
      trees: 100,
      sample_size: 256,
      seed: 42,
    }
  }
}

/// Tunable parameters for the analysis pipeline.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
  /// Preceding lines included in the windowed template frequency.
  pub window_size: usize,
  /// Below this many lines no statistics are computed.
  pub min_lines: usize,
  /// Severity at or above which a line is flagged regardless of its score.
  pub high_severity: f64,
  /// Threshold = mean(scores) - threshold_sigmas * stdev(scores).
  pub threshold_sigmas: f64,
  /// Minimum fraction of matching tokens for a line to join a template.
  pub similarity_threshold: f64,
  pub forest: ForestConfig,
}

impl Default for AnalysisConfig {
  fn default() -> Self {
    Self {
      window_size: 3,
      min_lines: 10,
      high_severity: crate::severity::HIGH_SEVERITY,
      threshold_sigmas: 2.0,
      similarity_threshold: 0.4,
      forest: ForestConfig::default(),
    }
  }
}

impl AnalysisConfig {
  pub fn validate(&self) -> Result<(), AnalysisError> {
    if self.min_lines < 2 {
      return Err(AnalysisError::validation("min_lines", "must be at least 2"));
    }
    if !(0.0..=1.0).contains(&self.similarity_threshold) {
      return Err(AnalysisError::validation(
        "similarity_threshold",
        "must be within 0..=1",
      ));
    }
    if !self.threshold_sigmas.is_finite() || self.threshold_sigmas < 0.0 {
      return Err(AnalysisError::validation(
        "threshold_sigmas",
        "must be a finite non-negative number",
      ));
    }
    if self.forest.trees == 0 {
      return Err(AnalysisError::validation("forest.trees", "must be positive"));
    }
    if self.forest.sample_size < 2 {
      return Err(AnalysisError::validation(
        "forest.sample_size",
        "must be at least 2",
      ));
    }
    Ok(())
  }
}
