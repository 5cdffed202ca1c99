//! Analyzer: wires timestamp/severity/template extraction, the feature
//! pipeline, outlier scoring, flagging and aggregation for one input.

use crate::aggregate;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::features::{FeaturePipeline, FeatureSet};
use crate::forest::{IsolationForest, OutlierScorer};
use crate::template::DrainMiner;
use crate::timestamp::TimestampExtractor;
use crate::types::{FlaggedLine, Incident};

/// Outcome of one analysis with the counters the worker logs.
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
  pub lines: usize,
  pub templates: usize,
  pub flagged: usize,
  pub incidents: Vec<Incident>,
}

/// Stateless between calls: every analysis gets a fresh miner and scorer.
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
  config: AnalysisConfig,
  extractor: TimestampExtractor,
}

impl Analyzer {
  pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
    config.validate()?;
    Ok(Self {
      config,
      extractor: TimestampExtractor::new(),
    })
  }

  /// Use a fixed reference date for partial timestamps (tests, replays).
  pub fn with_extractor(mut self, extractor: TimestampExtractor) -> Self {
    self.extractor = extractor;
    self
  }

  pub fn config(&self) -> &AnalysisConfig {
    &self.config
  }

  /// Incidents for a line source; empty when the input is too short.
  pub fn analyze<I, S>(&self, lines: I) -> Vec<Incident>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    self.analyze_report(lines).incidents
  }

  /// Split a decoded document on line breaks and analyze it.
  pub fn analyze_text(&self, text: &str) -> Vec<Incident> {
    self.analyze(text.lines())
  }

  pub fn analyze_report<I, S>(&self, lines: I) -> AnalysisReport
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let scorer = IsolationForest::new(self.config.forest.clone());
    self.analyze_with(lines, &scorer)
  }

  /// Same as [`Analyzer::analyze_report`] with a caller-supplied scorer.
  pub fn analyze_with<I, S>(&self, lines: I, scorer: &dyn OutlierScorer) -> AnalysisReport
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let mut pipeline = FeaturePipeline::new(
      self.extractor,
      DrainMiner::new(self.config.similarity_threshold),
      self.config.window_size,
      self.config.min_lines,
    );
    pipeline.ingest(lines);
    let lines = pipeline.len();

    let set = match pipeline.finish() {
      Some(set) => set,
      None => {
        return AnalysisReport {
          lines,
          ..AnalysisReport::default()
        }
      }
    };

    let flagged = self.flag_lines(&set, scorer);
    let flagged_count = flagged.len();
    AnalysisReport {
      lines,
      templates: set.templates.len(),
      flagged: flagged_count,
      incidents: aggregate::aggregate(flagged),
    }
  }

  fn flag_lines(&self, set: &FeatureSet, scorer: &dyn OutlierScorer) -> Vec<FlaggedLine> {
    let matrix = set.matrix.clone().standardized();
    let scores = scorer.score(&matrix);
    let verdicts = aggregate::flag(
      &scores,
      &set.severities,
      self.config.threshold_sigmas,
      self.config.high_severity,
    );

    verdicts
      .iter()
      .enumerate()
      .filter(|(_, v)| v.is_flagged())
      .filter_map(|(i, v)| {
        let template_id = set.template_ids[i];
        let info = set.templates.get(&template_id)?;
        Some(FlaggedLine {
          position: i + 1,
          score: v.score,
          model_flag: v.model_flag,
          severity: set.severities[i],
          template_id,
          template: info.template.clone(),
          example: info.example.clone(),
        })
      })
      .collect()
  }
}
