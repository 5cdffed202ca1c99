//! Single-pass feature construction: raw lines → numeric feature matrix.
//!
//! Only compact per-line buffers are kept while streaming (severity, length,
//! optional timestamp, template id) plus one example line per template.
//! Frequencies and the time-delta column need the complete pass, so the
//! matrix is assembled in [`FeaturePipeline::finish`].

use std::collections::HashMap;

use crate::stats;
use crate::template::TemplateMiner;
use crate::timestamp::TimestampExtractor;
use crate::types::{LogLine, TemplateId};
use crate::severity;

pub const FEATURE_COLUMNS: usize = 5;

/// Line length is divided by this before entering the matrix.
const LENGTH_SCALE: f64 = 500.0;

// ---------------------------------------------------------------------------
// Matrix
// ---------------------------------------------------------------------------

/// Dense row-major matrix with a fixed width of [`FEATURE_COLUMNS`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
  rows: usize,
  data: Vec<f64>,
}

impl FeatureMatrix {
  /// Interleave equally long columns into rows. Returns `None` on a length mismatch.
  pub fn from_columns(columns: [&[f64]; FEATURE_COLUMNS]) -> Option<Self> {
    let rows = columns[0].len();
    if columns.iter().any(|c| c.len() != rows) {
      return None;
    }
    let mut data = Vec::with_capacity(rows * FEATURE_COLUMNS);
    for r in 0..rows {
      data.extend(columns.iter().map(|c| c[r]));
    }
    Some(Self { rows, data })
  }

  pub fn rows(&self) -> usize {
    self.rows
  }

  pub fn cols(&self) -> usize {
    FEATURE_COLUMNS
  }

  pub fn is_empty(&self) -> bool {
    self.rows == 0
  }

  pub fn row(&self, r: usize) -> &[f64] {
    &self.data[r * FEATURE_COLUMNS..(r + 1) * FEATURE_COLUMNS]
  }

  pub fn get(&self, r: usize, c: usize) -> f64 {
    self.data[r * FEATURE_COLUMNS + c]
  }

  pub fn column(&self, c: usize) -> Vec<f64> {
    (0..self.rows).map(|r| self.get(r, c)).collect()
  }

  pub fn all_finite(&self) -> bool {
    self.data.iter().all(|v| v.is_finite())
  }

  /// Column-wise zero mean / unit variance over the whole matrix.
  /// Zero-variance columns collapse to zeros.
  pub fn standardize(&mut self) {
    for c in 0..FEATURE_COLUMNS {
      let column = self.column(c);
      let mean = stats::mean(&column);
      let scale = stats::safe_scale(stats::std_dev(&column));
      for r in 0..self.rows {
        let v = &mut self.data[r * FEATURE_COLUMNS + c];
        *v = (*v - mean) / scale;
      }
    }
  }

  pub fn standardized(mut self) -> Self {
    self.standardize();
    self
  }
}

// ---------------------------------------------------------------------------
// Pipeline output
// ---------------------------------------------------------------------------

/// Per-template data cached during the pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateInfo {
  pub template: String,
  /// First raw line seen with this template.
  pub example: String,
}

/// Everything downstream stages need after the pass.
#[derive(Debug, Clone)]
pub struct FeatureSet {
  /// Unscaled feature rows, one per line.
  pub matrix: FeatureMatrix,
  pub severities: Vec<f64>,
  pub template_ids: Vec<TemplateId>,
  pub templates: HashMap<TemplateId, TemplateInfo>,
}

impl FeatureSet {
  pub fn len(&self) -> usize {
    self.matrix.rows()
  }

  pub fn is_empty(&self) -> bool {
    self.matrix.is_empty()
  }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct FeaturePipeline<M> {
  extractor: TimestampExtractor,
  miner: M,
  window_size: usize,
  min_lines: usize,
  timestamps: Vec<Option<f64>>,
  severities: Vec<f64>,
  lengths: Vec<f64>,
  template_ids: Vec<TemplateId>,
  examples: HashMap<TemplateId, String>,
}

impl<M: TemplateMiner> FeaturePipeline<M> {
  pub fn new(extractor: TimestampExtractor, miner: M, window_size: usize, min_lines: usize) -> Self {
    Self {
      extractor,
      miner,
      window_size,
      min_lines,
      timestamps: Vec::new(),
      severities: Vec::new(),
      lengths: Vec::new(),
      template_ids: Vec::new(),
      examples: HashMap::new(),
    }
  }

  /// Number of lines pushed so far.
  pub fn len(&self) -> usize {
    self.severities.len()
  }

  pub fn is_empty(&self) -> bool {
    self.severities.is_empty()
  }

  /// Consume a line source once, assigning 1-based positions.
  pub fn ingest<I, S>(&mut self, lines: I)
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    for raw in lines {
      let line = LogLine::new(self.len() + 1, raw.as_ref().trim());
      self.push(&line);
    }
  }

  pub fn push(&mut self, line: &LogLine) {
    let text = line.raw.as_str();
    let ts = self
      .extractor
      .extract(text)
      .map(|dt| dt.timestamp_millis() as f64 / 1000.0);
    let matched = self.miner.add_line(text);

    self
      .examples
      .entry(matched.id)
      .or_insert_with(|| text.to_string());

    self.timestamps.push(ts);
    self.severities.push(severity::score(text));
    self.lengths.push(text.chars().count() as f64);
    self.template_ids.push(matched.id);
  }

  /// Assemble the (unscaled) matrix. `None` when too few lines were seen.
  pub fn finish(self) -> Option<FeatureSet> {
    let n = self.len();
    if n < self.min_lines {
      return None;
    }

    let frequency = template_frequency(&self.template_ids);
    let window = windowed_mean(&frequency, self.window_size);
    let time_delta = time_delta_log(&self.timestamps);
    let length: Vec<f64> = self.lengths.iter().map(|l| l / LENGTH_SCALE).collect();

    let matrix = FeatureMatrix::from_columns([
      &self.severities,
      &time_delta,
      &length,
      &frequency,
      &window,
    ])?;

    let miner = self.miner;
    let templates = self
      .examples
      .into_iter()
      .map(|(id, example)| {
        let template = miner.template(id).unwrap_or_default().trim().to_string();
        (id, TemplateInfo { template, example })
      })
      .collect();

    Some(FeatureSet {
      matrix,
      severities: self.severities,
      template_ids: self.template_ids,
      templates,
    })
  }
}

/// Share of all lines that belong to each line's template.
pub fn template_frequency(ids: &[TemplateId]) -> Vec<f64> {
  let n = ids.len() as f64;
  let mut counts: HashMap<TemplateId, usize> = HashMap::new();
  for id in ids {
    *counts.entry(*id).or_insert(0) += 1;
  }
  ids.iter().map(|id| counts[id] as f64 / n).collect()
}

/// Trailing, self-inclusive mean over `window_size + 1` points; shorter at the start.
pub fn windowed_mean(values: &[f64], window_size: usize) -> Vec<f64> {
  let width = window_size + 1;
  let mut out = Vec::with_capacity(values.len());
  let mut sum = 0.0;
  for (i, v) in values.iter().enumerate() {
    sum += v;
    if i >= width {
      sum -= values[i - width];
    }
    out.push(sum / (i + 1).min(width) as f64);
  }
  out
}

/// `ln(1 + |Δt|)` between consecutive lines after forward then backward fill.
/// All zeros when no line carries a timestamp.
pub fn time_delta_log(timestamps: &[Option<f64>]) -> Vec<f64> {
  let n = timestamps.len();
  let first_known = match timestamps.iter().flatten().next() {
    Some(ts) => *ts,
    None => return vec![0.0; n],
  };

  // Leading gaps take the first known value (backward fill); the rest carry forward.
  let mut filled = Vec::with_capacity(n);
  let mut last = first_known;
  for ts in timestamps {
    if let Some(t) = ts {
      last = *t;
    }
    filled.push(last);
  }

  let mut out = Vec::with_capacity(n);
  for i in 0..n {
    let delta = if i == 0 {
      0.0
    } else {
      (filled[i] - filled[i - 1]).abs()
    };
    out.push(delta.ln_1p());
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::template::DrainMiner;
  use chrono::NaiveDate;

  fn pipeline(window: usize) -> FeaturePipeline<DrainMiner> {
    let extractor =
      TimestampExtractor::with_reference_date(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
    FeaturePipeline::new(extractor, DrainMiner::default(), window, 10)
  }

  #[test]
  fn fewer_than_min_lines_yields_nothing() {
    let mut p = pipeline(3);
    p.ingest(vec!["line"; 9]);
    assert!(p.finish().is_none());

    let mut p = pipeline(3);
    p.ingest(Vec::<String>::new());
    assert!(p.finish().is_none());
  }

  #[test]
  fn matrix_has_one_row_per_line() {
    let lines: Vec<String> = (0..25)
      .map(|i| format!("25/01/15 10:00:{:02} INFO Worker-1: Task {} done", i, i))
      .collect();
    let mut p = pipeline(3);
    p.ingest(lines.iter());
    let set = p.finish().unwrap();
    assert_eq!(set.len(), 25);
    assert_eq!(set.matrix.cols(), FEATURE_COLUMNS);
    assert_eq!(set.template_ids.len(), 25);
    assert!(set.matrix.all_finite());
    // one second between consecutive lines
    assert!((set.matrix.get(3, 1) - 1f64.ln_1p()).abs() < 1e-9);
    assert_eq!(set.matrix.get(0, 1), 0.0);
  }

  #[test]
  fn streamed_source_is_consumed_once() {
    let source = (0..12).map(|i| format!("event {}", i));
    let mut p = pipeline(3);
    p.ingest(source);
    assert_eq!(p.len(), 12);
  }

  #[test]
  fn example_is_first_line_per_template() {
    let lines = [
      "user alice logged in",
      "user bob logged in",
      "disk full on volume",
      "user carol logged in",
      "disk full on volume",
      "a", "b", "c", "d", "e",
    ];
    let mut p = pipeline(3);
    p.ingest(lines);
    let set = p.finish().unwrap();
    let id = set.template_ids[0];
    assert_eq!(set.templates[&id].example, "user alice logged in");
    assert_eq!(set.templates[&id].template, "user <*> logged in");
  }

  #[test]
  fn template_frequency_is_share_of_lines() {
    let f = template_frequency(&[1, 1, 2, 1]);
    assert_eq!(f, vec![0.75, 0.75, 0.25, 0.75]);
  }

  #[test]
  fn windowed_mean_first_point_is_own_value() {
    let values = [0.5, 0.1, 0.3, 0.7, 0.9, 0.2];
    let w = windowed_mean(&values, 3);
    assert_eq!(w[0], 0.5);
    assert!((w[1] - 0.3).abs() < 1e-12);
    assert!((w[3] - (0.5 + 0.1 + 0.3 + 0.7) / 4.0).abs() < 1e-12);
    // trailing: index 5 averages 2..=5
    assert!((w[5] - (0.3 + 0.7 + 0.9 + 0.2) / 4.0).abs() < 1e-12);
  }

  #[test]
  fn time_delta_all_missing_is_zero() {
    assert_eq!(time_delta_log(&[None, None, None]), vec![0.0, 0.0, 0.0]);
  }

  #[test]
  fn time_delta_fills_forward_then_backward() {
    let ts = [None, Some(10.0), None, Some(13.0), None];
    let d = time_delta_log(&ts);
    // filled: 10, 10, 10, 13, 13
    assert_eq!(d[0], 0.0);
    assert_eq!(d[1], 0.0);
    assert_eq!(d[2], 0.0);
    assert!((d[3] - 3f64.ln_1p()).abs() < 1e-12);
    assert_eq!(d[4], 0.0);
  }

  #[test]
  fn time_delta_uses_absolute_difference() {
    let d = time_delta_log(&[Some(100.0), Some(40.0)]);
    assert!((d[1] - 60f64.ln_1p()).abs() < 1e-12);
  }

  #[test]
  fn zero_variance_column_standardizes_to_zero() {
    let constant = [2.0; 12];
    let varying: Vec<f64> = (0..12).map(|i| i as f64).collect();
    let mut m = FeatureMatrix::from_columns([&constant, &varying, &constant, &varying, &constant]).unwrap();
    m.standardize();
    assert!(m.all_finite());
    assert!(m.column(0).iter().all(|v| *v == 0.0));
    let col = m.column(1);
    assert!(stats::mean(&col).abs() < 1e-12);
    assert!((stats::std_dev(&col) - 1.0).abs() < 1e-12);
  }

  #[test]
  fn mismatched_columns_rejected() {
    let a = [1.0, 2.0];
    let b = [1.0];
    assert!(FeatureMatrix::from_columns([&a, &b, &a, &a, &a]).is_none());
  }
}
