//! Flagging and incident aggregation.
//!
//! Flagging combines the model's view (score below an adaptive threshold)
//! with a severity override. Aggregation groups flagged lines per template
//! and ranks the resulting incidents.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::stats;
use crate::template;
use crate::types::{AnomalyVerdict, FlaggedLine, Incident, TemplateId};

/// Decimals kept for `avg_score`.
const SCORE_DECIMALS: i32 = 4;

/// Adaptive threshold: `mean(scores) - sigmas * stdev(scores)`.
pub fn threshold(scores: &[f64], sigmas: f64) -> f64 {
  stats::lower_threshold(scores, sigmas)
}

/// Per-line verdicts. `scores` and `severities` are parallel.
pub fn flag(
  scores: &[f64],
  severities: &[f64],
  sigmas: f64,
  high_severity: f64,
) -> Vec<AnomalyVerdict> {
  let cutoff = threshold(scores, sigmas);
  scores
    .iter()
    .zip(severities)
    .map(|(&score, &severity)| AnomalyVerdict {
      score,
      model_flag: score < cutoff,
      severity_flag: severity >= high_severity,
    })
    .collect()
}

#[derive(Debug)]
struct Bucket {
  first_seen: usize,
  template: String,
  example: String,
  severity: f64,
  occurrences: u64,
  score_sum: f64,
}

/// Fold flagged lines into incidents, most severe first.
///
/// Lines are visited in ascending score order, so an incident's severity comes
/// from its most anomalous line.
pub fn aggregate(mut flagged: Vec<FlaggedLine>) -> Vec<Incident> {
  flagged.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal));

  let mut buckets: HashMap<TemplateId, Bucket> = HashMap::new();
  for (rank, line) in flagged.into_iter().enumerate() {
    let bucket = buckets.entry(line.template_id).or_insert_with(|| Bucket {
      first_seen: rank,
      template: line.template.clone(),
      example: line.example.clone(),
      severity: line.severity,
      occurrences: 0,
      score_sum: 0.0,
    });
    bucket.occurrences += 1;
    bucket.score_sum += line.score;
  }

  let mut ordered: Vec<(TemplateId, Bucket)> = buckets.into_iter().collect();
  ordered.sort_by_key(|(_, b)| b.first_seen);

  let mut incidents: Vec<Incident> = ordered
    .into_iter()
    .map(|(template_id, b)| Incident {
      template_id,
      fingerprint: template::fingerprint(&b.template),
      incident_template: b.template,
      occurrences: b.occurrences,
      avg_score: stats::round_to(b.score_sum / b.occurrences as f64, SCORE_DECIMALS),
      severity: b.severity,
      example_log: b.example,
    })
    .collect();

  incidents.sort_by(|a, b| {
    b.severity
      .partial_cmp(&a.severity)
      .unwrap_or(Ordering::Equal)
      .then(b.occurrences.cmp(&a.occurrences))
  });
  incidents
}

#[cfg(test)]
mod tests {
  use super::*;

  fn line(position: usize, score: f64, severity: f64, template_id: TemplateId) -> FlaggedLine {
    FlaggedLine {
      position,
      score,
      model_flag: true,
      severity,
      template_id,
      template: format!("template {}", template_id),
      example: format!("line {}", position),
    }
  }

  #[test]
  fn severity_override_flags_regardless_of_score() {
    let scores = [0.1, 0.1, 0.1, 0.1];
    let severities = [0.0, 3.0, 0.0, 5.0];
    let verdicts = flag(&scores, &severities, 2.0, 3.0);
    let flagged: Vec<bool> = verdicts.iter().map(|v| v.is_flagged()).collect();
    assert_eq!(flagged, vec![false, true, false, true]);
    assert!(verdicts.iter().all(|v| !v.model_flag));
  }

  #[test]
  fn low_score_is_model_flagged() {
    let mut scores = vec![0.1; 20];
    scores[7] = -0.5;
    let severities = vec![0.0; 20];
    let verdicts = flag(&scores, &severities, 2.0, 3.0);
    assert!(verdicts[7].model_flag);
    assert_eq!(verdicts.iter().filter(|v| v.is_flagged()).count(), 1);
  }

  #[test]
  fn empty_input_yields_no_incidents() {
    assert!(aggregate(Vec::new()).is_empty());
  }

  #[test]
  fn first_lowest_score_line_sets_example_and_severity() {
    let incidents = aggregate(vec![
      line(1, -0.1, 1.0, 4),
      line(2, -0.3, 3.0, 4),
      line(3, -0.2, 0.0, 4),
    ]);
    assert_eq!(incidents.len(), 1);
    let inc = &incidents[0];
    assert_eq!(inc.example_log, "line 2");
    assert_eq!(inc.severity, 3.0);
    assert_eq!(inc.occurrences, 3);
    assert_eq!(inc.avg_score, -0.2);
  }

  #[test]
  fn severity_ranks_before_occurrences() {
    let mut flagged = vec![line(1, -0.1, 5.0, 1), line(2, -0.1, 5.0, 1)];
    flagged.extend((0..50).map(|i| line(10 + i, -0.2, 3.0, 2)));
    let incidents = aggregate(flagged);
    assert_eq!(incidents[0].severity, 5.0);
    assert_eq!(incidents[0].occurrences, 2);
    assert_eq!(incidents[1].occurrences, 50);
  }

  #[test]
  fn occurrences_break_severity_ties() {
    let incidents = aggregate(vec![
      line(1, -0.5, 0.0, 1),
      line(2, -0.4, 0.0, 2),
      line(3, -0.3, 0.0, 2),
    ]);
    assert_eq!(incidents[0].template_id, 2);
    assert_eq!(incidents[1].template_id, 1);
  }

  #[test]
  fn full_ties_keep_score_order() {
    let incidents = aggregate(vec![line(1, -0.1, 1.0, 9), line(2, -0.4, 1.0, 3)]);
    assert_eq!(incidents[0].template_id, 3);
    assert_eq!(incidents[1].template_id, 9);
  }

  #[test]
  fn occurrences_sum_to_flagged_count() {
    let flagged: Vec<FlaggedLine> = (0..17)
      .map(|i| line(i, -(i as f64) / 100.0, (i % 3) as f64, (i % 4) as TemplateId))
      .collect();
    let total: u64 = aggregate(flagged).iter().map(|i| i.occurrences).sum();
    assert_eq!(total, 17);
  }

  #[test]
  fn avg_score_rounded_to_four_decimals() {
    let incidents = aggregate(vec![line(1, -0.123456, 0.0, 1)]);
    assert_eq!(incidents[0].avg_score, -0.1235);
  }
}
