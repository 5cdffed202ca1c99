//! Keyword severity scoring.

/// Severity at or above which a line is always flagged.
pub const HIGH_SEVERITY: f64 = 3.0;

/// Keyword table. Order matters: the first keyword present wins, even when a
/// later one carries a higher score.
const KEYWORDS: [(&str, f64); 5] = [
  ("FATAL", 5.0),
  ("EXCEPTION", 3.5),
  ("ERROR", 3.0),
  ("FAIL", 3.0),
  ("WARN", 1.0),
];

/// Case-insensitive substring scan of the whole line; 0.0 when no keyword matches.
pub fn score(line: &str) -> f64 {
  let upper = line.to_ascii_uppercase();
  KEYWORDS
    .iter()
    .find(|(word, _)| upper.contains(word))
    .map(|(_, score)| *score)
    .unwrap_or(0.0)
}
