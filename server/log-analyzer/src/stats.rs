//! Small descriptive statistics shared by the feature pipeline and the flagging rule.

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
  if values.is_empty() {
    return 0.0;
  }
  values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance (divides by n).
pub fn variance(values: &[f64]) -> f64 {
  if values.is_empty() {
    return 0.0;
  }
  let m = mean(values);
  values.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
  variance(values).sqrt()
}

/// Scale applied when standardising: zero (or non-finite) spread maps to 1.0
/// so a constant column becomes all zeros instead of NaN.
pub fn safe_scale(std: f64) -> f64 {
  if std.is_finite() && std > f64::EPSILON {
    std
  } else {
    1.0
  }
}

/// Adaptive one-sided gate: `mean - sigmas * stdev`.
pub fn lower_threshold(values: &[f64], sigmas: f64) -> f64 {
  mean(values) - sigmas * std_dev(values)
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
  let factor = 10f64.powi(decimals);
  (value * factor).round() / factor
}
