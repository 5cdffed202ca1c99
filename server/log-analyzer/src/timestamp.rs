//! Best-effort timestamp extraction from raw, heterogeneous log lines.
//!
//! Heuristics are tried in a fixed order and the first one that yields a
//! valid point in time wins. Absence of a timestamp is a normal outcome.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
  // 1705321353 (seconds since epoch)
  static ref EPOCH: Regex = Regex::new(r"\b([0-9]{10})\b").unwrap();

  // [15/Jan/2024:14:22:33 +0100]
  static ref APACHE: Regex = Regex::new(
    r"\[([0-9]{2}/[A-Za-z]{3}/[0-9]{4}:[0-9]{2}:[0-9]{2}:[0-9]{2}\s+[+-][0-9]{4})\]"
  ).unwrap();

  // Jan  5 14:22:33
  static ref SYSLOG: Regex = Regex::new(
    r"([A-Z][a-z]{2}\s+[0-9]{1,2}\s+[0-9]{2}:[0-9]{2}:[0-9]{2})"
  ).unwrap();

  // 2024-01-15T14:22:33.123Z, 15.01.2024 14:22:33, 25/01/15 10:30:00
  static ref NUMERIC_DATE: Regex = Regex::new(
    r"([0-9]{2,4})([./-])([0-9]{2})[./-]([0-9]{2,4})(?:[ T]([0-9]{2}):([0-9]{2}):([0-9]{2})(?:\.([0-9]+))?Z?)?"
  ).unwrap();

  // 20240115142233
  static ref COMPACT: Regex = Regex::new(r"\b([0-9]{14})\b").unwrap();

  static ref BARE_TIME: Regex = Regex::new(r"([0-9]{2}):([0-9]{2}):([0-9]{2})").unwrap();

  // Looser time used by the fuzzy fallback: 9:05, 09:05:01, 09:05:01.250
  static ref LOOSE_TIME: Regex = Regex::new(
    r"([0-9]{1,2}):([0-9]{2})(?::([0-9]{2}))?(?:\.([0-9]+))?"
  ).unwrap();
}

const MONTHS: [&str; 12] = [
  "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Extracts a point in time from a single line.
///
/// Holds the reference date used for formats that carry no year (syslog) or
/// no date at all (bare `HH:MM:SS`).
#[derive(Debug, Clone, Copy)]
pub struct TimestampExtractor {
  today: NaiveDate,
}

impl Default for TimestampExtractor {
  fn default() -> Self {
    Self::new()
  }
}

impl TimestampExtractor {
  /// Extractor anchored to the current UTC date.
  pub fn new() -> Self {
    Self::with_reference_date(Utc::now().date_naive())
  }

  pub fn with_reference_date(today: NaiveDate) -> Self {
    Self { today }
  }

  /// Returns the first recognised timestamp, or `None`.
  ///
  /// Naive date-times are interpreted as UTC.
  pub fn extract(&self, line: &str) -> Option<DateTime<Utc>> {
    if let Some(ts) = epoch(head(line, 20)) {
      return Some(ts);
    }

    let window = head(line, 70);
    self
      .apache(window)
      .or_else(|| self.syslog(window))
      .or_else(|| self.numeric_date(window))
      .or_else(|| compact(window))
      .or_else(|| self.bare_time(head(line, 50)))
  }

  fn apache(&self, window: &str) -> Option<DateTime<Utc>> {
    let candidate = APACHE.captures(window)?.get(1)?.as_str();
    DateTime::parse_from_str(candidate, "%d/%b/%Y:%H:%M:%S %z")
      .map(|dt| dt.with_timezone(&Utc))
      .ok()
      .or_else(|| self.fuzzy(candidate))
  }

  fn syslog(&self, window: &str) -> Option<DateTime<Utc>> {
    let candidate = SYSLOG.captures(window)?.get(1)?.as_str();
    let collapsed = candidate.split_whitespace().collect::<Vec<_>>().join(" ");
    let with_year = format!("{} {}", self.today.year(), collapsed);
    NaiveDateTime::parse_from_str(&with_year, "%Y %b %d %H:%M:%S")
      .map(|naive| naive.and_utc())
      .ok()
      .or_else(|| self.fuzzy(candidate))
  }

  fn numeric_date(&self, window: &str) -> Option<DateTime<Utc>> {
    let caps = NUMERIC_DATE.captures(window)?;
    let candidate = caps.get(0)?.as_str();

    let strict = || -> Option<DateTime<Utc>> {
      let sep = caps.get(2)?.as_str();
      let date = resolve_numeric_date(&caps[1], sep, &caps[3], &caps[4])?;
      let time = match (caps.get(5), caps.get(6), caps.get(7)) {
        (Some(h), Some(m), Some(s)) => {
          clock(h.as_str(), m.as_str(), Some(s.as_str()), caps.get(8).map(|f| f.as_str()))?
        }
        _ => NaiveTime::MIN,
      };
      Some(date.and_time(time).and_utc())
    };

    strict().or_else(|| self.fuzzy(candidate))
  }

  fn bare_time(&self, window: &str) -> Option<DateTime<Utc>> {
    let caps = BARE_TIME.captures(window)?;
    let time = clock(&caps[1], &caps[2], Some(&caps[3]), None)?;
    Some(self.today.and_time(time).and_utc())
  }

  /// Permissive parse of a candidate substring: picks out a clock time, a
  /// month name and the remaining numbers, filling gaps from the reference
  /// date.
  fn fuzzy(&self, candidate: &str) -> Option<DateTime<Utc>> {
    let (time, rest) = match LOOSE_TIME.captures(candidate) {
      Some(caps) => {
        let time = clock(
          &caps[1],
          &caps[2],
          caps.get(3).map(|s| s.as_str()),
          caps.get(4).map(|f| f.as_str()),
        );
        let whole = caps.get(0)?;
        let rest = format!("{} {}", &candidate[..whole.start()], &candidate[whole.end()..]);
        (time, rest)
      }
      None => (None, candidate.to_string()),
    };

    let tokens: Vec<&str> = rest
      .split(|c: char| !c.is_ascii_alphanumeric())
      .filter(|t| !t.is_empty())
      .collect();

    let month_name = tokens.iter().find_map(|t| month_from_name(t));
    let mut numbers: Vec<(u32, usize)> = tokens
      .iter()
      .filter(|t| t.len() <= 4 && t.bytes().all(|b| b.is_ascii_digit()))
      .filter_map(|t| t.parse::<u32>().ok().map(|v| (v, t.len())))
      .collect();

    // Three-digit groups (addresses, ports, codes) never belong to a date.
    if numbers.iter().any(|(_, width)| *width == 3) {
      return None;
    }

    let year = take_first(&mut numbers, |(v, width)| *width == 4 || *v > 31)
      .map(|(v, width)| if width == 4 { v as i32 } else { expand_two_digit_year(v) });

    // Month then day, in the order they appear; an out-of-range group rejects
    // the candidate instead of being reordered.
    let month = match month_name {
      Some(m) => Some(m),
      None if numbers.len() >= 2 => Some(numbers.remove(0).0),
      None => None,
    };
    if month.is_some_and(|m| !(1..=12).contains(&m)) {
      return None;
    }
    let day = match numbers.first() {
      Some(&(d, _)) if (1..=31).contains(&d) => Some(d),
      Some(_) => return None,
      None => None,
    };

    if year.is_none() && month.is_none() && day.is_none() && time.is_none() {
      return None;
    }

    let date = NaiveDate::from_ymd_opt(
      year.unwrap_or_else(|| self.today.year()),
      month.unwrap_or_else(|| self.today.month()),
      day.unwrap_or_else(|| self.today.day()),
    )?;
    Some(date.and_time(time.unwrap_or(NaiveTime::MIN)).and_utc())
  }
}

fn epoch(window: &str) -> Option<DateTime<Utc>> {
  let secs: i64 = EPOCH.captures(window)?[1].parse().ok()?;
  DateTime::from_timestamp(secs, 0)
}

fn compact(window: &str) -> Option<DateTime<Utc>> {
  let caps = COMPACT.captures(window)?;
  NaiveDateTime::parse_from_str(&caps[1], "%Y%m%d%H%M%S")
    .ok()
    .map(|naive| naive.and_utc())
}

/// Prefix of `line` holding at most `chars` characters.
fn head(line: &str, chars: usize) -> &str {
  match line.char_indices().nth(chars) {
    Some((idx, _)) => &line[..idx],
    None => line,
  }
}

/// Strict interpretation of `first<sep>middle<sep>last`.
///
/// 4-digit first group: Y-M-D. 4-digit last group: D.M.Y for dots, otherwise
/// M/D/Y unless the first group cannot be a month. All two-digit: YY/MM/DD,
/// then MM/DD/YY, then DD/MM/YY.
fn resolve_numeric_date(first: &str, sep: &str, middle: &str, last: &str) -> Option<NaiveDate> {
  let a: u32 = first.parse().ok()?;
  let b: u32 = middle.parse().ok()?;
  let c: u32 = last.parse().ok()?;

  match (first.len(), last.len()) {
    (4, 2) => NaiveDate::from_ymd_opt(a as i32, b, c),
    (2, 4) if sep == "." || a > 12 => NaiveDate::from_ymd_opt(c as i32, b, a),
    (2, 4) => NaiveDate::from_ymd_opt(c as i32, a, b),
    (2, 2) => NaiveDate::from_ymd_opt(expand_two_digit_year(a), b, c)
      .or_else(|| NaiveDate::from_ymd_opt(expand_two_digit_year(c), a, b))
      .or_else(|| NaiveDate::from_ymd_opt(expand_two_digit_year(c), b, a)),
    _ => None,
  }
}

fn clock(hour: &str, minute: &str, second: Option<&str>, fraction: Option<&str>) -> Option<NaiveTime> {
  let h: u32 = hour.parse().ok()?;
  let m: u32 = minute.parse().ok()?;
  let s: u32 = match second {
    Some(s) => s.parse().ok()?,
    None => 0,
  };
  let nanos = match fraction {
    Some(f) => {
      let digits: String = f.chars().chain(std::iter::repeat('0')).take(9).collect();
      digits.parse().ok()?
    }
    None => 0,
  };
  NaiveTime::from_hms_nano_opt(h, m, s, nanos)
}

/// POSIX `%y` convention: 69-99 → 1969-1999, 00-68 → 2000-2068.
fn expand_two_digit_year(yy: u32) -> i32 {
  if yy >= 69 {
    1900 + yy as i32
  } else {
    2000 + yy as i32
  }
}

fn month_from_name(token: &str) -> Option<u32> {
  if token.len() < 3 || !token.chars().all(|c| c.is_ascii_alphabetic()) {
    return None;
  }
  let prefix = token[..3].to_ascii_lowercase();
  MONTHS
    .iter()
    .position(|m| *m == prefix)
    .map(|idx| idx as u32 + 1)
}

fn take_first<T: Copy>(items: &mut Vec<T>, pred: impl Fn(&T) -> bool) -> Option<T> {
  let idx = items.iter().position(pred)?;
  Some(items.remove(idx))
}
