//! Structural template mining: groups lines whose shape matches into clusters.
//!
//! The miner is incremental and scoped to a single analysis; a fresh instance
//! is created per job and dropped afterwards.

use std::collections::HashMap;

use crate::types::{TemplateId, TemplateMatch};

/// Placeholder for a variable token.
pub const WILDCARD: &str = "<*>";

/// Incremental clustering of lines into structural templates.
pub trait TemplateMiner {
  /// Feed the next line; returns its cluster id and the cluster's template so far.
  fn add_line(&mut self, line: &str) -> TemplateMatch;

  /// Current template text of a cluster.
  fn template(&self, id: TemplateId) -> Option<&str>;
}

#[derive(Debug)]
struct Cluster {
  id: TemplateId,
  tokens: Vec<String>,
  template: String,
}

impl Cluster {
  fn new(id: TemplateId, tokens: Vec<String>) -> Self {
    let template = tokens.join(" ");
    Self {
      id,
      tokens,
      template,
    }
  }

  /// Fraction of positions where both sides hold the same literal token.
  fn similarity(&self, tokens: &[String]) -> f64 {
    if tokens.is_empty() {
      return 1.0;
    }
    let same = self
      .tokens
      .iter()
      .zip(tokens)
      .filter(|(ours, theirs)| ours.as_str() != WILDCARD && ours == theirs)
      .count();
    same as f64 / tokens.len() as f64
  }

  fn absorb(&mut self, tokens: &[String]) {
    let mut changed = false;
    for (ours, theirs) in self.tokens.iter_mut().zip(tokens) {
      if ours != theirs && ours.as_str() != WILDCARD {
        *ours = WILDCARD.to_string();
        changed = true;
      }
    }
    if changed {
      self.template = self.tokens.join(" ");
    }
  }
}

/// Drain-style miner: lines are routed by token count and leading token, then
/// matched against the most similar cluster on that route.
#[derive(Debug)]
pub struct DrainMiner {
  similarity_threshold: f64,
  routes: HashMap<(usize, String), Vec<usize>>,
  clusters: Vec<Cluster>,
}

impl DrainMiner {
  pub fn new(similarity_threshold: f64) -> Self {
    Self {
      similarity_threshold,
      routes: HashMap::new(),
      clusters: Vec::new(),
    }
  }

  pub fn cluster_count(&self) -> usize {
    self.clusters.len()
  }
}

impl Default for DrainMiner {
  fn default() -> Self {
    Self::new(0.4)
  }
}

impl TemplateMiner for DrainMiner {
  fn add_line(&mut self, line: &str) -> TemplateMatch {
    let tokens: Vec<String> = line.split_whitespace().map(mask_token).collect();
    let route_key = (
      tokens.len(),
      tokens.first().cloned().unwrap_or_default(),
    );

    let route = self.routes.entry(route_key).or_default();

    let best = route
      .iter()
      .map(|&idx| (idx, self.clusters[idx].similarity(&tokens)))
      .fold(None::<(usize, f64)>, |best, (idx, sim)| match best {
        Some((_, best_sim)) if best_sim >= sim => best,
        _ => Some((idx, sim)),
      });

    let idx = match best {
      Some((idx, sim)) if sim >= self.similarity_threshold => {
        self.clusters[idx].absorb(&tokens);
        idx
      }
      _ => {
        let idx = self.clusters.len();
        self.clusters.push(Cluster::new(idx as TemplateId + 1, tokens));
        route.push(idx);
        idx
      }
    };

    let cluster = &self.clusters[idx];
    TemplateMatch {
      id: cluster.id,
      template: cluster.template.clone(),
    }
  }

  fn template(&self, id: TemplateId) -> Option<&str> {
    let idx = (id as usize).checked_sub(1)?;
    self.clusters.get(idx).map(|c| c.template.as_str())
  }
}

/// Tokens carrying digits (ids, counters, addresses, durations) are variable.
fn mask_token(token: &str) -> String {
  if token.bytes().any(|b| b.is_ascii_digit()) {
    WILDCARD.to_string()
  } else {
    token.to_string()
  }
}

/// Stable fingerprint of a template's text.
///
/// Uses blake3 for a fast, deterministic hash; 32 hex chars.
pub fn fingerprint(template: &str) -> String {
  let hash = blake3::hash(template.as_bytes());
  hash.to_hex()[..32].to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn variable_numbers_share_a_cluster() {
    let mut miner = DrainMiner::default();
    let a = miner.add_line("Task 1234 completed in 100ms");
    let b = miner.add_line("Task 9876 completed in 42ms");
    assert_eq!(a.id, b.id);
    assert_eq!(b.template, "Task <*> completed in <*>");
  }

  #[test]
  fn different_shapes_get_different_ids() {
    let mut miner = DrainMiner::default();
    let a = miner.add_line("Heartbeat sent to master");
    let b = miner.add_line("Connection refused to database at host");
    let c = miner.add_line("Heartbeat sent");
    assert_ne!(a.id, b.id);
    assert_ne!(a.id, c.id);
    assert_eq!(miner.cluster_count(), 3);
  }

  #[test]
  fn similar_lines_merge_into_wildcard() {
    let mut miner = DrainMiner::default();
    let a = miner.add_line("user alice logged in");
    let b = miner.add_line("user bob logged in");
    assert_eq!(a.id, b.id);
    assert_eq!(miner.template(a.id), Some("user <*> logged in"));
  }

  #[test]
  fn dissimilar_lines_on_same_route_split() {
    let mut miner = DrainMiner::new(0.9);
    let a = miner.add_line("user alice logged in");
    let b = miner.add_line("user bob logged out");
    assert_ne!(a.id, b.id);
  }

  #[test]
  fn empty_lines_cluster_together() {
    let mut miner = DrainMiner::default();
    let a = miner.add_line("");
    let b = miner.add_line("   ");
    assert_eq!(a.id, b.id);
    assert_eq!(a.template, "");
  }

  #[test]
  fn unknown_template_id_is_none() {
    let miner = DrainMiner::default();
    assert!(miner.template(0).is_none());
    assert!(miner.template(7).is_none());
  }

  #[test]
  fn fingerprint_is_stable_and_32_hex_chars() {
    let fp = fingerprint("Task <*> completed in <*>");
    assert_eq!(fp, fingerprint("Task <*> completed in <*>"));
    assert_ne!(fp, fingerprint("Task <*> failed in <*>"));
    assert_eq!(fp.len(), 32);
    assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
  }
}
