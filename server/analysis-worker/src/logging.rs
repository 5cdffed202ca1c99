//! Tracing subscriber setup: human-readable in development, JSON lines in production.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Level comes from `RUST_LOG`, default `info`.
pub fn init(json: bool) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  if json {
    tracing_subscriber::registry()
      .with(filter)
      .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
      .init();
  } else {
    tracing_subscriber::registry()
      .with(filter)
      .with(tracing_subscriber::fmt::layer())
      .init();
  }
}
