//! Binary entrypoint: analyze one log document and print its incidents.
//!
//! Reads raw bytes from the path given as the first argument, or from stdin
//! when no argument is present. Invalid UTF-8 is replaced, never rejected.
//! Output is the incident list as pretty JSON on stdout.

use std::io::{self, Read, Write};

use log_analyzer::{AnalysisError, Analyzer};

fn read_input(path: Option<String>) -> Result<Vec<u8>, AnalysisError> {
  let mut buf = Vec::new();
  match path {
    Some(p) => buf = std::fs::read(p)?,
    None => {
      io::stdin().lock().read_to_end(&mut buf)?;
    }
  }
  Ok(buf)
}

fn run() -> Result<(), AnalysisError> {
  let bytes = read_input(std::env::args().nth(1))?;
  let text = String::from_utf8_lossy(&bytes);

  let analyzer = Analyzer::default();
  let incidents = analyzer.analyze_text(&text);

  let stdout = io::stdout();
  let mut out = io::BufWriter::new(stdout.lock());
  serde_json::to_writer_pretty(&mut out, &incidents)?;
  writeln!(out)?;
  out.flush()?;
  Ok(())
}

fn main() {
  if let Err(e) = run() {
    let _ = writeln!(io::stderr(), "log-analyzer: {}", e);
    std::process::exit(1);
  }
}
