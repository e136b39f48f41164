//! Binary entrypoint: load the snapshot, read JSON-line commands from stdin,
//! write one JSON line per command to stdout, save the snapshot on EOF
//! or when the input breaks off.
//!
//! Output lines are either:
//! - An Outcome (when the command was applied)
//! - An ErrorOutput (when the line is not UTF-8, is malformed, or the command
//!   was rejected)
//!
//! Logs go to stderr.

use dispatch_engine::command::run_stream;
use dispatch_engine::{Config, Engine, SnapshotStore};
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;

fn main() {
  let config = Config::from_env();
  init_logging(&config);

  if let Err(e) = run(&config) {
    tracing::error!(error = %e, "dispatch-engine failed");
    let _ = writeln!(io::stderr(), "dispatch-engine: {}", e);
    std::process::exit(1);
  }
}

fn init_logging(config: &Config) {
  let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .with_target(true)
    .try_init();
}

fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
  let store = SnapshotStore::from_config(config);
  let mut engine = Engine::from_snapshot(store.load()?)?;

  let stdin = io::stdin();
  let stdout = io::stdout();
  let mut out = io::BufWriter::new(stdout.lock());

  // Save whatever was applied even if the stream broke off.
  let session = run_stream(&mut engine, stdin.lock(), &mut out);
  let flushed = out.flush();
  store.save(&engine.snapshot())?;

  session?;
  flushed?;
  Ok(())
}
