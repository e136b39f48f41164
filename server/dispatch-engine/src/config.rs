//! Engine configuration with sane defaults.

use std::env;
use std::path::PathBuf;

pub const INCIDENTS_PATH_VAR: &str = "DISPATCH_INCIDENTS_PATH";
pub const RESOURCES_PATH_VAR: &str = "DISPATCH_RESOURCES_PATH";
pub const LOG_FILTER_VAR: &str = "DISPATCH_LOG";

/// Where snapshots live and how chatty the binary is.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
  /// Incident snapshot file (id -> record).
  pub incidents_path: PathBuf,
  /// Resource snapshot file (id -> record).
  pub resources_path: PathBuf,
  /// `tracing_subscriber::EnvFilter` directive for the binary.
  pub log_filter: String,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      incidents_path: PathBuf::from("incidents.json"),
      resources_path: PathBuf::from("resources.json"),
      log_filter: "info".to_string(),
    }
  }
}

impl Config {
  /// Defaults, overridden by `DISPATCH_*` environment variables when set and non-empty.
  pub fn from_env() -> Self {
    Self::from_lookup(|key| env::var(key).ok())
  }

  fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    let defaults = Self::default();
    Self {
      incidents_path: get(INCIDENTS_PATH_VAR)
        .map(PathBuf::from)
        .unwrap_or(defaults.incidents_path),
      resources_path: get(RESOURCES_PATH_VAR)
        .map(PathBuf::from)
        .unwrap_or(defaults.resources_path),
      log_filter: get(LOG_FILTER_VAR).unwrap_or(defaults.log_filter),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  #[test]
  fn unset_vars_fall_back_to_defaults() {
    let cfg = Config::from_lookup(|_| None);
    assert_eq!(cfg, Config::default());
  }

  #[test]
  fn vars_override_defaults() {
    let vars: HashMap<&str, &str> = [
      (INCIDENTS_PATH_VAR, "/var/lib/dispatch/incidents.json"),
      (LOG_FILTER_VAR, "dispatch_engine=debug"),
      (RESOURCES_PATH_VAR, "  "),
    ]
    .into_iter()
    .collect();
    let cfg = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
    assert_eq!(
      cfg.incidents_path,
      PathBuf::from("/var/lib/dispatch/incidents.json")
    );
    assert_eq!(cfg.resources_path, PathBuf::from("resources.json"));
    assert_eq!(cfg.log_filter, "dispatch_engine=debug");
  }
}
