//! Snapshot files: one JSON object per collection, keyed by id.
//!
//! Loading a missing file yields an empty collection. Saving writes a sibling
//! temp file and renames it over the target, so an interrupted save leaves the
//! previous snapshot readable.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::EngineError;
use crate::incident::Incident;
use crate::resource::Resource;
use crate::types::{IncidentId, ResourceId};

/// Both collections as persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  pub incidents: BTreeMap<IncidentId, Incident>,
  pub resources: BTreeMap<ResourceId, Resource>,
}

impl Snapshot {
  pub fn is_empty(&self) -> bool {
    self.incidents.is_empty() && self.resources.is_empty()
  }
}

/// The pair of files a snapshot is stored in.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
  incidents_path: PathBuf,
  resources_path: PathBuf,
}

impl SnapshotStore {
  pub fn new(incidents_path: impl Into<PathBuf>, resources_path: impl Into<PathBuf>) -> Self {
    Self {
      incidents_path: incidents_path.into(),
      resources_path: resources_path.into(),
    }
  }

  pub fn from_config(config: &Config) -> Self {
    Self::new(config.incidents_path.clone(), config.resources_path.clone())
  }

  pub fn load(&self) -> Result<Snapshot, EngineError> {
    let incidents = load_collection(&self.incidents_path, |i: &Incident| i.incident_id)?;
    let resources = load_collection(&self.resources_path, |r: &Resource| r.resource_id)?;
    tracing::info!(
      incidents = incidents.len(),
      resources = resources.len(),
      "snapshot loaded"
    );
    Ok(Snapshot {
      incidents,
      resources,
    })
  }

  /// Both temp files are written before either is renamed, so a failed write
  /// leaves both previous files in place. A crash between the two renames can
  /// still pair a new incidents file with an old resources file;
  /// `Engine::from_snapshot` repairs the links in that case.
  pub fn save(&self, snapshot: &Snapshot) -> Result<(), EngineError> {
    let incidents_tmp = write_temp(&self.incidents_path, &snapshot.incidents)?;
    let resources_tmp = write_temp(&self.resources_path, &snapshot.resources)?;
    commit(&incidents_tmp, &self.incidents_path)?;
    commit(&resources_tmp, &self.resources_path)?;
    tracing::info!(
      incidents = snapshot.incidents.len(),
      resources = snapshot.resources.len(),
      "snapshot saved"
    );
    Ok(())
  }
}

/// Read an id-keyed collection. Each key must equal the id inside its record.
pub fn load_collection<K, V>(
  path: &Path,
  id_of: impl Fn(&V) -> K,
) -> Result<BTreeMap<K, V>, EngineError>
where
  K: Ord + Display + DeserializeOwned,
  V: DeserializeOwned,
{
  let bytes = match fs::read(path) {
    Ok(b) => b,
    Err(e) if e.kind() == ErrorKind::NotFound => {
      tracing::info!(path = %path.display(), "snapshot file missing, starting empty");
      return Ok(BTreeMap::new());
    }
    Err(e) => return Err(EngineError::io(path, e)),
  };

  let map: BTreeMap<K, V> = serde_json::from_slice(&bytes)?;
  for (key, record) in &map {
    let id = id_of(record);
    if id != *key {
      return Err(EngineError::snapshot(format!(
        "{}: key {} holds record {}",
        path.display(),
        key,
        id
      )));
    }
  }
  Ok(map)
}

/// Write `map` as pretty JSON via temp file + rename.
pub fn save_collection<K, V>(path: &Path, map: &BTreeMap<K, V>) -> Result<(), EngineError>
where
  K: Ord + Serialize,
  V: Serialize,
{
  let tmp_path = write_temp(path, map)?;
  commit(&tmp_path, path)
}

/// Serialize `map` next to `path` and return the temp file's path.
fn write_temp<K, V>(path: &Path, map: &BTreeMap<K, V>) -> Result<PathBuf, EngineError>
where
  K: Ord + Serialize,
  V: Serialize,
{
  let tmp_path = temp_path_for(path);
  let bytes = serde_json::to_vec_pretty(map)?;
  fs::write(&tmp_path, bytes).map_err(|e| EngineError::io(&tmp_path, e))?;
  Ok(tmp_path)
}

fn commit(tmp_path: &Path, path: &Path) -> Result<(), EngineError> {
  fs::rename(tmp_path, path).map_err(|e| EngineError::io(path, e))
}

fn temp_path_for(path: &Path) -> PathBuf {
  let mut name = path
    .file_name()
    .map(|n| n.to_os_string())
    .unwrap_or_else(|| "snapshot".into());
  name.push(".tmp");
  path.with_file_name(name)
}
