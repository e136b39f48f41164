//! Emergency incidents and their requirement lists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::resource::required;
use crate::types::{IncidentId, IncidentStatus, Priority, ResourceId};

/// An emergency report.
///
/// `required_resource_types` is an ordered wish list; duplicates each consume
/// one matching resource. `assigned_resource_ids` is written by the engine only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
  pub incident_id: IncidentId,
  pub location: String,
  pub emergency_type: String,
  pub priority: Priority,
  pub required_resource_types: Vec<String>,
  pub assigned_resource_ids: Vec<ResourceId>,
  pub status: IncidentStatus,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Incident {
  pub fn create(
    location: &str,
    emergency_type: &str,
    priority: Priority,
    required_resource_types: &[String],
  ) -> Result<Self, EngineError> {
    let location = required("location", location)?;
    let emergency_type = required("emergency_type", emergency_type)?;
    let required_resource_types = requirement_list(required_resource_types)?;

    let now = Utc::now();
    Ok(Self {
      incident_id: IncidentId::new(),
      location,
      emergency_type,
      priority,
      required_resource_types,
      assigned_resource_ids: Vec::new(),
      status: IncidentStatus::Open,
      created_at: now,
      updated_at: now,
    })
  }

  /// Any status may follow any other; the label is not a state machine.
  pub fn update_status(&mut self, status: IncidentStatus) {
    self.status = status;
    self.touch();
  }

  /// Re-run the creation checks on a record read back from disk.
  pub(crate) fn revalidate(&mut self) -> Result<(), EngineError> {
    self.location = required("location", &self.location)?;
    self.emergency_type = required("emergency_type", &self.emergency_type)?;
    self.required_resource_types = requirement_list(&self.required_resource_types)?;
    Ok(())
  }

  pub fn touch(&mut self) {
    self.updated_at = Utc::now();
  }

  pub fn is_active(&self) -> bool {
    self.status.is_active()
  }

  /// Required types not yet covered by an assigned resource, in list order.
  ///
  /// `assigned_types` are the types of the resources in `assigned_resource_ids`.
  pub fn unfulfilled<'a>(&self, assigned_types: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut remaining = self.required_resource_types.clone();
    for ty in assigned_types {
      if let Some(pos) = remaining.iter().position(|r| r == ty) {
        remaining.remove(pos);
      }
    }
    remaining
  }
}

/// Trim every entry; blank entries are rejected. An empty list is fine.
pub(crate) fn requirement_list(types: &[String]) -> Result<Vec<String>, EngineError> {
  types
    .iter()
    .enumerate()
    .map(|(i, t)| {
      let trimmed = t.trim();
      if trimmed.is_empty() {
        Err(EngineError::invalid_argument(
          &format!("required_resource_types[{}]", i),
          "must not be blank",
        ))
      } else {
        Ok(trimmed.to_string())
      }
    })
    .collect()
}
