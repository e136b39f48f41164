//! Responder units and their status lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::{IncidentId, ResourceId, ResourceStatus};

/// A responder unit. `resource_type` is the key incidents are matched on.
///
/// `assigned_incident_id` is `Some` exactly when `status` is `Assigned`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
  pub resource_id: ResourceId,
  pub name: String,
  pub resource_type: String,
  pub location: String,
  pub status: ResourceStatus,
  pub assigned_incident_id: Option<IncidentId>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Resource {
  /// Validate and build a new resource with a fresh id.
  ///
  /// A resource cannot start out `Assigned`: there is no incident to link it to.
  pub fn create(
    name: &str,
    resource_type: &str,
    location: &str,
    status: ResourceStatus,
  ) -> Result<Self, EngineError> {
    let name = required("name", name)?;
    let resource_type = required("resource_type", resource_type)?;
    let location = required("location", location)?;
    if status == ResourceStatus::Assigned {
      return Err(EngineError::transition(
        "a new resource cannot be ASSIGNED without an incident",
      ));
    }

    let now = Utc::now();
    Ok(Self {
      resource_id: ResourceId::new(),
      name,
      resource_type,
      location,
      status,
      assigned_incident_id: None,
      created_at: now,
      updated_at: now,
    })
  }

  pub fn available(name: &str, resource_type: &str, location: &str) -> Result<Self, EngineError> {
    Self::create(name, resource_type, location, ResourceStatus::Available)
  }

  /// Move to `Available` or `Unavailable`, dropping any incident link.
  ///
  /// `Assigned` needs an incident id and must go through [`Resource::assign_to`].
  pub fn set_status(&mut self, status: ResourceStatus) -> Result<(), EngineError> {
    if status == ResourceStatus::Assigned {
      return Err(EngineError::transition(format!(
        "resource {} cannot become ASSIGNED without an incident",
        self.resource_id
      )));
    }
    self.status = status;
    self.assigned_incident_id = None;
    self.updated_at = Utc::now();
    Ok(())
  }

  pub fn assign_to(&mut self, incident_id: IncidentId) {
    self.status = ResourceStatus::Assigned;
    self.assigned_incident_id = Some(incident_id);
    self.updated_at = Utc::now();
  }

  /// Drop an assignment and return to the pool.
  pub fn release(&mut self) {
    self.status = ResourceStatus::Available;
    self.assigned_incident_id = None;
    self.updated_at = Utc::now();
  }

  pub fn is_available(&self) -> bool {
    self.status == ResourceStatus::Available
  }

  /// Re-run the creation checks on a record read back from disk.
  pub(crate) fn revalidate(&mut self) -> Result<(), EngineError> {
    self.name = required("name", &self.name)?;
    self.resource_type = required("resource_type", &self.resource_type)?;
    self.location = required("location", &self.location)?;
    Ok(())
  }

  /// Status and link agree with each other.
  pub fn link_is_consistent(&self) -> bool {
    (self.status == ResourceStatus::Assigned) == self.assigned_incident_id.is_some()
  }
}

pub(crate) fn required(field: &str, value: &str) -> Result<String, EngineError> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return Err(EngineError::invalid_argument(field, "must not be empty"));
  }
  Ok(trimmed.to_string())
}
