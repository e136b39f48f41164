//! Core engine: owns incidents and resources, keeps their links consistent,
//! and re-matches resources to incidents whenever matching inputs change.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::EngineError;
use crate::incident::{requirement_list, Incident};
use crate::resource::{required, Resource};
use crate::snapshot::Snapshot;
use crate::types::*;

/// The allocation engine. Holds both collections for the life of the process.
///
/// Entities are never removed, so each collection is an append-only arena with
/// an id index. Arena order is insertion order, which breaks priority ties and
/// decides which of several same-typed resources is picked first.
#[derive(Debug, Default)]
pub struct Engine {
  incidents: Vec<Incident>,
  incident_index: HashMap<IncidentId, usize>,
  resources: Vec<Resource>,
  resource_index: HashMap<ResourceId, usize>,
}

impl Engine {
  pub fn new() -> Self {
    Self::default()
  }

  /// Rebuild from persisted collections. Entities are ordered by creation time
  /// (then id).
  ///
  /// Records with blank required fields are rejected. Links that do not point
  /// back (an incidents file and a resources file from different saves) are
  /// dropped and the engine re-matches.
  pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, EngineError> {
    let mut incidents: Vec<Incident> = snapshot.incidents.into_values().collect();
    incidents.sort_by(|a, b| {
      a.created_at
        .cmp(&b.created_at)
        .then(a.incident_id.cmp(&b.incident_id))
    });
    let mut resources: Vec<Resource> = snapshot.resources.into_values().collect();
    resources.sort_by(|a, b| {
      a.created_at
        .cmp(&b.created_at)
        .then(a.resource_id.cmp(&b.resource_id))
    });

    let mut engine = Self::new();
    for mut incident in incidents {
      let id = incident.incident_id;
      incident
        .revalidate()
        .map_err(|e| EngineError::snapshot(format!("incident {}: {}", id, e)))?;
      engine.insert_incident(incident);
    }
    for mut resource in resources {
      let id = resource.resource_id;
      resource
        .revalidate()
        .map_err(|e| EngineError::snapshot(format!("resource {}: {}", id, e)))?;
      engine.insert_resource(resource);
    }

    let repaired = engine.repair_links();
    if repaired > 0 {
      tracing::warn!(repaired, "snapshot links disagreed, re-matching");
      engine.process_allocation();
    }
    Ok(engine)
  }

  pub fn snapshot(&self) -> Snapshot {
    Snapshot {
      incidents: self
        .incidents
        .iter()
        .map(|i| (i.incident_id, i.clone()))
        .collect(),
      resources: self
        .resources
        .iter()
        .map(|r| (r.resource_id, r.clone()))
        .collect(),
    }
  }

  // -------------------------------------------------------------------------
  // Mutations
  // -------------------------------------------------------------------------

  /// Validate and store a new incident, then re-match.
  pub fn add_incident(&mut self, new: NewIncident) -> Result<IncidentId, EngineError> {
    let incident = Incident::create(
      &new.location,
      &new.emergency_type,
      new.priority,
      &new.required_resource_types,
    )?;
    let id = incident.incident_id;
    tracing::info!(
      incident_id = %id,
      priority = %incident.priority,
      required = incident.required_resource_types.len(),
      "incident added"
    );
    self.insert_incident(incident);
    self.process_allocation();
    Ok(id)
  }

  /// Validate and store a new resource, then re-match.
  pub fn add_resource(&mut self, new: NewResource) -> Result<ResourceId, EngineError> {
    let status = new.status.unwrap_or(ResourceStatus::Available);
    let resource = Resource::create(&new.name, &new.resource_type, &new.location, status)?;
    let id = resource.resource_id;
    tracing::info!(
      resource_id = %id,
      resource_type = %resource.resource_type,
      status = %resource.status,
      "resource added"
    );
    self.insert_resource(resource);
    self.process_allocation();
    Ok(id)
  }

  /// Apply the supplied fields to an incident.
  ///
  /// Returns `Ok(false)` for an unknown id. Every supplied field is validated
  /// before any is applied. A change of priority, requirements or status
  /// triggers a re-match.
  pub fn update_incident(
    &mut self,
    id: IncidentId,
    update: IncidentUpdate,
  ) -> Result<bool, EngineError> {
    let Some(slot) = self.incident_index.get(&id).copied() else {
      return Ok(false);
    };

    let location = update
      .location
      .as_deref()
      .map(|v| required("location", v))
      .transpose()?;
    let emergency_type = update
      .emergency_type
      .as_deref()
      .map(|v| required("emergency_type", v))
      .transpose()?;
    let requirements = update
      .required_resource_types
      .as_deref()
      .map(requirement_list)
      .transpose()?;

    let incident = &mut self.incidents[slot];
    let mut rematch = false;

    if let Some(location) = location {
      incident.location = location;
    }
    if let Some(emergency_type) = emergency_type {
      incident.emergency_type = emergency_type;
    }
    if let Some(priority) = update.priority {
      rematch |= incident.priority != priority;
      incident.priority = priority;
    }
    if let Some(requirements) = requirements {
      rematch |= incident.required_resource_types != requirements;
      incident.required_resource_types = requirements;
    }
    match update.status {
      Some(status) => {
        rematch |= incident.status != status;
        incident.update_status(status);
      }
      None => incident.touch(),
    }

    tracing::debug!(incident_id = %id, rematch, "incident updated");
    if rematch {
      self.process_allocation();
    }
    Ok(true)
  }

  /// Set an incident's status label. `false` for an unknown id.
  pub fn update_incident_status(&mut self, id: IncidentId, status: IncidentStatus) -> bool {
    let Some(slot) = self.incident_index.get(&id).copied() else {
      return false;
    };
    let incident = &mut self.incidents[slot];
    let changed = incident.status != status;
    incident.update_status(status);
    if changed {
      self.process_allocation();
    }
    true
  }

  /// Take a resource in or out of service.
  ///
  /// `Ok(false)` for an unknown id. ASSIGNED is only reachable through
  /// allocation and is rejected here. The resource leaves its incident first,
  /// then the engine re-matches.
  pub fn update_resource_status(
    &mut self,
    id: ResourceId,
    status: ResourceStatus,
  ) -> Result<bool, EngineError> {
    let Some(slot) = self.resource_index.get(&id).copied() else {
      return Ok(false);
    };
    if status == ResourceStatus::Assigned {
      return Err(EngineError::transition(format!(
        "resource {} can only become ASSIGNED through allocation",
        id
      )));
    }

    self.detach(slot);
    self.resources[slot].set_status(status)?;
    tracing::info!(resource_id = %id, status = %status, "resource status changed");
    self.process_allocation();
    Ok(true)
  }

  /// Manually hand an AVAILABLE resource to an incident.
  ///
  /// Returns `false` and leaves everything untouched when either id is unknown
  /// or the resource is not AVAILABLE. Does not re-match.
  pub fn allocate_resource(&mut self, incident_id: IncidentId, resource_id: ResourceId) -> bool {
    let (Some(i), Some(r)) = (
      self.incident_index.get(&incident_id).copied(),
      self.resource_index.get(&resource_id).copied(),
    ) else {
      tracing::warn!(%incident_id, %resource_id, "allocate: unknown incident or resource");
      return false;
    };
    if !self.resources[r].is_available() {
      tracing::warn!(
        %incident_id,
        %resource_id,
        status = %self.resources[r].status,
        "allocate: resource not available"
      );
      return false;
    }

    self.resources[r].assign_to(incident_id);
    self.incidents[i].assigned_resource_ids.push(resource_id);
    tracing::info!(%incident_id, %resource_id, "resource allocated");
    true
  }

  /// Move a resource to `new_incident_id`, unlinking it from its current
  /// incident if it has one.
  ///
  /// Returns `false` when either id is unknown or the resource is UNAVAILABLE.
  /// Does not re-match.
  pub fn reallocate_resource(&mut self, new_incident_id: IncidentId, resource_id: ResourceId) -> bool {
    let (Some(i), Some(r)) = (
      self.incident_index.get(&new_incident_id).copied(),
      self.resource_index.get(&resource_id).copied(),
    ) else {
      tracing::warn!(%new_incident_id, %resource_id, "reallocate: unknown incident or resource");
      return false;
    };
    if self.resources[r].status == ResourceStatus::Unavailable {
      tracing::warn!(%new_incident_id, %resource_id, "reallocate: resource unavailable");
      return false;
    }
    if self.resources[r].assigned_incident_id == Some(new_incident_id) {
      return true;
    }

    let previous = self.resources[r].assigned_incident_id;
    self.detach(r);
    self.resources[r].assign_to(new_incident_id);
    self.incidents[i].assigned_resource_ids.push(resource_id);
    tracing::info!(
      %resource_id,
      from = ?previous.map(|id| id.to_string()),
      to = %new_incident_id,
      "resource reallocated"
    );
    true
  }

  /// Full re-match of resources to active incidents.
  ///
  /// Every assignment is released, then active incidents are served most
  /// urgent first (ties in insertion order). Each requirement entry takes the
  /// first pooled resource of that type; an entry with no match stays open.
  /// UNAVAILABLE resources never take part.
  ///
  /// The result is computed before anything is written, and only resources
  /// whose assignment actually differs are touched, so a second pass with no
  /// intervening change is a no-op.
  pub fn process_allocation(&mut self) -> AllocationOutcome {
    let mut pool: Vec<usize> = (0..self.resources.len())
      .filter(|&r| self.resources[r].status != ResourceStatus::Unavailable)
      .collect();

    let mut order: Vec<usize> = (0..self.incidents.len())
      .filter(|&i| self.incidents[i].is_active())
      .collect();
    order.sort_by_key(|&i| self.incidents[i].priority.rank());

    let mut outcome = AllocationOutcome::default();
    let mut plan: Vec<Option<IncidentId>> = vec![None; self.resources.len()];
    let mut lists: Vec<Vec<ResourceId>> = vec![Vec::new(); self.incidents.len()];

    for &i in &order {
      let incident = &self.incidents[i];
      for wanted in &incident.required_resource_types {
        let hit = pool
          .iter()
          .position(|&r| self.resources[r].resource_type == *wanted);
        match hit {
          Some(pos) => {
            let r = pool.remove(pos);
            plan[r] = Some(incident.incident_id);
            lists[i].push(self.resources[r].resource_id);
            outcome.fulfilled += 1;
          }
          None => {
            tracing::debug!(
              incident_id = %incident.incident_id,
              resource_type = %wanted,
              "requirement unfulfilled"
            );
            outcome.unfulfilled += 1;
          }
        }
      }
    }

    for (resource, target) in self.resources.iter_mut().zip(plan) {
      match target {
        Some(incident_id) => {
          outcome.assigned += 1;
          if resource.assigned_incident_id != Some(incident_id) {
            tracing::debug!(
              resource_id = %resource.resource_id,
              %incident_id,
              "resource assigned"
            );
            resource.assign_to(incident_id);
            outcome.changed += 1;
          }
        }
        None if resource.status == ResourceStatus::Assigned => {
          tracing::debug!(resource_id = %resource.resource_id, "resource released");
          resource.release();
          outcome.changed += 1;
        }
        None => {}
      }
    }
    for (incident, list) in self.incidents.iter_mut().zip(lists) {
      if incident.assigned_resource_ids != list {
        incident.assigned_resource_ids = list;
      }
    }

    tracing::info!(
      incidents = order.len(),
      assigned = outcome.assigned,
      fulfilled = outcome.fulfilled,
      unfulfilled = outcome.unfulfilled,
      changed = outcome.changed,
      "allocation pass complete"
    );
    outcome
  }

  // -------------------------------------------------------------------------
  // Queries
  // -------------------------------------------------------------------------

  pub fn incident(&self, id: IncidentId) -> Option<&Incident> {
    self.incident_index.get(&id).map(|&i| &self.incidents[i])
  }

  pub fn resource(&self, id: ResourceId) -> Option<&Resource> {
    self.resource_index.get(&id).map(|&r| &self.resources[r])
  }

  /// All incidents in insertion order.
  pub fn incidents(&self) -> &[Incident] {
    &self.incidents
  }

  /// All resources in insertion order.
  pub fn resources(&self) -> &[Resource] {
    &self.resources
  }

  pub fn available_resources(&self) -> Vec<&Resource> {
    self.resources.iter().filter(|r| r.is_available()).collect()
  }

  /// Incidents whose status is exactly OPEN.
  pub fn open_incidents(&self) -> Vec<&Incident> {
    self
      .incidents
      .iter()
      .filter(|i| i.status == IncidentStatus::Open)
      .collect()
  }

  /// Incidents taking part in matching (OPEN or IN_PROGRESS).
  pub fn active_incidents(&self) -> Vec<&Incident> {
    self.incidents.iter().filter(|i| i.is_active()).collect()
  }

  /// Current resource -> incident links.
  pub fn assignments(&self) -> BTreeMap<ResourceId, IncidentId> {
    self
      .resources
      .iter()
      .filter_map(|r| r.assigned_incident_id.map(|i| (r.resource_id, i)))
      .collect()
  }

  /// Requirement entries of an incident that no assigned resource covers.
  pub fn unfulfilled_requirements(&self, id: IncidentId) -> Option<Vec<String>> {
    self.incident(id).map(|incident| self.unfulfilled_of(incident))
  }

  pub fn report(&self) -> Vec<IncidentReport> {
    self
      .incidents
      .iter()
      .map(|incident| IncidentReport {
        incident_id: incident.incident_id,
        location: incident.location.clone(),
        emergency_type: incident.emergency_type.clone(),
        priority: incident.priority,
        status: incident.status,
        assigned_resource_ids: incident.assigned_resource_ids.clone(),
        unfulfilled_resource_types: self.unfulfilled_of(incident),
      })
      .collect()
  }

  /// Verify the incident/resource links agree in both directions.
  pub fn check_consistency(&self) -> Result<(), EngineError> {
    for resource in &self.resources {
      if !resource.link_is_consistent() {
        return Err(EngineError::transition(format!(
          "resource {} is {} but assigned_incident_id is {:?}",
          resource.resource_id,
          resource.status,
          resource.assigned_incident_id.map(|id| id.to_string())
        )));
      }
      if let Some(incident_id) = resource.assigned_incident_id {
        let listed = self
          .incident(incident_id)
          .map(|i| i.assigned_resource_ids.contains(&resource.resource_id));
        match listed {
          Some(true) => {}
          Some(false) => {
            return Err(EngineError::transition(format!(
              "resource {} points at incident {} which does not list it",
              resource.resource_id, incident_id
            )))
          }
          None => {
            return Err(EngineError::transition(format!(
              "resource {} points at unknown incident {}",
              resource.resource_id, incident_id
            )))
          }
        }
      }
    }

    for incident in &self.incidents {
      let mut seen = HashSet::new();
      for resource_id in &incident.assigned_resource_ids {
        if !seen.insert(*resource_id) {
          return Err(EngineError::transition(format!(
            "incident {} lists resource {} twice",
            incident.incident_id, resource_id
          )));
        }
        let back = self.resource(*resource_id).map(|r| r.assigned_incident_id);
        if back != Some(Some(incident.incident_id)) {
          return Err(EngineError::transition(format!(
            "incident {} lists resource {} which is not assigned to it",
            incident.incident_id, resource_id
          )));
        }
      }
    }
    Ok(())
  }

  // -------------------------------------------------------------------------
  // Internals
  // -------------------------------------------------------------------------

  fn insert_incident(&mut self, incident: Incident) {
    self
      .incident_index
      .insert(incident.incident_id, self.incidents.len());
    self.incidents.push(incident);
  }

  fn insert_resource(&mut self, resource: Resource) {
    self
      .resource_index
      .insert(resource.resource_id, self.resources.len());
    self.resources.push(resource);
  }

  /// Drop every link that is not mirrored on the other side. Returns how many
  /// links were dropped.
  fn repair_links(&mut self) -> usize {
    let mut repaired = 0;

    for slot in 0..self.resources.len() {
      let resource = &self.resources[slot];
      let status = resource.status;
      let link = resource.assigned_incident_id;
      let listed = link
        .and_then(|id| self.incident(id))
        .map_or(false, |i| i.assigned_resource_ids.contains(&resource.resource_id));
      let keep = match status {
        ResourceStatus::Assigned => listed,
        _ => link.is_none(),
      };
      if keep {
        continue;
      }

      tracing::warn!(
        resource_id = %resource.resource_id,
        status = %status,
        incident_id = ?link.map(|id| id.to_string()),
        "dropping resource link that does not point back"
      );
      if status == ResourceStatus::Assigned {
        self.resources[slot].release();
      } else {
        self.resources[slot].assigned_incident_id = None;
      }
      repaired += 1;
    }

    let back = self.assignments();
    for incident in &mut self.incidents {
      let id = incident.incident_id;
      let before = incident.assigned_resource_ids.len();
      let mut seen = HashSet::new();
      incident
        .assigned_resource_ids
        .retain(|r| back.get(r) == Some(&id) && seen.insert(*r));
      let dropped = before - incident.assigned_resource_ids.len();
      if dropped > 0 {
        tracing::warn!(incident_id = %id, dropped, "dropping incident links that do not point back");
        repaired += dropped;
      }
    }
    repaired
  }

  /// Remove resource `slot` from the list of the incident it points at.
  fn detach(&mut self, slot: usize) {
    let resource_id = self.resources[slot].resource_id;
    let Some(incident_id) = self.resources[slot].assigned_incident_id else {
      return;
    };
    if let Some(&i) = self.incident_index.get(&incident_id) {
      self.incidents[i]
        .assigned_resource_ids
        .retain(|id| *id != resource_id);
    }
  }

  fn unfulfilled_of(&self, incident: &Incident) -> Vec<String> {
    let assigned_types = incident
      .assigned_resource_ids
      .iter()
      .filter_map(|id| self.resource(*id))
      .map(|r| r.resource_type.as_str());
    incident.unfulfilled(assigned_types)
  }
}
