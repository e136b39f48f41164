//! Core types shared across the engine: ids, priority, and status labels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! id_type {
  ($name:ident) => {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct $name(Uuid);

    impl $name {
      pub fn new() -> Self {
        Self(Uuid::new_v4())
      }
    }

    impl Default for $name {
      fn default() -> Self {
        Self::new()
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
      }
    }

    impl FromStr for $name {
      type Err = EngineError;

      fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
          .map(Self)
          .map_err(|e| EngineError::invalid_argument(stringify!($name), &e.to_string()))
      }
    }
  };
}

id_type!(IncidentId);
id_type!(ResourceId);

// ---------------------------------------------------------------------------
// Named enums
// ---------------------------------------------------------------------------

/// Closed label set with a canonical upper-case name per variant.
///
/// Lookup ignores case and treats spaces and hyphens as underscores, so
/// "in progress", "In-Progress" and "IN_PROGRESS" all resolve to the same
/// variant. Serde goes through the same lookup.
macro_rules! named_enum {
  ($name:ident, $kind:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
    impl $name {
      pub fn as_str(self) -> &'static str {
        match self {
          $($name::$variant => $label),+
        }
      }

      pub fn from_name(name: &str) -> Result<Self, EngineError> {
        let key = name.trim().to_ascii_uppercase().replace(&[' ', '-'][..], "_");
        match key.as_str() {
          $($label => Ok($name::$variant),)+
          _ => Err(EngineError::invalid_enum($kind, name)),
        }
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
      }
    }

    impl FromStr for $name {
      type Err = EngineError;

      fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
      }
    }

    impl Serialize for $name {
      fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
      }
    }

    impl<'de> Deserialize<'de> for $name {
      fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_name(&raw).map_err(serde::de::Error::custom)
      }
    }
  };
}

/// Incident urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
  High,
  Medium,
  Low,
}

named_enum!(Priority, "priority", {
  High => "HIGH",
  Medium => "MEDIUM",
  Low => "LOW",
});

impl Priority {
  /// Matching order; 0 is served first.
  pub fn rank(self) -> u8 {
    match self {
      Self::High => 0,
      Self::Medium => 1,
      Self::Low => 2,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceStatus {
  Available,
  Assigned,
  Unavailable,
}

named_enum!(ResourceStatus, "resource status", {
  Available => "AVAILABLE",
  Assigned => "ASSIGNED",
  Unavailable => "UNAVAILABLE",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncidentStatus {
  Open,
  InProgress,
  Resolved,
  Closed,
}

named_enum!(IncidentStatus, "incident status", {
  Open => "OPEN",
  InProgress => "IN_PROGRESS",
  Resolved => "RESOLVED",
  Closed => "CLOSED",
});

impl IncidentStatus {
  /// Open and in-progress incidents take part in matching.
  pub fn is_active(self) -> bool {
    matches!(self, Self::Open | Self::InProgress)
  }
}

// ---------------------------------------------------------------------------
// Inbound types (what callers hand the engine)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewIncident {
  pub location: String,
  pub emergency_type: String,
  pub priority: Priority,
  #[serde(default)]
  pub required_resource_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewResource {
  pub name: String,
  pub resource_type: String,
  pub location: String,
  /// Defaults to AVAILABLE.
  #[serde(default)]
  pub status: Option<ResourceStatus>,
}

/// Partial incident update; `None` leaves the field as is.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IncidentUpdate {
  #[serde(default)]
  pub location: Option<String>,
  #[serde(default)]
  pub emergency_type: Option<String>,
  #[serde(default)]
  pub priority: Option<Priority>,
  #[serde(default)]
  pub required_resource_types: Option<Vec<String>>,
  #[serde(default)]
  pub status: Option<IncidentStatus>,
}

impl IncidentUpdate {
  pub fn status(status: IncidentStatus) -> Self {
    Self {
      status: Some(status),
      ..Self::default()
    }
  }

  pub fn priority(priority: Priority) -> Self {
    Self {
      priority: Some(priority),
      ..Self::default()
    }
  }
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Tally of one matching pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AllocationOutcome {
  /// Resources assigned once the pass finished.
  pub assigned: usize,
  /// Requirement entries that received a resource.
  pub fulfilled: usize,
  /// Requirement entries left open for lack of a matching resource.
  pub unfulfilled: usize,
  /// Resources whose assignment differs from before the pass.
  pub changed: usize,
}

/// One line of the incident report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentReport {
  pub incident_id: IncidentId,
  pub location: String,
  pub emergency_type: String,
  pub priority: Priority,
  pub status: IncidentStatus,
  pub assigned_resource_ids: Vec<ResourceId>,
  pub unfulfilled_resource_types: Vec<String>,
}

// ---------------------------------------------------------------------------
// CLI stream wrappers
// ---------------------------------------------------------------------------

/// Structured error output for a command line that could not be applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorOutput {
  pub error: bool,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub field: Option<String>,
}

impl ErrorOutput {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      error: true,
      message: message.into(),
      field: None,
    }
  }

  pub fn with_field(mut self, field: impl Into<String>) -> Self {
    self.field = Some(field.into());
    self
  }
}

impl From<&EngineError> for ErrorOutput {
  fn from(err: &EngineError) -> Self {
    match err {
      EngineError::InvalidArgument { field, reason } => {
        ErrorOutput::new(reason.clone()).with_field(field.clone())
      }
      _ => ErrorOutput::new(err.to_string()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn priority_orders_by_rank() {
    assert!(Priority::High.rank() < Priority::Medium.rank());
    assert!(Priority::Medium.rank() < Priority::Low.rank());

    let mut all = vec![Priority::Low, Priority::High, Priority::Medium];
    all.sort_by_key(|p| p.rank());
    assert_eq!(all, vec![Priority::High, Priority::Medium, Priority::Low]);
  }

  #[test]
  fn lookup_is_case_insensitive() {
    assert_eq!(Priority::from_name("high").unwrap(), Priority::High);
    assert_eq!(Priority::from_name(" Medium ").unwrap(), Priority::Medium);
    assert_eq!(
      IncidentStatus::from_name("in progress").unwrap(),
      IncidentStatus::InProgress
    );
    assert_eq!(
      IncidentStatus::from_name("In-Progress").unwrap(),
      IncidentStatus::InProgress
    );
    assert_eq!(
      "unavailable".parse::<ResourceStatus>().unwrap(),
      ResourceStatus::Unavailable
    );
  }

  #[test]
  fn unknown_name_is_invalid_enum_value() {
    let err = Priority::from_name("urgent").unwrap_err();
    assert!(matches!(
      err,
      EngineError::InvalidEnumValue { kind: "priority", .. }
    ));
    assert!(err.to_string().contains("urgent"));

    assert!(IncidentStatus::from_name("").is_err());
  }

  #[test]
  fn serde_uses_canonical_names() {
    let json = serde_json::to_string(&IncidentStatus::InProgress).unwrap();
    assert_eq!(json, "\"IN_PROGRESS\"");

    let parsed: ResourceStatus = serde_json::from_str("\"assigned\"").unwrap();
    assert_eq!(parsed, ResourceStatus::Assigned);

    assert!(serde_json::from_str::<Priority>("\"CRITICAL\"").is_err());
  }

  #[test]
  fn only_open_and_in_progress_are_active() {
    assert!(IncidentStatus::Open.is_active());
    assert!(IncidentStatus::InProgress.is_active());
    assert!(!IncidentStatus::Resolved.is_active());
    assert!(!IncidentStatus::Closed.is_active());
  }

  #[test]
  fn ids_parse_from_their_display_form() {
    let id = IncidentId::new();
    let parsed: IncidentId = id.to_string().parse().unwrap();
    assert_eq!(parsed, id);
    assert!("not-a-uuid".parse::<ResourceId>().is_err());
  }
}
