//! Dispatch allocation engine: incidents, responder resources, and the
//! priority-ordered matching pass that keeps them paired.
//!
//! The `Engine` owns both collections and is the only writer of the links
//! between them. Snapshots move those collections to and from disk; the
//! binary drives an engine with JSON-lines commands.
//!
//! Single-threaded, synchronous, in-memory state.

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod incident;
pub mod resource;
pub mod snapshot;
pub mod types;

pub use command::{Command, Outcome};
pub use config::Config;
pub use engine::Engine;
pub use error::EngineError;
pub use incident::Incident;
pub use resource::Resource;
pub use snapshot::{Snapshot, SnapshotStore};
pub use types::{
  IncidentId, IncidentStatus, IncidentUpdate, NewIncident, NewResource, Priority, ResourceId,
  ResourceStatus,
};
